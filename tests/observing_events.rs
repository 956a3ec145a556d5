//! Lifecycle observation hooks.

use std::sync::{
  atomic::{AtomicBool, AtomicU64, Ordering},
  Arc, Mutex,
};

use riptide::prelude::*;

#[test]
fn item_hook_sees_every_item_without_altering_it() {
  let seen = Arc::new(Mutex::new(Vec::new()));
  let record = seen.clone();
  let subscriber = AssertSubscriber::with_demand(UNBOUNDED);
  Stream::from_iter([1, 2, 3])
    .on_item()
    .invoke(move |item| record.lock().unwrap().push(*item))
    .subscribe(subscriber.clone());

  subscriber.await_completion().assert_items(&[1, 2, 3]);
  assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
}

#[test]
fn subscription_hook_fires_once_at_subscribe_time() {
  let fired = Arc::new(AtomicU64::new(0));
  let count = fired.clone();
  let subscriber = AssertSubscriber::with_demand(UNBOUNDED);
  Stream::from_iter([1])
    .on_subscription()
    .invoke(move || {
      count.fetch_add(1, Ordering::SeqCst);
    })
    .subscribe(subscriber.clone());

  subscriber.await_completion();
  assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn completion_hook_fires_on_completion_only() {
  let completed = Arc::new(AtomicBool::new(false));
  let flag = completed.clone();
  let subscriber = AssertSubscriber::with_demand(UNBOUNDED);
  Stream::from_iter([1, 2])
    .on_completion()
    .invoke(move || flag.store(true, Ordering::SeqCst))
    .subscribe(subscriber.clone());

  subscriber.await_completion();
  assert!(completed.load(Ordering::SeqCst));
}

#[test]
fn failure_hook_observes_and_propagates() {
  let observed = Arc::new(Mutex::new(None));
  let slot = observed.clone();
  let subscriber = AssertSubscriber::<i32>::with_demand(UNBOUNDED);
  Stream::failure(Failure::msg("boom"))
    .on_failure()
    .invoke(move |failure| {
      *slot.lock().unwrap() = Some(failure.message());
    })
    .subscribe(subscriber.clone());

  subscriber.await_failure();
  assert_eq!(observed.lock().unwrap().as_deref(), Some("boom"));
  assert_eq!(subscriber.assert_failed().message(), "boom");
}

#[test]
fn cancellation_hook_fires_on_consumer_cancel() {
  let cancelled = Arc::new(AtomicBool::new(false));
  let flag = cancelled.clone();
  let subscriber = AssertSubscriber::create();
  Stream::ticks_every(std::time::Duration::from_millis(5))
    .on_cancellation()
    .invoke(move || flag.store(true, Ordering::SeqCst))
    .subscribe(subscriber.clone());

  subscriber.await_next_items(2);
  subscriber.cancel();
  subscriber.await_cancellation();
  assert!(cancelled.load(Ordering::SeqCst));
}

#[test]
fn request_hook_observes_demand_on_its_way_upstream() {
  let requests = Arc::new(Mutex::new(Vec::new()));
  let record = requests.clone();
  let subscriber = AssertSubscriber::create();
  Stream::from_iter([1, 2, 3, 4])
    .on_request()
    .invoke(move |n| record.lock().unwrap().push(n))
    .subscribe(subscriber.clone());

  subscriber.await_next_items(1);
  subscriber.await_next_items(2);
  subscriber.await_next_items(1).await_completion();
  assert_eq!(*requests.lock().unwrap(), vec![1, 2, 1]);
}

#[test]
fn failing_item_hook_cancels_upstream_and_fails_downstream() {
  let upstream_cancelled = Arc::new(AtomicBool::new(false));
  let flag = upstream_cancelled.clone();
  let subscriber = AssertSubscriber::with_demand(UNBOUNDED);
  Stream::from_iter(1..)
    .on_cancellation()
    .invoke(move || flag.store(true, Ordering::SeqCst))
    .on_item()
    .try_invoke(|item| {
      if *item < 3 {
        Ok(())
      } else {
        Err(Failure::msg("item too large"))
      }
    })
    .subscribe(subscriber.clone());

  subscriber.await_failure();
  assert_eq!(subscriber.items(), vec![1, 2]);
  assert_eq!(subscriber.assert_failed().message(), "item too large");
  // The producer acknowledges the cancel on its own thread.
  for _ in 0..200 {
    if upstream_cancelled.load(Ordering::SeqCst) {
      return;
    }
    std::thread::sleep(std::time::Duration::from_millis(5));
  }
  panic!("upstream never saw the cancellation");
}

#[test]
fn single_item_hook_observes_resolution() {
  let seen = Arc::new(Mutex::new(None));
  let slot = seen.clone();
  let outcome = SingleAsync::item(5)
    .on_item()
    .invoke(move |item| {
      *slot.lock().unwrap() = Some(*item);
    })
    .await_indefinitely();

  assert_eq!(outcome.unwrap(), 5);
  assert_eq!(*seen.lock().unwrap(), Some(5));
}

#[test]
fn single_failing_item_hook_becomes_the_outcome() {
  let subscriber = SingleAssertSubscriber::create();
  SingleAsync::item(5)
    .on_item()
    .try_invoke(|_| Err(Failure::msg("rejected")))
    .subscribe(subscriber.clone());

  assert_eq!(subscriber.await_failure().assert_failed().message(), "rejected");
}

#[test]
fn single_failure_hook_observes_and_propagates() {
  let observed = Arc::new(AtomicBool::new(false));
  let flag = observed.clone();
  let subscriber = SingleAssertSubscriber::<i32>::create();
  SingleAsync::failure(Failure::msg("down"))
    .on_failure()
    .invoke(move |_| flag.store(true, Ordering::SeqCst))
    .subscribe(subscriber.clone());

  subscriber.await_failure();
  assert!(observed.load(Ordering::SeqCst));
}

#[test]
fn single_cancellation_hook_fires() {
  let cancelled = Arc::new(AtomicBool::new(false));
  let flag = cancelled.clone();
  let subscriber = SingleAssertSubscriber::create();
  SingleAsync::<i32>::emitter(|_emitter| {
    // Never settles; the consumer walks away.
  })
  .on_cancellation()
  .invoke(move || flag.store(true, Ordering::SeqCst))
  .subscribe(subscriber.clone());

  subscriber.cancel();
  subscriber.await_cancellation();
  assert!(cancelled.load(Ordering::SeqCst));
}
