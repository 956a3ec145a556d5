//! Blocking bridges from the reactive world.

use std::time::{Duration, Instant};

use riptide::prelude::*;

#[test]
fn await_resolves_to_the_item() {
  assert_eq!(SingleAsync::item(5).await_indefinitely().unwrap(), 5);
}

#[test]
fn await_surfaces_failure_as_upstream_error() {
  let err = SingleAsync::<i32>::failure(Failure::msg("gone"))
    .await_indefinitely()
    .unwrap_err();
  assert!(matches!(err, Error::Upstream(_)));
  assert!(err.to_string().contains("gone"));
}

#[test]
fn await_blocks_until_an_emitter_settles() {
  let outcome = SingleAsync::emitter(|emitter| {
    std::thread::sleep(Duration::from_millis(20));
    emitter.complete("slow value");
  })
  .await_indefinitely();
  assert_eq!(outcome.unwrap(), "slow value");
}

#[test]
fn bounded_await_succeeds_within_the_bound() {
  let outcome = SingleAsync::emitter(|emitter| {
    std::thread::sleep(Duration::from_millis(10));
    emitter.complete(1);
  })
  .await_at_most(Duration::from_secs(5));
  assert_eq!(outcome.unwrap(), 1);
}

#[test]
fn bounded_await_times_out() {
  let start = Instant::now();
  let err = SingleAsync::<i32>::emitter(|_emitter| {
    // Never settles.
  })
  .await_at_most(Duration::from_millis(50))
  .unwrap_err();

  assert!(matches!(err, Error::Timeout(_)));
  assert!(start.elapsed() >= Duration::from_millis(50));
}

#[test]
fn void_item_awaits_to_none() {
  assert_eq!(SingleAsync::<i32>::void_item().await_indefinitely().unwrap(), None);
}

#[test]
fn optional_awaits_to_its_payload() {
  assert_eq!(
    SingleAsync::optional(Some("x")).await_indefinitely().unwrap(),
    Some("x")
  );
}

#[test]
fn into_stream_emits_the_item_then_completes() {
  let subscriber = AssertSubscriber::with_demand(UNBOUNDED);
  SingleAsync::item(9).into_stream().subscribe(subscriber.clone());
  subscriber.await_completion().assert_items(&[9]);
}

#[test]
fn into_stream_holds_the_item_until_requested() {
  let subscriber = AssertSubscriber::create();
  SingleAsync::item(9).into_stream().subscribe(subscriber.clone());

  std::thread::sleep(Duration::from_millis(30));
  assert!(subscriber.items().is_empty());
  subscriber.await_next_items(1).await_completion();
  subscriber.assert_items(&[9]);
}

#[test]
fn into_stream_propagates_failure_without_demand() {
  let subscriber = AssertSubscriber::<i32>::create();
  SingleAsync::failure(Failure::msg("dead on arrival"))
    .into_stream()
    .subscribe(subscriber.clone());
  assert_eq!(
    subscriber.await_failure().assert_failed().message(),
    "dead on arrival"
  );
}
