//! Synchronous transformation and recovery.

use riptide::prelude::*;

#[test]
fn transform_maps_every_item() {
  let subscriber = AssertSubscriber::with_demand(UNBOUNDED);
  Stream::from_iter([1, 2, 3])
    .on_item()
    .transform(|i| i * 10)
    .subscribe(subscriber.clone());
  subscriber.await_completion().assert_items(&[10, 20, 30]);
}

#[test]
fn transforms_compose_in_order() {
  let subscriber = AssertSubscriber::with_demand(UNBOUNDED);
  Stream::from_iter([1, 2])
    .on_item()
    .transform(|i| i + 1)
    .on_item()
    .transform(|i| format!("#{i}"))
    .subscribe(subscriber.clone());
  subscriber
    .await_completion()
    .assert_items(&["#2".to_string(), "#3".to_string()]);
}

#[test]
fn failing_transform_terminates_after_prior_items() {
  let subscriber = AssertSubscriber::with_demand(UNBOUNDED);
  Stream::from_iter([1, 2, 3, 4])
    .on_item()
    .try_transform(|i| {
      if i < 3 {
        Ok(i * 2)
      } else {
        Err(Failure::msg("cannot double"))
      }
    })
    .subscribe(subscriber.clone());

  subscriber.await_failure();
  assert_eq!(subscriber.items(), vec![2, 4]);
  assert_eq!(subscriber.assert_failed().message(), "cannot double");
}

#[test]
fn transform_does_not_run_on_failed_stream() {
  let subscriber = AssertSubscriber::<i32>::with_demand(UNBOUNDED);
  Stream::failure(Failure::msg("upstream down"))
    .on_item()
    .transform(|i: i32| i * 2)
    .subscribe(subscriber.clone());
  assert_eq!(subscriber.await_failure().assert_failed().message(), "upstream down");
  assert!(subscriber.items().is_empty());
}

#[test]
fn stream_recovers_with_replacement_items() {
  let subscriber = AssertSubscriber::with_demand(UNBOUNDED);
  Stream::from_iter([1, 2])
    .on_item()
    .try_transform(|i| {
      if i == 2 {
        Err(Failure::msg("two is broken"))
      } else {
        Ok(i)
      }
    })
    .on_failure()
    .recover_with_stream(|_| Stream::from_iter([8, 9]))
    .subscribe(subscriber.clone());

  // The downstream never sees the failure, only the replacement.
  subscriber.await_completion().assert_items(&[1, 8, 9]);
}

#[test]
fn stream_recovers_with_single_item() {
  let subscriber = AssertSubscriber::<i32>::with_demand(UNBOUNDED);
  Stream::failure(Failure::msg("boom"))
    .on_failure()
    .recover_with_item(99)
    .subscribe(subscriber.clone());
  subscriber.await_completion().assert_items(&[99]);
}

#[test]
fn recovery_function_sees_the_original_failure() {
  let subscriber = AssertSubscriber::<String>::with_demand(UNBOUNDED);
  Stream::failure(Failure::msg("root cause"))
    .on_failure()
    .recover_with_stream(|failure| Stream::from_iter([failure.message()]))
    .subscribe(subscriber.clone());
  subscriber.await_completion().assert_items(&["root cause".to_string()]);
}

#[test]
fn single_transform_maps_the_item() {
  let outcome = SingleAsync::item("riptide")
    .on_item()
    .transform(|s| s.len())
    .await_indefinitely();
  assert_eq!(outcome.unwrap(), 7);
}

#[test]
fn single_failing_transform_becomes_the_outcome() {
  let subscriber = SingleAssertSubscriber::<i32>::create();
  SingleAsync::item(1)
    .on_item()
    .try_transform(|_| Err::<i32, _>(Failure::msg("mapping broke")))
    .subscribe(subscriber.clone());
  assert_eq!(
    subscriber.await_failure().assert_failed().message(),
    "mapping broke"
  );
}

#[test]
fn single_transform_skips_on_failure() {
  let subscriber = SingleAssertSubscriber::<i32>::create();
  SingleAsync::<i32>::failure(Failure::msg("dead"))
    .on_item()
    .transform(|i| i + 1)
    .subscribe(subscriber.clone());
  assert_eq!(subscriber.await_failure().assert_failed().message(), "dead");
}

#[test]
fn single_recovers_with_item() {
  let outcome = SingleAsync::<i32>::failure(Failure::msg("boom"))
    .on_failure()
    .recover_with_item(17)
    .await_indefinitely();
  assert_eq!(outcome.unwrap(), 17);
}

#[test]
fn single_recovers_with_alternative_single() {
  let outcome = SingleAsync::<String>::failure(Failure::msg("first try"))
    .on_failure()
    .recover_with_single(|failure| {
      SingleAsync::item(format!("recovered from {failure}"))
    })
    .await_indefinitely();
  assert_eq!(outcome.unwrap(), "recovered from first try");
}

#[test]
fn recovery_does_not_touch_successful_singles() {
  let outcome = SingleAsync::item(5)
    .on_failure()
    .recover_with_item(0)
    .await_indefinitely();
  assert_eq!(outcome.unwrap(), 5);
}
