//! Asynchronous transformation: flat-map composition policies.

use std::time::Duration;

use riptide::prelude::*;

#[test]
fn concatenate_preserves_outer_order() {
  let subscriber = AssertSubscriber::with_demand(UNBOUNDED);
  Stream::from_iter([1i64, 2, 3, 4])
    .on_item()
    .transform_to_stream(|i| Stream::from_iter([i, i + 4]))
    .concatenate()
    .subscribe(subscriber.clone());

  subscriber
    .await_completion()
    .assert_items(&[1, 5, 2, 6, 3, 7, 4, 8]);
}

#[test]
fn merge_delivers_every_item_in_some_order() {
  let subscriber = AssertSubscriber::with_demand(UNBOUNDED);
  Stream::from_iter([1i64, 2, 3, 4])
    .on_item()
    .transform_to_stream(|i| Stream::from_iter([i, i + 4]))
    .merge()
    .subscribe(subscriber.clone());

  subscriber.await_completion();
  let mut items = subscriber.items();
  items.sort_unstable();
  assert_eq!(items, vec![1, 2, 3, 4, 5, 6, 7, 8]);
}

#[test]
fn merge_interleaves_slow_inners_without_losing_items() {
  let subscriber = AssertSubscriber::with_demand(UNBOUNDED);
  Stream::from_iter([10u64, 20])
    .on_item()
    .transform_to_stream(|base| {
      Stream::emitter(move |emitter| {
        for offset in 0..3 {
          std::thread::sleep(Duration::from_millis(5));
          emitter.emit(base + offset);
        }
        emitter.complete();
      })
    })
    .merge()
    .subscribe(subscriber.clone());

  subscriber.await_completion();
  let mut items = subscriber.items();
  items.sort_unstable();
  assert_eq!(items, vec![10, 11, 12, 20, 21, 22]);
}

#[test]
fn immediate_failure_cancels_the_rest() {
  let subscriber = AssertSubscriber::<i64>::with_demand(UNBOUNDED);
  Stream::from_iter([1i64, 2, 3])
    .on_item()
    .transform_to_stream(|i| {
      if i == 2 {
        Stream::failure(Failure::msg("inner two broke"))
      } else {
        Stream::from_iter([i])
      }
    })
    .concatenate()
    .subscribe(subscriber.clone());

  subscriber.await_failure();
  assert_eq!(subscriber.assert_failed().message(), "inner two broke");
  // Inners after the failing one never run.
  assert_eq!(subscriber.items(), vec![1]);
}

#[test]
fn collected_failures_defer_and_combine() {
  let subscriber = AssertSubscriber::<i64>::with_demand(UNBOUNDED);
  Stream::from_iter([1i64, 2, 3])
    .on_item()
    .transform_to_stream(|i| {
      if i == 2 {
        Stream::failure(Failure::msg("two broke"))
      } else {
        Stream::from_iter([i])
      }
    })
    .collect_failures()
    .concatenate()
    .subscribe(subscriber.clone());

  subscriber.await_failure();
  // Healthy inners drained before the combined terminal failure.
  assert_eq!(subscriber.items(), vec![1, 3]);
  let message = subscriber.assert_failed().message();
  assert!(message.starts_with("1 failure(s)"), "unexpected: {message}");
  assert!(message.contains("two broke"));
}

#[test]
fn collected_failures_combine_several() {
  let subscriber = AssertSubscriber::<i64>::with_demand(UNBOUNDED);
  Stream::from_iter([1i64, 2, 3])
    .on_item()
    .transform_to_stream(|i| {
      if i == 3 {
        Stream::from_iter([i])
      } else {
        Stream::failure(Failure::msg(format!("inner {i}")))
      }
    })
    .collect_failures()
    .merge()
    .subscribe(subscriber.clone());

  subscriber.await_failure();
  assert_eq!(subscriber.items(), vec![3]);
  let message = subscriber.assert_failed().message();
  assert!(message.starts_with("2 failure(s)"), "unexpected: {message}");
  assert!(message.contains("inner 1"));
  assert!(message.contains("inner 2"));
}

#[test]
fn stream_items_map_through_singles() {
  let subscriber = AssertSubscriber::with_demand(UNBOUNDED);
  Stream::from_iter([1, 2, 3])
    .on_item()
    .transform_to_single(|i| SingleAsync::item(i * 100))
    .concatenate()
    .subscribe(subscriber.clone());

  subscriber.await_completion().assert_items(&[100, 200, 300]);
}

#[test]
fn failing_single_fails_the_merged_stream() {
  let subscriber = AssertSubscriber::<i32>::with_demand(UNBOUNDED);
  Stream::from_iter([1, 2])
    .on_item()
    .transform_to_single(|i| {
      if i == 2 {
        SingleAsync::failure(Failure::msg("no two"))
      } else {
        SingleAsync::item(i)
      }
    })
    .concatenate()
    .subscribe(subscriber.clone());

  subscriber.await_failure();
  assert_eq!(subscriber.assert_failed().message(), "no two");
}

#[test]
fn single_chains_into_another_single() {
  let outcome = SingleAsync::item(4)
    .on_item()
    .transform_to_single(|i| {
      SingleAsync::emitter(move |emitter| emitter.complete(i * i))
    })
    .await_indefinitely();
  assert_eq!(outcome.unwrap(), 16);
}

#[test]
fn single_flat_map_propagates_upstream_failure() {
  let outcome = SingleAsync::<i32>::failure(Failure::msg("root"))
    .on_item()
    .transform_to_single(|i| SingleAsync::item(i + 1))
    .await_indefinitely();
  let err = outcome.unwrap_err();
  assert!(matches!(err, Error::Upstream(_)));
  assert!(err.to_string().contains("root"));
}

#[test]
fn single_fans_out_into_a_stream() {
  let subscriber = AssertSubscriber::with_demand(UNBOUNDED);
  SingleAsync::item(3i64)
    .on_item()
    .transform_to_stream(|n| Stream::range(0, n).unwrap())
    .subscribe(subscriber.clone());

  subscriber.await_completion().assert_items(&[0, 1, 2]);
}

#[test]
fn single_fan_out_honours_stream_demand() {
  let subscriber = AssertSubscriber::create();
  SingleAsync::item(4i64)
    .on_item()
    .transform_to_stream(|n| Stream::range(0, n).unwrap())
    .subscribe(subscriber.clone());

  subscriber.await_next_items(2).assert_items(&[0, 1]);
  subscriber.await_next_items(2).await_completion();
  subscriber.assert_items(&[0, 1, 2, 3]);
}
