//! Reactive-asynchronous primitives with demand-driven backpressure.
//!
//! Two abstractions cover the asynchronous space: [`SingleAsync`] is one
//! eventual item or failure; [`Stream`] is zero or more items followed by
//! exactly one terminal event. Both are cold and single-shot: nothing
//! runs until `subscribe`, which consumes the value. A stream only emits
//! against demand its subscriber has requested, so a slow consumer slows
//! the producer instead of buffering unboundedly.
//!
//! # Quick start
//!
//! ```
//! use riptide::prelude::*;
//!
//! let subscriber = AssertSubscriber::with_demand(UNBOUNDED);
//! Stream::range(1, 5)
//!   .unwrap()
//!   .on_item()
//!   .transform(|i| i * i)
//!   .subscribe(subscriber.clone());
//!
//! subscriber.await_completion().assert_items(&[1, 4, 9, 16]);
//! ```
//!
//! Pipelines are observed and transformed through event groups:
//! `on_item()`, `on_failure()`, `on_completion()` and friends each return
//! a small builder scoped to that event. One-to-many transformations pick
//! an explicit composition policy:
//!
//! ```
//! use riptide::prelude::*;
//!
//! let subscriber = AssertSubscriber::with_demand(UNBOUNDED);
//! Stream::from_iter([1i64, 4])
//!   .on_item()
//!   .transform_to_stream(|i| Stream::range(i, i + 2).unwrap())
//!   .concatenate()
//!   .subscribe(subscriber.clone());
//!
//! subscriber.await_completion().assert_items(&[1, 2, 4, 5]);
//! ```

mod demand;
mod emitter;
mod ops;
mod spawn;

pub mod error;
pub mod harness;
pub mod prelude;
pub mod single;
pub mod stream;
pub mod subscriber;
pub mod subscription;

pub use prelude::*;
