//! One-stop import for the public surface.

pub use crate::{
  demand::UNBOUNDED,
  emitter::{SingleEmitter, StreamEmitter},
  error::{Error, Failure},
  harness::{AssertSubscriber, SingleAssertSubscriber},
  ops::flat_map::StreamFlatMap,
  single::{
    SingleAsync, SingleOnCancellation, SingleOnFailure, SingleOnItem,
    SingleOnSubscription,
  },
  stream::{
    Stream, StreamOnCancellation, StreamOnCompletion, StreamOnFailure,
    StreamOnItem, StreamOnRequest, StreamOnSubscription,
  },
  subscriber::{SingleSubscriber, Subscriber},
  subscription::Subscription,
};
