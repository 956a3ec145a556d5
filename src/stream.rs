//! Multi-item reactive streams.
//!
//! A [`Stream`] is a cold description of zero or more items followed by
//! exactly one terminal event. Nothing runs until [`Stream::subscribe`];
//! subscribing consumes the value, so every pipeline is single-shot by
//! construction. Items flow only against previously requested demand.

pub(crate) mod create;
pub(crate) mod drive;

use crate::{
  emitter::StreamEmitter,
  error::Failure,
  ops::{
    flat_map::StreamFlatMap,
    map::MapSubscriber,
    observe::{Hook, ObserveSubscriber},
    recover::RecoverSubscriber,
  },
  single::SingleAsync,
  subscriber::{BoxSubscriber, Subscriber},
};

/// How a stream produces its items. Sources carry a creation-strategy
/// tag interpreted by one drive loop; operator stages use the `Pipe`
/// escape hatch to splice an adapter in front of an upstream.
pub(crate) enum StreamKind<T> {
  Empty,
  Failed(Failure),
  Iter(Box<dyn Iterator<Item = T> + Send + 'static>),
  Generator(Box<dyn FnMut() -> Option<T> + Send + 'static>),
  Emitter(Box<dyn FnOnce(StreamEmitter<T>) + Send + 'static>),
  Pipe(Box<dyn FnOnce(BoxSubscriber<T>) + Send + 'static>),
}

/// A lazy, demand-driven sequence of items ending in completion,
/// failure, or cancellation.
///
/// # Examples
///
/// ```
/// use riptide::prelude::*;
///
/// let subscriber = AssertSubscriber::with_demand(UNBOUNDED);
/// Stream::from_iter([1, 2, 3])
///   .on_item()
///   .transform(|i| i * 10)
///   .subscribe(subscriber.clone());
///
/// subscriber.await_completion().assert_items(&[10, 20, 30]);
/// ```
pub struct Stream<T> {
  kind: StreamKind<T>,
}

impl<T> std::fmt::Debug for Stream<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let kind = match &self.kind {
      StreamKind::Empty => "Empty",
      StreamKind::Failed(_) => "Failed",
      StreamKind::Iter(_) => "Iter",
      StreamKind::Generator(_) => "Generator",
      StreamKind::Emitter(_) => "Emitter",
      StreamKind::Pipe(_) => "Pipe",
    };
    f.debug_struct("Stream").field("kind", &kind).finish()
  }
}

impl<T> Stream<T> {
  pub(crate) fn from_kind(kind: StreamKind<T>) -> Self {
    Stream { kind }
  }

  pub(crate) fn from_pipe(
    pipe: impl FnOnce(BoxSubscriber<T>) + Send + 'static,
  ) -> Self {
    Stream { kind: StreamKind::Pipe(Box::new(pipe)) }
  }
}

impl<T: Send + 'static> Stream<T> {
  /// Attaches `subscriber` and starts the pipeline.
  ///
  /// `on_subscribe` is delivered before this returns; items follow on
  /// the producer's thread, strictly bounded by requested demand.
  pub fn subscribe(self, subscriber: impl Subscriber<T> + 'static) {
    match self.kind {
      StreamKind::Pipe(pipe) => pipe(Box::new(subscriber)),
      kind => drive::start(kind, Box::new(subscriber)),
    }
  }

  /// Item-event group: observation and transformation of items.
  pub fn on_item(self) -> StreamOnItem<T> { StreamOnItem(self) }

  /// Failure-event group: observation and recovery.
  pub fn on_failure(self) -> StreamOnFailure<T> { StreamOnFailure(self) }

  pub fn on_subscription(self) -> StreamOnSubscription<T> {
    StreamOnSubscription(self)
  }

  pub fn on_completion(self) -> StreamOnCompletion<T> {
    StreamOnCompletion(self)
  }

  pub fn on_cancellation(self) -> StreamOnCancellation<T> {
    StreamOnCancellation(self)
  }

  /// Request-signal group: observes demand on its way upstream.
  pub fn on_request(self) -> StreamOnRequest<T> { StreamOnRequest(self) }

  fn observed(self, hook: Hook<T>) -> Stream<T> {
    Stream::from_pipe(move |downstream| {
      self.subscribe(ObserveSubscriber::new(hook, downstream))
    })
  }
}

pub struct StreamOnItem<T>(Stream<T>);

impl<T: Send + 'static> StreamOnItem<T> {
  /// Runs `f` for every item passing this point, payload untouched.
  pub fn invoke(self, mut f: impl FnMut(&T) + Send + 'static) -> Stream<T> {
    self.0.observed(Hook::Item(Box::new(move |item| {
      f(item);
      Ok(())
    })))
  }

  /// Like [`invoke`](Self::invoke), but an `Err` cancels the upstream
  /// and terminates the downstream with that failure.
  pub fn try_invoke(
    self,
    f: impl FnMut(&T) -> Result<(), Failure> + Send + 'static,
  ) -> Stream<T> {
    self.0.observed(Hook::Item(Box::new(f)))
  }

  /// Synchronous one-to-one mapping.
  ///
  /// # Examples
  ///
  /// ```
  /// use riptide::prelude::*;
  ///
  /// let subscriber = AssertSubscriber::with_demand(UNBOUNDED);
  /// Stream::from_iter(["a", "bb"])
  ///   .on_item()
  ///   .transform(|s| s.len())
  ///   .subscribe(subscriber.clone());
  /// subscriber.await_completion().assert_items(&[1, 2]);
  /// ```
  pub fn transform<U: Send + 'static>(
    self,
    mut f: impl FnMut(T) -> U + Send + 'static,
  ) -> Stream<U> {
    self.try_transform(move |item| Ok(f(item)))
  }

  /// Fallible mapping: an `Err` replaces the item with a terminal
  /// failure and cancels the upstream.
  pub fn try_transform<U: Send + 'static>(
    self,
    f: impl FnMut(T) -> Result<U, Failure> + Send + 'static,
  ) -> Stream<U> {
    let upstream = self.0;
    Stream::from_pipe(move |downstream| {
      upstream.subscribe(MapSubscriber::new(f, downstream))
    })
  }

  /// One-to-many mapping. The returned builder picks the composition
  /// policy: [`merge`](StreamFlatMap::merge) interleaves inners run
  /// concurrently, [`concatenate`](StreamFlatMap::concatenate) drains
  /// them one at a time in upstream order.
  pub fn transform_to_stream<U: Send + 'static>(
    self,
    f: impl FnMut(T) -> Stream<U> + Send + 'static,
  ) -> StreamFlatMap<T, U> {
    StreamFlatMap::new(self.0, Box::new(f))
  }

  /// One-to-one asynchronous mapping through a [`SingleAsync`] per item.
  pub fn transform_to_single<U: Send + 'static>(
    self,
    mut f: impl FnMut(T) -> SingleAsync<U> + Send + 'static,
  ) -> StreamFlatMap<T, U> {
    StreamFlatMap::new(self.0, Box::new(move |item| f(item).into_stream()))
  }
}

pub struct StreamOnFailure<T>(Stream<T>);

impl<T: Send + 'static> StreamOnFailure<T> {
  pub fn invoke(
    self,
    f: impl FnMut(&Failure) + Send + 'static,
  ) -> Stream<T> {
    self.0.observed(Hook::Failure(Box::new(f)))
  }

  /// On failure, switches to the stream produced by `f`. The downstream
  /// never sees the original failure; its undelivered demand transfers
  /// to the replacement.
  pub fn recover_with_stream(
    self,
    f: impl FnOnce(&Failure) -> Stream<T> + Send + 'static,
  ) -> Stream<T> {
    let upstream = self.0;
    Stream::from_pipe(move |downstream| {
      upstream.subscribe(RecoverSubscriber::new(downstream, Box::new(f)))
    })
  }

  /// On failure, emits `item` and completes.
  pub fn recover_with_item(self, item: T) -> Stream<T> {
    self.recover_with_stream(move |_| Stream::from_iter(std::iter::once(item)))
  }
}

pub struct StreamOnSubscription<T>(Stream<T>);

impl<T: Send + 'static> StreamOnSubscription<T> {
  pub fn invoke(self, f: impl FnMut() + Send + 'static) -> Stream<T> {
    self.0.observed(Hook::Subscription(Box::new(f)))
  }
}

pub struct StreamOnCompletion<T>(Stream<T>);

impl<T: Send + 'static> StreamOnCompletion<T> {
  pub fn invoke(self, f: impl FnMut() + Send + 'static) -> Stream<T> {
    self.0.observed(Hook::Completion(Box::new(f)))
  }
}

pub struct StreamOnCancellation<T>(Stream<T>);

impl<T: Send + 'static> StreamOnCancellation<T> {
  pub fn invoke(self, f: impl FnMut() + Send + 'static) -> Stream<T> {
    self.0.observed(Hook::Cancellation(Box::new(f)))
  }
}

pub struct StreamOnRequest<T>(Stream<T>);

impl<T: Send + 'static> StreamOnRequest<T> {
  /// Runs `f` with each demand amount on its way upstream.
  pub fn invoke(self, f: impl FnMut(u64) + Send + 'static) -> Stream<T> {
    self.0.observed(Hook::Request(Some(Box::new(f))))
  }
}
