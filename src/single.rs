//! Single eventual values.
//!
//! A [`SingleAsync`] resolves to exactly one item or one failure, some
//! time after subscription. Like [`Stream`](crate::Stream) it is cold
//! and single-shot: subscribing consumes the value. There is no demand
//! protocol for at most one item; the subscription handle carries only
//! cancellation.

use std::{
  marker::PhantomData,
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Condvar, Mutex,
  },
  thread,
  time::{Duration, Instant},
};

use crate::{
  demand::DemandGate,
  emitter::{OnceSignal, SingleEmitter},
  error::{Error, Failure},
  ops::Relay,
  spawn::{spawn_failure, spawn_or_reclaim},
  stream::Stream,
  subscriber::{
    BoxSingleSubscriber, BoxSubscriber, SingleGuard, SingleSubscriber,
  },
  subscription::{
    RootSubscription, Subscription, SubscriptionCore, SwitchControl,
  },
};

pub(crate) enum SingleKind<T> {
  Item(T),
  Failed(Failure),
  Emitter(Box<dyn FnOnce(SingleEmitter<T>) + Send + 'static>),
  Pipe(Box<dyn FnOnce(BoxSingleSubscriber<T>) + Send + 'static>),
}

/// A lazy computation of one eventual item.
///
/// # Examples
///
/// ```
/// use riptide::prelude::*;
///
/// let outcome = SingleAsync::item(21)
///   .on_item()
///   .transform(|i| i * 2)
///   .await_indefinitely();
/// assert_eq!(outcome.unwrap(), 42);
/// ```
pub struct SingleAsync<T> {
  kind: SingleKind<T>,
}

impl<T> std::fmt::Debug for SingleAsync<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let kind = match &self.kind {
      SingleKind::Item(_) => "Item",
      SingleKind::Failed(_) => "Failed",
      SingleKind::Emitter(_) => "Emitter",
      SingleKind::Pipe(_) => "Pipe",
    };
    f.debug_struct("SingleAsync").field("kind", &kind).finish()
  }
}

impl<T> SingleAsync<T> {
  fn from_kind(kind: SingleKind<T>) -> Self {
    SingleAsync { kind }
  }

  fn from_pipe(
    pipe: impl FnOnce(BoxSingleSubscriber<T>) + Send + 'static,
  ) -> Self {
    SingleAsync::from_kind(SingleKind::Pipe(Box::new(pipe)))
  }

  /// Resolves immediately to `item`.
  pub fn item(item: T) -> SingleAsync<T> {
    SingleAsync::from_kind(SingleKind::Item(item))
  }

  /// Like [`item`](Self::item), but a missing value is rejected up
  /// front: a no-value outcome must be spelled with an explicit marker
  /// ([`optional`](Self::optional) or [`void_item`](Self::void_item)).
  pub fn try_item(item: Option<T>) -> Result<SingleAsync<T>, Error> {
    match item {
      Some(item) => Ok(SingleAsync::item(item)),
      None => Err(Error::InvalidArgument(
        "a single value cannot be absent; use optional() or void_item()"
          .into(),
      )),
    }
  }

  /// A single that may carry no value, the absence being an ordinary
  /// item.
  pub fn optional(item: Option<T>) -> SingleAsync<Option<T>> {
    SingleAsync::item(item)
  }

  /// The designated empty item. Awaiting it yields `Ok(None)`.
  pub fn void_item() -> SingleAsync<Option<T>> {
    SingleAsync::item(None)
  }

  /// Resolves immediately to `failure`.
  pub fn failure(failure: Failure) -> SingleAsync<T> {
    SingleAsync::from_kind(SingleKind::Failed(failure))
  }

  /// Resolved from outside the pipeline: `callback` runs on its own
  /// thread with a [`SingleEmitter`] and settles the value through
  /// exactly one `complete` or `fail` call.
  pub fn emitter(
    callback: impl FnOnce(SingleEmitter<T>) + Send + 'static,
  ) -> SingleAsync<T> {
    SingleAsync::from_kind(SingleKind::Emitter(Box::new(callback)))
  }
}

impl<T: Send + 'static> SingleAsync<T> {
  /// Attaches `subscriber` and starts resolution. `on_subscribe` is
  /// delivered before this returns.
  pub fn subscribe(self, subscriber: impl SingleSubscriber<T> + 'static) {
    match self.kind {
      SingleKind::Pipe(pipe) => pipe(Box::new(subscriber)),
      SingleKind::Item(item) => {
        let gate = Arc::new(DemandGate::new());
        let mut guard = SingleGuard::new(subscriber);
        guard.subscribed(RootSubscription::new(gate.clone()).into_handle());
        if gate.is_cancelled() {
          guard.cancelled();
          return;
        }
        gate.mark_terminated();
        guard.item(item);
      }
      SingleKind::Failed(failure) => {
        let gate = Arc::new(DemandGate::new());
        let mut guard = SingleGuard::new(subscriber);
        guard.subscribed(RootSubscription::new(gate.clone()).into_handle());
        if gate.is_cancelled() {
          guard.cancelled();
          return;
        }
        gate.mark_terminated();
        guard.fail(failure);
      }
      SingleKind::Emitter(callback) => {
        let cell = OnceSignal::new();
        let gate = Arc::new(DemandGate::new());
        let teardown = {
          let cell = cell.clone();
          move || cell.close()
        };
        let mut guard = SingleGuard::new(subscriber);
        guard.subscribed(
          RootSubscription::with_teardown(gate, teardown).into_handle(),
        );

        let emitter = SingleEmitter::new(cell.clone());
        let callback_thread = thread::Builder::new()
          .name("riptide-emitter".into())
          .spawn(move || callback(emitter));
        if callback_thread.is_err() {
          guard.fail(spawn_failure());
          return;
        }
        let spawned = spawn_or_reclaim(
          "riptide-settle",
          guard,
          move |mut guard| match cell.take() {
            None => guard.cancelled(),
            Some(Ok(item)) => guard.item(item),
            Some(Err(failure)) => guard.fail(failure),
          },
        );
        if let Err(mut guard) = spawned {
          guard.fail(spawn_failure());
        }
      }
    }
  }

  pub fn on_item(self) -> SingleOnItem<T> { SingleOnItem(self) }

  pub fn on_failure(self) -> SingleOnFailure<T> { SingleOnFailure(self) }

  pub fn on_subscription(self) -> SingleOnSubscription<T> {
    SingleOnSubscription(self)
  }

  pub fn on_cancellation(self) -> SingleOnCancellation<T> {
    SingleOnCancellation(self)
  }

  /// Adapts this single into a stream of at most one item followed by
  /// completion. The item honours stream demand: it is held until the
  /// downstream requests.
  pub fn into_stream(self) -> Stream<T> {
    Stream::from_pipe(move |downstream| {
      let core = Arc::new(BridgeCore {
        state: Mutex::new(BridgeState {
          downstream: Some(downstream),
          upstream: None,
          stashed: None,
          requested: false,
          cancelled: false,
        }),
        terminated: AtomicBool::new(false),
      });
      let handle = Subscription::from_core(core.clone());
      // The subscriber may request or cancel from inside on_subscribe,
      // which re-enters the core, so the lock cannot be held here.
      let mut parked = core.state.lock().unwrap().downstream.take();
      if let Some(down) = &mut parked {
        down.on_subscribe(handle);
      }
      {
        let mut state = core.state.lock().unwrap();
        if state.cancelled {
          drop(state);
          if let Some(mut down) = parked {
            down.on_cancellation();
          }
        } else {
          state.downstream = parked;
        }
      }
      self.subscribe(BridgeUp { core });
    })
  }

  /// Blocks the calling thread until resolution. A failure outcome
  /// surfaces as [`Error::Upstream`].
  pub fn await_indefinitely(self) -> Result<T, Error> {
    let cell = WaitCell::new();
    self.subscribe(Waiter { cell: cell.clone() });
    let mut slot = cell.slot.lock().unwrap();
    loop {
      if let Some(outcome) = slot.take() {
        return outcome.map_err(Error::Upstream);
      }
      slot = cell.ready.wait(slot).unwrap();
    }
  }

  /// Blocks until resolution or `timeout`, whichever comes first. The
  /// timeout abandons the wait only; the subscription keeps running.
  pub fn await_at_most(self, timeout: Duration) -> Result<T, Error> {
    let cell = WaitCell::new();
    self.subscribe(Waiter { cell: cell.clone() });
    let deadline = Instant::now() + timeout;
    let mut slot = cell.slot.lock().unwrap();
    loop {
      if let Some(outcome) = slot.take() {
        return outcome.map_err(Error::Upstream);
      }
      let now = Instant::now();
      if now >= deadline {
        return Err(Error::Timeout(timeout));
      }
      let (guard, _) =
        cell.ready.wait_timeout(slot, deadline - now).unwrap();
      slot = guard;
    }
  }
}

pub struct SingleOnItem<T>(SingleAsync<T>);

impl<T: Send + 'static> SingleOnItem<T> {
  /// Runs `f` with the resolved item, payload untouched.
  pub fn invoke(self, f: impl FnOnce(&T) + Send + 'static) -> SingleAsync<T> {
    self.try_invoke(move |item| {
      f(item);
      Ok(())
    })
  }

  /// Like [`invoke`](Self::invoke), but an `Err` turns the resolution
  /// into that failure.
  pub fn try_invoke(
    self,
    f: impl FnOnce(&T) -> Result<(), Failure> + Send + 'static,
  ) -> SingleAsync<T> {
    self.0.observed(SingleHook::Item(Some(Box::new(f))))
  }

  /// Synchronous mapping of the resolved item.
  pub fn transform<U: Send + 'static>(
    self,
    f: impl FnOnce(T) -> U + Send + 'static,
  ) -> SingleAsync<U> {
    self.try_transform(move |item| Ok(f(item)))
  }

  /// Fallible mapping: an `Err` resolves the single with that failure.
  pub fn try_transform<U: Send + 'static>(
    self,
    f: impl FnOnce(T) -> Result<U, Failure> + Send + 'static,
  ) -> SingleAsync<U> {
    let upstream = self.0;
    SingleAsync::from_pipe(move |downstream| {
      upstream.subscribe(SingleMap {
        f: Some(f),
        downstream,
        _marker: PhantomData,
      })
    })
  }

  /// Asynchronous mapping: chains the single produced by `f`.
  pub fn transform_to_single<U: Send + 'static>(
    self,
    f: impl FnOnce(T) -> SingleAsync<U> + Send + 'static,
  ) -> SingleAsync<U> {
    let upstream = self.0;
    SingleAsync::from_pipe(move |downstream| {
      upstream.subscribe(SingleFlat {
        downstream: Some(downstream),
        control: SwitchControl::new(),
        f: Some(Box::new(f)),
      })
    })
  }

  /// Fans the resolved item out into the stream produced by `f`.
  pub fn transform_to_stream<U: Send + 'static>(
    self,
    f: impl FnOnce(T) -> Stream<U> + Send + 'static,
  ) -> Stream<U> {
    let upstream = self.0;
    Stream::from_pipe(move |downstream| {
      upstream.subscribe(SingleToStreamOuter {
        downstream: Some(downstream),
        control: SwitchControl::new(),
        f: Some(Box::new(f)),
      })
    })
  }
}

pub struct SingleOnFailure<T>(SingleAsync<T>);

impl<T: Send + 'static> SingleOnFailure<T> {
  pub fn invoke(
    self,
    f: impl FnOnce(&Failure) + Send + 'static,
  ) -> SingleAsync<T> {
    self.0.observed(SingleHook::Failure(Some(Box::new(f))))
  }

  /// On failure, resolves to `item` instead. The failure is absorbed.
  pub fn recover_with_item(self, item: T) -> SingleAsync<T> {
    self.recover_with_single(move |_| SingleAsync::item(item))
  }

  /// On failure, switches to the single produced by `f`.
  pub fn recover_with_single(
    self,
    f: impl FnOnce(&Failure) -> SingleAsync<T> + Send + 'static,
  ) -> SingleAsync<T> {
    let upstream = self.0;
    SingleAsync::from_pipe(move |downstream| {
      upstream.subscribe(SingleRecover {
        downstream: Some(downstream),
        control: SwitchControl::new(),
        alternative: Some(Box::new(f)),
      })
    })
  }
}

pub struct SingleOnSubscription<T>(SingleAsync<T>);

impl<T: Send + 'static> SingleOnSubscription<T> {
  pub fn invoke(self, f: impl FnOnce() + Send + 'static) -> SingleAsync<T> {
    self.0.observed(SingleHook::Subscription(Some(Box::new(f))))
  }
}

pub struct SingleOnCancellation<T>(SingleAsync<T>);

impl<T: Send + 'static> SingleOnCancellation<T> {
  pub fn invoke(self, f: impl FnOnce() + Send + 'static) -> SingleAsync<T> {
    self.0.observed(SingleHook::Cancellation(Some(Box::new(f))))
  }
}

impl<T: Send + 'static> SingleAsync<T> {
  fn observed(self, hook: SingleHook<T>) -> SingleAsync<T> {
    SingleAsync::from_pipe(move |downstream| {
      self.subscribe(SingleObserve { hook, downstream })
    })
  }
}

enum SingleHook<T> {
  Subscription(Option<Box<dyn FnOnce() + Send>>),
  Item(Option<Box<dyn FnOnce(&T) -> Result<(), Failure> + Send>>),
  Failure(Option<Box<dyn FnOnce(&Failure) + Send>>),
  Cancellation(Option<Box<dyn FnOnce() + Send>>),
}

struct SingleObserve<T, D> {
  hook: SingleHook<T>,
  downstream: D,
}

impl<T, D> SingleSubscriber<T> for SingleObserve<T, D>
where
  T: Send,
  D: SingleSubscriber<T>,
{
  fn on_subscribe(&mut self, subscription: Subscription) {
    if let SingleHook::Subscription(callback) = &mut self.hook {
      if let Some(callback) = callback.take() {
        callback();
      }
    }
    self.downstream.on_subscribe(subscription);
  }

  fn on_item(&mut self, item: T) {
    if let SingleHook::Item(callback) = &mut self.hook {
      if let Some(callback) = callback.take() {
        if let Err(failure) = callback(&item) {
          self.downstream.on_failure(failure);
          return;
        }
      }
    }
    self.downstream.on_item(item);
  }

  fn on_failure(&mut self, failure: Failure) {
    if let SingleHook::Failure(callback) = &mut self.hook {
      if let Some(callback) = callback.take() {
        callback(&failure);
      }
    }
    self.downstream.on_failure(failure);
  }

  fn on_cancellation(&mut self) {
    if let SingleHook::Cancellation(callback) = &mut self.hook {
      if let Some(callback) = callback.take() {
        callback();
      }
    }
    self.downstream.on_cancellation();
  }
}

/// Mapping adapter. The item event is terminal for a single, so a
/// mapping failure needs no upstream cancel.
struct SingleMap<U, F, D> {
  f: Option<F>,
  downstream: D,
  _marker: PhantomData<fn() -> U>,
}

impl<T, U, F, D> SingleSubscriber<T> for SingleMap<U, F, D>
where
  F: FnOnce(T) -> Result<U, Failure> + Send,
  D: SingleSubscriber<U>,
  U: Send,
{
  fn on_subscribe(&mut self, subscription: Subscription) {
    self.downstream.on_subscribe(subscription);
  }

  fn on_item(&mut self, item: T) {
    if let Some(f) = self.f.take() {
      match f(item) {
        Ok(mapped) => self.downstream.on_item(mapped),
        Err(failure) => self.downstream.on_failure(failure),
      }
    }
  }

  fn on_failure(&mut self, failure: Failure) {
    self.downstream.on_failure(failure);
  }

  fn on_cancellation(&mut self) { self.downstream.on_cancellation(); }
}

/// Terminal pass-through attached to a replacement single after a
/// switch (recovery or flat-map).
struct SinglePass<T> {
  downstream: BoxSingleSubscriber<T>,
  control: Arc<SwitchControl>,
}

impl<T: Send> SingleSubscriber<T> for SinglePass<T> {
  fn on_subscribe(&mut self, subscription: Subscription) {
    self.control.attach(subscription);
  }

  fn on_item(&mut self, item: T) {
    self.control.mark_terminated();
    self.downstream.on_item(item);
  }

  fn on_failure(&mut self, failure: Failure) {
    self.control.mark_terminated();
    self.downstream.on_failure(failure);
  }

  fn on_cancellation(&mut self) { self.downstream.on_cancellation(); }
}

struct SingleRecover<T> {
  downstream: Option<BoxSingleSubscriber<T>>,
  control: Arc<SwitchControl>,
  alternative: Option<Box<dyn FnOnce(&Failure) -> SingleAsync<T> + Send>>,
}

impl<T: Send + 'static> SingleSubscriber<T> for SingleRecover<T> {
  fn on_subscribe(&mut self, subscription: Subscription) {
    if let Some(downstream) = &mut self.downstream {
      downstream.on_subscribe(self.control.handle());
    }
    self.control.attach(subscription);
  }

  fn on_item(&mut self, item: T) {
    self.control.mark_terminated();
    if let Some(downstream) = &mut self.downstream {
      downstream.on_item(item);
    }
  }

  fn on_failure(&mut self, failure: Failure) {
    let (Some(downstream), Some(alternative)) =
      (self.downstream.take(), self.alternative.take())
    else {
      return;
    };
    self.control.detach();
    let replacement = alternative(&failure);
    replacement.subscribe(SinglePass { downstream, control: self.control.clone() });
  }

  fn on_cancellation(&mut self) {
    if let Some(downstream) = &mut self.downstream {
      downstream.on_cancellation();
    }
  }
}

struct SingleFlat<T, U> {
  downstream: Option<BoxSingleSubscriber<U>>,
  control: Arc<SwitchControl>,
  f: Option<Box<dyn FnOnce(T) -> SingleAsync<U> + Send>>,
}

impl<T: Send, U: Send + 'static> SingleSubscriber<T> for SingleFlat<T, U> {
  fn on_subscribe(&mut self, subscription: Subscription) {
    if let Some(downstream) = &mut self.downstream {
      downstream.on_subscribe(self.control.handle());
    }
    self.control.attach(subscription);
  }

  fn on_item(&mut self, item: T) {
    let (Some(downstream), Some(f)) = (self.downstream.take(), self.f.take())
    else {
      return;
    };
    self.control.detach();
    f(item).subscribe(SinglePass { downstream, control: self.control.clone() });
  }

  fn on_failure(&mut self, failure: Failure) {
    self.control.mark_terminated();
    if let Some(downstream) = &mut self.downstream {
      downstream.on_failure(failure);
    }
  }

  fn on_cancellation(&mut self) {
    if let Some(downstream) = &mut self.downstream {
      downstream.on_cancellation();
    }
  }
}

/// Outer half of a single-to-stream fan-out: consumes the one upstream
/// item and splices the produced stream in front of the downstream.
struct SingleToStreamOuter<T, U> {
  downstream: Option<BoxSubscriber<U>>,
  control: Arc<SwitchControl>,
  f: Option<Box<dyn FnOnce(T) -> Stream<U> + Send>>,
}

impl<T: Send, U: Send + 'static> SingleSubscriber<T>
  for SingleToStreamOuter<T, U>
{
  fn on_subscribe(&mut self, subscription: Subscription) {
    if let Some(downstream) = &mut self.downstream {
      downstream.on_subscribe(self.control.handle());
    }
    self.control.attach(subscription);
  }

  fn on_item(&mut self, item: T) {
    let (Some(downstream), Some(f)) = (self.downstream.take(), self.f.take())
    else {
      return;
    };
    self.control.detach();
    f(item).subscribe(Relay::new(downstream, self.control.clone()));
  }

  fn on_failure(&mut self, failure: Failure) {
    self.control.mark_terminated();
    if let Some(downstream) = &mut self.downstream {
      downstream.on_failure(failure);
    }
  }

  fn on_cancellation(&mut self) {
    if let Some(downstream) = &mut self.downstream {
      downstream.on_cancellation();
    }
  }
}

struct BridgeState<T> {
  downstream: Option<BoxSubscriber<T>>,
  upstream: Option<Subscription>,
  stashed: Option<T>,
  requested: bool,
  cancelled: bool,
}

/// Demand adapter behind [`SingleAsync::into_stream`]: the resolved
/// item waits here until the stream side requests it.
struct BridgeCore<T> {
  state: Mutex<BridgeState<T>>,
  terminated: AtomicBool,
}

impl<T: Send> BridgeCore<T> {
  /// Takes the downstream out under the lock so terminal delivery runs
  /// without holding it.
  fn deliver(&self, item: T) {
    self.terminated.store(true, Ordering::Release);
    let downstream = self.state.lock().unwrap().downstream.take();
    if let Some(mut downstream) = downstream {
      downstream.on_item(item);
      downstream.on_completion();
    }
  }
}

impl<T: Send> SubscriptionCore for BridgeCore<T> {
  fn request(&self, _n: u64) {
    let ready = {
      let mut state = self.state.lock().unwrap();
      if state.cancelled {
        return;
      }
      state.requested = true;
      state.stashed.take()
    };
    if let Some(item) = ready {
      self.deliver(item);
    }
  }

  fn cancel(&self) {
    let (upstream, downstream) = {
      let mut state = self.state.lock().unwrap();
      if state.cancelled {
        return;
      }
      state.cancelled = true;
      state.stashed = None;
      (state.upstream.take(), state.downstream.take())
    };
    if let Some(upstream) = upstream {
      upstream.cancel();
    }
    if let Some(mut downstream) = downstream {
      downstream.on_cancellation();
    }
  }

  fn is_cancelled(&self) -> bool { self.state.lock().unwrap().cancelled }

  fn is_terminated(&self) -> bool { self.terminated.load(Ordering::Acquire) }
}

struct BridgeUp<T> {
  core: Arc<BridgeCore<T>>,
}

impl<T: Send> SingleSubscriber<T> for BridgeUp<T> {
  fn on_subscribe(&mut self, subscription: Subscription) {
    let mut state = self.core.state.lock().unwrap();
    if state.cancelled {
      drop(state);
      subscription.cancel();
      return;
    }
    state.upstream = Some(subscription);
  }

  fn on_item(&mut self, item: T) {
    let ready = {
      let mut state = self.core.state.lock().unwrap();
      if state.cancelled {
        return;
      }
      state.upstream = None;
      if state.requested {
        true
      } else {
        state.stashed = Some(item);
        return;
      }
    };
    if ready {
      self.core.deliver(item);
    }
  }

  fn on_failure(&mut self, failure: Failure) {
    self.core.terminated.store(true, Ordering::Release);
    let downstream = self.core.state.lock().unwrap().downstream.take();
    if let Some(mut downstream) = downstream {
      downstream.on_failure(failure);
    }
  }

  fn on_cancellation(&mut self) {
    let downstream = self.core.state.lock().unwrap().downstream.take();
    if let Some(mut downstream) = downstream {
      downstream.on_cancellation();
    }
  }
}

/// Terminal slot behind the blocking awaits.
struct WaitCell<T> {
  slot: Mutex<Option<Result<T, Failure>>>,
  ready: Condvar,
}

impl<T> WaitCell<T> {
  fn new() -> Arc<Self> {
    Arc::new(WaitCell { slot: Mutex::new(None), ready: Condvar::new() })
  }
}

struct Waiter<T> {
  cell: Arc<WaitCell<T>>,
}

impl<T: Send> SingleSubscriber<T> for Waiter<T> {
  fn on_subscribe(&mut self, _subscription: Subscription) {}

  fn on_item(&mut self, item: T) {
    *self.cell.slot.lock().unwrap() = Some(Ok(item));
    self.cell.ready.notify_all();
  }

  fn on_failure(&mut self, failure: Failure) {
    *self.cell.slot.lock().unwrap() = Some(Err(failure));
    self.cell.ready.notify_all();
  }

  fn on_cancellation(&mut self) {}
}
