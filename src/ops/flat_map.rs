//! One-to-many transformation with merge and concatenate policies.
//!
//! The stage runs as a dedicated worker thread consuming a message queue.
//! Outer and inner subscribers, as well as the downstream subscription
//! handle, only ever send messages; all demand accounting and delivery
//! happens on the worker. That keeps the stage lock-free on the event
//! path and immune to re-entrancy from downstream callbacks.

use std::{
  collections::VecDeque,
  ops::ControlFlow,
  sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::{self, Receiver, Sender},
    Arc, Mutex,
  },
};

use smallvec::SmallVec;

use crate::{
  demand::UNBOUNDED,
  error::Failure,
  spawn::{spawn_failure, spawn_or_reclaim},
  stream::Stream,
  subscriber::{BoxSubscriber, Subscriber},
  subscription::{Subscription, SubscriptionCore},
};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Composition {
  /// Inner streams run concurrently; items interleave in arrival order.
  Merge,
  /// One inner at a time, in outer order.
  Concatenate,
}

/// Builder returned by [`Stream::on_item`]'s `transform_to_stream`.
/// Nothing runs until one of the terminal methods picks a composition
/// policy.
pub struct StreamFlatMap<T, U> {
  upstream: Stream<T>,
  f: Box<dyn FnMut(T) -> Stream<U> + Send + 'static>,
  collect: bool,
}

impl<T: Send + 'static, U: Send + 'static> StreamFlatMap<T, U> {
  pub(crate) fn new(
    upstream: Stream<T>,
    f: Box<dyn FnMut(T) -> Stream<U> + Send + 'static>,
  ) -> Self {
    StreamFlatMap { upstream, f, collect: false }
  }

  /// Defer failure propagation: failed sources are set aside while the
  /// remaining sources drain, then all collected failures terminate the
  /// stream as one composite failure.
  pub fn collect_failures(mut self) -> Self {
    self.collect = true;
    self
  }

  pub fn merge(self) -> Stream<U> {
    self.compose(Composition::Merge)
  }

  pub fn concatenate(self) -> Stream<U> {
    self.compose(Composition::Concatenate)
  }

  fn compose(self, mode: Composition) -> Stream<U> {
    let StreamFlatMap { upstream, f, collect } = self;
    Stream::from_pipe(move |mut downstream: BoxSubscriber<U>| {
      let (tx, rx) = mpsc::channel();
      let terminated = Arc::new(AtomicBool::new(false));
      let cancelled = Arc::new(AtomicBool::new(false));
      let handle = Subscription::from_core(Arc::new(StageSubscription {
        tx: Mutex::new(tx.clone()),
        cancelled: cancelled.clone(),
        terminated: terminated.clone(),
      }));
      // Delivered on the subscribing thread; any request or cancel it
      // triggers just queues a message for the worker.
      downstream.on_subscribe(handle);
      let worker = Worker {
        downstream,
        rx,
        tx,
        mode,
        collect,
        terminated,
        cancelled,
        pool: 0,
        outer: None,
        outer_done: false,
        next_id: 0,
        inners: SmallVec::new(),
        queue: VecDeque::new(),
        failures: SmallVec::new(),
      };
      let spawned = spawn_or_reclaim(
        "riptide-flat-map",
        worker,
        move |worker| worker.run(upstream, f),
      );
      if let Err(mut worker) = spawned {
        worker.terminated.store(true, Ordering::Release);
        worker.downstream.on_failure(spawn_failure());
      }
    })
  }
}

enum StageMsg<U> {
  OuterSubscribe(Subscription),
  OuterItem(Stream<U>),
  OuterFailure(Failure),
  OuterComplete,
  InnerSubscribe(u64, Subscription),
  InnerItem(u64, U),
  InnerFailure(u64, Failure),
  InnerComplete(u64),
  Request(u64),
  Cancel,
}

/// Subscription handle for the downstream: control signals become
/// messages on the worker queue.
struct StageSubscription<U> {
  tx: Mutex<Sender<StageMsg<U>>>,
  /// Shared with the worker, which consults it before every delivery.
  cancelled: Arc<AtomicBool>,
  terminated: Arc<AtomicBool>,
}

impl<U: Send> SubscriptionCore for StageSubscription<U> {
  fn request(&self, n: u64) {
    let _ = self.tx.lock().unwrap().send(StageMsg::Request(n));
  }

  fn cancel(&self) {
    if !self.cancelled.swap(true, Ordering::AcqRel) {
      let _ = self.tx.lock().unwrap().send(StageMsg::Cancel);
    }
  }

  fn is_cancelled(&self) -> bool {
    self.cancelled.load(Ordering::Acquire)
  }

  fn is_terminated(&self) -> bool {
    self.terminated.load(Ordering::Acquire)
  }
}

/// Applies the mapping function upstream-side so the worker only ever
/// sees ready inner streams.
struct OuterSubscriber<U, F> {
  tx: Sender<StageMsg<U>>,
  f: F,
}

impl<T, U, F> Subscriber<T> for OuterSubscriber<U, F>
where
  T: Send,
  U: Send,
  F: FnMut(T) -> Stream<U> + Send,
{
  fn on_subscribe(&mut self, subscription: Subscription) {
    let _ = self.tx.send(StageMsg::OuterSubscribe(subscription));
  }

  fn on_item(&mut self, item: T) {
    let inner = (self.f)(item);
    let _ = self.tx.send(StageMsg::OuterItem(inner));
  }

  fn on_failure(&mut self, failure: Failure) {
    let _ = self.tx.send(StageMsg::OuterFailure(failure));
  }

  fn on_completion(&mut self) {
    let _ = self.tx.send(StageMsg::OuterComplete);
  }

  fn on_cancellation(&mut self) {}
}

struct InnerSubscriber<U> {
  id: u64,
  tx: Sender<StageMsg<U>>,
}

impl<U: Send> Subscriber<U> for InnerSubscriber<U> {
  fn on_subscribe(&mut self, subscription: Subscription) {
    let _ = self.tx.send(StageMsg::InnerSubscribe(self.id, subscription));
  }

  fn on_item(&mut self, item: U) {
    let _ = self.tx.send(StageMsg::InnerItem(self.id, item));
  }

  fn on_failure(&mut self, failure: Failure) {
    let _ = self.tx.send(StageMsg::InnerFailure(self.id, failure));
  }

  fn on_completion(&mut self) {
    let _ = self.tx.send(StageMsg::InnerComplete(self.id));
  }

  fn on_cancellation(&mut self) {}
}

struct InnerEntry {
  id: u64,
  subscription: Option<Subscription>,
  /// Demand credits handed to this inner but not yet consumed by
  /// deliveries. Reclaimed into the pool when the inner terminates.
  granted: u64,
}

struct Worker<U> {
  downstream: BoxSubscriber<U>,
  rx: Receiver<StageMsg<U>>,
  tx: Sender<StageMsg<U>>,
  mode: Composition,
  collect: bool,
  terminated: Arc<AtomicBool>,
  cancelled: Arc<AtomicBool>,
  /// Downstream demand not yet distributed to any inner.
  pool: u64,
  outer: Option<Subscription>,
  outer_done: bool,
  next_id: u64,
  inners: SmallVec<[InnerEntry; 4]>,
  queue: VecDeque<Stream<U>>,
  failures: SmallVec<[Failure; 1]>,
}

impl<U: Send + 'static> Worker<U> {
  fn run<T, F>(mut self, upstream: Stream<T>, f: F)
  where
    T: Send + 'static,
    F: FnMut(T) -> Stream<U> + Send + 'static,
  {
    upstream.subscribe(OuterSubscriber { tx: self.tx.clone(), f });
    while let Ok(msg) = self.rx.recv() {
      if self.handle(msg).is_break() {
        break;
      }
    }
  }

  fn handle(&mut self, msg: StageMsg<U>) -> ControlFlow<()> {
    // Cancellation wins over anything still queued: items and terminals
    // buffered behind the cancel are dropped, only the cancellation
    // event reaches the downstream.
    if self.cancelled.load(Ordering::Acquire) {
      self.cancel_all();
      self.downstream.on_cancellation();
      return ControlFlow::Break(());
    }
    match msg {
      StageMsg::OuterSubscribe(subscription) => {
        match self.mode {
          // Merge runs every inner the outer can produce.
          Composition::Merge => subscription.request_unchecked(UNBOUNDED),
          Composition::Concatenate => subscription.request_unchecked(1),
        }
        self.outer = Some(subscription);
        ControlFlow::Continue(())
      }
      StageMsg::OuterItem(inner) => {
        match self.mode {
          Composition::Merge => self.start_inner(inner),
          Composition::Concatenate => {
            if self.inners.is_empty() {
              self.start_inner(inner);
            } else {
              self.queue.push_back(inner);
            }
          }
        }
        ControlFlow::Continue(())
      }
      StageMsg::OuterFailure(failure) => {
        if self.collect {
          self.failures.push(failure);
          self.outer_done = true;
          self.outer = None;
          self.finish_if_drained()
        } else {
          self.fail_now(failure)
        }
      }
      StageMsg::OuterComplete => {
        self.outer_done = true;
        self.outer = None;
        self.finish_if_drained()
      }
      StageMsg::InnerSubscribe(id, subscription) => {
        if let Some(entry) =
          self.inners.iter_mut().find(|entry| entry.id == id)
        {
          entry.subscription = Some(subscription);
        }
        self.pump();
        ControlFlow::Continue(())
      }
      StageMsg::InnerItem(id, item) => {
        if let Some(entry) =
          self.inners.iter_mut().find(|entry| entry.id == id)
        {
          if entry.granted != UNBOUNDED {
            entry.granted = entry.granted.saturating_sub(1);
          }
        }
        self.downstream.on_item(item);
        self.pump();
        ControlFlow::Continue(())
      }
      StageMsg::InnerFailure(id, failure) => {
        if self.collect {
          self.failures.push(failure);
          self.retire_inner(id)
        } else {
          self.fail_now(failure)
        }
      }
      StageMsg::InnerComplete(id) => self.retire_inner(id),
      StageMsg::Request(n) => {
        self.pool = if n == UNBOUNDED || self.pool == UNBOUNDED {
          UNBOUNDED
        } else {
          self.pool.saturating_add(n)
        };
        self.pump();
        ControlFlow::Continue(())
      }
      // The flag check above already delivered the cancellation; this
      // message only exists to wake the worker when the queue is idle.
      StageMsg::Cancel => ControlFlow::Break(()),
    }
  }

  fn start_inner(&mut self, inner: Stream<U>) {
    let id = self.next_id;
    self.next_id += 1;
    self.inners.push(InnerEntry { id, subscription: None, granted: 0 });
    inner.subscribe(InnerSubscriber { id, tx: self.tx.clone() });
  }

  /// Removes a terminated inner, reclaims its unused credits, and moves
  /// on: the next queued inner for concatenation, otherwise a completion
  /// check.
  fn retire_inner(&mut self, id: u64) -> ControlFlow<()> {
    if let Some(index) =
      self.inners.iter().position(|entry| entry.id == id)
    {
      let entry = self.inners.remove(index);
      if self.pool != UNBOUNDED && entry.granted != UNBOUNDED {
        self.pool = self.pool.saturating_add(entry.granted);
      }
    }
    if self.mode == Composition::Concatenate && self.inners.is_empty() {
      if let Some(next) = self.queue.pop_front() {
        self.start_inner(next);
      } else if !self.outer_done {
        if let Some(outer) = &self.outer {
          outer.request_unchecked(1);
        }
      }
    }
    let flow = self.finish_if_drained();
    self.pump();
    flow
  }

  /// Distributes pooled downstream demand to inners. Merge hands out one
  /// credit per starved inner per round; concatenation gives the single
  /// active inner everything.
  fn pump(&mut self) {
    if self.pool == 0 {
      return;
    }
    if self.pool == UNBOUNDED {
      for entry in &mut self.inners {
        if entry.granted != UNBOUNDED {
          if let Some(subscription) = &entry.subscription {
            entry.granted = UNBOUNDED;
            subscription.request_unchecked(UNBOUNDED);
          }
        }
      }
      return;
    }
    match self.mode {
      Composition::Merge => {
        loop {
          let mut handed_out = false;
          for entry in &mut self.inners {
            if self.pool == 0 {
              return;
            }
            if entry.granted == 0 {
              if let Some(subscription) = &entry.subscription {
                entry.granted = 1;
                self.pool -= 1;
                handed_out = true;
                subscription.request_unchecked(1);
              }
            }
          }
          if !handed_out {
            return;
          }
        }
      }
      Composition::Concatenate => {
        if let Some(entry) = self.inners.first_mut() {
          if let Some(subscription) = &entry.subscription {
            let grant = self.pool;
            entry.granted = entry.granted.saturating_add(grant);
            self.pool = 0;
            subscription.request_unchecked(grant);
          }
        }
      }
    }
  }

  fn finish_if_drained(&mut self) -> ControlFlow<()> {
    if !self.outer_done || !self.inners.is_empty() || !self.queue.is_empty()
    {
      return ControlFlow::Continue(());
    }
    self.terminated.store(true, Ordering::Release);
    if self.failures.is_empty() {
      self.downstream.on_completion();
    } else {
      let collected = std::mem::take(&mut self.failures);
      self.downstream.on_failure(Failure::composite(collected.into_vec()));
    }
    ControlFlow::Break(())
  }

  fn fail_now(&mut self, failure: Failure) -> ControlFlow<()> {
    self.cancel_all();
    self.terminated.store(true, Ordering::Release);
    self.downstream.on_failure(failure);
    ControlFlow::Break(())
  }

  fn cancel_all(&mut self) {
    if let Some(outer) = self.outer.take() {
      outer.cancel();
    }
    for entry in self.inners.drain(..) {
      if let Some(subscription) = entry.subscription {
        subscription.cancel();
      }
    }
    self.queue.clear();
  }
}
