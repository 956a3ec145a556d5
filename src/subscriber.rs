//! Subscriber contracts and the protocol guard.
//!
//! [`Subscriber`] is the consumer side of a [`crate::Stream`];
//! [`SingleSubscriber`] the consumer side of a [`crate::SingleAsync`].
//! The guards enforce the terminal-once rule at the point where events
//! originate: anything arriving after a terminal event or cancellation is
//! discarded there, independently of producer cooperation, and logged as
//! a defect when it indicates one.

use tracing::warn;

use crate::{error::Failure, subscription::Subscription};

/// Consumer of a multi-item stream.
///
/// Events arrive strictly sequentially per subscription: zero or more
/// `on_item` calls followed by exactly one of `on_completion`,
/// `on_failure`, or `on_cancellation`.
pub trait Subscriber<T>: Send {
  fn on_subscribe(&mut self, subscription: Subscription);
  fn on_item(&mut self, item: T);
  fn on_failure(&mut self, failure: Failure);
  fn on_completion(&mut self);
  fn on_cancellation(&mut self);
}

/// Consumer of a single eventual value. `on_item` is terminal.
pub trait SingleSubscriber<T>: Send {
  fn on_subscribe(&mut self, subscription: Subscription);
  fn on_item(&mut self, item: T);
  fn on_failure(&mut self, failure: Failure);
  fn on_cancellation(&mut self);
}

pub type BoxSubscriber<T> = Box<dyn Subscriber<T> + 'static>;
pub type BoxSingleSubscriber<T> = Box<dyn SingleSubscriber<T> + 'static>;

impl<T, S: Subscriber<T> + ?Sized> Subscriber<T> for Box<S> {
  fn on_subscribe(&mut self, subscription: Subscription) {
    (**self).on_subscribe(subscription)
  }

  fn on_item(&mut self, item: T) { (**self).on_item(item) }

  fn on_failure(&mut self, failure: Failure) {
    (**self).on_failure(failure)
  }

  fn on_completion(&mut self) { (**self).on_completion() }

  fn on_cancellation(&mut self) { (**self).on_cancellation() }
}

impl<T, S: SingleSubscriber<T> + ?Sized> SingleSubscriber<T> for Box<S> {
  fn on_subscribe(&mut self, subscription: Subscription) {
    (**self).on_subscribe(subscription)
  }

  fn on_item(&mut self, item: T) { (**self).on_item(item) }

  fn on_failure(&mut self, failure: Failure) {
    (**self).on_failure(failure)
  }

  fn on_cancellation(&mut self) { (**self).on_cancellation() }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
  Active,
  Terminated,
  Cancelled,
}

/// Terminal-once enforcement for a stream subscriber.
///
/// Owned by the single thread that delivers for its subscription, so no
/// locking is needed; serialization is the producer's job and the guard
/// sits exactly at the producer.
pub(crate) struct ProtocolGuard<T> {
  downstream: BoxSubscriber<T>,
  phase: Phase,
}

impl<T> ProtocolGuard<T> {
  pub fn new(downstream: impl Subscriber<T> + 'static) -> Self {
    ProtocolGuard { downstream: Box::new(downstream), phase: Phase::Active }
  }

  pub fn subscribed(&mut self, subscription: Subscription) {
    self.downstream.on_subscribe(subscription);
  }

  pub fn item(&mut self, item: T) {
    match self.phase {
      Phase::Active => self.downstream.on_item(item),
      // Discarded silently: the producer lost the cancellation race.
      Phase::Cancelled => {}
      Phase::Terminated => {
        warn!("protocol violation: item emitted after terminal event");
      }
    }
  }

  pub fn complete(&mut self) {
    match self.phase {
      Phase::Active => {
        self.phase = Phase::Terminated;
        self.downstream.on_completion();
      }
      Phase::Cancelled => {}
      Phase::Terminated => {
        warn!("protocol violation: completion after terminal event");
      }
    }
  }

  pub fn fail(&mut self, failure: Failure) {
    match self.phase {
      Phase::Active => {
        self.phase = Phase::Terminated;
        self.downstream.on_failure(failure);
      }
      Phase::Cancelled => {}
      Phase::Terminated => {
        warn!(
          failure = %failure,
          "protocol violation: failure after terminal event"
        );
      }
    }
  }

  pub fn cancelled(&mut self) {
    if self.phase == Phase::Active {
      self.phase = Phase::Cancelled;
      self.downstream.on_cancellation();
    }
  }
}

/// Terminal-once enforcement for a single-value subscriber.
pub(crate) struct SingleGuard<T> {
  downstream: BoxSingleSubscriber<T>,
  phase: Phase,
}

impl<T> SingleGuard<T> {
  pub fn new(downstream: impl SingleSubscriber<T> + 'static) -> Self {
    SingleGuard { downstream: Box::new(downstream), phase: Phase::Active }
  }

  pub fn subscribed(&mut self, subscription: Subscription) {
    self.downstream.on_subscribe(subscription);
  }

  pub fn item(&mut self, item: T) {
    match self.phase {
      Phase::Active => {
        self.phase = Phase::Terminated;
        self.downstream.on_item(item);
      }
      Phase::Cancelled => {}
      Phase::Terminated => {
        warn!("protocol violation: item emitted after terminal event");
      }
    }
  }

  pub fn fail(&mut self, failure: Failure) {
    match self.phase {
      Phase::Active => {
        self.phase = Phase::Terminated;
        self.downstream.on_failure(failure);
      }
      Phase::Cancelled => {}
      Phase::Terminated => {
        warn!(
          failure = %failure,
          "protocol violation: failure after terminal event"
        );
      }
    }
  }

  pub fn cancelled(&mut self) {
    if self.phase == Phase::Active {
      self.phase = Phase::Cancelled;
      self.downstream.on_cancellation();
    }
  }
}
