//! Operator stages.
//!
//! Operators are a closed set of concrete subscriber adapters composed at
//! construction time: Map ([`map`]), FlatMap with merge/concatenate
//! policies ([`flat_map`]), Recover ([`recover`]), and Observe
//! ([`observe`]). A chain is a value; once subscribed it is never
//! restructured.

pub mod flat_map;
pub mod map;
pub mod observe;
pub mod recover;

use std::sync::Arc;

use crate::{
  error::Failure,
  subscriber::{BoxSubscriber, Subscriber},
  subscription::{Subscription, SwitchControl},
};

/// Pass-through subscriber that plugs a replacement upstream into an
/// existing downstream via a [`SwitchControl`] ledger. Used by failure
/// recovery and the single-to-stream bridges.
pub(crate) struct Relay<T> {
  downstream: BoxSubscriber<T>,
  control: Arc<SwitchControl>,
}

impl<T> Relay<T> {
  pub fn new(
    downstream: BoxSubscriber<T>,
    control: Arc<SwitchControl>,
  ) -> Self {
    Relay { downstream, control }
  }
}

impl<T> Subscriber<T> for Relay<T> {
  fn on_subscribe(&mut self, subscription: Subscription) {
    // The downstream already holds its subscription; the new upstream
    // just picks up the undelivered demand balance.
    self.control.attach(subscription);
  }

  fn on_item(&mut self, item: T) {
    self.control.note_delivered();
    self.downstream.on_item(item);
  }

  fn on_failure(&mut self, failure: Failure) {
    self.control.mark_terminated();
    self.downstream.on_failure(failure);
  }

  fn on_completion(&mut self) {
    self.control.mark_terminated();
    self.downstream.on_completion();
  }

  fn on_cancellation(&mut self) { self.downstream.on_cancellation(); }
}
