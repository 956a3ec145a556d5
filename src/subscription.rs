//! The live binding between a producer and one subscriber.
//!
//! A [`Subscription`] is a cloneable handle carrying the two upstream
//! control signals: demand (`request`) and cancellation (`cancel`). Data
//! flows strictly downstream through subscribers; control flows strictly
//! upstream through this handle.

use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc, Mutex,
};

use crate::{
  demand::DemandGate,
  error::Error,
};

/// Behaviour behind a [`Subscription`] handle. Root subscriptions bind a
/// demand gate; operator stages install their own cores to intercept the
/// control path.
pub(crate) trait SubscriptionCore: Send + Sync {
  fn request(&self, n: u64);
  fn cancel(&self);
  fn is_cancelled(&self) -> bool;
  fn is_terminated(&self) -> bool;
}

/// Handle to the live producer/subscriber binding.
#[derive(Clone)]
pub struct Subscription {
  core: Arc<dyn SubscriptionCore>,
}

impl Subscription {
  pub(crate) fn from_core(core: Arc<dyn SubscriptionCore>) -> Self {
    Subscription { core }
  }

  /// Grants the producer permission to emit `n` more items.
  ///
  /// Only positive demand is valid; pass [`crate::demand::UNBOUNDED`] to
  /// lift the limit. Requests made after a terminal event are ignored.
  pub fn request(&self, n: u64) -> Result<(), Error> {
    if n == 0 {
      return Err(Error::InvalidDemand { requested: n });
    }
    if !self.core.is_terminated() {
      self.core.request(n);
    }
    Ok(())
  }

  /// Internal demand propagation; validity is guaranteed by the caller.
  pub(crate) fn request_unchecked(&self, n: u64) {
    if n > 0 && !self.core.is_terminated() {
      self.core.request(n);
    }
  }

  /// Cancels the subscription. Idempotent; a cancelled producer stops at
  /// its next scheduling point and anything still in flight is discarded
  /// by the protocol layer.
  pub fn cancel(&self) { self.core.cancel(); }

  pub fn is_cancelled(&self) -> bool { self.core.is_cancelled() }
}

impl std::fmt::Debug for Subscription {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Subscription")
      .field("cancelled", &self.is_cancelled())
      .finish()
  }
}

/// Root core: a demand gate plus a one-shot teardown hook run on the
/// first cancel (closing mailboxes, waking parked producers).
pub(crate) struct RootSubscription {
  gate: Arc<DemandGate>,
  teardown: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl RootSubscription {
  pub fn new(gate: Arc<DemandGate>) -> Self {
    RootSubscription { gate, teardown: Mutex::new(None) }
  }

  pub fn with_teardown(
    gate: Arc<DemandGate>,
    teardown: impl FnOnce() + Send + 'static,
  ) -> Self {
    RootSubscription {
      gate,
      teardown: Mutex::new(Some(Box::new(teardown))),
    }
  }

  pub fn into_handle(self) -> Subscription {
    Subscription::from_core(Arc::new(self))
  }
}

impl SubscriptionCore for RootSubscription {
  fn request(&self, n: u64) { self.gate.add(n); }

  fn cancel(&self) {
    if self.gate.cancel() {
      if let Some(teardown) = self.teardown.lock().unwrap().take() {
        teardown();
      }
    }
  }

  fn is_cancelled(&self) -> bool { self.gate.is_cancelled() }

  fn is_terminated(&self) -> bool { self.gate.is_terminated() }
}

/// Core that observes `request` signals on their way upstream. Installed
/// by the `on_request()` lifecycle group.
pub(crate) struct RequestHooked {
  parent: Subscription,
  hook: Mutex<Box<dyn FnMut(u64) + Send>>,
}

impl RequestHooked {
  pub fn wrap(
    parent: Subscription,
    hook: impl FnMut(u64) + Send + 'static,
  ) -> Subscription {
    Subscription::from_core(Arc::new(RequestHooked {
      parent,
      hook: Mutex::new(Box::new(hook)),
    }))
  }
}

impl SubscriptionCore for RequestHooked {
  fn request(&self, n: u64) {
    (self.hook.lock().unwrap())(n);
    self.parent.core.request(n);
  }

  fn cancel(&self) { self.parent.cancel(); }

  fn is_cancelled(&self) -> bool { self.parent.is_cancelled() }

  fn is_terminated(&self) -> bool { self.parent.core.is_terminated() }
}

struct SwitchState {
  upstream: Option<Subscription>,
  /// Demand granted downstream but not yet delivered. Transfers to the
  /// next upstream on a switch.
  outstanding: u64,
  cancelled: bool,
}

/// A demand ledger that survives replacing its upstream, used wherever a
/// stage starts delivering from one producer and later switches to
/// another (failure recovery, single-to-stream bridging).
///
/// Requests arriving before any upstream is attached are buffered; a
/// newly attached upstream immediately receives the undelivered balance.
pub(crate) struct SwitchControl {
  state: Mutex<SwitchState>,
  terminated: AtomicBool,
}

impl SwitchControl {
  pub fn new() -> Arc<Self> {
    Arc::new(SwitchControl {
      state: Mutex::new(SwitchState {
        upstream: None,
        outstanding: 0,
        cancelled: false,
      }),
      terminated: AtomicBool::new(false),
    })
  }

  /// Attaches (or replaces) the upstream and forwards the undelivered
  /// demand balance to it.
  pub fn attach(&self, subscription: Subscription) {
    let backlog = {
      let mut state = self.state.lock().unwrap();
      if state.cancelled {
        drop(state);
        subscription.cancel();
        return;
      }
      state.upstream = Some(subscription.clone());
      state.outstanding
    };
    subscription.request_unchecked(backlog);
  }

  /// Drops the current upstream without forwarding anything, ahead of a
  /// switch.
  pub fn detach(&self) { self.state.lock().unwrap().upstream = None; }

  /// Records one downstream delivery against the ledger.
  pub fn note_delivered(&self) {
    let mut state = self.state.lock().unwrap();
    if state.outstanding != crate::demand::UNBOUNDED && state.outstanding > 0
    {
      state.outstanding -= 1;
    }
  }

  pub fn mark_terminated(&self) {
    self.terminated.store(true, Ordering::Release);
  }

  pub fn handle(self: &Arc<Self>) -> Subscription {
    Subscription::from_core(self.clone())
  }
}

impl SubscriptionCore for SwitchControl {
  fn request(&self, n: u64) {
    let upstream = {
      let mut state = self.state.lock().unwrap();
      if state.cancelled {
        return;
      }
      state.outstanding = state.outstanding.saturating_add(n);
      state.upstream.clone()
    };
    if let Some(upstream) = upstream {
      upstream.request_unchecked(n);
    }
  }

  fn cancel(&self) {
    let upstream = {
      let mut state = self.state.lock().unwrap();
      if state.cancelled {
        return;
      }
      state.cancelled = true;
      state.upstream.take()
    };
    if let Some(upstream) = upstream {
      upstream.cancel();
    }
  }

  fn is_cancelled(&self) -> bool { self.state.lock().unwrap().cancelled }

  fn is_terminated(&self) -> bool { self.terminated.load(Ordering::Acquire) }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::AtomicU64;

  use super::*;
  use crate::demand::UNBOUNDED;

  #[test]
  fn zero_demand_is_rejected() {
    let gate = Arc::new(DemandGate::new());
    let subscription = RootSubscription::new(gate).into_handle();
    let err = subscription.request(0).unwrap_err();
    assert!(matches!(err, Error::InvalidDemand { requested: 0 }));
    subscription.request(1).unwrap();
  }

  #[test]
  fn cancel_is_idempotent_and_runs_teardown_once() {
    let count = Arc::new(AtomicU64::new(0));
    let gate = Arc::new(DemandGate::new());
    let teardown_count = count.clone();
    let subscription = RootSubscription::with_teardown(gate, move || {
      teardown_count.fetch_add(1, Ordering::SeqCst);
    })
    .into_handle();

    subscription.cancel();
    subscription.cancel();
    assert!(subscription.is_cancelled());
    assert_eq!(count.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn request_hook_sees_each_request() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let gate = Arc::new(DemandGate::new());
    let parent = RootSubscription::new(gate).into_handle();
    let record = seen.clone();
    let hooked = RequestHooked::wrap(parent, move |n| {
      record.lock().unwrap().push(n);
    });

    hooked.request(3).unwrap();
    hooked.request(UNBOUNDED).unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![3, UNBOUNDED]);
  }

  #[test]
  fn switch_control_transfers_undelivered_demand() {
    let control = SwitchControl::new();
    let handle = control.handle();
    handle.request(5).unwrap();

    let gate = Arc::new(DemandGate::new());
    let first = RootSubscription::new(gate.clone()).into_handle();
    control.attach(first);
    // Two of five delivered before the switch.
    control.note_delivered();
    control.note_delivered();

    let alt_gate = Arc::new(DemandGate::new());
    control.detach();
    control.attach(RootSubscription::new(alt_gate.clone()).into_handle());
    // The replacement sees exactly the three undelivered units.
    assert_eq!(alt_gate.claim(), crate::demand::Claim::Granted);
    assert_eq!(alt_gate.claim(), crate::demand::Claim::Granted);
    assert_eq!(alt_gate.claim(), crate::demand::Claim::Granted);
  }

  #[test]
  fn switch_control_cancel_reaches_upstream() {
    let control = SwitchControl::new();
    let gate = Arc::new(DemandGate::new());
    control.attach(RootSubscription::new(gate.clone()).into_handle());
    control.handle().cancel();
    assert!(gate.is_cancelled());
  }
}
