//! The demand and backpressure controller.
//!
//! Every root subscription owns one [`DemandGate`]: a saturating,
//! non-negative counter of outstanding demand plus the cancelled and
//! terminated flags. Producers park on the gate when demand reaches zero
//! and are woken by `request` and `cancel`; emission claims exactly one
//! unit per item, so a producer can never outrun cumulative demand.

use std::sync::{Condvar, Mutex};

/// The unbounded-demand sentinel. The demand counter clamps here and a
/// claim at this level does not decrement.
pub const UNBOUNDED: u64 = u64::MAX;

/// Outcome of a producer's claim for one unit of demand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Claim {
  /// One unit of demand was claimed; emit exactly one item.
  Granted,
  /// The subscription was cancelled while waiting; stop producing.
  Cancelled,
}

#[derive(Default)]
struct GateState {
  demand: u64,
  cancelled: bool,
  terminated: bool,
}

#[derive(Default)]
pub(crate) struct DemandGate {
  state: Mutex<GateState>,
  wakeup: Condvar,
}

impl DemandGate {
  pub fn new() -> Self { Self::default() }

  /// Adds demand, clamped at [`UNBOUNDED`]. Ignored once terminal.
  pub fn add(&self, n: u64) {
    let mut state = self.state.lock().unwrap();
    if state.cancelled || state.terminated {
      return;
    }
    state.demand = state.demand.saturating_add(n);
    self.wakeup.notify_all();
  }

  /// Marks the gate cancelled. Returns `true` on the first call so the
  /// caller can run one-shot teardown; later calls are no-ops.
  pub fn cancel(&self) -> bool {
    let mut state = self.state.lock().unwrap();
    if state.cancelled {
      return false;
    }
    state.cancelled = true;
    self.wakeup.notify_all();
    true
  }

  /// Marks the gate terminal so later `request` calls are ignored.
  pub fn mark_terminated(&self) {
    self.state.lock().unwrap().terminated = true;
  }

  pub fn is_cancelled(&self) -> bool { self.state.lock().unwrap().cancelled }

  pub fn is_terminated(&self) -> bool {
    self.state.lock().unwrap().terminated
  }

  /// Blocks until one unit of demand is available or the subscription is
  /// cancelled.
  pub fn claim(&self) -> Claim {
    let mut state = self.state.lock().unwrap();
    loop {
      if state.cancelled {
        return Claim::Cancelled;
      }
      if state.demand > 0 {
        if state.demand != UNBOUNDED {
          state.demand -= 1;
        }
        return Claim::Granted;
      }
      state = self.wakeup.wait(state).unwrap();
    }
  }
}

#[cfg(test)]
mod tests {
  use std::{sync::Arc, thread, time::Duration};

  use super::*;

  #[test]
  fn claim_consumes_exactly_requested() {
    let gate = DemandGate::new();
    gate.add(2);
    assert_eq!(gate.claim(), Claim::Granted);
    assert_eq!(gate.claim(), Claim::Granted);
    gate.cancel();
    assert_eq!(gate.claim(), Claim::Cancelled);
  }

  #[test]
  fn unbounded_demand_never_decrements() {
    let gate = DemandGate::new();
    gate.add(UNBOUNDED);
    for _ in 0..1000 {
      assert_eq!(gate.claim(), Claim::Granted);
    }
  }

  #[test]
  fn demand_saturates_at_unbounded() {
    let gate = DemandGate::new();
    gate.add(UNBOUNDED - 1);
    gate.add(5);
    // Saturated: claims no longer decrement.
    assert_eq!(gate.claim(), Claim::Granted);
    assert_eq!(gate.claim(), Claim::Granted);
  }

  #[test]
  fn cancel_wakes_parked_claimer() {
    let gate = Arc::new(DemandGate::new());
    let parked = gate.clone();
    let handle = thread::spawn(move || parked.claim());
    thread::sleep(Duration::from_millis(20));
    gate.cancel();
    assert_eq!(handle.join().unwrap(), Claim::Cancelled);
  }

  #[test]
  fn requests_after_terminal_are_ignored() {
    let gate = DemandGate::new();
    gate.mark_terminated();
    gate.add(10);
    gate.cancel();
    assert_eq!(gate.claim(), Claim::Cancelled);
  }
}
