//! Named producer threads with spawn-failure recovery.

use std::{
  sync::{Arc, Mutex},
  thread,
};

use crate::error::Failure;

/// Runs `task(state)` on a named thread.
///
/// If the OS refuses the thread, the state comes back to the caller so
/// the pipeline can be terminated in place instead of leaving the
/// subscriber waiting for an event that will never arrive.
pub(crate) fn spawn_or_reclaim<S, F>(
  name: &str,
  state: S,
  task: F,
) -> Result<(), S>
where
  S: Send + 'static,
  F: FnOnce(S) + Send + 'static,
{
  let slot = Arc::new(Mutex::new(Some(state)));
  let task_slot = slot.clone();
  let spawned =
    thread::Builder::new().name(name.into()).spawn(move || {
      if let Some(state) = task_slot.lock().unwrap().take() {
        task(state);
      }
    });
  match spawned {
    Ok(_) => Ok(()),
    Err(_) => match slot.lock().unwrap().take() {
      Some(state) => Err(state),
      None => Ok(()),
    },
  }
}

/// The terminal failure delivered when a producer thread cannot start.
pub(crate) fn spawn_failure() -> Failure {
  Failure::msg("producer thread could not be started")
}

#[cfg(test)]
mod tests {
  use std::sync::mpsc;

  use super::*;

  #[test]
  fn task_runs_named_with_its_state() {
    let (tx, rx) = mpsc::channel();
    let spawned = spawn_or_reclaim("riptide-test", 7, move |state| {
      let name = thread::current().name().map(str::to_owned);
      tx.send((state, name)).unwrap();
    });
    assert!(spawned.is_ok());
    let (state, name) = rx.recv().unwrap();
    assert_eq!(state, 7);
    assert_eq!(name.as_deref(), Some("riptide-test"));
  }
}
