//! Externally-driven emitter handles.
//!
//! An emitter callback never touches the subscriber directly: it writes
//! into a mailbox that the subscription's producer drains under demand
//! control. This keeps external callers off the delivery path and makes
//! emission after termination detectable in one place.

use std::{
  collections::VecDeque,
  sync::{Arc, Condvar, Mutex},
};

use tracing::warn;

use crate::error::Failure;

pub(crate) enum Signal<T> {
  Item(T),
  Complete,
  Fail(Failure),
}

enum Push {
  Accepted,
  /// The subscription was cancelled; not the emitter's fault.
  Closed,
  /// The emitter already terminated: a protocol violation.
  AfterTerminal,
}

struct MailboxState<T> {
  queue: VecDeque<Signal<T>>,
  closed: bool,
  terminated: bool,
}

pub(crate) struct Mailbox<T> {
  state: Mutex<MailboxState<T>>,
  readable: Condvar,
}

impl<T> Mailbox<T> {
  pub fn new() -> Arc<Self> {
    Arc::new(Mailbox {
      state: Mutex::new(MailboxState {
        queue: VecDeque::new(),
        closed: false,
        terminated: false,
      }),
      readable: Condvar::new(),
    })
  }

  fn push(&self, signal: Signal<T>) -> Push {
    let mut state = self.state.lock().unwrap();
    if state.closed {
      return Push::Closed;
    }
    if state.terminated {
      return Push::AfterTerminal;
    }
    if matches!(signal, Signal::Complete | Signal::Fail(_)) {
      state.terminated = true;
    }
    state.queue.push_back(signal);
    self.readable.notify_all();
    Push::Accepted
  }

  /// Blocks for the next signal; `None` once the mailbox is closed by
  /// cancellation.
  pub fn next(&self) -> Option<Signal<T>> {
    let mut state = self.state.lock().unwrap();
    loop {
      if let Some(signal) = state.queue.pop_front() {
        return Some(signal);
      }
      if state.closed {
        return None;
      }
      state = self.readable.wait(state).unwrap();
    }
  }

  /// Closes the mailbox and wakes the draining producer. Used by the
  /// cancellation path.
  pub fn close(&self) {
    let mut state = self.state.lock().unwrap();
    state.closed = true;
    self.readable.notify_all();
  }

  pub fn is_closed(&self) -> bool {
    self.state.lock().unwrap().closed
  }
}

/// Handle given to a [`crate::Stream::emitter`] callback.
///
/// Cloneable and sendable; calls from multiple external threads must be
/// externally synchronized by the caller. After `complete` or `fail`,
/// further calls are discarded and logged as defects.
pub struct StreamEmitter<T> {
  mailbox: Arc<Mailbox<T>>,
}

impl<T> Clone for StreamEmitter<T> {
  fn clone(&self) -> Self { StreamEmitter { mailbox: self.mailbox.clone() } }
}

impl<T> StreamEmitter<T> {
  pub(crate) fn new(mailbox: Arc<Mailbox<T>>) -> Self {
    StreamEmitter { mailbox }
  }

  pub fn emit(&self, item: T) {
    if let Push::AfterTerminal = self.mailbox.push(Signal::Item(item)) {
      warn!("protocol violation: emit after emitter termination");
    }
  }

  pub fn complete(&self) {
    if let Push::AfterTerminal = self.mailbox.push(Signal::Complete) {
      warn!("protocol violation: complete after emitter termination");
    }
  }

  pub fn fail(&self, failure: Failure) {
    if let Push::AfterTerminal = self.mailbox.push(Signal::Fail(failure)) {
      warn!("protocol violation: fail after emitter termination");
    }
  }

  /// True once the subscription was cancelled. Long-running callbacks
  /// poll this to stop producing; emissions after it turns true are
  /// silently dropped anyway.
  pub fn is_cancelled(&self) -> bool {
    self.mailbox.is_closed()
  }
}

enum OnceState<T> {
  Pending,
  Done(Option<Result<T, Failure>>),
  Closed,
}

/// One-shot terminal cell behind a [`SingleEmitter`].
pub(crate) struct OnceSignal<T> {
  state: Mutex<OnceState<T>>,
  ready: Condvar,
}

impl<T> OnceSignal<T> {
  pub fn new() -> Arc<Self> {
    Arc::new(OnceSignal {
      state: Mutex::new(OnceState::Pending),
      ready: Condvar::new(),
    })
  }

  fn set(&self, outcome: Result<T, Failure>) -> bool {
    let mut state = self.state.lock().unwrap();
    match &*state {
      OnceState::Pending => {
        *state = OnceState::Done(Some(outcome));
        self.ready.notify_all();
        true
      }
      OnceState::Closed => true,
      OnceState::Done(_) => false,
    }
  }

  /// Blocks for the terminal outcome; `None` if cancelled first.
  pub fn take(&self) -> Option<Result<T, Failure>> {
    let mut state = self.state.lock().unwrap();
    loop {
      match &mut *state {
        OnceState::Done(outcome) => return outcome.take(),
        OnceState::Closed => return None,
        OnceState::Pending => state = self.ready.wait(state).unwrap(),
      }
    }
  }

  pub fn close(&self) {
    let mut state = self.state.lock().unwrap();
    if matches!(*state, OnceState::Pending) {
      *state = OnceState::Closed;
    }
    self.ready.notify_all();
  }

  pub fn is_closed(&self) -> bool {
    matches!(*self.state.lock().unwrap(), OnceState::Closed)
  }
}

/// Handle given to a [`crate::SingleAsync::emitter`] callback. Exactly
/// one of `complete`/`fail` may be called; later calls are discarded and
/// logged as defects.
pub struct SingleEmitter<T> {
  cell: Arc<OnceSignal<T>>,
}

impl<T> Clone for SingleEmitter<T> {
  fn clone(&self) -> Self { SingleEmitter { cell: self.cell.clone() } }
}

impl<T> SingleEmitter<T> {
  pub(crate) fn new(cell: Arc<OnceSignal<T>>) -> Self {
    SingleEmitter { cell }
  }

  pub fn complete(&self, item: T) {
    if !self.cell.set(Ok(item)) {
      warn!("protocol violation: complete after emitter termination");
    }
  }

  pub fn fail(&self, failure: Failure) {
    if !self.cell.set(Err(failure)) {
      warn!("protocol violation: fail after emitter termination");
    }
  }

  /// True once the subscription was cancelled before the single settled.
  pub fn is_cancelled(&self) -> bool {
    self.cell.is_closed()
  }
}
