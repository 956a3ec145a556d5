//! The source drive loop.
//!
//! Every non-pipe [`StreamKind`] is interpreted here: a demand gate and a
//! protocol guard are bound into a root subscription, then the source
//! runs a claim-one-emit-one loop on its producer thread. Cancellation is
//! observed at every claim and before every delivery.

use std::{sync::Arc, thread};

use crate::{
  demand::{Claim, DemandGate},
  emitter::{Mailbox, Signal, StreamEmitter},
  error::Failure,
  spawn::{spawn_failure, spawn_or_reclaim},
  stream::StreamKind,
  subscriber::{BoxSubscriber, ProtocolGuard},
  subscription::RootSubscription,
};

pub(crate) fn start<T: Send + 'static>(
  kind: StreamKind<T>,
  subscriber: BoxSubscriber<T>,
) {
  match kind {
    StreamKind::Pipe(pipe) => pipe(subscriber),
    StreamKind::Empty => immediate(subscriber, None),
    StreamKind::Failed(failure) => immediate(subscriber, Some(failure)),
    StreamKind::Iter(iter) => pull_iter(subscriber, iter.peekable()),
    StreamKind::Generator(generator) => pull(subscriber, generator),
    StreamKind::Emitter(callback) => emitter_driven(subscriber, callback),
  }
}

/// Terminal events need no demand, so `Empty` and `Failed` resolve on
/// the subscribing thread.
fn immediate<T: 'static>(subscriber: BoxSubscriber<T>, failure: Option<Failure>) {
  let gate = Arc::new(DemandGate::new());
  let mut guard = ProtocolGuard::new(subscriber);
  guard.subscribed(RootSubscription::new(gate.clone()).into_handle());
  if gate.is_cancelled() {
    guard.cancelled();
    return;
  }
  gate.mark_terminated();
  match failure {
    Some(failure) => guard.fail(failure),
    None => guard.complete(),
  }
}

/// Iterator sources know their own end: exhaustion is checked before
/// parking, so the terminal completion never waits for extra demand.
fn pull_iter<T: Send + 'static>(
  subscriber: BoxSubscriber<T>,
  mut iter: std::iter::Peekable<impl Iterator<Item = T> + Send + 'static>,
) {
  let gate = Arc::new(DemandGate::new());
  let mut guard = ProtocolGuard::new(subscriber);
  guard.subscribed(RootSubscription::new(gate.clone()).into_handle());
  let spawned = spawn_or_reclaim(
    "riptide-source",
    (gate, guard),
    move |(gate, mut guard)| loop {
      if iter.peek().is_none() {
        gate.mark_terminated();
        guard.complete();
        return;
      }
      match gate.claim() {
        Claim::Cancelled => {
          guard.cancelled();
          return;
        }
        Claim::Granted => {
          if let Some(item) = iter.next() {
            if gate.is_cancelled() {
              guard.cancelled();
              return;
            }
            guard.item(item);
          }
        }
      }
    },
  );
  if let Err((gate, mut guard)) = spawned {
    gate.mark_terminated();
    guard.fail(spawn_failure());
  }
}

/// Generator sources are pulled strictly under demand: exhaustion is
/// only discovered when an outstanding request forces the next pull.
fn pull<T: Send + 'static>(
  subscriber: BoxSubscriber<T>,
  mut next: impl FnMut() -> Option<T> + Send + 'static,
) {
  let gate = Arc::new(DemandGate::new());
  let mut guard = ProtocolGuard::new(subscriber);
  guard.subscribed(RootSubscription::new(gate.clone()).into_handle());
  let spawned = spawn_or_reclaim(
    "riptide-source",
    (gate, guard),
    move |(gate, mut guard)| loop {
      match gate.claim() {
        Claim::Cancelled => {
          guard.cancelled();
          return;
        }
        Claim::Granted => match next() {
          Some(item) => {
            if gate.is_cancelled() {
              guard.cancelled();
              return;
            }
            guard.item(item);
          }
          None => {
            gate.mark_terminated();
            guard.complete();
            return;
          }
        },
      }
    },
  );
  if let Err((gate, mut guard)) = spawned {
    gate.mark_terminated();
    guard.fail(spawn_failure());
  }
}

/// Emitter sources: the callback runs on its own thread and writes into
/// the mailbox; a separate drain thread claims demand per buffered item.
/// Cancellation closes the mailbox, unblocking both.
fn emitter_driven<T: Send + 'static>(
  subscriber: BoxSubscriber<T>,
  callback: Box<dyn FnOnce(StreamEmitter<T>) + Send + 'static>,
) {
  let mailbox = Mailbox::new();
  let gate = Arc::new(DemandGate::new());
  let teardown = {
    let mailbox = mailbox.clone();
    move || mailbox.close()
  };
  let mut guard = ProtocolGuard::new(subscriber);
  guard
    .subscribed(RootSubscription::with_teardown(gate.clone(), teardown).into_handle());

  let emitter = StreamEmitter::new(mailbox.clone());
  let callback_thread = thread::Builder::new()
    .name("riptide-emitter".into())
    .spawn(move || callback(emitter));
  if callback_thread.is_err() {
    gate.mark_terminated();
    guard.fail(spawn_failure());
    return;
  }

  let spawned = spawn_or_reclaim(
    "riptide-drain",
    (gate, guard),
    move |(gate, mut guard)| loop {
      match mailbox.next() {
        None => {
          guard.cancelled();
          return;
        }
        Some(Signal::Complete) => {
          gate.mark_terminated();
          guard.complete();
          return;
        }
        Some(Signal::Fail(failure)) => {
          gate.mark_terminated();
          guard.fail(failure);
          return;
        }
        Some(Signal::Item(item)) => match gate.claim() {
          Claim::Cancelled => {
            guard.cancelled();
            return;
          }
          Claim::Granted => guard.item(item),
        },
      }
    },
  );
  if let Err((gate, mut guard)) = spawned {
    gate.mark_terminated();
    guard.fail(spawn_failure());
  }
}
