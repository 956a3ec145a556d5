//! Failure payloads and the error taxonomy.
//!
//! Failures travel through the same channel as items, as an explicit
//! terminal event carrying a [`Failure`] value. Nothing in this crate
//! propagates errors by unwinding across a concurrency boundary.

use std::{error::Error as StdError, fmt, sync::Arc, time::Duration};

/// The payload of a terminal failure event.
///
/// Cloneable so that operator stages can inspect a failure and still pass
/// it downstream unchanged.
#[derive(Clone, Debug)]
pub struct Failure(Arc<dyn StdError + Send + Sync + 'static>);

impl Failure {
  /// Wraps any error value as a failure payload.
  pub fn new<E>(err: E) -> Self
  where
    E: StdError + Send + Sync + 'static,
  {
    Failure(Arc::new(err))
  }

  /// A failure carrying only a message.
  pub fn msg(message: impl Into<String>) -> Self {
    Failure(Arc::new(MessageError(message.into())))
  }

  /// Combines several deferred failures into one terminal failure.
  ///
  /// Used by flat-map stages running with `collect_failures()`.
  pub fn composite(failures: impl IntoIterator<Item = Failure>) -> Self {
    Failure(Arc::new(CompositeError(failures.into_iter().collect())))
  }

  /// The failure rendered as a message, for diagnostics and assertions.
  pub fn message(&self) -> String { self.0.to_string() }
}

impl fmt::Display for Failure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

impl StdError for Failure {
  fn source(&self) -> Option<&(dyn StdError + 'static)> {
    Some(self.0.as_ref() as &(dyn StdError + 'static))
  }
}

impl From<Error> for Failure {
  fn from(err: Error) -> Self { Failure::new(err) }
}

#[derive(Debug)]
struct MessageError(String);

impl fmt::Display for MessageError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl StdError for MessageError {}

#[derive(Debug)]
struct CompositeError(Vec<Failure>);

impl fmt::Display for CompositeError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} failure(s) collected: [", self.0.len())?;
    for (i, failure) in self.0.iter().enumerate() {
      if i > 0 {
        f.write_str(", ")?;
      }
      write!(f, "{failure}")?;
    }
    f.write_str("]")
  }
}

impl StdError for CompositeError {}

/// The closed error taxonomy of the protocol layer.
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
  /// Malformed creation parameters, e.g. an absent item without the
  /// designated empty-item constructor, or an inverted range.
  #[error("invalid argument: {0}")]
  InvalidArgument(String),

  /// `request` accepts only positive demand or the unbounded sentinel.
  #[error("invalid demand: request must be positive, got {requested}")]
  InvalidDemand { requested: u64 },

  /// A subscriber instance may hold at most one live subscription.
  #[error("subscriber is already bound to a subscription")]
  AlreadySubscribed,

  /// An emission arrived after termination or cancellation. Absorbed at
  /// the point of detection and logged, never delivered downstream.
  #[error("protocol violation: {0}")]
  ProtocolViolation(String),

  /// A user-supplied transform, hook, or emitter signalled a failure.
  #[error("upstream failure: {0}")]
  Upstream(#[from] Failure),

  /// A blocking await exceeded its bound. Cancels the wait, not the
  /// subscription.
  #[error("await timed out after {0:?}")]
  Timeout(Duration),
}
