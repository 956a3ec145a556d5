//! Deterministic blocking test harness.
//!
//! [`AssertSubscriber`] and [`SingleAssertSubscriber`] record every event
//! in arrival order and expose blocking waits plus panic-on-mismatch
//! assertions, so concurrent pipelines can be tested without sleeps. The
//! fluent waits are bounded by a ten-second default; `try_*_within`
//! variants surface the timeout as [`Error::Timeout`] instead of
//! panicking on it.

use std::{
  fmt::Debug,
  sync::{Arc, Condvar, Mutex},
  time::{Duration, Instant},
};

use crate::{
  error::{Error, Failure},
  subscriber::{SingleSubscriber, Subscriber},
  subscription::Subscription,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

struct Recording<T> {
  items: Vec<T>,
  failure: Option<Failure>,
  completed: bool,
  cancelled: bool,
  subscription: Option<Subscription>,
  upfront: u64,
}

impl<T> Recording<T> {
  fn terminal(&self) -> bool {
    self.completed || self.failure.is_some() || self.cancelled
  }

  fn describe_terminal(&self) -> String {
    if self.completed {
      "completed".into()
    } else if let Some(failure) = &self.failure {
      format!("failed with `{failure}`")
    } else if self.cancelled {
      "was cancelled".into()
    } else {
      "is still live".into()
    }
  }
}

struct Shared<T> {
  state: Mutex<Recording<T>>,
  event: Condvar,
}

/// Recording stream subscriber for tests.
///
/// # Examples
///
/// ```
/// use riptide::prelude::*;
///
/// let subscriber = AssertSubscriber::create();
/// Stream::from_iter([1, 2, 3]).subscribe(subscriber.clone());
///
/// subscriber.await_next_items(2).assert_items(&[1, 2]);
/// subscriber.await_next_items(1).await_completion();
/// ```
pub struct AssertSubscriber<T> {
  shared: Arc<Shared<T>>,
}

impl<T> Clone for AssertSubscriber<T> {
  fn clone(&self) -> Self {
    AssertSubscriber { shared: self.shared.clone() }
  }
}

impl<T> AssertSubscriber<T> {
  /// A subscriber with zero upfront demand: nothing flows until
  /// [`request`](Self::request) or [`await_next_items`](Self::await_next_items).
  pub fn create() -> Self {
    Self::with_demand(0)
  }

  /// A subscriber requesting `n` as soon as it is subscribed.
  pub fn with_demand(n: u64) -> Self {
    AssertSubscriber {
      shared: Arc::new(Shared {
        state: Mutex::new(Recording {
          items: Vec::new(),
          failure: None,
          completed: false,
          cancelled: false,
          subscription: None,
          upfront: n,
        }),
        event: Condvar::new(),
      }),
    }
  }

  /// Requests `n` more items from the upstream.
  pub fn request(&self, n: u64) -> &Self {
    let subscription = self.shared.state.lock().unwrap().subscription.clone();
    match subscription {
      Some(subscription) => {
        if let Err(err) = subscription.request(n) {
          panic!("request({n}) rejected: {err}");
        }
      }
      None => panic!("request({n}) before any subscription arrived"),
    }
    self
  }

  /// Cancels the live subscription.
  pub fn cancel(&self) -> &Self {
    let subscription = self.shared.state.lock().unwrap().subscription.clone();
    if let Some(subscription) = subscription {
      subscription.cancel();
    }
    self
  }

  fn wait_for(
    &self,
    timeout: Duration,
    mut ready: impl FnMut(&Recording<T>) -> bool,
  ) -> Result<(), Error> {
    let deadline = Instant::now() + timeout;
    let mut state = self.shared.state.lock().unwrap();
    while !ready(&state) {
      let now = Instant::now();
      if now >= deadline {
        return Err(Error::Timeout(timeout));
      }
      let (guard, _) =
        self.shared.event.wait_timeout(state, deadline - now).unwrap();
      state = guard;
    }
    Ok(())
  }

  /// Blocks until at least one item has been recorded. Panics if the
  /// stream terminates without one, or after ten seconds.
  pub fn await_item(&self) -> &Self {
    if let Err(err) = self.try_await_item_within(DEFAULT_TIMEOUT) {
      panic!("{err}");
    }
    self
  }

  /// Timeout-bounded form of [`await_item`](Self::await_item). Only the
  /// timeout is an `Err`; a terminal without items still panics.
  pub fn try_await_item_within(&self, timeout: Duration) -> Result<(), Error> {
    self.wait_for(timeout, |state| !state.items.is_empty() || state.terminal())?;
    let state = self.shared.state.lock().unwrap();
    if state.items.is_empty() {
      panic!("expected an item but the stream {}", state.describe_terminal());
    }
    Ok(())
  }

  /// Requests `n` items and blocks until all `n` have arrived on top of
  /// what was already recorded.
  pub fn await_next_items(&self, n: u64) -> &Self {
    if let Err(err) = self.try_await_next_items_within(n, DEFAULT_TIMEOUT) {
      panic!("{err}");
    }
    self
  }

  pub fn try_await_next_items_within(
    &self,
    n: u64,
    timeout: Duration,
  ) -> Result<(), Error> {
    let target =
      self.shared.state.lock().unwrap().items.len() + n as usize;
    self.request(n);
    self.wait_for(timeout, |state| {
      state.items.len() >= target || state.terminal()
    })?;
    let state = self.shared.state.lock().unwrap();
    if state.items.len() < target {
      panic!(
        "expected {target} item(s) but got {} and the stream {}",
        state.items.len(),
        state.describe_terminal()
      );
    }
    Ok(())
  }

  /// Blocks until completion. Panics on failure or cancellation.
  pub fn await_completion(&self) -> &Self {
    if let Err(err) = self.try_await_completion_within(DEFAULT_TIMEOUT) {
      panic!("{err}");
    }
    self
  }

  pub fn try_await_completion_within(
    &self,
    timeout: Duration,
  ) -> Result<(), Error> {
    self.wait_for(timeout, Recording::terminal)?;
    let state = self.shared.state.lock().unwrap();
    if !state.completed {
      panic!("expected completion but the stream {}", state.describe_terminal());
    }
    Ok(())
  }

  /// Blocks until a terminal failure. Panics on completion or
  /// cancellation.
  pub fn await_failure(&self) -> &Self {
    if let Err(err) = self.try_await_failure_within(DEFAULT_TIMEOUT) {
      panic!("{err}");
    }
    self
  }

  pub fn try_await_failure_within(
    &self,
    timeout: Duration,
  ) -> Result<(), Error> {
    self.wait_for(timeout, Recording::terminal)?;
    let state = self.shared.state.lock().unwrap();
    if state.failure.is_none() {
      panic!("expected a failure but the stream {}", state.describe_terminal());
    }
    Ok(())
  }

  /// Blocks until the upstream acknowledged cancellation.
  pub fn await_cancellation(&self) -> &Self {
    if let Err(err) = self.wait_for(DEFAULT_TIMEOUT, |state| state.cancelled)
    {
      panic!("{err}");
    }
    self
  }

  /// The recorded failure, if the stream failed.
  pub fn failure(&self) -> Option<Failure> {
    self.shared.state.lock().unwrap().failure.clone()
  }

  pub fn is_cancelled(&self) -> bool {
    self.shared.state.lock().unwrap().cancelled
  }

  /// Asserts the stream failed and hands the failure back for closer
  /// inspection.
  pub fn assert_failed(&self) -> Failure {
    let state = self.shared.state.lock().unwrap();
    match &state.failure {
      Some(failure) => failure.clone(),
      None => {
        panic!("expected a failure but the stream {}", state.describe_terminal())
      }
    }
  }

  pub fn assert_completed(&self) -> &Self {
    let state = self.shared.state.lock().unwrap();
    if !state.completed {
      panic!("expected completion but the stream {}", state.describe_terminal());
    }
    self
  }
}

impl<T: Clone> AssertSubscriber<T> {
  /// Snapshot of the items recorded so far, in arrival order.
  pub fn items(&self) -> Vec<T> {
    self.shared.state.lock().unwrap().items.clone()
  }
}

impl<T: Clone + PartialEq + Debug> AssertSubscriber<T> {
  pub fn assert_items(&self, expected: &[T]) -> &Self {
    let items = self.items();
    assert_eq!(items.as_slice(), expected, "recorded items differ");
    self
  }
}

impl<T: Send> Subscriber<T> for AssertSubscriber<T> {
  fn on_subscribe(&mut self, subscription: Subscription) {
    let upfront = {
      let mut state = self.shared.state.lock().unwrap();
      if state.subscription.is_some() {
        state.failure = Some(Failure::from(Error::AlreadySubscribed));
        self.shared.event.notify_all();
        drop(state);
        subscription.cancel();
        return;
      }
      state.subscription = Some(subscription.clone());
      std::mem::take(&mut state.upfront)
    };
    if upfront > 0 {
      subscription.request_unchecked(upfront);
    }
  }

  fn on_item(&mut self, item: T) {
    self.shared.state.lock().unwrap().items.push(item);
    self.shared.event.notify_all();
  }

  fn on_failure(&mut self, failure: Failure) {
    self.shared.state.lock().unwrap().failure = Some(failure);
    self.shared.event.notify_all();
  }

  fn on_completion(&mut self) {
    self.shared.state.lock().unwrap().completed = true;
    self.shared.event.notify_all();
  }

  fn on_cancellation(&mut self) {
    self.shared.state.lock().unwrap().cancelled = true;
    self.shared.event.notify_all();
  }
}

struct SingleRecording<T> {
  item: Option<T>,
  failure: Option<Failure>,
  cancelled: bool,
  subscription: Option<Subscription>,
}

impl<T> SingleRecording<T> {
  fn terminal(&self) -> bool {
    self.item.is_some() || self.failure.is_some() || self.cancelled
  }

  fn describe_terminal(&self) -> String {
    if self.item.is_some() {
      "resolved to an item".into()
    } else if let Some(failure) = &self.failure {
      format!("failed with `{failure}`")
    } else if self.cancelled {
      "was cancelled".into()
    } else {
      "is still pending".into()
    }
  }
}

struct SingleShared<T> {
  state: Mutex<SingleRecording<T>>,
  event: Condvar,
}

/// Recording single-value subscriber for tests.
pub struct SingleAssertSubscriber<T> {
  shared: Arc<SingleShared<T>>,
}

impl<T> Clone for SingleAssertSubscriber<T> {
  fn clone(&self) -> Self {
    SingleAssertSubscriber { shared: self.shared.clone() }
  }
}

impl<T> SingleAssertSubscriber<T> {
  pub fn create() -> Self {
    SingleAssertSubscriber {
      shared: Arc::new(SingleShared {
        state: Mutex::new(SingleRecording {
          item: None,
          failure: None,
          cancelled: false,
          subscription: None,
        }),
        event: Condvar::new(),
      }),
    }
  }

  pub fn cancel(&self) -> &Self {
    let subscription = self.shared.state.lock().unwrap().subscription.clone();
    if let Some(subscription) = subscription {
      subscription.cancel();
    }
    self
  }

  fn wait_for_terminal(&self, timeout: Duration) -> Result<(), Error> {
    let deadline = Instant::now() + timeout;
    let mut state = self.shared.state.lock().unwrap();
    while !state.terminal() {
      let now = Instant::now();
      if now >= deadline {
        return Err(Error::Timeout(timeout));
      }
      let (guard, _) =
        self.shared.event.wait_timeout(state, deadline - now).unwrap();
      state = guard;
    }
    Ok(())
  }

  /// Blocks until the single resolves to an item. Panics on failure or
  /// cancellation.
  pub fn await_item(&self) -> &Self {
    if let Err(err) = self.try_await_item_within(DEFAULT_TIMEOUT) {
      panic!("{err}");
    }
    self
  }

  pub fn try_await_item_within(&self, timeout: Duration) -> Result<(), Error> {
    self.wait_for_terminal(timeout)?;
    let state = self.shared.state.lock().unwrap();
    if state.item.is_none() {
      panic!("expected an item but the single {}", state.describe_terminal());
    }
    Ok(())
  }

  /// Blocks until the single fails. Panics on an item or cancellation.
  pub fn await_failure(&self) -> &Self {
    if let Err(err) = self.try_await_failure_within(DEFAULT_TIMEOUT) {
      panic!("{err}");
    }
    self
  }

  pub fn try_await_failure_within(
    &self,
    timeout: Duration,
  ) -> Result<(), Error> {
    self.wait_for_terminal(timeout)?;
    let state = self.shared.state.lock().unwrap();
    if state.failure.is_none() {
      panic!("expected a failure but the single {}", state.describe_terminal());
    }
    Ok(())
  }

  pub fn await_cancellation(&self) -> &Self {
    let deadline = Instant::now() + DEFAULT_TIMEOUT;
    let mut state = self.shared.state.lock().unwrap();
    while !state.cancelled {
      let now = Instant::now();
      if now >= deadline {
        panic!("{}", Error::Timeout(DEFAULT_TIMEOUT));
      }
      let (guard, _) =
        self.shared.event.wait_timeout(state, deadline - now).unwrap();
      state = guard;
    }
    self
  }

  pub fn failure(&self) -> Option<Failure> {
    self.shared.state.lock().unwrap().failure.clone()
  }

  pub fn is_cancelled(&self) -> bool {
    self.shared.state.lock().unwrap().cancelled
  }

  pub fn assert_failed(&self) -> Failure {
    let state = self.shared.state.lock().unwrap();
    match &state.failure {
      Some(failure) => failure.clone(),
      None => {
        panic!("expected a failure but the single {}", state.describe_terminal())
      }
    }
  }
}

impl<T: Clone> SingleAssertSubscriber<T> {
  pub fn item(&self) -> Option<T> {
    self.shared.state.lock().unwrap().item.clone()
  }
}

impl<T: Clone + PartialEq + Debug> SingleAssertSubscriber<T> {
  pub fn assert_item(&self, expected: T) -> &Self {
    let state = self.shared.state.lock().unwrap();
    match &state.item {
      Some(item) => assert_eq!(item, &expected, "recorded item differs"),
      None => {
        panic!(
          "expected item {expected:?} but the single {}",
          state.describe_terminal()
        )
      }
    }
    self
  }
}

impl<T: Send> SingleSubscriber<T> for SingleAssertSubscriber<T> {
  fn on_subscribe(&mut self, subscription: Subscription) {
    let mut state = self.shared.state.lock().unwrap();
    if state.subscription.is_some() {
      state.failure = Some(Failure::from(Error::AlreadySubscribed));
      self.shared.event.notify_all();
      drop(state);
      subscription.cancel();
      return;
    }
    state.subscription = Some(subscription);
  }

  fn on_item(&mut self, item: T) {
    self.shared.state.lock().unwrap().item = Some(item);
    self.shared.event.notify_all();
  }

  fn on_failure(&mut self, failure: Failure) {
    self.shared.state.lock().unwrap().failure = Some(failure);
    self.shared.event.notify_all();
  }

  fn on_cancellation(&mut self) {
    self.shared.state.lock().unwrap().cancelled = true;
    self.shared.event.notify_all();
  }
}
