//! Synchronous item transformation.

use std::marker::PhantomData;

use crate::{
  error::Failure,
  subscriber::Subscriber,
  subscription::Subscription,
};

/// Applies a fallible synchronous function to each item. An `Err`
/// replaces the item with a terminal failure event: the failure is
/// delivered first, then the upstream is cancelled, and everything that
/// still trickles through afterwards is swallowed here.
pub(crate) struct MapSubscriber<U, F, D> {
  f: F,
  downstream: D,
  upstream: Option<Subscription>,
  dead: bool,
  _marker: PhantomData<fn() -> U>,
}

impl<U, F, D> MapSubscriber<U, F, D> {
  pub fn new(f: F, downstream: D) -> Self {
    MapSubscriber {
      f,
      downstream,
      upstream: None,
      dead: false,
      _marker: PhantomData,
    }
  }
}

impl<T, U, F, D> Subscriber<T> for MapSubscriber<U, F, D>
where
  F: FnMut(T) -> Result<U, Failure> + Send,
  D: Subscriber<U>,
  U: Send,
{
  fn on_subscribe(&mut self, subscription: Subscription) {
    // One-to-one mapping is demand-transparent: the downstream drives
    // the upstream gate directly.
    self.upstream = Some(subscription.clone());
    self.downstream.on_subscribe(subscription);
  }

  fn on_item(&mut self, item: T) {
    if self.dead {
      return;
    }
    match (self.f)(item) {
      Ok(mapped) => self.downstream.on_item(mapped),
      Err(failure) => {
        self.dead = true;
        self.downstream.on_failure(failure);
        if let Some(upstream) = &self.upstream {
          upstream.cancel();
        }
      }
    }
  }

  fn on_failure(&mut self, failure: Failure) {
    if !self.dead {
      self.dead = true;
      self.downstream.on_failure(failure);
    }
  }

  fn on_completion(&mut self) {
    if !self.dead {
      self.dead = true;
      self.downstream.on_completion();
    }
  }

  fn on_cancellation(&mut self) {
    if !self.dead {
      self.downstream.on_cancellation();
    }
  }
}
