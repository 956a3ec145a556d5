//! Lifecycle observation stages.

use crate::{
  error::Failure,
  subscriber::Subscriber,
  subscription::{RequestHooked, Subscription},
};

/// Which lifecycle event a stage watches. One stage observes exactly one
/// event kind; chaining several groups stacks several stages.
pub(crate) enum Hook<T> {
  Subscription(Box<dyn FnMut() + Send>),
  /// Fallible: an `Err` turns the item into a downstream failure and
  /// cancels the upstream.
  Item(Box<dyn FnMut(&T) -> Result<(), Failure> + Send>),
  Failure(Box<dyn FnMut(&Failure) + Send>),
  Completion(Box<dyn FnMut() + Send>),
  Cancellation(Box<dyn FnMut() + Send>),
  /// Taken out of the `Option` when the subscription arrives; the hook
  /// then lives inside the wrapped subscription core.
  Request(Option<Box<dyn FnMut(u64) + Send + 'static>>),
}

pub(crate) struct ObserveSubscriber<T, D> {
  hook: Hook<T>,
  downstream: D,
  upstream: Option<Subscription>,
  dead: bool,
}

impl<T, D> ObserveSubscriber<T, D> {
  pub fn new(hook: Hook<T>, downstream: D) -> Self {
    ObserveSubscriber { hook, downstream, upstream: None, dead: false }
  }
}

impl<T, D> Subscriber<T> for ObserveSubscriber<T, D>
where
  T: Send,
  D: Subscriber<T>,
{
  fn on_subscribe(&mut self, subscription: Subscription) {
    let subscription = match &mut self.hook {
      Hook::Subscription(callback) => {
        callback();
        subscription
      }
      Hook::Request(slot) => match slot.take() {
        Some(hook) => RequestHooked::wrap(subscription, hook),
        None => subscription,
      },
      _ => subscription,
    };
    self.upstream = Some(subscription.clone());
    self.downstream.on_subscribe(subscription);
  }

  fn on_item(&mut self, item: T) {
    if self.dead {
      return;
    }
    if let Hook::Item(callback) = &mut self.hook {
      if let Err(failure) = callback(&item) {
        self.dead = true;
        self.downstream.on_failure(failure);
        if let Some(upstream) = &self.upstream {
          upstream.cancel();
        }
        return;
      }
    }
    self.downstream.on_item(item);
  }

  fn on_failure(&mut self, failure: Failure) {
    if self.dead {
      return;
    }
    self.dead = true;
    if let Hook::Failure(callback) = &mut self.hook {
      callback(&failure);
    }
    self.downstream.on_failure(failure);
  }

  fn on_completion(&mut self) {
    if self.dead {
      return;
    }
    self.dead = true;
    if let Hook::Completion(callback) = &mut self.hook {
      callback();
    }
    self.downstream.on_completion();
  }

  fn on_cancellation(&mut self) {
    if self.dead {
      return;
    }
    if let Hook::Cancellation(callback) = &mut self.hook {
      callback();
    }
    self.downstream.on_cancellation();
  }
}
