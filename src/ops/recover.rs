//! Failure recovery by switching to an alternative stream.

use std::sync::Arc;

use crate::{
  error::Failure,
  ops::Relay,
  stream::Stream,
  subscriber::{BoxSubscriber, Subscriber},
  subscription::{Subscription, SwitchControl},
};

/// On upstream failure, drops the failed upstream and replays the
/// undelivered demand balance against a replacement stream produced by
/// the recovery function. Items already delivered stay delivered; the
/// downstream only ever sees one subscription.
pub(crate) struct RecoverSubscriber<T> {
  downstream: Option<BoxSubscriber<T>>,
  control: Arc<SwitchControl>,
  alternative: Option<Box<dyn FnOnce(&Failure) -> Stream<T> + Send>>,
}

impl<T> RecoverSubscriber<T> {
  pub fn new(
    downstream: BoxSubscriber<T>,
    alternative: Box<dyn FnOnce(&Failure) -> Stream<T> + Send>,
  ) -> Self {
    RecoverSubscriber {
      downstream: Some(downstream),
      control: SwitchControl::new(),
      alternative: Some(alternative),
    }
  }
}

impl<T: Send + 'static> Subscriber<T> for RecoverSubscriber<T> {
  fn on_subscribe(&mut self, subscription: Subscription) {
    if let Some(downstream) = &mut self.downstream {
      downstream.on_subscribe(self.control.handle());
    }
    self.control.attach(subscription);
  }

  fn on_item(&mut self, item: T) {
    self.control.note_delivered();
    if let Some(downstream) = &mut self.downstream {
      downstream.on_item(item);
    }
  }

  fn on_failure(&mut self, failure: Failure) {
    let (Some(downstream), Some(alternative)) =
      (self.downstream.take(), self.alternative.take())
    else {
      return;
    };
    self.control.detach();
    let replacement = alternative(&failure);
    replacement.subscribe(Relay::new(downstream, self.control.clone()));
  }

  fn on_completion(&mut self) {
    self.control.mark_terminated();
    if let Some(downstream) = &mut self.downstream {
      downstream.on_completion();
    }
  }

  fn on_cancellation(&mut self) {
    if let Some(downstream) = &mut self.downstream {
      downstream.on_cancellation();
    }
  }
}
