//! Creation strategies for [`Stream`].

use std::time::Duration;

use crate::{
  emitter::StreamEmitter,
  error::{Error, Failure},
  stream::{Stream, StreamKind},
};

impl<T: Send + 'static> Stream<T> {
  /// A finite stream emitting the items of `iter` in iteration order,
  /// then completing.
  ///
  /// # Examples
  ///
  /// ```
  /// use riptide::prelude::*;
  ///
  /// let subscriber = AssertSubscriber::with_demand(UNBOUNDED);
  /// Stream::from_iter(vec!["a", "b"]).subscribe(subscriber.clone());
  /// subscriber.await_completion().assert_items(&["a", "b"]);
  /// ```
  pub fn from_iter<I>(iter: I) -> Stream<T>
  where
    I: IntoIterator<Item = T>,
    I::IntoIter: Send + 'static,
  {
    Stream::from_kind(StreamKind::Iter(Box::new(iter.into_iter())))
  }

  /// Completes immediately without emitting anything.
  pub fn empty() -> Stream<T> {
    Stream::from_kind(StreamKind::Empty)
  }

  /// Fails immediately with `failure`.
  pub fn failure(failure: Failure) -> Stream<T> {
    Stream::from_kind(StreamKind::Failed(failure))
  }

  /// A lazily pulled, possibly infinite stream. `f` is invoked once per
  /// unit of outstanding demand; returning `None` completes the stream.
  pub fn generate(f: impl FnMut() -> Option<T> + Send + 'static) -> Stream<T> {
    Stream::from_kind(StreamKind::Generator(Box::new(f)))
  }

  /// A stream fed from outside the pipeline. `callback` runs on its own
  /// thread with a cloneable [`StreamEmitter`]; emissions are buffered
  /// and delivered strictly under downstream demand.
  ///
  /// # Examples
  ///
  /// ```
  /// use riptide::prelude::*;
  ///
  /// let subscriber = AssertSubscriber::with_demand(UNBOUNDED);
  /// Stream::emitter(|emitter| {
  ///   emitter.emit(1);
  ///   emitter.emit(2);
  ///   emitter.complete();
  /// })
  /// .subscribe(subscriber.clone());
  /// subscriber.await_completion().assert_items(&[1, 2]);
  /// ```
  pub fn emitter(
    callback: impl FnOnce(StreamEmitter<T>) + Send + 'static,
  ) -> Stream<T> {
    Stream::from_kind(StreamKind::Emitter(Box::new(callback)))
  }
}

impl Stream<i64> {
  /// The integers of `start..end_exclusive` in ascending order.
  ///
  /// An empty range (`start == end_exclusive`) completes immediately;
  /// a reversed one is rejected with [`Error::InvalidArgument`].
  pub fn range(start: i64, end_exclusive: i64) -> Result<Stream<i64>, Error> {
    if end_exclusive < start {
      return Err(Error::InvalidArgument(format!(
        "range end ({end_exclusive}) must not precede start ({start})"
      )));
    }
    Ok(Stream::from_iter(start..end_exclusive))
  }
}

impl Stream<u64> {
  /// An infinite counter ticking every `interval`, starting at zero.
  ///
  /// Ticks are paced by demand as much as by time: with no outstanding
  /// demand the producer parks and the counter does not advance, so no
  /// tick is ever dropped. Cancellation is the only way to end the
  /// stream.
  pub fn ticks_every(interval: Duration) -> Stream<u64> {
    let mut counter = 0u64;
    Stream::generate(move || {
      std::thread::sleep(interval);
      let tick = counter;
      counter += 1;
      Some(tick)
    })
  }
}
