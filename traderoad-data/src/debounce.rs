//! Timer based coalescing of rapidly changing input, eg/ a symbol being typed.

use futures::Stream;
use std::{
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::time::{Instant, Sleep};

/// Default delay for symbol input.
pub const DEFAULT_DEBOUNCE_DELAY: Duration = Duration::from_millis(750);

/// Emits only the last pushed value once `delay` has elapsed without a newer push.
///
/// Each [`Debouncer::push`] supersedes the pending value and restarts the delay. The
/// [`Stream`] implementation never terminates, and is meant to be polled by the same task that
/// pushes (eg/ inside a `tokio::select!` loop).
#[derive(Debug)]
pub struct Debouncer<T> {
    delay: Duration,
    pending: Option<T>,
    deadline: Pin<Box<Sleep>>,
}

impl<T> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
            deadline: Box::pin(tokio::time::sleep(delay)),
        }
    }

    pub fn push(&mut self, value: T) {
        self.pending = Some(value);
        let deadline = Instant::now() + self.delay;
        self.deadline.as_mut().reset(deadline);
    }

    /// Discard the pending value, returning it.
    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl<T> Default for Debouncer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE_DELAY)
    }
}

impl<T: Unpin> Stream for Debouncer<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.pending.is_none() {
            return Poll::Pending;
        }

        match self.deadline.as_mut().poll(cx) {
            Poll::Ready(()) => Poll::Ready(self.pending.take()),
            Poll::Pending => Poll::Pending,
        }
    }
}
