//! Read timeout for live provider streams.
//!
//! Providers occasionally stop sending frames without closing the socket. A [`TimeoutStream`]
//! surfaces that silence as a terminal [`DataError::ReadTimeout`], so the controller reports the
//! feed as errored before it reconnects.

use crate::error::DataError;
use futures::{Stream, stream::FusedStream};
use std::{
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::time::{Instant, Sleep};
use tracing::warn;

/// Default read timeout for live streams (2 minutes).
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(120);

/// Live frame stream that fails with [`DataError::ReadTimeout`] once no frame has arrived for
/// `read_timeout`, and ends after reporting it.
#[derive(Debug)]
pub struct TimeoutStream<S> {
    frames: S,
    read_timeout: Duration,
    deadline: Pin<Box<Sleep>>,
    expired: bool,
}

impl<S> TimeoutStream<S> {
    pub fn new(frames: S, read_timeout: Duration) -> Self {
        Self {
            frames,
            read_timeout,
            deadline: Box::pin(tokio::time::sleep(read_timeout)),
            expired: false,
        }
    }
}

impl<S, T> Stream for TimeoutStream<S>
where
    S: Stream<Item = Result<T, DataError>> + Unpin,
{
    type Item = Result<T, DataError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.expired {
            return Poll::Ready(None);
        }

        if let Poll::Ready(frame) = Pin::new(&mut self.frames).poll_next(cx) {
            let next = Instant::now() + self.read_timeout;
            self.deadline.as_mut().reset(next);
            return Poll::Ready(frame);
        }

        match self.deadline.as_mut().poll(cx) {
            Poll::Ready(()) => {
                let secs = self.read_timeout.as_secs();
                warn!(timeout_secs = secs, "no live frames received, giving up on connection");
                self.expired = true;
                Poll::Ready(Some(Err(DataError::ReadTimeout { secs })))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<S, T> FusedStream for TimeoutStream<S>
where
    S: Stream<Item = Result<T, DataError>> + Unpin,
{
    fn is_terminated(&self) -> bool {
        self.expired
    }
}
