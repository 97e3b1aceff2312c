//! Latest-wins stream throttling

use futures::Stream;
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Instant, Sleep, sleep};

/// Extension trait to add throttling to any Stream
pub trait ThrottleExt: Stream {
    /// Emit at most one item per `period`.
    ///
    /// Outside a quiet period the latest ready item passes immediately; items that are
    /// ready together collapse to the last of them. Items arriving inside the quiet
    /// period replace each other and the latest one is emitted when the period ends.
    /// An upstream that ends flushes its pending item before the throttle ends.
    fn throttle(self, period: Duration) -> Throttle<Self>
    where
        Self: Sized,
    {
        Throttle::new(self, period)
    }
}

impl<T: Stream> ThrottleExt for T {}

pin_project! {
    /// Stream returned by [`ThrottleExt::throttle`]
    pub struct Throttle<S: Stream> {
        #[pin]
        stream: S,
        #[pin]
        quiet: Sleep,
        period: Duration,
        pending: Option<S::Item>,
        quiet_active: bool,
        upstream_done: bool,
    }
}

impl<S: Stream> Throttle<S> {
    pub fn new(stream: S, period: Duration) -> Self {
        Self {
            stream,
            quiet: sleep(Duration::ZERO),
            period,
            pending: None,
            quiet_active: false,
            upstream_done: false,
        }
    }
}

impl<S: Stream> Stream for Throttle<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        while !*this.upstream_done {
            match this.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(item)) => *this.pending = Some(item),
                Poll::Ready(None) => *this.upstream_done = true,
                Poll::Pending => break,
            }
        }

        if *this.quiet_active {
            if this.quiet.as_mut().poll(cx).is_pending() {
                return Poll::Pending;
            }
            *this.quiet_active = false;
        }

        match this.pending.take() {
            Some(item) => {
                this.quiet.as_mut().reset(Instant::now() + *this.period);
                *this.quiet_active = true;
                Poll::Ready(Some(item))
            }
            None if *this.upstream_done => Poll::Ready(None),
            None => Poll::Pending,
        }
    }
}
