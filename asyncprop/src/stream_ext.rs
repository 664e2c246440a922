use futures_core::stream::Stream;
use pin_project::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Extension trait with the stream adapters the hosts are built from.
pub trait PropStreamExt: Stream {
    /// Yields only items that differ from the previous one, starting from
    /// `initial`. Items equal to the last seen value are swallowed, so a
    /// stream of re-evaluated expressions becomes a stream of real changes.
    fn changes_from(self, initial: Self::Item) -> Changes<Self>
    where
        Self::Item: PartialEq + Clone,
        Self: Sized,
    {
        Changes {
            stream: self,
            last: initial,
        }
    }

    /// Creates a stream that stops producing items once the provided predicate
    /// returns true. The matching item itself is still yielded.
    ///
    /// ## Examples
    ///
    /// ```
    /// use futures_signals::signal::{Mutable, SignalExt};
    /// use asyncprop::PropStreamExt;
    ///
    /// async fn example() {
    ///     let loading = Mutable::new(true);
    ///     let stream = loading
    ///         .signal()
    ///         .to_stream()
    ///         .stop_if(|loading| !*loading);
    ///
    ///     // The stream ends with the first `false`
    /// }
    /// ```
    fn stop_if<F>(self, test: F) -> StopIf<Self, F>
    where
        F: FnMut(&Self::Item) -> bool,
        Self: Sized,
    {
        StopIf {
            stream: self,
            stopped: false,
            test,
        }
    }
}
impl<T: ?Sized> PropStreamExt for T where T: Stream {}

/// Stream of distinct consecutive items, created by
/// [`PropStreamExt::changes_from`].
#[pin_project(project = ChangesProj)]
#[must_use = "Streams do nothing unless polled"]
pub struct Changes<S: Stream> {
    #[pin]
    stream: S,
    last: S::Item,
}

impl<S> Stream for Changes<S>
where
    S: Stream,
    S::Item: PartialEq + Clone,
{
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let ChangesProj { mut stream, last } = self.project();

        loop {
            match stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(value)) => {
                    if value != *last {
                        *last = value.clone();
                        return Poll::Ready(Some(value));
                    }
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// A stream that stops producing items once a predicate returns true,
/// created by [`PropStreamExt::stop_if`].
#[pin_project(project = StopIfProj)]
#[derive(Debug)]
#[must_use = "Streams do nothing unless polled"]
pub struct StopIf<A, B> {
    #[pin]
    stream: A,
    stopped: bool,
    test: B,
}

impl<A, B> Stream for StopIf<A, B>
where
    A: Stream,
    B: FnMut(&A::Item) -> bool,
{
    type Item = A::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let StopIfProj {
            stream,
            stopped,
            test,
        } = self.project();

        if *stopped {
            return Poll::Ready(None);
        }
        match stream.poll_next(cx) {
            Poll::Ready(Some(value)) => {
                if test(&value) {
                    *stopped = true;
                }
                Poll::Ready(Some(value))
            }
            Poll::Ready(None) => {
                *stopped = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
