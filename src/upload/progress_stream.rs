use std::pin::Pin;
use std::task::{Context, Poll};
use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use tokio::sync::watch;

pin_project! {
    /// Body stream that publishes the running byte count as the HTTP client
    /// pulls chunks from it.
    pub struct ProgressStream<S> {
        #[pin]
        inner: S,
        bytes_read: u64,
        progress_tx: watch::Sender<u64>,
    }
}

impl<S> ProgressStream<S> {
    pub fn new(inner: S, progress_tx: watch::Sender<u64>) -> Self {
        Self {
            inner,
            bytes_read: 0,
            progress_tx,
        }
    }
}

impl<S> Stream for ProgressStream<S>
where
    S: Stream<Item = std::io::Result<Bytes>>
{
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if !chunk.is_empty() {
                    *this.bytes_read += chunk.len() as u64;
                    let _ = this.progress_tx.send(*this.bytes_read);
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            other => other,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
