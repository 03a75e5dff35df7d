use std::io;
use std::io::Result;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use pin_project::pin_project;
use tokio::io::{AsyncRead, ReadBuf};

use crate::types::error::S3mirrorError;
use crate::types::progress_watcher::BytesProgressWatcher;
use crate::types::token::PipelineCancellationToken;

pub type ObjectReader = Pin<Box<dyn AsyncRead + Send + Sync>>;

/// An `AsyncRead` decorator that stops with `ErrorKind::Interrupted` once the
/// token is cancelled, and reports every byte it passes through to a watcher.
#[pin_project]
pub struct InterruptibleReader<R: AsyncRead> {
    #[pin]
    inner: R,
    cancellation_token: PipelineCancellationToken,
    watcher: Option<Arc<BytesProgressWatcher>>,
}

impl<R: AsyncRead> InterruptibleReader<R> {
    pub fn new(
        inner: R,
        cancellation_token: PipelineCancellationToken,
        watcher: Option<Arc<BytesProgressWatcher>>,
    ) -> Self {
        Self {
            inner,
            cancellation_token,
            watcher,
        }
    }
}

impl<R: AsyncRead> AsyncRead for InterruptibleReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<Result<()>> {
        let this = self.project();

        if this.cancellation_token.is_cancelled() {
            return Poll::Ready(Err(interrupted_io_error()));
        }

        let before = buf.filled().len();

        let result = this.inner.poll_read(cx, buf);
        if !result.is_ready() {
            return result;
        }

        let read_bytes = buf.filled().len() - before;
        if 0 < read_bytes {
            if let Some(watcher) = this.watcher {
                watcher.update(read_bytes as u64);
            }
        }

        result
    }
}

pub fn interrupted_io_error() -> io::Error {
    io::Error::new(io::ErrorKind::Interrupted, S3mirrorError::Interrupted)
}

pub fn new_interruptible_reader<R>(
    inner: R,
    cancellation_token: PipelineCancellationToken,
    watcher: Option<Arc<BytesProgressWatcher>>,
) -> ObjectReader
where
    R: AsyncRead + Send + Sync + 'static,
{
    Box::pin(InterruptibleReader::new(inner, cancellation_token, watcher))
}
