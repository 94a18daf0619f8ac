//! Client-facing byte stream of a playback session.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::process::ChildStdout;
use tokio_util::io::ReaderStream;
use tokio_util::sync::DropGuard;

use super::session::SessionHandle;

/// Flags shared between the stream and its supervisor.
#[derive(Debug, Default)]
pub(crate) struct StreamProgress {
    /// Transcoder stdout reached EOF without a read error.
    pub eof: AtomicBool,
    /// Bytes handed to the consumer.
    pub bytes_sent: AtomicU64,
}

/// Transcoded audio for one playback.
///
/// Yields the primed first chunk, then live reads of the transcoder's stdout.
/// Dropping the stream closes the sink: if that happens before EOF the
/// supervisor treats it as a client disconnect and kills both processes.
pub struct PipelineStream {
    primed: Option<Bytes>,
    inner: ReaderStream<ChildStdout>,
    progress: Arc<StreamProgress>,
    read_failed: bool,
    session: SessionHandle,
    _sink: DropGuard,
}

impl PipelineStream {
    pub(crate) fn new(
        stdout: ChildStdout,
        chunk_size: usize,
        progress: Arc<StreamProgress>,
        session: SessionHandle,
        sink: DropGuard,
    ) -> Self {
        Self {
            primed: None,
            inner: ReaderStream::with_capacity(stdout, chunk_size),
            progress,
            read_failed: false,
            session,
            _sink: sink,
        }
    }

    /// Session this stream belongs to.
    pub fn session(&self) -> SessionHandle {
        self.session.clone()
    }

    /// Read the first chunk and hold it back for the consumer.
    ///
    /// `None` means the transcoder closed stdout without writing anything.
    pub(crate) async fn prime(&mut self) -> Option<std::io::Result<()>> {
        match self.inner.next().await {
            Some(Ok(chunk)) => {
                self.primed = Some(chunk);
                Some(Ok(()))
            }
            Some(Err(e)) => {
                self.read_failed = true;
                Some(Err(e))
            }
            None => {
                self.progress.eof.store(true, Ordering::Release);
                None
            }
        }
    }

    fn sent(&self, chunk: &Bytes) {
        self.progress
            .bytes_sent
            .fetch_add(chunk.len() as u64, Ordering::Relaxed);
    }
}

impl Stream for PipelineStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if let Some(chunk) = this.primed.take() {
            this.sent(&chunk);
            return Poll::Ready(Some(Ok(chunk)));
        }

        match ready!(this.inner.poll_next_unpin(cx)) {
            Some(Ok(chunk)) => {
                this.sent(&chunk);
                Poll::Ready(Some(Ok(chunk)))
            }
            Some(Err(e)) => {
                this.read_failed = true;
                Poll::Ready(Some(Err(e)))
            }
            None => {
                if !this.read_failed {
                    this.progress.eof.store(true, Ordering::Release);
                }
                Poll::Ready(None)
            }
        }
    }
}

impl std::fmt::Debug for PipelineStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineStream")
            .field("session", &self.session.id())
            .field("primed", &self.primed.as_ref().map(Bytes::len))
            .field("bytes_sent", &self.progress.bytes_sent.load(Ordering::Relaxed))
            .finish()
    }
}
