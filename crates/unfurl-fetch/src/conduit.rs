//! Bounded byte pipe between the download task and the archive reader.
//!
//! The writer side is async and lives on the runtime; the reader side
//! implements [`std::io::Read`] and must be driven from a blocking thread
//! (e.g. inside `tokio::task::spawn_blocking`).

use std::io::{self, Read};

use bytes::{Buf, Bytes};
use tokio::sync::mpsc;

/// Failure reported by the writer when it closes the conduit in an error state.
///
/// The reader surfaces it as an [`io::Error`] whose inner error is this type.
#[derive(Clone, Debug, thiserror::Error)]
#[error("upstream transfer failed: {message}")]
pub struct UpstreamError {
    message: String,
}

impl UpstreamError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// The other end of the conduit is gone.
#[derive(Clone, Copy, Debug, thiserror::Error)]
#[error("conduit closed")]
pub struct Closed;

type Message = std::result::Result<Bytes, UpstreamError>;

/// Create a conduit holding at most `capacity` chunks in flight (minimum 1).
pub fn pipe(capacity: usize) -> (ConduitWriter, ConduitReader) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let writer = ConduitWriter { tx: Some(tx) };
    let reader = ConduitReader {
        rx,
        current: Bytes::new(),
        state: ReadState::Open,
    };
    (writer, reader)
}

pub struct ConduitWriter {
    tx: Option<mpsc::Sender<Message>>,
}

impl ConduitWriter {
    /// Queue a chunk, waiting while the conduit is full.
    pub async fn send(&mut self, chunk: Bytes) -> std::result::Result<(), Closed> {
        let tx = self.tx.as_ref().ok_or(Closed)?;
        if chunk.is_empty() {
            return Ok(());
        }
        tx.send(Ok(chunk)).await.map_err(|_| Closed)
    }

    /// End the stream. The reader sees end-of-file after the queued chunks.
    pub fn close(&mut self) {
        self.tx.take();
    }

    /// End the stream in an error state. The reader's next read fails once
    /// the queued chunks are consumed. No-op if already closed.
    pub async fn close_with_error(&mut self, error: UpstreamError) {
        if let Some(tx) = self.tx.take() {
            // A vanished reader has nothing left to observe.
            let _ = tx.send(Err(error)).await;
        }
    }

    /// True once this side is closed or the reader has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.as_ref().is_none_or(|tx| tx.is_closed())
    }
}

enum ReadState {
    Open,
    Ended,
    Failed(UpstreamError),
}

pub struct ConduitReader {
    rx: mpsc::Receiver<Message>,
    current: Bytes,
    state: ReadState,
}

impl ConduitReader {
    /// Stop accepting chunks. Subsequent writer sends fail with [`Closed`].
    pub fn close(&mut self) {
        self.rx.close();
        if matches!(self.state, ReadState::Open) {
            self.state = ReadState::Ended;
        }
        self.current.clear();
    }
}

impl Read for ConduitReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while !self.current.has_remaining() {
            match &self.state {
                ReadState::Ended => return Ok(0),
                ReadState::Failed(e) => return Err(io::Error::other(e.clone())),
                ReadState::Open => {}
            }
            match self.rx.blocking_recv() {
                Some(Ok(chunk)) => self.current = chunk,
                Some(Err(e)) => {
                    self.rx.close();
                    self.state = ReadState::Failed(e);
                }
                None => self.state = ReadState::Ended,
            }
        }

        let n = buf.len().min(self.current.remaining());
        self.current.copy_to_slice(&mut buf[..n]);
        Ok(n)
    }
}
