//! Push-to-pull bridge for response bodies.
//!
//! The transport pushes bytes as they arrive through a [`ChunkWriter`];
//! the caller pulls fixed-size chunks from the paired [`ChunkReader`],
//! either blocking its thread or suspending its task. Both pull styles
//! see the same chunk boundaries and the same completion.
//!
//! Chunking: bytes accumulate until `chunk_size` are available, then a
//! chunk of exactly `chunk_size` is released. On completion the leftover
//! (possibly short) buffer is released as the last chunk.
//!
//! Backpressure: released chunks travel through a bounded tokio channel
//! of [`CHANNEL_CAPACITY`] chunks. A producer that gets that far ahead of
//! the consumer waits in `write` until a chunk is pulled.
//!
//! Early close: dropping or closing the reader discards anything queued.
//! Pending and later writes fail with [`Error::StreamClosed`] so the
//! producer can stop.

use bytes::{Bytes, BytesMut};
use futures::Stream;
use tokio::sync::mpsc;

use crate::error::{Error, NetworkError, NetworkErrorCode, Result};

/// Default size of chunks handed to the consumer.
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// Released chunks that may wait for the consumer before `write` blocks.
pub const CHANNEL_CAPACITY: usize = 32;

/// Create a connected writer/reader pair.
pub fn channel(chunk_size: usize) -> (ChunkWriter, ChunkReader) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    (
        ChunkWriter {
            tx,
            partial: BytesMut::new(),
            chunk_size: chunk_size.max(1),
        },
        ChunkReader { rx, done: false },
    )
}

enum Frame {
    Data(Bytes),
    End,
    Failed(NetworkError),
}

/// Producer half, owned by the transport.
///
/// Dropping a writer without [`finish`](Self::finish) ends the body with
/// an `Aborted` network error.
pub struct ChunkWriter {
    tx: mpsc::Sender<Frame>,
    partial: BytesMut,
    chunk_size: usize,
}

impl ChunkWriter {
    /// Buffer `data` and cut off every full chunk.
    fn fill(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        if self.tx.is_closed() {
            tracing::trace!(len = data.len(), "reader closed, dropping body bytes");
            return Err(Error::StreamClosed);
        }
        self.partial.extend_from_slice(data);
        let mut full = Vec::with_capacity(self.partial.len() / self.chunk_size);
        while self.partial.len() >= self.chunk_size {
            full.push(self.partial.split_to(self.chunk_size).freeze());
        }
        Ok(full)
    }

    /// Short tail (if any) followed by the completion marker.
    fn closing(&mut self, error: Option<NetworkError>) -> Vec<Frame> {
        let mut frames = Vec::with_capacity(2);
        if !self.partial.is_empty() {
            frames.push(Frame::Data(self.partial.split().freeze()));
        }
        frames.push(match error {
            Some(err) => {
                tracing::debug!(error = %err, "body stream finished with error");
                Frame::Failed(err)
            }
            None => Frame::End,
        });
        frames
    }

    /// Push received bytes, waiting while the channel is full.
    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        for chunk in self.fill(data)? {
            self.tx
                .send(Frame::Data(chunk))
                .await
                .map_err(|_| Error::StreamClosed)?;
        }
        Ok(())
    }

    /// Blocking variant of [`write`](Self::write) for producer threads.
    ///
    /// Must not be called from inside a tokio runtime.
    pub fn write_blocking(&mut self, data: &[u8]) -> Result<()> {
        for chunk in self.fill(data)? {
            self.tx
                .blocking_send(Frame::Data(chunk))
                .map_err(|_| Error::StreamClosed)?;
        }
        Ok(())
    }

    /// Signal completion, optionally with the failure that ended the body.
    pub async fn finish(mut self, error: Option<NetworkError>) -> Result<()> {
        for frame in self.closing(error) {
            self.tx.send(frame).await.map_err(|_| Error::StreamClosed)?;
        }
        Ok(())
    }

    /// Blocking variant of [`finish`](Self::finish).
    pub fn finish_blocking(mut self, error: Option<NetworkError>) -> Result<()> {
        for frame in self.closing(error) {
            self.tx.blocking_send(frame).map_err(|_| Error::StreamClosed)?;
        }
        Ok(())
    }

    /// Whether the consumer has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half: a pull sequence of chunks.
pub struct ChunkReader {
    rx: mpsc::Receiver<Frame>,
    done: bool,
}

impl ChunkReader {
    fn resolve(&mut self, frame: Option<Frame>) -> Result<Option<Bytes>> {
        match frame {
            Some(Frame::Data(chunk)) => Ok(Some(chunk)),
            Some(Frame::End) => {
                self.done = true;
                Ok(None)
            }
            Some(Frame::Failed(err)) => {
                self.done = true;
                Err(Error::Network(err))
            }
            None => {
                self.done = true;
                Err(Error::network(
                    NetworkErrorCode::Aborted,
                    "body producer dropped before completion",
                ))
            }
        }
    }

    /// Wait (suspending the task) for the next chunk.
    ///
    /// `Ok(None)` marks the natural end. A transport failure is returned
    /// once, after every chunk received before it.
    pub async fn next(&mut self) -> Result<Option<Bytes>> {
        if self.done {
            return Ok(None);
        }
        let frame = self.rx.recv().await;
        self.resolve(frame)
    }

    /// Wait (blocking the thread) for the next chunk.
    ///
    /// Must not be called from inside a tokio runtime.
    pub fn next_blocking(&mut self) -> Result<Option<Bytes>> {
        if self.done {
            return Ok(None);
        }
        let frame = self.rx.blocking_recv();
        self.resolve(frame)
    }

    /// Stop consuming. Queued chunks are dropped and a waiting producer
    /// is released with `StreamClosed`.
    pub fn close(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        self.rx.close();
        let mut dropped = 0;
        let mut finished = false;
        while let Ok(frame) = self.rx.try_recv() {
            match frame {
                Frame::Data(_) => dropped += 1,
                Frame::End | Frame::Failed(_) => finished = true,
            }
        }
        if dropped > 0 || !finished {
            tracing::debug!(dropped, "body reader closed before completion");
        }
    }

    /// Read everything that remains into one buffer.
    pub async fn collect(&mut self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.next().await? {
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }

    pub fn collect_blocking(&mut self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.next_blocking()? {
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }

    /// Async stream adapter.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes>> + Send {
        futures::stream::unfold(self, |mut reader| async move {
            match reader.next().await {
                Ok(Some(chunk)) => Some((Ok(chunk), reader)),
                Ok(None) => None,
                Err(e) => Some((Err(e), reader)),
            }
        })
    }

    /// Blocking iterator adapter.
    pub fn into_iter_blocking(self) -> BlockingChunks {
        BlockingChunks { reader: self }
    }
}

impl Drop for ChunkReader {
    fn drop(&mut self) {
        if !self.done {
            self.close();
        }
    }
}

/// Iterator over chunks that blocks between items.
pub struct BlockingChunks {
    reader: ChunkReader,
}

impl Iterator for BlockingChunks {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.next_blocking().transpose()
    }
}
