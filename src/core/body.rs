//! Purpose: Bounded in-process pipe that carries a streamed request body to the HTTP client.
//! Exports: `body_pipe`, `BodyWriter`, `BodyReader`, `BODY_CHUNK_LEN`.
//! Role: The encoder thread writes into `BodyWriter`; `ureq` reads from `BodyReader`.
//! Invariants: At most `BODY_CHUNKS_IN_FLIGHT + 2` chunks of `BODY_CHUNK_LEN` bytes exist at once.
//! Invariants: A failed encoder surfaces as a read error, never as a clean end of body.

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};

pub const BODY_CHUNK_LEN: usize = 16 * 1024;
const BODY_CHUNKS_IN_FLIGHT: usize = 4;

#[derive(Debug, Default)]
struct PipeState {
    queued: AtomicUsize,
    peak: AtomicUsize,
    failed: AtomicBool,
}

pub fn body_pipe() -> (BodyWriter, BodyReader) {
    let (sender, receiver) = sync_channel(BODY_CHUNKS_IN_FLIGHT);
    let state = Arc::new(PipeState::default());
    (
        BodyWriter {
            buf: Vec::with_capacity(BODY_CHUNK_LEN),
            sender,
            state: state.clone(),
        },
        BodyReader {
            current: Vec::new(),
            pos: 0,
            receiver,
            state,
        },
    )
}

pub struct BodyWriter {
    buf: Vec<u8>,
    sender: SyncSender<Vec<u8>>,
    state: Arc<PipeState>,
}

impl BodyWriter {
    /// Marks the body as broken; the reader reports an error instead of end of body.
    pub fn fail(&self) {
        self.state.failed.store(true, Ordering::SeqCst);
    }

    fn send_chunk(&mut self) -> io::Result<()> {
        let chunk = std::mem::replace(&mut self.buf, Vec::with_capacity(BODY_CHUNK_LEN));
        let queued = self.state.queued.fetch_add(chunk.len(), Ordering::SeqCst) + chunk.len();
        self.state.peak.fetch_max(queued, Ordering::SeqCst);
        self.sender
            .send(chunk)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "request body reader closed"))
    }
}

impl Write for BodyWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        let len = (BODY_CHUNK_LEN - self.buf.len()).min(data.len());
        self.buf.extend_from_slice(&data[..len]);
        if self.buf.len() == BODY_CHUNK_LEN {
            self.send_chunk()?;
        }
        Ok(len)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        self.send_chunk()
    }
}

pub struct BodyReader {
    current: Vec<u8>,
    pos: usize,
    receiver: Receiver<Vec<u8>>,
    state: Arc<PipeState>,
}

impl BodyReader {
    /// Largest number of body bytes that were encoded but not yet read.
    pub fn peak_buffered(&self) -> usize {
        self.state.peak.load(Ordering::SeqCst)
    }
}

impl Read for BodyReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos >= self.current.len() {
            self.state
                .queued
                .fetch_sub(self.current.len(), Ordering::SeqCst);
            self.current = Vec::new();
            self.pos = 0;
            match self.receiver.recv() {
                Ok(chunk) => self.current = chunk,
                Err(_) if self.state.failed.load(Ordering::SeqCst) => {
                    return Err(io::Error::other("request body encoding failed"));
                }
                Err(_) => return Ok(0),
            }
        }
        let available = &self.current[self.pos..];
        let len = available.len().min(buf.len());
        buf[..len].copy_from_slice(&available[..len]);
        self.pos += len;
        Ok(len)
    }
}
