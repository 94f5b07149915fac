//! An in-process stream transport, connecting a [MemoryWriter] and a [MemoryReader] through a
//!  shared buffer.
//!
//! It behaves like the stream transports the framing layer is designed for:
//!
//! * the transmit buffer has a fixed capacity, and writes that do not fit are accepted only
//!   partially
//! * each write marks a potential frame start, which `seek_frame_start` can find
//! * gaps in the stream can be simulated, and the reader then sees [ReadOutcome::Broken]
//!   when it reaches the gap
//!
//! Positions are tracked as absolute stream offsets, i.e. the number of bytes that ever went
//!  through the stream before them.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};
use crate::transport::{FlushMode, ReadOutcome, StreamReader, StreamWriter};

struct MemoryStreamInner {
    tx_capacity: usize,
    data: VecDeque<u8>,
    /// absolute offset of the first byte in `data`
    read_pos: u64,
    /// absolute offsets of frame starts that were not read past yet, ascending
    frame_starts: VecDeque<u64>,
    /// absolute offsets of discontinuities, ascending
    breaks: VecDeque<u64>,
    read_chunk: Option<usize>,
    num_flushes: usize,
    last_flush_mode: Option<FlushMode>,
}

impl MemoryStreamInner {
    fn write_pos(&self) -> u64 {
        self.read_pos + self.data.len() as u64
    }

    fn append(&mut self, buf: &[u8], frame_start: bool) {
        if frame_start {
            let write_pos = self.write_pos();
            if self.frame_starts.back() != Some(&write_pos) {
                self.frame_starts.push_back(write_pos);
            }
        }
        self.data.extend(buf);
    }

    /// discard `n` buffered bytes at the read position
    fn consume(&mut self, n: usize) {
        self.data.drain(..n);
        self.read_pos += n as u64;

        while let Some(&pos) = self.frame_starts.front() {
            if pos >= self.read_pos {
                break;
            }
            self.frame_starts.pop_front();
        }
    }

    fn remove_breaks_up_to(&mut self, pos: u64) {
        while let Some(&b) = self.breaks.front() {
            if b > pos {
                break;
            }
            self.breaks.pop_front();
        }
    }
}

/// Shared handle for creating reader / writer and for controlling the stream
#[derive(Clone)]
pub struct MemoryStream {
    inner: Arc<Mutex<MemoryStreamInner>>,
}

impl MemoryStream {
    pub fn new(tx_capacity: usize) -> MemoryStream {
        MemoryStream {
            inner: Arc::new(Mutex::new(MemoryStreamInner {
                tx_capacity,
                data: VecDeque::new(),
                read_pos: 0,
                frame_starts: VecDeque::new(),
                breaks: VecDeque::new(),
                read_chunk: None,
                num_flushes: 0,
                last_flush_mode: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryStreamInner> {
        // the inner state is consistent after every operation, so a panicking holder can not
        //  leave it corrupted
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn writer(&self) -> MemoryWriter {
        MemoryWriter { stream: self.clone() }
    }

    pub fn reader(&self) -> MemoryReader {
        MemoryReader { stream: self.clone() }
    }

    /// number of bytes written but not read yet
    pub fn buffered_len(&self) -> usize {
        self.lock().data.len()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.lock().data.iter().copied().collect()
    }

    pub fn num_flushes(&self) -> usize {
        self.lock().num_flushes
    }

    pub fn last_flush_mode(&self) -> Option<FlushMode> {
        self.lock().last_flush_mode
    }

    pub fn set_tx_capacity(&self, tx_capacity: usize) {
        self.lock().tx_capacity = tx_capacity;
    }

    /// Limits the number of bytes returned by a single read, `None` for no limit
    pub fn set_read_chunk(&self, read_chunk: Option<usize>) {
        self.lock().read_chunk = read_chunk;
    }

    /// Appends bytes bypassing the transmit capacity, e.g. to inject malformed data
    pub fn push_raw(&self, data: &[u8], frame_start: bool) {
        self.lock().append(data, frame_start);
    }

    /// Marks a discontinuity after all data written so far. The reader gets
    ///  [ReadOutcome::Broken] once it reaches this position.
    pub fn break_stream(&self) {
        let mut inner = self.lock();
        let pos = inner.write_pos();
        debug!("memory stream: discontinuity at offset {}", pos);
        inner.breaks.push_back(pos);
    }

    /// Simulates data loss: up to `n` unread bytes are dropped, and the reader sees a
    ///  discontinuity in their place
    pub fn drop_bytes(&self, n: usize) {
        let mut inner = self.lock();
        let n = n.min(inner.data.len());
        inner.consume(n);
        let pos = inner.read_pos;
        debug!("memory stream: dropped {} bytes, discontinuity at offset {}", n, pos);
        inner.remove_breaks_up_to(pos);
        inner.breaks.push_front(pos);
    }
}

pub struct MemoryWriter {
    stream: MemoryStream,
}

impl StreamWriter for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut inner = self.stream.lock();
        let free = inner.tx_capacity.saturating_sub(inner.data.len());
        let accepted = buf.len().min(free);
        if accepted > 0 {
            inner.append(&buf[..accepted], true);
        }
        trace!("memory stream: accepted {} of {} bytes", accepted, buf.len());
        Ok(accepted)
    }

    fn flush(&mut self, _blocking: bool, mode: FlushMode) -> std::io::Result<()> {
        let mut inner = self.stream.lock();
        inner.num_flushes += 1;
        inner.last_flush_mode = Some(mode);
        Ok(())
    }
}

pub struct MemoryReader {
    stream: MemoryStream,
}

impl StreamReader for MemoryReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<ReadOutcome> {
        let mut inner = self.stream.lock();

        let read_pos = inner.read_pos;
        if inner.breaks.front() == Some(&read_pos) {
            inner.breaks.pop_front();
            return Ok(ReadOutcome::Broken);
        }

        let mut n = buf.len().min(inner.data.len());
        if let Some(chunk) = inner.read_chunk {
            n = n.min(chunk);
        }
        if let Some(&next_break) = inner.breaks.front() {
            // reads never extend across a discontinuity
            n = n.min((next_break - read_pos) as usize);
        }

        for (dst, src) in buf[..n].iter_mut().zip(inner.data.iter()) {
            *dst = *src;
        }
        inner.consume(n);
        Ok(ReadOutcome::Data(n))
    }

    fn seek_frame_start(&mut self) -> std::io::Result<bool> {
        let mut inner = self.stream.lock();

        let Some(&frame_start) = inner.frame_starts.front() else {
            // nothing buffered can be the start of a frame
            let n = inner.data.len();
            inner.consume(n);
            let read_pos = inner.read_pos;
            inner.remove_breaks_up_to(read_pos);
            return Ok(false);
        };

        let skipped = (frame_start - inner.read_pos) as usize;
        if skipped > 0 {
            trace!("memory stream: skipping {} bytes to the next frame start", skipped);
        }
        inner.consume(skipped);
        inner.remove_breaks_up_to(frame_start);
        Ok(true)
    }
}
