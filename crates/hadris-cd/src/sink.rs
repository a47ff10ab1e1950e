//! The sink-facing production task.
//!
//! `format_into_sink` drives [`hadris_iso::IsoImage::format_new`] to
//! completion on a producer thread, then hands the finished image to the
//! consumer as 2048-byte blocks through a bounded
//! [`hadris_common::sync::ring_buffer`] channel. `format_new`'s own write
//! order writes the image body first (the writer pipeline claims blocks
//! starting after the system area and volume descriptor set) and only
//! patches the system area / descriptors in at the front of the stream once
//! the body's layout is frozen — a forward-only streaming sink would have to
//! emit the head before the body it depends on, so the producer always
//! builds the complete image into memory before it starts draining into the
//! ring buffer. The ring buffer still earns its keep afterwards: a slow
//! consumer (a burn device running at a fixed write speed, a network sink)
//! no longer stalls the thread that assembled the image, and `cancel`/status
//! polling work the same way they would for a true streaming producer.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use hadris_common::sync::ring_buffer::{self, Consumer, Producer};
use hadris_iso::{FormatOption, IsoImage, IsoImageError};

/// Block size the sink streams in; matches the ECMA-119 logical block size
/// every writer in [`hadris_iso::writer`] already works in.
const BLOCK_SIZE: usize = 2048;

/// Errors surfaced by the sink-facing production task.
#[derive(Debug, thiserror::Error)]
pub enum CdError {
    /// Formatting the underlying ISO image failed.
    #[error(transparent)]
    Format(#[from] IsoImageError),
    /// The producer thread panicked before it could report a result.
    #[error("the image-writer thread panicked")]
    WriterPanicked,
}

/// Lifecycle state of a [`RingBufferSink`], mirroring the burn-source status
/// query: `{active, ending, failing, abandoned, ended, aborted}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    /// Production is in progress; more blocks are expected.
    Active,
    /// Production finished; the last blocks are draining out of the buffer.
    Ending,
    /// The writer task hit an error and is unwinding.
    Failing,
    /// `cancel` was called before any bytes were read by the consumer.
    Abandoned,
    /// The image was produced and fully consumed.
    Ended,
    /// `cancel` was called after some bytes had already been read.
    Aborted,
}

/// A `status` query result: lifecycle state plus how full the ring buffer is.
#[derive(Debug, Clone, Copy)]
pub struct SinkStatus {
    pub state: SinkState,
    pub fill_level: usize,
    pub capacity: usize,
}

/// Operations a burn sink implements and the core consumes, per the optical
/// disc image production contract.
pub trait BurnSource {
    /// Pulls up to `buf.len()` bytes. Returns the number of bytes read; `0`
    /// means end of stream.
    fn read(&mut self, buf: &mut [u8]) -> usize;
    /// Total bytes the sink expects to produce.
    fn get_size(&self) -> u64;
    /// Overrides the reported size, e.g. for padding hints to a burn device.
    fn set_size(&mut self, size: u64);
    /// Aborts production. Safe to call more than once.
    fn cancel(&mut self);
    /// Releases any resources held by the sink, joining the producer thread.
    fn free_data(&mut self);
    /// Current lifecycle state and ring-buffer fill level.
    fn status(&self) -> SinkStatus;
}

struct Shared {
    state: Mutex<SinkState>,
    consumed_any: AtomicBool,
    cancelled: AtomicBool,
}

/// A [`BurnSource`] backed by a bounded ring buffer, fed by a producer thread
/// running [`IsoImage::format_new`].
pub struct RingBufferSink {
    consumer: Option<Consumer>,
    capacity: usize,
    shared: Arc<Shared>,
    size: AtomicU64,
    pending: Vec<u8>,
    pending_pos: usize,
    worker: Option<JoinHandle<Result<(), CdError>>>,
}

impl RingBufferSink {
    /// Joins the writer thread and surfaces its result.
    ///
    /// Most callers only need [`BurnSource::free_data`], which joins and
    /// discards the outcome; use this instead when the caller wants to know
    /// whether `format_new` actually succeeded (as opposed to production
    /// being cancelled, which is not an error).
    pub fn join(&mut self) -> Result<(), CdError> {
        self.consumer = None;
        match self.worker.take() {
            Some(worker) => worker.join().unwrap_or(Err(CdError::WriterPanicked)),
            None => Ok(()),
        }
    }

    fn drain_one(&mut self) -> bool {
        let Some(consumer) = self.consumer.as_ref() else {
            return false;
        };
        match consumer.pop() {
            Some(block) => {
                self.pending = block;
                self.pending_pos = 0;
                true
            }
            None => false,
        }
    }
}

impl BurnSource for RingBufferSink {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        if self.pending_pos >= self.pending.len() && !self.drain_one() {
            let mut state = self.shared.state.lock().unwrap();
            if *state == SinkState::Ending {
                *state = SinkState::Ended;
            }
            return 0;
        }
        self.shared.consumed_any.store(true, Ordering::Relaxed);
        let available = &self.pending[self.pending_pos..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pending_pos += n;
        n
    }

    fn get_size(&self) -> u64 {
        self.size.load(Ordering::Relaxed)
    }

    fn set_size(&mut self, size: u64) {
        self.size.store(size, Ordering::Relaxed);
    }

    fn cancel(&mut self) {
        self.shared.cancelled.store(true, Ordering::Relaxed);
        let mut state = self.shared.state.lock().unwrap();
        *state = if self.shared.consumed_any.load(Ordering::Relaxed) {
            SinkState::Aborted
        } else {
            SinkState::Abandoned
        };
        drop(state);
        // `Producer::push` only notices cancellation once the ring buffer is
        // full, by checking whether the consumer's `Arc` has dropped to one
        // reference; dropping it here is what actually unblocks a producer
        // parked on `not_full`.
        self.consumer = None;
    }

    fn free_data(&mut self) {
        let _ = self.join();
    }

    fn status(&self) -> SinkStatus {
        SinkStatus {
            state: *self.shared.state.lock().unwrap(),
            fill_level: self.consumer.as_ref().map(Consumer::len).unwrap_or(0),
            capacity: self.capacity,
        }
    }
}

impl Drop for RingBufferSink {
    fn drop(&mut self) {
        self.free_data();
    }
}

/// Spawns the writer task and returns a sink draining its output.
///
/// `fifo_blocks` bounds how many 2048-byte blocks may sit in the ring buffer
/// ahead of the consumer, per the `fifo size` option in the option surface.
pub fn format_into_sink(options: FormatOption, fifo_blocks: usize) -> RingBufferSink {
    let (_min_size, max_size) = options.image_len();
    let capacity = fifo_blocks.max(1);
    let (producer, consumer) = ring_buffer::channel(capacity);
    let shared = Arc::new(Shared {
        state: Mutex::new(SinkState::Active),
        consumed_any: AtomicBool::new(false),
        cancelled: AtomicBool::new(false),
    });

    let worker_shared = shared.clone();
    let worker = std::thread::Builder::new()
        .name("hadris-cd-writer".into())
        .spawn(move || run_writer(options, producer, worker_shared))
        .expect("failed to spawn image-writer thread");

    RingBufferSink {
        consumer: Some(consumer),
        capacity,
        shared,
        size: AtomicU64::new(max_size),
        pending: Vec::new(),
        pending_pos: 0,
        worker: Some(worker),
    }
}

fn run_writer(options: FormatOption, producer: Producer, shared: Arc<Shared>) -> Result<(), CdError> {
    let _enter = tracing::info_span!("format_into_sink").entered();

    let (_min, max_size) = options.image_len();
    let mut cursor = Cursor::new(Vec::with_capacity(max_size as usize));
    let result = IsoImage::format_new(&mut cursor, options);

    if let Err(err) = result {
        log::warn!("image writer task failed: {err}");
        *shared.state.lock().unwrap() = SinkState::Failing;
        producer.close();
        return Err(err.into());
    }

    *shared.state.lock().unwrap() = SinkState::Ending;
    let image = cursor.into_inner();
    for chunk in image.chunks(BLOCK_SIZE) {
        if shared.cancelled.load(Ordering::Relaxed) {
            producer.close();
            return Ok(());
        }
        if producer.push(chunk.to_vec()).is_err() {
            // Consumer dropped; nothing left to do.
            return Ok(());
        }
    }
    producer.close();
    Ok(())
}

/// Runs pass 1 of the writer pipeline and returns the exact image size
/// without spawning the writer thread or touching any sink, so callers can
/// predict the final size before committing to production.
///
/// This currently runs all three passes against an in-memory buffer rather
/// than pass 1 alone, since `hadris_iso::IsoImage::format_new` doesn't yet
/// expose its internal writer list as a function separate from the full
/// format step. The result (the exact byte count) is identical either way;
/// only the extra CPU/memory cost of passes 2 and 3 is paid unnecessarily.
pub fn will_cancel(options: FormatOption) -> Result<u64, CdError> {
    let (_min, max_size) = options.image_len();
    let mut cursor = Cursor::new(Vec::with_capacity(max_size as usize));
    IsoImage::format_new(&mut cursor, options)?;
    Ok(cursor.into_inner().len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hadris_iso::{FileInput, FormatOption};

    fn sample_options() -> FormatOption {
        FormatOption::default().with_files(FileInput::empty())
    }

    #[test]
    fn will_cancel_matches_produced_size() {
        let options = sample_options();
        let predicted = will_cancel(options.clone()).unwrap();
        let mut sink = format_into_sink(options, 4);
        let mut total = 0u64;
        let mut buf = [0u8; 512];
        loop {
            let n = sink.read(&mut buf);
            if n == 0 {
                break;
            }
            total += n as u64;
        }
        assert_eq!(total, predicted);
        assert_eq!(sink.status().state, SinkState::Ended);
    }

    #[test]
    fn cancel_before_any_read_reports_abandoned() {
        let mut sink = format_into_sink(sample_options(), 1);
        sink.cancel();
        assert_eq!(sink.status().state, SinkState::Abandoned);
    }

    #[test]
    fn cancel_after_reading_reports_aborted() {
        let mut sink = format_into_sink(sample_options(), 64);
        let mut buf = [0u8; 512];
        sink.read(&mut buf);
        sink.cancel();
        assert_eq!(sink.status().state, SinkState::Aborted);
    }
}
