//! Media source: the element that pulls compressed bytes from a [`SourceAdapter`] into the
//! first ringbuffer of a pipeline (spec §4.4).
//!
//! This is the one stage built directly as an [`ElementSpec`] in this crate rather than
//! left to an embedder, because "read from an adapter into a ringbuffer, reporting a cache
//! threshold exactly once" has no adapter-specific behavior worth abstracting further.

use crate::adapter::SourceAdapter;
use crate::element::{ElementIo, ElementSpec, IoOutcome, ProcessOutcome};
use crate::error::{Error, Result};
use crate::events::{ElementStatus, TaggedEvent};
use crate::ringbuffer::RingBuffer;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

const TAG: &str = "source";

/// Shared, lock-guarded fields the player reads from other threads (position, etc. are
/// tracked on [`crate::element::ElementInfo`] instead; this struct only holds source-local
/// bookkeeping that doesn't belong there).
struct Shared {
    threshold_reached: bool,
}

/// Reads from a [`SourceAdapter`] and writes straight through to the output ringbuffer,
/// in fixed-size chunks, until EOF or a seek repositions the adapter.
pub struct MediaSource<A: SourceAdapter> {
    adapter: A,
    handle: Option<A::Handle>,
    uri: String,
    content_pos: u64,
    read_chunk: usize,
    cache_threshold_bytes: u64,
    bytes_since_open: u64,
    shared: Arc<Mutex<Shared>>,
    events: Sender<TaggedEvent>,
    pending_seek: Option<u64>,
    /// The same ringbuffer wired up as this element's output endpoint. `process` writes to
    /// it only through `ElementIo`; this clone exists so `close` can mark it done on EOF,
    /// the same way `pipeline.rs`'s `Producer::close` signals its downstream reader.
    output_rb: RingBuffer,
}

impl<A: SourceAdapter> MediaSource<A> {
    pub fn new(
        adapter: A,
        uri: impl Into<String>,
        content_pos: u64,
        read_chunk: usize,
        cache_threshold_bytes: u64,
        events: Sender<TaggedEvent>,
        output_rb: RingBuffer,
    ) -> Self {
        Self {
            adapter,
            handle: None,
            uri: uri.into(),
            content_pos,
            read_chunk,
            cache_threshold_bytes,
            bytes_since_open: 0,
            shared: Arc::new(Mutex::new(Shared { threshold_reached: false })),
            events,
            pending_seek: None,
            output_rb,
        }
    }

    fn emit(&self, status: ElementStatus) {
        let _ = self.events.send(TaggedEvent { tag: TAG.into(), status });
    }
}

impl<A: SourceAdapter> ElementSpec for MediaSource<A> {
    fn open(&mut self) -> Result<()> {
        let pos = self.pending_seek.take().unwrap_or(self.content_pos);
        let handle = self
            .adapter
            .open(&self.uri, pos)
            .ok_or_else(|| Error::Adapter(format!("failed to open {}", self.uri)))?;
        self.handle = Some(handle);
        self.bytes_since_open = 0;
        self.shared.lock().unwrap().threshold_reached = false;
        Ok(())
    }

    fn process(&mut self, io: &mut ElementIo) -> ProcessOutcome {
        let handle = match &mut self.handle {
            Some(h) => h,
            None => return ProcessOutcome::Fail,
        };
        let mut scratch = vec![0u8; self.read_chunk];
        let n = match self.adapter.read(handle, &mut scratch) {
            Ok(0) => {
                self.emit(ElementStatus::InputDone);
                return ProcessOutcome::Done;
            }
            Ok(n) => n,
            Err(_) => return ProcessOutcome::Fail,
        };
        match io.output(&scratch[..n]) {
            IoOutcome::Ok(written) => {
                self.bytes_since_open += written as u64;
                let mut shared = self.shared.lock().unwrap();
                if !shared.threshold_reached && self.bytes_since_open >= self.cache_threshold_bytes
                {
                    shared.threshold_reached = true;
                    drop(shared);
                    self.emit(ElementStatus::ReachThreshold);
                }
                ProcessOutcome::Progressed(written)
            }
            IoOutcome::Done => ProcessOutcome::Done,
            IoOutcome::Aborted => ProcessOutcome::Abort,
            IoOutcome::TimedOut => ProcessOutcome::Timeout,
        }
    }

    fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.adapter.close(handle);
        }
        self.output_rb.done_write();
    }

    fn seek(&mut self, offset: u64) {
        // Deferred: applied the next time `open` runs (the runtime always closes before a
        // fresh RESUME, so this only matters if a caller seeks while the element is still
        // running — in that case the pipeline is expected to stop/reopen around the seek,
        // per spec §4.8's "seek reinitializes the source from the target offset").
        self.pending_seek = Some(offset);
    }
}
