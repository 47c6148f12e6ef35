//! Sink stage: drains decoded PCM to a [`SinkAdapter`], reopening on format changes and
//! reporting byte position after every flush (spec §4.7).

use crate::adapter::SinkAdapter;
use crate::codec::PcmFormat;
use crate::element::{ElementIo, ElementSpec, IoOutcome, ProcessOutcome};
use crate::error::{Error, Result};
use crate::events::{ElementStatus, TaggedEvent};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

const TAG: &str = "sink";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Format {
    samplerate: u32,
    channels: u16,
}

pub struct Sink<S: SinkAdapter> {
    adapter: S,
    handle: Option<S::Handle>,
    current_format: Option<Format>,
    pending_format: Format,
    /// Set by the decoder stage once it determines the real PCM format (spec §4.7); checked
    /// before every open/reopen so a mid-stream format change (AAC ADTS, whose sr/ch aren't
    /// known until the first frame decodes) takes effect without the player reaching in.
    shared_format: Arc<Mutex<Option<PcmFormat>>>,
    byte_pos: u64,
    read_chunk: usize,
    events: Sender<TaggedEvent>,
}

impl<S: SinkAdapter> Sink<S> {
    pub fn new(
        adapter: S,
        read_chunk: usize,
        events: Sender<TaggedEvent>,
        shared_format: Arc<Mutex<Option<PcmFormat>>>,
    ) -> Self {
        Self {
            adapter,
            handle: None,
            current_format: None,
            pending_format: Format::default(),
            shared_format,
            byte_pos: 0,
            read_chunk,
            events,
        }
    }

    /// Set the format to open with before the decoder has reported anything of its own
    /// (parser-derived, e.g. WAV's header or M4A's `stsd`). A later `shared_format` update
    /// from the decoder takes precedence.
    pub fn set_format(&mut self, samplerate: u32, channels: u16) {
        self.pending_format = Format { samplerate, channels };
    }

    fn ensure_open(&mut self) -> Result<()> {
        if let Some(fmt) = self.shared_format.lock().unwrap().take() {
            self.pending_format = Format { samplerate: fmt.samplerate, channels: fmt.channels };
        }
        if self.current_format == Some(self.pending_format) && self.handle.is_some() {
            return Ok(());
        }
        if let Some(handle) = self.handle.take() {
            self.adapter.close(handle);
        }
        let handle = self
            .adapter
            .open(self.pending_format.samplerate, self.pending_format.channels)
            .ok_or_else(|| Error::Adapter("sink open failed".into()))?;
        self.handle = Some(handle);
        self.current_format = Some(self.pending_format);
        Ok(())
    }
}

impl<S: SinkAdapter> ElementSpec for Sink<S> {
    fn open(&mut self) -> Result<()> {
        self.byte_pos = 0;
        self.current_format = None;
        Ok(())
    }

    fn process(&mut self, io: &mut ElementIo) -> ProcessOutcome {
        let mut scratch = vec![0u8; self.read_chunk];
        let n = match io.input(&mut scratch) {
            IoOutcome::Ok(0) => return ProcessOutcome::Done,
            IoOutcome::Ok(n) => n,
            IoOutcome::Done => return ProcessOutcome::Done,
            IoOutcome::Aborted => return ProcessOutcome::Abort,
            IoOutcome::TimedOut => return ProcessOutcome::Timeout,
        };
        if let Err(_err) = self.ensure_open() {
            return ProcessOutcome::Fail;
        }
        let handle = match &mut self.handle {
            Some(h) => h,
            None => return ProcessOutcome::Fail,
        };
        match self.adapter.write(handle, &scratch[..n]) {
            Ok(written) => {
                self.byte_pos += written as u64;
                let _ = self.events.send(TaggedEvent {
                    tag: TAG.into(),
                    status: ElementStatus::ReportPosition { byte_pos: self.byte_pos },
                });
                ProcessOutcome::Progressed(written)
            }
            Err(_) => ProcessOutcome::Fail,
        }
    }

    fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.adapter.close(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::fakes::RecordingSink;
    use crate::element::Element;
    use crate::ringbuffer::RingBuffer;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn writes_all_bytes_and_reports_position() {
        let rb = RingBuffer::new(64);
        rb.write(&[1, 2, 3, 4, 5, 6, 7, 8], None);
        rb.done_write();

        let recording = RecordingSink::default();
        let (status_tx, status_rx) = mpsc::channel();
        let mut sink = Sink::new(recording.clone(), 4, status_tx, Arc::new(Mutex::new(None)));
        sink.set_format(44_100, 2);

        let (tx, _rx) = mpsc::channel();
        let element = Element::init("sink", Box::new(sink))
            .with_input_ringbuf(rb)
            .run(tx, Duration::from_millis(100));
        element.resume();
        let state = element.wait_for_stop(Duration::from_secs(2));
        assert_eq!(state, crate::element::State::Finished);

        assert_eq!(*recording.written.lock().unwrap(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(recording.opens.lock().unwrap().len(), 1);

        let mut last_pos = 0;
        while let Ok(TaggedEvent { status: ElementStatus::ReportPosition { byte_pos }, .. }) =
            status_rx.try_recv()
        {
            last_pos = byte_pos;
        }
        assert_eq!(last_pos, 8);
        element.terminate();
    }
}
