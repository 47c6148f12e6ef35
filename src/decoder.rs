//! Decoder stage: the `ElementSpec` that feeds raw bytes from the source ringbuffer to a
//! [`CodecWrapper`], framing them first when the codec needs whole frames (spec §4.6).
//!
//! Framing strategy differs per container, matching spec §4.5/§4.6's feeder description:
//! - WAV: already linear PCM, no framing — bytes are handed to [`crate::codec::PcmPassthrough`]
//!   as they arrive.
//! - MP3/AAC: bytes accumulate in a staging buffer (spec's `buf_in`, capped per
//!   [`crate::config::EngineConfig::mp3_input_buffer`]) until a sync word is found; the framed
//!   slice is then handed to the codec.
//! - M4A: frame sizes are already known from the `stsz` table, so the feeder reads exactly
//!   one sample's worth of bytes per iteration instead of scanning for a sync word.

use crate::codec::{CodecOutcome, CodecWrapper, PcmFormat};
use crate::codec_type::CodecType;
use crate::demux::{aac, m4a, mp3};
use crate::element::{ElementIo, ElementSpec, IoOutcome, ProcessOutcome};
use crate::error::Result;
use crate::events::{ElementStatus, TaggedEvent};
use crate::ringbuffer::RingBuffer;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

const TAG: &str = "decoder";

enum Framing {
    /// No framing: hand whatever bytes arrive straight to the codec (WAV).
    None,
    /// Scan an accumulator for a sync word before framing (MP3/AAC).
    SyncWord { accumulator: Vec<u8>, cap: usize },
    /// Read exactly `sample_sizes[next_index]` bytes per iteration (M4A).
    SampleTable { table: m4a::SampleTable, next_index: u32 },
}

pub struct DecoderStage {
    codec_type: CodecType,
    codec: Box<dyn CodecWrapper>,
    framing: Framing,
    music_info_reported: bool,
    events: Sender<TaggedEvent>,
    /// Shared with the sink stage: the first decoded frame's format is published here so the
    /// sink can reopen with the real format instead of whatever the parser guessed up front
    /// (spec §4.7 — matters most for AAC ADTS, whose sr/ch only becomes known mid-stream).
    shared_format: Arc<Mutex<Option<PcmFormat>>>,
    retry_budget: u32,
    retries_used: u32,
    /// The same ringbuffer wired up as this element's output endpoint, kept so `close` can
    /// mark it done on EOF and let the sink stage observe end-of-stream instead of timing
    /// out forever waiting for bytes that will never arrive.
    output_rb: RingBuffer,
}

impl DecoderStage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        codec_type: CodecType,
        codec: Box<dyn CodecWrapper>,
        mp3_input_buffer: usize,
        m4a_table: Option<m4a::SampleTable>,
        retry_budget: u32,
        events: Sender<TaggedEvent>,
        shared_format: Arc<Mutex<Option<PcmFormat>>>,
        output_rb: RingBuffer,
    ) -> Self {
        let framing = match codec_type {
            CodecType::Wav => Framing::None,
            CodecType::Mp3 | CodecType::AacAdts => {
                Framing::SyncWord { accumulator: Vec::with_capacity(mp3_input_buffer), cap: mp3_input_buffer }
            }
            CodecType::M4a => Framing::SampleTable {
                table: m4a_table.expect("m4a decoder stage requires a parsed sample table"),
                next_index: 0,
            },
        };
        Self {
            codec_type,
            codec,
            framing,
            music_info_reported: false,
            events,
            shared_format,
            retry_budget,
            retries_used: 0,
            output_rb,
        }
    }

    fn report_music_info_if_new(&mut self) {
        if self.music_info_reported {
            return;
        }
        if let Some(fmt) = self.codec.format() {
            self.music_info_reported = true;
            *self.shared_format.lock().unwrap() = Some(fmt);
            let _ = self.events.send(TaggedEvent {
                tag: TAG.into(),
                status: ElementStatus::ReportMusicInfo {
                    samplerate: fmt.samplerate,
                    channels: fmt.channels,
                    bits: fmt.bits,
                },
            });
        }
    }
}

impl ElementSpec for DecoderStage {
    fn open(&mut self) -> Result<()> {
        self.codec.init()
    }

    fn process(&mut self, io: &mut ElementIo) -> ProcessOutcome {
        match &mut self.framing {
            Framing::None => process_unframed(
                io,
                &mut *self.codec,
                &self.events,
                &self.shared_format,
                &mut self.music_info_reported,
            ),
            Framing::SyncWord { .. } => {
                let outcome = process_sync_word(
                    io,
                    &mut *self.codec,
                    self.codec_type,
                    &mut self.framing,
                );
                if outcome == ProcessOutcome::ProcessFail {
                    self.retries_used += 1;
                    if self.retries_used < self.retry_budget {
                        return ProcessOutcome::Progressed(0);
                    }
                } else if matches!(outcome, ProcessOutcome::Progressed(_)) {
                    self.retries_used = 0;
                }
                self.report_music_info_if_new();
                outcome
            }
            Framing::SampleTable { .. } => {
                let outcome = process_sample_table(io, &mut *self.codec, &mut self.framing);
                self.report_music_info_if_new();
                outcome
            }
        }
    }

    fn close(&mut self) {
        self.codec.deinit();
        self.output_rb.done_write();
    }
}

fn process_unframed(
    io: &mut ElementIo,
    codec: &mut dyn CodecWrapper,
    events: &Sender<TaggedEvent>,
    shared_format: &Arc<Mutex<Option<PcmFormat>>>,
    music_info_reported: &mut bool,
) -> ProcessOutcome {
    let mut buf = [0u8; 4096];
    match io.input(&mut buf) {
        IoOutcome::Ok(0) => ProcessOutcome::Done,
        IoOutcome::Ok(n) => {
            let mut out = Vec::new();
            match codec.run(&buf[..n], &mut out) {
                Ok((_, CodecOutcome::Produced(_))) => {
                    if !*music_info_reported {
                        if let Some(fmt) = codec.format() {
                            *music_info_reported = true;
                            *shared_format.lock().unwrap() = Some(fmt);
                            let _ = events.send(TaggedEvent {
                                tag: TAG.into(),
                                status: ElementStatus::ReportMusicInfo {
                                    samplerate: fmt.samplerate,
                                    channels: fmt.channels,
                                    bits: fmt.bits,
                                },
                            });
                        }
                    }
                    match io.output(&out) {
                        IoOutcome::Ok(_) => ProcessOutcome::Progressed(out.len().max(1)),
                        IoOutcome::Done => ProcessOutcome::Done,
                        IoOutcome::Aborted => ProcessOutcome::Abort,
                        IoOutcome::TimedOut => ProcessOutcome::Timeout,
                    }
                }
                Ok((_, CodecOutcome::Done)) => ProcessOutcome::Done,
                Ok((_, CodecOutcome::BadFrame)) => ProcessOutcome::ProcessFail,
                Err(_) => ProcessOutcome::Fail,
            }
        }
        IoOutcome::Done => ProcessOutcome::Done,
        IoOutcome::Aborted => ProcessOutcome::Abort,
        IoOutcome::TimedOut => ProcessOutcome::Timeout,
    }
}

fn process_sync_word(
    io: &mut ElementIo,
    codec: &mut dyn CodecWrapper,
    codec_type: CodecType,
    framing: &mut Framing,
) -> ProcessOutcome {
    let Framing::SyncWord { accumulator, cap } = framing else {
        unreachable!()
    };

    if accumulator.len() < *cap {
        let mut scratch = vec![0u8; cap.saturating_sub(accumulator.len())];
        match io.input(&mut scratch) {
            IoOutcome::Ok(0) => {}
            IoOutcome::Ok(n) => accumulator.extend_from_slice(&scratch[..n]),
            IoOutcome::Done => {}
            IoOutcome::Aborted => return ProcessOutcome::Abort,
            IoOutcome::TimedOut => return ProcessOutcome::Timeout,
        }
    }

    let frame = match codec_type {
        CodecType::Mp3 => mp3::find_frame(accumulator),
        CodecType::AacAdts => aac::find_frame(accumulator),
        _ => unreachable!("sync-word framing only used for mp3/aac"),
    };

    let Some(frame) = frame else {
        if accumulator.is_empty() {
            return ProcessOutcome::Done;
        }
        // No sync in the whole staging buffer: drop one byte and keep scanning, matching
        // the original feeder's "advance one byte and rescan" recovery.
        accumulator.remove(0);
        return ProcessOutcome::ProcessFail;
    };

    if frame.offset > 0 {
        accumulator.drain(..frame.offset);
    }
    let frame_bytes: Vec<u8> = accumulator.drain(..frame.size).collect();

    let mut out = Vec::new();
    match codec.run(&frame_bytes, &mut out) {
        Ok((_, CodecOutcome::Produced(_))) => match io.output(&out) {
            IoOutcome::Ok(_) => ProcessOutcome::Progressed(out.len().max(1)),
            IoOutcome::Done => ProcessOutcome::Done,
            IoOutcome::Aborted => ProcessOutcome::Abort,
            IoOutcome::TimedOut => ProcessOutcome::Timeout,
        },
        Ok((_, CodecOutcome::Done)) => ProcessOutcome::Done,
        Ok((_, CodecOutcome::BadFrame)) => ProcessOutcome::ProcessFail,
        Err(_) => ProcessOutcome::Fail,
    }
}

fn process_sample_table(
    io: &mut ElementIo,
    codec: &mut dyn CodecWrapper,
    framing: &mut Framing,
) -> ProcessOutcome {
    let Framing::SampleTable { table, next_index } = framing else {
        unreachable!()
    };

    if *next_index >= table.sample_count {
        return ProcessOutcome::Done;
    }
    let size = match table.sample_sizes.size_of(*next_index as usize) {
        Some(s) if s > 0 => s as usize,
        _ => return ProcessOutcome::Done,
    };

    let mut sample = vec![0u8; size];
    let mut filled = 0;
    while filled < size {
        match io.input(&mut sample[filled..]) {
            IoOutcome::Ok(0) => return ProcessOutcome::Done,
            IoOutcome::Ok(n) => filled += n,
            IoOutcome::Done => return ProcessOutcome::Done,
            IoOutcome::Aborted => return ProcessOutcome::Abort,
            IoOutcome::TimedOut => return ProcessOutcome::Timeout,
        }
    }
    *next_index += 1;

    let mut out = Vec::new();
    match codec.run(&sample, &mut out) {
        Ok((_, CodecOutcome::Produced(_))) => match io.output(&out) {
            IoOutcome::Ok(_) => ProcessOutcome::Progressed(out.len().max(1)),
            IoOutcome::Done => ProcessOutcome::Done,
            IoOutcome::Aborted => ProcessOutcome::Abort,
            IoOutcome::TimedOut => ProcessOutcome::Timeout,
        },
        Ok((_, CodecOutcome::Done)) => ProcessOutcome::Done,
        Ok((_, CodecOutcome::BadFrame)) => ProcessOutcome::ProcessFail,
        Err(_) => ProcessOutcome::Fail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PcmPassthrough;
    use crate::element::Element;
    use crate::ringbuffer::RingBuffer;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn wav_decoder_stage_passes_pcm_through() {
        let input_rb = RingBuffer::new(256);
        let output_rb = RingBuffer::new(256);
        let samples: Vec<u8> = (0u8..40).collect();
        input_rb.write(&samples, None);
        input_rb.done_write();

        let (events_tx, _events_rx) = mpsc::channel();
        let codec = Box::new(PcmPassthrough::new(44_100, 2, 16));
        let stage = DecoderStage::new(
            CodecType::Wav,
            codec,
            1940,
            None,
            4,
            events_tx,
            Arc::new(Mutex::new(None)),
            output_rb.clone(),
        );

        let (tx, _rx) = mpsc::channel();
        let element = Element::init("decoder", Box::new(stage))
            .with_input_ringbuf(input_rb)
            .with_output_ringbuf(output_rb.clone())
            .run(tx, Duration::from_millis(200));
        element.resume();
        let state = element.wait_for_stop(Duration::from_secs(2));
        assert_eq!(state, crate::element::State::Finished);

        let mut out = Vec::new();
        loop {
            let mut chunk = [0u8; 64];
            match output_rb.read(&mut chunk, Some(Duration::from_millis(200))) {
                crate::ringbuffer::IoStatus::Ok(0) => break,
                crate::ringbuffer::IoStatus::Ok(n) => out.extend_from_slice(&chunk[..n]),
                other => panic!("unexpected {other:?}"),
            }
        }
        // 40 bytes / 4 bytes-per-frame = 10 full frames = 40 bytes passed through exactly.
        assert_eq!(out, samples);
        element.terminate();
    }
}
