//! Codec wrapper abstraction (spec §4.6).
//!
//! This crate never reimplements MP3/AAC decode math. A [`CodecWrapper`] is a uniform
//! `init/run/deinit` contract wrapping some concrete decode path; the only implementation
//! shipped unconditionally is PCM passthrough (for WAV), grounded on `wav.rs`'s
//! `get_samples_from_wav`'s "no decode needed, just frame the bytes" shape in the teacher.
//! A `symphonia`-backed wrapper is available behind the `symphonia-codecs` feature,
//! grounded on the teacher's `decode.rs`/`demux.rs` codec-only (not format-probing) usage of
//! that crate — our own demuxers already own container parsing, so only Symphonia's codec
//! objects are reused, not its format readers.

use crate::error::{Error, Result};

/// Result of a single [`CodecWrapper::run`] call: PCM samples produced, or a signal that no
/// more data is coming / the frame was undecodable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecOutcome {
    /// `usize` bytes of 16-bit LE PCM were appended to the output buffer.
    Produced(usize),
    /// Input exhausted cleanly.
    Done,
    /// This frame could not be decoded; the caller should count this against its retry
    /// budget (spec §7: `decoder_retry_budget`) rather than treat it as fatal immediately.
    BadFrame,
}

/// Format the decoder has determined (or been told) the input carries, reported once via
/// `ReportMusicInfo` the first time it becomes known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PcmFormat {
    pub samplerate: u32,
    pub channels: u16,
    pub bits: u16,
}

/// Uniform wrapper around a decode path for one elementary stream.
pub trait CodecWrapper: Send {
    /// One-time setup (e.g. allocate a Symphonia decoder for a known codec parameters set).
    fn init(&mut self) -> Result<()>;

    /// Decode as much as can be produced from `input`, appending raw PCM bytes to `output`.
    /// Returns how many input bytes were consumed as part of `CodecOutcome::Produced`, or
    /// the bad-frame/done signal.
    fn run(&mut self, input: &[u8], output: &mut Vec<u8>) -> Result<(usize, CodecOutcome)>;

    /// The format most recently produced, if known yet.
    fn format(&self) -> Option<PcmFormat>;

    fn deinit(&mut self);
}

/// Identity decoder for already-PCM input (WAV). "Decoding" is just copying whole sample
/// frames through; partial trailing bytes (less than one full frame) are held back until
/// more input arrives.
pub struct PcmPassthrough {
    format: PcmFormat,
    bytes_per_frame: usize,
}

impl PcmPassthrough {
    pub fn new(samplerate: u32, channels: u16, bits: u16) -> Self {
        let bytes_per_frame = (channels as usize) * (bits as usize / 8);
        Self { format: PcmFormat { samplerate, channels, bits }, bytes_per_frame }
    }
}

impl CodecWrapper for PcmPassthrough {
    fn init(&mut self) -> Result<()> {
        if self.bytes_per_frame == 0 {
            return Err(Error::Codec("pcm passthrough: zero-size sample frame".into()));
        }
        Ok(())
    }

    fn run(&mut self, input: &[u8], output: &mut Vec<u8>) -> Result<(usize, CodecOutcome)> {
        if input.is_empty() {
            return Ok((0, CodecOutcome::Done));
        }
        let usable = input.len() - (input.len() % self.bytes_per_frame);
        if usable == 0 {
            return Ok((0, CodecOutcome::Produced(0)));
        }
        output.extend_from_slice(&input[..usable]);
        Ok((usable, CodecOutcome::Produced(usable)))
    }

    fn format(&self) -> Option<PcmFormat> {
        Some(self.format)
    }

    fn deinit(&mut self) {}
}

#[cfg(feature = "symphonia-codecs")]
pub mod symphonia_backend {
    //! MP3/AAC decode via `symphonia`'s codec API, used only for the codec step — container
    //! framing is handled by [`crate::demux`], matching the teacher's `decode.rs` split
    //! between demux and decode responsibilities.

    use super::{CodecOutcome, CodecWrapper, PcmFormat};
    use crate::codec_type::CodecType;
    use crate::error::{Error, Result};
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions, CODEC_TYPE_AAC, CODEC_TYPE_MP3};
    use symphonia::core::formats::Packet;

    pub struct SymphoniaCodec {
        decoder: Box<dyn Decoder>,
        format: Option<PcmFormat>,
    }

    impl SymphoniaCodec {
        pub fn new(codec_type: CodecType, params: &CodecParameters) -> Result<Self> {
            let symphonia_codec = match codec_type {
                CodecType::Mp3 => CODEC_TYPE_MP3,
                // M4A's audio payload is AAC; the container's own framing is handled by
                // crate::demux::m4a, so only the codec mapping matters here.
                CodecType::AacAdts | CodecType::M4a => CODEC_TYPE_AAC,
                other => {
                    return Err(Error::Unsupported(format!(
                        "{other:?} has no symphonia codec mapping"
                    )))
                }
            };
            let mut params = params.clone();
            params.codec = symphonia_codec;
            let decoder = symphonia::default::get_codecs()
                .make(&params, &DecoderOptions::default())
                .map_err(|e| Error::Codec(e.to_string()))?;
            Ok(Self { decoder, format: None })
        }
    }

    impl CodecWrapper for SymphoniaCodec {
        fn init(&mut self) -> Result<()> {
            Ok(())
        }

        fn run(&mut self, input: &[u8], output: &mut Vec<u8>) -> Result<(usize, CodecOutcome)> {
            let packet = Packet::new_from_slice(0, 0, 0, input);
            let decoded = match self.decoder.decode(&packet) {
                Ok(buf) => buf,
                Err(symphonia::core::errors::Error::IoError(_)) => {
                    return Ok((input.len(), CodecOutcome::Done))
                }
                Err(_) => return Ok((input.len(), CodecOutcome::BadFrame)),
            };
            let spec = *decoded.spec();
            self.format = Some(PcmFormat {
                samplerate: spec.rate,
                channels: spec.channels.count() as u16,
                bits: 16,
            });
            let mut sample_buf = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);
            for sample in sample_buf.samples() {
                output.extend_from_slice(&sample.to_le_bytes());
            }
            Ok((input.len(), CodecOutcome::Produced(sample_buf.samples().len() * 2)))
        }

        fn format(&self) -> Option<PcmFormat> {
            self.format
        }

        fn deinit(&mut self) {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_passthrough_holds_back_partial_trailing_frame() {
        let mut codec = PcmPassthrough::new(44_100, 2, 16); // 4 bytes/frame
        codec.init().unwrap();
        let mut out = Vec::new();
        let (consumed, outcome) = codec.run(&[1, 2, 3, 4, 5, 6], &mut out).unwrap();
        assert_eq!(consumed, 4);
        assert_eq!(outcome, CodecOutcome::Produced(4));
        assert_eq!(out, vec![1, 2, 3, 4]);
    }

    #[test]
    fn pcm_passthrough_reports_done_on_empty_input() {
        let mut codec = PcmPassthrough::new(16_000, 1, 16);
        codec.init().unwrap();
        let mut out = Vec::new();
        let (consumed, outcome) = codec.run(&[], &mut out).unwrap();
        assert_eq!(consumed, 0);
        assert_eq!(outcome, CodecOutcome::Done);
    }

    #[test]
    fn pcm_passthrough_rejects_zero_frame_size() {
        let mut codec = PcmPassthrough::new(44_100, 0, 16);
        assert!(codec.init().is_err());
    }
}
