//! WAV (RIFF/WAVE) header parsing (spec §4.5).
//!
//! Grounded on `wav_extractor.c`'s FOURCC constants and `fmt `/`data` chunk walk. Hand-rolled
//! rather than routed through `hound`, because the specification wants byte-exact chunk
//! offsets (to seek directly into `data`) rather than `hound`'s sample-iterator abstraction.

use crate::error::{Error, Result};

pub const WAV_FMT_PCM: u16 = 0x0001;

/// Parsed `fmt ` chunk fields plus the absolute byte range of the `data` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub format_tag: u16,
    pub channels: u16,
    pub samplerate: u32,
    pub bits_per_sample: u16,
    /// Offset of the first audio sample byte, from the start of the file.
    pub data_offset: u64,
    /// Size of the `data` chunk in bytes.
    pub data_size: u64,
}

fn fourcc(buf: &[u8]) -> [u8; 4] {
    [buf[0], buf[1], buf[2], buf[3]]
}

/// Parse a WAV file's `RIFF....WAVEfmt ...data...` header from its opening bytes.
/// `buf` must contain at least the `RIFF`/`WAVE` header and the `fmt `/`data` chunk headers;
/// the `data` chunk's payload itself need not be present (only `data_offset`/`data_size` are
/// reported, not copied).
pub fn parse_wav_header(buf: &[u8]) -> Result<WavHeader> {
    if buf.len() < 12 {
        return Err(Error::Demux("wav header truncated".into()));
    }
    if &fourcc(buf) != b"RIFF" {
        return Err(Error::Demux("wav: missing RIFF tag".into()));
    }
    if &fourcc(&buf[8..]) != b"WAVE" {
        return Err(Error::Demux("wav: missing WAVE tag".into()));
    }

    let mut pos = 12usize;
    let mut fmt: Option<(u16, u16, u32, u16)> = None;
    let mut data: Option<(u64, u64)> = None;

    while pos + 8 <= buf.len() {
        let chunk_id = fourcc(&buf[pos..]);
        let chunk_size =
            u32::from_le_bytes(buf[pos + 4..pos + 8].try_into().unwrap()) as usize;
        let body_start = pos + 8;

        if &chunk_id == b"fmt " {
            if body_start + 16 > buf.len() {
                return Err(Error::Demux("wav: fmt chunk truncated".into()));
            }
            let body = &buf[body_start..body_start + 16];
            let format_tag = u16::from_le_bytes([body[0], body[1]]);
            let channels = u16::from_le_bytes([body[2], body[3]]);
            let samplerate = u32::from_le_bytes([body[4], body[5], body[6], body[7]]);
            let bits_per_sample = u16::from_le_bytes([body[14], body[15]]);
            fmt = Some((format_tag, channels, samplerate, bits_per_sample));
        } else if &chunk_id == b"data" {
            data = Some((body_start as u64, chunk_size as u64));
            // Stop scanning: chunk_size may run past what's loaded in `buf` (we were only
            // handed a header-sized prefix), so don't try to skip over it.
            break;
        }

        // Chunks are word-aligned: an odd-sized chunk has one byte of padding after it.
        let advance = chunk_size + (chunk_size & 1);
        pos = body_start + advance;
    }

    let (format_tag, channels, samplerate, bits_per_sample) =
        fmt.ok_or_else(|| Error::Demux("wav: missing fmt chunk".into()))?;
    let (data_offset, data_size) = data.ok_or_else(|| Error::Demux("wav: missing data chunk".into()))?;

    Ok(WavHeader { format_tag, channels, samplerate, bits_per_sample, data_offset, data_size })
}

/// Build a minimal canonical 44-byte WAV header for `data_size` bytes of PCM audio. Used by
/// any writer-side embedding scenario (spec §C: the engine itself never writes WAV files,
/// but a `SinkAdapter` implementation wrapping a file for capture purposes can reuse this).
pub fn build_wav_header(samplerate: u32, channels: u16, bits_per_sample: u16, data_size: u32) -> [u8; 44] {
    let mut out = [0u8; 44];
    let byte_rate = samplerate * channels as u32 * (bits_per_sample as u32 / 8);
    let block_align = channels * (bits_per_sample / 8);

    out[0..4].copy_from_slice(b"RIFF");
    out[4..8].copy_from_slice(&(36 + data_size).to_le_bytes());
    out[8..12].copy_from_slice(b"WAVE");
    out[12..16].copy_from_slice(b"fmt ");
    out[16..20].copy_from_slice(&16u32.to_le_bytes());
    out[20..22].copy_from_slice(&WAV_FMT_PCM.to_le_bytes());
    out[22..24].copy_from_slice(&channels.to_le_bytes());
    out[24..28].copy_from_slice(&samplerate.to_le_bytes());
    out[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    out[32..34].copy_from_slice(&block_align.to_le_bytes());
    out[34..36].copy_from_slice(&bits_per_sample.to_le_bytes());
    out[36..40].copy_from_slice(b"data");
    out[40..44].copy_from_slice(&data_size.to_le_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_build_and_parse() {
        let header = build_wav_header(44_100, 2, 16, 1000);
        let parsed = parse_wav_header(&header).unwrap();
        assert_eq!(parsed.format_tag, WAV_FMT_PCM);
        assert_eq!(parsed.channels, 2);
        assert_eq!(parsed.samplerate, 44_100);
        assert_eq!(parsed.bits_per_sample, 16);
        assert_eq!(parsed.data_offset, 44);
        assert_eq!(parsed.data_size, 1000);
    }

    #[test]
    fn skips_unknown_chunk_before_data() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"RIFF");
        buf.extend_from_slice(&0u32.to_le_bytes()); // size placeholder
        buf.extend_from_slice(b"WAVE");
        buf.extend_from_slice(b"fmt ");
        buf.extend_from_slice(&16u32.to_le_bytes());
        buf.extend_from_slice(&WAV_FMT_PCM.to_le_bytes());
        buf.extend_from_slice(&1u16.to_le_bytes()); // mono
        buf.extend_from_slice(&22_050u32.to_le_bytes());
        buf.extend_from_slice(&44_100u32.to_le_bytes()); // byte rate
        buf.extend_from_slice(&2u16.to_le_bytes()); // block align
        buf.extend_from_slice(&16u16.to_le_bytes()); // bits
        buf.extend_from_slice(b"LIST");
        buf.extend_from_slice(&4u32.to_le_bytes());
        buf.extend_from_slice(b"INFO");
        buf.extend_from_slice(b"data");
        buf.extend_from_slice(&500u32.to_le_bytes());

        let parsed = parse_wav_header(&buf).unwrap();
        assert_eq!(parsed.channels, 1);
        assert_eq!(parsed.data_size, 500);
        assert_eq!(parsed.data_offset as usize, buf.len());
    }

    #[test]
    fn rejects_non_riff() {
        let buf = [0u8; 20];
        assert!(parse_wav_header(&buf).is_err());
    }
}
