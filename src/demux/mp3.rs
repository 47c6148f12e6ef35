//! MPEG-1/2/2.5 Layer I/II/III frame sync and size calculation.
//!
//! Grounded on `mp3_mad_wrapper.c`'s `mp3_frame_size`: the sync word, the version/layer/
//! bitrate/samplerate bit layout, and the per-layer size formulas are all load-bearing
//! constants copied from that table, not reinvented.

use super::FrameInfo;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MpegVersion {
    V1,
    V2,
    V25,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layer {
    I,
    II,
    III,
}

const SAMPLE_RATES_V1: [u32; 3] = [44_100, 48_000, 32_000];

const BITRATES_V1_L1: [u32; 14] = [
    32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448,
];
const BITRATES_V1_L2: [u32; 14] = [
    32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384,
];
const BITRATES_V1_L3: [u32; 14] = [
    32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320,
];
const BITRATES_V2_L1: [u32; 14] = [
    32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256,
];
const BITRATES_V2_L23: [u32; 14] = [
    8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160,
];

/// Header fields extracted from four synced bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mp3Header {
    pub version: u8,
    pub layer: u8,
    pub samplerate: u32,
    pub channels: u16,
    pub frame_size: usize,
    /// The frame's encoded bitrate, in bits per second. MP3 has no container-level
    /// duration field, so the parser uses this (not the decoded PCM rate) to convert a
    /// seek target in milliseconds to a compressed-stream byte offset (spec §4.8).
    pub bitrate_bps: u32,
}

fn decode_header(buf: &[u8; 4]) -> Result<(MpegVersion, Layer, u32, u32, bool, u16)> {
    if buf[0] != 0xFF || (buf[1] & 0xE0) != 0xE0 {
        return Err(Error::Demux("mp3 sync word not found".into()));
    }
    let ver_bits = (buf[1] >> 3) & 0x03;
    let version = match ver_bits {
        0b00 => MpegVersion::V25,
        0b10 => MpegVersion::V2,
        0b11 => MpegVersion::V1,
        _ => return Err(Error::Demux("mp3 reserved mpeg version".into())),
    };
    let layer = match (buf[1] >> 1) & 0x03 {
        0b01 => Layer::III,
        0b10 => Layer::II,
        0b11 => Layer::I,
        _ => return Err(Error::Demux("mp3 reserved layer".into())),
    };
    let br_idx = ((buf[2] >> 4) & 0x0F) as usize;
    if br_idx == 0 || br_idx == 15 {
        return Err(Error::Demux("mp3 free/reserved bitrate index".into()));
    }
    let sr_idx = ((buf[2] >> 2) & 0x03) as usize;
    if sr_idx == 3 {
        return Err(Error::Demux("mp3 reserved samplerate index".into()));
    }
    let padding = ((buf[2] >> 1) & 0x01) != 0;
    let channel_mode = (buf[3] >> 6) & 0x03;
    let channels = if channel_mode == 0b11 { 1 } else { 2 };

    let base_rate = SAMPLE_RATES_V1[sr_idx];
    let samplerate = match version {
        MpegVersion::V1 => base_rate,
        MpegVersion::V2 => base_rate / 2,
        MpegVersion::V25 => base_rate / 4,
    };

    let bitrate_kbps = match (version, layer) {
        (MpegVersion::V1, Layer::I) => BITRATES_V1_L1[br_idx - 1],
        (MpegVersion::V1, Layer::II) => BITRATES_V1_L2[br_idx - 1],
        (MpegVersion::V1, Layer::III) => BITRATES_V1_L3[br_idx - 1],
        (_, Layer::I) => BITRATES_V2_L1[br_idx - 1],
        (_, _) => BITRATES_V2_L23[br_idx - 1],
    };

    Ok((version, layer, samplerate, bitrate_kbps, padding, channels))
}

/// Compute the total size (header included) of the frame starting at `buf[0..4]`.
pub fn mp3_frame_size(buf: &[u8; 4]) -> Result<Mp3Header> {
    let (version, layer, samplerate, bitrate_kbps, padding, channels) = decode_header(buf)?;
    let bitrate = bitrate_kbps * 1000;
    let pad = if padding { 1 } else { 0 };

    let frame_size = match (version, layer) {
        (_, Layer::I) => ((12_000 * bitrate / samplerate) + pad) * 4,
        (MpegVersion::V1, Layer::II) | (MpegVersion::V1, Layer::III) => {
            (144_000 * bitrate / samplerate) + pad
        }
        (_, Layer::III) => (72_000 * bitrate / samplerate) + pad,
        (_, Layer::II) => (144_000 * bitrate / samplerate) + pad,
    } as usize;

    Ok(Mp3Header {
        version: match version {
            MpegVersion::V1 => 1,
            MpegVersion::V2 => 2,
            MpegVersion::V25 => 25,
        },
        layer: match layer {
            Layer::I => 1,
            Layer::II => 2,
            Layer::III => 3,
        },
        samplerate,
        channels,
        frame_size,
        bitrate_bps: bitrate,
    })
}

/// Scan `buf` for the first byte offset at which a valid MP3 frame header syncs, returning
/// its location and size. Used by the decoder stage to resynchronize after a corrupt frame
/// and by the parser to probe a resource's codec (spec §4.5, §4.8).
pub fn find_frame(buf: &[u8]) -> Option<FrameInfo> {
    if buf.len() < 4 {
        return None;
    }
    for offset in 0..=buf.len() - 4 {
        let header: [u8; 4] = buf[offset..offset + 4].try_into().unwrap();
        if let Ok(hdr) = mp3_frame_size(&header) {
            if hdr.frame_size > 0 && offset + hdr.frame_size <= buf.len() {
                return Some(FrameInfo { offset, size: hdr.frame_size });
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A 44.1kHz 128kbps MPEG-1 Layer III frame header (no padding), a common encode.
    const MP1_L3_44100_128: [u8; 4] = [0xFF, 0xFB, 0x90, 0x00];

    #[test]
    fn decodes_mpeg1_layer3_header() {
        let hdr = mp3_frame_size(&MP1_L3_44100_128).unwrap();
        assert_eq!(hdr.version, 1);
        assert_eq!(hdr.layer, 3);
        assert_eq!(hdr.samplerate, 44_100);
        assert_eq!(hdr.channels, 2);
        // 144000 * 128000 / 44100 = 417959 -> truncated to 417
        assert_eq!(hdr.frame_size, 417);
    }

    #[test]
    fn rejects_missing_sync_word() {
        let bad = [0x00, 0xFB, 0x90, 0x00];
        assert!(mp3_frame_size(&bad).is_err());
    }

    #[test]
    fn find_frame_locates_header_after_garbage_prefix() {
        let mut buf = vec![0x00, 0x01, 0x02];
        buf.extend_from_slice(&MP1_L3_44100_128);
        buf.extend(std::iter::repeat(0u8).take(500));
        let found = find_frame(&buf).unwrap();
        assert_eq!(found.offset, 3);
        assert_eq!(found.size, 417);
    }

    #[test]
    fn mono_channel_mode_reports_one_channel() {
        let mut header = MP1_L3_44100_128;
        header[3] = 0b1100_0000; // channel mode = mono (11)
        let hdr = mp3_frame_size(&header).unwrap();
        assert_eq!(hdr.channels, 1);
    }
}
