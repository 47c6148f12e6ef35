//! AAC ADTS frame sync (spec §4.5).
//!
//! ADTS headers are simpler than MP3's: a fixed 12-bit sync word, a samplerate index into a
//! 13-entry table, and an explicit 13-bit frame-length field that already includes the
//! header — no bitrate-to-size arithmetic needed.

use super::FrameInfo;
use crate::error::{Error, Result};

/// ISO/IEC 13818-7 Table 35 sampling frequency index.
pub const ADTS_SAMPLE_RATES: [u32; 13] = [
    96_000, 88_200, 64_000, 48_000, 44_100, 32_000, 24_000, 22_050, 16_000, 12_000, 11_025,
    8_000, 7_350,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsHeader {
    pub samplerate: u32,
    pub channels: u16,
    /// Size of the header itself: 7 bytes, or 9 if the (rare) CRC is present.
    pub header_size: usize,
    /// Total frame size including the header.
    pub frame_size: usize,
}

/// Parse a 7-byte (or longer) ADTS header at the start of `buf`.
pub fn parse_adts_header(buf: &[u8]) -> Result<AdtsHeader> {
    if buf.len() < 7 {
        return Err(Error::Demux("adts header truncated".into()));
    }
    if buf[0] != 0xFF || (buf[1] & 0xF0) != 0xF0 {
        return Err(Error::Demux("adts sync word not found".into()));
    }
    let has_crc = (buf[1] & 0x01) == 0;
    let sr_idx = ((buf[2] >> 2) & 0x0F) as usize;
    let samplerate = *ADTS_SAMPLE_RATES
        .get(sr_idx)
        .ok_or_else(|| Error::Demux("adts reserved samplerate index".into()))?;
    let channel_config = ((buf[2] & 0x01) << 2) | ((buf[3] >> 6) & 0x03);
    let channels = match channel_config {
        0 => return Err(Error::Demux("adts channel config 0 (AOT-defined) unsupported".into())),
        n => n as u16,
    };
    let frame_size = (((buf[3] & 0x03) as usize) << 11)
        | ((buf[4] as usize) << 3)
        | ((buf[5] as usize) >> 5);
    if frame_size < 7 {
        return Err(Error::Demux("adts frame length smaller than header".into()));
    }
    let header_size = if has_crc { 9 } else { 7 };
    Ok(AdtsHeader { samplerate, channels, header_size, frame_size })
}

/// Scan `buf` for the first byte offset at which a valid ADTS frame syncs.
pub fn find_frame(buf: &[u8]) -> Option<FrameInfo> {
    if buf.len() < 7 {
        return None;
    }
    for offset in 0..=buf.len() - 7 {
        if let Ok(hdr) = parse_adts_header(&buf[offset..]) {
            if offset + hdr.frame_size <= buf.len() {
                return Some(FrameInfo { offset, size: hdr.frame_size });
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header(frame_len: usize) -> [u8; 7] {
        let sr_idx = 4u8; // 44100
        let channel_config = 2u8; // stereo
        let mut h = [0u8; 7];
        h[0] = 0xFF;
        h[1] = 0xF1; // no CRC
        h[2] = (sr_idx << 2) | (channel_config >> 2);
        h[3] = ((channel_config & 0x03) << 6) | ((frame_len >> 11) as u8 & 0x03);
        h[4] = ((frame_len >> 3) & 0xFF) as u8;
        h[5] = (((frame_len & 0x07) << 5) as u8) | 0x1F;
        h[6] = 0xFC;
        h
    }

    #[test]
    fn parses_header_fields() {
        let header = sample_header(200);
        let hdr = parse_adts_header(&header).unwrap();
        assert_eq!(hdr.samplerate, 44_100);
        assert_eq!(hdr.channels, 2);
        assert_eq!(hdr.frame_size, 200);
        assert_eq!(hdr.header_size, 7);
    }

    #[test]
    fn rejects_bad_sync() {
        let mut header = sample_header(200);
        header[0] = 0x00;
        assert!(parse_adts_header(&header).is_err());
    }

    #[test]
    fn find_frame_skips_leading_junk() {
        let mut buf = vec![0xAB, 0xCD];
        buf.extend_from_slice(&sample_header(50));
        buf.extend(std::iter::repeat(0u8).take(50));
        let found = find_frame(&buf).unwrap();
        assert_eq!(found.offset, 2);
        assert_eq!(found.size, 50);
    }
}
