//! Media parser: identifies a resource's codec and extracts the header information the
//! player needs before starting playback (spec §4.5, §4.8; supplemented per SPEC_FULL §C.2
//! with `.m3u`/`.playlist` redirect handling and URL scheme classification, both present in
//! `liteplayer_parser.c` but dropped by the distilled spec).

use crate::codec_type::CodecType;
use crate::demux::{aac, m4a, mp3, wav};
use crate::error::{Error, Result};

/// How a URI's scheme was classified, matching `liteplayer_parser.c`'s dispatch between the
/// file and HTTP adapter families (plus the stream-write mode the distillation dropped).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UriScheme {
    File,
    Http,
    /// `liteplayer_write`-fed: no adapter `open`/`read`, bytes arrive via direct pushes
    /// (spec §C.3).
    Stream,
}

/// Classify a URI the same way the original parser keys off literal prefixes.
pub fn classify_uri(uri: &str) -> UriScheme {
    if uri.eq_ignore_ascii_case("rtp://") || uri == "stream://" {
        UriScheme::Stream
    } else if uri.starts_with("http://") || uri.starts_with("https://") {
        UriScheme::Http
    } else {
        UriScheme::File
    }
}

/// Whether a URI names a playlist file that should be expanded into its entries before
/// opening, rather than opened directly as audio (spec §C.2).
pub fn is_playlist_uri(uri: &str) -> bool {
    let lower = uri.to_ascii_lowercase();
    lower.ends_with(".m3u") || lower.ends_with(".m3u8") || lower.ends_with(".playlist")
}

/// Parse a `.m3u`/`.m3u8` playlist's text body into an ordered list of entry URIs, skipping
/// blank lines and `#EXT*` metadata/comment lines.
pub fn parse_playlist(body: &str) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Identify a resource's codec from its opening bytes, by probing in the same priority
/// order the original media parser used: ADTS before MP3 (ADTS's sync word is a strict
/// superset of MP3's first byte), then the M4A atom signature, then RIFF/WAVE.
pub fn identify_codec(header: &[u8]) -> Result<CodecType> {
    if header.len() >= 12 && &header[4..8] == b"ftyp" {
        return Ok(CodecType::M4a);
    }
    if header.len() >= 12 && &header[0..4] == b"RIFF" && &header[8..12] == b"WAVE" {
        return Ok(CodecType::Wav);
    }
    if aac::find_frame(header).is_some() {
        return Ok(CodecType::AacAdts);
    }
    if mp3::find_frame(header).is_some() {
        return Ok(CodecType::Mp3);
    }
    Err(Error::Demux("unable to identify codec from header bytes".into()))
}

/// Header information extracted up front, before playback starts, so the player can report
/// duration/format immediately after `prepare` (spec §4.8).
#[derive(Debug, Clone)]
pub struct MediaInfo {
    pub codec: CodecType,
    pub samplerate: u32,
    pub channels: u16,
    pub bits: u16,
    pub duration_ms: Option<u64>,
    /// Encoded bitrate in bits per second, when known directly from the stream (MP3).
    /// Used to convert a seek target from milliseconds to a compressed-stream byte offset;
    /// codecs without this (AAC, whose ADTS header doesn't carry bitrate directly; WAV,
    /// which is already PCM) fall back to the decoded PCM byte rate for that conversion.
    pub bitrate_bps: Option<u32>,
    /// Byte offset where audio data begins (post-header).
    pub data_offset: u64,
    /// Full sample table, when the codec is seekable via a chunk map (M4A only; MP3/AAC
    /// seek by resyncing instead, so this is `None` for them).
    pub m4a_table: Option<m4a::SampleTable>,
}

/// Build a [`MediaInfo`] for a WAV resource from its header bytes.
pub fn parse_wav_info(header: &[u8]) -> Result<MediaInfo> {
    let hdr = wav::parse_wav_header(header)?;
    if hdr.format_tag != wav::WAV_FMT_PCM {
        return Err(Error::Unsupported(format!(
            "wav format tag {:#06x} is not PCM",
            hdr.format_tag
        )));
    }
    let bytes_per_sample_frame = hdr.channels as u64 * (hdr.bits_per_sample as u64 / 8);
    let duration_ms = if bytes_per_sample_frame > 0 && hdr.samplerate > 0 {
        Some(hdr.data_size * 1000 / (bytes_per_sample_frame * hdr.samplerate as u64))
    } else {
        None
    };
    Ok(MediaInfo {
        codec: CodecType::Wav,
        samplerate: hdr.samplerate,
        channels: hdr.channels,
        bits: hdr.bits_per_sample,
        duration_ms,
        bitrate_bps: None,
        data_offset: hdr.data_offset,
        m4a_table: None,
    })
}

/// Build a [`MediaInfo`] for an M4A resource from its fully-read `moov` atom body.
pub fn parse_m4a_info(moov_body: &[u8], mdat_offset: u64) -> Result<MediaInfo> {
    let table = m4a::parse_moov(moov_body, mdat_offset)?;
    Ok(MediaInfo {
        codec: CodecType::M4a,
        samplerate: table.samplerate,
        channels: table.channels,
        bits: table.bits,
        duration_ms: Some(table.duration_ms()),
        bitrate_bps: None,
        data_offset: mdat_offset,
        m4a_table: Some(table),
    })
}

/// Build a [`MediaInfo`] for an MP3 resource from its first synced frame header. MP3 has no
/// global duration field; callers that need duration estimate it from
/// `filesize / average_frame_bitrate`, which this module does not attempt (spec §4.5 leaves
/// MP3 duration estimation unspecified when no Xing/VBRI header is present).
pub fn parse_mp3_info(header: &[u8]) -> Result<MediaInfo> {
    let frame = mp3::find_frame(header).ok_or_else(|| Error::Demux("no mp3 sync found".into()))?;
    let header_bytes: [u8; 4] = header[frame.offset..frame.offset + 4].try_into().unwrap();
    let hdr = mp3::mp3_frame_size(&header_bytes)?;
    Ok(MediaInfo {
        codec: CodecType::Mp3,
        samplerate: hdr.samplerate,
        channels: hdr.channels,
        bits: 16,
        duration_ms: None,
        bitrate_bps: Some(hdr.bitrate_bps),
        data_offset: frame.offset as u64,
        m4a_table: None,
    })
}

/// Build a [`MediaInfo`] for an AAC ADTS resource from its first synced frame header.
pub fn parse_aac_info(header: &[u8]) -> Result<MediaInfo> {
    let frame = aac::find_frame(header).ok_or_else(|| Error::Demux("no adts sync found".into()))?;
    let hdr = aac::parse_adts_header(&header[frame.offset..])?;
    Ok(MediaInfo {
        codec: CodecType::AacAdts,
        samplerate: hdr.samplerate,
        channels: hdr.channels,
        bits: 16,
        duration_ms: None,
        bitrate_bps: None,
        data_offset: frame.offset as u64,
        m4a_table: None,
    })
}

/// Convert a seek target in milliseconds to a byte offset in the stream seek space, using
/// the codec-appropriate byte rate (spec §4.8): MP3/AAC seek in the *compressed* stream, so
/// the encoded bitrate applies when known; WAV (and any codec without a bitrate field) seeks
/// in decoded PCM, so the sample format's byte rate applies instead. Not used for M4A, which
/// has its own `stts`-driven sample-accurate mapping in [`seek_offset`].
pub fn bytes_for_duration(msec: u64, info: &MediaInfo) -> u64 {
    let bytes_per_sec = match info.bitrate_bps {
        Some(bitrate_bps) => bitrate_bps as u64 / 8,
        None => info.samplerate as u64 * info.channels as u64 * (info.bits as u64 / 8),
    };
    bytes_per_sec * msec / 1000
}

/// Map a seek target in milliseconds to an absolute source-file seek offset, using the
/// codec-appropriate strategy (spec §4.8 `seek`): M4A walks its `stts`/`stsc`/`stco` sample
/// table directly in time units; MP3/AAC/WAV convert the target to a byte count via their
/// (compressed or PCM) byte rate and add it to the post-header data offset.
pub fn seek_offset(info: &MediaInfo, target_ms: u64) -> Result<u64> {
    match (&info.codec, &info.m4a_table) {
        (CodecType::M4a, Some(table)) => table.seek_offset_for_ms(target_ms),
        (CodecType::M4a, None) => Err(Error::Demux("m4a seek without a parsed sample table".into())),
        _ => Ok(info.data_offset + bytes_for_duration(target_ms, info)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_http_and_file_and_stream_uris() {
        assert_eq!(classify_uri("http://host/a.mp3"), UriScheme::Http);
        assert_eq!(classify_uri("https://host/a.mp3"), UriScheme::Http);
        assert_eq!(classify_uri("/sdcard/a.mp3"), UriScheme::File);
        assert_eq!(classify_uri("stream://"), UriScheme::Stream);
    }

    #[test]
    fn detects_playlist_suffixes_case_insensitively() {
        assert!(is_playlist_uri("/music/list.M3U"));
        assert!(is_playlist_uri("radio.playlist"));
        assert!(!is_playlist_uri("song.mp3"));
    }

    #[test]
    fn parses_playlist_body_skipping_comments() {
        let body = "#EXTM3U\n#EXTINF:123,Some Title\n/music/a.mp3\n\n/music/b.mp3\n";
        let entries = parse_playlist(body);
        assert_eq!(entries, vec!["/music/a.mp3", "/music/b.mp3"]);
    }

    #[test]
    fn identifies_wav_header() {
        let header = crate::demux::wav::build_wav_header(44_100, 2, 16, 1000);
        assert_eq!(identify_codec(&header).unwrap(), CodecType::Wav);
    }

    #[test]
    fn identifies_m4a_ftyp_signature() {
        let mut header = vec![0u8, 0, 0, 0x20];
        header.extend_from_slice(b"ftyp");
        header.extend_from_slice(b"M4A \0\0\0\0");
        assert_eq!(identify_codec(&header).unwrap(), CodecType::M4a);
    }

    #[test]
    fn parse_wav_info_computes_duration() {
        let header = crate::demux::wav::build_wav_header(44_100, 2, 16, 44_100 * 4);
        let info = parse_wav_info(&header).unwrap();
        assert_eq!(info.duration_ms, Some(1000));
    }

    fn sample_info(codec: CodecType, bitrate_bps: Option<u32>) -> MediaInfo {
        MediaInfo {
            codec,
            samplerate: 44_100,
            channels: 2,
            bits: 16,
            duration_ms: Some(60_000),
            bitrate_bps,
            data_offset: 0,
            m4a_table: None,
        }
    }

    #[test]
    fn seek_byte_offset_uses_compressed_bitrate_for_mp3() {
        let info = sample_info(CodecType::Mp3, Some(128_000));
        // 128kbps / 8 = 16000 B/s; 30s in -> 480000.
        assert_eq!(bytes_for_duration(30_000, &info), 480_000);
    }

    #[test]
    fn seek_byte_offset_falls_back_to_pcm_rate_without_bitrate() {
        let info = sample_info(CodecType::Wav, None);
        // 44100 * 2 * 2 = 176400 B/s; 500ms in -> 88200.
        assert_eq!(bytes_for_duration(500, &info), 88_200);
    }

    #[test]
    fn seek_offset_m4a_requires_a_parsed_sample_table() {
        let info = sample_info(CodecType::M4a, None);
        assert!(seek_offset(&info, 1_000).is_err());
    }
}
