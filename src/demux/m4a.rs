//! M4A/MP4 atom walker and sample-table based seek mapping (spec §4.5).
//!
//! Grounded on `m4a_extractor.c`'s atom list (`moov -> trak -> mdia -> minf -> stbl`), its
//! `stsz` 128 KiB cap, and its ASC (AudioSpecificConfig) byte layout. Diverges from that
//! file in one place: the original's `stco` handling only records the first chunk's byte
//! offset ("sub000", good enough for its own simplified seek needs); this module builds the
//! full sample -> chunk -> byte-offset mapping from `stsc` and `stco` that the specification
//! requires for accurate seeking.

use crate::error::{Error, Result};

/// 128 KiB cap on the in-memory `stsz` table (spec §4.5, grounded on `STSZ_MAX_BUFFER` in
/// the original extractor).
pub const STSZ_MAX_BUFFER: usize = 128 * 1024;

const ASC_SAMPLE_RATES: [u32; 12] = [
    96_000, 88_200, 64_000, 48_000, 44_100, 32_000, 24_000, 22_050, 16_000, 12_000, 11_025,
    8_000,
];

/// Sample-size table: either every sample shares one size (`stsz` with `sample_size != 0`),
/// or a per-sample table was read (capped at [`STSZ_MAX_BUFFER`] / 2 bytes, since entries are
/// stored as `u16` exactly like the original's `stszdata`).
#[derive(Debug, Clone)]
pub enum SampleSizes {
    Uniform(u32),
    PerSample(Vec<u16>),
}

impl SampleSizes {
    pub fn count(&self) -> usize {
        match self {
            SampleSizes::Uniform(_) => 0, // caller must track count separately
            SampleSizes::PerSample(v) => v.len(),
        }
    }

    pub fn size_of(&self, index: usize) -> Option<u32> {
        match self {
            SampleSizes::Uniform(size) => Some(*size),
            SampleSizes::PerSample(v) => v.get(index).map(|&s| s as u32),
        }
    }
}

/// One `stsc` ("sample to chunk") entry: starting at `first_chunk` (1-based), each chunk
/// holds `samples_per_chunk` samples, described by `sample_desc_index`.
#[derive(Debug, Clone, Copy)]
pub struct StscEntry {
    pub first_chunk: u32,
    pub samples_per_chunk: u32,
    pub sample_desc_index: u32,
}

/// One `stts` ("time to sample") run-length entry: `sample_count` consecutive samples each
/// span `sample_delta` units of the track's timescale.
#[derive(Debug, Clone, Copy)]
pub struct SttsEntry {
    pub sample_count: u32,
    pub sample_delta: u32,
}

/// Parsed sample table for one audio track, enough to map a sample index (or byte position)
/// to a chunk offset for seeking.
#[derive(Debug, Clone)]
pub struct SampleTable {
    pub samplerate: u32,
    pub channels: u16,
    pub bits: u16,
    pub timescale: u32,
    pub duration_units: u64,
    pub sample_sizes: SampleSizes,
    pub samples_per_chunk_table: Vec<StscEntry>,
    pub chunk_offsets: Vec<u64>,
    pub time_to_sample: Vec<SttsEntry>,
    /// Total number of samples, always tracked explicitly (not derivable from `Uniform`).
    pub sample_count: u32,
    pub mdat_offset: u64,
}

impl SampleTable {
    /// Map a seek target in milliseconds to the absolute file offset to resume reading from
    /// (spec §4.5): `stts` maps the time to a sample index, `stsc` maps that sample to the
    /// chunk containing it, and `stco` plus the preceding samples' `stsz` sizes within that
    /// chunk give the exact byte offset.
    pub fn seek_offset_for_ms(&self, target_ms: u64) -> Result<u64> {
        self.seek_offset_for_sample(self.sample_index_for_ms(target_ms))
    }

    /// Map a target time to the index of the sample that should play at or after it, by
    /// walking the `stts` run-length table (each run covers `sample_count` samples of
    /// `sample_delta` timescale units apiece).
    fn sample_index_for_ms(&self, target_ms: u64) -> u32 {
        if self.time_to_sample.is_empty() || self.timescale == 0 {
            return 0;
        }
        let target_units = target_ms.saturating_mul(self.timescale as u64) / 1000;
        let mut sample_index: u32 = 0;
        let mut elapsed_units: u64 = 0;
        for entry in &self.time_to_sample {
            let run_units = entry.sample_count as u64 * entry.sample_delta as u64;
            if elapsed_units + run_units > target_units || entry.sample_delta == 0 {
                let remaining_units = target_units.saturating_sub(elapsed_units);
                let extra = if entry.sample_delta == 0 {
                    0
                } else {
                    (remaining_units / entry.sample_delta as u64) as u32
                };
                return sample_index + extra.min(entry.sample_count.saturating_sub(1));
            }
            elapsed_units += run_units;
            sample_index += entry.sample_count;
        }
        sample_index.saturating_sub(1)
    }

    /// Map a 0-based sample index to the absolute file offset of its first byte, via the
    /// `stsc` chunk map and the `stsz` sizes of the samples preceding it within that chunk.
    fn seek_offset_for_sample(&self, target_sample: u32) -> Result<u64> {
        if self.chunk_offsets.is_empty() || self.samples_per_chunk_table.is_empty() {
            return Err(Error::Demux("m4a seek table is empty".into()));
        }
        let mut sample_index: u32 = 0;

        for (chunk_idx, &chunk_offset) in self.chunk_offsets.iter().enumerate() {
            let chunk_number = (chunk_idx + 1) as u32;
            let samples_in_chunk = self.samples_per_chunk_for(chunk_number);
            if target_sample < sample_index + samples_in_chunk {
                let offset_in_chunk: u64 = (sample_index..target_sample)
                    .map(|i| self.sample_sizes.size_of(i as usize).unwrap_or(0) as u64)
                    .sum();
                return Ok(chunk_offset + offset_in_chunk);
            }
            sample_index += samples_in_chunk;
        }
        // Past the end: seek to the last chunk's offset, matching the original's clamp
        // behavior rather than erroring on an out-of-range seek target.
        Ok(*self.chunk_offsets.last().unwrap())
    }

    /// Number of samples packed into 1-based chunk `chunk_number`, per the `stsc` run-length
    /// table (the last matching entry applies until the next entry's `first_chunk`).
    fn samples_per_chunk_for(&self, chunk_number: u32) -> u32 {
        let mut samples = 0;
        for (i, entry) in self.samples_per_chunk_table.iter().enumerate() {
            let next_first_chunk = self
                .samples_per_chunk_table
                .get(i + 1)
                .map(|e| e.first_chunk)
                .unwrap_or(u32::MAX);
            if chunk_number >= entry.first_chunk && chunk_number < next_first_chunk {
                samples = entry.samples_per_chunk;
                break;
            }
        }
        samples
    }

    pub fn duration_ms(&self) -> u64 {
        if self.timescale == 0 {
            return 0;
        }
        self.duration_units * 1000 / self.timescale as u64
    }
}

/// Decode a raw 2-byte AudioSpecificConfig into (samplerate, channels). Grounded on
/// `m4a_parse_asc`'s bit layout: 5 bits object type, 4 bits samplerate index (or 24-bit
/// explicit rate if index==0xF, not supported here), 4 bits channel configuration.
pub fn parse_audio_specific_config(config: u16) -> Result<(u32, u16)> {
    let sr_index = ((config >> 7) & 0x0F) as usize;
    let channels = ((config >> 3) & 0x0F) as u16;
    let samplerate = *ASC_SAMPLE_RATES
        .get(sr_index)
        .ok_or_else(|| Error::Demux("m4a ASC: unsupported/explicit samplerate index".into()))?;
    if channels == 0 {
        return Err(Error::Demux("m4a ASC: channel configuration 0 unsupported".into()));
    }
    Ok((samplerate, channels))
}

/// A minimal big-endian atom reader over an in-memory buffer (callers are expected to have
/// already read the relevant span of the file — typically the whole `moov` atom, which is
/// small compared to `mdat`).
struct AtomReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> AtomReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn u8(&mut self) -> Result<u8> {
        let b = *self.buf.get(self.pos).ok_or_else(eof)?;
        self.pos += 1;
        Ok(b)
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let b = self.bytes(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(eof());
        }
        let b = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(b)
    }

    fn skip(&mut self, n: usize) -> Result<()> {
        if self.remaining() < n {
            return Err(eof());
        }
        self.pos += n;
        Ok(())
    }

    fn fourcc(&mut self) -> Result<[u8; 4]> {
        let b = self.bytes(4)?;
        Ok([b[0], b[1], b[2], b[3]])
    }
}

fn eof() -> Error {
    Error::Demux("m4a atom truncated".into())
}

/// One atom header: its fourcc name and the byte range of its *body* (header excluded)
/// within the buffer passed to [`parse_moov`].
struct Atom<'a> {
    name: [u8; 4],
    body: &'a [u8],
}

/// Split `buf` into top-level atoms (8-byte size+fourcc headers, with the 64-bit
/// `size == 1` extended form supported since some encoders emit a 64-bit `mdat`).
fn iter_atoms(buf: &[u8]) -> Result<Vec<Atom<'_>>> {
    let mut atoms = Vec::new();
    let mut r = AtomReader::new(buf);
    while r.remaining() >= 8 {
        let start = r.pos;
        let size32 = r.u32()?;
        let name = r.fourcc()?;
        let (header_len, size) = if size32 == 1 {
            let size64 = r.u64()?;
            (16usize, size64 as usize)
        } else {
            (8usize, size32 as usize)
        };
        if size < header_len || start + size > buf.len() {
            return Err(Error::Demux(format!("m4a atom '{}' has invalid size", fourcc_str(&name))));
        }
        let body = &buf[start + header_len..start + size];
        atoms.push(Atom { name, body });
        r.pos = start + size;
    }
    Ok(atoms)
}

fn fourcc_str(name: &[u8; 4]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

fn find_atom<'a, 'b>(atoms: &'b [Atom<'a>], name: &[u8; 4]) -> Option<&'b Atom<'a>> {
    atoms.iter().find(|a| &a.name == name)
}

/// Parse a full in-memory `moov` atom body into a [`SampleTable`], descending
/// `trak/mdia/minf/stbl` to find the single audio track (spec §4.5: multi-track files are
/// not supported; the first `soun`-handler track found wins).
pub fn parse_moov(moov_body: &[u8], mdat_offset: u64) -> Result<SampleTable> {
    let top = iter_atoms(moov_body)?;

    let mvhd = find_atom(&top, b"mvhd").ok_or_else(|| Error::Demux("m4a: missing mvhd".into()))?;
    let mut mvhd_r = AtomReader::new(mvhd.body);
    let version = mvhd_r.u8()?;
    mvhd_r.skip(3)?; // flags
    let (timescale, _duration) = if version == 1 {
        mvhd_r.skip(16)?; // creation/modification time (64-bit each)
        let ts = mvhd_r.u32()?;
        let dur = mvhd_r.u64()?;
        (ts, dur)
    } else {
        mvhd_r.skip(8)?; // creation/modification time (32-bit each)
        let ts = mvhd_r.u32()?;
        let dur = mvhd_r.u32()? as u64;
        (ts, dur)
    };

    let trak = find_atom(&top, b"trak").ok_or_else(|| Error::Demux("m4a: missing trak".into()))?;
    let trak_atoms = iter_atoms(trak.body)?;
    let mdia = find_atom(&trak_atoms, b"mdia")
        .ok_or_else(|| Error::Demux("m4a: missing mdia".into()))?;
    let mdia_atoms = iter_atoms(mdia.body)?;

    let mdhd = find_atom(&mdia_atoms, b"mdhd")
        .ok_or_else(|| Error::Demux("m4a: missing mdhd".into()))?;
    let mut mdhd_r = AtomReader::new(mdhd.body);
    let mdhd_version = mdhd_r.u8()?;
    mdhd_r.skip(3)?;
    let (track_timescale, duration_units) = if mdhd_version == 1 {
        mdhd_r.skip(16)?;
        let ts = mdhd_r.u32()?;
        let dur = mdhd_r.u64()?;
        (ts, dur)
    } else {
        mdhd_r.skip(8)?;
        let ts = mdhd_r.u32()?;
        let dur = mdhd_r.u32()? as u64;
        (ts, dur)
    };
    let timescale = if track_timescale != 0 { track_timescale } else { timescale };

    let hdlr = find_atom(&mdia_atoms, b"hdlr")
        .ok_or_else(|| Error::Demux("m4a: missing hdlr".into()))?;
    {
        let mut r = AtomReader::new(hdlr.body);
        r.skip(8)?; // version/flags + predefined
        let subtype = r.fourcc()?;
        if &subtype != b"soun" {
            return Err(Error::Demux("m4a: track is not an audio handler".into()));
        }
    }

    let minf = find_atom(&mdia_atoms, b"minf")
        .ok_or_else(|| Error::Demux("m4a: missing minf".into()))?;
    let minf_atoms = iter_atoms(minf.body)?;
    let stbl = find_atom(&minf_atoms, b"stbl")
        .ok_or_else(|| Error::Demux("m4a: missing stbl".into()))?;
    let stbl_atoms = iter_atoms(stbl.body)?;

    let stsd = find_atom(&stbl_atoms, b"stsd")
        .ok_or_else(|| Error::Demux("m4a: missing stsd".into()))?;
    let (samplerate, channels, bits) = parse_stsd(stsd.body)?;

    let stsz = find_atom(&stbl_atoms, b"stsz")
        .ok_or_else(|| Error::Demux("m4a: missing stsz".into()))?;
    let (sample_sizes, sample_count) = parse_stsz(stsz.body)?;

    let stsc = find_atom(&stbl_atoms, b"stsc")
        .ok_or_else(|| Error::Demux("m4a: missing stsc".into()))?;
    let samples_per_chunk_table = parse_stsc(stsc.body)?;

    let stts = find_atom(&stbl_atoms, b"stts")
        .ok_or_else(|| Error::Demux("m4a: missing stts".into()))?;
    let time_to_sample = parse_stts(stts.body)?;

    let stco_atom = find_atom(&stbl_atoms, b"stco");
    let co64_atom = find_atom(&stbl_atoms, b"co64");
    let chunk_offsets = if let Some(stco) = stco_atom {
        parse_stco(stco.body)?
    } else if let Some(co64) = co64_atom {
        parse_co64(co64.body)?
    } else {
        return Err(Error::Demux("m4a: missing stco/co64".into()));
    };

    Ok(SampleTable {
        samplerate,
        channels,
        bits,
        timescale,
        duration_units,
        sample_sizes,
        samples_per_chunk_table,
        chunk_offsets,
        time_to_sample,
        sample_count,
        mdat_offset,
    })
}

/// `stsd` holds exactly one sample description for the tracks we support (spec §4.5
/// explicitly rejects multi-entry `stsd`, matching the original's `stsdin` check).
fn parse_stsd(body: &[u8]) -> Result<(u32, u16, u16)> {
    let mut r = AtomReader::new(body);
    r.skip(4)?; // version/flags
    let entry_count = r.u32()?;
    if entry_count != 1 {
        return Err(Error::Demux("m4a: stsd must have exactly one entry".into()));
    }
    let atoms = iter_atoms(&body[r.pos..])?;
    let mp4a = atoms
        .first()
        .ok_or_else(|| Error::Demux("m4a: stsd has no sample entry".into()))?;
    if &mp4a.name != b"mp4a" {
        return Err(Error::Demux(format!(
            "m4a: unsupported sample entry '{}'",
            fourcc_str(&mp4a.name)
        )));
    }
    let mut mr = AtomReader::new(mp4a.body);
    mr.skip(6)?; // reserved
    mr.skip(2)?; // data reference index
    mr.skip(8)?; // reserved
    let channels = mr.u16()?;
    let bits = mr.u16()?;
    mr.skip(4)?; // pre-defined + reserved
    let samplerate_fixed = mr.u32()?;
    let samplerate = samplerate_fixed >> 16;
    Ok((samplerate, channels, bits))
}

fn parse_stsz(body: &[u8]) -> Result<(SampleSizes, u32)> {
    let mut r = AtomReader::new(body);
    r.skip(4)?; // version/flags
    let sample_size = r.u32()?;
    let sample_count = r.u32()?;
    if sample_size != 0 {
        return Ok((SampleSizes::Uniform(sample_size), sample_count));
    }
    if (sample_count as usize) * 2 > STSZ_MAX_BUFFER {
        return Err(Error::Unsupported(format!(
            "m4a: stsz table for {sample_count} samples exceeds the {STSZ_MAX_BUFFER}-byte cap"
        )));
    }
    let mut sizes = Vec::with_capacity(sample_count as usize);
    for _ in 0..sample_count {
        let size = r.u32()?;
        if size > 0xFFFF {
            return Err(Error::Unsupported(
                "m4a: sample size exceeds 16-bit table limit".into(),
            ));
        }
        sizes.push(size as u16);
    }
    Ok((SampleSizes::PerSample(sizes), sample_count))
}

fn parse_stsc(body: &[u8]) -> Result<Vec<StscEntry>> {
    let mut r = AtomReader::new(body);
    r.skip(4)?;
    let count = r.u32()?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        entries.push(StscEntry {
            first_chunk: r.u32()?,
            samples_per_chunk: r.u32()?,
            sample_desc_index: r.u32()?,
        });
    }
    Ok(entries)
}

fn parse_stts(body: &[u8]) -> Result<Vec<SttsEntry>> {
    let mut r = AtomReader::new(body);
    r.skip(4)?;
    let count = r.u32()?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        entries.push(SttsEntry { sample_count: r.u32()?, sample_delta: r.u32()? });
    }
    Ok(entries)
}

fn parse_stco(body: &[u8]) -> Result<Vec<u64>> {
    let mut r = AtomReader::new(body);
    r.skip(4)?;
    let count = r.u32()?;
    let mut offsets = Vec::with_capacity(count as usize);
    for _ in 0..count {
        offsets.push(r.u32()? as u64);
    }
    Ok(offsets)
}

fn parse_co64(body: &[u8]) -> Result<Vec<u64>> {
    let mut r = AtomReader::new(body);
    r.skip(4)?;
    let count = r.u32()?;
    let mut offsets = Vec::with_capacity(count as usize);
    for _ in 0..count {
        offsets.push(r.u64()?);
    }
    Ok(offsets)
}

/// Top-level atom locations needed before `moov`'s body can be parsed: whether `moov`
/// precedes or follows `mdat` (the "moov at tail" case requires a second pass once the
/// whole file length, or at least the tail, is available — spec §4.5, §C.4 of the
/// expanded spec).
pub struct TopLevelLayout {
    pub moov_offset: u64,
    pub moov_size: u64,
    pub mdat_offset: u64,
}

/// Scan a file's top-level atoms from its header bytes, locating `moov` and `mdat` without
/// requiring the whole file to be in memory. Returns `None` if `moov` wasn't found within
/// `header` (the caller should re-invoke with a larger/tail-anchored read, per the two-pass
/// handling the original extractor also needs for "moov atom after mdat").
pub fn locate_top_level_atoms(header: &[u8]) -> Result<Option<TopLevelLayout>> {
    let mut pos = 0usize;
    let mut moov: Option<(u64, u64)> = None;
    let mut mdat_offset: Option<u64> = None;

    while pos + 8 <= header.len() {
        let size32 = u32::from_be_bytes(header[pos..pos + 4].try_into().unwrap());
        let name: [u8; 4] = header[pos + 4..pos + 8].try_into().unwrap();
        let (header_len, size) = if size32 == 1 {
            if pos + 16 > header.len() {
                break;
            }
            let size64 = u64::from_be_bytes(header[pos + 8..pos + 16].try_into().unwrap());
            (16u64, size64)
        } else if size32 == 0 {
            // Extends to EOF; not representable without the file length, stop scanning here.
            break;
        } else {
            (8u64, size32 as u64)
        };

        if &name == b"moov" {
            moov = Some((pos as u64, size));
        } else if &name == b"mdat" {
            mdat_offset = Some(pos as u64 + header_len);
        }

        if size == 0 {
            break;
        }
        pos += size as usize;
    }

    match (moov, mdat_offset) {
        (Some((moov_offset, moov_size)), Some(mdat_offset)) => {
            Ok(Some(TopLevelLayout { moov_offset, moov_size, mdat_offset }))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom(name: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&((8 + body.len()) as u32).to_be_bytes());
        out.extend_from_slice(name);
        out.extend_from_slice(body);
        out
    }

    fn build_minimal_moov(sample_sizes: &[u16], stco: u32) -> Vec<u8> {
        let mut mvhd_body = vec![0u8, 0, 0, 0]; // version 0, flags
        mvhd_body.extend_from_slice(&[0u8; 8]); // creation/mod time
        mvhd_body.extend_from_slice(&1000u32.to_be_bytes()); // timescale
        mvhd_body.extend_from_slice(&48_000u32.to_be_bytes()); // duration
        let mvhd = atom(b"mvhd", &mvhd_body);

        let mut mdhd_body = vec![0u8, 0, 0, 0];
        mdhd_body.extend_from_slice(&[0u8; 8]);
        mdhd_body.extend_from_slice(&44_100u32.to_be_bytes());
        mdhd_body.extend_from_slice(&(44_100u32 * 2).to_be_bytes());
        let mdhd = atom(b"mdhd", &mdhd_body);

        let mut hdlr_body = vec![0u8; 8];
        hdlr_body.extend_from_slice(b"soun");
        hdlr_body.extend_from_slice(&[0u8; 12]);
        let hdlr = atom(b"hdlr", &hdlr_body);

        let mut mp4a_body = vec![0u8; 6]; // reserved
        mp4a_body.extend_from_slice(&1u16.to_be_bytes()); // data ref index
        mp4a_body.extend_from_slice(&[0u8; 8]); // reserved
        mp4a_body.extend_from_slice(&2u16.to_be_bytes()); // channels
        mp4a_body.extend_from_slice(&16u16.to_be_bytes()); // bits
        mp4a_body.extend_from_slice(&[0u8; 4]); // pre-defined+reserved
        mp4a_body.extend_from_slice(&(44_100u32 << 16).to_be_bytes()); // samplerate fixed
        let mp4a = atom(b"mp4a", &mp4a_body);

        let mut stsd_body = vec![0u8, 0, 0, 0];
        stsd_body.extend_from_slice(&1u32.to_be_bytes());
        stsd_body.extend_from_slice(&mp4a);
        let stsd = atom(b"stsd", &stsd_body);

        let mut stsz_body = vec![0u8, 0, 0, 0];
        stsz_body.extend_from_slice(&0u32.to_be_bytes()); // sample_size = 0 -> table follows
        stsz_body.extend_from_slice(&(sample_sizes.len() as u32).to_be_bytes());
        for &s in sample_sizes {
            stsz_body.extend_from_slice(&(s as u32).to_be_bytes());
        }
        let stsz = atom(b"stsz", &stsz_body);

        let mut stsc_body = vec![0u8, 0, 0, 0];
        stsc_body.extend_from_slice(&1u32.to_be_bytes()); // one entry
        stsc_body.extend_from_slice(&1u32.to_be_bytes()); // first_chunk
        stsc_body.extend_from_slice(&(sample_sizes.len() as u32).to_be_bytes()); // samples/chunk
        stsc_body.extend_from_slice(&1u32.to_be_bytes()); // sample_desc_index
        let stsc = atom(b"stsc", &stsc_body);

        let mut stco_body = vec![0u8, 0, 0, 0];
        stco_body.extend_from_slice(&1u32.to_be_bytes());
        stco_body.extend_from_slice(&stco.to_be_bytes());
        let stco_atom = atom(b"stco", &stco_body);

        // One run covering every sample at 1024 timescale units/sample (a typical AAC frame
        // duration at the 1000-unit mvhd timescale this helper uses elsewhere).
        let mut stts_body = vec![0u8, 0, 0, 0];
        stts_body.extend_from_slice(&1u32.to_be_bytes());
        stts_body.extend_from_slice(&(sample_sizes.len() as u32).to_be_bytes());
        stts_body.extend_from_slice(&1024u32.to_be_bytes());
        let stts = atom(b"stts", &stts_body);

        let mut stbl_body = Vec::new();
        stbl_body.extend_from_slice(&stsd);
        stbl_body.extend_from_slice(&stsz);
        stbl_body.extend_from_slice(&stsc);
        stbl_body.extend_from_slice(&stts);
        stbl_body.extend_from_slice(&stco_atom);
        let stbl = atom(b"stbl", &stbl_body);

        let minf = atom(b"minf", &stbl);

        let mut mdia_body = Vec::new();
        mdia_body.extend_from_slice(&mdhd);
        mdia_body.extend_from_slice(&hdlr);
        mdia_body.extend_from_slice(&minf);
        let mdia = atom(b"mdia", &mdia_body);

        let trak = atom(b"trak", &mdia);

        let mut moov_body = Vec::new();
        moov_body.extend_from_slice(&mvhd);
        moov_body.extend_from_slice(&trak);
        moov_body
    }

    #[test]
    fn parses_track_format_from_mp4a_entry() {
        let moov_body = build_minimal_moov(&[100, 100, 100, 100], 500);
        let table = parse_moov(&moov_body, 500).unwrap();
        assert_eq!(table.samplerate, 44_100);
        assert_eq!(table.channels, 2);
        assert_eq!(table.bits, 16);
        assert_eq!(table.sample_count, 4);
    }

    #[test]
    fn seek_offset_for_ms_maps_time_to_byte_within_chunk() {
        let moov_body = build_minimal_moov(&[100, 100, 100, 100], 1000);
        let table = parse_moov(&moov_body, 1000).unwrap();
        // track timescale is 44100 (mdhd), 1024 units/sample -> ~23.2ms/sample.
        assert_eq!(table.seek_offset_for_ms(0).unwrap(), 1000);
        // 50ms lands on sample index 2 (2 samples * 100 bytes precede it in the chunk).
        assert_eq!(table.seek_offset_for_ms(50).unwrap(), 1000 + 200);
        // Past the end clamps to the last sample in the run (index 3 here).
        assert_eq!(table.seek_offset_for_ms(10_000).unwrap(), 1000 + 300);
    }

    #[test]
    fn stsz_table_over_cap_is_rejected() {
        let mut big = vec![0u8, 0, 0, 0, 0, 0, 0, 0];
        let huge_count = (STSZ_MAX_BUFFER / 2 + 1) as u32;
        big.extend_from_slice(&huge_count.to_be_bytes());
        // Don't materialize the whole table; parse_stsz should error before needing it.
        let err = parse_stsz(&big);
        assert!(err.is_err());
    }

    #[test]
    fn asc_decodes_common_44100_stereo() {
        // AudioSpecificConfig: objectType(5)=2 (AAC LC) << 11 | srIndex(4)=4 (44100) << 7
        // | channelConfig(4)=2 (stereo) << 3.
        let config: u16 = (2 << 11) | (4 << 7) | (2 << 3);
        let (sr, ch) = parse_audio_specific_config(config).unwrap();
        assert_eq!(sr, 44_100);
        assert_eq!(ch, 2);
    }

    #[test]
    fn locates_moov_before_mdat() {
        let moov_body = build_minimal_moov(&[10, 10], 0);
        let moov = atom(b"moov", &moov_body);
        let mdat = atom(b"mdat", &[0u8; 20]);
        let mut file = Vec::new();
        file.extend_from_slice(&moov);
        file.extend_from_slice(&mdat);
        let layout = locate_top_level_atoms(&file).unwrap().unwrap();
        assert_eq!(layout.moov_offset, 0);
        assert_eq!(layout.mdat_offset, moov.len() as u64 + 8);
    }

    /// `ftyp -> mdat -> moov` forces the two-pass walker (moov isn't in the initial header
    /// read); parsing the moov span it locates must yield the same sample table as parsing
    /// a moov-first rearrangement of the identical moov bytes.
    #[test]
    fn moov_after_mdat_two_pass_matches_moov_first() {
        let moov_body = build_minimal_moov(&[100, 100, 100, 100], 5000);
        let moov = atom(b"moov", &moov_body);
        let ftyp = atom(b"ftyp", b"M4A \0\0\0\0");
        let mdat = atom(b"mdat", &[0u8; 400]);

        let mut tail_layout_file = Vec::new();
        tail_layout_file.extend_from_slice(&ftyp);
        tail_layout_file.extend_from_slice(&mdat);
        let mdat_offset_expected = tail_layout_file.len() as u64;
        tail_layout_file.extend_from_slice(&moov);

        let layout = locate_top_level_atoms(&tail_layout_file).unwrap().unwrap();
        assert_eq!(layout.mdat_offset, mdat_offset_expected);
        let moov_span = &tail_layout_file
            [layout.moov_offset as usize..(layout.moov_offset + layout.moov_size) as usize];
        // moov_span still carries its own 8-byte atom header; parse_moov expects the body.
        let two_pass_table = parse_moov(&moov_span[8..], layout.mdat_offset).unwrap();

        let mut front_layout_file = Vec::new();
        front_layout_file.extend_from_slice(&moov);
        front_layout_file.extend_from_slice(&mdat);
        let front_layout = locate_top_level_atoms(&front_layout_file).unwrap().unwrap();
        let front_table = parse_moov(&moov_body, front_layout.mdat_offset).unwrap();

        // The moov body's stco entries carry absolute file offsets independent of where the
        // two parses found mdat, so the resulting sample tables must be identical byte-for-
        // byte regardless of which layout pass produced them.
        assert_eq!(two_pass_table.samplerate, front_table.samplerate);
        assert_eq!(two_pass_table.channels, front_table.channels);
        assert_eq!(two_pass_table.bits, front_table.bits);
        assert_eq!(two_pass_table.sample_count, front_table.sample_count);
        assert_eq!(
            two_pass_table.seek_offset_for_ms(0).unwrap(),
            front_table.seek_offset_for_ms(0).unwrap()
        );
    }
}
