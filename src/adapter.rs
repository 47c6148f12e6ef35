//! Platform I/O adapter contracts (spec §6).
//!
//! The engine never talks to a file, socket, or audio device directly — it consumes these
//! traits. Concrete implementations (a real file reader, an HTTP client with range-GET
//! support, an ALSA/CoreAudio sink) are external collaborators out of this crate's scope;
//! only their contract is specified here, plus a couple of in-memory fakes used by tests.

use crate::error::Result;

/// A byte-oriented, seekable source of compressed audio (file or HTTP).
///
/// `open` is called with a byte offset (`content_pos`) rather than always 0 so that seeks can
/// reopen the adapter directly at the target position instead of opening-then-seeking. For
/// HTTP, the adapter is expected to issue a `Range: bytes=content_pos-` request and to retry
/// transiently failed requests internally (the reference policy is 5 retries with a 3s
/// backoff, see [`crate::config::EngineConfig`]); retries are never the engine's concern.
pub trait SourceAdapter: Send {
    /// A handle type private to the implementation (e.g. an open file descriptor or socket).
    type Handle: Send;

    /// Open the resource positioned at `content_pos` bytes from the start. Returns `None` on
    /// failure (the caller reports `ErrorOpen`/`READ_FAILED`).
    fn open(&mut self, url: &str, content_pos: u64) -> Option<Self::Handle>;

    /// Read up to `buf.len()` bytes. `Ok(0)` means end-of-stream; `Err` means a fatal read
    /// error (distinct from EOF).
    fn read(&mut self, handle: &mut Self::Handle, buf: &mut [u8]) -> Result<usize>;

    /// Total resource size in bytes, or 0 if unknown (e.g. a live HTTP stream with no
    /// `Content-Length`).
    fn filesize(&mut self, handle: &mut Self::Handle) -> u64;

    /// Seek to an absolute byte offset.
    fn seek(&mut self, handle: &mut Self::Handle, offset: u64) -> Result<()>;

    /// Release the handle. Infallible by contract (the original sources' `close` callbacks
    /// return `void`): implementations that can fail should log and swallow the error.
    fn close(&mut self, handle: Self::Handle);
}

/// A PCM output device. Always fed 16-bit little-endian signed interleaved PCM.
///
/// `open` may be called more than once across a single playback if the decoder announces a
/// format change mid-stream (spec §4.7) — implementations must tolerate being reopened.
pub trait SinkAdapter: Send {
    type Handle: Send;

    /// Open (or reopen) the device at the given format. Returns `None` on failure.
    fn open(&mut self, samplerate: u32, channels: u16) -> Option<Self::Handle>;

    /// Write a full chunk of PCM, returning the number of bytes accepted (implementations may
    /// write fewer than `buf.len()`; the sink stage loops until the chunk is flushed).
    fn write(&mut self, handle: &mut Self::Handle, buf: &[u8]) -> Result<usize>;

    fn close(&mut self, handle: Self::Handle);
}

#[cfg(test)]
pub(crate) mod fakes {
    //! In-memory adapters used by unit/integration tests, never shipped as "the" file/http/sink
    //! adapter — those are external collaborators per spec §1.
    use super::*;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    /// A `SourceAdapter` backed by an in-memory byte buffer, supporting seek.
    pub struct MemorySource {
        pub data: Arc<Vec<u8>>,
    }

    impl MemorySource {
        pub fn new(data: Vec<u8>) -> Self {
            Self { data: Arc::new(data) }
        }
    }

    impl SourceAdapter for MemorySource {
        type Handle = Cursor<Arc<Vec<u8>>>;

        fn open(&mut self, _url: &str, content_pos: u64) -> Option<Self::Handle> {
            if content_pos > self.data.len() as u64 {
                return None;
            }
            let mut cursor = Cursor::new(self.data.clone());
            cursor.set_position(content_pos);
            Some(cursor)
        }

        fn read(&mut self, handle: &mut Self::Handle, buf: &mut [u8]) -> Result<usize> {
            use std::io::Read;
            Ok(handle.read(buf)?)
        }

        fn filesize(&mut self, _handle: &mut Self::Handle) -> u64 {
            self.data.len() as u64
        }

        fn seek(&mut self, handle: &mut Self::Handle, offset: u64) -> Result<()> {
            handle.set_position(offset);
            Ok(())
        }

        fn close(&mut self, _handle: Self::Handle) {}
    }

    /// A `SinkAdapter` that records every write, for assertions in tests.
    #[derive(Clone, Default)]
    pub struct RecordingSink {
        pub opens: Arc<Mutex<Vec<(u32, u16)>>>,
        pub written: Arc<Mutex<Vec<u8>>>,
    }

    impl SinkAdapter for RecordingSink {
        type Handle = ();

        fn open(&mut self, samplerate: u32, channels: u16) -> Option<Self::Handle> {
            self.opens.lock().unwrap().push((samplerate, channels));
            Some(())
        }

        fn write(&mut self, _handle: &mut Self::Handle, buf: &[u8]) -> Result<usize> {
            self.written.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn close(&mut self, _handle: Self::Handle) {}
    }

    #[test]
    fn memory_source_reads_and_seeks() {
        let mut src = MemorySource::new((0u8..100).collect());
        let mut h = src.open("mem://x", 10).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(src.read(&mut h, &mut buf).unwrap(), 4);
        assert_eq!(buf, [10, 11, 12, 13]);
        src.seek(&mut h, 50).unwrap();
        assert_eq!(src.read(&mut h, &mut buf).unwrap(), 4);
        assert_eq!(buf, [50, 51, 52, 53]);
    }
}
