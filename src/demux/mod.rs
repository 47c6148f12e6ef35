//! Container/elementary-stream demuxers (spec §4.5).
//!
//! Each submodule is self-contained: given a byte slice (or a full resource for the
//! seek-table builders), it either syncs onto a frame/atom layout or returns a
//! [`crate::error::Error::Demux`]. Nothing here touches adapters or ringbuffers directly —
//! demuxers are pure functions over bytes, called from the decoder stage's
//! [`crate::element::ElementSpec::process`].

pub mod aac;
pub mod m4a;
pub mod mp3;
pub mod wav;

/// A located, unparsed frame: its header size is already validated, but the payload hasn't
/// been handed to a codec yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    /// Offset (from the start of the slice the caller searched) where the frame begins.
    pub offset: usize,
    /// Total frame size in bytes, header included.
    pub size: usize,
}
