//! Lifecycle and element-status event types (spec §4.2, §6, §7).

use serde::{Deserialize, Serialize};

/// Public lifecycle states delivered to an embedder's [`crate::player::StateListener`]
/// (spec §6, §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerState {
    Idle,
    Inited,
    Prepared,
    Started,
    Paused,
    SeekCompleted,
    CacheCompleted,
    NearlyCompleted,
    Completed,
    Stopped,
    Error,
}

/// The element-level error taxonomy (spec §7). `ErrorTimeout` is non-fatal; everything else
/// drives the element to `State::Error` and is forwarded through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementError {
    ErrorOpen,
    ErrorInput,
    ErrorProcess,
    ErrorOutput,
    ErrorTimeout,
    ErrorUnknown,
}

/// Status events an [`crate::element::Element`] emits as it runs. The pipeline forwards these
/// (each tagged with the emitting element's tag) to a single listener set by the player, which
/// re-interprets them as coarse [`PlayerState`] transitions (spec §4.8).
#[derive(Debug, Clone)]
pub enum ElementStatus {
    Error(ElementError),
    InputDone,
    InputBuffering,
    OutputDone,
    OutputBuffering,
    StateRunning,
    StatePaused,
    StateStopped,
    StateFinished,
    /// Emitted once, after the first decoded frame, carrying the format the decoder produced
    /// so the sink can reconfigure if needed (spec §4.6, §4.7).
    ReportMusicInfo { samplerate: u32, channels: u16, bits: u16 },
    /// Emitted by the sink after every flush (spec §4.7).
    ReportPosition { byte_pos: u64 },
    /// Emitted by the media source once cumulative bytes written cross the configured
    /// threshold (spec §4.4).
    ReachThreshold,
}

/// An event tagged with the name of the element (or stage) that emitted it.
#[derive(Debug, Clone)]
pub struct TaggedEvent {
    pub tag: String,
    pub status: ElementStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_state_round_trips_through_json() {
        let s = PlayerState::NearlyCompleted;
        let json = serde_json::to_string(&s).unwrap();
        let back: PlayerState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
