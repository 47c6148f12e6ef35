//! Ambient engine configuration (spec §9, SPEC_FULL §B.3).
//!
//! Centralizes the magic numbers that were scattered across the original sources'
//! `liteplayer_config.h` and various per-element constants, so nothing in this crate reaches
//! for a bare literal where a configurable default belongs.

use std::time::Duration;

/// Tunables for one running [`crate::player::Player`]. Constructed once via [`Default`] and
/// otherwise plain data — no hidden global state (spec §9).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Size of the ringbuffer between the media source and the decoder stage.
    pub source_rb_size: usize,
    /// Size of the ringbuffer between the decoder stage and the sink stage.
    pub decoder_rb_size: usize,
    /// Scratch read size the media source uses per adapter `read` call.
    pub source_read_chunk: usize,
    /// Default blocking-I/O timeout for element input/output endpoints.
    pub element_io_timeout: Duration,
    /// Timeout for `wait_for_stop_ms`-style state barriers.
    pub state_wait_timeout: Duration,
    /// Maximum consecutive decode failures before an element reports `ErrorProcess`
    /// (spec §7).
    pub decoder_retry_budget: u32,
    /// HTTP adapter retry count the adapter contract documents as expected behavior,
    /// even though the concrete HTTP client is external (spec §6).
    pub http_retry_count: u32,
    /// Backoff between HTTP adapter retries.
    pub http_retry_backoff: Duration,
    /// MP3 input staging buffer size (spec §4.5: "up to ~1940 bytes").
    pub mp3_input_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            source_rb_size: 100 * 1024,
            decoder_rb_size: 8 * 1024 * 2,
            source_read_chunk: 1024,
            element_io_timeout: Duration::from_millis(200),
            state_wait_timeout: Duration::from_secs(12),
            decoder_retry_budget: 4,
            http_retry_count: 5,
            http_retry_backoff: Duration::from_secs(3),
            mp3_input_buffer: 1940,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.source_read_chunk, 1024);
        assert_eq!(cfg.decoder_retry_budget, 4);
        assert_eq!(cfg.http_retry_count, 5);
        assert_eq!(cfg.mp3_input_buffer, 1940);
    }
}
