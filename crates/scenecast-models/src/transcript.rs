//! Time-stamped transcription segments.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A span of transcribed speech with its timing, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TranscriptionSegment {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

impl TranscriptionSegment {
    pub fn new(text: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            text: text.into(),
            start,
            end,
        }
    }

    /// Duration of the segment (never negative).
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// Problems found while validating a transcript.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SegmentError {
    #[error("segment {index} has a non-finite timestamp")]
    NonFinite { index: usize },

    #[error("segment {index} ends before it starts ({start} > {end})")]
    Inverted { index: usize, start: f64, end: f64 },

    #[error("segment {index} starts at {start}, before the previous one ended at {previous_end}")]
    NotMonotonic {
        index: usize,
        start: f64,
        previous_end: f64,
    },
}

/// Total timeline covered by a transcript: `[0, last end]`.
pub fn transcript_duration(segments: &[TranscriptionSegment]) -> f64 {
    segments
        .iter()
        .map(|s| s.end)
        .fold(0.0_f64, f64::max)
}

/// Check that segment timestamps are finite and monotonic non-decreasing.
///
/// Small overlaps (up to `tolerance` seconds) are accepted because speech
/// recognisers commonly report touching segments with rounding jitter.
pub fn validate_segments(
    segments: &[TranscriptionSegment],
    tolerance: f64,
) -> Result<(), SegmentError> {
    let mut previous_end = 0.0_f64;
    for (index, seg) in segments.iter().enumerate() {
        if !seg.start.is_finite() || !seg.end.is_finite() {
            return Err(SegmentError::NonFinite { index });
        }
        if seg.end < seg.start {
            return Err(SegmentError::Inverted {
                index,
                start: seg.start,
                end: seg.end,
            });
        }
        if index > 0 && seg.start + tolerance < previous_end {
            return Err(SegmentError::NotMonotonic {
                index,
                start: seg.start,
                previous_end,
            });
        }
        previous_end = seg.end;
    }
    Ok(())
}
