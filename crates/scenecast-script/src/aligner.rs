//! Transcript aligner: maps timed transcription segments onto script paragraphs.
//!
//! Transcript words get interpolated timestamps inside their segment. Script
//! words are then fuzzy-matched against them with a forward-only cursor, so
//! time never moves backward. A paragraph counts as matched when enough of
//! its words were found; its anchor is the time of its first and last
//! matched word. Unmatched paragraphs share the time around their matched
//! neighbours in proportion to character count.

use scenecast_models::{transcript_duration, TranscriptionSegment, TIME_EPSILON};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::AlignmentError;
use crate::text::{char_weight, word_count, words};

/// Minimum word length considered when re-synchronising after a gap.
const RESYNC_MIN_WORD_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentSettings {
    /// Fraction of the transcript duration that must be matched
    pub min_coverage: f64,
    /// Normalized Levenshtein similarity for a word match
    pub match_threshold: f64,
    /// Transcript words searched ahead of the cursor per script word
    pub lookahead_words: usize,
    /// Fraction of a paragraph's words that must match
    pub min_paragraph_match: f64,
}

impl Default for AlignmentSettings {
    fn default() -> Self {
        Self {
            min_coverage: 0.5,
            match_threshold: 0.8,
            lookahead_words: 4,
            min_paragraph_match: 0.5,
        }
    }
}

/// A piece of script text with its time range.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedSpan {
    pub text: String,
    pub start: f64,
    pub end: f64,
    /// Whether the range comes from matched transcript words
    pub matched: bool,
}

impl TimedSpan {
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// Contiguous per-paragraph timing covering `[0, total_duration]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    pub spans: Vec<TimedSpan>,
    pub total_duration: f64,
    /// Matched fraction of the transcript duration
    pub coverage: f64,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
struct TimedWord {
    word: String,
    start: f64,
    end: f64,
}

/// Interpolate word timestamps inside each segment by character length.
fn timed_words(segments: &[TranscriptionSegment]) -> Vec<TimedWord> {
    let mut out = Vec::new();
    for seg in segments {
        let seg_words = words(&seg.text);
        if seg_words.is_empty() {
            continue;
        }
        let weights: Vec<f64> = seg_words
            .iter()
            .map(|w| w.chars().count() as f64 + 1.0)
            .collect();
        let total: f64 = weights.iter().sum();
        let mut t = seg.start;
        for (word, weight) in seg_words.into_iter().zip(weights) {
            let len = seg.duration() * weight / total;
            out.push(TimedWord {
                word,
                start: t,
                end: t + len,
            });
            t += len;
        }
    }
    out
}

pub struct TranscriptAligner {
    settings: AlignmentSettings,
}

impl TranscriptAligner {
    pub fn new(settings: AlignmentSettings) -> Self {
        Self { settings }
    }

    /// Align `paragraphs` against `segments`.
    ///
    /// Fails only when the transcript or script is empty or the matched
    /// coverage is below `min_coverage`; every other problem is recorded in
    /// [`Alignment::warnings`].
    pub fn align(
        &self,
        segments: &[TranscriptionSegment],
        paragraphs: &[String],
    ) -> Result<Alignment, AlignmentError> {
        if paragraphs.is_empty() {
            return Err(AlignmentError::EmptyScript);
        }
        let total = transcript_duration(segments);
        let transcript = timed_words(segments);
        if transcript.is_empty() || total <= 0.0 {
            return Err(AlignmentError::EmptyTranscript);
        }

        let mut warnings = Vec::new();
        let mut anchors: Vec<Option<(f64, f64)>> = Vec::with_capacity(paragraphs.len());
        let mut cursor = 0usize;
        let mut previous_boundary = 0.0_f64;

        for (index, paragraph) in paragraphs.iter().enumerate() {
            let Some((first, last, next_cursor)) =
                self.match_paragraph(paragraph, &transcript, cursor)
            else {
                warnings.push(format!(
                    "paragraph {index} has no matching transcript span; timing interpolated"
                ));
                anchors.push(None);
                continue;
            };

            let mut start = transcript[first].start;
            let end = transcript[last].end;
            if end + TIME_EPSILON < previous_boundary {
                warnings.push(format!(
                    "paragraph {index} match would move time backward; previous boundary reused"
                ));
                anchors.push(None);
                continue;
            }
            if start < previous_boundary {
                debug!(index, start, previous_boundary, "Clamping paragraph start");
                start = previous_boundary;
            }

            anchors.push(Some((start, end)));
            previous_boundary = end;
            cursor = next_cursor;
        }

        let matched_time: f64 = anchors.iter().flatten().map(|(s, e)| e - s).sum();
        let coverage = (matched_time / total).clamp(0.0, 1.0);
        if coverage < self.settings.min_coverage {
            return Err(AlignmentError::InsufficientCoverage {
                coverage,
                minimum: self.settings.min_coverage,
            });
        }

        for warning in &warnings {
            warn!("{}", warning);
        }

        let weights: Vec<f64> = paragraphs.iter().map(|p| char_weight(p) as f64).collect();
        let boundaries = build_timeline(&anchors, &weights, total);
        let spans = paragraphs
            .iter()
            .zip(anchors.iter())
            .enumerate()
            .map(|(i, (text, anchor))| TimedSpan {
                text: text.clone(),
                start: boundaries[i],
                end: boundaries[i + 1],
                matched: anchor.is_some(),
            })
            .collect();

        Ok(Alignment {
            spans,
            total_duration: total,
            coverage,
            warnings,
        })
    }

    /// Returns `(first word, last word, new cursor)` when the paragraph matches.
    fn match_paragraph(
        &self,
        paragraph: &str,
        transcript: &[TimedWord],
        start_cursor: usize,
    ) -> Option<(usize, usize, usize)> {
        let script_words = words(paragraph);
        if script_words.is_empty() {
            return None;
        }

        let mut cursor = start_cursor;
        let mut matched = 0usize;
        let mut first = None;
        let mut last = None;

        for word in &script_words {
            // Until the paragraph has an anchor, long words may search further
            // ahead to skip transcript text that is absent from the script.
            let window = if first.is_none() && word.chars().count() >= RESYNC_MIN_WORD_LEN {
                self.settings.lookahead_words * 8
            } else {
                self.settings.lookahead_words
            };
            let stop = (cursor + window + 1).min(transcript.len());
            let found = (cursor..stop).find(|&j| {
                strsim::normalized_levenshtein(word, &transcript[j].word)
                    >= self.settings.match_threshold
            });
            if let Some(j) = found {
                matched += 1;
                first.get_or_insert(j);
                last = Some(j);
                cursor = j + 1;
            }
        }

        let ratio = matched as f64 / script_words.len() as f64;
        match (first, last) {
            (Some(first), Some(last)) if ratio >= self.settings.min_paragraph_match => {
                Some((first, last, cursor))
            }
            _ => None,
        }
    }
}

/// Compute `n + 1` monotonic boundaries over `[0, total]`.
///
/// Adjacent matched paragraphs split at the next paragraph's anchor start.
/// A run of unmatched paragraphs takes the window between the midpoints of
/// its matched neighbours (or the timeline edges) and shares it with the
/// adjacent neighbour halves by character weight.
fn build_timeline(anchors: &[Option<(f64, f64)>], weights: &[f64], total: f64) -> Vec<f64> {
    let n = anchors.len();
    let mut bounds = vec![0.0_f64; n + 1];
    bounds[n] = total;

    for i in 1..n {
        if let (Some(_), Some((start, _))) = (anchors[i - 1], anchors[i]) {
            bounds[i] = start;
        }
    }

    let midpoint = |k: usize| anchors[k].map(|(s, e)| (s + e) / 2.0);

    let mut i = 0;
    while i < n {
        if anchors[i].is_some() {
            i += 1;
            continue;
        }
        let run_start = i;
        while i < n && anchors[i].is_none() {
            i += 1;
        }
        let run_end = i;

        let left = run_start.checked_sub(1);
        let right = (run_end < n).then_some(run_end);
        let window_start = left.and_then(midpoint).unwrap_or(0.0);
        let window_end = right.and_then(midpoint).unwrap_or(total).max(window_start);
        let width = window_end - window_start;

        let left_half = left.map_or(0.0, |l| weights[l] / 2.0);
        let right_half = right.map_or(0.0, |r| weights[r] / 2.0);
        let run_weights: Vec<f64> = weights[run_start..run_end].to_vec();
        let mut total_weight = left_half + right_half + run_weights.iter().sum::<f64>();
        let equal = total_weight <= 0.0;
        if equal {
            total_weight = (run_end - run_start) as f64;
        }

        let mut acc = if equal { 0.0 } else { left_half };
        if left.is_some() {
            bounds[run_start] = window_start + width * acc / total_weight;
        }
        for (offset, weight) in run_weights.iter().enumerate() {
            acc += if equal { 1.0 } else { *weight };
            let k = run_start + offset + 1;
            if k < n {
                bounds[k] = window_start + width * (acc / total_weight).min(1.0);
            }
        }
    }

    let mut running = 0.0_f64;
    for bound in bounds.iter_mut() {
        *bound = bound.clamp(running, total);
        running = *bound;
    }
    bounds
}

/// Distribute `total` over paragraphs by character count.
pub fn proportional_alignment(paragraphs: &[String], total: f64) -> Alignment {
    let weights: Vec<f64> = paragraphs.iter().map(|p| char_weight(p) as f64).collect();
    let sum: f64 = weights.iter().sum();
    let mut spans = Vec::with_capacity(paragraphs.len());
    let mut acc = 0.0;
    for (text, weight) in paragraphs.iter().zip(&weights) {
        let start = if sum > 0.0 { total * acc / sum } else { 0.0 };
        acc += weight;
        let end = if sum > 0.0 { total * acc / sum } else { 0.0 };
        spans.push(TimedSpan {
            text: text.clone(),
            start,
            end,
            matched: false,
        });
    }
    if let Some(last) = spans.last_mut() {
        last.end = total;
    }
    Alignment {
        spans,
        total_duration: total,
        coverage: 0.0,
        warnings: Vec::new(),
    }
}

/// Estimate paragraph durations from word count when there is no transcript.
pub fn estimated_alignment(paragraphs: &[String], words_per_second: f64) -> Alignment {
    let rate = if words_per_second > 0.0 { words_per_second } else { 2.5 };
    let mut spans = Vec::with_capacity(paragraphs.len());
    let mut t = 0.0;
    for text in paragraphs {
        let duration = word_count(text) as f64 / rate;
        spans.push(TimedSpan {
            text: text.clone(),
            start: t,
            end: t + duration,
            matched: false,
        });
        t += duration;
    }
    Alignment {
        spans,
        total_duration: t,
        coverage: 0.0,
        warnings: Vec::new(),
    }
}
