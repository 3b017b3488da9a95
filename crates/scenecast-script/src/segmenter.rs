//! Scene segmenter: cuts aligned script text into ordered, contiguous scenes.

use scenecast_models::{Scene, SegmentationMode, SegmentationSettings, TIME_EPSILON};
use tracing::debug;

use crate::aligner::TimedSpan;
use crate::text::{char_weight, split_sentences};

pub struct SceneSegmenter {
    settings: SegmentationSettings,
}

impl SceneSegmenter {
    pub fn new(settings: SegmentationSettings) -> Self {
        Self { settings }
    }

    /// Build scenes from per-paragraph spans.
    ///
    /// The spans must be contiguous; the resulting scenes cover exactly the
    /// same range, are ordered by start time and indexed from 0.
    pub fn segment(&self, paragraphs: &[TimedSpan]) -> Vec<Scene> {
        let spans = merge_zero_length(paragraphs.to_vec(), "\n\n");
        let groups = match self.settings.mode {
            SegmentationMode::ByParagraph => spans.into_iter().map(|s| vec![s]).collect(),
            SegmentationMode::Hybrid => self.hybrid(spans),
            SegmentationMode::FixedDuration => self.fixed_duration(&spans),
        };

        let separator = match self.settings.mode {
            SegmentationMode::FixedDuration => " ",
            _ => "\n\n",
        };

        let merged: Vec<TimedSpan> = groups
            .into_iter()
            .filter(|g| !g.is_empty())
            .map(|group| join_group(&group, separator))
            .collect();
        let merged = merge_zero_length(merged, separator);

        let scenes: Vec<Scene> = merged
            .into_iter()
            .enumerate()
            .map(|(index, span)| Scene::new(index, span.text, span.start, span.end))
            .collect();

        debug!(
            mode = self.settings.mode.as_str(),
            paragraphs = paragraphs.len(),
            scenes = scenes.len(),
            "Segmented script"
        );
        scenes
    }

    /// Merge paragraphs between `min` and `max` duration.
    ///
    /// A paragraph that would push an under-minimum scene past `max` starts
    /// a new scene instead, and a short final scene is kept as-is.
    fn hybrid(&self, spans: Vec<TimedSpan>) -> Vec<Vec<TimedSpan>> {
        let min = self.settings.min_scene_duration;
        let max = self.settings.max_scene_duration;
        let mut groups = Vec::new();
        let mut current: Vec<TimedSpan> = Vec::new();
        let mut current_duration = 0.0;

        for span in spans {
            let duration = span.duration();
            if current.is_empty() {
                current_duration = duration;
                current.push(span);
                continue;
            }
            let reached_min = current_duration + TIME_EPSILON >= min;
            let would_exceed_max = current_duration + duration > max + TIME_EPSILON;
            if reached_min || would_exceed_max {
                groups.push(std::mem::take(&mut current));
                current_duration = duration;
                current.push(span);
            } else {
                current_duration += duration;
                current.push(span);
            }
        }
        if !current.is_empty() {
            groups.push(current);
        }
        groups
    }

    /// Cut at the sentence boundary nearest each multiple of the interval.
    fn fixed_duration(&self, spans: &[TimedSpan]) -> Vec<Vec<TimedSpan>> {
        let sentences: Vec<TimedSpan> = spans.iter().flat_map(sentence_spans).collect();
        if sentences.is_empty() {
            return Vec::new();
        }
        let interval = self.settings.fixed_interval;
        let total_end = sentences.last().map_or(0.0, |s| s.end);
        if interval <= 0.0 {
            return vec![sentences];
        }

        // Candidate cuts are sentence ends, except the final one.
        let boundaries: Vec<f64> = sentences[..sentences.len() - 1]
            .iter()
            .map(|s| s.end)
            .collect();

        let mut cuts: Vec<usize> = Vec::new();
        let mut k = 1.0;
        while k * interval < total_end - TIME_EPSILON {
            let target = k * interval;
            let nearest = boundaries
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| (*a - target).abs().total_cmp(&(*b - target).abs()))
                .map(|(i, _)| i);
            if let Some(i) = nearest {
                if cuts.last().map_or(true, |&last| i > last) {
                    cuts.push(i);
                }
            }
            k += 1.0;
        }

        let mut groups = Vec::with_capacity(cuts.len() + 1);
        let mut start = 0;
        for cut in cuts {
            groups.push(sentences[start..=cut].to_vec());
            start = cut + 1;
        }
        groups.push(sentences[start..].to_vec());
        groups
    }
}

/// Split a paragraph span into sentences timed by character share.
fn sentence_spans(span: &TimedSpan) -> Vec<TimedSpan> {
    let sentences = split_sentences(&span.text);
    if sentences.len() <= 1 {
        return vec![span.clone()];
    }
    let weights: Vec<f64> = sentences.iter().map(|s| char_weight(s) as f64).collect();
    let total: f64 = weights.iter().sum();
    let mut t = span.start;
    let mut acc = 0.0;
    let count = sentences.len();
    sentences
        .into_iter()
        .zip(weights)
        .enumerate()
        .map(|(i, (text, weight))| {
            acc += weight;
            let end = if i + 1 == count || total <= 0.0 {
                span.end
            } else {
                span.start + span.duration() * acc / total
            };
            let piece = TimedSpan {
                text,
                start: t,
                end,
                matched: span.matched,
            };
            t = end;
            piece
        })
        .collect()
}

fn join_group(group: &[TimedSpan], separator: &str) -> TimedSpan {
    let text = group
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(separator);
    TimedSpan {
        text,
        start: group.first().map_or(0.0, |s| s.start),
        end: group.last().map_or(0.0, |s| s.end),
        matched: group.iter().all(|s| s.matched),
    }
}

/// Fold zero-length spans into the previous span (or the next, if first).
fn merge_zero_length(spans: Vec<TimedSpan>, separator: &str) -> Vec<TimedSpan> {
    let mut out: Vec<TimedSpan> = Vec::with_capacity(spans.len());
    let mut leading: Vec<TimedSpan> = Vec::new();

    for span in spans {
        if span.duration() > TIME_EPSILON {
            if !leading.is_empty() {
                let mut group = std::mem::take(&mut leading);
                group.push(span);
                out.push(join_group(&group, separator));
            } else {
                out.push(span);
            }
            continue;
        }
        match out.last_mut() {
            Some(previous) => {
                previous.text.push_str(separator);
                previous.text.push_str(&span.text);
                previous.end = previous.end.max(span.end);
            }
            None => leading.push(span),
        }
    }

    // Everything had zero length: keep a single zero-length span.
    if out.is_empty() && !leading.is_empty() {
        out.push(join_group(&leading, separator));
    }
    out
}
