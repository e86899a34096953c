//! Per-tick tally of dominant emotions and its rendered forms.
//!
//! Counts are rebuilt from zero every tick; nothing carries across ticks.

use std::fmt::Write as _;

use emometer_vision::{Detection, EmotionLabel};

/// One non-negative count per emotion label. The key set is always exactly
/// the seven labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmotionCounts {
    counts: [u32; 7],
}

impl EmotionCounts {
    pub fn zeroed() -> Self {
        Self { counts: [0; 7] }
    }

    pub fn get(&self, label: EmotionLabel) -> u32 {
        self.counts[Self::slot(label)]
    }

    fn bump(&mut self, label: EmotionLabel) {
        self.counts[Self::slot(label)] += 1;
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().sum()
    }

    fn slot(label: EmotionLabel) -> usize {
        EmotionLabel::ALL
            .iter()
            .position(|&l| l == label)
            .unwrap_or(0)
    }
}

/// Reduce one tick's detections to counts. A face contributes its dominant
/// label only when that label's score strictly exceeds `threshold`; ties on
/// the maximum resolve by the fixed label priority order.
pub fn tally(detections: &[Detection], threshold: f32) -> EmotionCounts {
    let mut counts = EmotionCounts::zeroed();
    for detection in detections {
        let (label, score) = detection.expressions.dominant();
        if score > threshold {
            counts.bump(label);
        }
    }
    counts
}

/// How the last tick went, shown alongside the counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStatus {
    Ok,
    CaptureFailed,
    DetectionFailed,
}

impl TickStatus {
    fn text(self) -> &'static str {
        match self {
            TickStatus::Ok => "ok",
            TickStatus::CaptureFailed => "frame capture failed (retrying)",
            TickStatus::DetectionFailed => "detection failed (retrying)",
        }
    }
}

/// The fixed seven-line report, all labels listed including zeros, plus a
/// status line.
pub fn render_text(counts: &EmotionCounts, status: TickStatus) -> String {
    let mut out = String::new();
    for label in EmotionLabel::ALL {
        let _ = writeln!(out, "Number of {}: {}", label, counts.get(label));
    }
    let _ = writeln!(out, "status: {}", status.text());
    out
}

/// Machine-readable sibling of the text report, one object per tick.
pub fn render_json(counts: &EmotionCounts, status: TickStatus) -> serde_json::Value {
    let mut labels = serde_json::Map::new();
    for label in EmotionLabel::ALL {
        labels.insert(label.name().to_string(), counts.get(label).into());
    }
    serde_json::json!({
        "counts": labels,
        "status": status.text(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use emometer_vision::ExpressionScores;

    fn detection(scores: &[(EmotionLabel, f32)]) -> Detection {
        let mut expressions = ExpressionScores::zeroed();
        for &(label, score) in scores {
            expressions.set(label, score);
        }
        Detection {
            bbox: [0.0, 0.0, 10.0, 10.0],
            score: 0.9,
            expressions,
        }
    }

    #[test]
    fn test_empty_tick_is_all_zeros() {
        let counts = tally(&[], 0.7);
        for label in EmotionLabel::ALL {
            assert_eq!(counts.get(label), 0);
        }
        let text = render_text(&counts, TickStatus::Ok);
        for label in EmotionLabel::ALL {
            assert!(text.contains(&format!("Number of {label}: 0")));
        }
    }

    #[test]
    fn test_unique_max_above_threshold_counts_once() {
        let d = detection(&[(EmotionLabel::Happy, 0.85), (EmotionLabel::Sad, 0.1)]);
        let counts = tally(&[d], 0.7);
        assert_eq!(counts.get(EmotionLabel::Happy), 1);
        assert_eq!(counts.total(), 1);
    }

    #[test]
    fn test_exact_threshold_not_counted() {
        // strict `>`: a maximum of exactly 0.7 lands in no bucket
        let d = detection(&[(EmotionLabel::Angry, 0.7)]);
        let counts = tally(&[d], 0.7);
        assert_eq!(counts.total(), 0);
    }

    #[test]
    fn test_tie_resolves_by_priority_order() {
        let d = detection(&[(EmotionLabel::Neutral, 0.8), (EmotionLabel::Sad, 0.8)]);
        let counts = tally(&[d], 0.7);
        assert_eq!(counts.get(EmotionLabel::Sad), 1);
        assert_eq!(counts.get(EmotionLabel::Neutral), 0);
    }

    #[test]
    fn test_tally_is_idempotent() {
        let detections = vec![
            detection(&[(EmotionLabel::Happy, 0.9)]),
            detection(&[(EmotionLabel::Fearful, 0.75)]),
            detection(&[(EmotionLabel::Surprised, 0.5)]),
        ];
        let first = tally(&detections, 0.7);
        let second = tally(&detections, 0.7);
        assert_eq!(first, second);
        assert_eq!(first.get(EmotionLabel::Happy), 1);
        assert_eq!(first.get(EmotionLabel::Fearful), 1);
        assert_eq!(first.get(EmotionLabel::Surprised), 0);
    }

    #[test]
    fn test_render_text_fixed_order() {
        let counts = tally(&[detection(&[(EmotionLabel::Neutral, 0.95)])], 0.7);
        let text = render_text(&counts, TickStatus::Ok);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 8);
        assert_eq!(lines[0], "Number of happy: 0");
        assert_eq!(lines[1], "Number of sad: 0");
        assert_eq!(lines[2], "Number of angry: 0");
        assert_eq!(lines[3], "Number of disgusted: 0");
        assert_eq!(lines[4], "Number of surprised: 0");
        assert_eq!(lines[5], "Number of fearful: 0");
        assert_eq!(lines[6], "Number of neutral: 1");
        assert_eq!(lines[7], "status: ok");
    }

    #[test]
    fn test_render_json_has_all_labels() {
        let counts = tally(&[detection(&[(EmotionLabel::Happy, 0.9)])], 0.7);
        let value = render_json(&counts, TickStatus::Ok);
        let labels = value["counts"].as_object().unwrap();
        assert_eq!(labels.len(), 7);
        assert_eq!(labels["happy"], 1);
        assert_eq!(labels["sad"], 0);
        assert_eq!(value["status"], "ok");
    }

    #[test]
    fn test_failed_tick_status_rendered() {
        let text = render_text(&EmotionCounts::zeroed(), TickStatus::DetectionFailed);
        assert!(text.ends_with("status: detection failed (retrying)\n"));
    }

    #[test]
    fn test_capture_failure_named_as_such() {
        // camera faults must not be reported as detector faults
        let text = render_text(&EmotionCounts::zeroed(), TickStatus::CaptureFailed);
        assert!(text.ends_with("status: frame capture failed (retrying)\n"));
        let value = render_json(&EmotionCounts::zeroed(), TickStatus::CaptureFailed);
        assert_eq!(value["status"], "frame capture failed (retrying)");
    }
}
