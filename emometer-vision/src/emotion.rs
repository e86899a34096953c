//! Emotion label set and per-face expression scores.
//!
//! The classifier head emits seven logits in its native order
//! (neutral, happy, sad, angry, fearful, disgusted, surprised).
//! Everything downstream works in display/priority order instead:
//! happy, sad, angry, disgusted, surprised, fearful, neutral.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmotionLabel {
    Happy,
    Sad,
    Angry,
    Disgusted,
    Surprised,
    Fearful,
    Neutral,
}

impl EmotionLabel {
    /// All labels in display order. This is also the tie-break priority
    /// order: when two labels share the maximal score, the one earlier in
    /// this list wins.
    pub const ALL: [EmotionLabel; 7] = [
        EmotionLabel::Happy,
        EmotionLabel::Sad,
        EmotionLabel::Angry,
        EmotionLabel::Disgusted,
        EmotionLabel::Surprised,
        EmotionLabel::Fearful,
        EmotionLabel::Neutral,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EmotionLabel::Happy => "happy",
            EmotionLabel::Sad => "sad",
            EmotionLabel::Angry => "angry",
            EmotionLabel::Disgusted => "disgusted",
            EmotionLabel::Surprised => "surprised",
            EmotionLabel::Fearful => "fearful",
            EmotionLabel::Neutral => "neutral",
        }
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Output index order of the expression net head.
const MODEL_HEAD_ORDER: [EmotionLabel; 7] = [
    EmotionLabel::Neutral,
    EmotionLabel::Happy,
    EmotionLabel::Sad,
    EmotionLabel::Angry,
    EmotionLabel::Fearful,
    EmotionLabel::Disgusted,
    EmotionLabel::Surprised,
];

/// One confidence value in [0, 1] per emotion label, for one detected face.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionScores {
    scores: [f32; 7],
}

impl ExpressionScores {
    /// Build scores from the classifier's raw logits (model head order),
    /// applying softmax.
    pub fn from_logits(logits: &[f32; 7]) -> Self {
        let probs = softmax(logits);
        let mut out = Self::zeroed();
        for (i, label) in MODEL_HEAD_ORDER.iter().enumerate() {
            out.set(*label, probs[i]);
        }
        out
    }

    pub fn zeroed() -> Self {
        Self { scores: [0.0; 7] }
    }

    pub fn set(&mut self, label: EmotionLabel, score: f32) {
        self.scores[Self::slot(label)] = score;
    }

    pub fn get(&self, label: EmotionLabel) -> f32 {
        self.scores[Self::slot(label)]
    }

    /// The label with the maximal score, and that score. Iterates the fixed
    /// priority order and replaces only on strictly greater score, so ties
    /// resolve to the earlier label deterministically.
    pub fn dominant(&self) -> (EmotionLabel, f32) {
        let mut best = EmotionLabel::ALL[0];
        let mut best_score = self.get(best);
        for &label in &EmotionLabel::ALL[1..] {
            let score = self.get(label);
            if score > best_score {
                best = label;
                best_score = score;
            }
        }
        (best, best_score)
    }

    fn slot(label: EmotionLabel) -> usize {
        match label {
            EmotionLabel::Happy => 0,
            EmotionLabel::Sad => 1,
            EmotionLabel::Angry => 2,
            EmotionLabel::Disgusted => 3,
            EmotionLabel::Surprised => 4,
            EmotionLabel::Fearful => 5,
            EmotionLabel::Neutral => 6,
        }
    }
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32; 7]) -> [f32; 7] {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let mut exps = [0.0f32; 7];
    let mut sum = 0.0f32;
    for (i, &x) in logits.iter().enumerate() {
        let e = (x - max).exp();
        exps[i] = e;
        sum += e;
    }
    for e in &mut exps {
        *e /= sum;
    }
    exps
}
