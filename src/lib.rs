pub mod config;
pub mod report;
pub mod runner;

// Re-export vision types for convenience
pub use emometer_vision::{Detection, DetectorOptions, EmotionLabel, ExpressionScores, Pipeline};
