pub mod detect;
pub mod emotion;
pub mod model;
pub mod pipeline;
pub mod video;
pub mod yunet;

// Re-export commonly used types
pub use emotion::{EmotionLabel, ExpressionScores};
pub use pipeline::{Detection, DetectorOptions, Pipeline};
pub use video::Camera;
