use std::path::Path;

use anyhow::{Context, Result};
use image::DynamicImage;
use ndarray::Array4;
use ort::{session::Session, value::Value};

use crate::detect::{self, FaceBox, CHIP_SIZE};
use crate::emotion::ExpressionScores;

/// One face for one frame: where it is, how confident the detector was,
/// and its per-label expression scores. Frame-scoped; never persisted.
#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: [f32; 4],
    pub score: f32,
    pub expressions: ExpressionScores,
}

/// Detector tuning. `input_size` is the square canvas side the frame is
/// letterboxed onto before detection.
#[derive(Debug, Clone, Copy)]
pub struct DetectorOptions {
    pub input_size: u32,
    pub score_threshold: f32,
    pub nms_threshold: f32,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            input_size: 160,
            score_threshold: 0.6,
            nms_threshold: 0.3,
        }
    }
}

/// Both model sessions: locate faces, then score expressions per face.
pub struct Pipeline {
    detector: Session,
    classifier: Session,
    options: DetectorOptions,
}

impl Pipeline {
    /// Load both models from the model directory. This is the only place
    /// model state is created; a returned error means no model is loaded.
    pub fn load(model_dir: &Path, options: DetectorOptions) -> Result<Self> {
        Ok(Self {
            detector: crate::model::detector_session(model_dir)?,
            classifier: crate::model::expression_session(model_dir)?,
            options,
        })
    }

    /// One detection pass over a frame: all faces, each with expression
    /// scores. Stateless across calls; a face that fails the expression
    /// stage is skipped with a warning rather than failing the pass.
    pub fn detect_expressions(&mut self, img: &DynamicImage) -> Result<Vec<Detection>> {
        let faces = detect::detect_faces(
            &mut self.detector,
            img,
            self.options.input_size,
            self.options.score_threshold,
            self.options.nms_threshold,
        )
        .context("detecting faces")?;

        let mut detections = Vec::with_capacity(faces.len());
        for face in faces {
            match score_expressions(&mut self.classifier, img, &face) {
                Ok(expressions) => detections.push(Detection {
                    bbox: face.bbox,
                    score: face.score,
                    expressions,
                }),
                Err(e) => {
                    log::warn!("expression scoring failed for face at {:?}: {e:#}", face.bbox)
                }
            }
        }
        Ok(detections)
    }
}

fn score_expressions(
    session: &mut Session,
    img: &DynamicImage,
    face: &FaceBox,
) -> Result<ExpressionScores> {
    let chip = detect::face_chip(img, &face.bbox)?;
    let input = Array4::from_shape_vec((1, 1, CHIP_SIZE as usize, CHIP_SIZE as usize), chip)?;
    let input_tensor = Value::from_array(input)?;

    let outputs = session
        .run(ort::inputs![input_tensor])
        .context("run expression model")?;
    let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;

    let count: usize = if shape.len() == 2 { shape[1] as usize } else { data.len() };
    if count < 7 {
        anyhow::bail!("expression model emitted {count} logits, expected 7");
    }
    let mut logits = [0.0f32; 7];
    logits.copy_from_slice(&data[..7]);
    Ok(ExpressionScores::from_logits(&logits))
}
