use std::path::Path;

use anyhow::{Context, Result};
use ort::{
    ep::{self, ExecutionProvider},
    session::{
        builder::{GraphOptimizationLevel, SessionBuilder},
        Session,
    },
};

pub const DETECTOR_MODEL_FILE: &str = "face_detection_yunet.onnx";
pub const EXPRESSION_MODEL_FILE: &str = "face_expression.onnx";

pub fn session_builder() -> Result<SessionBuilder> {
    let mut builder = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    #[cfg(feature = "openvino")]
    {
        let ep = ep::OpenVINO::default();
        if ep.is_available()? {
            ep.register(&mut builder)?;
        } else {
            log::warn!("openvino feature is enabled, onnx runtime not compiled with openvino")
        }
    }

    #[cfg(feature = "cuda")]
    {
        let ep = ep::CUDA::default();
        if ep.is_available()? {
            ep.register(&mut builder);
        } else {
            log::warn!("cuda feature is enabled, onnx runtime not compiled with cuda")
        }
    }

    Ok(builder)
}

/// Load the face localization model from the model directory.
pub fn detector_session(model_dir: &Path) -> Result<Session> {
    let path = model_dir.join(DETECTOR_MODEL_FILE);
    session_builder()?
        .commit_from_file(&path)
        .with_context(|| format!("load face detector model from {}", path.display()))
}

/// Load the expression classification model from the model directory.
pub fn expression_session(model_dir: &Path) -> Result<Session> {
    let path = model_dir.join(EXPRESSION_MODEL_FILE);
    session_builder()?
        .commit_from_file(&path)
        .with_context(|| format!("load expression model from {}", path.display()))
}
