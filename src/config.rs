use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub static CONFIG_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("EMOMETER_CONFIG_PATH").unwrap_or("/usr/local/etc/emometer/config.toml"))
});

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// V4L2 capture device.
    pub camera: String,
    /// Directory holding the detector and expression model files.
    pub model_dir: PathBuf,
    /// Square canvas side for the face detector input.
    pub input_size: u32,
    /// Minimum detector score for a face to count at all.
    pub score_threshold: f32,
    /// IoU threshold for suppressing duplicate boxes.
    pub nms_threshold: f32,
    /// A face's dominant expression is tallied only if its score strictly
    /// exceeds this.
    pub confidence_threshold: f32,
    /// Nominal tick cadence in milliseconds.
    pub interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera: "/dev/video0".to_string(),
            model_dir: PathBuf::from("/usr/local/share/emometer/models"),
            input_size: 160,
            score_threshold: 0.6,
            nms_threshold: 0.3,
            confidence_threshold: 0.7,
            interval_ms: 1000,
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}
