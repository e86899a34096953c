//! The detect-and-render tick loop.
//!
//! Each tick is independent: grab a frame, run one detection pass, tally,
//! present. The scheduler is single-slot: a tick that overruns its interval
//! causes the missed slots to be skipped, so two inference passes never run
//! against the camera at once.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use image::DynamicImage;
use log::{info, warn};

use emometer_vision::{Camera, Detection, Pipeline};

use crate::report::{self, EmotionCounts, TickStatus};

/// The detector seam: one stateless pass over a frame.
pub trait Detect {
    fn detect(&mut self, frame: &DynamicImage) -> Result<Vec<Detection>>;
}

impl Detect for Pipeline {
    fn detect(&mut self, frame: &DynamicImage) -> Result<Vec<Detection>> {
        self.detect_expressions(frame)
    }
}

/// The frame source seam.
pub trait FrameSource {
    fn grab(&mut self) -> Result<DynamicImage>;
}

impl FrameSource for Camera {
    fn grab(&mut self) -> Result<DynamicImage> {
        Ok(DynamicImage::ImageRgb8(self.frame()?))
    }
}

/// Explicit model lifecycle. Detection only ever runs through `ready_mut`,
/// closing the gap where a tick could run against unloaded models.
pub enum ModelState<D> {
    Uninitialized,
    Loading,
    Ready(D),
    Failed(String),
}

impl<D> ModelState<D> {
    /// Drive the lifecycle through one load attempt.
    pub fn load_with(loader: impl FnOnce() -> Result<D>) -> Self {
        info!("loading models");
        match loader() {
            Ok(models) => {
                info!("models loaded");
                Self::Ready(models)
            }
            Err(e) => {
                warn!("model loading failed: {e:#}");
                Self::Failed(format!("{e:#}"))
            }
        }
    }

    pub fn ready_mut(&mut self) -> Option<&mut D> {
        match self {
            Self::Ready(models) => Some(models),
            _ => None,
        }
    }

    pub fn describe(&self) -> &str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Loading => "loading",
            Self::Ready(_) => "ready",
            Self::Failed(reason) => reason,
        }
    }
}

/// Next tick deadline on the fixed interval grid, skipping any slots the
/// previous tick overran. Returns the deadline and the number of skipped
/// slots; the deadline is always strictly in the future.
pub fn next_deadline(prev: Instant, interval: Duration, now: Instant) -> (Instant, u64) {
    let next = prev + interval;
    if next > now {
        return (next, 0);
    }
    let behind = now.duration_since(next);
    let missed = behind.as_nanos() / interval.as_nanos().max(1) + 1;
    let missed = u64::try_from(missed).unwrap_or(u64::MAX);
    let skip = interval * u32::try_from(missed).unwrap_or(u32::MAX);
    (next + skip, missed)
}

pub struct Runner<S, D> {
    source: S,
    models: ModelState<D>,
    confidence_threshold: f32,
    interval: Duration,
}

impl<S: FrameSource, D: Detect> Runner<S, D> {
    pub fn new(
        source: S,
        models: ModelState<D>,
        confidence_threshold: f32,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            models,
            confidence_threshold,
            interval,
        }
    }

    /// One tick: frame, detect, tally. Per-tick failures are retryable and
    /// come back as a status instead of an error.
    pub fn tick(&mut self) -> Result<(EmotionCounts, TickStatus)> {
        let models = match &mut self.models {
            ModelState::Ready(models) => models,
            state => anyhow::bail!("models not ready: {}", state.describe()),
        };
        let frame = match self.source.grab() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("frame capture failed: {e:#}");
                return Ok((EmotionCounts::zeroed(), TickStatus::CaptureFailed));
            }
        };
        match models.detect(&frame) {
            Ok(detections) => Ok((
                report::tally(&detections, self.confidence_threshold),
                TickStatus::Ok,
            )),
            Err(e) => {
                warn!("detection failed: {e:#}");
                Ok((EmotionCounts::zeroed(), TickStatus::DetectionFailed))
            }
        }
    }

    /// Run the tick loop at the configured cadence, presenting each tick's
    /// counts. `max_ticks` of `None` runs until the process is stopped.
    pub fn run<F>(&mut self, mut present: F, max_ticks: Option<u64>) -> Result<()>
    where
        F: FnMut(&EmotionCounts, TickStatus),
    {
        if self.models.ready_mut().is_none() {
            anyhow::bail!("cannot start: models not ready: {}", self.models.describe());
        }

        let mut ticks = 0u64;
        let mut deadline = Instant::now();
        loop {
            let (counts, status) = self.tick().context("tick")?;
            present(&counts, status);

            ticks += 1;
            if let Some(max) = max_ticks {
                if ticks >= max {
                    return Ok(());
                }
            }

            let (next, missed) = next_deadline(deadline, self.interval, Instant::now());
            if missed > 0 {
                warn!("tick overran its slot, skipping {missed} interval(s)");
            }
            deadline = next;
            let now = Instant::now();
            if deadline > now {
                std::thread::sleep(deadline - now);
            }
        }
    }
}
