use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use emometer::{config, report, runner, DetectorOptions, Pipeline};
use emometer_vision::Camera;
use log::info;

#[derive(Parser)]
#[command(name = "emometer")]
#[command(version, about = "Tally dominant facial emotions from a webcam feed")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the detect-and-tally loop
    Run {
        /// Capture device (overrides the config file)
        #[arg(short, long)]
        camera: Option<String>,
        /// Emit one JSON object per tick instead of the text report
        #[arg(long)]
        json: bool,
    },
    /// Run a single tick and print the report
    Probe {
        /// Capture device (overrides the config file)
        #[arg(short, long)]
        camera: Option<String>,
    },
    /// Open config file in editor
    Config,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(None)?;

    match cli.command {
        Commands::Run { camera, json } => run(&cfg, camera.as_deref(), json, None),
        Commands::Probe { camera } => run(&cfg, camera.as_deref(), false, Some(1)),
        Commands::Config => open_config(),
    }
}

fn run(
    cfg: &config::Config,
    camera_override: Option<&str>,
    json: bool,
    max_ticks: Option<u64>,
) -> Result<()> {
    let device = camera_override.unwrap_or(&cfg.camera);

    let options = DetectorOptions {
        input_size: cfg.input_size,
        score_threshold: cfg.score_threshold,
        nms_threshold: cfg.nms_threshold,
    };
    let models = runner::ModelState::load_with(|| {
        Pipeline::load(&cfg.model_dir, options)
            .with_context(|| format!("loading models from {}", cfg.model_dir.display()))
    });

    info!("Opening camera: {}", device);
    let camera = Camera::open(device).context("Failed to open camera")?;

    let mut runner = runner::Runner::new(
        camera,
        models,
        cfg.confidence_threshold,
        Duration::from_millis(cfg.interval_ms),
    );

    info!("Starting tick loop ({}ms interval)", cfg.interval_ms);
    runner.run(
        |counts, status| {
            if json {
                println!("{}", report::render_json(counts, status));
            } else {
                print!("{}", report::render_text(counts, status));
            }
        },
        max_ticks,
    )
}

fn open_config() -> Result<()> {
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
    let path = config::CONFIG_PATH.as_os_str();

    info!("Editing {:?} with {}", path, editor);

    let status = std::process::Command::new(&editor)
        .arg(path)
        .status()
        .with_context(|| format!("spawning editor {editor}"))?;

    if !status.success() {
        anyhow::bail!("editor {editor} exited with failure");
    }

    Ok(())
}
