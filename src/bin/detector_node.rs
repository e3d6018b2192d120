//! detector_node - camera topic in, instance segmentation report out.
//!
//! 1. Loads node parameters (config file + env overrides)
//! 2. Builds the predictor and class catalog once
//! 3. Subscribes to the camera topic (or a synthetic `stub://` camera)
//! 4. Runs detect cycles on the latest frame until Ctrl-C

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use frame_detector::transport::spawn_image_source;
use frame_detector::ui::Stages;
use frame_detector::{BackendRegistry, DisplayMode, FrameDetector, NodeConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Instance segmentation on a camera topic")]
struct Args {
    /// JSON config file (overrides DETECTOR_CONFIG).
    #[arg(long, env = "DETECTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Display mode: prompt, file or none.
    #[arg(long)]
    display: Option<String>,

    /// Predictor backend (stub, or tract with the backend-tract feature).
    #[arg(long)]
    backend: Option<String>,

    /// Stop after this many detect cycles (0 = until Ctrl-C).
    #[arg(long, default_value_t = 0)]
    max_frames: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = NodeConfig::load_from(args.config.as_deref())?;
    if let Some(mode) = args.display.as_deref() {
        cfg.display.mode = mode.parse::<DisplayMode>()?;
    }
    if let Some(backend) = args.backend {
        cfg.model.backend = backend;
    }

    log::info!("Vision node started!");
    log::info!("  camera topic: {}", cfg.camera_topic);
    log::info!(
        "  image: {}x{}x{}",
        cfg.image.width,
        cfg.image.height,
        cfg.image.depth
    );
    log::info!("  model: {} (backend {})", cfg.model.name, cfg.model.backend);
    log::info!(
        "  visualization: {}",
        if cfg.visualization.all_classes {
            "all classes".to_string()
        } else {
            format!("class {}", cfg.visualization.target)
        }
    );
    log::info!("  display: {}", cfg.display.mode);

    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_flag = shutdown.clone();
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })
    .context("error setting Ctrl-C handler")?;

    let stages = Stages::detect();
    let registry = BackendRegistry::builtin();
    let mut node = {
        let _stage = stages.stage("load predictor");
        FrameDetector::from_config(cfg.clone(), &registry)?
    };

    let source = {
        let _stage = stages.stage("start image source");
        spawn_image_source(&cfg, node.frame_slot(), shutdown.clone())?
    };

    let max_cycles = (args.max_frames > 0).then_some(args.max_frames);
    let result = node.run(&shutdown, max_cycles);

    shutdown.store(true, Ordering::SeqCst);
    if source.is_finished() {
        let _ = source.join();
    }
    let cycles = result?;
    log::info!("{} detect cycles completed", cycles);
    log::info!("Vision node ended!");
    Ok(())
}
