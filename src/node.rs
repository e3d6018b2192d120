//! The detector node: latest frame in, report and annotated image out.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::catalog::ClassCatalog;
use crate::config::{DisplayMode, NodeConfig};
use crate::detect::{BackendRegistry, Predictor, PredictorConfig};
use crate::frame::{Frame, FrameSlot};
use crate::report::{select_instances, DetectionReport, Selection};
use crate::visualize::{display_for, load_font, system_font, DisplaySurface, Visualizer};

/// Single-node perception adapter.
///
/// Owns the frame slot, a predictor built once at startup, the class catalog
/// of the model's training dataset and the display surface.
pub struct FrameDetector {
    config: NodeConfig,
    slot: Arc<FrameSlot>,
    predictor: Box<dyn Predictor>,
    catalog: ClassCatalog,
    visualizer: Visualizer,
    display: Box<dyn DisplaySurface>,
    selection: Selection,
    cycles: u64,
}

impl FrameDetector {
    pub fn new(
        config: NodeConfig,
        predictor: Box<dyn Predictor>,
        catalog: ClassCatalog,
        display: Box<dyn DisplaySurface>,
    ) -> Self {
        let slot = Arc::new(FrameSlot::new(config.blank_frame()));
        let selection = Selection::from(config.visualization);
        Self {
            config,
            slot,
            predictor,
            catalog,
            visualizer: Visualizer::new(),
            display,
            selection,
            cycles: 0,
        }
    }

    /// Build predictor, catalog and display from config.
    pub fn from_config(config: NodeConfig, registry: &BackendRegistry) -> Result<Self> {
        let predictor_cfg = PredictorConfig::from_node_config(&config);
        let mut predictor = registry
            .build(&config.model.backend, &predictor_cfg)
            .with_context(|| format!("failed to build predictor for {}", config.model.name))?;
        predictor.warm_up().context("predictor warm-up failed")?;

        let catalog = ClassCatalog::resolve(&config.model.name, config.model.dataset.as_deref())?;
        let display = display_for(&config.display);
        let visualizer = label_visualizer(&config)?;
        log::info!(
            "predictor '{}' ready: model={} weights={} threshold={} device={} classes={} ({})",
            predictor.name(),
            predictor_cfg.model,
            predictor_cfg.weights,
            predictor_cfg.score_threshold,
            predictor_cfg.device,
            catalog.len(),
            catalog.dataset
        );
        Ok(Self::new(config, predictor, catalog, display).with_visualizer(visualizer))
    }

    pub fn with_visualizer(mut self, visualizer: Visualizer) -> Self {
        self.visualizer = visualizer;
        self
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ClassCatalog {
        &self.catalog
    }

    /// Slot shared with the image subscriber.
    pub fn frame_slot(&self) -> Arc<FrameSlot> {
        Arc::clone(&self.slot)
    }

    /// Number of completed detect cycles.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Replace the current frame. Returns its sequence number.
    pub fn on_frame(&self, frame: Frame) -> Result<u64> {
        self.slot.publish(frame)
    }

    /// One inference, report and visualization cycle on the latest frame.
    pub fn detect(&mut self) -> Result<DetectionReport> {
        let snapshot = self.slot.snapshot()?;
        println!("Detecting..");

        let started = Instant::now();
        let instances = self.predictor.predict(&snapshot.frame)?;
        log::debug!(
            "frame #{}: inference took {} ms",
            snapshot.seq,
            started.elapsed().as_millis()
        );

        let report =
            DetectionReport::build(snapshot.seq, &instances, &self.catalog, self.selection);
        println!("{}", report.detected_line());
        print!("{}", report.objects_block());
        print!("{}", report.info_block());

        let drawn = select_instances(&instances, self.selection);
        let annotated = self
            .visualizer
            .render(&snapshot.frame, &drawn, &self.catalog)?;
        self.display.show(&annotated)?;

        self.cycles += 1;
        Ok(report)
    }

    /// Run `detect` until `shutdown` is set or `max_cycles` complete.
    ///
    /// The flag is checked between cycles only; a cycle blocked in the
    /// display step finishes first.
    pub fn run(&mut self, shutdown: &AtomicBool, max_cycles: Option<u64>) -> Result<u64> {
        let mut completed = 0u64;
        while !shutdown.load(Ordering::SeqCst) {
            if max_cycles.is_some_and(|max| completed >= max) {
                break;
            }
            self.detect()?;
            completed += 1;
        }
        Ok(completed)
    }
}

/// Visualizer with the configured label font, or a system font.
fn label_visualizer(config: &NodeConfig) -> Result<Visualizer> {
    let visualizer = Visualizer::new();
    if config.display.mode == DisplayMode::None {
        return Ok(visualizer);
    }
    match &config.display.font {
        Some(path) => Ok(visualizer.with_font(load_font(path)?)),
        None => match system_font() {
            Some(font) => Ok(visualizer.with_font(font)),
            None => {
                log::warn!("no label font found; set display.font to draw class names");
                Ok(visualizer)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::COCO_2017_TRAIN;
    use crate::detect::{BoundingBox, Instance, ScriptedPredictor};
    use crate::visualize::NullDisplay;

    fn small_config() -> NodeConfig {
        let mut cfg = NodeConfig::default();
        cfg.image.width = 64;
        cfg.image.height = 48;
        cfg
    }

    fn detector(cfg: NodeConfig, instances: Vec<Instance>) -> FrameDetector {
        FrameDetector::new(
            cfg,
            Box::new(ScriptedPredictor::new(instances)),
            ClassCatalog::for_dataset(COCO_2017_TRAIN).unwrap(),
            Box::new(NullDisplay),
        )
    }

    #[test]
    fn starts_with_blank_configured_frame() {
        let node = detector(small_config(), Vec::new());
        let snap = node.frame_slot().snapshot().unwrap();
        assert_eq!(snap.frame.shape(), (48, 64, 3));
        assert!(snap.frame.is_blank());
    }

    #[test]
    fn report_lists_are_replaced_each_cycle() {
        let instances = vec![
            Instance::new(0, BoundingBox::new(0.0, 0.0, 10.0, 10.0), 0.9),
            Instance::new(2, BoundingBox::new(20.0, 20.0, 30.0, 40.0), 0.8),
        ];
        let mut node = detector(small_config(), instances);
        let first = node.detect().unwrap();
        let second = node.detect().unwrap();
        assert_eq!(first.bbox_coordinates.len(), 2);
        assert_eq!(second.bbox_coordinates.len(), 2);
        assert_eq!(second.bbox_centers.len(), 2);
        assert_eq!(node.cycles(), 2);
    }

    #[test]
    fn configured_font_must_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = small_config();
        cfg.display.mode = DisplayMode::File;
        cfg.display.output_dir = dir.path().to_path_buf();
        cfg.display.font = Some(dir.path().join("missing.ttf"));
        assert!(FrameDetector::from_config(cfg.clone(), &BackendRegistry::builtin()).is_err());

        cfg.display.mode = DisplayMode::None;
        assert!(FrameDetector::from_config(cfg, &BackendRegistry::builtin()).is_ok());
    }

    #[test]
    fn custom_visualizer_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let instances = vec![Instance::new(
            0,
            BoundingBox::new(0.0, 20.0, 40.0, 40.0),
            0.9,
        )
        .with_mask(crate::detect::Mask::from_box(
            64,
            48,
            &BoundingBox::new(0.0, 20.0, 40.0, 40.0),
        ))];
        let mut node = FrameDetector::new(
            small_config(),
            Box::new(ScriptedPredictor::new(instances)),
            ClassCatalog::for_dataset(COCO_2017_TRAIN).unwrap(),
            Box::new(crate::visualize::FileDisplay::new(dir.path())),
        )
        .with_visualizer(Visualizer::new().with_mask_alpha(1.0));
        node.detect().unwrap();

        let image = image::open(dir.path().join("result_000000.png"))
            .unwrap()
            .to_rgb8();
        // Fully opaque mask: interior pixels take the class color.
        assert_eq!(
            image.get_pixel(20, 30).0,
            crate::visualize::class_color(0)
        );
    }

    #[test]
    fn run_stops_at_max_cycles() {
        let mut node = detector(small_config(), Vec::new());
        let shutdown = AtomicBool::new(false);
        assert_eq!(node.run(&shutdown, Some(3)).unwrap(), 3);
    }

    #[test]
    fn run_does_nothing_after_shutdown() {
        let mut node = detector(small_config(), Vec::new());
        let shutdown = AtomicBool::new(true);
        assert_eq!(node.run(&shutdown, None).unwrap(), 0);
        assert_eq!(node.cycles(), 0);
    }
}
