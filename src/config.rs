use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::detect::Device;

const DEFAULT_IMAGE_HEIGHT: u32 = 720;
const DEFAULT_IMAGE_WIDTH: u32 = 1280;
const DEFAULT_IMAGE_DEPTH: u8 = 3;
const DEFAULT_CAMERA_TOPIC: &str = "/camera/color/image_raw";
const DEFAULT_MODEL_NAME: &str = "COCO-InstanceSegmentation/mask_rcnn_R_50_FPN_3x.yaml";
const DEFAULT_BACKEND: &str = "stub";
const DEFAULT_SCORE_THRESHOLD: f32 = 0.7;
const DEFAULT_ALL_CLASSES: bool = true;
/// COCO "person".
const DEFAULT_TARGET_CLASS: usize = 0;
const DEFAULT_BROKER: &str = "127.0.0.1:1883";
const DEFAULT_CLIENT_ID: &str = "detector_node";
const DEFAULT_OUTPUT_DIR: &str = "detections";

#[derive(Debug, Deserialize, Default)]
struct NodeConfigFile {
    image: Option<ImageConfigFile>,
    camera_topic: Option<CameraTopicConfigFile>,
    model: Option<ModelConfigFile>,
    visualization: Option<VisualizationConfigFile>,
    transport: Option<TransportConfigFile>,
    display: Option<DisplayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ImageConfigFile {
    height: Option<u32>,
    width: Option<u32>,
    depth: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraTopicConfigFile {
    topic: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    name: Option<String>,
    weights: Option<String>,
    path: Option<PathBuf>,
    backend: Option<String>,
    dataset: Option<String>,
    score_threshold: Option<f32>,
    device: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct VisualizationConfigFile {
    all_classes: Option<bool>,
    target: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct TransportConfigFile {
    broker: Option<String>,
    client_id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    mode: Option<String>,
    output_dir: Option<PathBuf>,
    font: Option<PathBuf>,
}

/// Node configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub image: ImageSettings,
    pub camera_topic: String,
    pub model: ModelSettings,
    pub visualization: VisualizationSettings,
    pub transport: TransportSettings,
    pub display: DisplaySettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSettings {
    pub height: u32,
    pub width: u32,
    pub depth: u8,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    /// Model identifier (config name in the model zoo).
    pub name: String,
    /// Weights identifier. Defaults to `name` once overrides are applied.
    pub weights: String,
    /// Local ONNX file for the tract backend.
    pub path: Option<PathBuf>,
    pub backend: String,
    /// Overrides the dataset derived from `name`.
    pub dataset: Option<String>,
    pub score_threshold: f32,
    pub device: Device,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisualizationSettings {
    pub all_classes: bool,
    pub target: usize,
}

#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub broker: String,
    pub client_id: String,
}

#[derive(Debug, Clone)]
pub struct DisplaySettings {
    pub mode: DisplayMode,
    pub output_dir: PathBuf,
    /// Font for box labels; a system font is used when unset.
    pub font: Option<PathBuf>,
}

/// How annotated frames are presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    /// Save the image and wait for Enter on stdin.
    Prompt,
    /// Save one image per cycle, never block.
    File,
    /// Render nothing.
    None,
}

impl FromStr for DisplayMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prompt" => Ok(DisplayMode::Prompt),
            "file" => Ok(DisplayMode::File),
            "none" | "off" => Ok(DisplayMode::None),
            other => Err(anyhow!(
                "unknown display mode '{}'; expected prompt, file or none",
                other
            )),
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DisplayMode::Prompt => "prompt",
            DisplayMode::File => "file",
            DisplayMode::None => "none",
        };
        f.write_str(name)
    }
}

impl NodeConfig {
    /// Load from `DETECTOR_CONFIG` (if set), apply env overrides, validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("DETECTOR_CONFIG").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Same as `load`, with an explicit config file taking the place of `DETECTOR_CONFIG`.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.default_weights_to_name();
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: NodeConfigFile) -> Result<Self> {
        let image = ImageSettings {
            height: file
                .image
                .as_ref()
                .and_then(|image| image.height)
                .unwrap_or(DEFAULT_IMAGE_HEIGHT),
            width: file
                .image
                .as_ref()
                .and_then(|image| image.width)
                .unwrap_or(DEFAULT_IMAGE_WIDTH),
            depth: file
                .image
                .as_ref()
                .and_then(|image| image.depth)
                .unwrap_or(DEFAULT_IMAGE_DEPTH),
        };
        let camera_topic = file
            .camera_topic
            .and_then(|topic| topic.topic)
            .unwrap_or_else(|| DEFAULT_CAMERA_TOPIC.to_string());

        let model_file = file.model.unwrap_or_default();
        let name = model_file
            .name
            .unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string());
        // Filled in from the final name after env overrides.
        let weights = model_file.weights.unwrap_or_default();
        let device = match model_file.device.as_deref() {
            Some(device) => device.parse()?,
            None => Device::Cpu,
        };
        let model = ModelSettings {
            name,
            weights,
            path: model_file.path,
            backend: model_file
                .backend
                .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
            dataset: model_file.dataset,
            score_threshold: model_file
                .score_threshold
                .unwrap_or(DEFAULT_SCORE_THRESHOLD),
            device,
        };

        let visualization = VisualizationSettings {
            all_classes: file
                .visualization
                .as_ref()
                .and_then(|vis| vis.all_classes)
                .unwrap_or(DEFAULT_ALL_CLASSES),
            target: file
                .visualization
                .as_ref()
                .and_then(|vis| vis.target)
                .unwrap_or(DEFAULT_TARGET_CLASS),
        };
        let transport = TransportSettings {
            broker: file
                .transport
                .as_ref()
                .and_then(|t| t.broker.clone())
                .unwrap_or_else(|| DEFAULT_BROKER.to_string()),
            client_id: file
                .transport
                .and_then(|t| t.client_id)
                .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
        };
        let display_file = file.display.unwrap_or_default();
        let display = DisplaySettings {
            mode: match display_file.mode.as_deref() {
                Some(mode) => mode.parse()?,
                None => DisplayMode::Prompt,
            },
            output_dir: display_file
                .output_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            font: display_file.font,
        };

        Ok(Self {
            image,
            camera_topic,
            model,
            visualization,
            transport,
            display,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(height) = env_parse::<u32>("DETECTOR_IMAGE_HEIGHT")? {
            self.image.height = height;
        }
        if let Some(width) = env_parse::<u32>("DETECTOR_IMAGE_WIDTH")? {
            self.image.width = width;
        }
        if let Some(depth) = env_parse::<u8>("DETECTOR_IMAGE_DEPTH")? {
            self.image.depth = depth;
        }
        if let Some(topic) = env_string("DETECTOR_CAMERA_TOPIC") {
            self.camera_topic = topic;
        }
        if let Some(name) = env_string("DETECTOR_MODEL_NAME") {
            self.model.name = name;
        }
        if let Some(weights) = env_string("DETECTOR_MODEL_WEIGHTS") {
            self.model.weights = weights;
        }
        if let Some(path) = env_string("DETECTOR_MODEL_PATH") {
            self.model.path = Some(PathBuf::from(path));
        }
        if let Some(backend) = env_string("DETECTOR_BACKEND") {
            self.model.backend = backend;
        }
        if let Some(threshold) = env_parse::<f32>("DETECTOR_SCORE_THRESHOLD")? {
            self.model.score_threshold = threshold;
        }
        if let Some(all_classes) = env_parse::<bool>("DETECTOR_ALL_CLASSES")? {
            self.visualization.all_classes = all_classes;
        }
        if let Some(target) = env_parse::<usize>("DETECTOR_TARGET_CLASS")? {
            self.visualization.target = target;
        }
        if let Some(broker) = env_string("DETECTOR_MQTT_BROKER") {
            self.transport.broker = broker;
        }
        if let Some(mode) = env_string("DETECTOR_DISPLAY") {
            self.display.mode = mode.parse()?;
        }
        if let Some(font) = env_string("DETECTOR_FONT") {
            self.display.font = Some(PathBuf::from(font));
        }
        Ok(())
    }

    fn default_weights_to_name(&mut self) {
        if self.model.weights.trim().is_empty() {
            self.model.weights = self.model.name.clone();
        }
    }

    fn validate(&self) -> Result<()> {
        if self.image.height == 0 || self.image.width == 0 {
            return Err(anyhow!(
                "image dimensions must be non-zero (got {}x{})",
                self.image.width,
                self.image.height
            ));
        }
        if self.image.depth != crate::frame::FRAME_CHANNELS {
            return Err(anyhow!(
                "image depth must be {} (BGR8), got {}",
                crate::frame::FRAME_CHANNELS,
                self.image.depth
            ));
        }
        if self.camera_topic.trim().is_empty() {
            return Err(anyhow!("camera topic must not be empty"));
        }
        if self.model.name.trim().is_empty() {
            return Err(anyhow!("model name must not be empty"));
        }
        if self.model.weights.trim().is_empty() {
            return Err(anyhow!("model weights must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.model.score_threshold) {
            return Err(anyhow!(
                "score threshold must be within 0.0..=1.0, got {}",
                self.model.score_threshold
            ));
        }
        if self.model.backend == "tract" && self.model.path.is_none() {
            return Err(anyhow!("the tract backend requires model.path"));
        }
        Ok(())
    }

    /// The blank frame the node starts with.
    pub fn blank_frame(&self) -> crate::frame::Frame {
        crate::frame::Frame::zeroed(self.image.width, self.image.height, self.image.depth)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            image: ImageSettings {
                height: DEFAULT_IMAGE_HEIGHT,
                width: DEFAULT_IMAGE_WIDTH,
                depth: DEFAULT_IMAGE_DEPTH,
            },
            camera_topic: DEFAULT_CAMERA_TOPIC.to_string(),
            model: ModelSettings {
                name: DEFAULT_MODEL_NAME.to_string(),
                weights: DEFAULT_MODEL_NAME.to_string(),
                path: None,
                backend: DEFAULT_BACKEND.to_string(),
                dataset: None,
                score_threshold: DEFAULT_SCORE_THRESHOLD,
                device: Device::Cpu,
            },
            visualization: VisualizationSettings {
                all_classes: DEFAULT_ALL_CLASSES,
                target: DEFAULT_TARGET_CLASS,
            },
            transport: TransportSettings {
                broker: DEFAULT_BROKER.to_string(),
                client_id: DEFAULT_CLIENT_ID.to_string(),
            },
            display: DisplaySettings {
                mode: DisplayMode::Prompt,
                output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
                font: None,
            },
        }
    }
}

fn read_config_file(path: &Path) -> Result<NodeConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>> {
    match env_string(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} has an invalid value: {}", key, raw)),
        None => Ok(None),
    }
}
