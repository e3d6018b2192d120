use anyhow::{anyhow, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::config::NodeConfig;
use crate::detect::result::Instance;
use crate::frame::Frame;

/// Execution device for inference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda(u32),
}

impl FromStr for Device {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" | "gpu" => Ok(Device::Cuda(0)),
            other => match other.strip_prefix("cuda:") {
                Some(index) => index
                    .parse()
                    .map(Device::Cuda)
                    .map_err(|_| anyhow!("invalid cuda device index '{}'", index)),
                None => Err(anyhow!("unknown device '{}'; expected cpu or cuda[:N]", other)),
            },
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda(index) => write!(f, "cuda:{}", index),
        }
    }
}

/// Everything a backend needs to build its predictor.
#[derive(Clone, Debug)]
pub struct PredictorConfig {
    pub model: String,
    pub weights: String,
    pub model_path: Option<PathBuf>,
    /// Instances scoring below this are dropped by the predictor.
    pub score_threshold: f32,
    pub device: Device,
    pub input_width: u32,
    pub input_height: u32,
}

impl PredictorConfig {
    pub fn from_node_config(cfg: &NodeConfig) -> Self {
        Self {
            model: cfg.model.name.clone(),
            weights: cfg.model.weights.clone(),
            model_path: cfg.model.path.clone(),
            score_threshold: cfg.model.score_threshold,
            device: cfg.model.device,
            input_width: cfg.image.width,
            input_height: cfg.image.height,
        }
    }

    /// Bundled backends run on the CPU only.
    pub fn require_cpu(&self, backend: &str) -> Result<()> {
        match self.device {
            Device::Cpu => Ok(()),
            other => Err(anyhow!(
                "backend '{}' does not support device {}",
                backend,
                other
            )),
        }
    }
}

/// Instance-segmentation predictor.
///
/// Implementations are built once at startup and reused for every frame.
/// The frame is borrowed for the duration of the call only.
pub trait Predictor: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run inference on one frame, returning instances at or above the
    /// configured score threshold, in descending score order.
    fn predict(&mut self, frame: &Frame) -> Result<Vec<Instance>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_parses_cpu_and_cuda() {
        assert_eq!("CPU".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("cuda".parse::<Device>().unwrap(), Device::Cuda(0));
        assert_eq!("cuda:2".parse::<Device>().unwrap(), Device::Cuda(2));
        assert!("tpu".parse::<Device>().is_err());
        assert!("cuda:x".parse::<Device>().is_err());
    }

    #[test]
    fn require_cpu_rejects_cuda() {
        let mut cfg = PredictorConfig::from_node_config(&NodeConfig::default());
        assert!(cfg.require_cpu("stub").is_ok());
        cfg.device = Device::Cuda(0);
        let err = cfg.require_cpu("stub").unwrap_err();
        assert!(err.to_string().contains("cuda:0"));
    }
}
