//! Camera-topic instance segmentation node.
//!
//! Subscribes to a camera image topic, runs an instance-segmentation
//! predictor on the most recent frame, prints per-class counts and the
//! boxes/centers of the selected instances, and presents an annotated image.
//!
//! # Module Structure
//!
//! - `config`: node parameters (JSON file + env overrides, validated once)
//! - `frame`: BGR8 frames and the single-slot exchange between threads
//! - `detect`: predictor trait, backends, backend registry
//! - `catalog`: class names per training dataset
//! - `report`: class counting and box/center selection
//! - `visualize`: annotated rendering and display surfaces
//! - `transport`: image message codec, MQTT subscriber, synthetic camera
//! - `node`: `FrameDetector`, the per-frame cycle and host loop

pub mod catalog;
pub mod config;
pub mod detect;
pub mod frame;
pub mod node;
pub mod report;
pub mod transport;
pub mod ui;
pub mod visualize;

pub use catalog::ClassCatalog;
pub use config::{DisplayMode, NodeConfig};
pub use detect::{
    BackendRegistry, BoundingBox, Device, Instance, Mask, Predictor, PredictorConfig,
    ScriptedPredictor, StubPredictor,
};
pub use frame::{Frame, FrameSlot, FrameSnapshot};
pub use node::FrameDetector;
pub use report::{count_classes, filter_and_collect, ClassCount, DetectionReport, Selection};
pub use transport::{ImageMessage, ImageSubscriber, SyntheticSource};
pub use visualize::{DisplaySurface, FileDisplay, NullDisplay, PromptDisplay, Visualizer};
