mod backend;
mod backends;
mod registry;
mod result;

pub use backend::{Device, Predictor, PredictorConfig};
pub use backends::{ScriptedPredictor, StubPredictor};
#[cfg(feature = "backend-tract")]
pub use backends::TractPredictor;
pub use registry::{BackendRegistry, PredictorFactory};
pub use result::{BoundingBox, Instance, Mask};
