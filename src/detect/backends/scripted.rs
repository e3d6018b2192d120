use anyhow::Result;

use crate::detect::backend::Predictor;
use crate::detect::result::Instance;
use crate::frame::Frame;

/// Returns the same instance list for every frame.
///
/// Useful for exercising the report and visualization path without a model.
pub struct ScriptedPredictor {
    instances: Vec<Instance>,
}

impl ScriptedPredictor {
    pub fn new(instances: Vec<Instance>) -> Self {
        Self { instances }
    }
}

impl Predictor for ScriptedPredictor {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn predict(&mut self, _frame: &Frame) -> Result<Vec<Instance>> {
        Ok(self.instances.clone())
    }
}
