use anyhow::Result;

use crate::defs::Estimator;

/// Predicts the same minute of day for every input.
pub struct ConstantEstimator {
    pub minutes_of_day: f64,
}

impl ConstantEstimator {
    pub fn new(minutes_of_day: f64) -> Self {
        Self { minutes_of_day }
    }
}

impl Estimator for ConstantEstimator {
    fn estimator_name(&self) -> &str {
        "constant"
    }

    fn predict(&self, _features: &[f64]) -> Result<f64> {
        // Nothing matters, every patient is called at the same time.
        Ok(self.minutes_of_day)
    }
}
