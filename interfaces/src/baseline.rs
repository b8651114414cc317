use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::defs::Estimator;

/// Linear regression exported from the training notebook as plain JSON:
/// `{"intercept": 540.0, "coefficients": [...]}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinearEstimator {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
}

impl LinearEstimator {
    pub fn from_json(raw: &str) -> Result<Self> {
        let model: LinearEstimator = serde_json::from_str(raw)?;
        if !model.intercept.is_finite() || model.coefficients.iter().any(|c| !c.is_finite()) {
            bail!("model artifact contains non-finite weights");
        }
        Ok(model)
    }

    pub fn input_width(&self) -> usize {
        self.coefficients.len()
    }
}

impl Estimator for LinearEstimator {
    fn estimator_name(&self) -> &str {
        "linear"
    }

    fn predict(&self, features: &[f64]) -> Result<f64> {
        if features.len() != self.coefficients.len() {
            bail!(
                "feature vector has {} columns, model expects {}",
                features.len(),
                self.coefficients.len()
            );
        }
        let dot: f64 = features.iter().zip(&self.coefficients).map(|(x, w)| x * w).sum();
        Ok(self.intercept + dot)
    }
}
