use crate::features::FeatureBag;
use crate::schema::ModelSchema;
use crate::types::{EstimateError, Estimator, Result};
use interfaces::LinearEstimator;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

/// An estimator together with the schema its input vector must follow.
pub struct LoadedModel {
    pub domain: String,
    pub schema: ModelSchema,
    estimator: Box<dyn Estimator>,
}

impl LoadedModel {
    pub fn new(domain: impl Into<String>, schema: ModelSchema, estimator: Box<dyn Estimator>) -> Self {
        Self {
            domain: domain.into(),
            schema,
            estimator,
        }
    }

    pub fn feature_count(&self) -> usize {
        self.schema.len()
    }

    pub fn predict(&self, bag: &FeatureBag) -> Result<f64> {
        let vector = self.schema.align(bag);
        self.estimator.predict(&vector).map_err(|e| {
            error!("Estimator {} failed for {}: {}", self.estimator.estimator_name(), self.domain, e);
            EstimateError::Estimator(e.to_string())
        })
    }
}

/// Per-domain cache of loaded models. A domain is loaded on first use and
/// kept for the life of the process.
pub struct ModelStore {
    model_dir: PathBuf,
    cache: RwLock<HashMap<String, Arc<LoadedModel>>>,
}

impl ModelStore {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    /// Registers an already built model, bypassing the artifact files.
    pub async fn insert(&self, model: LoadedModel) {
        let mut cache = self.cache.write().await;
        cache.insert(model.domain.clone(), Arc::new(model));
    }

    pub async fn get_or_load(&self, domain: &str) -> Result<Arc<LoadedModel>> {
        {
            let cache = self.cache.read().await;
            if let Some(model) = cache.get(domain) {
                return Ok(model.clone());
            }
        }

        let loaded = Arc::new(self.load(domain).await?);

        let mut cache = self.cache.write().await;
        let model = cache.entry(domain.to_string()).or_insert(loaded).clone();
        Ok(model)
    }

    pub async fn cached_domains(&self) -> Vec<String> {
        let cache = self.cache.read().await;
        let mut domains: Vec<String> = cache.keys().cloned().collect();
        domains.sort();
        domains
    }

    async fn load(&self, domain: &str) -> Result<LoadedModel> {
        if domain.is_empty() || domain.contains(['/', '\\']) || domain.contains("..") {
            return Err(EstimateError::InvalidRequest(format!("invalid model domain: {:?}", domain)));
        }

        let not_configured = |detail: String| EstimateError::ModelNotConfigured {
            domain: domain.to_string(),
            detail,
        };

        let columns_path = self.model_dir.join(format!("columns_{}.json", domain));
        let model_path = self.model_dir.join(format!("model_{}.json", domain));
        debug!("Loading model for {} from {}", domain, self.model_dir.display());

        let raw_columns = read_artifact(&columns_path).await.map_err(&not_configured)?;
        let schema = ModelSchema::from_json(&raw_columns)
            .map_err(|e| not_configured(format!("{}: {}", columns_path.display(), e)))?;

        let raw_model = read_artifact(&model_path).await.map_err(&not_configured)?;
        let estimator = LinearEstimator::from_json(&raw_model)
            .map_err(|e| not_configured(format!("{}: {}", model_path.display(), e)))?;

        if estimator.input_width() != schema.len() {
            return Err(not_configured(format!(
                "model expects {} inputs but schema lists {} columns",
                estimator.input_width(),
                schema.len()
            )));
        }

        info!("Loaded model for {} with {} feature columns", domain, schema.len());
        Ok(LoadedModel::new(domain, schema, Box::new(estimator)))
    }
}

async fn read_artifact(path: &Path) -> std::result::Result<String, String> {
    tokio::fs::read_to_string(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => format!("{} not found", path.display()),
        _ => format!("{}: {}", path.display(), e),
    })
}
