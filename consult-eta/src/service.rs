use crate::correction::correct;
use crate::estimator::ModelStore;
use crate::features::build_features;
use crate::registry::RegistryHandle;
use crate::types::{EstimateError, PredictionDetails, PredictionRequest, PredictionResponse, Result};
use chrono::{Local, NaiveDateTime};
use std::sync::Arc;
use tracing::{debug, info};

const PREDICTION_TARGET: &str = "t_consult_minutes";

/// The estimation request path: published registry in, corrected consult
/// time out. Never touches the board source.
#[derive(Clone)]
pub struct EstimationService {
    registry: Arc<RegistryHandle>,
    models: Arc<ModelStore>,
}

impl EstimationService {
    pub fn new(registry: Arc<RegistryHandle>, models: Arc<ModelStore>) -> Self {
        Self { registry, models }
    }

    pub fn registry(&self) -> Arc<RegistryHandle> {
        self.registry.clone()
    }

    pub async fn predict(&self, request: &PredictionRequest) -> Result<PredictionResponse> {
        self.predict_at(request, Local::now().naive_local()).await
    }

    pub async fn predict_at(&self, request: &PredictionRequest, now: NaiveDateTime) -> Result<PredictionResponse> {
        let model = self.models.get_or_load(&request.department).await?;

        let published = self.registry.snapshot().await?;
        let key = request.clinic_key();
        let entry = published
            .registry
            .get(&key)
            .ok_or_else(|| EstimateError::ClinicNotFound { key: key.clone() })?;

        let features = build_features(request, entry, now)?;
        debug!(
            "Features for {} #{}: sequence {}, gap {}, arrival {}",
            key,
            request.patient_number,
            features.sequence_in_session,
            features.number_gap_at_report,
            features.arrival_time
        );

        let raw_prediction = model.predict(&features.bag)?;
        let estimate = correct(raw_prediction, features.arrival_time, now)?;

        if estimate.correction_applied {
            debug!(
                "Raw prediction {} precedes arrival {} for {}, corrected to {}",
                estimate.predicted, features.arrival_time, key, estimate.final_estimate
            );
        }

        info!(
            "Predicted {} for {} #{} (registry v{}, wait {} min)",
            estimate.final_estimate.format("%H:%M"),
            key,
            request.patient_number,
            published.version,
            estimate.wait_minutes
        );

        Ok(PredictionResponse {
            status: "success".to_string(),
            predicted_consult_time: estimate.final_estimate.format("%H:%M").to_string(),
            estimated_wait_minutes: estimate.wait_minutes,
            estimated_travel_minutes: features.travel_minutes,
            predicted_report_time: features.arrival_time.format("%H:%M").to_string(),
            details: PredictionDetails {
                prediction_target: PREDICTION_TARGET.to_string(),
                model_feature_count: model.feature_count(),
                input_sequence_in_session: features.sequence_in_session,
                raw_t_consult_minutes: estimate.raw_minutes,
                correction_applied: estimate.correction_applied,
            },
        })
    }
}
