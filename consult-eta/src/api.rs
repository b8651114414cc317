//! HTTP surface of the estimation path.
//!
//! `POST /predict_consult_time` runs one prediction against the published
//! registry; `GET /health` and `GET /clinics` expose what is published.

use std::future::Future;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;

use crate::service::EstimationService;
use crate::types::{EstimateError, PredictionRequest, PredictionResponse};

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// Maps each failure kind to a status the caller can act on.
#[derive(Debug)]
pub struct ApiError(pub EstimateError);

impl From<EstimateError> for ApiError {
    fn from(e: EstimateError) -> Self {
        ApiError(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(EstimateError::InvalidRequest(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            EstimateError::ModelNotConfigured { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "MODEL_NOT_CONFIGURED"),
            EstimateError::StateUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "STATE_UNAVAILABLE"),
            EstimateError::ClinicNotFound { .. } => (StatusCode::NOT_FOUND, "CLINIC_NOT_FOUND"),
            EstimateError::PatientNotInSession { .. } => (StatusCode::BAD_REQUEST, "PATIENT_NOT_IN_SESSION"),
            EstimateError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            EstimateError::Estimator(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ESTIMATOR_FAILED"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        };

        if status.is_server_error() {
            tracing::error!(code, error = %self.0, "Prediction request failed");
        } else {
            tracing::debug!(code, error = %self.0, "Prediction request rejected");
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code,
                message: self.0.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub registry_version: Option<u64>,
    pub clinics: usize,
    pub update_timestamp: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClinicsResponse {
    pub registry_version: u64,
    pub update_timestamp: String,
    pub clinics: Vec<String>,
}

pub fn router(service: EstimationService) -> Router {
    Router::new()
        .route("/predict_consult_time", post(predict_consult_time))
        .route("/health", get(health))
        .route("/clinics", get(clinics))
        .with_state(service)
}

async fn predict_consult_time(
    State(service): State<EstimationService>,
    request: Result<Json<PredictionRequest>, JsonRejection>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let Json(request) = request?;
    let response = service.predict(&request).await?;
    Ok(Json(response))
}

async fn health(State(service): State<EstimationService>) -> Json<HealthResponse> {
    let published = service.registry().snapshot().await.ok();
    Json(HealthResponse {
        status: if published.is_some() { "ok" } else { "waiting_for_registry" },
        registry_version: published.as_ref().map(|p| p.version),
        clinics: published.as_ref().map(|p| p.registry.len()).unwrap_or(0),
        update_timestamp: published.map(|p| p.registry.update_timestamp.clone()),
    })
}

async fn clinics(State(service): State<EstimationService>) -> Result<Json<ClinicsResponse>, ApiError> {
    let published = service.registry().snapshot().await?;
    Ok(Json(ClinicsResponse {
        registry_version: published.version,
        update_timestamp: published.registry.update_timestamp.clone(),
        clinics: published.registry.clinics.keys().cloned().collect(),
    }))
}

pub async fn serve<F>(listener: TcpListener, service: EstimationService, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tracing::info!("Prediction API listening on {}", listener.local_addr()?);
    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown)
        .await
}
