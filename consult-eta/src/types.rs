use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
// Use the interfaces crate for the collaborator contracts
pub use interfaces::defs::{BoardBlock, BoardSourceSpec, Estimator};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeSlot {
    Morning,
    Afternoon,
    Evening,
}

impl TimeSlot {
    pub fn from_hour(hour: u32) -> Self {
        if hour < 12 {
            TimeSlot::Morning
        } else if hour < 18 {
            TimeSlot::Afternoon
        } else {
            TimeSlot::Evening
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeSlot::Morning => "morning",
            TimeSlot::Afternoon => "afternoon",
            TimeSlot::Evening => "evening",
        }
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeSlot {
    type Err = EstimateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "morning" => Ok(TimeSlot::Morning),
            "afternoon" => Ok(TimeSlot::Afternoon),
            "evening" => Ok(TimeSlot::Evening),
            other => Err(EstimateError::InvalidRequest(format!("unknown time slot: {other}"))),
        }
    }
}

/// Per-patient status labels as printed on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatientStatus {
    CalledOverdue,
    CheckedIn,
    InConsultation,
    NotCheckedIn,
    Priority,
    ReExamination,
}

impl PatientStatus {
    pub const ALL: [PatientStatus; 6] = [
        PatientStatus::CalledOverdue,
        PatientStatus::CheckedIn,
        PatientStatus::InConsultation,
        PatientStatus::NotCheckedIn,
        PatientStatus::Priority,
        PatientStatus::ReExamination,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            PatientStatus::CalledOverdue => "過號",
            PatientStatus::CheckedIn => "已報到",
            PatientStatus::InConsultation => "看診中",
            PatientStatus::NotCheckedIn => "未報到",
            PatientStatus::Priority => "優先號",
            PatientStatus::ReExamination => "檢後再診",
        }
    }

    /// Exact label match; the board never decorates status cells.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.label() == label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub number: u32,
    pub status: PatientStatus,
}

/// One clinic's queue state at one capture time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicSnapshot {
    pub department: String,
    pub clinic_room: String,
    pub doctor: String,
    pub location: Option<String>,
    pub current_number: u32,
    pub waiting_count: u32,
    pub completed_count: u32,
    pub captured_at: NaiveDateTime,
    pub time_slot: TimeSlot,
    pub weekday: u32,
    pub session_ended: bool,
    pub patients: Vec<PatientRecord>,
}

impl ClinicSnapshot {
    pub fn clinic_key(&self) -> String {
        clinic_key(&self.department, &self.clinic_room, &self.doctor, self.time_slot)
    }

    pub fn overdue_numbers(&self) -> Vec<u32> {
        let mut numbers: Vec<u32> = self
            .patients
            .iter()
            .filter(|p| p.status == PatientStatus::CalledOverdue)
            .map(|p| p.number)
            .collect();
        numbers.sort_unstable();
        numbers
    }

    /// Patients between the current call number and `target` who may still
    /// cut in: not yet checked in, or called while absent.
    pub fn unaccounted_gap(&self, target: u32) -> usize {
        if self.current_number == 0 || target <= self.current_number {
            return 0;
        }
        self.patients
            .iter()
            .filter(|p| p.number > self.current_number && p.number < target)
            .filter(|p| matches!(p.status, PatientStatus::NotCheckedIn | PatientStatus::CalledOverdue))
            .count()
    }
}

pub fn clinic_key(department: &str, clinic_room: &str, doctor: &str, time_slot: TimeSlot) -> String {
    format!("{}_{}_{}_{}", department, clinic_room, doctor, time_slot)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub current_number: u32,
    pub waiting: u32,
    pub completed: u32,
    pub all_numbers_in_session: Vec<u32>,
}

/// Every tracked clinic as of one refresh cycle. Serializes to the
/// `clinic_status.json` layout shared with the estimation path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueRegistry {
    pub update_timestamp: String,
    pub clinics: BTreeMap<String, RegistryEntry>,
}

impl QueueRegistry {
    pub fn get(&self, key: &str) -> Option<&RegistryEntry> {
        self.clinics.get(key)
    }

    pub fn len(&self) -> usize {
        self.clinics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clinics.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub department: String,
    pub clinic_room: String,
    pub doctor: String,
    pub time_slot: TimeSlot,
    pub patient_number: u32,
    #[serde(default)]
    pub estimated_travel_minutes: Option<i64>,
}

impl PredictionRequest {
    pub fn clinic_key(&self) -> String {
        clinic_key(&self.department, &self.clinic_room, &self.doctor, self.time_slot)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionDetails {
    pub prediction_target: String,
    pub model_feature_count: usize,
    pub input_sequence_in_session: u32,
    pub raw_t_consult_minutes: i64,
    pub correction_applied: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub status: String,
    pub predicted_consult_time: String,
    pub estimated_wait_minutes: i64,
    pub estimated_travel_minutes: i64,
    pub predicted_report_time: String,
    pub details: PredictionDetails,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub max_board_size_mb: usize,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "Consult-ETA/1.0".to_string(),
            timeout_seconds: 30,
            max_retries: 3,
            retry_delay_seconds: 2,
            max_board_size_mb: 5,
            max_redirects: 5,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EstimateError {
    #[error("model for {domain} is not trained or configured: {detail}")]
    ModelNotConfigured { domain: String, detail: String },

    #[error("live queue state unavailable: {0}")]
    StateUnavailable(String),

    #[error("no live queue state for clinic {key}")]
    ClinicNotFound { key: String },

    #[error("number {number} is not on the roster of {key}")]
    PatientNotInSession { number: u32, key: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("estimator failed: {0}")]
    Estimator(String),

    #[error("board fetch failed: {0}")]
    Fetch(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, EstimateError>;
