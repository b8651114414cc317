use crate::ranking::SequenceRanking;
use crate::types::{EstimateError, PredictionRequest, RegistryEntry, Result};
use chrono::{Datelike, Duration, NaiveDateTime, Timelike};
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Categorical(String),
    Numeric(f64),
}

/// Named request features in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureBag {
    fields: Vec<(String, FeatureValue)>,
}

impl FeatureBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn categorical(&mut self, name: &str, value: impl Into<String>) {
        self.set(name, FeatureValue::Categorical(value.into()));
    }

    pub fn numeric(&mut self, name: &str, value: f64) {
        self.set(name, FeatureValue::Numeric(value));
    }

    fn set(&mut self, name: &str, value: FeatureValue) {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// One-hot expansion: a categorical `f = v` becomes column `f_v` set to 1,
    /// numeric fields keep their own name.
    pub fn expand(&self) -> Vec<(String, f64)> {
        self.fields
            .iter()
            .map(|(name, value)| match value {
                FeatureValue::Categorical(v) => (format!("{}_{}", name, v), 1.0),
                FeatureValue::Numeric(x) => (name.clone(), *x),
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct RequestFeatures {
    pub bag: FeatureBag,
    pub sequence_in_session: u32,
    pub travel_minutes: i64,
    pub arrival_time: NaiveDateTime,
    pub number_gap_at_report: u32,
}

pub fn build_features(
    request: &PredictionRequest,
    entry: &RegistryEntry,
    now: NaiveDateTime,
) -> Result<RequestFeatures> {
    if request.patient_number == 0 {
        return Err(EstimateError::InvalidRequest("patient_number must be positive".to_string()));
    }

    let ranking = SequenceRanking::new(&entry.all_numbers_in_session);
    let sequence_in_session = ranking
        .rank(request.patient_number)
        .ok_or_else(|| EstimateError::PatientNotInSession {
            number: request.patient_number,
            key: request.clinic_key(),
        })?;

    let travel_minutes = match request.estimated_travel_minutes {
        Some(t) if t >= 0 => t,
        _ => {
            warn!("No usable travel time for {}, assuming arrival now", request.clinic_key());
            0
        }
    };

    let arrival_time = Duration::try_minutes(travel_minutes)
        .and_then(|travel| now.checked_add_signed(travel))
        .ok_or_else(|| {
            EstimateError::InvalidRequest(format!("travel time of {} minutes is out of range", travel_minutes))
        })?;

    let hour_at_report = arrival_time.hour();
    let t_report_minutes = hour_at_report * 60 + arrival_time.minute();
    let weekday = arrival_time.weekday().num_days_from_monday();
    let number_gap_at_report = request.patient_number.saturating_sub(entry.current_number);

    let mut bag = FeatureBag::new();
    bag.categorical("department", request.department.as_str());
    bag.categorical("clinic_room", request.clinic_room.as_str());
    bag.categorical("doctor", request.doctor.as_str());
    bag.categorical("time_slot", request.time_slot.as_str());
    bag.categorical("weekday", weekday.to_string());
    bag.numeric("patient_number", f64::from(request.patient_number));
    bag.numeric("sequence_in_session", f64::from(sequence_in_session));
    bag.numeric("current_number_at_report", f64::from(entry.current_number));
    bag.numeric("waiting_at_report", f64::from(entry.waiting));
    bag.numeric("completed_at_report", f64::from(entry.completed));
    bag.numeric("number_gap_at_report", f64::from(number_gap_at_report));
    bag.numeric("hour_at_report", f64::from(hour_at_report));
    bag.numeric("t_report_minutes", f64::from(t_report_minutes));

    Ok(RequestFeatures {
        bag,
        sequence_in_session,
        travel_minutes,
        arrival_time,
        number_gap_at_report,
    })
}
