use crate::types::{EstimateError, Result};
use chrono::{Duration, NaiveDateTime};

/// Minimum lead of the consult time over the patient's own arrival.
pub const REPORT_BUFFER_MINUTES: i64 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct CorrectedEstimate {
    /// raw output after clamping, truncated to whole minutes of day
    pub raw_minutes: i64,
    pub predicted: NaiveDateTime,
    pub final_estimate: NaiveDateTime,
    pub wait_minutes: i64,
    pub correction_applied: bool,
}

/// Reads the estimator output as minutes after local midnight of `now`'s
/// date and pushes it to at least one minute after arrival.
pub fn correct(raw_prediction: f64, arrival_time: NaiveDateTime, now: NaiveDateTime) -> Result<CorrectedEstimate> {
    if !raw_prediction.is_finite() {
        return Err(EstimateError::Estimator(format!("estimator returned {}", raw_prediction)));
    }

    let raw_minutes = raw_prediction.max(0.0).trunc() as i64;
    let midnight = now.date().and_hms_opt(0, 0, 0).unwrap_or(now);

    let predicted = Duration::try_minutes(raw_minutes)
        .and_then(|offset| midnight.checked_add_signed(offset))
        .ok_or_else(|| EstimateError::Estimator(format!("estimator returned {} minutes, out of range", raw_minutes)))?;

    let report_with_buffer = arrival_time + Duration::minutes(REPORT_BUFFER_MINUTES);
    let correction_applied = predicted < report_with_buffer;
    let final_estimate = predicted.max(report_with_buffer);

    let wait_seconds = (final_estimate - now).num_seconds() as f64;
    let wait_minutes = ((wait_seconds / 60.0).round() as i64).max(0);

    Ok(CorrectedEstimate {
        raw_minutes,
        predicted,
        final_estimate,
        wait_minutes,
        correction_applied,
    })
}
