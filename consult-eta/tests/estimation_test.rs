use chrono::{NaiveDate, NaiveDateTime};
use consult_eta::{
    build_features, correct, EstimateError, EstimationService, FeatureBag, FeatureValue, LoadedModel, ModelSchema,
    ModelStore, PredictionRequest, QueueRegistry, RegistryEntry, RegistryHandle, SequenceRanking, TimeSlot,
};
use interfaces::{ConstantEstimator, Estimator};
use std::collections::BTreeMap;
use std::sync::{Arc, Once};
use tracing::info;

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .try_init()
            .ok();
    });
}

const KEY: &str = "中醫內科_3診_王大明_morning";

fn at(hour: u32, minute: u32) -> NaiveDateTime {
    // a Monday
    NaiveDate::from_ymd_opt(2025, 3, 10)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

fn entry() -> RegistryEntry {
    RegistryEntry {
        current_number: 40,
        waiting: 5,
        completed: 39,
        all_numbers_in_session: vec![38, 39, 40, 41, 42, 45],
    }
}

fn registry() -> QueueRegistry {
    let mut clinics = BTreeMap::new();
    clinics.insert(KEY.to_string(), entry());
    QueueRegistry {
        update_timestamp: "2025-03-10 09:00:00".to_string(),
        clinics,
    }
}

fn request(patient_number: u32, travel: Option<i64>) -> PredictionRequest {
    PredictionRequest {
        department: "中醫內科".to_string(),
        clinic_room: "3診".to_string(),
        doctor: "王大明".to_string(),
        time_slot: TimeSlot::Morning,
        patient_number,
        estimated_travel_minutes: travel,
    }
}

fn schema() -> ModelSchema {
    ModelSchema::new(
        [
            "patient_number",
            "sequence_in_session",
            "current_number_at_report",
            "waiting_at_report",
            "completed_at_report",
            "number_gap_at_report",
            "hour_at_report",
            "t_report_minutes",
            "department_中醫內科",
            "clinic_room_3診",
            "doctor_王大明",
            "doctor_李小華",
            "time_slot_morning",
            "time_slot_afternoon",
            "weekday_0",
            "weekday_1",
        ]
        .iter()
        .map(|c| c.to_string())
        .collect(),
    )
    .unwrap()
}

async fn service_with(estimator: Box<dyn Estimator>) -> EstimationService {
    let handle = Arc::new(RegistryHandle::new());
    handle.publish(registry()).await;

    let models = Arc::new(ModelStore::new("/nonexistent"));
    models.insert(LoadedModel::new("中醫內科", schema(), estimator)).await;

    EstimationService::new(handle, models)
}

#[test]
fn test_rank_is_dense_position() {
    let ranking = SequenceRanking::new(&[45, 38, 40, 39, 42, 41, 40]);
    assert_eq!(ranking.len(), 6);
    for (i, n) in [38, 39, 40, 41, 42, 45].iter().enumerate() {
        assert_eq!(ranking.rank(*n), Some(i as u32 + 1));
    }
    assert_eq!(ranking.rank(43), None);
    assert_eq!(ranking.rank(1), None);
    // stable across calls
    assert_eq!(ranking.rank(45), ranking.rank(45));
    assert!(SequenceRanking::new(&[]).rank(1).is_none());
}

#[test]
fn test_end_to_end_example_features() {
    let features = build_features(&request(45, Some(20)), &entry(), at(9, 0)).unwrap();

    assert_eq!(features.sequence_in_session, 6);
    assert_eq!(features.number_gap_at_report, 5);
    assert_eq!(features.travel_minutes, 20);
    assert_eq!(features.arrival_time, at(9, 20));

    let bag = &features.bag;
    assert_eq!(bag.get("t_report_minutes"), Some(&FeatureValue::Numeric(560.0)));
    assert_eq!(bag.get("hour_at_report"), Some(&FeatureValue::Numeric(9.0)));
    assert_eq!(bag.get("weekday"), Some(&FeatureValue::Categorical("0".to_string())));
    assert_eq!(bag.get("clinic_room"), Some(&FeatureValue::Categorical("3診".to_string())));
    assert_eq!(bag.len(), 13);
}

#[test]
fn test_gap_is_never_negative() {
    for patient in [38, 39, 40] {
        let features = build_features(&request(patient, None), &entry(), at(9, 0)).unwrap();
        assert_eq!(features.number_gap_at_report, 0);
    }
}

#[test]
fn test_missing_or_negative_travel_means_arrival_now() {
    for travel in [None, Some(-15)] {
        let features = build_features(&request(41, travel), &entry(), at(10, 30)).unwrap();
        assert_eq!(features.travel_minutes, 0);
        assert_eq!(features.arrival_time, at(10, 30));
    }
}

#[test]
fn test_arrival_past_midnight_moves_weekday() {
    let features = build_features(&request(41, Some(90)), &entry(), at(23, 0)).unwrap();
    assert_eq!(features.bag.get("weekday"), Some(&FeatureValue::Categorical("1".to_string())));
    assert_eq!(features.bag.get("t_report_minutes"), Some(&FeatureValue::Numeric(30.0)));
}

#[test]
fn test_unknown_patient_is_a_lookup_miss() {
    match build_features(&request(43, Some(5)), &entry(), at(9, 0)) {
        Err(EstimateError::PatientNotInSession { number, key }) => {
            assert_eq!(number, 43);
            assert_eq!(key, KEY);
        }
        other => panic!("expected PatientNotInSession, got {:?}", other.map(|f| f.sequence_in_session)),
    }
    assert!(matches!(
        build_features(&request(0, None), &entry(), at(9, 0)),
        Err(EstimateError::InvalidRequest(_))
    ));
}

#[test]
fn test_alignment_is_by_name_and_zero_filled() {
    let features = build_features(&request(45, Some(20)), &entry(), at(9, 0)).unwrap();
    let schema = schema();

    let first = schema.align(&features.bag);
    let second = schema.align(&features.bag);
    assert_eq!(first, second);
    assert_eq!(first.len(), schema.len());

    let expected = vec![
        45.0, 6.0, 40.0, 5.0, 39.0, 5.0, 9.0, 560.0, // numeric
        1.0, 1.0, 1.0, 0.0, // department, room, doctors
        1.0, 0.0, // time slots
        1.0, 0.0, // weekdays
    ];
    assert_eq!(first, expected);
}

#[test]
fn test_alignment_drops_unknown_columns() {
    let mut bag = FeatureBag::new();
    bag.categorical("doctor", "陳醫生");
    bag.numeric("unseen_feature", 42.0);
    bag.numeric("waiting_at_report", 7.0);

    let schema = ModelSchema::new(vec!["waiting_at_report".to_string(), "doctor_王大明".to_string()]).unwrap();
    assert_eq!(schema.align(&bag), vec![7.0, 0.0]);
    assert!(schema.align(&FeatureBag::new()).iter().all(|v| *v == 0.0));
}

#[test]
fn test_schema_file_formats() {
    let wrapped = ModelSchema::from_json(r#"{"columns": ["a", "b"]}"#).unwrap();
    let bare = ModelSchema::from_json(r#"["a", "b"]"#).unwrap();
    assert_eq!(wrapped.columns(), bare.columns());
    assert_eq!(bare.position("b"), Some(1));

    assert!(ModelSchema::from_json(r#"["a", "a"]"#).is_err());
    assert!(ModelSchema::from_json(r#"{"cols": []}"#).is_err());
}

#[test]
fn test_correction_never_precedes_arrival() {
    let now = at(9, 0);
    let arrival = at(9, 20);

    // early, negative, midnight and far-future raw outputs
    for raw in [-300.0, 0.0, 300.0, 545.0, 560.0, 561.0, 600.5, 1439.0, 5000.0] {
        let estimate = correct(raw, arrival, now).unwrap();
        assert!(estimate.final_estimate >= at(9, 21), "raw {} gave {}", raw, estimate.final_estimate);
        assert!(estimate.wait_minutes >= 0);
    }

    let early = correct(545.0, arrival, now).unwrap();
    assert_eq!(early.predicted, at(9, 5));
    assert_eq!(early.final_estimate, at(9, 21));
    assert_eq!(early.wait_minutes, 21);
    assert!(early.correction_applied);

    let late = correct(600.9, arrival, now).unwrap();
    assert_eq!(late.raw_minutes, 600);
    assert_eq!(late.final_estimate, at(10, 0));
    assert_eq!(late.wait_minutes, 60);
    assert!(!late.correction_applied);

    let clamped = correct(-42.0, at(9, 0), now).unwrap();
    assert_eq!(clamped.raw_minutes, 0);
    assert_eq!(clamped.final_estimate, at(9, 1));
}

#[test]
fn test_non_finite_prediction_is_an_estimator_failure() {
    for raw in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
        assert!(matches!(correct(raw, at(9, 0), at(9, 0)), Err(EstimateError::Estimator(_))));
    }
}

#[tokio::test]
async fn test_service_end_to_end_example() {
    init_tracing();

    // 09:05 as minutes of day
    let service = service_with(Box::new(ConstantEstimator::new(545.0))).await;
    let response = service.predict_at(&request(45, Some(20)), at(9, 0)).await.unwrap();
    info!("Response: {:?}", response);

    assert_eq!(response.status, "success");
    assert_eq!(response.predicted_consult_time, "09:21");
    assert_eq!(response.estimated_wait_minutes, 21);
    assert_eq!(response.estimated_travel_minutes, 20);
    assert_eq!(response.predicted_report_time, "09:20");
    assert_eq!(response.details.input_sequence_in_session, 6);
    assert_eq!(response.details.raw_t_consult_minutes, 545);
    assert_eq!(response.details.model_feature_count, 16);
    assert!(response.details.correction_applied);
}

#[tokio::test]
async fn test_service_lookup_errors() {
    init_tracing();
    let service = service_with(Box::new(ConstantEstimator::new(600.0))).await;

    let mut wrong_slot = request(45, None);
    wrong_slot.time_slot = TimeSlot::Afternoon;
    assert!(matches!(
        service.predict_at(&wrong_slot, at(14, 0)).await,
        Err(EstimateError::ClinicNotFound { .. })
    ));

    assert!(matches!(
        service.predict_at(&request(44, None), at(9, 0)).await,
        Err(EstimateError::PatientNotInSession { number: 44, .. })
    ));

    let mut unknown_department = request(45, None);
    unknown_department.department = "中醫針灸科".to_string();
    assert!(matches!(
        service.predict_at(&unknown_department, at(9, 0)).await,
        Err(EstimateError::ModelNotConfigured { .. })
    ));
}

#[tokio::test]
async fn test_service_without_published_registry() {
    let models = Arc::new(ModelStore::new("/nonexistent"));
    models
        .insert(LoadedModel::new("中醫內科", schema(), Box::new(ConstantEstimator::new(600.0))))
        .await;
    let service = EstimationService::new(Arc::new(RegistryHandle::new()), models);

    assert!(matches!(
        service.predict_at(&request(45, None), at(9, 0)).await,
        Err(EstimateError::StateUnavailable(_))
    ));
}

struct FailingEstimator;

impl Estimator for FailingEstimator {
    fn estimator_name(&self) -> &str {
        "failing"
    }

    fn predict(&self, _features: &[f64]) -> anyhow::Result<f64> {
        anyhow::bail!("model file is corrupt")
    }
}

#[tokio::test]
async fn test_estimator_failure_is_a_hard_error() {
    init_tracing();
    let service = service_with(Box::new(FailingEstimator)).await;
    match service.predict_at(&request(45, Some(10)), at(9, 0)).await {
        Err(EstimateError::Estimator(message)) => assert!(message.contains("corrupt")),
        other => panic!("expected Estimator error, got {:?}", other.map(|r| r.predicted_consult_time)),
    }
}

#[tokio::test]
async fn test_model_store_loads_artifacts_once() {
    init_tracing();

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("columns_中醫內科.json"),
        r#"{"columns": ["patient_number", "t_report_minutes", "department_中醫內科", "weekday_0", "weekday_6"]}"#,
    )
    .unwrap();
    // consult ten minutes after reporting
    std::fs::write(
        dir.path().join("model_中醫內科.json"),
        r#"{"intercept": 10.0, "coefficients": [0.0, 1.0, 0.0, 0.0, 0.0]}"#,
    )
    .unwrap();

    let models = Arc::new(ModelStore::new(dir.path()));
    let handle = Arc::new(RegistryHandle::new());
    handle.publish(registry()).await;
    let service = EstimationService::new(handle, models.clone());

    let response = service.predict_at(&request(45, Some(20)), at(9, 0)).await.unwrap();
    assert_eq!(response.predicted_consult_time, "09:30");
    assert_eq!(response.estimated_wait_minutes, 30);
    assert_eq!(response.details.model_feature_count, 5);
    assert!(!response.details.correction_applied);

    // cached: deleting the artifacts does not matter any more
    std::fs::remove_file(dir.path().join("model_中醫內科.json")).unwrap();
    assert!(models.get_or_load("中醫內科").await.is_ok());
    assert_eq!(models.cached_domains().await, vec!["中醫內科".to_string()]);
}

#[tokio::test]
async fn test_model_store_reports_missing_or_mismatched_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let models = ModelStore::new(dir.path());

    assert!(matches!(
        models.get_or_load("中醫內科").await,
        Err(EstimateError::ModelNotConfigured { .. })
    ));

    std::fs::write(dir.path().join("columns_婦科.json"), r#"["a", "b", "c"]"#).unwrap();
    std::fs::write(dir.path().join("model_婦科.json"), r#"{"intercept": 1.0, "coefficients": [1.0]}"#).unwrap();
    match models.get_or_load("婦科").await {
        Err(EstimateError::ModelNotConfigured { domain, detail }) => {
            assert_eq!(domain, "婦科");
            assert!(detail.contains("schema lists 3"));
        }
        Err(e) => panic!("unexpected error {}", e),
        Ok(_) => panic!("mismatched model must not load"),
    }

    assert!(matches!(
        models.get_or_load("../etc").await,
        Err(EstimateError::InvalidRequest(_))
    ));
}
