use chrono::{NaiveDate, NaiveDateTime};
use consult_eta::{
    build_registry, ClinicSnapshot, EstimateError, PatientRecord, PatientStatus, QueueRegistry, RegistryBuilder,
    RegistryHandle, RegistryStore, TimeSlot,
};
use std::collections::BTreeMap;
use std::sync::Arc;

fn at(hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 3, 10)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

fn snapshot(doctor: &str, current: u32, numbers: &[u32]) -> ClinicSnapshot {
    ClinicSnapshot {
        department: "中醫內科".to_string(),
        clinic_room: "3診".to_string(),
        doctor: doctor.to_string(),
        location: None,
        current_number: current,
        waiting_count: 5,
        completed_count: current.saturating_sub(1),
        captured_at: at(9, 0),
        time_slot: TimeSlot::Morning,
        weekday: 0,
        session_ended: false,
        patients: numbers
            .iter()
            .map(|&number| PatientRecord { number, status: PatientStatus::CheckedIn })
            .collect(),
    }
}

/// A registry whose every entry carries `generation` in all counters, so a
/// reader can tell whether it ever saw two generations at once.
fn generation(generation: u32, clinics: usize) -> QueueRegistry {
    let mut map = BTreeMap::new();
    for i in 0..clinics {
        map.insert(
            format!("clinic_{}", i),
            consult_eta::RegistryEntry {
                current_number: generation,
                waiting: generation,
                completed: generation,
                all_numbers_in_session: vec![generation],
            },
        );
    }
    QueueRegistry {
        update_timestamp: format!("gen-{}", generation),
        clinics: map,
    }
}

#[test]
fn test_entry_numbers_are_sorted_and_distinct() {
    let registry = build_registry(&[snapshot("王大明", 40, &[45, 38, 40, 39, 42, 41, 38])], at(9, 1));

    let entry = registry.get("中醫內科_3診_王大明_morning").expect("entry present");
    assert_eq!(entry.all_numbers_in_session, vec![38, 39, 40, 41, 42, 45]);
    assert_eq!(entry.current_number, 40);
    assert_eq!(entry.waiting, 5);
    assert_eq!(entry.completed, 39);
    assert_eq!(registry.update_timestamp, "2025-03-10 09:01:00");
}

#[test]
fn test_key_collision_is_last_write_wins() {
    let mut builder = RegistryBuilder::new();
    builder.add_snapshot(&snapshot("王大明", 10, &[1, 2, 3]));
    builder.add_snapshot(&snapshot("王大明", 20, &[18, 19]));
    assert_eq!(builder.overwritten(), 1);

    let registry = builder.build(at(9, 0));
    assert_eq!(registry.len(), 1);
    let entry = registry.get("中醫內科_3診_王大明_morning").unwrap();
    assert_eq!(entry.current_number, 20);
    // not merged with the earlier roster
    assert_eq!(entry.all_numbers_in_session, vec![18, 19]);
}

#[test]
fn test_malformed_roster_numbers_are_ignored() {
    let registry = build_registry(&[snapshot("王大明", 0, &[0, 4, 0, 2])], at(9, 0));
    let entry = registry.get("中醫內科_3診_王大明_morning").unwrap();
    assert_eq!(entry.all_numbers_in_session, vec![2, 4]);
}

#[tokio::test]
async fn test_unpublished_registry_is_unavailable() {
    let handle = RegistryHandle::new();
    assert!(handle.version().await.is_none());
    match handle.snapshot().await {
        Err(EstimateError::StateUnavailable(_)) => {}
        other => panic!("expected StateUnavailable, got {:?}", other),
    }
}

#[tokio::test]
async fn test_publish_replaces_whole_registry() {
    let handle = RegistryHandle::new();
    assert_eq!(handle.publish(generation(1, 3)).await, 1);

    let held = handle.snapshot().await.unwrap();
    assert_eq!(handle.publish(generation(2, 1)).await, 2);

    // the reader's copy is untouched by the later publish
    assert_eq!(held.version, 1);
    assert_eq!(held.registry.len(), 3);

    let fresh = handle.snapshot().await.unwrap();
    assert_eq!(fresh.version, 2);
    assert_eq!(fresh.registry.len(), 1);
    assert!(fresh.registry.get("clinic_2").is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_see_a_mixed_registry() {
    let handle = Arc::new(RegistryHandle::new());
    handle.publish(generation(0, 50)).await;

    let writer = {
        let handle = handle.clone();
        tokio::spawn(async move {
            for g in 1..=200u32 {
                handle.publish(generation(g, 50)).await;
                tokio::task::yield_now().await;
            }
        })
    };

    let mut readers = Vec::new();
    for _ in 0..4 {
        let handle = handle.clone();
        readers.push(tokio::spawn(async move {
            let mut last_version = 0;
            for _ in 0..500 {
                let published = handle.snapshot().await.unwrap();
                assert!(published.version >= last_version);
                last_version = published.version;

                let registry = &published.registry;
                assert_eq!(registry.len(), 50);
                let expected = registry.get("clinic_0").unwrap().current_number;
                assert_eq!(registry.update_timestamp, format!("gen-{}", expected));
                for entry in registry.clinics.values() {
                    assert_eq!(entry.current_number, expected);
                    assert_eq!(entry.all_numbers_in_session, vec![expected]);
                }
                tokio::task::yield_now().await;
            }
        }));
    }

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }
    assert_eq!(handle.version().await, Some(201));
}

#[tokio::test]
async fn test_store_writes_compatible_json() {
    let dir = tempfile::tempdir().unwrap();
    let store = RegistryStore::new(dir.path().join("clinic_status.json"));

    assert!(store.load().await.unwrap().is_none());

    let registry = build_registry(&[snapshot("王大明", 40, &[38, 39, 40, 41, 42, 45])], at(9, 0));
    store.save(&registry).await.unwrap();

    let raw = std::fs::read_to_string(store.path()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["update_timestamp"], "2025-03-10 09:00:00");
    let entry = &json["clinics"]["中醫內科_3診_王大明_morning"];
    assert_eq!(entry["current_number"], 40);
    assert_eq!(entry["waiting"], 5);
    assert_eq!(entry["completed"], 39);
    assert_eq!(entry["all_numbers_in_session"], serde_json::json!([38, 39, 40, 41, 42, 45]));
    // non-ASCII keys are written as-is
    assert!(raw.contains("中醫內科_3診"));

    // no temp file left behind
    let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(leftovers.len(), 1);

    assert_eq!(store.load().await.unwrap(), Some(registry));
}

#[tokio::test]
async fn test_store_rejects_corrupt_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clinic_status.json");
    std::fs::write(&path, "{\"update_timestamp\": ").unwrap();

    let store = RegistryStore::new(path);
    assert!(matches!(store.load().await, Err(EstimateError::Serialization(_))));
}
