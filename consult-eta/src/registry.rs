use crate::types::{
    ClinicSnapshot, EstimateError, QueueRegistry, RegistryEntry, Result, TIMESTAMP_FORMAT,
};
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Collects the snapshots of one refresh cycle into a fresh registry.
/// Nothing is carried over from earlier cycles.
pub struct RegistryBuilder {
    clinics: BTreeMap<String, RegistryEntry>,
    overwritten: usize,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self {
            clinics: BTreeMap::new(),
            overwritten: 0,
        }
    }

    /// Last write wins when two snapshots share a clinic key.
    pub fn add_snapshot(&mut self, snapshot: &ClinicSnapshot) {
        let key = snapshot.clinic_key();

        let all_numbers_in_session: Vec<u32> = snapshot
            .patients
            .iter()
            .map(|p| p.number)
            .filter(|n| *n > 0)
            .collect::<BTreeSet<u32>>()
            .into_iter()
            .collect();

        let entry = RegistryEntry {
            current_number: snapshot.current_number,
            waiting: snapshot.waiting_count,
            completed: snapshot.completed_count,
            all_numbers_in_session,
        };

        if self.clinics.insert(key.clone(), entry).is_some() {
            self.overwritten += 1;
            debug!("Clinic key {} seen twice in one cycle, keeping the later snapshot", key);
        }
    }

    pub fn overwritten(&self) -> usize {
        self.overwritten
    }

    pub fn build(self, updated_at: NaiveDateTime) -> QueueRegistry {
        QueueRegistry {
            update_timestamp: updated_at.format(TIMESTAMP_FORMAT).to_string(),
            clinics: self.clinics,
        }
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn build_registry(snapshots: &[ClinicSnapshot], updated_at: NaiveDateTime) -> QueueRegistry {
    let mut builder = RegistryBuilder::new();
    for snapshot in snapshots {
        builder.add_snapshot(snapshot);
    }
    builder.build(updated_at)
}

#[derive(Debug, Clone)]
pub struct PublishedRegistry {
    pub version: u64,
    pub registry: Arc<QueueRegistry>,
}

/// The one shared view of live queue state. Publishing swaps the whole
/// registry; readers hold on to the `Arc` they got and never see a mix.
pub struct RegistryHandle {
    current: RwLock<Option<PublishedRegistry>>,
}

impl RegistryHandle {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
        }
    }

    pub async fn publish(&self, registry: QueueRegistry) -> u64 {
        let registry = Arc::new(registry);
        let mut current = self.current.write().await;
        let version = current.as_ref().map(|p| p.version + 1).unwrap_or(1);
        info!(
            "Publishing queue registry v{} ({} clinics, updated {})",
            version,
            registry.len(),
            registry.update_timestamp
        );
        *current = Some(PublishedRegistry { version, registry });
        version
    }

    pub async fn snapshot(&self) -> Result<PublishedRegistry> {
        self.current
            .read()
            .await
            .clone()
            .ok_or_else(|| EstimateError::StateUnavailable("no queue registry has been published yet".to_string()))
    }

    pub async fn version(&self) -> Option<u64> {
        self.current.read().await.as_ref().map(|p| p.version)
    }
}

impl Default for RegistryHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// The registry as a JSON file on disk, for processes that do not share
/// memory with the refresh task.
pub struct RegistryStore {
    path: PathBuf,
}

impl RegistryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes beside the target and renames over it, so a reader opens
    /// either the previous file or the complete new one.
    pub async fn save(&self, registry: &QueueRegistry) -> Result<()> {
        let body = serde_json::to_string_pretty(registry)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, body.as_bytes()).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!("Saved queue registry to {}", self.path.display());
        Ok(())
    }

    pub async fn load(&self) -> Result<Option<QueueRegistry>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
