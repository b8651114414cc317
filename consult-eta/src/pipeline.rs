use crate::parser::SnapshotParser;
use crate::registry::{RegistryBuilder, RegistryHandle, RegistryStore};
use crate::traits::BoardSource;
use crate::types::{BoardSourceSpec, ClinicSnapshot};
use chrono::{Local, NaiveDateTime};
use std::future::Future;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Published { version: u64, clinics: usize },
    Skipped { reason: String },
}

#[derive(Debug, Clone)]
pub struct RefreshReport {
    pub cycle_id: Uuid,
    pub started_at: NaiveDateTime,
    pub blocks_pulled: usize,
    pub blocks_tracked: usize,
    pub parse_anomalies: usize,
    pub keys_overwritten: usize,
    pub outcome: CycleOutcome,
}

impl RefreshReport {
    fn new(started_at: NaiveDateTime) -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            started_at,
            blocks_pulled: 0,
            blocks_tracked: 0,
            parse_anomalies: 0,
            keys_overwritten: 0,
            outcome: CycleOutcome::Skipped { reason: "not run".to_string() },
        }
    }

    fn skip(mut self, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        warn!("Refresh cycle {} skipped: {}", self.cycle_id, reason);
        self.outcome = CycleOutcome::Skipped { reason };
        self
    }

    pub fn is_published(&self) -> bool {
        matches!(self.outcome, CycleOutcome::Published { .. })
    }
}

/// The single writer of live queue state. Each cycle pulls the board,
/// parses every tracked clinic and publishes a complete new registry, or
/// leaves the previous one untouched.
pub struct RefreshPipeline {
    source: Box<dyn BoardSource>,
    spec: BoardSourceSpec,
    parser: SnapshotParser,
    registry: Arc<RegistryHandle>,
    store: Option<RegistryStore>,
    refresh_interval: Duration,
}

impl RefreshPipeline {
    pub fn new(source: Box<dyn BoardSource>, spec: BoardSourceSpec, registry: Arc<RegistryHandle>) -> Self {
        Self {
            source,
            spec,
            parser: SnapshotParser::new(),
            registry,
            store: None,
            refresh_interval: Duration::from_secs(60),
        }
    }

    pub fn with_store(mut self, store: RegistryStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_interval(mut self, refresh_interval: Duration) -> Self {
        self.refresh_interval = refresh_interval;
        self
    }

    pub async fn run_cycle(&mut self) -> RefreshReport {
        self.run_cycle_at(Local::now().naive_local()).await
    }

    pub async fn run_cycle_at(&mut self, now: NaiveDateTime) -> RefreshReport {
        let mut report = RefreshReport::new(now);
        info!("Refresh cycle {} started from {}", report.cycle_id, self.source.source_name());

        let blocks = match self.source.pull().await {
            Ok(blocks) => blocks,
            Err(e) => {
                error!("Board source {} failed: {}", self.source.source_id(), e);
                return report.skip(format!("board source failed: {}", e));
            }
        };
        report.blocks_pulled = blocks.len();

        let tracked: Vec<_> = blocks.iter().filter(|block| self.spec.tracks(block)).collect();
        report.blocks_tracked = tracked.len();
        if tracked.is_empty() {
            return report.skip(format!("no tracked clinics among {} board blocks", blocks.len()));
        }

        self.parser.reset_stats();
        let snapshots: Vec<ClinicSnapshot> = tracked
            .into_iter()
            .map(|block| self.parser.parse_block(block, now))
            .collect();
        report.parse_anomalies = self.parser.get_stats().1;

        let mut builder = RegistryBuilder::new();
        for snapshot in &snapshots {
            builder.add_snapshot(snapshot);
        }
        report.keys_overwritten = builder.overwritten();
        let registry = builder.build(now);
        let clinics = registry.len();

        if let Some(store) = &self.store {
            if let Err(e) = store.save(&registry).await {
                error!("Failed to persist registry to {}: {}", store.path().display(), e);
                return report.skip(format!("persisting registry failed: {}", e));
            }
        }

        let version = self.registry.publish(registry).await;
        info!(
            "Refresh cycle {} published v{}: {} clinics from {} blocks ({} anomalies)",
            report.cycle_id, version, clinics, report.blocks_pulled, report.parse_anomalies
        );
        report.outcome = CycleOutcome::Published { version, clinics };
        report
    }

    /// Runs cycles back to back on the fixed interval until `shutdown`
    /// resolves. A slow cycle delays the next tick instead of overlapping it.
    pub async fn run<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(self.refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!("Refresh loop started, every {:?}", self.refresh_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.run_cycle().await;
                    debug!("Cycle {} outcome: {:?}", report.cycle_id, report.outcome);
                }
                _ = &mut shutdown => {
                    info!("Refresh loop stopping");
                    break;
                }
            }
        }
    }
}
