pub mod types;
pub mod config;
pub mod parser;
pub mod registry;
pub mod ranking;
pub mod features;
pub mod schema;
pub mod correction;
pub mod estimator;
pub mod service;
pub mod traits;
pub mod fetcher;
pub mod sources;
pub mod pipeline;
pub mod api;

pub use types::*;
pub use config::{BoardLocation, ServiceConfig};
pub use parser::{RosterScanner, RosterState, SnapshotParser};
pub use registry::{build_registry, PublishedRegistry, RegistryBuilder, RegistryHandle, RegistryStore};
pub use ranking::SequenceRanking;
pub use features::{build_features, FeatureBag, FeatureValue, RequestFeatures};
pub use schema::ModelSchema;
pub use correction::{correct, CorrectedEstimate};
pub use estimator::{LoadedModel, ModelStore};
pub use service::EstimationService;
pub use traits::BoardSource;
pub use fetcher::Fetcher;
pub use sources::{FileBoardSource, RelayBoardSource};
pub use pipeline::{CycleOutcome, RefreshPipeline, RefreshReport};
