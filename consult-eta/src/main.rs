use anyhow::{bail, Context};
use chrono::Local;
use clap::{Parser, Subcommand};
use consult_eta::{
    api, BoardLocation, BoardSource, CycleOutcome, EstimationService, FileBoardSource, ModelStore,
    PredictionRequest, RefreshPipeline, RegistryHandle, RegistryStore, RelayBoardSource, ServiceConfig,
    SnapshotParser, TimeSlot,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "consult-eta", about = "Clinic consult time estimation service")]
struct Cli {
    /// Directory holding columns_<department>.json and model_<department>.json
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    /// Path of the persisted queue registry
    #[arg(long, global = true)]
    registry: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Refresh the registry every interval and serve predictions over HTTP
    Serve {
        #[arg(long)]
        bind: Option<SocketAddr>,
        #[arg(long)]
        board_dir: Option<PathBuf>,
        #[arg(long, conflicts_with = "board_dir")]
        board_url: Option<String>,
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Run a single refresh cycle and persist the registry
    Refresh {
        #[arg(long)]
        board_dir: Option<PathBuf>,
        #[arg(long, conflicts_with = "board_dir")]
        board_url: Option<String>,
    },
    /// Predict one patient's consult time from the persisted registry
    Predict {
        #[arg(long)]
        department: String,
        #[arg(long, default_value = "")]
        clinic_room: String,
        #[arg(long)]
        doctor: String,
        #[arg(long)]
        time_slot: TimeSlot,
        #[arg(long)]
        patient_number: u32,
        #[arg(long)]
        travel_minutes: Option<i64>,
    },
    /// Parse one board dump file and print the snapshot
    Parse {
        file: PathBuf,
        /// Clinic display name, defaults to the file stem
        #[arg(long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = ServiceConfig::from_env().context("reading CONSULT_ETA_* environment")?;
    if let Some(dir) = cli.model_dir {
        config.model_dir = dir;
    }
    if let Some(path) = cli.registry {
        config.registry_path = path;
    }

    match cli.command {
        Command::Serve { bind, board_dir, board_url, interval_secs } => {
            apply_board_flags(&mut config, board_dir, board_url);
            if let Some(addr) = bind {
                config.bind_addr = addr;
            }
            if let Some(secs) = interval_secs {
                config.refresh_interval_secs = secs;
            }
            config.validate()?;
            serve(config).await
        }
        Command::Refresh { board_dir, board_url } => {
            apply_board_flags(&mut config, board_dir, board_url);
            config.validate()?;
            refresh_once(config).await
        }
        Command::Predict { department, clinic_room, doctor, time_slot, patient_number, travel_minutes } => {
            let request = PredictionRequest {
                department,
                clinic_room,
                doctor,
                time_slot,
                patient_number,
                estimated_travel_minutes: travel_minutes,
            };
            predict(config, request).await
        }
        Command::Parse { file, name } => parse_dump(file, name).await,
    }
}

fn apply_board_flags(config: &mut ServiceConfig, board_dir: Option<PathBuf>, board_url: Option<String>) {
    if let Some(url) = board_url {
        config.board = BoardLocation::Relay(url);
    } else if let Some(dir) = board_dir {
        config.board = BoardLocation::Files(dir);
    }
}

fn make_source(config: &ServiceConfig) -> anyhow::Result<Box<dyn BoardSource>> {
    let source: Box<dyn BoardSource> = match &config.board {
        BoardLocation::Files(dir) => Box::new(FileBoardSource::new(dir.clone())),
        BoardLocation::Relay(url) => Box::new(RelayBoardSource::new(url.clone(), config.fetch.clone())?),
    };
    Ok(source)
}

async fn serve(config: ServiceConfig) -> anyhow::Result<()> {
    info!("Starting consult ETA service");

    let registry = Arc::new(RegistryHandle::new());
    let store = RegistryStore::new(config.registry_path.clone());
    match store.load().await {
        Ok(Some(persisted)) => {
            info!("Seeding registry from {} ({})", store.path().display(), persisted.update_timestamp);
            registry.publish(persisted).await;
        }
        Ok(None) => info!("No persisted registry at {}, waiting for first refresh", store.path().display()),
        Err(e) => warn!("Ignoring unreadable registry {}: {}", store.path().display(), e),
    }

    let pipeline = RefreshPipeline::new(make_source(&config)?, config.source_spec(), registry.clone())
        .with_store(store)
        .with_interval(config.refresh_interval());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut refresh_rx = shutdown_rx.clone();
    let refresh_task = tokio::spawn(pipeline.run(async move {
        let _ = refresh_rx.changed().await;
    }));

    let service = EstimationService::new(registry, Arc::new(ModelStore::new(config.model_dir.clone())));
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;

    api::serve(listener, service, async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        let _ = shutdown_tx.send(true);
    })
    .await?;

    refresh_task.await?;
    info!("Consult ETA service stopped");
    Ok(())
}

async fn refresh_once(config: ServiceConfig) -> anyhow::Result<()> {
    let registry = Arc::new(RegistryHandle::new());
    let store = RegistryStore::new(config.registry_path.clone());
    let mut pipeline = RefreshPipeline::new(make_source(&config)?, config.source_spec(), registry)
        .with_store(store);

    let report = pipeline.run_cycle().await;
    match report.outcome {
        CycleOutcome::Published { clinics, .. } => {
            info!(
                "Registry written to {}: {} clinics from {} tracked blocks ({} parse anomalies)",
                config.registry_path.display(),
                clinics,
                report.blocks_tracked,
                report.parse_anomalies
            );
            Ok(())
        }
        CycleOutcome::Skipped { reason } => bail!("refresh skipped: {}", reason),
    }
}

async fn predict(config: ServiceConfig, request: PredictionRequest) -> anyhow::Result<()> {
    let store = RegistryStore::new(config.registry_path.clone());
    let registry = Arc::new(RegistryHandle::new());
    if let Some(persisted) = store.load().await? {
        registry.publish(persisted).await;
    }

    let service = EstimationService::new(registry, Arc::new(ModelStore::new(config.model_dir.clone())));
    let response = service.predict(&request).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn parse_dump(file: PathBuf, name: Option<String>) -> anyhow::Result<()> {
    let content = tokio::fs::read_to_string(&file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let display_name = name.unwrap_or_else(|| {
        file.file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    });

    let block = FileBoardSource::parse_dump(&display_name, &content);
    let snapshot = SnapshotParser::new().parse_block(&block, Local::now().naive_local());
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
