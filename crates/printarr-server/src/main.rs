//! printarr server: wires the catalog, job queue, source adapters and
//! worker pool into one process and exposes the REST/SSE surface over it.

mod adapter_source;
mod error;
mod handlers;
mod server;

use std::collections::HashMap;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use printarr_core::catalog::{CatalogStore, SettingsService};
use printarr_core::config::{CliOverrides, PrintarrConfig};
use printarr_core::domain::{BackfillMode, Channel, DownloadMode, Id};
use printarr_core::events::Broadcaster;
use printarr_pipeline::adapters::{Adapter, DirectUploadAdapter};
use printarr_pipeline::ingest::IngestService;
use printarr_pipeline::workers::{JobContext, WorkerPool};

use adapter_source::AdapterSourceConfig;

const DIRECT_UPLOAD_CHANNEL_TITLE: &str = "Direct Uploads";

#[derive(Parser, Debug)]
#[command(name = "printarr-server")]
#[command(about = "Ingestion and cataloguing service for 3D-printable designs")]
struct Args {
    #[arg(long)]
    config_path: Option<std::path::PathBuf>,
    #[arg(long)]
    data_path: Option<std::path::PathBuf>,
    #[arg(long)]
    library_path: Option<std::path::PathBuf>,
    #[arg(long)]
    cache_path: Option<std::path::PathBuf>,
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    #[arg(short, long)]
    debug: bool,
    #[arg(long)]
    log_level: Option<String>,
    #[arg(long)]
    database_url: Option<String>,
}

impl From<Args> for CliOverrides {
    fn from(args: Args) -> Self {
        CliOverrides {
            config_path: args.config_path,
            data_path: args.data_path,
            library_path: args.library_path,
            cache_path: args.cache_path,
            host: args.host,
            port: args.port,
            debug: args.debug,
            log_level: args.log_level,
            database_url: args.database_url,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let debug = args.debug;
    let config = Arc::new(PrintarrConfig::resolve(args.into()));

    init_logging(debug, &config.log_level);
    info!("starting printarr-server");

    let store = CatalogStore::open(&config.paths.database_path())?;
    let broadcaster = Broadcaster::new();
    let settings = SettingsService::new(store.clone(), broadcaster.clone());

    let recovered = store.recover_orphaned_running_jobs()?;
    if recovered > 0 {
        warn!(count = recovered, "recovered jobs orphaned by a previous process exit");
    }

    let upload_channel = ensure_upload_channel(&store)?;
    let direct_upload = Arc::new(DirectUploadAdapter::new());
    let ingest = Arc::new(IngestService::new(store.clone(), broadcaster.clone()));

    let adapters = Arc::new(build_adapter_map(&store)?);
    info!(configured_channels = adapters.len(), "source adapters ready");

    let ctx = JobContext {
        store: store.clone(),
        broadcaster: broadcaster.clone(),
        settings: settings.clone(),
        config: config.clone(),
        adapters,
        ingest: ingest.clone(),
    };

    let concurrency = settings
        .get("max_concurrent_downloads")?
        .as_i64()
        .unwrap_or(printarr_core::config::DEFAULT_MAX_CONCURRENT_DOWNLOADS)
        .max(1) as usize;

    let pool = Arc::new(WorkerPool::new(ctx));
    let _worker_handles = pool.spawn(concurrency);
    info!(workers = concurrency, "worker pool spawned");

    let state = server::AppState {
        store,
        broadcaster,
        settings,
        config: config.clone(),
        direct_upload,
        upload_channel_id: upload_channel.id,
        ingest,
    };

    let addr = server::start_server(state, &config.network.host, config.network.port).await?;
    info!(%addr, "printarr-server listening");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, exiting");
    Ok(())
}

fn init_logging(debug: bool, log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { log_level }));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if debug {
        builder.with_max_level(Level::DEBUG).compact().init();
    } else {
        builder.json().init();
    }
}

/// Every direct upload needs a `Channel` row to satisfy `IngestService`'s
/// signature even though nothing about it is a real upstream source; this
/// finds or creates that one virtual channel.
fn ensure_upload_channel(store: &CatalogStore) -> anyhow::Result<Channel> {
    for channel in store.list_channels()? {
        if channel.upstream_id.is_none() && channel.import_source_id.is_none() {
            return Ok(channel);
        }
    }
    let now = chrono::Utc::now();
    let channel = Channel {
        id: printarr_core::domain::new_id(),
        upstream_id: None,
        title: DIRECT_UPLOAD_CHANNEL_TITLE.to_string(),
        enabled: true,
        backfill_mode: BackfillMode::AllHistory,
        backfill_value: None,
        download_mode: DownloadMode::DownloadAll,
        download_mode_enabled_at: Some(now),
        sync_cursor: None,
        import_source_id: None,
        created_at: now,
        updated_at: now,
    };
    store.upsert_channel(&channel)?;
    Ok(channel)
}

/// Builds one `Adapter` per real (non-virtual) channel, per the
/// restart-required wiring documented in `adapter_source`.
fn build_adapter_map(store: &CatalogStore) -> anyhow::Result<HashMap<Id, Adapter>> {
    let source_config = AdapterSourceConfig::from_env();
    let mut map = HashMap::new();
    for channel in store.list_channels()? {
        if let Some(adapter) = source_config.build_for_channel(&channel) {
            map.insert(channel.id, adapter);
        }
    }
    Ok(map)
}
