//! CLI glue for index-sync: argument parsing and wiring settings into the
//! core pipeline.
//!
//! All business logic lives in `index-sync-core`. This module decides which
//! uploader to use, runs one pass (or one per interval with `--watch`) and
//! turns the outcome into a `Result` for `main`.
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Parser;
use index_sync_core::config::Settings;
use index_sync_core::contract::{SinkTarget, SourceClient, Uploader};
use index_sync_core::download::HttpSourceClient;
use index_sync_core::error::ConfigError;
use index_sync_core::synchronise::{SyncPolicy, Synchroniser};
use index_sync_core::transform::DocumentTransformer;

use crate::upload::{DryRunUploader, QBusinessUploader};

/// Synchronise documents from an HTTP source into an Amazon Q Business index.
#[derive(Parser, Debug, Default)]
#[clap(
    name = "index-sync",
    version,
    about = "Fetch every document from the source API and upload it to the search index"
)]
pub struct Cli {
    /// Path to a YAML config file (defaults to $INDEX_SYNC_CONFIG, then environment only)
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Only check that the source API is reachable
    #[clap(long)]
    pub check: bool,

    /// Fetch and transform, but log batches instead of uploading them
    #[clap(long)]
    pub dry_run: bool,

    /// Keep running, one pass every sync interval
    #[clap(long)]
    pub watch: bool,
}

/// Run whatever `cli` asks for against validated `settings`.
pub async fn run(cli: &Cli, settings: &Settings) -> Result<()> {
    let source = Arc::new(HttpSourceClient::new(&settings.source, &settings.plugin)?);

    if cli.check {
        if source.test_connection().await {
            tracing::info!(command = "check", "Source is reachable");
            return Ok(());
        }
        bail!("source at {} is not reachable", settings.source.base_url);
    }

    let (uploader, target) = build_uploader(cli, settings).await?;
    let synchroniser = Synchroniser::new(
        source,
        uploader,
        target,
        SyncPolicy::from(&settings.sync),
        DocumentTransformer::new(settings.plugin.name.clone()),
    );

    if !cli.watch {
        let report = synchroniser.sync().await?;
        tracing::info!(command = "sync", ?report, "Synchronisation complete");
        return Ok(());
    }

    let interval = settings.sync.interval;
    if interval.is_zero() {
        bail!("sync.interval_secs must be greater than zero with --watch");
    }
    loop {
        match synchroniser.sync().await {
            Ok(report) => tracing::info!(command = "watch", ?report, "Synchronisation complete"),
            Err(e) => tracing::error!(command = "watch", error = %e, "Synchronisation failed, will retry next interval"),
        }
        tracing::info!(next_in_secs = interval.as_secs(), "Waiting for next pass");
        tokio::time::sleep(interval).await;
    }
}

async fn build_uploader(cli: &Cli, settings: &Settings) -> Result<(Arc<dyn Uploader>, SinkTarget)> {
    if cli.dry_run {
        let target = SinkTarget {
            application_id: settings.sink.application_id.clone(),
            index_id: settings.sink.index_id.clone().unwrap_or_default(),
            data_source_id: settings.sink.data_source_id.clone(),
        };
        return Ok((Arc::new(DryRunUploader), target));
    }

    let index_id = settings
        .sink
        .index_id
        .clone()
        .ok_or(ConfigError::Missing("sink.index_id"))?;
    let target = SinkTarget {
        application_id: settings.sink.application_id.clone(),
        index_id,
        data_source_id: settings.sink.data_source_id.clone(),
    };
    let uploader = QBusinessUploader::from_settings(&settings.sink).await;
    Ok((Arc::new(uploader), target))
}
