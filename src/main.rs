// Photocull - near-duplicate photo deduplication pipeline
//
// Two entry points:
// - worker: consume processing and clustering jobs from the broker
// - sweep: one-shot purge of stale sessions and orphan blobs

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use photocull::cli::{Cli, Command};
use photocull::config::Config;
use photocull::pipeline::{self, PipelineContext, Worker};
use photocull::processing::NoFaceDetector;
use photocull::storage::{LocalBlobStore, MemoryCatalog};

#[tokio::main]
async fn main() -> ExitCode {
	let cli = Cli::parse();

	let default_filter = if cli.verbose { "photocull=debug,info" } else { "info" };
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
		.init();

	match run(cli).await {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) => {
			error!(error = %format!("{err:#}"), "fatal");
			ExitCode::FAILURE
		}
	}
}

async fn run(cli: Cli) -> Result<()> {
	let config = Config::from_env().context("invalid configuration")?;
	let ctx = build_context(config)?;

	match cli.command {
		Command::Worker { with_maintenance } => run_worker(ctx, with_maintenance).await,
		Command::Sweep { days } => run_sweep(ctx, days).await,
	}
}

/// Wire the single-process deployment: filesystem blobs, in-memory
/// catalog and broker. Other deployments plug their own adapters
/// through `PipelineContext::new`.
fn build_context(config: Config) -> Result<Arc<PipelineContext>> {
	let root = if config.blob_connection.is_empty() {
		"./data".to_string()
	} else {
		config.blob_connection.clone()
	};
	let container = config.blob_container.clone();

	Ok(PipelineContext::new(
		Arc::new(LocalBlobStore::new(root, &container)),
		Arc::new(MemoryCatalog::new()),
		Arc::new(pipeline::MemoryQueue::new()),
		Arc::new(NoFaceDetector),
		config,
	))
}

async fn run_worker(ctx: Arc<PipelineContext>, with_maintenance: bool) -> Result<()> {
	if with_maintenance {
		tokio::spawn(pipeline::run_maintenance(Arc::clone(&ctx)));
	}

	let queue = Arc::clone(&ctx.queue);
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			info!("shutdown requested, draining queue");
			queue.close();
		}
	});

	Worker::new(ctx).run().await;
	Ok(())
}

async fn run_sweep(ctx: Arc<PipelineContext>, days: Option<i64>) -> Result<()> {
	let age = days.unwrap_or(ctx.config.cleanup_days);
	let report = pipeline::sweep::run_with_age(&ctx, age)
		.await
		.context("sweep failed")?;
	info!(
		sessions = report.sessions_purged,
		blobs = report.blobs_deleted,
		orphans = report.orphans_reclaimed,
		"sweep complete"
	);
	Ok(())
}
