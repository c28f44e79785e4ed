//! Command line interface definition

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "photocull", version, about = "Near-duplicate photo deduplication pipeline")]
pub struct Cli {
	/// Enable debug logging
	#[arg(short, long, global = true)]
	pub verbose: bool,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
	/// Run a worker process consuming pipeline jobs
	Worker {
		/// Also schedule the periodic maintenance sweep
		#[arg(long)]
		with_maintenance: bool,
	},
	/// Purge stale sessions and reclaim orphan blobs once
	Sweep {
		/// Age threshold in days, overriding CLEANUP_DAYS
		#[arg(long)]
		days: Option<i64>,
	},
}
