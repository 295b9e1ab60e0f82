use clap::Parser;
use sync_core::config::BootstrapConfig;
use tracing_subscriber::EnvFilter;

/// Multi-cloud file synchronization engine.
#[derive(Parser)]
struct Args {
	/// Path to the bootstrap config JSON file.
	#[arg(long, env = "SYNC_CORE_CONFIG")]
	config: Option<std::path::PathBuf>,

	/// Run initial sync reconciliation and exit, without starting the daemon.
	#[arg(long)]
	initial_sync_only: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sync_core=info,warn")))
		.init();

	let args = Args::parse();
	let config_path = match args.config {
		Some(path) => path,
		None => BootstrapConfig::default_config_path()?,
	};
	let config = BootstrapConfig::load_from(&config_path)?;

	let manager = sync_core::build(config).await?;
	manager.run_initial_sync().await?;

	if !args.initial_sync_only {
		manager.run_daemon().await?;
	}

	Ok(())
}
