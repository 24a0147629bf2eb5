use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use chanlist::config::Config;

#[derive(Parser, Debug)]
#[command(
    name = "chanlist",
    version,
    about = "Aggregate, classify and speed-test IPTV playlists"
)]
struct Args {
    /// Configuration file (TOML)
    #[arg(long, value_name = "FILE", default_value = "config/config.toml")]
    config: PathBuf,

    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;

    let show_progress = std::io::stderr().is_terminal();
    let summary = chanlist::pipeline::run(&config, show_progress).await?;

    println!(
        "{}/{} channels online, {} failed URLs, {} files written",
        summary.online, summary.probed, summary.failed_urls, summary.files_written
    );
    if summary.files_failed > 0 {
        eprintln!("Warning: {} output files could not be written", summary.files_failed);
    }

    Ok(())
}
