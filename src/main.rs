use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use syncftp_lib::logging::init_logging;
use syncftp_lib::AppConfig;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Mirror a local directory onto an FTP server, uploading only what changed"
)]
struct Args {
    /// JSON configuration file
    #[arg(short, long, default_value = "syncftp.json")]
    config: PathBuf,

    /// Local root directory (overrides sync.localRoot)
    #[arg(long)]
    local_root: Option<PathBuf>,

    /// Remote root directory (overrides sync.remoteRoot)
    #[arg(long)]
    remote_root: Option<String>,

    /// Report what would change without touching the server
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Log level (overrides log.level)
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load(&args.config)
        .with_context(|| format!("Failed to load configuration {}", args.config.display()))?;

    if let Some(local_root) = args.local_root {
        config.sync.local_root = local_root;
    }
    if let Some(remote_root) = args.remote_root {
        config.sync.remote_root = remote_root;
    }
    if args.dry_run {
        config.sync.dry_run = true;
    }
    if let Some(level) = args.log_level {
        config.log.level = level;
    }

    init_logging(&config.log);

    let report = syncftp_lib::sync(&config).with_context(|| {
        format!(
            "Failed to sync {} to {}",
            config.sync.local_root.display(),
            config.sync.remote_root
        )
    })?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
