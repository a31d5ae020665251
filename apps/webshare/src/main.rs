//! EM WebShare entry point.

mod app;
mod config;
mod console;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Time allowed for background tasks once the share has stopped. The
/// stdin reader cannot be interrupted and is abandoned after this.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Share files with any browser on the local network.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// TOML config file (default: ./webshare.toml if present).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// First port to try.
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory receiving uploads.
    #[arg(long)]
    upload_dir: Option<PathBuf>,

    /// Directory holding the web page.
    #[arg(long)]
    static_dir: Option<PathBuf>,
}

impl Args {
    /// Command-line values take precedence over the config file.
    fn apply(self, config: &mut Config) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(dir) = self.upload_dir {
            config.upload_dir = dir;
        }
        if let Some(dir) = self.static_dir {
            config.static_dir = dir;
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    println!("EM WebShare : Simple Web Based file sharing app");
    println!("contribute : https://github.com/SkillfulElectro/em_webshare.git\n");
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting webshare");

    args.apply(&mut config);
    tracing::debug!(?config, "configuration loaded");

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(app::run(config));
    rt.shutdown_timeout(SHUTDOWN_GRACE);
    result?;

    tracing::info!("webshare shut down cleanly");
    Ok(())
}
