//! Hearth server entry point

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use hearth_server::{ApiServer, Settings, SettingsLoader};

/// Supervise console processes over HTTP
#[derive(Parser, Debug)]
#[command(name = "hearth-server", version)]
#[command(about = "Supervise long-running console processes over HTTP")]
struct Cli {
    /// Settings file (defaults to the per-user config file, if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address
    #[arg(short, long)]
    bind: Option<String>,

    /// Directory holding one working directory per instance
    #[arg(long)]
    servers_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn apply(self, settings: &mut Settings) {
        if let Some(bind) = self.bind {
            settings.bind = bind;
        }
        if let Some(dir) = self.servers_dir {
            settings.supervisor.servers_dir = dir;
        }
        if let Some(level) = self.log_level {
            settings.log_level = level;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();
    let loader = match cli.config.take() {
        Some(path) => SettingsLoader::with_path(path),
        None => SettingsLoader::new(),
    };
    let mut settings = loader.load()?;
    cli.apply(&mut settings);
    settings.validate()?;

    tracing_subscriber::fmt()
        .with_max_level(settings.max_level()?)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        servers_dir = %settings.supervisor.servers_dir.display(),
        runtime = %settings.supervisor.profile.runtime,
        "Starting hearth server"
    );

    let server = ApiServer::bind(&settings).await?;
    server.run().await
}
