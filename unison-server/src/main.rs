use std::sync::Arc;

use colored::Colorize;
use log::{error, info, LevelFilter};
use thiserror::Error;
use unison_collab::{Collab, CollabError, Database, DatabaseError, MemoryDatabase, RestDatabase};
use unison_server::{logging, run_server, ConfigError, ServerConfig};

#[derive(Debug, Error)]
enum StartupError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Could not set up persistence: {0}")]
    Database(#[from] DatabaseError),
    #[error("Could not restore rooms: {0}")]
    Restore(#[from] CollabError),
    #[error("Server failed: {0}")]
    Io(#[from] std::io::Error),
}

impl StartupError {
    fn hint(&self) -> &'static str {
        match self {
            Self::Config(_) => "Check the UNISON_* environment variables.",
            Self::Database(_) | Self::Restore(_) => {
                "Make sure the persistence service at UNISON_PERSISTENCE_URL is running, or unset it to keep rooms in memory."
            }
            Self::Io(_) => "Make sure UNISON_SERVER_PORT is free.",
        }
    }
}

async fn serve<Db>(database: Db, config: ServerConfig) -> Result<(), StartupError>
where
    Db: Database,
{
    let collab = Arc::new(Collab::new(database, config.collab));

    collab.rooms.restore().await?;
    info!("Restored {} room(s)", collab.rooms.list_all().len());

    run_server(collab, config.port).await?;
    Ok(())
}

async fn start(config: ServerConfig) -> Result<(), StartupError> {
    match config.persistence_url.clone() {
        Some(url) => {
            info!("Persisting rooms through {}", url);
            serve(RestDatabase::new(&url)?, config).await
        }
        None => {
            info!("No persistence service configured, rooms are kept in memory");
            serve(MemoryDatabase::new(), config).await
        }
    }
}

#[tokio::main]
async fn main() {
    let config = ServerConfig::from_env();
    let level = config.as_ref().map_or(LevelFilter::Info, |c| c.log_level);

    if let Err(err) = logging::init_logger(level) {
        eprintln!("Could not set up logging: {}", err);
    }

    let result = match config {
        Ok(config) => start(config).await,
        Err(err) => Err(err.into()),
    };

    if let Err(error) = result {
        error!(
            "{} Read the error below to troubleshoot the issue.",
            "unison failed to start!".bold().red()
        );
        error!("{}", error);
        error!("{}", format!("Hint: {}", error.hint()).dimmed().italic());

        std::process::exit(1);
    }
}
