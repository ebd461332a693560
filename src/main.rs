//! organicdump server - entry point

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use organicdump_server::utils::setup_logging;
use organicdump_server::{Server, ServerConfig};

#[derive(Parser)]
#[command(name = "organicdump-server")]
#[command(about = "Control-plane server for organicdump RPi hubs and irrigation systems")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file (defaults to ./organicdump.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind
    #[arg(long)]
    bind_address: Option<String>,

    /// SQLite database path, or :memory:
    #[arg(long)]
    database: Option<String>,
}

impl Cli {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bind_address) = self.bind_address {
            config.bind_address = bind_address;
        }
        if let Some(database) = self.database {
            config.database_path = database;
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging();

    let mut config = match ServerConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    cli.apply(&mut config);
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Launching organicdump server...");

    let mut server = match Server::bind(&config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Server startup failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match server.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Server stopped: {}", e);
            ExitCode::FAILURE
        }
    }
}
