#![forbid(unsafe_code)]

use std::path::PathBuf;

use clap::Parser;
use slapi_bridge_lib::{config, transport, wifi, Session};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "SLAPI bridge: HTTP over UART or parallel GPIO")]
struct Cli {
    /// Path to the KEY=VALUE configuration file
    #[arg(short, long, value_name = "FILE", default_value = "slapi.env")]
    config: PathBuf,
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let cfg = match config::load_from_path(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(%err, "failed to load configuration");
            std::process::exit(1);
        }
    };
    info!(config = %cli.config.display(), "configuration loaded");

    if let Err(err) = wifi::wait_for_network(&cfg.wifi) {
        error!(%err, "network bring-up failed");
        std::process::exit(1);
    }

    let transport = match transport::build(&cfg.transport) {
        Ok(transport) => transport,
        Err(err) => {
            error!(%err, "failed to open local transport");
            std::process::exit(1);
        }
    };

    if let Err(err) = Session::new(transport).run() {
        error!(%err, "session ended with error");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}
