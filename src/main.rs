use std::{path::PathBuf, process::exit, sync::Arc};

use clap::Parser;
use tokio::signal::ctrl_c;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tablegate::config::{context::build_context, schema::load_config};
use tablegate::frontend::http::run_server;

#[derive(Debug, Parser)]
#[clap(name = "tablegate", about = "Generic HTTP access to PostgreSQL tables", version)]
struct Args {
    #[clap(short, long, default_value = "tablegate.toml")]
    config_path: PathBuf,

    #[clap(long, help = "Log in JSON format")]
    json_logs: bool,
}

fn prepare_tracing(json_logs: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tablegate=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    prepare_tracing(args.json_logs);

    info!("Starting tablegate {}", env!("CARGO_PKG_VERSION"));

    let config = match load_config(&args.config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("Error loading the config from {:?}: {e}", args.config_path);
            exit(1);
        }
    };

    let context = match build_context(&config).await {
        Ok(context) => Arc::new(context),
        Err(e) => {
            error!("Error connecting to the database: {e}");
            exit(1);
        }
    };

    let Some(http) = config.frontend.http.clone() else {
        warn!("No frontends configured, nothing to do");
        return;
    };

    run_server(context, http, async {
        if let Err(e) = ctrl_c().await {
            error!("Error listening for the shutdown signal: {e}");
        }
        info!("Shutting down");
    })
    .await;
}
