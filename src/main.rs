use std::process::ExitCode;
use std::sync::Arc;

use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::{error, info};

use ftirc::config::ServerConfig;
use ftirc::irc::server::Server;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = match ServerConfig::from_args(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let mut server = match Server::bind(&config) {
        Ok(server) => server,
        Err(e) => {
            error!(target: "system", "{e}");
            return ExitCode::FAILURE;
        }
    };

    // Termination signals only raise the flag; the event loop notices it
    // between waits and tears everything down itself.
    let shutdown = server.shutdown_flag();
    for signal in [SIGINT, SIGTERM] {
        if let Err(e) = signal_hook::flag::register(signal, Arc::clone(&shutdown)) {
            error!(target: "system", "failed to install signal handler: {e}");
            return ExitCode::FAILURE;
        }
    }

    info!(target: "system", "ircserv starting on {config}");
    match server.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(target: "system", "{e}");
            ExitCode::FAILURE
        }
    }
}
