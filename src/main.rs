use std::sync::Arc;

use capteur::configuration::config::Config;
use capteur::data_capture::recorder::Recorder;
use capteur::web_interface::web_server::WebServer;
use log::{error, info};

#[tokio::main]
async fn main() {
    // Example how to log
    // https://docs.rs/env_logger/latest/env_logger/
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    println!(
        "
 ██████╗ █████╗ ██████╗ ████████╗███████╗██╗   ██╗██████╗
██╔════╝██╔══██╗██╔══██╗╚══██╔══╝██╔════╝██║   ██║██╔══██╗
██║     ███████║██████╔╝   ██║   █████╗  ██║   ██║██████╔╝
██║     ██╔══██║██╔═══╝    ██║   ██╔══╝  ██║   ██║██╔══██╗
╚██████╗██║  ██║██║        ██║   ███████╗╚██████╔╝██║  ██║
 ╚═════╝╚═╝  ╚═╝╚═╝        ╚═╝   ╚══════╝ ╚═════╝ ╚═╝  ╚═╝
===========================================================
            A telemetry capture receiver v0.1.0
===========================================================
"
    );

    info!("Importing configuration");

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Unable to import configuration: {}", e);
            std::process::exit(1);
        }
    };
    let bind_addr = match config.bind_addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Invalid bind address: {}", e);
            std::process::exit(1);
        }
    };

    info!("Configuration imported successfully");

    let recorder = match Recorder::new(bind_addr, config.ingest_port) {
        Ok(recorder) => Arc::new(recorder),
        Err(e) => {
            error!("Unable to start the ingest listener: {}, exiting...", e);
            std::process::exit(1);
        }
    };

    let web_server = WebServer::new(Arc::clone(&recorder), config.export_dir.clone());
    let control_port = config.control_port;
    tokio::spawn(async move {
        web_server.start(bind_addr, control_port).await;
    });

    info!("Press Ctrl-C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Unable to wait for the shutdown signal: {}", e);
    }

    info!("Shutting down");
    recorder.shutdown().await;
}

#[cfg(test)]
mod tests {
    #[test]
    fn it_works() {
        assert_eq!(2 + 2, 4);
    }
}
