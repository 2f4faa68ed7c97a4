pub mod channels;
pub mod config;
pub mod coordinator;
pub mod magnum;
pub mod midnite;
pub mod mqtt;
pub mod options;
pub mod prelude;
pub mod reader;
pub mod utils;

use std::io::Write;

use crate::coordinator::Coordinator;
use crate::mqtt::Mqtt;
use crate::prelude::*;

const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

pub async fn app(mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
    let options = Options::new();

    let config = Config::new(options.config_file.clone()).map_err(|err| {
        eprintln!("failed to load {}: {:?}", options.config_file, err);
        err
    })?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.loglevel()))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.module_path().unwrap_or(""),
                record.args()
            )
        })
        .write_style(env_logger::WriteStyle::Never)
        .init();

    info!("powerpi-bridge {} starting", CARGO_PKG_VERSION);

    let channels = Channels::new();

    let mqtt = Mqtt::new(config.clone(), channels.clone());
    let mqtt_clone = mqtt.clone();
    let mqtt_handle = tokio::spawn(async move {
        if let Err(e) = mqtt_clone.start().await {
            error!("mqtt task failed: {}", e);
        }
    });

    let mut coordinator = Coordinator::new(config, channels.clone());
    let shutdown_tx = channels.shutdown.clone();
    let coordinator_handle = tokio::spawn(async move {
        if let Err(e) = coordinator.start().await {
            error!("coordinator task failed: {}", e);
            // A coordinator that cannot run means there is nothing left to
            // do; take the rest of the process down with it.
            let _ = shutdown_tx.send(());
        }
    });

    // Either ctrl-c or an internal failure ends the process.
    let mut internal_shutdown = channels.shutdown.subscribe();
    tokio::select! {
        _ = shutdown_rx.recv() => {}
        _ = internal_shutdown.recv() => {}
    }

    info!("shutdown signal received, stopping components");
    let _ = channels.shutdown.send(());
    let _ = mqtt.stop().await;

    if let Err(e) = coordinator_handle.await {
        error!("error waiting for coordinator task: {}", e);
    }
    if let Err(e) = mqtt_handle.await {
        error!("error waiting for mqtt task: {}", e);
    }

    info!("shutdown complete");
    Ok(())
}
