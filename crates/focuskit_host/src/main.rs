//! Native-messaging host entry point.
//!
//! # Responsibility
//! - Resolve configuration, start logging and the broker actor.
//! - Serve length-prefixed JSON frames on stdin/stdout until EOF.
//!
//! Browsers pass the caller origin as the first argument; it is ignored.

use focuskit_core::{
    core_version, init_logging, serve, BrokerHandle, FsDownloader, HostConfig,
};
use log::info;
use std::error::Error;
use std::process::ExitCode;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    if std::env::args().nth(1).as_deref() == Some("--version") {
        println!("focuskit-host {}", core_version());
        return ExitCode::SUCCESS;
    }

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // stdout belongs to the frame protocol.
            eprintln!("focuskit-host: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let config = HostConfig::from_env()?;
    if let Some(log_dir) = config.log_dir.as_deref() {
        init_logging(config.log_level, log_dir)?;
    }

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::create_dir_all(&config.download_dir)?;
    let handle = BrokerHandle::spawn(
        config.broker_options(),
        FsDownloader::new(config.download_dir.clone()),
    )?;

    let stats = serve(&handle, tokio::io::stdin(), tokio::io::stdout()).await?;
    info!(
        "event=host_exit module=host status=ok received={} replied={} skipped={}",
        stats.received, stats.replied, stats.skipped
    );
    Ok(())
}
