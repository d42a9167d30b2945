//! result-courier: deliver task results to a listening post.
//!
//! Reads wire-encoded results from stdin, one submission body per line,
//! and delivers them with retry. Stops on end of input once everything
//! pending is finished, or on Ctrl-C after abandoning what is left.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, BufReader};

use result_courier::{codec, Courier, CourierConfig, CourierHandle, EndpointConfig, Scheme};

/// Deliver task results to a listening post
#[derive(Parser, Debug)]
#[command(name = "result-courier")]
#[command(about = "Deliver task results to a listening post with retry and backoff", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML config file
    #[arg(long, short = 'c', env = "COURIER_CONFIG")]
    config: Option<PathBuf>,

    /// Full submission URL (overrides host, port, uri and scheme)
    #[arg(long)]
    url: Option<String>,

    /// Listening post host
    #[arg(long)]
    host: Option<String>,

    /// Listening post port
    #[arg(long)]
    port: Option<u16>,

    /// Submission path
    #[arg(long)]
    uri: Option<String>,

    /// Use HTTPS
    #[arg(long)]
    https: bool,

    /// Submit attempts per result
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn load_config(&self) -> Result<CourierConfig> {
        let mut config = match &self.config {
            Some(path) => CourierConfig::from_file(path)?,
            None => CourierConfig::default(),
        };
        config.apply_env()?;

        if let Some(url) = &self.url {
            let headers = std::mem::take(&mut config.endpoint.headers);
            config.endpoint = EndpointConfig::from_url(url)?;
            config.endpoint.headers = headers;
        }
        if let Some(host) = &self.host {
            config.endpoint.host = host.clone();
        }
        if let Some(port) = self.port {
            config.endpoint.port = port;
        }
        if let Some(uri) = &self.uri {
            config.endpoint.uri = uri.clone();
        }
        if self.https {
            config.endpoint.scheme = Scheme::Https;
        }
        if let Some(max_attempts) = self.max_attempts {
            config.retry.max_attempts = max_attempts;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(feature = "logging")]
fn init_logging(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("result_courier={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(not(feature = "logging"))]
fn init_logging(_verbose: u8) {}

/// Feeds stdin lines to the courier until end of input or shutdown.
async fn read_results(handle: CourierHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                tracing::error!(error = %err, "failed to read stdin");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match codec::decode_batch(line.as_bytes()) {
            Ok(results) => {
                for result in results {
                    if handle.intake(result).await.is_err() {
                        return;
                    }
                }
            }
            Err(err) => tracing::warn!(error = %err, "skipping undecodable input line"),
        }
    }
    tracing::debug!("end of input");
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = cli.load_config().context("invalid configuration")?;
    let endpoint = config.endpoint.url()?;
    let (courier, handle) = Courier::http(config)?;
    tracing::info!(endpoint = %endpoint, "delivering results");

    let shutdown = courier.shutdown_token();
    let mut run = tokio::spawn(courier.run());
    let reader = tokio::spawn(read_results(handle));

    let summary = tokio::select! {
        summary = &mut run => summary?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received; abandoning pending results");
            shutdown.cancel();
            run.await?
        }
    };

    println!(
        "acknowledged={} abandoned={}",
        summary.acknowledged, summary.abandoned
    );
    let clean = summary.abandoned == 0;

    // A stdin read parked on the blocking pool would hold up runtime
    // shutdown until the next line arrives.
    if !reader.is_finished() {
        std::process::exit(if clean { 0 } else { 1 });
    }
    Ok(if clean {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
