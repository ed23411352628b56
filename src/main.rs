use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, ValueEnum};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use lagwatch::build_info::VERSION;
use lagwatch::client::KafkaConnector;
use lagwatch::config::{self, ClusterConfig};
use lagwatch::monitor::{self, Monitor};
use lagwatch::server;
use lagwatch::state::State;

/// Polls Kafka clusters and serves consumer group lag over HTTP.
///
/// Every cluster is configured through `LAGWATCH_<NAME>_BROKERS`,
/// `LAGWATCH_<NAME>_META_REFRESH` and `LAGWATCH_<NAME>_OFFSET_REFRESH`.
#[derive(Debug, Parser)]
#[command(name = "lagwatch", version, about)]
struct Args {
    /// Names of the clusters to monitor.
    #[arg(
        long,
        env = "LAGWATCH_CLUSTERS",
        value_delimiter = ',',
        default_value = "default"
    )]
    clusters: Vec<String>,

    /// Address the HTTP server listens on.
    #[arg(long, env = "LAGWATCH_HTTP_ADDR", default_value = "0.0.0.0:8080")]
    http_addr: SocketAddr,

    #[arg(long, env = "LAGWATCH_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Forget consumer offsets that were not refreshed for this long, e.g. `1h`.
    #[arg(long, env = "LAGWATCH_CONSUMER_TTL", value_parser = humantime::parse_duration)]
    consumer_ttl: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Error)]
enum Error {
    #[error("Invalid cluster configuration: {0}")]
    Config(#[from] config::Error),

    #[error("Cannot start monitor: {0}")]
    Monitor(#[from] monitor::Error),

    #[error("Cannot listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("HTTP server failed: {0}")]
    Serve(std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.log_format);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(e = %e, "Exiting");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(args: Args) -> Result<(), Error> {
    info!(version = VERSION, clusters = ?args.clusters, "Starting lagwatch");

    let clusters = args
        .clusters
        .iter()
        .map(|name| ClusterConfig::from_env(name))
        .collect::<Result<Vec<_>, _>>()?;
    let monitor = Monitor::new(clusters)?;
    let state = Arc::new(State::new(args.clusters.iter().cloned()));

    let listener = TcpListener::bind(args.http_addr)
        .await
        .map_err(|source| Error::Bind {
            addr: args.http_addr,
            source,
        })?;
    info!(addr = %args.http_addr, "Listening");

    let token = CancellationToken::new();
    tokio::spawn(cancel_on_signal(token.clone()));

    let monitor_task = {
        let state = Arc::clone(&state);
        let token = token.clone();
        tokio::spawn(async move {
            monitor
                .run(Arc::new(KafkaConnector::default()), state, token)
                .await;
        })
    };

    if let Some(ttl) = args.consumer_ttl {
        tokio::spawn(expire_consumers(Arc::clone(&state), ttl, token.clone()));
    }

    let shutdown = {
        let token = token.clone();
        async move { token.cancelled().await }
    };
    let served = server::serve(listener, state, shutdown).await;

    // the server may also stop on its own
    token.cancel();
    if let Err(e) = monitor_task.await {
        error!(e = %e, "Monitor task failed");
    }

    served.map_err(Error::Serve)?;
    info!("Shut down");
    Ok(())
}

async fn cancel_on_signal(token: CancellationToken) {
    wait_for_signal().await;
    info!("Received shutdown signal");
    token.cancel();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (Ok(mut hangup), Ok(mut interrupt), Ok(mut terminate)) = (
        signal(SignalKind::hangup()),
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) else {
        error!("Cannot install signal handlers");
        return std::future::pending().await;
    };

    tokio::select! {
        _ = hangup.recv() => {}
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(e = %e, "Cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

/// Periodically drops consumer offsets older than `ttl`.
async fn expire_consumers(state: Arc<State>, ttl: Duration, token: CancellationToken) {
    let period = (ttl / 2).max(Duration::from_secs(1));
    let mut interval = tokio::time::interval(period);
    let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);

    loop {
        tokio::select! {
            biased;

            _ = token.cancelled() => return,
            _ = interval.tick() => {
                let cutoff = Utc::now().timestamp().saturating_sub(ttl_secs);
                state.expire_consumer_groups(cutoff);
            }
        }
    }
}
