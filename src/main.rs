use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use structopt::StructOpt;

use dlc_agent::cli::{Cli, ClientArgs, CollectorArgs, PkiCommand};
use dlc_agent::client::connect::Address;
use dlc_agent::client::{Agent, AgentConfig};
use dlc_agent::collector::Listener;
use dlc_agent::error::{Error, Result};
use dlc_agent::sink::{self, SinkHandle};
use dlc_agent::stats::{self, Stats};
use dlc_agent::transport::Identity;
use dlc_agent::{config, defaults, pki};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match Cli::from_args() {
        Cli::Client(args) => run_client(args).await?,
        Cli::Collector(args) => run_collector(args).await?,
        Cli::Pki(args) => match args.command {
            PkiCommand::Generate { out_dir, force } => {
                pki::generate(&out_dir, &["client", "collector"], force)?;
            }
        },
    }
    Ok(())
}

fn required<T>(value: Option<T>, flag: &str) -> Result<T> {
    value.ok_or_else(|| Error::config(format!("missing required setting: {}", flag)))
}

async fn run_client(args: ClientArgs) -> Result<()> {
    let file_config = match &args.config {
        Some(path) => Some(
            config::ClientConfig::load(path)
                .await
                .map_err(|e| Error::config(e.to_string()))?,
        ),
        None => None,
    };

    let raw_addresses: Vec<String> = if !args.collector.is_empty() {
        args.collector
    } else {
        file_config
            .as_ref()
            .map(|c| c.addresses.clone())
            .unwrap_or_default()
    };
    if raw_addresses.is_empty() {
        return Err(Error::config("at least one --collector address is required"));
    }
    let addresses: std::result::Result<Vec<Address>, Error> =
        raw_addresses.iter().map(|s| Address::from_str(s)).collect();
    let addresses = addresses?;

    let certificate = required(
        args.certificate.or_else(|| file_config.as_ref().map(|c| c.certificate.clone())),
        "--cert",
    )?;
    let private_key = required(
        args.private_key.or_else(|| file_config.as_ref().map(|c| c.private_key.clone())),
        "--key",
    )?;
    let ca_bundle = required(
        args.ca_bundle.or_else(|| file_config.as_ref().map(|c| c.ca_bundle.clone())),
        "--ca",
    )?;

    let client_name = args
        .name
        .or_else(|| file_config.as_ref().map(|c| c.name.clone()))
        .unwrap_or_else(|| {
            std::env::var("HOSTNAME").unwrap_or_else(|_| "dlc-agent-client".to_string())
        });

    let ring_capacity = args
        .ring_capacity
        .or_else(|| file_config.as_ref().map(|c| c.ring_capacity))
        .unwrap_or_else(defaults::ring_capacity);
    let stats_period = args
        .stats_period_secs
        .map(Duration::from_secs)
        .or_else(|| file_config.as_ref().map(|c| c.stats_period))
        .unwrap_or_else(defaults::stats_period);
    let flush_period = args
        .flush_period_ms
        .map(Duration::from_millis)
        .or_else(|| file_config.as_ref().map(|c| c.flush_period))
        .unwrap_or_else(defaults::flush_period);
    let handshake_timeout = args
        .handshake_timeout_secs
        .map(Duration::from_secs)
        .or_else(|| file_config.as_ref().map(|c| c.handshake_timeout))
        .unwrap_or_else(defaults::handshake_timeout);
    let failover_backoff = args
        .failover_backoff_secs
        .map(Duration::from_secs)
        .or_else(|| file_config.as_ref().map(|c| c.failover_backoff))
        .unwrap_or_else(defaults::failover_backoff);

    let config = AgentConfig {
        addresses,
        identity: Identity {
            ca_bundle,
            certificate,
            private_key,
        },
        client_name,
        ring_capacity,
        stats_period,
        flush_period,
        handshake_timeout,
        failover_backoff,
    };

    let agent = Agent::start(config);
    tracing::info!("client agent started, waiting for log records on stdin");

    // Collaborator surface: the real producer is whatever embeds this
    // library. The binary's own job is just to host the agent; reading
    // newline-delimited records from stdin lets it double as a drop-in
    // forwarder for anything that can pipe to it.
    use tokio::io::{AsyncBufReadExt, BufReader};
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    while let Some(line) = lines.next_line().await.map_err(Error::Transport)? {
        agent.send(bytes::Bytes::from(line.into_bytes())).await;
    }
    Ok(())
}

async fn run_collector(args: CollectorArgs) -> Result<()> {
    let file_config = match &args.config {
        Some(path) => Some(
            config::CollectorConfig::load(path)
                .await
                .map_err(|e| Error::config(e.to_string()))?,
        ),
        None => None,
    };

    let listen = required(
        args.listen.clone().or_else(|| {
            file_config
                .as_ref()
                .map(|c| format!("{}:{}", c.host, c.port))
        }),
        "--listen",
    )?;
    let (host, port) = listen
        .rsplit_once(':')
        .ok_or_else(|| Error::config("--listen must be host:port"))?;
    let port: u16 = port
        .parse()
        .map_err(|_| Error::config("invalid port in --listen"))?;

    let certificate = required(
        args.certificate.clone().or_else(|| file_config.as_ref().map(|c| c.certificate.clone())),
        "--cert",
    )?;
    let private_key = required(
        args.private_key.clone().or_else(|| file_config.as_ref().map(|c| c.private_key.clone())),
        "--key",
    )?;
    let ca_bundle = required(
        args.ca_bundle.clone().or_else(|| file_config.as_ref().map(|c| c.ca_bundle.clone())),
        "--ca",
    )?;
    let identity = Identity {
        ca_bundle,
        certificate,
        private_key,
    };

    let stats_period = args
        .stats_period_secs
        .map(Duration::from_secs)
        .or_else(|| file_config.as_ref().map(|c| c.stats_period))
        .unwrap_or_else(defaults::stats_period);
    let ack_batch_period = args
        .ack_batch_period_ms
        .map(Duration::from_millis)
        .or_else(|| file_config.as_ref().map(|c| c.ack_batch_period))
        .unwrap_or_else(defaults::ack_batch_period);
    let stats = Arc::new(Stats::new());
    stats::spawn_reporter(stats.clone(), "collector", stats_period);

    let sink_handle = build_sink(&args, stats.clone()).await?;

    let listener = Listener::bind((host, port), &identity, sink_handle, stats, ack_batch_period).await?;
    listener.serve().await;
}

async fn build_sink(args: &CollectorArgs, stats: Arc<Stats>) -> Result<SinkHandle> {
    match args.sink.as_deref() {
        Some("sql") => {
            let url = required(args.sink_sql_url.clone(), "--sink-sql-url")?;
            let pool = sink::sql::connect(&url)
                .await
                .map_err(|e| Error::config(e.to_string()))?;
            Ok(sink::sql::spawn(
                pool,
                stats,
                sink::channel_capacity(),
                defaults::ack_batch_period(),
            ))
        }
        Some("line-json") => {
            let address = required(args.sink_line_json_address.clone(), "--sink-line-json-address")?;
            Ok(sink::line_json::spawn(address, stats))
        }
        Some("null") | None => Ok(sink::null::spawn(stats)),
        Some(other) => Err(Error::config(format!("unknown sink '{}'", other))),
    }
}
