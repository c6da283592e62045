//! The CLI surface (§4.10): one binary, a role subcommand, and flags that
//! override whatever an optional `--config` TOML file supplies.

use std::path::PathBuf;

use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "dlc-agent")]
pub enum Cli {
    /// Run as a log-shipping client, forwarding records to one or more
    /// collectors with automatic reconnect and failover.
    Client(ClientArgs),
    /// Run as a collector, accepting mutually-authenticated client
    /// connections and forwarding accepted payloads to a sink.
    Collector(CollectorArgs),
    /// Bootstrap a self-signed CA and client/collector leaf certificates.
    Pki(PkiArgs),
}

#[derive(Debug, StructOpt)]
pub struct ClientArgs {
    /// Comma-separated `host:port` collector addresses, tried in order with
    /// failover.
    #[structopt(long, use_delimiter = true)]
    pub collector: Vec<String>,

    #[structopt(long = "cert", parse(from_os_str))]
    pub certificate: Option<PathBuf>,

    #[structopt(long = "key", parse(from_os_str))]
    pub private_key: Option<PathBuf>,

    #[structopt(long = "ca", parse(from_os_str))]
    pub ca_bundle: Option<PathBuf>,

    /// Client name sent in the handshake hello. Defaults to the local
    /// hostname.
    #[structopt(long)]
    pub name: Option<String>,

    #[structopt(long = "ring-capacity")]
    pub ring_capacity: Option<usize>,

    #[structopt(long = "flush-period")]
    pub flush_period_ms: Option<u64>,

    #[structopt(long = "failover-backoff")]
    pub failover_backoff_secs: Option<u64>,

    #[structopt(long = "handshake-timeout")]
    pub handshake_timeout_secs: Option<u64>,

    #[structopt(long = "stats-period")]
    pub stats_period_secs: Option<u64>,

    #[structopt(long, parse(from_os_str))]
    pub config: Option<PathBuf>,
}

#[derive(Debug, StructOpt)]
pub struct CollectorArgs {
    /// `host:port` to listen on.
    #[structopt(long)]
    pub listen: Option<String>,

    #[structopt(long = "cert", parse(from_os_str))]
    pub certificate: Option<PathBuf>,

    #[structopt(long = "key", parse(from_os_str))]
    pub private_key: Option<PathBuf>,

    #[structopt(long = "ca", parse(from_os_str))]
    pub ca_bundle: Option<PathBuf>,

    #[structopt(long, possible_values = &["sql", "line-json", "null"])]
    pub sink: Option<String>,

    /// MySQL connection URL, required when `--sink sql`.
    #[structopt(long = "sink-sql-url")]
    pub sink_sql_url: Option<String>,

    /// `host:port` of the downstream line-JSON peer, required when
    /// `--sink line-json`.
    #[structopt(long = "sink-line-json-address")]
    pub sink_line_json_address: Option<String>,

    #[structopt(long = "ack-batch-period")]
    pub ack_batch_period_ms: Option<u64>,

    #[structopt(long = "stats-period")]
    pub stats_period_secs: Option<u64>,

    #[structopt(long, parse(from_os_str))]
    pub config: Option<PathBuf>,
}

#[derive(Debug, StructOpt)]
pub struct PkiArgs {
    #[structopt(subcommand)]
    pub command: PkiCommand,
}

#[derive(Debug, StructOpt)]
pub enum PkiCommand {
    /// Generate a self-signed CA and `client`/`collector` leaf certificates.
    Generate {
        #[structopt(long = "out", parse(from_os_str))]
        out_dir: PathBuf,

        #[structopt(long)]
        force: bool,
    },
}
