use std::time::Duration;

use clap::{Args, Subcommand};
use delugemux_rpc::{connect_with_config, Client, ClientConfig, EventHandler};
use delugemux_transport::{ConnectConfig, Endpoint};

use crate::exit::{rpc_error, CliError, CliResult};
use crate::output::OutputFormat;

pub mod call;
pub mod events;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Invoke one RPC method and print its result.
    Call(CallArgs),
    /// Print events pushed by the daemon.
    Events(EventsArgs),
    /// Show version information.
    Version(VersionArgs),
}

/// Settings shared by every command that talks to the daemon.
#[derive(Debug, Clone)]
pub struct Session {
    pub endpoint: Endpoint,
    pub connect_timeout: Duration,
    pub format: OutputFormat,
}

impl Session {
    pub async fn connect(&self, on_event: Option<EventHandler>) -> CliResult<Client> {
        let config = ConnectConfig {
            timeout: self.connect_timeout,
            ..ConnectConfig::default()
        };
        connect_with_config(&self.endpoint, &config, ClientConfig::default(), on_event)
            .await
            .map_err(|err| rpc_error("connect failed", err))
    }
}

pub async fn run(command: Command, session: &Session) -> CliResult<i32> {
    match command {
        Command::Call(args) => call::run(args, session).await,
        Command::Events(args) => events::run(args, session).await,
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Method name, e.g. `daemon.info` or `core.get_torrents_status`.
    pub method: String,
    /// Positional arguments as JSON (bare words are sent as strings).
    #[arg(value_name = "ARG", allow_negative_numbers = true)]
    pub args: Vec<String>,
    /// Keyword arguments as a JSON object.
    #[arg(long, value_name = "JSON")]
    pub kwargs: Option<String>,
    /// How long to wait for the reply (e.g. 30s, 500ms).
    #[arg(long, default_value = "30s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct EventsArgs {
    /// Ask the daemon to push these events (comma-separated).
    #[arg(long, value_delimiter = ',', value_name = "EVENT")]
    pub register: Vec<String>,
    /// Exit after printing N events.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::usage("duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
