mod cmd;
mod convert;
mod exit;
mod logging;
mod output;

use clap::Parser;
use delugemux_transport::Endpoint;

use crate::cmd::{parse_duration, Command, Session};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "delugemux", version, about = "Deluge daemon RPC client")]
struct Cli {
    /// Daemon endpoint: host:port, [v6]:port or unix:/path.
    #[arg(
        long,
        short = 'c',
        value_name = "ENDPOINT",
        env = "DELUGE_DAEMON",
        default_value = "127.0.0.1:58846",
        global = true
    )]
    connect: Endpoint,

    /// Connection timeout (e.g. 5s, 500ms).
    #[arg(long, value_name = "DURATION", default_value = "5s", global = true)]
    connect_timeout: String,

    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let result = match parse_duration(&cli.connect_timeout) {
        Ok(connect_timeout) => {
            let session = Session {
                endpoint: cli.connect,
                connect_timeout,
                format: cli.format.unwrap_or_else(OutputFormat::default_for_stdout),
            };
            cmd::run(cli.command, &session).await
        }
        Err(err) => Err(err),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}
