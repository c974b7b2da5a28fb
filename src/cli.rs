extern crate webrcon;

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use webrcon::logging::{init_logging, LogConfig};
use webrcon::{
    run_with_retries, send_command, ConnectOptions, Endpoint, Interrupt, RconError, RetryOutcome,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "RCON client for Rust game servers using WebSockets", long_about = None)]
struct Args {
    /// Server hostname or IP address
    #[arg(short = 'H', long, env = "RCON_HOST")]
    host: String,
    /// Server RCON port
    #[arg(short = 'P', long, env = "RCON_PORT")]
    port: u16,
    /// RCON password
    #[arg(short = 'p', long, env = "RCON_PASSWORD", hide_env_values = true)]
    password: String,
    /// Command to execute; multiple words are joined with spaces
    #[arg(short, long, num_args = 1.., required = true)]
    command: Vec<String>,
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
    /// Print the raw JSON response
    #[arg(long)]
    raw: bool,
    /// Connect / execute attempts before giving up
    #[arg(short, long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
    retries: u32,
    #[arg(long, value_parser = parse_timeout, default_value = "10s")]
    connect_timeout: Duration,
    /// How long to wait for the reply; waits indefinitely when unset
    #[arg(long, value_parser = parse_timeout)]
    reply_timeout: Option<Duration>,
}

fn parse_timeout(s: &str) -> Result<Duration, String> {
    let timeout = humantime::parse_duration(s).map_err(|e| e.to_string())?;
    if timeout.is_zero() {
        return Err("timeout must be greater than zero".into());
    }
    Ok(timeout)
}

/// Only exhausted retries came through the per-attempt reporting; anything
/// else ended the run without being retried.
fn failure_message(e: &RconError) -> String {
    match e {
        RconError::RetriesExhausted { .. } => format!("RCON Error: {}", e),
        _ => format!("An unexpected error occurred: {}", e),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(&LogConfig::for_verbosity(args.verbose)) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    let interrupt = Interrupt::new();
    if let Err(e) = interrupt.install() {
        eprintln!("An unexpected error occurred: {}", e);
        return ExitCode::FAILURE;
    }

    let endpoint = Endpoint::new(args.host, args.port, args.password);
    let options = ConnectOptions {
        connect_timeout: args.connect_timeout,
        reply_timeout: args.reply_timeout,
        ..ConnectOptions::default()
    };
    let command = args.command.join(" ");

    let outcome = run_with_retries(args.retries, &interrupt, |attempt| {
        tracing::debug!(attempt, "connecting to {}:{}", endpoint.host(), endpoint.port());
        send_command(&endpoint, &options, &interrupt, &command)
    });

    match outcome {
        Ok(RetryOutcome::Completed(response)) => {
            if args.raw {
                match response.to_pretty_json() {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("An unexpected error occurred: {}", e);
                        return ExitCode::FAILURE;
                    }
                }
            } else {
                println!("Server response:");
                println!("{}", response.message_or_default());
            }
            ExitCode::SUCCESS
        }
        Ok(RetryOutcome::Interrupted) => {
            eprintln!("\nOperation interrupted by user.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", failure_message(&e));
            ExitCode::FAILURE
        }
    }
}
