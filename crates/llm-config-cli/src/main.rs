//! `llm-config`: resolve configuration keys and inspect backend readiness
//!
//! # Usage
//!
//! ```bash
//! # Resolve keys through secret store, flags, environment and defaults
//! llm-config resolve DATABASE_URL REDIS_URL --default REDIS_URL=redis://localhost:6379
//!
//! # Backend state and health, with settings read from a file
//! llm-config --settings layers.toml status --json
//!
//! # Block until both backends are ready (for init containers)
//! llm-config wait --timeout-ms 30000 --retry-ms 1000
//! ```
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Required keys missing
//! - 2: A backend did not become ready
//! - 3: Invalid settings or environment
//! - 10: Internal error

mod commands;
mod output;

use clap::Parser;
use colored::Colorize;
use commands::Cli;
use output::ExitCode;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8, json: bool) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let exit_code = match commands::run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {:#}", "error:".red().bold(), err);
            ExitCode::InternalError
        }
    };
    std::process::exit(exit_code.into());
}
