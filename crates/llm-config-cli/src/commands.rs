//! Command definitions and execution

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use llm_config_layers::{ConfigResolver, EnvSnapshot, ProviderError, SubsystemSettings};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use crate::output::{self, ExitCode, StatusReport};

/// Resolve layered configuration and inspect backend readiness
#[derive(Parser, Debug)]
#[command(name = "llm-config")]
#[command(about = "Layered configuration: secret store > feature flags > environment > default", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Read backend settings from a TOML or YAML file instead of the environment
    #[arg(long, global = true, env = "LLM_CONFIG_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Layer a .env file under the process environment
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,

    /// Log verbosity (-v, -vv); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve one or more keys
    Resolve {
        /// Keys to resolve
        #[arg(required = true)]
        keys: Vec<String>,

        /// Default for a key, as KEY=VALUE (repeatable)
        #[arg(short, long = "default", value_parser = parse_key_value)]
        defaults: Vec<(String, String)>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,

        /// Print secret-store values instead of masking them
        #[arg(long)]
        reveal: bool,

        /// Exit with status 1 if any key resolves to nothing
        #[arg(long)]
        require: bool,
    },

    /// Show backend state, health and sanitized settings
    Status {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Wait until both backends are ready
    Wait {
        /// Overall deadline in milliseconds
        #[arg(long, default_value_t = 30_000)]
        timeout_ms: u64,

        /// Delay between readiness checks in milliseconds
        #[arg(long, default_value_t = 1_000)]
        retry_ms: u64,
    },
}

/// Parse `KEY=VALUE`; the value may contain `=`
pub fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

fn build_resolver(cli: &Cli) -> anyhow::Result<ConfigResolver> {
    let mut env = EnvSnapshot::from_process();
    if let Some(path) = &cli.env_file {
        env = env
            .with_dotenv(path)
            .with_context(|| format!("loading {}", path.display()))?;
    }

    let settings = match &cli.settings {
        Some(path) => SubsystemSettings::from_file(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => SubsystemSettings::from_env(&env).context("reading settings from environment")?,
    };

    let resolver = ConfigResolver::from_settings(settings, env)?;
    debug!(tiers = ?resolver.tier_names(), "Resolver built");
    Ok(resolver)
}

/// Execute the parsed command
pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let resolver = match build_resolver(&cli) {
        Ok(resolver) => resolver,
        Err(err) => {
            output::print_error(&err);
            return Ok(ExitCode::InvalidConfig);
        }
    };

    match cli.command {
        Commands::Resolve {
            keys,
            defaults,
            json,
            reveal,
            require,
        } => {
            if let Err(err) = resolver.initialize().await {
                output::print_error(&err);
                return Ok(ExitCode::NotReady);
            }

            let defaults: HashMap<String, String> = defaults.into_iter().collect();
            let resolved = match resolver.get_configs_with_metadata(&keys, &defaults).await {
                Ok(resolved) => resolved,
                Err(err @ ProviderError::Fetch { .. }) => {
                    output::print_error(&err);
                    return Ok(ExitCode::NotReady);
                }
                Err(err) => return Err(err.into()),
            };

            output::print_resolved(&keys, &resolved, json, reveal)?;

            let missing = keys
                .iter()
                .any(|key| resolved.get(key).map_or(true, |r| !r.found));
            Ok(if require && missing {
                ExitCode::MissingKeys
            } else {
                ExitCode::Success
            })
        }

        Commands::Status { json } => {
            let init_error = resolver.initialize().await.err();
            let report = StatusReport::collect(&resolver, init_error.as_ref());
            output::print_status(&report, json)?;
            Ok(if report.all_healthy() {
                ExitCode::Success
            } else {
                ExitCode::NotReady
            })
        }

        Commands::Wait {
            timeout_ms,
            retry_ms,
        } => {
            let waited = resolver
                .wait_for_ready(
                    Duration::from_millis(timeout_ms),
                    Duration::from_millis(retry_ms),
                )
                .await;
            match waited {
                Ok(()) => {
                    output::print_ready();
                    Ok(ExitCode::Success)
                }
                Err(err) => {
                    output::print_error(&err);
                    Ok(ExitCode::NotReady)
                }
            }
        }
    }
}
