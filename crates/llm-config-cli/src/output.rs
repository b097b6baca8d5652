//! Rendering of command results
//!
//! Results go to stdout as a colored table or as JSON; errors go to stderr.

use colored::Colorize;
use llm_config_layers::{
    ConfigResolver, ConfigSource, InitializationState, ProviderError, ResolvedValue,
    ResolverHealthSummary, SanitizedFlagServiceConfig, SanitizedSecretStoreConfig,
};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Write};

/// Process exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    MissingKeys = 1,
    NotReady = 2,
    InvalidConfig = 3,
    InternalError = 10,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

const MASK: &str = "********";

pub fn print_error(err: &dyn fmt::Display) {
    eprintln!("{} {:#}", "error:".red().bold(), err);
}

pub fn print_ready() {
    println!("{} all backends ready", "+".green());
}

/// One resolved key as printed
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedRow {
    pub key: String,
    pub value: Option<String>,
    pub source: Option<ConfigSource>,
    pub found: bool,
    pub cached: bool,
    pub masked: bool,
}

impl ResolvedRow {
    fn new(key: &str, resolved: Option<&ResolvedValue>, reveal: bool) -> Self {
        let Some(resolved) = resolved else {
            return Self {
                key: key.to_string(),
                value: None,
                source: None,
                found: false,
                cached: false,
                masked: false,
            };
        };

        let masked = !reveal
            && resolved.value.is_some()
            && resolved.source == Some(ConfigSource::RemoteSecret);
        Self {
            key: key.to_string(),
            value: if masked {
                Some(MASK.to_string())
            } else {
                resolved.value.clone()
            },
            source: resolved.source,
            found: resolved.found,
            cached: resolved.cached,
            masked,
        }
    }
}

/// Rows in the order the keys were requested
pub fn resolved_rows(
    keys: &[String],
    resolved: &HashMap<String, ResolvedValue>,
    reveal: bool,
) -> Vec<ResolvedRow> {
    keys.iter()
        .map(|key| ResolvedRow::new(key, resolved.get(key), reveal))
        .collect()
}

pub fn print_resolved(
    keys: &[String],
    resolved: &HashMap<String, ResolvedValue>,
    json: bool,
    reveal: bool,
) -> anyhow::Result<()> {
    let rows = resolved_rows(keys, resolved, reveal);
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let mut stdout = io::stdout();
    let width = rows.iter().map(|r| r.key.len()).max().unwrap_or(0);
    for row in &rows {
        if !row.found {
            writeln!(
                stdout,
                "{} {:width$}  {}",
                "x".red(),
                row.key,
                "(not found)".dimmed(),
                width = width
            )?;
            continue;
        }

        let source = row.source.map(|s| s.to_string()).unwrap_or_default();
        let source = if row.cached {
            format!("{}, cached", source)
        } else {
            source
        };
        writeln!(
            stdout,
            "{} {:width$}  {}  {}",
            "+".green(),
            row.key,
            row.value.as_deref().unwrap_or_default(),
            format!("[{}]", source).dimmed(),
            width = width
        )?;
    }
    stdout.flush()?;
    Ok(())
}

/// State of one backend client
#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus<C> {
    pub enabled: bool,
    pub state: InitializationState,
    pub ready: bool,
    pub operational: bool,
    pub config: C,
}

/// Everything `status` reports
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub tiers: Vec<String>,
    pub secret_store: BackendStatus<SanitizedSecretStoreConfig>,
    pub feature_flags: BackendStatus<SanitizedFlagServiceConfig>,
    pub health: ResolverHealthSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init_error: Option<String>,
}

impl StatusReport {
    pub fn collect(resolver: &ConfigResolver, init_error: Option<&ProviderError>) -> Self {
        let credentials = resolver.credentials();
        let flags = resolver.flags();
        Self {
            tiers: resolver.tier_names().into_iter().map(String::from).collect(),
            secret_store: BackendStatus {
                enabled: credentials.is_enabled(),
                state: credentials.state(),
                ready: credentials.is_ready(),
                operational: credentials.is_operational(),
                config: credentials.sanitized_config(),
            },
            feature_flags: BackendStatus {
                enabled: flags.is_enabled(),
                state: flags.state(),
                ready: flags.is_ready(),
                operational: flags.is_operational(),
                config: flags.sanitized_config(),
            },
            health: resolver.health_summary(),
            init_error: init_error.map(|e| e.to_string()),
        }
    }

    pub fn all_healthy(&self) -> bool {
        self.init_error.is_none() && self.health.all_healthy()
    }
}

fn write_backend<C>(
    stdout: &mut io::Stdout,
    name: &str,
    status: &BackendStatus<C>,
) -> io::Result<()> {
    let icon = if !status.enabled {
        "-".dimmed()
    } else if status.operational {
        "+".green()
    } else if status.ready {
        "!".yellow()
    } else {
        "x".red()
    };
    let detail = if status.enabled {
        format!(
            "{} (ready: {}, operational: {})",
            status.state, status.ready, status.operational
        )
    } else {
        "disabled".to_string()
    };
    writeln!(stdout, "{} {:14} {}", icon, name, detail)
}

pub fn print_status(report: &StatusReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let mut stdout = io::stdout();
    writeln!(stdout, "{}", "Configuration Backends".cyan().bold())?;
    writeln!(stdout, "{}", "=".repeat(60))?;
    writeln!(stdout, "Precedence: {}", report.tiers.join(" > "))?;
    writeln!(stdout)?;

    write_backend(&mut stdout, "secret_store", &report.secret_store)?;
    write_backend(&mut stdout, "feature_flags", &report.feature_flags)?;

    let secrets = &report.secret_store.config;
    writeln!(
        stdout,
        "  {} {} project={} env={} identity={}",
        "secret_store:".dimmed(),
        secrets.site_url,
        secrets.project_id.as_deref().unwrap_or("-"),
        secrets.environment,
        secrets.has_client_id && secrets.has_client_secret
    )?;
    let flags = &report.feature_flags.config;
    writeln!(
        stdout,
        "  {} {} app={} env={} token={}",
        "feature_flags:".dimmed(),
        flags.url.as_deref().unwrap_or("-"),
        flags.app_name,
        flags.environment,
        flags.has_api_token
    )?;
    writeln!(stdout)?;

    writeln!(stdout, "{}", "Health:".cyan().bold())?;
    for provider in &report.health.providers {
        let icon = if provider.healthy {
            "+".green()
        } else {
            "x".red()
        };
        match &provider.message {
            Some(message) => writeln!(stdout, "  {} {}: {}", icon, provider.provider, message)?,
            None => writeln!(stdout, "  {} {}", icon, provider.provider)?,
        }
    }
    writeln!(
        stdout,
        "  {}/{} healthy",
        report.health.healthy_providers, report.health.total_providers
    )?;

    if let Some(err) = &report.init_error {
        writeln!(stdout)?;
        writeln!(stdout, "{} {}", "Initialization:".red().bold(), err)?;
    }

    stdout.flush()?;
    Ok(())
}
