//! Environment snapshot
//!
//! Backend clients never read the process environment directly. They are
//! handed an `EnvSnapshot` at construction, captured from the process,
//! built from explicit pairs (tests), or layered over a `.env` file.
//!
//! # Example
//!
//! ```rust,ignore
//! use llm_config_layers::providers::EnvSnapshot;
//!
//! let env = EnvSnapshot::from_process().with_dotenv(".env")?;
//! let url = env.get("DATABASE_URL");
//! ```

use super::traits::{
    ConfigProvider, ConfigSource, ProviderError, ProviderResult, ResolvedValue, TierHit,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// An immutable view of environment variables
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    vars: Arc<HashMap<String, String>>,
}

impl EnvSnapshot {
    /// Capture the current process environment
    ///
    /// Variables whose name or value is not valid UTF-8 are skipped.
    pub fn from_process() -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        Self {
            vars: Arc::new(vars),
        }
    }

    /// Build a snapshot from explicit key/value pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: Arc::new(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// An empty snapshot
    pub fn empty() -> Self {
        Self::default()
    }

    /// Layer a `.env` file underneath this snapshot
    ///
    /// Variables already present in the snapshot win over the file.
    pub fn with_dotenv(self, path: impl AsRef<Path>) -> ProviderResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ProviderError::ConfigurationError(format!(
                ".env file not found: {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        let mut merged = parse_dotenv(&content);
        merged.extend(self.vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(Self {
            vars: Arc::new(merged),
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// A non-blank value, trimmed
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    /// Parse a boolean variable; blank counts as unset
    pub fn parse_bool(&self, key: &str) -> ProviderResult<Option<bool>> {
        let Some(raw) = self.get_non_empty(key) else {
            return Ok(None);
        };
        match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ProviderError::ConfigurationError(format!(
                "{} must be a boolean, got '{}'",
                key, raw
            ))),
        }
    }

    /// Parse an unsigned integer variable; blank counts as unset
    pub fn parse_u64(&self, key: &str) -> ProviderResult<Option<u64>> {
        let Some(raw) = self.get_non_empty(key) else {
            return Ok(None);
        };
        raw.parse::<u64>().map(Some).map_err(|_| {
            ProviderError::ConfigurationError(format!(
                "{} must be a non-negative integer, got '{}'",
                key, raw
            ))
        })
    }

    /// Last two steps of every fallback chain: this snapshot, then `default`
    pub fn resolve_fallback(&self, key: &str, default: Option<&str>) -> ResolvedValue {
        if let Some(value) = self.get(key) {
            return ResolvedValue::found(value, ConfigSource::Environment);
        }
        match default {
            Some(value) => ResolvedValue::found(value, ConfigSource::Default),
            None => ResolvedValue::not_found(),
        }
    }
}

/// Parse `.env` content into key/value pairs
///
/// Supports comments, `export` prefixes, single or double quotes and the
/// `\n`, `\t`, `\r` escapes.
fn parse_dotenv(content: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let Some(eq_pos) = line.find('=') else {
            continue;
        };
        let key = line[..eq_pos].trim();
        if key.is_empty() {
            continue;
        }
        let mut value = line[eq_pos + 1..].trim().to_string();

        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            value = value[1..value.len() - 1].to_string();
        }

        value = value
            .replace("\\n", "\n")
            .replace("\\t", "\t")
            .replace("\\r", "\r");

        vars.insert(key.to_string(), value);
    }

    vars
}

#[async_trait::async_trait]
impl ConfigProvider for EnvSnapshot {
    fn name(&self) -> &str {
        "environment"
    }

    fn source(&self) -> ConfigSource {
        ConfigSource::Environment
    }

    async fn lookup(&self, key: &str) -> ProviderResult<Option<TierHit>> {
        Ok(self
            .get(key)
            .map(|v| TierHit::fresh(v, ConfigSource::Environment)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_pairs_lookup() {
        let env = EnvSnapshot::from_pairs([("ENV_CONFIG", "environment-value")]);
        assert_eq!(env.get("ENV_CONFIG"), Some("environment-value"));
        assert_eq!(env.get("MISSING"), None);
        assert_eq!(env.len(), 1);
    }

    #[test]
    fn test_parse_bool() {
        let env = EnvSnapshot::from_pairs([
            ("A", "true"),
            ("B", "0"),
            ("C", "  "),
            ("D", "maybe"),
        ]);
        assert_eq!(env.parse_bool("A").unwrap(), Some(true));
        assert_eq!(env.parse_bool("B").unwrap(), Some(false));
        assert_eq!(env.parse_bool("C").unwrap(), None);
        assert_eq!(env.parse_bool("MISSING").unwrap(), None);
        assert!(matches!(
            env.parse_bool("D"),
            Err(ProviderError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_parse_u64_rejects_malformed() {
        let env = EnvSnapshot::from_pairs([("TTL", "300000"), ("BAD", "-5"), ("WORDS", "5m")]);
        assert_eq!(env.parse_u64("TTL").unwrap(), Some(300_000));
        assert!(env.parse_u64("BAD").is_err());
        assert!(env.parse_u64("WORDS").is_err());
    }

    #[test]
    fn test_parse_dotenv() {
        let vars = parse_dotenv(
            "# comment\n\nexport APP_NAME=demo\nQUOTED=\"with spaces\"\nSINGLE='x'\nMULTI=\"a\\nb\"\nNOEQ\n",
        );
        assert_eq!(vars.get("APP_NAME").map(String::as_str), Some("demo"));
        assert_eq!(vars.get("QUOTED").map(String::as_str), Some("with spaces"));
        assert_eq!(vars.get("SINGLE").map(String::as_str), Some("x"));
        assert_eq!(vars.get("MULTI").map(String::as_str), Some("a\nb"));
        assert!(!vars.contains_key("NOEQ"));
    }

    #[test]
    fn test_with_dotenv_snapshot_wins() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "SHARED=from-file").unwrap();
        writeln!(file, "FILE_ONLY=file").unwrap();

        let env = EnvSnapshot::from_pairs([("SHARED", "from-process")])
            .with_dotenv(file.path())
            .unwrap();

        assert_eq!(env.get("SHARED"), Some("from-process"));
        assert_eq!(env.get("FILE_ONLY"), Some("file"));
    }

    #[test]
    fn test_with_dotenv_missing_file() {
        let result = EnvSnapshot::empty().with_dotenv("/definitely/not/here/.env");
        assert!(matches!(result, Err(ProviderError::ConfigurationError(_))));
    }

    #[test]
    fn test_resolve_fallback() {
        let env = EnvSnapshot::from_pairs([("K", "env")]);
        assert_eq!(
            env.resolve_fallback("K", Some("d")),
            ResolvedValue::found("env", ConfigSource::Environment)
        );
        assert_eq!(
            env.resolve_fallback("X", Some("d")),
            ResolvedValue::found("d", ConfigSource::Default)
        );
        assert_eq!(env.resolve_fallback("X", None), ResolvedValue::not_found());
    }

    #[tokio::test]
    async fn test_lookup_reports_environment_source() {
        let env = EnvSnapshot::from_pairs([("K", "")]);
        let hit = env.lookup("K").await.unwrap().unwrap();
        assert_eq!(hit.value, "");
        assert_eq!(hit.source, ConfigSource::Environment);
        assert!(!hit.cached);
        assert!(env.lookup("NOPE").await.unwrap().is_none());
    }
}
