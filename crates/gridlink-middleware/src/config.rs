//! Bridge tunables – thread-join timeout, response timeout and poll interval.
//!
//! Defaults suit a broker on the same host.  Values can come from a TOML file
//! and/or `GRIDLINK_*` environment variables.

use std::fs;
use std::path::Path;
use std::time::Duration;

use gridlink_types::BridgeError;
use serde::{Deserialize, Serialize};

/// Timing constants shared by every bridge variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// How long `terminate_connection` waits for a worker thread to exit.
    #[serde(default = "default_thread_join_timeout_ms")]
    pub thread_join_timeout_ms: u64,

    /// Overall budget of one `poll_until_response_received` call.
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,

    /// Bounded wait of a single message retrieval.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_thread_join_timeout_ms() -> u64 {
    2_000
}
fn default_response_timeout_ms() -> u64 {
    1_000
}
fn default_poll_interval_ms() -> u64 {
    10
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            thread_join_timeout_ms: default_thread_join_timeout_ms(),
            response_timeout_ms: default_response_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl BridgeConfig {
    /// Defaults with `GRIDLINK_*` overrides applied.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        apply_env_overrides(&mut cfg);
        cfg
    }

    pub fn thread_join_timeout(&self) -> Duration {
        Duration::from_millis(self.thread_join_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Short timeouts so tests that exercise the deadlines stay fast.
    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self {
            thread_join_timeout_ms: 500,
            response_timeout_ms: 300,
            poll_interval_ms: 5,
        }
    }
}

/// Load the config from `path`.  Returns `None` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<BridgeConfig>, BridgeError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| BridgeError::Config(format!("failed to read {}: {e}", path.display())))?;
    let mut cfg: BridgeConfig = toml::from_str(&raw)
        .map_err(|e| BridgeError::Config(format!("failed to parse {}: {e}", path.display())))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `GRIDLINK_*` environment variable overrides to `cfg`.
///
/// Supported variables:
///
/// | Variable | Config field |
/// |---|---|
/// | `GRIDLINK_THREAD_JOIN_TIMEOUT_MS` | `thread_join_timeout_ms` |
/// | `GRIDLINK_RESPONSE_TIMEOUT_MS` | `response_timeout_ms` |
/// | `GRIDLINK_POLL_INTERVAL_MS` | `poll_interval_ms` |
///
/// Values that do not parse as an integer are ignored.
pub fn apply_env_overrides(cfg: &mut BridgeConfig) {
    apply_overrides_from(cfg, |var| std::env::var(var).ok());
}

/// [`apply_env_overrides`] with the variable lookup supplied by the caller.
pub fn apply_overrides_from<F>(cfg: &mut BridgeConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let millis = |var: &str| -> Option<u64> { lookup(var)?.trim().parse().ok() };
    if let Some(ms) = millis("GRIDLINK_THREAD_JOIN_TIMEOUT_MS") {
        cfg.thread_join_timeout_ms = ms;
    }
    if let Some(ms) = millis("GRIDLINK_RESPONSE_TIMEOUT_MS") {
        cfg.response_timeout_ms = ms;
    }
    if let Some(ms) = millis("GRIDLINK_POLL_INTERVAL_MS") {
        cfg.poll_interval_ms = ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.thread_join_timeout(), Duration::from_secs(2));
        assert_eq!(cfg.response_timeout(), Duration::from_secs(1));
        assert_eq!(cfg.poll_interval(), Duration::from_millis(10));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let result = load_from(&dir.path().join("gridlink.toml")).expect("no error");
        assert!(result.is_none());
    }

    #[test]
    fn load_from_reads_file() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("gridlink.toml");
        fs::write(&path, "response_timeout_ms = 5000\n").expect("write");

        let cfg = load_from(&path).expect("load ok").expect("some");
        assert_eq!(cfg.response_timeout_ms, 5000);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let cfg: BridgeConfig = toml::from_str("poll_interval_ms = 50\n").expect("parse");
        assert_eq!(cfg.poll_interval_ms, 50);
        assert_eq!(cfg.thread_join_timeout_ms, default_thread_join_timeout_ms());
        assert_eq!(cfg.response_timeout_ms, default_response_timeout_ms());
    }

    #[test]
    fn load_from_rejects_malformed_toml() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("gridlink.toml");
        fs::write(&path, "poll_interval_ms = \"soon\"\n").expect("write");

        let err = load_from(&path).unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn roundtrip_through_toml() {
        let cfg = BridgeConfig {
            thread_join_timeout_ms: 750,
            response_timeout_ms: 4_000,
            poll_interval_ms: 25,
        };
        let raw = toml::to_string_pretty(&cfg).expect("serialize");
        let back: BridgeConfig = toml::from_str(&raw).expect("parse");
        assert_eq!(back, cfg);
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn overrides_replace_matching_fields() {
        let mut cfg = BridgeConfig::default();
        apply_overrides_from(
            &mut cfg,
            lookup(&[
                ("GRIDLINK_THREAD_JOIN_TIMEOUT_MS", "123"),
                ("GRIDLINK_POLL_INTERVAL_MS", " 3 "),
            ]),
        );
        assert_eq!(cfg.thread_join_timeout_ms, 123);
        assert_eq!(cfg.poll_interval_ms, 3);
        assert_eq!(cfg.response_timeout_ms, default_response_timeout_ms());
    }

    #[test]
    fn overrides_ignore_invalid_values() {
        let mut cfg = BridgeConfig::default();
        apply_overrides_from(
            &mut cfg,
            lookup(&[
                ("GRIDLINK_RESPONSE_TIMEOUT_MS", "forever"),
                ("GRIDLINK_POLL_INTERVAL_MS", "-5"),
            ]),
        );
        assert_eq!(cfg, BridgeConfig::default());
    }

    #[test]
    fn overrides_apply_on_top_of_file_values() {
        let mut cfg: BridgeConfig = toml::from_str("response_timeout_ms = 5000\npoll_interval_ms = 50\n").expect("parse");
        apply_overrides_from(&mut cfg, lookup(&[("GRIDLINK_POLL_INTERVAL_MS", "20")]));
        assert_eq!(cfg.response_timeout_ms, 5000);
        assert_eq!(cfg.poll_interval_ms, 20);
    }
}
