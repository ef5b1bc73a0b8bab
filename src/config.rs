//! Dashboard configuration
//!
//! Resolution order: defaults → ~/.config/agentdeck/config.json → environment.
//! CLI flags are applied on top by the binary.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{DashboardError, Result};
use crate::layout::{sanitize_split, DEFAULT_AGENT_SPLIT};
use crate::logbuf::DEFAULT_LOG_CAPACITY;
use crate::ring::DEFAULT_OUTPUT_CAPACITY;

const APP_NAME: &str = "agentdeck";

/// Get config directory (~/.config/agentdeck/)
pub fn config_dir() -> Result<PathBuf> {
    let base = dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .ok_or(DashboardError::NoConfigDir)?;
    Ok(base.join(APP_NAME))
}

/// Get config file path
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.json"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Log entries retained
    pub log_capacity: usize,

    /// Output lines retained per agent
    pub output_capacity: usize,

    /// Fraction of content height given to the agent panel
    pub agent_split: f64,

    /// Show the log panel on startup
    pub show_logs: bool,

    /// Rate-limit countdown refresh (ms)
    pub tick_ms: u64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            log_capacity: DEFAULT_LOG_CAPACITY,
            output_capacity: DEFAULT_OUTPUT_CAPACITY,
            agent_split: DEFAULT_AGENT_SPLIT,
            show_logs: true,
            tick_ms: 1000,
        }
    }
}

impl DashboardConfig {
    /// Defaults, then the user config file, then environment overrides
    pub fn load() -> Result<Self> {
        Self::load_with(config_path(), |key| std::env::var(key).ok())
    }

    /// Without a config directory the file layer is skipped; env still applies.
    fn load_with<F>(path: Result<PathBuf>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = match path {
            Ok(path) => Self::load_from(&path)?,
            Err(e) => {
                warn!(error = %e, "no config directory, using defaults");
                Self::default()
            }
        };
        cfg.apply_env(lookup);
        Ok(cfg)
    }

    /// Load from a specific file; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|source| DashboardError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: DashboardConfig =
            serde_json::from_str(&content).map_err(|source| DashboardError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(cfg.sanitized())
    }

    /// Apply `AGENTDECK_*` overrides. Unparseable values are skipped.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_env(&lookup, "AGENTDECK_LOG_CAPACITY") {
            self.log_capacity = v;
        }
        if let Some(v) = parse_env(&lookup, "AGENTDECK_OUTPUT_CAPACITY") {
            self.output_capacity = v;
        }
        if let Some(v) = parse_env(&lookup, "AGENTDECK_AGENT_SPLIT") {
            self.agent_split = v;
        }
        if let Some(raw) = lookup("AGENTDECK_SHOW_LOGS") {
            match parse_bool(&raw) {
                Some(v) => self.show_logs = v,
                None => warn!(value = %raw, "ignoring AGENTDECK_SHOW_LOGS"),
            }
        }
        *self = self.clone().sanitized();
    }

    fn sanitized(mut self) -> Self {
        let split = sanitize_split(self.agent_split);
        if split != self.agent_split {
            warn!(split = self.agent_split, "agent_split out of range, using default");
            self.agent_split = split;
        }
        self.log_capacity = self.log_capacity.max(1);
        self.output_capacity = self.output_capacity.max(1);
        self.tick_ms = self.tick_ms.max(100);
        self
    }
}

fn parse_env<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparseable environment override");
            None
        }
    }
}

pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_default() {
        let cfg = DashboardConfig::default();
        assert_eq!(cfg.log_capacity, 500);
        assert_eq!(cfg.agent_split, 0.65);
        assert!(cfg.show_logs);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = DashboardConfig::load_from(&dir.path().join("nope.json")).unwrap();
        assert_eq!(cfg, DashboardConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"log_capacity": 50, "agent_split": 3.0}"#).unwrap();
        let cfg = DashboardConfig::load_from(&path).unwrap();
        assert_eq!(cfg.log_capacity, 50);
        assert_eq!(cfg.agent_split, DEFAULT_AGENT_SPLIT, "out-of-range split replaced");
        assert_eq!(cfg.output_capacity, DEFAULT_OUTPUT_CAPACITY);
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        let err = DashboardConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, DashboardError::ConfigParse { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let mut cfg = DashboardConfig::default();
        cfg.apply_env(env(&[
            ("AGENTDECK_LOG_CAPACITY", "42"),
            ("AGENTDECK_AGENT_SPLIT", "0.5"),
            ("AGENTDECK_SHOW_LOGS", "no"),
            ("AGENTDECK_OUTPUT_CAPACITY", "lots"),
        ]));
        assert_eq!(cfg.log_capacity, 42);
        assert_eq!(cfg.agent_split, 0.5);
        assert!(!cfg.show_logs);
        assert_eq!(cfg.output_capacity, DEFAULT_OUTPUT_CAPACITY);
    }

    #[test]
    fn test_config_serialize() {
        let cfg = DashboardConfig {
            log_capacity: 7,
            ..Default::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"log_capacity\":7"));
    }

    #[test]
    fn test_no_config_dir_falls_back_to_defaults() {
        let cfg = DashboardConfig::load_with(
            Err(DashboardError::NoConfigDir),
            env(&[("AGENTDECK_LOG_CAPACITY", "9")]),
        )
        .unwrap();
        assert_eq!(cfg.log_capacity, 9);
        assert_eq!(cfg.agent_split, DEFAULT_AGENT_SPLIT);
    }

    #[test]
    fn test_load_with_reads_file_then_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"log_capacity": 50, "show_logs": false}"#).unwrap();
        let cfg = DashboardConfig::load_with(Ok(path), env(&[("AGENTDECK_SHOW_LOGS", "on")])).unwrap();
        assert_eq!(cfg.log_capacity, 50);
        assert!(cfg.show_logs);
    }
}
