use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Well-known port of the collector daemon
pub const DEFAULT_PMCD_PORT: u16 = 44321;

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Resolve the client configuration file path based on priority:
/// 1. Explicit path (with tilde expansion)
/// 2. PMCTX_CONFIG environment variable (with tilde expansion)
/// 3. XDG config directory
/// 4. ~/.pmctx/config.toml (fallback for systems without XDG)
pub fn resolve_config_path(explicit_path: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = explicit_path {
        return Ok(expand_tilde(path));
    }

    if let Ok(env_path) = std::env::var("PMCTX_CONFIG") {
        return Ok(expand_tilde(&env_path));
    }

    if let Some(config_dir) = dirs::config_dir() {
        return Ok(config_dir.join("pmctx").join("config.toml"));
    }

    if let Some(home) = dirs::home_dir() {
        return Ok(home.join(".pmctx").join("config.toml"));
    }

    Err(Error::Config(
        "Could not determine config path: no HOME directory or XDG config directory found"
            .to_string(),
    ))
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(stripped);
    }
    PathBuf::from(path)
}

/// Client-side settings shared by every context of a registry.
///
/// Values come from the TOML file first; `PMCD_*` environment variables
/// override them when [`ClientConfig::apply_env`] runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Comma-separated reconnect backoff list in seconds, e.g. "5,10,20"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect_timeout: Option<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_ports")]
    pub pmcd_ports: Vec<u16>,
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_ports() -> Vec<u16> {
    vec![DEFAULT_PMCD_PORT]
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            reconnect_timeout: None,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            pmcd_ports: default_ports(),
        }
    }
}

impl ClientConfig {
    /// Load from the resolved config path, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = Self::default_path()?;
        Ok(Self::load_from(&config_path)?.apply_env())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn default_path() -> Result<PathBuf> {
        resolve_config_path(None)
    }

    /// Override fields from the process environment.
    pub fn apply_env(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Override fields from `lookup`; unparsable numbers are ignored with a
    /// warning.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("PMCD_RECONNECT_TIMEOUT") {
            self.reconnect_timeout = Some(value);
        }
        if let Some(secs) = parse_env_number(&lookup, "PMCD_CONNECT_TIMEOUT") {
            self.connect_timeout_secs = secs;
        }
        if let Some(secs) = parse_env_number(&lookup, "PMCD_REQUEST_TIMEOUT") {
            self.request_timeout_secs = secs;
        }
        if let Some(value) = lookup("PMCD_PORT") {
            let ports: std::result::Result<Vec<u16>, _> = value
                .split(',')
                .map(|p| p.trim().parse::<u16>())
                .collect();
            match ports {
                Ok(ports) if !ports.is_empty() && !ports.contains(&0) => self.pmcd_ports = ports,
                _ => warn!(value = %value, "ignoring bad PMCD_PORT"),
            }
        }
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_env_number<F>(lookup: &F, key: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key)?;
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Some(secs),
        _ => {
            warn!(key, value = %value, "ignoring bad timeout setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.reconnect_timeout, None);
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.pmcd_ports, vec![DEFAULT_PMCD_PORT]);
    }

    #[test]
    fn test_config_save_and_load() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let config = ClientConfig {
            reconnect_timeout: Some("1,2,3".to_string()),
            connect_timeout_secs: 7,
            request_timeout_secs: 30,
            pmcd_ports: vec![44321, 44322],
        };
        config.save_to(&config_path)?;
        assert!(config_path.exists());

        let loaded = ClientConfig::load_from(&config_path)?;
        assert_eq!(loaded, config);
        Ok(())
    }

    #[test]
    fn test_partial_file_fills_defaults() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(&config_path, "reconnect_timeout = \"2,4\"\n")?;

        let loaded = ClientConfig::load_from(&config_path)?;
        assert_eq!(loaded.reconnect_timeout.as_deref(), Some("2,4"));
        assert_eq!(loaded.connect_timeout_secs, 5);
        assert_eq!(loaded.pmcd_ports, vec![DEFAULT_PMCD_PORT]);
        Ok(())
    }

    #[test]
    fn test_load_nonexistent_returns_default() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config = ClientConfig::load_from(&temp_dir.path().join("missing.toml"))?;
        assert_eq!(config, ClientConfig::default());
        Ok(())
    }

    #[test]
    fn test_env_overrides() {
        let vars = env(&[
            ("PMCD_RECONNECT_TIMEOUT", "1,2"),
            ("PMCD_CONNECT_TIMEOUT", "3"),
            ("PMCD_REQUEST_TIMEOUT", "oops"),
            ("PMCD_PORT", "4000,4001"),
        ]);
        let config = ClientConfig::default().apply_overrides(|k| vars.get(k).cloned());
        assert_eq!(config.reconnect_timeout.as_deref(), Some("1,2"));
        assert_eq!(config.connect_timeout_secs, 3);
        assert_eq!(config.request_timeout_secs, 10);
        assert_eq!(config.pmcd_ports, vec![4000, 4001]);
    }

    #[test]
    fn test_bad_port_list_ignored() {
        let vars = env(&[("PMCD_PORT", "4000,zero")]);
        let config = ClientConfig::default().apply_overrides(|k| vars.get(k).cloned());
        assert_eq!(config.pmcd_ports, vec![DEFAULT_PMCD_PORT]);
    }

    #[test]
    fn test_explicit_path_wins() -> Result<()> {
        let path = resolve_config_path(Some("/etc/pmctx.toml"))?;
        assert_eq!(path, PathBuf::from("/etc/pmctx.toml"));
        Ok(())
    }
}
