use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::EncodingError;
use crate::fingerprint::Encoding;
use crate::sync::actor::ActorSettings;

pub const DEFAULT_CONFIG_PATH: &str = ".dx/share/config.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareConfig {
    /// Encoding label used for fingerprints, e.g. `"utf-8"`.
    pub encoding: String,
    pub command_capacity: usize,
    pub event_capacity: usize,
    pub outbound_capacity: usize,
    pub offload_threshold_bytes: usize,
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ShareConfig {
    fn default() -> Self {
        let actor = ActorSettings::default();
        Self {
            encoding: Encoding::Utf8.label().to_string(),
            command_capacity: actor.command_capacity,
            event_capacity: actor.event_capacity,
            outbound_capacity: actor.outbound_capacity,
            offload_threshold_bytes: actor.offload_threshold_bytes,
            relay: RelayConfig::default(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl ShareConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config = Self::from_toml_str(&raw)
            .with_context(|| format!("parsing {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.encoding()?;
        Ok(config)
    }

    /// `.dx/share/config.toml` under `root`.
    pub fn default_path(root: impl AsRef<Path>) -> PathBuf {
        root.as_ref().join(DEFAULT_CONFIG_PATH)
    }

    pub fn encoding(&self) -> Result<Encoding, EncodingError> {
        Encoding::from_label(&self.encoding)
    }

    pub fn actor_settings(&self) -> ActorSettings {
        ActorSettings {
            command_capacity: self.command_capacity,
            event_capacity: self.event_capacity,
            outbound_capacity: self.outbound_capacity,
            offload_threshold_bytes: self.offload_threshold_bytes,
        }
    }

    pub fn relay_addr(&self) -> String {
        format!("{}:{}", self.relay.bind, self.relay.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ShareConfig::default();
        assert_eq!(config.encoding().unwrap(), Encoding::Utf8);
        assert_eq!(config.offload_threshold_bytes, 262_144);
        assert_eq!(config.relay_addr(), "0.0.0.0:3000");
        assert_eq!(config.actor_settings(), ActorSettings::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = ShareConfig::from_toml_str(
            r#"
            encoding = "latin-1"

            [relay]
            port = 4100
            "#,
        )
        .unwrap();
        assert_eq!(config.encoding().unwrap(), Encoding::Latin1);
        assert_eq!(config.relay.port, 4100);
        assert_eq!(config.relay.bind, "0.0.0.0");
        assert_eq!(config.command_capacity, 64);
    }

    #[test]
    fn test_unsupported_encoding_is_rejected() {
        assert!(ShareConfig::from_toml_str(r#"encoding = "ebcdic""#).is_err());
    }

    #[test]
    fn test_load_missing_and_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = ShareConfig::default_path(dir.path());
        assert_eq!(ShareConfig::load(&path).unwrap(), ShareConfig::default());

        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "outbound_capacity = 8\n").unwrap();
        assert_eq!(ShareConfig::load(&path).unwrap().outbound_capacity, 8);
    }
}
