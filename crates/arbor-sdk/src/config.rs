use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SdkError, SdkResult};

/// Node settings, usually loaded from a TOML file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Prefix of the node id (`region + instance_id`).
    pub region: String,
    /// Where blobs (`data/`), logs (`meta/`) and the registry (`registry/`)
    /// live. Everything is kept in memory when unset.
    pub data_dir: Option<PathBuf>,
    pub checkpoint_threshold: usize,
    /// Values larger than this are passed between peers by hash.
    pub large_value_threshold: usize,
    /// Deadline for `update_value` transforms when the caller gives none.
    pub update_timeout_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            region: "AAAA".into(),
            data_dir: None,
            checkpoint_threshold: arbor_ledger::DEFAULT_CHECKPOINT_THRESHOLD,
            large_value_threshold: 1 << 18,
            update_timeout_ms: 30_000,
        }
    }
}

impl NodeConfig {
    pub fn from_toml_str(source: &str) -> SdkResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| SdkError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> SdkResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| SdkError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// A config that persists under `dir`.
    pub fn persistent(dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(dir.into()),
            ..Self::default()
        }
    }

    pub fn update_timeout(&self) -> Duration {
        Duration::from_millis(self.update_timeout_ms)
    }

    pub(crate) fn validate(&self) -> SdkResult<()> {
        if self.region.is_empty() {
            return Err(SdkError::Config("region must not be empty".into()));
        }
        if self.checkpoint_threshold == 0 {
            return Err(SdkError::Config("checkpoint_threshold must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = NodeConfig::default();
        assert_eq!(c.region, "AAAA");
        assert!(c.data_dir.is_none());
        assert_eq!(c.checkpoint_threshold, 1_000_000);
        assert_eq!(c.large_value_threshold, 262_144);
        assert_eq!(c.update_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = NodeConfig::from_toml_str(
            r#"
            region = "EU01"
            data_dir = "/var/lib/arbor"
            "#,
        )
        .unwrap();
        assert_eq!(c.region, "EU01");
        assert_eq!(c.data_dir, Some(PathBuf::from("/var/lib/arbor")));
        assert_eq!(c.large_value_threshold, 262_144);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        assert!(matches!(
            NodeConfig::from_toml_str("region = 5"),
            Err(SdkError::Config(_))
        ));
        assert!(matches!(
            NodeConfig::from_toml_str("region = \"\""),
            Err(SdkError::Config(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        std::fs::write(&path, "update_timeout_ms = 250\n").unwrap();
        let c = NodeConfig::load(&path).unwrap();
        assert_eq!(c.update_timeout(), Duration::from_millis(250));
        assert!(NodeConfig::load(dir.path().join("missing.toml")).is_err());
    }
}
