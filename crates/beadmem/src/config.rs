//! `beadmem.toml`.
//!
//! Every table and field is optional; an empty file is the default
//! configuration.

use beadmem_engine::EngineConfig;
use beadmem_sync::SyncConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid toml at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Keep entries in process when the engine is unreachable.
    pub local_fallback: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeadmemConfig {
    pub engine: EngineConfig,
    pub sync: SyncConfig,
    pub memory: MemoryConfig,
}

impl BeadmemConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        parse(&text, &path.display().to_string())
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        parse(text, "<inline>")
    }
}

fn parse(text: &str, path: &str) -> Result<BeadmemConfig, ConfigError> {
    toml::from_str(text).map_err(|source| ConfigError::Parse {
        path: path.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use beadmem_sync::ConflictStrategy;
    use std::path::PathBuf;

    #[test]
    fn empty_text_is_default() {
        let config = BeadmemConfig::from_toml_str("").expect("parse");
        assert_eq!(config, BeadmemConfig::default());
        assert_eq!(config.engine.program, PathBuf::from("bd"));
        assert_eq!(config.engine.timeouts.query_secs, 10);
        assert_eq!(config.sync.debounce_secs, 5);
        assert!(!config.memory.local_fallback);
    }

    #[test]
    fn partial_tables_keep_remaining_defaults() {
        let config = BeadmemConfig::from_toml_str(
            r#"
            [engine]
            program = "/opt/bd/bin/bd"
            [engine.timeouts]
            compaction_secs = 300

            [sync]
            conflict_strategy = "theirs"

            [memory]
            local_fallback = true
            "#,
        )
        .expect("parse");
        assert_eq!(config.engine.program, PathBuf::from("/opt/bd/bin/bd"));
        assert_eq!(config.engine.timeouts.compaction_secs, 300);
        assert_eq!(config.engine.timeouts.single_record_secs, 5);
        assert_eq!(config.sync.conflict_strategy, ConflictStrategy::Theirs);
        assert!(config.sync.flush_on_commit);
        assert!(config.memory.local_fallback);
    }

    #[test]
    fn unknown_strategy_is_a_parse_error() {
        let err = BeadmemConfig::from_toml_str("[sync]\nconflict_strategy = \"merge\"\n")
            .expect_err("bad strategy");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = BeadmemConfig::load(dir.path().join("beadmem.toml")).expect_err("missing");
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
