//! Run configuration
//!
//! Loaded from an optional TOML file; every field has a default so a
//! partial file is fine. The binary applies its flags on top.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};
use crate::reader::DEFAULT_CHUNK_SIZE;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConvertConfig {
    /// Directory for JSON artifacts; CSV goes to its `csv/` subdirectory
    pub output_dir: PathBuf,
    /// Write `T.csv` files
    pub csv: bool,
    /// Write `T.json` files and `healthData.json`
    pub json: bool,
    /// Indent JSON output
    pub pretty: bool,
    /// Bytes read from the export per step
    pub chunk_size: usize,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        ConvertConfig {
            output_dir: PathBuf::from("./data"),
            csv: true,
            json: true,
            pretty: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl ConvertConfig {
    /// Load a TOML configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConvertError::Config {
            message: format!("failed to read config file '{}': {}", path.display(), e),
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: ConvertConfig = toml::from_str(content).map_err(|e| ConvertError::Config {
            message: format!("failed to parse TOML config: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ConvertError::Config {
                message: "chunk_size must be greater than zero".into(),
            });
        }
        if !self.csv && !self.json {
            return Err(ConvertError::Config {
                message: "at least one of csv or json output must be enabled".into(),
            });
        }
        Ok(())
    }

    /// Directory CSV artifacts are written to
    pub fn csv_dir(&self) -> PathBuf {
        self.output_dir.join("csv")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConvertConfig::default();
        assert_eq!(config.output_dir, PathBuf::from("./data"));
        assert!(config.csv && config.json && !config.pretty);
        assert_eq!(config.chunk_size, 64 * 1024);
        assert_eq!(config.csv_dir(), PathBuf::from("./data/csv"));
    }

    #[test]
    fn test_partial_toml() {
        let text = "output_dir = \"/tmp/out\"\npretty = true\n";
        let config = ConvertConfig::from_toml(text).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
        assert!(config.pretty);
        assert!(config.csv);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = ConvertConfig::from_toml("outputdir = \"x\"").unwrap_err();
        assert!(matches!(err, ConvertError::Config { .. }));
    }

    #[test]
    fn test_validation() {
        assert!(ConvertConfig::from_toml("chunk_size = 0").is_err());
        assert!(ConvertConfig::from_toml("csv = false\njson = false").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hktables.toml");
        fs::write(&path, "csv = false\nchunk_size = 4096\n").unwrap();
        let config = ConvertConfig::load(&path).unwrap();
        assert!(!config.csv);
        assert_eq!(config.chunk_size, 4096);

        let missing = ConvertConfig::load(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ConvertError::Config { .. })));
    }
}
