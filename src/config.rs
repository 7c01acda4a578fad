use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::limits::DEFAULT_STORAGE_TIMEOUT;
use crate::model::Room;

pub const WAL_FILE_NAME: &str = "innkeep.wal";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Process settings, read from `INNKEEP_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub storage_timeout: Duration,
    /// Appends since the last compaction before the compactor rewrites the log.
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    /// JSON array of `{ "id", "name" }`. Default rooms are seeded when unset.
    pub rooms_file: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            storage_timeout: DEFAULT_STORAGE_TIMEOUT,
            compact_threshold: 1000,
            metrics_port: None,
            rooms_file: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults, set but
    /// unparseable ones are an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(dir) = lookup("INNKEEP_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(ms) = parse(&lookup, "INNKEEP_STORAGE_TIMEOUT_MS")? {
            if ms == 0 {
                return Err(ConfigError::Invalid {
                    var: "INNKEEP_STORAGE_TIMEOUT_MS",
                    value: "0".into(),
                });
            }
            config.storage_timeout = Duration::from_millis(ms);
        }
        if let Some(threshold) = parse(&lookup, "INNKEEP_COMPACT_THRESHOLD")? {
            config.compact_threshold = threshold;
        }
        config.metrics_port = parse(&lookup, "INNKEEP_METRICS_PORT")?;
        config.rooms_file = lookup("INNKEEP_ROOMS_FILE").map(PathBuf::from);
        Ok(config)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(WAL_FILE_NAME)
    }

    /// Rooms to seed at startup.
    pub fn load_rooms(&self) -> Result<Vec<Room>, ConfigError> {
        match &self.rooms_file {
            Some(path) => read_rooms(path),
            None => Ok(default_rooms()),
        }
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    lookup(var)
        .map(|value| value.trim().parse().map_err(|_| ConfigError::Invalid { var, value }))
        .transpose()
}

fn read_rooms(path: &Path) -> Result<Vec<Room>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn default_rooms() -> Vec<Room> {
    vec![
        Room { id: 1, name: "General's Quarters".into() },
        Room { id: 2, name: "Major's Suite".into() },
    ]
}
