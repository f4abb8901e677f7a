//! Configuration module - environment variable parsing and tuning files

mod tuning;

pub use tuning::Tuning;

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::protocol::MatchMode;
use crate::util::time::{DEFAULT_SIMULATION_TPS, DEFAULT_SNAPSHOT_TPS};

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit JSON log lines (`LOG_FORMAT=json`)
    pub log_json: bool,
    /// Simulation ticks per second
    pub simulation_tps: u32,
    /// Snapshots broadcast per second
    pub snapshot_tps: u32,
    /// Match seed; random when unset
    pub seed: Option<u64>,
    /// Optional JSON file overriding tuning defaults
    pub tuning_path: Option<PathBuf>,
    /// Mode started by the server binary
    pub mode: MatchMode,
    /// Map started by the server binary
    pub map: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let simulation_tps = parse_var("SIMULATION_TPS", DEFAULT_SIMULATION_TPS)?;
        let snapshot_tps = parse_var("SNAPSHOT_TPS", DEFAULT_SNAPSHOT_TPS)?;
        if simulation_tps == 0 {
            return Err(ConfigError::Invalid {
                name: "SIMULATION_TPS",
                value: "0".to_string(),
            });
        }

        let seed = match env::var("ARENA_SEED") {
            Ok(raw) => Some(raw.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "ARENA_SEED",
                value: raw,
            })?),
            Err(_) => None,
        };

        Ok(Self {
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_json: env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")),
            simulation_tps,
            snapshot_tps,
            seed,
            tuning_path: env::var("ARENA_TUNING").ok().map(PathBuf::from),
            mode: parse_var("ARENA_MODE", MatchMode::FreeForAll)?,
            map: env::var("ARENA_MAP").unwrap_or_else(|_| "foundry".to_string()),
        })
    }

    /// Tuning from `ARENA_TUNING`, or the built-in defaults
    pub fn load_tuning(&self) -> Result<Tuning, ConfigError> {
        match &self.tuning_path {
            Some(path) => load_tuning(path),
            None => Ok(Tuning::default()),
        }
    }
}

/// Read and validate a JSON tuning file. Omitted fields keep their defaults.
pub fn load_tuning(path: &Path) -> Result<Tuning, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let tuning = Tuning::from_json(&raw)?;
    tuning.validate()?;
    Ok(tuning)
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { name, value: raw }),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("Cannot read tuning file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed tuning file: {0}")]
    Tuning(#[from] serde_json::Error),

    #[error("Invalid tuning: {0}")]
    InvalidTuning(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tuning_file_is_reported_with_its_path() {
        let err = load_tuning(Path::new("/nonexistent/arena-tuning.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { ref path, .. } if path.ends_with("arena-tuning.json")));
    }

    #[test]
    fn malformed_tuning_is_a_parse_error() {
        let dir = std::env::temp_dir().join(format!("arena-core-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tuning.json");
        std::fs::write(&path, "{ \"rewards\": 7 }").unwrap();

        assert!(matches!(load_tuning(&path), Err(ConfigError::Tuning(_))));

        std::fs::write(&path, "{ \"timing\": { \"respawn_delay\": 1.5 } }").unwrap();
        let tuning = load_tuning(&path).unwrap();
        assert_eq!(tuning.timing.respawn_delay, 1.5);
        assert_eq!(tuning.timing.lobby_return_delay, 5.0);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
