// Error types for the fallible boundaries of the simulation.
//
// The tick path itself is total: out-of-range geometry is clipped and
// rejected ability grants are reported as `false`. Only loading external
// data (level files, config files) can fail.
//
// See also: `level.rs` (`LevelDef::from_json`, `LevelDef::validate`),
// `config.rs` (`GameConfig::from_json`).

use thiserror::Error;

/// Failure to load or validate a level definition.
#[derive(Debug, Error)]
pub enum LevelError {
    #[error("failed to parse level: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("level name is empty")]
    EmptyLevelName,

    #[error("release rate must be a positive finite number, got {0}")]
    InvalidReleaseRate(f32),

    #[error("time limit must be a positive finite number of seconds, got {0}")]
    InvalidTimeLimit(f32),

    #[error("level requires {required} saves but only releases {total} lemmings")]
    UnreachableRequirement { required: u32, total: u32 },
}

/// Failure to load a game configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}
