//! Environment-driven configuration
//!
//! | Variable | Default |
//! |---|---|
//! | `PRIVI_STREAM_TREE_LEVELS` | 21 |
//! | `PRIVI_CHECKPOINT_TREE_LEVELS` | 23 |
//! | `PRIVI_PROVER_TIMEOUT_SECS` | unset (no timeout) |
//! | `PRIVI_SNARKJS_BIN` | `snarkjs` |
//! | `PRIVI_CIRCUITS_DIR` | `./circuits` |
//!
//! A set-but-malformed variable is an error, never a silent default: a wrong
//! tree depth yields roots the ledger never had.

#![forbid(unsafe_code)]

use std::{path::PathBuf, str::FromStr, time::Duration};

use crate::{
    constants::{CHECKPOINT_TREE_LEVELS, STREAM_TREE_LEVELS},
    merkle::MAX_LEVELS,
};

/// Stream tree depth override.
pub const ENV_STREAM_TREE_LEVELS: &str = "PRIVI_STREAM_TREE_LEVELS";
/// Checkpoint tree depth override.
pub const ENV_CHECKPOINT_TREE_LEVELS: &str = "PRIVI_CHECKPOINT_TREE_LEVELS";
/// Prover timeout in whole seconds.
pub const ENV_PROVER_TIMEOUT_SECS: &str = "PRIVI_PROVER_TIMEOUT_SECS";
/// Path or name of the snarkjs executable.
pub const ENV_SNARKJS_BIN: &str = "PRIVI_SNARKJS_BIN";
/// Directory holding `<circuit>.wasm` and `<circuit>.zkey`.
pub const ENV_CIRCUITS_DIR: &str = "PRIVI_CIRCUITS_DIR";

/// A set variable that could not be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Value does not parse.
    #[error("{var}={value:?} is not valid")]
    Invalid {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
    },
    /// Tree depth outside what the tree supports.
    #[error("{var} must be in 1..={max} (got {got})")]
    Depth {
        /// Variable name.
        var: &'static str,
        /// Parsed depth.
        got: usize,
        /// Largest supported depth.
        max: usize,
    },
}

/// Runtime settings for trees and the prover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Stream tree depth.
    pub stream_tree_levels: usize,
    /// Checkpoint tree depth.
    pub checkpoint_tree_levels: usize,
    /// Bound on one proof; `None` waits indefinitely.
    pub prover_timeout: Option<Duration>,
    /// snarkjs executable.
    pub snarkjs_bin: PathBuf,
    /// Circuit artifact directory.
    pub circuits_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stream_tree_levels: STREAM_TREE_LEVELS,
            checkpoint_tree_levels: CHECKPOINT_TREE_LEVELS,
            prover_timeout: None,
            snarkjs_bin: PathBuf::from("snarkjs"),
            circuits_dir: PathBuf::from("./circuits"),
        }
    }
}

impl Config {
    /// Read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source (tests, embedding).
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&'static str) -> Option<String>,
    {
        let d = Self::default();
        let cfg = Self {
            stream_tree_levels: parsed(&lookup, ENV_STREAM_TREE_LEVELS)?
                .unwrap_or(d.stream_tree_levels),
            checkpoint_tree_levels: parsed(&lookup, ENV_CHECKPOINT_TREE_LEVELS)?
                .unwrap_or(d.checkpoint_tree_levels),
            prover_timeout: parsed::<u64, _>(&lookup, ENV_PROVER_TIMEOUT_SECS)?
                .map(Duration::from_secs),
            snarkjs_bin: lookup(ENV_SNARKJS_BIN).map(PathBuf::from).unwrap_or(d.snarkjs_bin),
            circuits_dir: lookup(ENV_CIRCUITS_DIR).map(PathBuf::from).unwrap_or(d.circuits_dir),
        };
        check_depth(ENV_STREAM_TREE_LEVELS, cfg.stream_tree_levels)?;
        check_depth(ENV_CHECKPOINT_TREE_LEVELS, cfg.checkpoint_tree_levels)?;
        Ok(cfg)
    }
}

fn parsed<T: FromStr, L>(lookup: &L, var: &'static str) -> Result<Option<T>, ConfigError>
where
    L: Fn(&'static str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
    }
}

fn check_depth(var: &'static str, got: usize) -> Result<(), ConfigError> {
    if got == 0 || got > MAX_LEVELS {
        return Err(ConfigError::Depth { var, got, max: MAX_LEVELS });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn with(pairs: &[(&'static str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<&str, String> = pairs.iter().map(|(k, v)| (*k, v.to_string())).collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_match_ledger_depths() {
        let cfg = with(&[]).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.stream_tree_levels, 21);
        assert_eq!(cfg.checkpoint_tree_levels, 23);
        assert_eq!(cfg.prover_timeout, None);
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = with(&[
            (ENV_STREAM_TREE_LEVELS, "10"),
            (ENV_PROVER_TIMEOUT_SECS, " 90 "),
            (ENV_CIRCUITS_DIR, "/opt/privi/circuits"),
        ])
        .unwrap();
        assert_eq!(cfg.stream_tree_levels, 10);
        assert_eq!(cfg.prover_timeout, Some(Duration::from_secs(90)));
        assert_eq!(cfg.circuits_dir, PathBuf::from("/opt/privi/circuits"));
    }

    #[test]
    fn malformed_values_are_errors() {
        assert_eq!(
            with(&[(ENV_CHECKPOINT_TREE_LEVELS, "deep")]),
            Err(ConfigError::Invalid { var: ENV_CHECKPOINT_TREE_LEVELS, value: "deep".into() })
        );
        assert!(matches!(
            with(&[(ENV_STREAM_TREE_LEVELS, "0")]),
            Err(ConfigError::Depth { got: 0, .. })
        ));
        assert!(with(&[(ENV_STREAM_TREE_LEVELS, "33")]).is_err());
        assert!(with(&[(ENV_PROVER_TIMEOUT_SECS, "-1")]).is_err());
    }
}
