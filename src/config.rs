//! Runtime configuration read from the environment.
//!
//! | variable | meaning | default |
//! |---|---|---|
//! | `RBC_MAX_DEPTH` | maximum value nesting accepted by the unmarshaller | 512 |
//! | `RBC_VERIFY_CHECKSUM` | verify body checksums on access (`0`/`false` disables) | enabled |
//! | `RBC_LOG` | minimum log level (`debug`, `info`, `warn`, `error`) | `info` |

use crate::utils::log::Level;
use crate::warn;
use std::env;

/// Default nesting limit for unmarshalled value graphs.
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 512;

pub const ENV_MAX_DEPTH: &str = "RBC_MAX_DEPTH";
pub const ENV_VERIFY_CHECKSUM: &str = "RBC_VERIFY_CHECKSUM";
pub const ENV_LOG: &str = "RBC_LOG";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Nodes nested deeper than this are rejected with `NestingTooDeep`.
    pub max_nesting_depth: usize,
    /// Verify the header checksum before decoding a body.
    pub verify_checksum: bool,
    /// Minimum level emitted by the logging macros.
    pub log_level: Level,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
            verify_checksum: true,
            log_level: Level::Info,
        }
    }
}

impl Config {
    /// Reads the configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    ///
    /// Unparsable values fall back to their defaults with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let max_nesting_depth = match lookup(ENV_MAX_DEPTH) {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(depth) if depth > 0 => depth,
                _ => {
                    warn!("ignoring {ENV_MAX_DEPTH}={raw:?}: expected a positive integer");
                    defaults.max_nesting_depth
                }
            },
            None => defaults.max_nesting_depth,
        };

        let verify_checksum = match lookup(ENV_VERIFY_CHECKSUM) {
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "0" | "false" | "no" | "off" => false,
                "1" | "true" | "yes" | "on" => true,
                _ => {
                    warn!("ignoring {ENV_VERIFY_CHECKSUM}={raw:?}: expected a boolean");
                    defaults.verify_checksum
                }
            },
            None => defaults.verify_checksum,
        };

        let log_level = match lookup(ENV_LOG) {
            Some(raw) => raw.parse::<Level>().unwrap_or_else(|_| {
                warn!("ignoring {ENV_LOG}={raw:?}: expected debug, info, warn or error");
                defaults.log_level
            }),
            None => defaults.log_level,
        };

        Self {
            max_nesting_depth,
            verify_checksum,
            log_level,
        }
    }
}
