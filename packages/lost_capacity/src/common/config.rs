//! Settings which control the lost capacity computation. Defaults can be
//! overridden through environment variables when the service starts, and
//! per request through a UserEngineConfig.

use crate::common::error::{LostCapacityError, Result};
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_VIRTUAL_STEP: f64 = 0.3;
pub const MIN_VIRTUAL_STEP: f64 = 0.01;
pub const DEFAULT_MIN_SAWTOOTH_MEASUREMENTS: usize = 3;
pub const DEFAULT_LEASE_TIMEOUT_SECS: u64 = 60 * 60;
pub const DEFAULT_LEASE_KEY: &str = "recompute_all_lost_capacity";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";

/// Settings used across the package when computing lost capacity. Create
/// with EngineConfig::default() or EngineConfig::from_env()
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Spacing of the virtual measurements generated for unsurveyed pipes
    pub virtual_step: f64,
    /// Pipes with fewer measurements than this are not sawtooth corrected
    pub min_sawtooth_measurements: usize,
    /// How long a recompute-all lease stays valid if never released
    pub lease_timeout: Duration,
    pub lease_key: String,
    pub bind_addr: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            virtual_step: DEFAULT_VIRTUAL_STEP,
            min_sawtooth_measurements: DEFAULT_MIN_SAWTOOTH_MEASUREMENTS,
            lease_timeout: Duration::from_secs(DEFAULT_LEASE_TIMEOUT_SECS),
            lease_key: DEFAULT_LEASE_KEY.to_string(),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }
}

/// Parse a single setting, falling back to the provided default if it has
/// not been set
fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match lookup(key) {
        Some(raw) => {
            raw.trim()
                .parse()
                .map_err(|_| LostCapacityError::InvalidConfig {
                    key: key.to_string(),
                    value: raw.clone(),
                })
        }
        None => Ok(default),
    }
}

impl EngineConfig {
    /// Build a config from the LC_* environment variables
    pub fn from_env() -> Result<EngineConfig> {
        EngineConfig::from_vars(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary source of variables, anything not
    /// provided keeps its default value
    pub fn from_vars(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<EngineConfig> {
        let config = EngineConfig {
            virtual_step: parse_var(
                &lookup,
                "LC_VIRTUAL_STEP",
                DEFAULT_VIRTUAL_STEP,
            )?,
            min_sawtooth_measurements: parse_var(
                &lookup,
                "LC_MIN_SAWTOOTH_MEASUREMENTS",
                DEFAULT_MIN_SAWTOOTH_MEASUREMENTS,
            )?,
            lease_timeout: Duration::from_secs(parse_var(
                &lookup,
                "LC_LEASE_TIMEOUT_SECS",
                DEFAULT_LEASE_TIMEOUT_SECS,
            )?),
            lease_key: lookup("LC_LEASE_KEY")
                .unwrap_or_else(|| DEFAULT_LEASE_KEY.to_string()),
            bind_addr: lookup("LC_BIND_ADDR")
                .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        };

        config.validate()
    }

    /// Apply any overrides requested by the user on top of this config
    pub fn with_overrides(
        self,
        user: UserEngineConfig,
    ) -> Result<EngineConfig> {
        let config = EngineConfig {
            virtual_step: user.virtual_step.unwrap_or(self.virtual_step),
            min_sawtooth_measurements: user
                .min_sawtooth_measurements
                .unwrap_or(self.min_sawtooth_measurements),
            ..self
        };

        config.validate()
    }

    /// Every unsurveyed pipe gets a point per virtual step, so very small
    /// steps are refused. The sawtooth correction needs at least two points
    /// to fit a line through.
    fn validate(self) -> Result<EngineConfig> {
        if !(self.virtual_step.is_finite()
            && self.virtual_step >= MIN_VIRTUAL_STEP)
        {
            return Err(LostCapacityError::InvalidConfig {
                key: "virtual_step".to_string(),
                value: self.virtual_step.to_string(),
            });
        }
        if self.min_sawtooth_measurements < 2 {
            return Err(LostCapacityError::InvalidConfig {
                key: "min_sawtooth_measurements".to_string(),
                value: self.min_sawtooth_measurements.to_string(),
            });
        }
        Ok(self)
    }
}

/// Stores the overrides requested by the user exactly as they are received
/// from the API
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
pub struct UserEngineConfig {
    pub virtual_step: Option<f64>,
    pub min_sawtooth_measurements: Option<usize>,
}
