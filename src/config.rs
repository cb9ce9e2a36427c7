//! Planner configuration.
//!
//! Plain data: every component takes the pieces it needs at construction.
//! Values come from [`PlannerConfig::default`], optionally overlaid by a JSON
//! file and then by environment variables.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::coordinate::Coordinate;
use crate::error::ConfigError;
use crate::held_karp::EXACT_SOLVER_MAX_STOPS;
use crate::matrix::DEFAULT_ALL_PAIRS_THRESHOLD;
use crate::network::NetworkOptions;
use crate::overpass::OverpassConfig;
use crate::solver::DEFAULT_MAX_STOPS_EXACT;
use crate::stops::StopOptions;
use crate::traits::NetworkType;

pub const CACHE_DIR_ENV_VAR: &str = "ROUTE_PLANNER_CACHE_DIR";
pub const LOG_LEVEL_ENV_VAR: &str = "ROUTE_PLANNER_LOG_LEVEL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub depot: Coordinate,

    /// Padding around the stops when requesting road data, in degrees
    /// (0.003 is roughly 330 m).
    pub buffer_degrees: f64,
    /// Jitter step per retry when resolving a duplicate node (roughly 9 m).
    pub jitter_base_degrees: f64,
    pub max_jitter_attempts: usize,
    pub forced_offset_degrees: f64,

    pub min_stop_distance_degrees: f64,
    pub stop_spread_degrees: f64,
    pub default_stops: usize,

    /// Largest non-depot stop count solved exactly in auto mode.
    pub max_stops_exact: usize,
    pub all_pairs_threshold: usize,

    pub cache_dir: PathBuf,
    pub cache_timeout_secs: u64,
    pub cache_sweep_probability: f64,

    pub overpass_url: String,
    pub network_type: NetworkType,
    pub request_timeout_secs: u64,

    pub probe_urls: Vec<String>,
    pub probe_timeout_secs: u64,

    pub log_level: String,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            depot: Coordinate::new(24.848, 67.032),
            buffer_degrees: 0.003,
            jitter_base_degrees: 0.00008,
            max_jitter_attempts: 20,
            forced_offset_degrees: 0.0001,
            min_stop_distance_degrees: 0.003,
            stop_spread_degrees: 0.03,
            default_stops: 5,
            max_stops_exact: DEFAULT_MAX_STOPS_EXACT,
            all_pairs_threshold: DEFAULT_ALL_PAIRS_THRESHOLD,
            cache_dir: PathBuf::from("cache"),
            cache_timeout_secs: 7 * 24 * 60 * 60,
            cache_sweep_probability: 0.05,
            overpass_url: OverpassConfig::default().url,
            network_type: NetworkType::Drive,
            request_timeout_secs: 180,
            probe_urls: vec![
                "http://www.google.com".to_string(),
                "http://www.openstreetmap.org".to_string(),
            ],
            probe_timeout_secs: 3,
            log_level: "info".to_string(),
        }
    }
}

impl PlannerConfig {
    /// Defaults, overlaid by `path` when given, then by the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides from `lookup`, which maps a variable name to its value.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(CACHE_DIR_ENV_VAR).filter(|dir| !dir.is_empty()) {
            self.cache_dir = PathBuf::from(dir);
        }
        if let Some(level) = lookup(LOG_LEVEL_ENV_VAR).filter(|level| !level.is_empty()) {
            self.log_level = level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("buffer_degrees", self.buffer_degrees)?;
        positive("jitter_base_degrees", self.jitter_base_degrees)?;
        positive("forced_offset_degrees", self.forced_offset_degrees)?;
        positive("stop_spread_degrees", self.stop_spread_degrees)?;
        if self.min_stop_distance_degrees.is_nan() || self.min_stop_distance_degrees < 0.0 {
            return Err(invalid("min_stop_distance_degrees", "must not be negative"));
        }
        if !(0.0..=1.0).contains(&self.cache_sweep_probability) {
            return Err(invalid("cache_sweep_probability", "must be within [0, 1]"));
        }
        if self.max_stops_exact == 0 || self.max_stops_exact > EXACT_SOLVER_MAX_STOPS {
            return Err(ConfigError::InvalidValue {
                key: "max_stops_exact",
                reason: format!("must be between 1 and {EXACT_SOLVER_MAX_STOPS}"),
            });
        }
        if self.max_jitter_attempts == 0 {
            return Err(invalid("max_jitter_attempts", "must be at least 1"));
        }
        if self.request_timeout_secs == 0 || self.probe_timeout_secs == 0 {
            return Err(invalid("request_timeout_secs", "timeouts must be at least one second"));
        }
        Ok(())
    }

    pub fn cache_timeout(&self) -> Duration {
        Duration::from_secs(self.cache_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn network_options(&self) -> NetworkOptions {
        NetworkOptions {
            buffer_degrees: self.buffer_degrees,
            jitter_base_degrees: self.jitter_base_degrees,
            max_jitter_attempts: self.max_jitter_attempts,
            forced_offset_degrees: self.forced_offset_degrees,
            network_type: self.network_type,
        }
    }

    pub fn overpass_config(&self) -> OverpassConfig {
        OverpassConfig {
            url: self.overpass_url.clone(),
            timeout_secs: self.request_timeout_secs,
            ..OverpassConfig::default()
        }
    }

    pub fn stop_options(&self) -> StopOptions {
        StopOptions {
            spread_degrees: self.stop_spread_degrees,
            min_distance_degrees: self.min_stop_distance_degrees,
        }
    }
}

fn positive(key: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(invalid(key, "must be a positive number"))
    }
}

fn invalid(key: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PlannerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.cache_timeout(), Duration::from_secs(604_800));
        assert_eq!(config.max_stops_exact, 12);
        assert_eq!(config.network_options().max_jitter_attempts, 20);
    }

    #[test]
    fn test_file_overrides_only_given_keys() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_stops_exact": 8, "network_type": "walk"}}"#).unwrap();

        let mut config: PlannerConfig =
            serde_json::from_str(&fs::read_to_string(file.path()).unwrap()).unwrap();
        config.apply_env(|_| None);

        assert_eq!(config.max_stops_exact, 8);
        assert_eq!(config.network_type, NetworkType::Walk);
        assert_eq!(config.buffer_degrees, 0.003);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = PlannerConfig::default();
        config.apply_env(|name| match name {
            CACHE_DIR_ENV_VAR => Some("/tmp/routes".to_string()),
            LOG_LEVEL_ENV_VAR => Some("debug".to_string()),
            _ => None,
        });
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/routes"));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_validation_errors() {
        let config = PlannerConfig {
            cache_sweep_probability: 1.5,
            ..PlannerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                key: "cache_sweep_probability",
                ..
            })
        ));

        let config = PlannerConfig {
            buffer_degrees: 0.0,
            ..PlannerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_exact_threshold_cannot_exceed_solver_limit() {
        let at_limit = PlannerConfig {
            max_stops_exact: EXACT_SOLVER_MAX_STOPS,
            ..PlannerConfig::default()
        };
        at_limit.validate().unwrap();

        let above = PlannerConfig {
            max_stops_exact: 25,
            ..PlannerConfig::default()
        };
        assert!(matches!(
            above.validate(),
            Err(ConfigError::InvalidValue {
                key: "max_stops_exact",
                ..
            })
        ));
    }

    #[test]
    fn test_load_reports_bad_json() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{ nope").unwrap();
        assert!(matches!(
            PlannerConfig::load(Some(file.path())),
            Err(ConfigError::Json(_))
        ));
    }
}
