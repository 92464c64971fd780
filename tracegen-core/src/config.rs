//! Flat environment-variable configuration (`spec.md` §6).
//!
//! Scenario documents are structured YAML; everything else the process
//! needs to boot is a flat `name -> string` environment, read once at
//! startup the way the teacher's `opentelemetry-declarative-config` reads
//! its own `TelemetryConfig`, but over `std::env` rather than a YAML file
//! since this layer is deliberately small enough not to warrant one.

use std::env;

use thiserror::Error;

const DEFAULT_NUM_WORKERS: u32 = 4;
const DEFAULT_MAX_TEMPLATE_ITERATIONS: usize = 10;
const DEFAULT_CONTEXT_STORE_MAX_SIZE: usize = 100;
const DEFAULT_TRACE_INTERVAL_MIN_SECS: f64 = 1.0;
const DEFAULT_TRACE_INTERVAL_MAX_SECS: f64 = 5.0;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("environment variable `{name}` must be {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("environment variable `SCENARIOS_DIR` is required")]
    MissingScenariosDir,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub scenarios_dir: String,
    /// `TRACE_INTERVAL_MIN`/`MAX` are specified in `spec.md` §6 as float
    /// seconds; converted once here to whole milliseconds, the unit the
    /// worker pool's sleep actually wants.
    pub trace_interval_min_ms: u64,
    pub trace_interval_max_ms: u64,
    pub trace_num_workers: u32,
    pub max_template_iterations: usize,
    pub context_store_max_size: usize,
    pub rng_seed: u64,
}

impl Config {
    /// Read configuration from the process environment, applying the
    /// defaults spelled out in `spec.md` §6 for everything but
    /// `SCENARIOS_DIR`, which has none.
    pub fn from_env() -> Result<Self, ConfigError> {
        let scenarios_dir = env::var("SCENARIOS_DIR").map_err(|_| ConfigError::MissingScenariosDir)?;

        let trace_interval_min_secs: f64 = parse_or_default(
            "TRACE_INTERVAL_MIN",
            DEFAULT_TRACE_INTERVAL_MIN_SECS,
            "a non-negative number of seconds",
        )?;
        let trace_interval_max_secs: f64 = parse_or_default(
            "TRACE_INTERVAL_MAX",
            DEFAULT_TRACE_INTERVAL_MAX_SECS,
            "a non-negative number of seconds",
        )?;
        if trace_interval_min_secs < 0.0 {
            return Err(ConfigError::Invalid {
                name: "TRACE_INTERVAL_MIN",
                expected: "a non-negative number of seconds",
                value: trace_interval_min_secs.to_string(),
            });
        }
        if trace_interval_max_secs < trace_interval_min_secs {
            return Err(ConfigError::Invalid {
                name: "TRACE_INTERVAL_MAX",
                expected: "greater than or equal to TRACE_INTERVAL_MIN",
                value: trace_interval_max_secs.to_string(),
            });
        }
        let trace_interval_min_ms = secs_to_millis(trace_interval_min_secs);
        let trace_interval_max_ms = secs_to_millis(trace_interval_max_secs);

        let trace_num_workers = parse_or_default(
            "TRACE_NUM_WORKERS",
            DEFAULT_NUM_WORKERS,
            "a positive integer",
        )?;
        if trace_num_workers == 0 {
            return Err(ConfigError::Invalid {
                name: "TRACE_NUM_WORKERS",
                expected: "a positive integer",
                value: "0".to_string(),
            });
        }

        let max_template_iterations = parse_or_default(
            "MAX_TEMPLATE_ITERATIONS",
            DEFAULT_MAX_TEMPLATE_ITERATIONS,
            "a positive integer",
        )?;

        let context_store_max_size = parse_or_default(
            "CONTEXT_STORE_MAX_SIZE",
            DEFAULT_CONTEXT_STORE_MAX_SIZE,
            "a positive integer",
        )?;

        let rng_seed = match env::var("RNG_SEED") {
            Ok(raw) => raw.parse::<u64>().map_err(|_| ConfigError::Invalid {
                name: "RNG_SEED",
                expected: "an unsigned 64-bit integer",
                value: raw,
            })?,
            Err(_) => rand::random(),
        };

        Ok(Config {
            scenarios_dir,
            trace_interval_min_ms,
            trace_interval_max_ms,
            trace_num_workers,
            max_template_iterations,
            context_store_max_size,
            rng_seed,
        })
    }
}

fn parse_or_default<T>(name: &'static str, default: T, expected: &'static str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match env::var(name) {
        Ok(raw) => raw.parse::<T>().map_err(|_| ConfigError::Invalid {
            name,
            expected,
            value: raw,
        }),
        Err(_) => Ok(default),
    }
}

fn secs_to_millis(secs: f64) -> u64 {
    (secs * 1000.0).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that touch
    // them so they don't stomp on each other.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_all() {
        for name in [
            "SCENARIOS_DIR",
            "TRACE_INTERVAL_MIN",
            "TRACE_INTERVAL_MAX",
            "TRACE_NUM_WORKERS",
            "MAX_TEMPLATE_ITERATIONS",
            "CONTEXT_STORE_MAX_SIZE",
            "RNG_SEED",
        ] {
            unsafe { env::remove_var(name) };
        }
    }

    #[test]
    fn missing_scenarios_dir_is_an_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        assert_eq!(Config::from_env().unwrap_err(), ConfigError::MissingScenariosDir);
    }

    #[test]
    fn defaults_apply_when_only_scenarios_dir_is_set() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        unsafe { env::set_var("SCENARIOS_DIR", "/tmp/scenarios") };
        let config = Config::from_env().unwrap();
        assert_eq!(config.trace_num_workers, DEFAULT_NUM_WORKERS);
        assert_eq!(config.max_template_iterations, DEFAULT_MAX_TEMPLATE_ITERATIONS);
        assert_eq!(config.context_store_max_size, DEFAULT_CONTEXT_STORE_MAX_SIZE);
        clear_all();
    }

    #[test]
    fn rejects_inverted_interval_bounds() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        unsafe {
            env::set_var("SCENARIOS_DIR", "/tmp/scenarios");
            env::set_var("TRACE_INTERVAL_MIN", "0.5");
            env::set_var("TRACE_INTERVAL_MAX", "0.1");
        }
        assert!(Config::from_env().is_err());
        clear_all();
    }

    #[test]
    fn interval_seconds_convert_to_milliseconds() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        unsafe {
            env::set_var("SCENARIOS_DIR", "/tmp/scenarios");
            env::set_var("TRACE_INTERVAL_MIN", "0.5");
            env::set_var("TRACE_INTERVAL_MAX", "2.5");
        }
        let config = Config::from_env().unwrap();
        assert_eq!(config.trace_interval_min_ms, 500);
        assert_eq!(config.trace_interval_max_ms, 2500);
        clear_all();
    }
}
