//! Environment-driven configuration (spec §6 "Configuration"), validated
//! the way this corpus validates its relayer config: required vars fail
//! fast, numeric vars fall back to documented defaults, and malformed
//! values are rejected at startup rather than surfacing later as a
//! confusing runtime error.

use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,

    /// Hard ceiling on orders per batch.
    pub max_batch_size: usize,
    /// Minimum size required for a timeout-triggered close.
    pub min_batch_size: usize,
    /// Age-based close condition, in seconds.
    pub batch_timeout_secs: u64,
    /// `pending_deposit` TTL, in seconds.
    pub deposit_expiry_secs: u64,
    /// DepositMatcher poll cadence.
    pub deposit_poll_interval: Duration,
    /// Tolerance (in USDC micro-units) for deposit/order amount matching.
    pub amount_match_tolerance_micros: u128,
    /// How long a resolved unmatched deposit is retained before reaping.
    pub unmatched_retention_secs: u64,
    /// Scheduler tick cadence.
    pub scheduler_tick: Duration,
    /// How long a single batch execution waits on the venue before the
    /// batch is failed with `venue_failure:venue_timeout`.
    pub venue_execution_timeout: Duration,
    /// Minimum gap between scheduler-driven snapshot writes, in seconds.
    pub snapshot_interval_secs: u64,

    pub allowed_origins: Vec<String>,
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let max_batch_size: usize = parse_env_or("RELAY_MAX_BATCH_SIZE", 25)?;
        if max_batch_size == 0 {
            return Err(ConfigError::Invalid("RELAY_MAX_BATCH_SIZE".into(), "must be > 0".into()));
        }
        let min_batch_size: usize = parse_env_or("RELAY_MIN_BATCH_SIZE", 1)?;
        if min_batch_size == 0 || min_batch_size > max_batch_size {
            return Err(ConfigError::Invalid(
                "RELAY_MIN_BATCH_SIZE".into(),
                "must be > 0 and <= RELAY_MAX_BATCH_SIZE".into(),
            ));
        }
        let batch_timeout_secs: u64 = parse_env_or("RELAY_BATCH_TIMEOUT_SECS", 60)?;
        if batch_timeout_secs == 0 {
            return Err(ConfigError::Invalid("RELAY_BATCH_TIMEOUT_SECS".into(), "must be > 0".into()));
        }
        let deposit_expiry_secs: u64 = parse_env_or("RELAY_DEPOSIT_EXPIRY_SECS", 3600)?;
        let deposit_poll_secs: u64 = parse_env_or("RELAY_DEPOSIT_POLL_INTERVAL_SECS", 15)?;
        let amount_match_tolerance_micros: u128 = parse_env_or("RELAY_AMOUNT_MATCH_TOLERANCE_MICROS", 10_000)?;
        let unmatched_retention_days: u64 = parse_env_or("RELAY_UNMATCHED_RETENTION_DAYS", 7)?;
        let scheduler_tick_secs: u64 = parse_env_or("RELAY_SCHEDULER_TICK_SECS", 1)?;
        if scheduler_tick_secs == 0 {
            return Err(ConfigError::Invalid("RELAY_SCHEDULER_TICK_SECS".into(), "must be > 0".into()));
        }
        let venue_execution_timeout_secs: u64 = parse_env_or("RELAY_VENUE_EXECUTION_TIMEOUT_SECS", 30)?;
        if venue_execution_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "RELAY_VENUE_EXECUTION_TIMEOUT_SECS".into(),
                "must be > 0".into(),
            ));
        }
        let snapshot_interval_secs: u64 = parse_env_or("RELAY_SNAPSHOT_INTERVAL_SECS", 30)?;
        if snapshot_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "RELAY_SNAPSHOT_INTERVAL_SECS".into(),
                "must be > 0".into(),
            ));
        }

        let allowed_origins = env::var("RELAY_ALLOWED_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        Ok(Self {
            host: env::var("RELAY_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("RELAY_PORT")
                .unwrap_or_else(|_| "8088".into())
                .parse()
                .map_err(|_| ConfigError::Invalid("RELAY_PORT".into(), "must be a valid port number".into()))?,
            max_batch_size,
            min_batch_size,
            batch_timeout_secs,
            deposit_expiry_secs,
            deposit_poll_interval: Duration::from_secs(deposit_poll_secs),
            amount_match_tolerance_micros,
            unmatched_retention_secs: unmatched_retention_days * 86_400,
            scheduler_tick: Duration::from_secs(scheduler_tick_secs),
            venue_execution_timeout: Duration::from_secs(venue_execution_timeout_secs),
            snapshot_interval_secs,
            allowed_origins,
        })
    }
}

fn parse_env_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(v) if !v.is_empty() => v
            .parse()
            .map_err(|_| ConfigError::Invalid(name.into(), format!("could not parse '{v}'"))),
        _ => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Invalid(String, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid(name, reason) => write!(f, "invalid env var {name}: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_env_or_falls_back_to_default() {
        env::remove_var("RELAY_DOES_NOT_EXIST");
        let v: u64 = parse_env_or("RELAY_DOES_NOT_EXIST", 42).unwrap();
        assert_eq!(v, 42);
    }
}
