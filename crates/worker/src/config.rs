use std::time::Duration;

use wq_lifecycle::ConfigError;

const DEFAULT_ORDER_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_REGISTRATION_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_ACTIVITY_SWEEP_HOUR_UTC: u32 = 2;

/// Worker process configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub order_sweep_interval: Duration,
    pub registration_sweep_interval: Duration,
    /// Hour of the day (UTC) at which the deadline backstop runs.
    pub activity_sweep_hour_utc: u32,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                            | Default    |
    /// |------------------------------------|------------|
    /// | `DATABASE_URL`                     | (required) |
    /// | `ORDER_SWEEP_INTERVAL_SECS`        | `60`       |
    /// | `REGISTRATION_SWEEP_INTERVAL_SECS` | `60`       |
    /// | `ACTIVITY_SWEEP_HOUR_UTC`          | `2`        |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let interval = |name: &'static str, default: u64| -> Result<Duration, ConfigError> {
            let secs = match lookup(name) {
                None => default,
                Some(raw) => match raw.trim().parse::<u64>() {
                    Ok(secs) if secs > 0 => secs,
                    _ => {
                        return Err(ConfigError::Invalid {
                            name,
                            expected: "positive number of seconds",
                            value: raw,
                        })
                    }
                },
            };
            Ok(Duration::from_secs(secs))
        };

        let activity_sweep_hour_utc = match lookup("ACTIVITY_SWEEP_HOUR_UTC") {
            None => DEFAULT_ACTIVITY_SWEEP_HOUR_UTC,
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(hour) if hour < 24 => hour,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "ACTIVITY_SWEEP_HOUR_UTC",
                        expected: "hour between 0 and 23",
                        value: raw,
                    })
                }
            },
        };

        Ok(Self {
            database_url,
            order_sweep_interval: interval(
                "ORDER_SWEEP_INTERVAL_SECS",
                DEFAULT_ORDER_SWEEP_INTERVAL_SECS,
            )?,
            registration_sweep_interval: interval(
                "REGISTRATION_SWEEP_INTERVAL_SECS",
                DEFAULT_REGISTRATION_SWEEP_INTERVAL_SECS,
            )?,
            activity_sweep_hour_utc,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn lookup(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |name| {
            vars.iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn database_url_is_required() {
        assert_matches!(
            WorkerConfig::from_lookup(lookup(&[])),
            Err(ConfigError::Missing("DATABASE_URL"))
        );
    }

    #[test]
    fn defaults_apply() {
        let config =
            WorkerConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/wq")]))
                .unwrap();
        assert_eq!(config.order_sweep_interval, Duration::from_secs(60));
        assert_eq!(config.registration_sweep_interval, Duration::from_secs(60));
        assert_eq!(config.activity_sweep_hour_utc, 2);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = WorkerConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/wq"),
            ("ORDER_SWEEP_INTERVAL_SECS", "0"),
        ]))
        .unwrap_err();
        assert_matches!(err, ConfigError::Invalid { name: "ORDER_SWEEP_INTERVAL_SECS", .. });
    }

    #[test]
    fn hour_out_of_range_is_rejected() {
        let err = WorkerConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/wq"),
            ("ACTIVITY_SWEEP_HOUR_UTC", "24"),
        ]))
        .unwrap_err();
        assert_matches!(err, ConfigError::Invalid { name: "ACTIVITY_SWEEP_HOUR_UTC", .. });
    }
}
