use chrono::Duration;
use wq_core::rate_limit::RateLimitRule;
use wq_core::signing::DEFAULT_TOLERANCE_SECS;

/// Default lifetime of an unpaid order's inventory locks.
pub const DEFAULT_ORDER_TIMEOUT_MINUTES: i64 = 15;

/// Default payment window for priced registrations.
pub const DEFAULT_REGISTRATION_PAYMENT_MINUTES: i64 = 15;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} must be a valid {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Engine configuration.
#[derive(Clone)]
pub struct LifecycleConfig {
    /// Shared salt for amount signatures.
    pub signature_secret: String,
    pub signature_tolerance: Duration,
    pub order_timeout: Duration,
    pub registration_payment_window: Duration,
    pub order_create_limit: RateLimitRule,
    pub order_pay_limit: RateLimitRule,
    pub query_limit: RateLimitRule,
}

impl std::fmt::Debug for LifecycleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleConfig")
            .field("signature_secret", &"<redacted>")
            .field("signature_tolerance", &self.signature_tolerance)
            .field("order_timeout", &self.order_timeout)
            .field("registration_payment_window", &self.registration_payment_window)
            .field("order_create_limit", &self.order_create_limit)
            .field("order_pay_limit", &self.order_pay_limit)
            .field("query_limit", &self.query_limit)
            .finish()
    }
}

impl LifecycleConfig {
    /// Defaults for everything except the secret.
    pub fn new(signature_secret: impl Into<String>) -> Self {
        Self {
            signature_secret: signature_secret.into(),
            signature_tolerance: Duration::seconds(DEFAULT_TOLERANCE_SECS),
            order_timeout: Duration::minutes(DEFAULT_ORDER_TIMEOUT_MINUTES),
            registration_payment_window: Duration::minutes(DEFAULT_REGISTRATION_PAYMENT_MINUTES),
            order_create_limit: RateLimitRule::ORDER_CREATE,
            order_pay_limit: RateLimitRule::ORDER_PAY,
            query_limit: RateLimitRule::QUERY,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// | Env Var                              | Default      |
    /// |--------------------------------------|--------------|
    /// | `ORDER_SIGNATURE_SECRET`             | (required)   |
    /// | `SIGNATURE_TOLERANCE_SECS`           | `300`        |
    /// | `ORDER_TIMEOUT_MINUTES`              | `15`         |
    /// | `REGISTRATION_PAYMENT_MINUTES`       | `15`         |
    /// | `RATE_LIMIT_ORDER_CREATE`            | `10`         |
    /// | `RATE_LIMIT_ORDER_CREATE_WINDOW_SECS`| `60`         |
    /// | `RATE_LIMIT_ORDER_PAY`               | `20`         |
    /// | `RATE_LIMIT_ORDER_PAY_WINDOW_SECS`   | `60`         |
    /// | `RATE_LIMIT_QUERY`                   | `100`        |
    /// | `RATE_LIMIT_QUERY_WINDOW_SECS`       | `60`         |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = lookup("ORDER_SIGNATURE_SECRET")
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::Missing("ORDER_SIGNATURE_SECRET"))?;

        let defaults = Self::new(secret);
        let secs = |name: &'static str, default: Duration| {
            parse_span(&lookup, name, default, Duration::try_seconds, "positive number of seconds")
        };
        let mins = |name: &'static str, default: Duration| {
            parse_span(&lookup, name, default, Duration::try_minutes, "positive number of minutes")
        };
        let rule = |limit_var: &'static str,
                    window_var: &'static str,
                    default: RateLimitRule|
         -> Result<RateLimitRule, ConfigError> {
            let limit = match parse_var::<_, u32>(&lookup, limit_var)? {
                None => default.limit,
                Some(0) => {
                    return Err(ConfigError::Invalid {
                        name: limit_var,
                        expected: "positive count",
                        value: "0".into(),
                    })
                }
                Some(limit) => limit,
            };
            Ok(RateLimitRule {
                limit,
                window: secs(window_var, default.window)?,
            })
        };

        Ok(Self {
            signature_tolerance: secs("SIGNATURE_TOLERANCE_SECS", defaults.signature_tolerance)?,
            order_timeout: mins("ORDER_TIMEOUT_MINUTES", defaults.order_timeout)?,
            registration_payment_window: mins(
                "REGISTRATION_PAYMENT_MINUTES",
                defaults.registration_payment_window,
            )?,
            order_create_limit: rule(
                "RATE_LIMIT_ORDER_CREATE",
                "RATE_LIMIT_ORDER_CREATE_WINDOW_SECS",
                defaults.order_create_limit,
            )?,
            order_pay_limit: rule(
                "RATE_LIMIT_ORDER_PAY",
                "RATE_LIMIT_ORDER_PAY_WINDOW_SECS",
                defaults.order_pay_limit,
            )?,
            query_limit: rule(
                "RATE_LIMIT_QUERY",
                "RATE_LIMIT_QUERY_WINDOW_SECS",
                defaults.query_limit,
            )?,
            signature_secret: defaults.signature_secret,
        })
    }
}

/// Parse a strictly positive span, rejecting values chrono cannot represent.
fn parse_span<F>(
    lookup: &F,
    name: &'static str,
    default: Duration,
    build: fn(i64) -> Option<Duration>,
    expected: &'static str,
) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(default);
    };
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|n| *n > 0)
        .and_then(build)
        .ok_or(ConfigError::Invalid {
            name,
            expected,
            value: raw,
        })
}

/// Parse a variable if present.
fn parse_var<F, T>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid {
                name,
                expected: std::any::type_name::<T>(),
                value: raw,
            }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn secret_is_required() {
        assert_matches!(
            LifecycleConfig::from_lookup(lookup(&[])),
            Err(ConfigError::Missing("ORDER_SIGNATURE_SECRET"))
        );
        assert_matches!(
            LifecycleConfig::from_lookup(lookup(&[("ORDER_SIGNATURE_SECRET", "  ")])),
            Err(ConfigError::Missing(_))
        );
    }

    #[test]
    fn defaults_apply() {
        let config = LifecycleConfig::from_lookup(lookup(&[("ORDER_SIGNATURE_SECRET", "s3cret")]))
            .unwrap();
        assert_eq!(config.signature_tolerance, Duration::seconds(300));
        assert_eq!(config.order_timeout, Duration::minutes(15));
        assert_eq!(config.registration_payment_window, Duration::minutes(15));
        assert_eq!(config.order_create_limit, RateLimitRule::ORDER_CREATE);
        assert_eq!(config.order_pay_limit, RateLimitRule::ORDER_PAY);
        assert_eq!(config.query_limit, RateLimitRule::QUERY);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = LifecycleConfig::from_lookup(lookup(&[
            ("ORDER_SIGNATURE_SECRET", "s3cret"),
            ("ORDER_TIMEOUT_MINUTES", "30"),
            ("RATE_LIMIT_QUERY", "5"),
            ("RATE_LIMIT_QUERY_WINDOW_SECS", "10"),
        ]))
        .unwrap();
        assert_eq!(config.order_timeout, Duration::minutes(30));
        assert_eq!(config.query_limit, RateLimitRule::new(5, 10));
    }

    #[test]
    fn garbage_is_rejected() {
        let err = LifecycleConfig::from_lookup(lookup(&[
            ("ORDER_SIGNATURE_SECRET", "s3cret"),
            ("RATE_LIMIT_ORDER_PAY", "lots"),
        ]))
        .unwrap_err();
        assert_matches!(err, ConfigError::Invalid { name: "RATE_LIMIT_ORDER_PAY", .. });
    }

    #[test]
    fn non_positive_spans_are_rejected() {
        for (name, value) in [
            ("ORDER_TIMEOUT_MINUTES", "-5"),
            ("SIGNATURE_TOLERANCE_SECS", "-1"),
            ("REGISTRATION_PAYMENT_MINUTES", "0"),
            ("RATE_LIMIT_QUERY_WINDOW_SECS", "0"),
        ] {
            let err = LifecycleConfig::from_lookup(lookup(&[
                ("ORDER_SIGNATURE_SECRET", "s3cret"),
                (name, value),
            ]))
            .unwrap_err();
            assert_matches!(err, ConfigError::Invalid { name: n, .. } if n == name);
        }
    }

    #[test]
    fn out_of_range_spans_are_rejected_without_panicking() {
        let huge = i64::MAX.to_string();
        let err = LifecycleConfig::from_lookup(lookup(&[
            ("ORDER_SIGNATURE_SECRET", "s3cret"),
            ("ORDER_TIMEOUT_MINUTES", huge.as_str()),
        ]))
        .unwrap_err();
        assert_matches!(err, ConfigError::Invalid { name: "ORDER_TIMEOUT_MINUTES", .. });
    }

    #[test]
    fn zero_rate_limit_is_rejected() {
        let err = LifecycleConfig::from_lookup(lookup(&[
            ("ORDER_SIGNATURE_SECRET", "s3cret"),
            ("RATE_LIMIT_ORDER_CREATE", "0"),
        ]))
        .unwrap_err();
        assert_matches!(err, ConfigError::Invalid { name: "RATE_LIMIT_ORDER_CREATE", .. });
    }

    #[test]
    fn debug_hides_secret() {
        let config = LifecycleConfig::new("s3cret");
        assert!(!format!("{config:?}").contains("s3cret"));
    }
}
