//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use checkout::ReservationSettings;
use domain::{Money, PricingPolicy, TaxRate};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL URL; unset means the in-memory store
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `5`)
/// - `TAX_RATE`: decimal rate (default: `0.08`)
/// - `FREE_SHIPPING_THRESHOLD`: dollars (default: `50.00`)
/// - `FLAT_SHIPPING_RATE`: dollars (default: `9.99`)
/// - `RESERVATION_TTL_SECS`: reservation lifetime, also used as the reserve
///   result cache lifetime (default: `86400`)
/// - `RELEASE_IDEMPOTENCY_TTL_SECS`: (default: `604800`)
/// - `EXPIRY_SWEEP_INTERVAL_SECS`: (default: `60`)
///
/// Unparseable or out-of-range values fall back to the default.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub tax_rate: f64,
    pub free_shipping_threshold: f64,
    pub flat_shipping_rate: f64,
    pub reservation_ttl_secs: u64,
    pub release_idempotency_ttl_secs: u64,
    pub expiry_sweep_interval_secs: u64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let value = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Self {
            host: value("HOST").unwrap_or(defaults.host),
            port: parse_or(value("PORT"), defaults.port, |_| true),
            log_level: value("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match value("LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            database_url: value("DATABASE_URL"),
            database_max_connections: parse_or(
                value("DATABASE_MAX_CONNECTIONS"),
                defaults.database_max_connections,
                |n| *n > 0,
            ),
            tax_rate: parse_or(value("TAX_RATE"), defaults.tax_rate, |r: &f64| {
                r.is_finite() && *r >= 0.0
            }),
            free_shipping_threshold: parse_or(
                value("FREE_SHIPPING_THRESHOLD"),
                defaults.free_shipping_threshold,
                non_negative,
            ),
            flat_shipping_rate: parse_or(
                value("FLAT_SHIPPING_RATE"),
                defaults.flat_shipping_rate,
                non_negative,
            ),
            reservation_ttl_secs: parse_or(
                value("RESERVATION_TTL_SECS"),
                defaults.reservation_ttl_secs,
                |n| *n > 0,
            ),
            release_idempotency_ttl_secs: parse_or(
                value("RELEASE_IDEMPOTENCY_TTL_SECS"),
                defaults.release_idempotency_ttl_secs,
                |n| *n > 0,
            ),
            expiry_sweep_interval_secs: parse_or(
                value("EXPIRY_SWEEP_INTERVAL_SECS"),
                defaults.expiry_sweep_interval_secs,
                |n| *n > 0,
            ),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn pricing(&self) -> PricingPolicy {
        PricingPolicy {
            tax_rate: TaxRate::from_decimal(self.tax_rate),
            free_shipping_threshold: Money::from_decimal(self.free_shipping_threshold),
            flat_shipping: Money::from_decimal(self.flat_shipping_rate),
        }
    }

    pub fn reservation_settings(&self) -> ReservationSettings {
        ReservationSettings {
            reservation_ttl: seconds(self.reservation_ttl_secs),
            reserve_idempotency_ttl: seconds(self.reservation_ttl_secs),
            release_idempotency_ttl: seconds(self.release_idempotency_ttl_secs),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_sweep_interval_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            database_max_connections: 5,
            tax_rate: 0.08,
            free_shipping_threshold: 50.0,
            flat_shipping_rate: 9.99,
            reservation_ttl_secs: 86_400,
            release_idempotency_ttl_secs: 604_800,
            expiry_sweep_interval_secs: 60,
        }
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, default: T, valid: impl Fn(&T) -> bool) -> T {
    match raw {
        None => default,
        Some(raw) => match raw.parse::<T>() {
            Ok(parsed) if valid(&parsed) => parsed,
            _ => {
                tracing::warn!(value = %raw, "invalid configuration value, using default");
                default
            }
        },
    }
}

fn non_negative(v: &f64) -> bool {
    v.is_finite() && *v >= 0.0
}

fn seconds(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX).min(i64::MAX / 1_000))
}
