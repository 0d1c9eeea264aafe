//! Runtime configuration from environment variables.

use std::time::Duration;

use checkout::PaymentSecrets;
use domain::{Money, PricingPolicy, ShippingRates};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration.
///
/// | Variable | Default |
/// |---|---|
/// | `HOST` | `0.0.0.0` |
/// | `PORT` | `3000` |
/// | `RUST_LOG` | `info` |
/// | `LOG_FORMAT` | `text` (`json` for structured output) |
/// | `DATABASE_URL` | unset: in-memory journal, ledger and order numbers |
/// | `PAYMENT_KEY_ID` | empty |
/// | `PAYMENT_KEY_SECRET` | empty |
/// | `PAYMENT_WEBHOOK_SECRET` | unset: webhook signatures are not checked |
/// | `PAYMENT_GATEWAY_URL` | unset: in-process gateway (no real payments) |
/// | `GATEWAY_TIMEOUT_MS` | `5000` |
/// | `TAX_RATE_BPS` | `1000` |
/// | `SHIPPING_STANDARD_CENTS` / `_EXPRESS_` / `_OVERNIGHT_` | `1000` / `2000` / `5000` |
///
/// Unparseable numbers fall back to their defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub payments: PaymentSecrets,
    /// Gateway REST base URL including the version prefix.
    pub payment_gateway_url: Option<String>,
    pub gateway_timeout: Duration,
    pub pricing: PricingPolicy,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let number = |key: &str| text(key).and_then(|v| v.trim().parse::<i64>().ok());

        let standard = defaults.pricing.shipping;
        Self {
            host: text("HOST").unwrap_or(defaults.host),
            port: text("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: text("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match text("LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            database_url: text("DATABASE_URL"),
            payments: PaymentSecrets {
                key_id: text("PAYMENT_KEY_ID").unwrap_or_default(),
                key_secret: text("PAYMENT_KEY_SECRET").unwrap_or_default(),
                webhook_secret: text("PAYMENT_WEBHOOK_SECRET"),
            },
            payment_gateway_url: text("PAYMENT_GATEWAY_URL").map(|url| url.trim().to_string()),
            gateway_timeout: number("GATEWAY_TIMEOUT_MS")
                .and_then(|ms| u64::try_from(ms).ok())
                .map_or(defaults.gateway_timeout, Duration::from_millis),
            pricing: PricingPolicy {
                tax_rate_bps: number("TAX_RATE_BPS")
                    .and_then(|bps| u32::try_from(bps).ok())
                    .unwrap_or(defaults.pricing.tax_rate_bps),
                shipping: ShippingRates {
                    standard: number("SHIPPING_STANDARD_CENTS")
                        .map_or(standard.standard, Money::from_cents),
                    express: number("SHIPPING_EXPRESS_CENTS")
                        .map_or(standard.express, Money::from_cents),
                    overnight: number("SHIPPING_OVERNIGHT_CENTS")
                        .map_or(standard.overnight, Money::from_cents),
                },
            },
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
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
            payments: PaymentSecrets::default(),
            payment_gateway_url: None,
            gateway_timeout: Duration::from_millis(5000),
            pricing: PricingPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = config_from(&[]);
        assert_eq!(config.addr(), "0.0.0.0:3000");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.database_url.is_none());
        assert!(config.payments.webhook_secret.is_none());
        assert!(config.payment_gateway_url.is_none());
        assert_eq!(config.gateway_timeout, Duration::from_secs(5));
        assert_eq!(config.pricing.tax_rate_bps, 1000);
        assert_eq!(config.pricing.shipping.express, Money::from_cents(2000));
    }

    #[test]
    fn values_are_read_from_the_environment() {
        let config = config_from(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://localhost/shop"),
            ("PAYMENT_WEBHOOK_SECRET", "whsec"),
            ("PAYMENT_GATEWAY_URL", " https://api.razorpay.com/v1 "),
            ("GATEWAY_TIMEOUT_MS", "750"),
            ("TAX_RATE_BPS", "1800"),
            ("SHIPPING_OVERNIGHT_CENTS", "9900"),
        ]);
        assert_eq!(config.addr(), "127.0.0.1:8080");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/shop"));
        assert_eq!(config.payments.webhook_secret.as_deref(), Some("whsec"));
        assert_eq!(
            config.payment_gateway_url.as_deref(),
            Some("https://api.razorpay.com/v1")
        );
        assert_eq!(config.gateway_timeout, Duration::from_millis(750));
        assert_eq!(config.pricing.tax_rate_bps, 1800);
        assert_eq!(config.pricing.shipping.overnight, Money::from_cents(9900));
        assert_eq!(config.pricing.shipping.standard, Money::from_cents(1000));
    }

    #[test]
    fn bad_numbers_and_blank_values_fall_back() {
        let config = config_from(&[
            ("PORT", "eighty"),
            ("TAX_RATE_BPS", "-5"),
            ("PAYMENT_WEBHOOK_SECRET", "  "),
        ]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.pricing.tax_rate_bps, 1000);
        assert!(config.payments.webhook_secret.is_none());
    }
}
