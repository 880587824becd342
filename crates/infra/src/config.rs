//! Ledger configuration loaded from environment variables.

use core::str::FromStr;
use std::time::Duration;

use fleetstock_observability::{LogFormat, LogSettings};
use fleetstock_payables::NumberFormat;

pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_INVOICE_BRANCH: u32 = 1;

/// Settings with sensible defaults.
///
/// Reads from environment variables:
/// - `FLEETSTOCK_LOCK_TIMEOUT_MS`: how long a unit of work waits for its locks (default: `5000`)
/// - `FLEETSTOCK_INVOICE_BRANCH`: branch number prefixed to invoice numbers (default: `1`)
/// - `FLEETSTOCK_INVOICE_BRANCH_WIDTH`: zero-padded width of the branch part (default: `4`)
/// - `FLEETSTOCK_INVOICE_SEQUENCE_WIDTH`: zero-padded width of the sequence part (default: `8`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `FLEETSTOCK_LOG_FORMAT`: `json` or `pretty` (default: `json`)
///
/// Unparseable values fall back to the default with a warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub lock_timeout: Duration,
    pub invoice_branch: u32,
    pub number_format: NumberFormat,
    pub log: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
            invoice_branch: DEFAULT_INVOICE_BRANCH,
            number_format: NumberFormat::default(),
            log: LogSettings::default(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let lock_timeout_ms = parse_or(
            &lookup,
            "FLEETSTOCK_LOCK_TIMEOUT_MS",
            DEFAULT_LOCK_TIMEOUT_MS,
            |ms: &u64| *ms > 0,
        );
        let number_format = NumberFormat {
            branch_width: parse_or(
                &lookup,
                "FLEETSTOCK_INVOICE_BRANCH_WIDTH",
                defaults.number_format.branch_width,
                |w: &usize| (1..=10).contains(w),
            ),
            sequence_width: parse_or(
                &lookup,
                "FLEETSTOCK_INVOICE_SEQUENCE_WIDTH",
                defaults.number_format.sequence_width,
                |w: &usize| (1..=19).contains(w),
            ),
        };

        Self {
            lock_timeout: Duration::from_millis(lock_timeout_ms),
            invoice_branch: parse_or(
                &lookup,
                "FLEETSTOCK_INVOICE_BRANCH",
                DEFAULT_INVOICE_BRANCH,
                |_: &u32| true,
            ),
            number_format,
            log: LogSettings {
                filter: lookup("RUST_LOG").unwrap_or(defaults.log.filter),
                format: parse_or(&lookup, "FLEETSTOCK_LOG_FORMAT", LogFormat::Json, |_| true),
            },
        }
    }
}

fn parse_or<T, F>(lookup: &F, name: &str, default: T, valid: impl Fn(&T) -> bool) -> T
where
    T: FromStr + Copy + core::fmt::Debug,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => value,
        _ => {
            tracing::warn!(variable = name, value = %raw, default = ?default, "invalid setting, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_default_values() {
        let settings = Settings::from_lookup(lookup_from(&[]));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.lock_timeout, Duration::from_secs(5));
        assert_eq!(settings.invoice_branch, 1);
        assert_eq!(settings.log.format, LogFormat::Json);
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("FLEETSTOCK_LOCK_TIMEOUT_MS", "250"),
            ("FLEETSTOCK_INVOICE_BRANCH", "12"),
            ("FLEETSTOCK_INVOICE_SEQUENCE_WIDTH", "6"),
            ("FLEETSTOCK_LOG_FORMAT", "pretty"),
            ("RUST_LOG", "fleetstock_infra=debug"),
        ]));
        assert_eq!(settings.lock_timeout, Duration::from_millis(250));
        assert_eq!(settings.invoice_branch, 12);
        assert_eq!(settings.number_format.sequence_width, 6);
        assert_eq!(settings.number_format.branch_width, 4);
        assert_eq!(settings.log.format, LogFormat::Pretty);
        assert_eq!(settings.log.filter, "fleetstock_infra=debug");
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("FLEETSTOCK_LOCK_TIMEOUT_MS", "0"),
            ("FLEETSTOCK_INVOICE_BRANCH", "-3"),
            ("FLEETSTOCK_INVOICE_BRANCH_WIDTH", "wide"),
            ("FLEETSTOCK_LOG_FORMAT", "xml"),
        ]));
        assert_eq!(settings, Settings::default());
    }
}
