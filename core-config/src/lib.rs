// =====================================================================================
// File: core-config/src/lib.rs
// Description: Centralized configuration management for the AETIM platform
// =====================================================================================

//! # Core Config
//!
//! Layered configuration for the threat intelligence platform: defaults,
//! an optional environment-specific TOML file, `AETIM__`-prefixed overrides,
//! and the well-known environment options (`TZ`, `AI_SERVICE_URL`,
//! `AI_SERVICE_TIMEOUT`, `SMTP_*`).

pub mod environment;

pub use environment::Environment as RuntimeEnvironment;

use chrono::FixedOffset;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;
use tracing::{info, warn};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration load error: {0}")]
    Load(String),
    #[error("Invalid configuration value: {0}")]
    Invalid(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub ai_service: AiServiceConfig,
    pub smtp: SmtpConfig,
    pub collection: CollectionConfig,
    pub risk: RiskWeightsConfig,
    pub reports: ReportConfig,
    pub notifications: NotificationDefaultsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: u64,
    pub idle_timeout: u64,
    pub max_lifetime: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: 10,
            idle_timeout: 600,
            max_lifetime: 1800,
        }
    }
}

/// External AI extractor / summariser collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiServiceConfig {
    pub base_url: String,
    pub enabled: bool,
    /// Timeout for extract/summarize calls, seconds
    pub timeout_seconds: u64,
    /// Timeout for the health probe, seconds
    pub health_timeout_seconds: u64,
}

impl Default for AiServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            enabled: true,
            timeout_seconds: 30,
            health_timeout_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub use_tls: bool,
    pub from_address: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 587,
            username: String::new(),
            password: String::new(),
            use_tls: true,
            from_address: "aetim@localhost".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Feeds collected simultaneously at most
    pub max_concurrent_collections: usize,
    /// Outbound request timeout, seconds
    pub request_timeout_seconds: u64,
    pub retry: RetryConfig,
    /// Per-feed token bucket: requests allowed inside one window
    pub rate_limit_max_requests: usize,
    /// Per-feed token bucket window, seconds
    pub rate_limit_window_seconds: u64,
    /// Consecutive failures before an alert fires
    pub failure_threshold: u32,
    /// Hours during which a repeated alert is suppressed
    pub alert_cooldown_hours: i64,
    /// NVD API key; raises the NVD token bucket from 5 to 50 per window
    pub nvd_api_key: Option<String>,
    /// MSRC API key
    pub msrc_api_key: Option<String>,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_collections: 3,
            request_timeout_seconds: 30,
            retry: RetryConfig::default(),
            rate_limit_max_requests: 10,
            rate_limit_window_seconds: 60,
            failure_threshold: 3,
            alert_cooldown_hours: 24,
            nvd_api_key: None,
            msrc_api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_seconds: f64,
    pub max_delay_seconds: f64,
    pub backoff_base: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_seconds: 1.0,
            max_delay_seconds: 60.0,
            backoff_base: 2.0,
        }
    }
}

/// Risk scoring weight constants; the formula itself is fixed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskWeightsConfig {
    /// Added per 10 affected assets
    pub asset_count_weight_per_10: f64,
    /// Added when an enabled high-priority PIR matches
    pub pir_high_priority_weight: f64,
    /// Added when the owning feed is the CISA KEV catalogue
    pub kev_weight: f64,
    /// Final score at or above which an IT ticket is generated
    pub ticket_threshold: f64,
}

impl Default for RiskWeightsConfig {
    fn default() -> Self {
        Self {
            asset_count_weight_per_10: 0.1,
            pir_high_priority_weight: 0.3,
            kev_weight: 0.5,
            ticket_threshold: 6.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Root directory for rendered report files
    pub base_dir: String,
    /// Operator timezone as a fixed offset, e.g. "+08:00"
    pub timezone_offset: String,
    /// Cron expression for the weekly CISO report (seconds-resolution field set)
    pub weekly_cron: String,
    /// Number of threats listed in the weekly digest table
    pub weekly_top_n: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            base_dir: "./reports".to_string(),
            timezone_offset: "+00:00".to_string(),
            weekly_cron: "0 0 9 * * Mon".to_string(),
            weekly_top_n: 10,
        }
    }
}

impl ReportConfig {
    /// Parse the configured offset; falls back to UTC on a malformed value.
    pub fn timezone(&self) -> FixedOffset {
        parse_fixed_offset(&self.timezone_offset).unwrap_or_else(|| {
            warn!(offset = %self.timezone_offset, "Malformed timezone offset, using UTC");
            FixedOffset::east_opt(0).expect("UTC offset")
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationDefaultsConfig {
    /// Default threshold for CriticalThreat rules
    pub critical_threshold: f64,
    /// Default threshold for the daily high-risk digest
    pub digest_threshold: f64,
    /// Default send time for digests, "HH:MM" in operator timezone
    pub digest_send_time: String,
}

impl Default for NotificationDefaultsConfig {
    fn default() -> Self {
        Self {
            critical_threshold: 8.0,
            digest_threshold: 6.0,
            digest_send_time: "08:00".to_string(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            ai_service: AiServiceConfig::default(),
            smtp: SmtpConfig::default(),
            collection: CollectionConfig::default(),
            risk: RiskWeightsConfig::default(),
            reports: ReportConfig::default(),
            notifications: NotificationDefaultsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration: defaults, then `config/{env}.toml` when present,
    /// then `AETIM__section__key` environment overrides, then the well-known
    /// environment options.
    pub fn load() -> ConfigResult<Self> {
        let environment = RuntimeEnvironment::current();
        info!(environment = %environment, "Loading configuration");

        let builder = Config::builder()
            .add_source(Config::try_from(&AppConfig::default()).map_err(|e| {
                ConfigError::Load(format!("Failed to seed defaults: {}", e))
            })?)
            .add_source(
                File::with_name(&format!("config/{}", environment.config_file_name()))
                    .required(false),
            )
            .add_source(Environment::with_prefix("AETIM").separator("__"));

        let mut config: AppConfig = builder
            .build()
            .map_err(|e| ConfigError::Load(e.to_string()))?
            .try_deserialize()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        config.apply_well_known_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply the environment options recognised by the deployment contract.
    pub fn apply_well_known_env(&mut self) {
        if let Ok(url) = env::var("AI_SERVICE_URL") {
            self.ai_service.base_url = url;
        }
        if let Ok(timeout) = env::var("AI_SERVICE_TIMEOUT") {
            match timeout.parse() {
                Ok(seconds) => self.ai_service.timeout_seconds = seconds,
                Err(_) => warn!(value = %timeout, "Ignoring malformed AI_SERVICE_TIMEOUT"),
            }
        }
        if let Ok(tz) = env::var("TZ") {
            if let Some(offset) = tz_to_offset(&tz) {
                self.reports.timezone_offset = offset;
            }
        }
        if let Ok(host) = env::var("SMTP_HOST") {
            self.smtp.host = host;
        }
        if let Ok(port) = env::var("SMTP_PORT") {
            match port.parse() {
                Ok(port) => self.smtp.port = port,
                Err(_) => warn!(value = %port, "Ignoring malformed SMTP_PORT"),
            }
        }
        if let Ok(user) = env::var("SMTP_USER") {
            self.smtp.username = user;
        }
        if let Ok(pass) = env::var("SMTP_PASS") {
            self.smtp.password = pass;
        }
        if let Ok(tls) = env::var("SMTP_TLS") {
            self.smtp.use_tls = matches!(tls.to_lowercase().as_str(), "1" | "true" | "yes");
        }
    }

    /// Reject configurations that cannot possibly work.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.collection.max_concurrent_collections == 0 {
            return Err(ConfigError::Invalid(
                "collection.max_concurrent_collections must be at least 1".to_string(),
            ));
        }
        if self.collection.retry.backoff_base < 1.0 {
            return Err(ConfigError::Invalid(
                "collection.retry.backoff_base must be >= 1.0".to_string(),
            ));
        }
        for (name, value) in [
            ("notifications.critical_threshold", self.notifications.critical_threshold),
            ("notifications.digest_threshold", self.notifications.digest_threshold),
            ("risk.ticket_threshold", self.risk.ticket_threshold),
        ] {
            if !(0.0..=10.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be between 0.0 and 10.0",
                    name
                )));
            }
        }
        if parse_fixed_offset(&self.reports.timezone_offset).is_none() {
            return Err(ConfigError::Invalid(format!(
                "reports.timezone_offset is not a valid offset: {}",
                self.reports.timezone_offset
            )));
        }
        Ok(())
    }
}

/// Parse an offset of the form "+HH:MM" / "-HH:MM".
fn parse_fixed_offset(value: &str) -> Option<FixedOffset> {
    let value = value.trim();
    let (sign, rest) = match value.as_bytes().first()? {
        b'+' => (1, &value[1..]),
        b'-' => (-1, &value[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':')?;
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 14 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Map the `TZ` deployment variable to a fixed offset when it carries one
/// (`UTC+8`, `UTC-05:30`). Named zone databases are out of scope; anything
/// else leaves the configured offset untouched.
fn tz_to_offset(tz: &str) -> Option<String> {
    let rest = tz.strip_prefix("UTC").or_else(|| tz.strip_prefix("GMT"))?;
    if rest.is_empty() {
        return Some("+00:00".to_string());
    }
    let (sign, digits) = rest.split_at(1);
    if sign != "+" && sign != "-" {
        return None;
    }
    if let Some((h, m)) = digits.split_once(':') {
        let h: u32 = h.parse().ok()?;
        let m: u32 = m.parse().ok()?;
        Some(format!("{}{:02}:{:02}", sign, h, m))
    } else {
        let h: u32 = digits.parse().ok()?;
        Some(format!("{}{:02}:00", sign, h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.collection.max_concurrent_collections, 3);
        assert_eq!(config.collection.failure_threshold, 3);
        assert_eq!(config.risk.ticket_threshold, 6.0);
        assert_eq!(config.notifications.critical_threshold, 8.0);
    }

    #[test]
    fn test_parse_fixed_offset() {
        assert_eq!(
            parse_fixed_offset("+08:00"),
            FixedOffset::east_opt(8 * 3600)
        );
        assert_eq!(
            parse_fixed_offset("-05:30"),
            FixedOffset::east_opt(-(5 * 3600 + 30 * 60))
        );
        assert!(parse_fixed_offset("08:00").is_none());
        assert!(parse_fixed_offset("+25:00").is_none());
    }

    #[test]
    fn test_tz_to_offset() {
        assert_eq!(tz_to_offset("UTC+8").as_deref(), Some("+08:00"));
        assert_eq!(tz_to_offset("UTC-05:30").as_deref(), Some("-05:30"));
        assert_eq!(tz_to_offset("UTC").as_deref(), Some("+00:00"));
        assert!(tz_to_offset("Asia/Taipei").is_none());
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let mut config = AppConfig::default();
        config.notifications.critical_threshold = 11.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = AppConfig::default();
        config.collection.max_concurrent_collections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_report_timezone_fallback() {
        let mut config = ReportConfig::default();
        config.timezone_offset = "bogus".to_string();
        assert_eq!(config.timezone(), FixedOffset::east_opt(0).unwrap());
    }
}
