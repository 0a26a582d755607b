use serde::Deserialize;

use std::time::Duration;

use crate::types::{
    BudgetScope, DEFAULT_BACKOFF_SECS, DEFAULT_MAX_ATTEMPTS, MAX_BACKOFF_SECS, RetryPolicy,
};

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string. When absent, notifications live in memory only.
    pub database_url: Option<String>,

    /// Maximum number of PostgreSQL connections in the pool (default: 10)
    pub db_max_connections: u32,

    /// Port for the HTTP front door (default: 8010)
    pub api_port: u16,

    /// Per-channel provider credentials
    pub credentials: ProviderCredentials,

    /// Retry / fallback policy
    pub retry: RetryPolicy,

    /// Worker scan interval in seconds (default: 30)
    pub worker_scan_interval_secs: u64,

    /// Maximum concurrent dispatches per scan (default: 8)
    pub worker_max_in_flight: usize,

    /// Timeout for a single provider call in seconds (default: 15)
    pub adapter_timeout_secs: u64,

    /// Terminal notifications older than this are purged (default: 24)
    pub retention_hours: u64,

    /// Brand name and link targets for call-to-action buttons
    pub branding: BrandingConfig,
}

/// Provider credentials, opaque to the delivery core.
///
/// A channel whose credentials are missing is simply not configured.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderCredentials {
    /// Telegram bot token
    pub telegram_bot_token: Option<String>,

    /// Resend API key for email delivery
    pub resend_api_key: Option<String>,

    /// Email sender address
    pub email_from: String,

    /// WhatsApp Cloud API access token
    pub whatsapp_access_token: Option<String>,

    /// WhatsApp business phone number id
    pub whatsapp_phone_number_id: Option<String>,
}

/// Sender branding plus static links rendered as buttons or call-to-action lines.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BrandingConfig {
    pub brand_name: String,
    pub website_url: String,
    pub contact_email: String,
    pub dashboard_url: String,
    pub contact_url: String,
    pub support_url: String,
}

impl Default for BrandingConfig {
    fn default() -> Self {
        Self {
            brand_name: "Herald".to_string(),
            website_url: "https://herald.local".to_string(),
            contact_email: "contact@herald.local".to_string(),
            dashboard_url: "http://localhost:3000/dashboard".to_string(),
            contact_url: "http://localhost:3000/contact".to_string(),
            support_url: "https://t.me/herald_support".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let branding = BrandingConfig::default();

        let config = Self {
            database_url: std::env::var("DATABASE_URL").ok(),
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", 10)?,
            api_port: parse_var("API_PORT", 8010)?,
            credentials: ProviderCredentials {
                telegram_bot_token: std::env::var("TELEGRAM_BOT_TOKEN").ok(),
                resend_api_key: std::env::var("RESEND_API_KEY").ok(),
                email_from: std::env::var("EMAIL_FROM")
                    .unwrap_or_else(|_| "notifications@herald.local".to_string()),
                whatsapp_access_token: std::env::var("WHATSAPP_ACCESS_TOKEN").ok(),
                whatsapp_phone_number_id: std::env::var("WHATSAPP_PHONE_NUMBER_ID").ok(),
            },
            retry: RetryPolicy {
                max_attempts: parse_var("RETRY_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?,
                backoff_secs: match std::env::var("RETRY_BACKOFF_SECS") {
                    Ok(raw) => parse_backoff(&raw)?,
                    Err(_) => DEFAULT_BACKOFF_SECS.to_vec(),
                },
                budget: match std::env::var("RETRY_BUDGET") {
                    Ok(raw) => raw
                        .parse::<BudgetScope>()
                        .map_err(|e| anyhow::anyhow!("RETRY_BUDGET: {}", e))?,
                    Err(_) => BudgetScope::PerChannel,
                },
            },
            worker_scan_interval_secs: parse_var("WORKER_SCAN_INTERVAL_SECS", 30)?,
            worker_max_in_flight: parse_var("WORKER_MAX_IN_FLIGHT", 8)?,
            adapter_timeout_secs: parse_var("ADAPTER_TIMEOUT_SECS", 15)?,
            retention_hours: parse_var("RETENTION_HOURS", 24)?,
            branding: BrandingConfig {
                brand_name: std::env::var("BRAND_NAME").unwrap_or(branding.brand_name),
                website_url: std::env::var("WEBSITE_URL").unwrap_or(branding.website_url),
                contact_email: std::env::var("CONTACT_EMAIL").unwrap_or(branding.contact_email),
                dashboard_url: std::env::var("DASHBOARD_URL").unwrap_or(branding.dashboard_url),
                contact_url: std::env::var("CONTACT_URL").unwrap_or(branding.contact_url),
                support_url: std::env::var("SUPPORT_URL").unwrap_or(branding.support_url),
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the delivery core cannot honour.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.retry.max_attempts == 0 {
            anyhow::bail!("RETRY_MAX_ATTEMPTS must be at least 1");
        }
        if self.retention_hours.checked_mul(60 * 60).is_none() {
            anyhow::bail!("RETENTION_HOURS is too large");
        }
        Ok(())
    }

    /// Retention window for terminal notifications.
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours.saturating_mul(60 * 60))
    }

    /// Configuration with defaults only and no provider credentials.
    pub fn defaults() -> Self {
        Self {
            database_url: None,
            db_max_connections: 10,
            api_port: 8010,
            credentials: ProviderCredentials {
                email_from: "notifications@herald.local".to_string(),
                ..Default::default()
            },
            retry: RetryPolicy::default(),
            worker_scan_interval_secs: 30,
            worker_max_in_flight: 8,
            adapter_timeout_secs: 15,
            retention_hours: 24,
            branding: BrandingConfig::default(),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| {
            anyhow::anyhow!(
                "{} must be a valid {}",
                name,
                std::any::type_name::<T>()
            )
        }),
        Err(_) => Ok(default),
    }
}

/// Parse a comma-separated list of seconds, e.g. `30,120,300,900`. Delays
/// above [`MAX_BACKOFF_SECS`] are rejected.
pub fn parse_backoff(raw: &str) -> anyhow::Result<Vec<u64>> {
    let delays = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| -> anyhow::Result<u64> {
            let secs = s
                .parse::<u64>()
                .map_err(|_| anyhow::anyhow!("RETRY_BACKOFF_SECS entry '{}' is not a number", s))?;
            if secs > MAX_BACKOFF_SECS {
                anyhow::bail!(
                    "RETRY_BACKOFF_SECS entry {} exceeds the maximum of {}",
                    secs,
                    MAX_BACKOFF_SECS
                );
            }
            Ok(secs)
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    if delays.is_empty() {
        anyhow::bail!("RETRY_BACKOFF_SECS must list at least one delay");
    }
    Ok(delays)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backoff() {
        assert_eq!(parse_backoff("30, 120,300").unwrap(), vec![30, 120, 300]);
        assert_eq!(parse_backoff("5").unwrap(), vec![5]);
        assert!(parse_backoff("").is_err());
        assert!(parse_backoff("30,soon").is_err());
    }

    #[test]
    fn test_parse_backoff_rejects_huge_delays() {
        assert!(parse_backoff("30,10000000000000000").is_err());
        assert_eq!(
            parse_backoff(&MAX_BACKOFF_SECS.to_string()).unwrap(),
            vec![MAX_BACKOFF_SECS]
        );
    }

    #[test]
    fn test_validate() {
        assert!(AppConfig::defaults().validate().is_ok());

        let mut zero_attempts = AppConfig::defaults();
        zero_attempts.retry.max_attempts = 0;
        assert!(zero_attempts.validate().is_err());

        let mut huge_retention = AppConfig::defaults();
        huge_retention.retention_hours = u64::MAX / 60;
        assert!(huge_retention.validate().is_err());
        assert_eq!(huge_retention.retention(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::defaults();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.backoff_secs, vec![30, 120, 300, 900]);
        assert_eq!(config.worker_scan_interval_secs, 30);
        assert_eq!(config.retention(), Duration::from_secs(24 * 60 * 60));
        assert!(config.credentials.telegram_bot_token.is_none());
        assert!(config.database_url.is_none());
    }
}
