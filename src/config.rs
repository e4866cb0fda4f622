//! Application configuration management.
//!
//! Configuration is read from environment variables (optionally seeded from a
//! `.env` file) and deserialized into a type-safe struct with `envy`.

use serde::Deserialize;
use url::Url;

/// Output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `PROCESSOR_WEBHOOK_SECRET` (required): shared secret used to verify inbound processor webhooks
/// - `PARTNER_BASE_URL` (required): base URL of the banking partner API
/// - `PARTNER_API_KEY` (required): bearer token for the banking partner API
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `DATABASE_MAX_CONNECTIONS` (optional): pool size, defaults to 5
/// - `PARTNER_TIMEOUT_SECS` (optional): partner request timeout, defaults to 10
/// - `DEFAULT_CURRENCY` (optional): wallet currency for new users, defaults to NGN
/// - `MIN_VIRTUAL_ACCOUNT_KYC_LEVEL` (optional): defaults to 1
/// - `DEPOSITS_REQUIRE_SETTLEMENT` (optional): when true, deposits stay uncleared until a settlement run
/// - `BOOTSTRAP_ADMIN_KEY` (optional): API key for the first platform admin
/// - `PAYOUT_RECONCILE_INTERVAL_SECS` (optional): how often stuck payouts are requeried, defaults to 300; 0 disables
/// - `LOG_FORMAT` (optional): `pretty` or `json`
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    pub processor_webhook_secret: String,

    pub partner_base_url: Url,

    pub partner_api_key: String,

    #[serde(default = "default_partner_timeout")]
    pub partner_timeout_secs: u64,

    #[serde(default = "default_currency")]
    pub default_currency: String,

    #[serde(default = "default_min_virtual_account_kyc_level")]
    pub min_virtual_account_kyc_level: i16,

    #[serde(default)]
    pub deposits_require_settlement: bool,

    #[serde(default)]
    pub bootstrap_admin_key: Option<String>,

    #[serde(default = "default_reconcile_interval")]
    pub payout_reconcile_interval_secs: u64,

    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_port() -> u16 {
    3000
}

fn default_max_connections() -> u32 {
    5
}

fn default_partner_timeout() -> u64 {
    10
}

fn default_currency() -> String {
    "NGN".to_string()
}

fn default_min_virtual_account_kyc_level() -> i16 {
    1
}

fn default_reconcile_interval() -> u64 {
    300
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// A `.env` file is loaded first if one exists; real environment variables
    /// take precedence over it.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value cannot be
    /// parsed into its expected type.
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();

        envy::from_env::<Config>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn required() -> Vec<(String, String)> {
        vec![
            ("DATABASE_URL".into(), "postgres://localhost/backoffice".into()),
            ("PROCESSOR_WEBHOOK_SECRET".into(), "whsec".into()),
            ("PARTNER_BASE_URL".into(), "https://partner.example.com/v1/".into()),
            ("PARTNER_API_KEY".into(), "pk_test".into()),
        ]
    }

    #[test]
    fn defaults_apply_when_optional_values_are_missing() {
        let config: Config = envy::from_iter(required()).unwrap();

        assert_eq!(config.server_port, 3000);
        assert_eq!(config.database_max_connections, 5);
        assert_eq!(config.partner_timeout_secs, 10);
        assert_eq!(config.default_currency, "NGN");
        assert_eq!(config.min_virtual_account_kyc_level, 1);
        assert!(!config.deposits_require_settlement);
        assert!(config.bootstrap_admin_key.is_none());
        assert_eq!(config.payout_reconcile_interval_secs, 300);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.partner_base_url.host_str(), Some("partner.example.com"));
    }

    #[test]
    fn optional_values_override_defaults() {
        let mut vars = required();
        vars.push(("SERVER_PORT".into(), "8080".into()));
        vars.push(("DEPOSITS_REQUIRE_SETTLEMENT".into(), "true".into()));
        vars.push(("LOG_FORMAT".into(), "json".into()));
        vars.push(("BOOTSTRAP_ADMIN_KEY".into(), "admin-key".into()));
        vars.push(("PAYOUT_RECONCILE_INTERVAL_SECS".into(), "0".into()));

        let config: Config = envy::from_iter(vars).unwrap();

        assert_eq!(config.server_port, 8080);
        assert!(config.deposits_require_settlement);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.bootstrap_admin_key.as_deref(), Some("admin-key"));
        assert_eq!(config.payout_reconcile_interval_secs, 0);
    }

    #[test]
    fn missing_partner_url_is_an_error() {
        let vars: Vec<_> = required()
            .into_iter()
            .filter(|(k, _)| k != "PARTNER_BASE_URL")
            .collect();

        assert!(envy::from_iter::<_, Config>(vars).is_err());
    }

    #[test]
    fn malformed_partner_url_is_an_error() {
        let mut vars = required();
        vars.retain(|(k, _)| k != "PARTNER_BASE_URL");
        vars.push(("PARTNER_BASE_URL".into(), "not a url".into()));

        assert!(envy::from_iter::<_, Config>(vars).is_err());
    }
}
