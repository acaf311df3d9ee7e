//! Environment-variable-driven configuration.
//!
//! Unlike the TOML-file config this crate's structure is modeled on, every
//! key here comes from the process environment (optionally pre-loaded from
//! a `.env` file via `dotenvy`). Unrecognized variables are ignored;
//! recognized variables that fail to parse are a hard [`crate::Error::Config`]
//! at startup, never a panic.

use crate::error::{Error, Result};
use std::env;
use std::time::Duration;

/// Top-level configuration, assembled once by [`Config::from_env`].
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub tmdb: TmdbConfig,
    pub cron: CronConfig,
    pub logging: LoggingConfig,
    pub webhook: WebhookConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub uri: String,
    pub enable_unaccent: bool,
}

#[derive(Debug, Clone)]
pub struct TmdbConfig {
    pub read_access_token: String,
    /// Permits per second for the rate limiter. Upstream caps at 50.
    pub rate_limit: u32,
    /// Max concurrent in-flight requests.
    pub max_connections: u32,
    /// Rows per multi-row INSERT in the bulk loader.
    pub batch_insert: u32,
}

impl TmdbConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(30)
    }
}

/// The four configured job schedules, each either a 5-field CRON
/// expression or a disable token.
#[derive(Debug, Clone)]
pub struct CronConfig {
    pub full_sweep: Option<String>,
    pub missing_only: Option<String>,
    pub prune: Option<String>,
    pub changes_sync: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub to_console: bool,
    /// Syslog-style integer level: 10/20/30/40/50.
    pub level: u8,
}

impl LoggingConfig {
    /// Maps the syslog-style integer level onto a tracing filter directive.
    pub fn as_filter_str(&self) -> &'static str {
        match self.level {
            0..=10 => "trace",
            11..=20 => "debug",
            21..=30 => "info",
            31..=40 => "warn",
            _ => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub enabled: bool,
    pub username: String,
    pub password: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub enabled: bool,
    pub port: u16,
    pub api_key: Option<String>,
}

const DISABLE_TOKENS: [&str; 6] = ["", "false", "off", "disable", "disabled", "no"];

/// Normalizes a CRON configuration value: disable tokens (case-insensitive)
/// become `None`; anything else is kept as a candidate CRON expression to
/// be parsed by the scheduler.
pub fn parse_cron_slot(raw: Option<String>) -> Option<String> {
    let raw = raw?;
    if DISABLE_TOKENS.contains(&raw.trim().to_ascii_lowercase().as_str()) {
        None
    } else {
        Some(raw)
    }
}

fn env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_bool(key: &str, default: bool) -> Result<bool> {
    match env_var(key) {
        None => Ok(default),
        Some(v) => match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(Error::config(format!(
                "{key}: expected a boolean, got {other:?}"
            ))),
        },
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env_var(key) {
        None => Ok(default),
        Some(v) => v
            .parse()
            .map_err(|_| Error::config(format!("{key}: could not parse {v:?}"))),
    }
}

impl Config {
    /// Loads `.env` if present (process env always wins), then assembles and
    /// validates the full configuration.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let database = DatabaseConfig {
            uri: env_var("DATABASE_URI")
                .ok_or_else(|| Error::config("DATABASE_URI is required"))?,
            enable_unaccent: env_bool("ENABLE_UNACCENT", false)?,
        };

        let tmdb = TmdbConfig {
            read_access_token: env_var("TMDB_READ_ACCESS_TOKEN")
                .ok_or_else(|| Error::config("TMDB_READ_ACCESS_TOKEN is required"))?,
            rate_limit: env_parsed("TMDB_RATE_LIMIT", 40u32)?,
            max_connections: env_parsed("TMDB_MAX_CONNECTIONS", 16u32)?,
            batch_insert: env_parsed("TMDB_BATCH_INSERT", 500u32)?,
        };

        let cron = CronConfig {
            full_sweep: parse_cron_slot(env_var("CRON_FULL_SWEEP")),
            missing_only: parse_cron_slot(env_var("CRON_MISSING_ONLY")),
            prune: parse_cron_slot(env_var("CRON_PRUNE")),
            changes_sync: parse_cron_slot(env_var("CRON_CHANGES_SYNC")),
        };

        let logging = LoggingConfig {
            to_console: env_bool("LOG_TO_CONSOLE", true)?,
            level: env_parsed("LOG_LVL", 20u8)?,
        };

        let webhook = WebhookConfig {
            enabled: env_bool("WEBHOOK_ENABLED", false)?,
            username: env_var("WEBHOOK_BOT_USR").unwrap_or_default(),
            password: env_var("WEBHOOK_BOT_PW").unwrap_or_default(),
            url: env_var("WEBHOOK_URL").unwrap_or_default(),
        };

        let api = ApiConfig {
            enabled: env_bool("API_ENABLED", false)?,
            port: env_parsed("API_PORT", 8080u16)?,
            api_key: env_var("API_KEY"),
        };

        let config = Config {
            database,
            tmdb,
            cron,
            logging,
            webhook,
            api,
        };
        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks that can't be expressed while parsing a single key.
    pub fn validate(&self) -> Result<()> {
        if self.tmdb.rate_limit == 0 {
            return Err(Error::config("TMDB_RATE_LIMIT must be greater than zero"));
        }
        if self.tmdb.rate_limit > 50 {
            return Err(Error::config(
                "TMDB_RATE_LIMIT exceeds the upstream cap of 50/sec",
            ));
        }
        if self.tmdb.max_connections == 0 {
            return Err(Error::config(
                "TMDB_MAX_CONNECTIONS must be greater than zero",
            ));
        }
        if self.webhook.enabled && self.webhook.url.is_empty() {
            return Err(Error::config("WEBHOOK_ENABLED=true requires WEBHOOK_URL"));
        }
        if self.api.enabled && self.api.port == 0 {
            return Err(Error::config("API_ENABLED=true requires a nonzero API_PORT"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cron_disable_tokens_are_case_insensitive() {
        for token in ["", "false", "OFF", "Disable", "DISABLED", "No"] {
            assert_eq!(parse_cron_slot(Some(token.to_string())), None, "{token}");
        }
    }

    #[test]
    fn cron_real_expression_survives() {
        assert_eq!(
            parse_cron_slot(Some("0 3 * * *".to_string())),
            Some("0 3 * * *".to_string())
        );
    }

    #[test]
    fn cron_missing_slot_is_none() {
        assert_eq!(parse_cron_slot(None), None);
    }

    #[test]
    fn logging_level_mapping() {
        assert_eq!(LoggingConfig { to_console: true, level: 10 }.as_filter_str(), "trace");
        assert_eq!(LoggingConfig { to_console: true, level: 20 }.as_filter_str(), "debug");
        assert_eq!(LoggingConfig { to_console: true, level: 30 }.as_filter_str(), "info");
        assert_eq!(LoggingConfig { to_console: true, level: 40 }.as_filter_str(), "warn");
        assert_eq!(LoggingConfig { to_console: true, level: 50 }.as_filter_str(), "error");
    }

    #[test]
    fn webhook_enabled_without_url_fails_validation() {
        let cfg = Config {
            database: DatabaseConfig { uri: "postgres://x".into(), enable_unaccent: false },
            tmdb: TmdbConfig {
                read_access_token: "token".into(),
                rate_limit: 40,
                max_connections: 16,
                batch_insert: 500,
            },
            cron: CronConfig { full_sweep: None, missing_only: None, prune: None, changes_sync: None },
            logging: LoggingConfig { to_console: true, level: 20 },
            webhook: WebhookConfig {
                enabled: true,
                username: String::new(),
                password: String::new(),
                url: String::new(),
            },
            api: ApiConfig { enabled: false, port: 8080, api_key: None },
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rate_limit_over_upstream_cap_fails_validation() {
        let cfg = Config {
            database: DatabaseConfig { uri: "postgres://x".into(), enable_unaccent: false },
            tmdb: TmdbConfig {
                read_access_token: "token".into(),
                rate_limit: 51,
                max_connections: 16,
                batch_insert: 500,
            },
            cron: CronConfig { full_sweep: None, missing_only: None, prune: None, changes_sync: None },
            logging: LoggingConfig { to_console: true, level: 20 },
            webhook: WebhookConfig { enabled: false, username: String::new(), password: String::new(), url: String::new() },
            api: ApiConfig { enabled: false, port: 8080, api_key: None },
        };
        assert!(cfg.validate().is_err());
    }
}
