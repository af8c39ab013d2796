//! Runtime configuration read from the environment.

use std::env;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone, Debug, Default)]
pub struct QstashConfig {
    pub token: Option<String>,
    pub url: String,
    pub current_signing_key: Option<String>,
    pub next_signing_key: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct EmailJsConfig {
    pub service_id: String,
    pub public_key: String,
    pub access_token: Option<String>,
    pub order_template_id: String,
    pub reminder_template_id: Option<String>,
    pub verification_template_id: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct S3Config {
    pub region: Option<String>,
    pub bucket: Option<String>,
    pub public_base_url: Option<String>,
    pub object_acl: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_ttl_secs: i64,
    pub app_base_url: Option<String>,
    pub cors_origins: Vec<String>,
    pub nats_url: Option<String>,
    pub reminder_delays_secs: Vec<u64>,
    pub qstash: QstashConfig,
    /// `None` when any of the required EmailJS keys is missing.
    pub emailjs: Option<EmailJsConfig>,
    pub s3: S3Config,
}

pub const DEFAULT_REMINDER_DELAYS_SECS: [u64; 2] = [24 * 60 * 60, 48 * 60 * 60];

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let port = match get("PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid { key: "PORT", value: raw })?,
            None => 8083,
        };
        let jwt_ttl_secs = match get("JWT_TTL_SECS") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid { key: "JWT_TTL_SECS", value: raw })?,
            None => 7 * 24 * 60 * 60,
        };
        let reminder_delays_secs = match get("REMINDER_DELAYS_SECS") {
            Some(raw) => parse_list(&raw)
                .map(|v| v.parse::<u64>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| ConfigError::Invalid { key: "REMINDER_DELAYS_SECS", value: raw })?,
            None => DEFAULT_REMINDER_DELAYS_SECS.to_vec(),
        };

        let emailjs = match (get("EMAILJS_SERVICE_ID"), get("EMAILJS_PUBLIC_KEY"), get("EMAILJS_TEMPLATE_ID")) {
            (Some(service_id), Some(public_key), Some(order_template_id)) => Some(EmailJsConfig {
                service_id,
                public_key,
                access_token: get("EMAILJS_ACCESS_TOKEN"),
                order_template_id,
                reminder_template_id: get("EMAILJS_REMINDER_TEMPLATE_ID"),
                verification_template_id: get("EMAILJS_VERIFICATION_TEMPLATE_ID"),
            }),
            _ => None,
        };

        Ok(Self {
            port,
            database_url: require("DATABASE_URL")?,
            jwt_secret: require("JWT_SECRET")?,
            jwt_ttl_secs,
            app_base_url: get("APP_BASE_URL").map(|u| u.trim_end_matches('/').to_string()),
            cors_origins: get("CORS_ORIGINS").map(|raw| parse_list(&raw).map(String::from).collect()).unwrap_or_default(),
            nats_url: get("NATS_URL"),
            reminder_delays_secs,
            qstash: QstashConfig {
                token: get("QSTASH_TOKEN"),
                url: get("QSTASH_URL").unwrap_or_else(|| "https://qstash.upstash.io".to_string()),
                current_signing_key: get("QSTASH_CURRENT_SIGNING_KEY"),
                next_signing_key: get("QSTASH_NEXT_SIGNING_KEY"),
            },
            emailjs,
            s3: S3Config {
                region: get("AWS_REGION"),
                bucket: get("AWS_S3_BUCKET"),
                public_base_url: get("AWS_S3_PUBLIC_BASE_URL"),
                object_acl: get("AWS_S3_OBJECT_ACL"),
            },
        })
    }
}

fn parse_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}
