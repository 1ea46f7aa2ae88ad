use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;

use crate::orders::models::Tier;

const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";
const DEFAULT_LLM_MODEL: &str = "claude-sonnet-4-5";
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_SMTP_FROM: &str = "noreply@resumeshortlist.local";

/// Application configuration loaded once from environment variables.
///
/// Every external dependency is optional. A missing block means the matching
/// component is not constructed and its endpoints answer `NOT_CONFIGURED`.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    pub frontend_url: String,
    pub upstream_timeout: Duration,
    pub admin_token: Option<String>,
    pub database: Option<DatabaseConfig>,
    pub llm: Option<LlmConfig>,
    pub stripe: Option<StripeConfig>,
    pub prices: PriceBook,
    pub s3: Option<S3Config>,
    pub smtp: Option<SmtpConfig>,
    pub cors: CorsConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    pub api_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: Option<String>,
    pub api_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub from_address: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CorsConfig {
    /// Exact origins. A lone `*` means any origin (credentials disabled).
    pub origins: Vec<String>,
    /// Matched against the full origin, e.g. preview deployment hosts.
    pub origin_pattern: Option<Regex>,
}

impl CorsConfig {
    pub fn allows_any(&self) -> bool {
        self.origins.iter().any(|o| o == "*")
    }

    /// Whether `origin` is explicitly allowed. Used both by the CORS layer and
    /// when choosing checkout redirect URLs.
    pub fn is_allowed(&self, origin: &str) -> bool {
        if self.origins.iter().any(|o| o == origin) {
            return true;
        }
        self.origin_pattern
            .as_ref()
            .is_some_and(|re| re.is_match(origin))
    }
}

fn parse_origin_pattern(raw: Option<String>) -> Result<Option<Regex>> {
    raw.map(|pattern| {
        Regex::new(&pattern)
            .with_context(|| format!("CORS_ORIGIN_PATTERN '{pattern}' is not a valid regex"))
    })
    .transpose()
}

/// Provider price identifiers per tier plus the interview add-on, resolved at
/// startup from `STRIPE_PRICE_<KEY>` with the legacy `PRICE_<KEY>` fallback.
#[derive(Debug, Clone, Default)]
pub struct PriceBook {
    pub tiers: HashMap<Tier, String>,
    pub interview: Option<String>,
}

impl PriceBook {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let resolve = |key: &str| {
            lookup(&format!("STRIPE_PRICE_{key}"))
                .or_else(|| lookup(&format!("PRICE_{key}")))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let tiers = Tier::ALL
            .iter()
            .filter_map(|tier| resolve(tier.as_str()).map(|id| (*tier, id)))
            .collect();
        Self {
            tiers,
            interview: resolve("INTERVIEW"),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let database = optional_env("DATABASE_URL")
            .map(|url| -> Result<DatabaseConfig> {
                Ok(DatabaseConfig {
                    url,
                    max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 10)?,
                })
            })
            .transpose()?;

        let llm = optional_env("ANTHROPIC_API_KEY").map(|api_key| LlmConfig {
            api_key,
            model: optional_env("LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            api_url: optional_env("LLM_API_URL"),
        });

        let stripe = optional_env("STRIPE_SECRET_KEY").map(|secret_key| StripeConfig {
            secret_key,
            webhook_secret: optional_env("STRIPE_WEBHOOK_SECRET"),
            api_url: optional_env("STRIPE_API_URL"),
        });

        let s3 = match optional_env("S3_BUCKET") {
            Some(bucket) => Some(S3Config {
                bucket,
                endpoint: optional_env("S3_ENDPOINT"),
                region: optional_env("S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
                secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            }),
            None => None,
        };

        let smtp = optional_env("SMTP_HOST")
            .map(|host| -> Result<SmtpConfig> {
                Ok(SmtpConfig {
                    host,
                    port: parse_env("SMTP_PORT", DEFAULT_SMTP_PORT)?,
                    from_address: optional_env("SMTP_FROM")
                        .unwrap_or_else(|| DEFAULT_SMTP_FROM.to_string()),
                    user: optional_env("SMTP_USER"),
                    password: optional_env("SMTP_PASSWORD"),
                })
            })
            .transpose()?;

        let cors = CorsConfig {
            origins: optional_env("CORS_ORIGINS")
                .unwrap_or_else(|| "*".to_string())
                .split(',')
                .map(|o| o.trim().trim_end_matches('/').to_string())
                .filter(|o| !o.is_empty())
                .collect(),
            origin_pattern: parse_origin_pattern(optional_env("CORS_ORIGIN_PATTERN"))?,
        };

        Ok(Config {
            port: parse_env("PORT", 8080)?,
            rust_log: optional_env("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            frontend_url: optional_env("FRONTEND_URL")
                .unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string()),
            upstream_timeout: Duration::from_secs(parse_env("UPSTREAM_TIMEOUT_SECS", 20)?),
            admin_token: optional_env("ADMIN_TOKEN"),
            database,
            llm,
            stripe,
            prices: PriceBook::from_lookup(optional_env),
            s3,
            smtp,
            cors,
        })
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn require_env(key: &str) -> Result<String> {
    optional_env(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .ok()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}
