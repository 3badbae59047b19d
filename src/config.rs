use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "prod" | "production" => Self::Prod,
            "staging" => Self::Staging,
            _ => Self::Dev,
        }
    }

    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Dev)
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub env: Environment,
    pub server_addr: String,
    pub max_body_bytes: usize,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,
    pub run_migrations: bool,

    // Redis
    pub redis_url: String,
    pub redis_cache_ttl_seconds: u64,

    // CORS
    pub cors_allow_origins: Vec<String>,

    // Generative AI
    pub ai_api_url: String,
    pub ai_api_key: String,
    pub ai_model: String,
    pub ai_timeout_seconds: u64,
    pub ai_max_retries: u32,

    // Devis taxes
    pub tax: TaxRates,
}

/// Rates applied to a devis subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaxRates {
    pub tva: Decimal,
    pub css: Decimal,
}

impl Default for TaxRates {
    fn default() -> Self {
        Self {
            tva: Decimal::new(18, 2),
            css: Decimal::new(1, 2),
        }
    }
}

/// Read an optional variable and parse it, falling back to `default` when
/// unset or unparseable.
fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let env = Environment::parse(&env::var("ENV").unwrap_or_else(|_| "dev".to_string()));
        let server_addr = env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let max_body_bytes = parse_or("MAX_BODY_BYTES", 2 * 1024 * 1024);

        // Database
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_connections = parse_or("DATABASE_MAX_CONNECTIONS", 10);
        let run_migrations = env::var("RUN_MIGRATIONS")
            .map(|v| parse_bool(&v))
            .unwrap_or(true);

        // Redis
        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/0".to_string());
        let redis_cache_ttl_seconds = parse_or("REDIS_CACHE_TTL_SECONDS", 600);

        // CORS
        let cors_allow_origins = split_origins(
            &env::var("CORS_ALLOW_ORIGINS").unwrap_or_else(|_| "http://localhost:3000".to_string()),
        );

        // Generative AI
        let ai_api_url = env::var("AI_API_URL")
            .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string());
        let ai_api_key = env::var("AI_API_KEY").context("AI_API_KEY must be set")?;
        let ai_model = env::var("AI_MODEL").unwrap_or_else(|_| "gemini-1.5-flash".to_string());
        let ai_timeout_seconds = parse_or("AI_TIMEOUT_SECONDS", 60);
        let ai_max_retries = parse_or("AI_MAX_RETRIES", 2);

        // Devis taxes
        let defaults = TaxRates::default();
        let tax = TaxRates {
            tva: parse_or("TAX_TVA_RATE", defaults.tva),
            css: parse_or("TAX_CSS_RATE", defaults.css),
        };

        Ok(Settings {
            env,
            server_addr,
            max_body_bytes,
            database_url,
            database_max_connections,
            run_migrations,
            redis_url,
            redis_cache_ttl_seconds,
            cors_allow_origins,
            ai_api_url,
            ai_api_key,
            ai_model,
            ai_timeout_seconds,
            ai_max_retries,
            tax,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parsing_defaults_to_dev() {
        assert_eq!(Environment::parse("production"), Environment::Prod);
        assert_eq!(Environment::parse("PROD"), Environment::Prod);
        assert_eq!(Environment::parse("staging"), Environment::Staging);
        assert_eq!(Environment::parse("whatever"), Environment::Dev);
    }

    #[test]
    fn bool_flags() {
        assert!(parse_bool("true"));
        assert!(parse_bool(" 1 "));
        assert!(parse_bool("Yes"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool(""));
    }

    #[test]
    fn origins_are_trimmed_and_empty_entries_dropped() {
        assert_eq!(
            split_origins("http://a.test, ,http://b.test ,"),
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
    }

    #[test]
    fn default_tax_rates() {
        let rates = TaxRates::default();
        assert_eq!(rates.tva.to_string(), "0.18");
        assert_eq!(rates.css.to_string(), "0.01");
    }
}
