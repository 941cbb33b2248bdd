use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub gmail: GmailConfig,
    pub extraction: ExtractionConfig,
    pub fetch: FetchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GmailConfig {
    /// Absent when running against a mailbox directory only
    pub credentials_path: Option<String>,
    pub token_cache_path: String,
    /// Key of this account's session in the token store
    pub account: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    pub days_back: u32,
    pub max_emails: usize,
    /// JSON pattern table replacing the built-in one
    pub patterns_path: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
}

impl FetchConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            max_retries: 3,
            initial_backoff_ms: 500,
        }
    }
}

impl Config {
    pub fn new() -> Result<Self> {
        Ok(Config {
            gmail: GmailConfig {
                credentials_path: std::env::var("GMAIL_CREDENTIALS_PATH").ok(),
                token_cache_path: std::env::var("GMAIL_TOKEN_CACHE_PATH")
                    .unwrap_or_else(|_| "./gmail-token-cache.json".to_string()),
                account: std::env::var("GMAIL_ACCOUNT")
                    .unwrap_or_else(|_| "default".to_string()),
            },
            extraction: ExtractionConfig {
                days_back: parse_env("EXTRACT_DAYS_BACK", 30)?,
                max_emails: parse_env("EXTRACT_MAX_EMAILS", 200)?,
                patterns_path: std::env::var("ORDER_PATTERNS_PATH").ok(),
            },
            fetch: FetchConfig {
                max_retries: parse_env("FETCH_MAX_RETRIES", 3)?,
                initial_backoff_ms: parse_env("FETCH_BACKOFF_MS", 500)?,
            },
        })
    }

    /// Path of the OAuth2 client secret, required whenever Gmail is contacted
    pub fn credentials_path(&self) -> Result<&str> {
        match self.gmail.credentials_path.as_deref() {
            Some(path) => Ok(path),
            None => anyhow::bail!(
                "Missing environment variable: GMAIL_CREDENTIALS_PATH\n\
                 \n\
                 💡 Solutions :\n\
                 1. Create a .env file with your credentials:\n\
                    GMAIL_CREDENTIALS_PATH=/path/to/client_credentials.json\n\
                    GMAIL_TOKEN_CACHE_PATH=./gmail-token-cache.json\n\
                 \n\
                 2. Or export the variables manually:\n\
                    export GMAIL_CREDENTIALS_PATH=/path/to/client_credentials.json\n\
                    ordertracker auth\n\
                 \n\
                 3. Or work offline with: ordertracker extract --mailbox-dir <DIR>"
            ),
        }
    }
}

fn parse_env<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: '{}'", name, value)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_default_and_override() {
        std::env::remove_var("ORDERTRACKER_TEST_UNSET");
        assert_eq!(parse_env("ORDERTRACKER_TEST_UNSET", 42u32).unwrap(), 42);

        std::env::set_var("ORDERTRACKER_TEST_SET", " 7 ");
        assert_eq!(parse_env("ORDERTRACKER_TEST_SET", 42u32).unwrap(), 7);

        std::env::set_var("ORDERTRACKER_TEST_BAD", "seven");
        assert!(parse_env("ORDERTRACKER_TEST_BAD", 42u32).is_err());
    }

    #[test]
    fn test_missing_credentials_is_an_error() {
        let config = Config {
            gmail: GmailConfig {
                credentials_path: None,
                token_cache_path: "./cache.json".to_string(),
                account: "default".to_string(),
            },
            extraction: ExtractionConfig {
                days_back: 30,
                max_emails: 200,
                patterns_path: None,
            },
            fetch: FetchConfig::default(),
        };
        assert!(config.credentials_path().is_err());
    }
}
