use anyhow::{Context, Result};

use crate::llm_client::DEFAULT_BASE_URL;

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub redis_url: String,
    /// Present only when every S3 variable is set.
    pub archive: Option<ArchiveConfig>,
    pub port: u16,
    pub rust_log: String,
}

#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("Required environment variable '{key}' is not set"))
        };

        let archive = match (
            lookup("S3_BUCKET"),
            lookup("S3_ENDPOINT"),
            lookup("AWS_ACCESS_KEY_ID"),
            lookup("AWS_SECRET_ACCESS_KEY"),
        ) {
            (Some(s3_bucket), Some(s3_endpoint), Some(aws_access_key_id), Some(aws_secret_access_key)) => {
                Some(ArchiveConfig {
                    s3_bucket,
                    s3_endpoint,
                    aws_access_key_id,
                    aws_secret_access_key,
                })
            }
            _ => None,
        };

        Ok(Config {
            openai_api_key: require("OPENAI_API_KEY")?,
            openai_base_url: lookup("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            redis_url: require("REDIS_URL")?,
            archive,
            port: lookup("PORT")
                .unwrap_or_else(|| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }
}
