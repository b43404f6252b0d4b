use std::env;

use anyhow::{Context, Result};

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub listen_addr: String,
    pub max_concurrency: usize,
    pub auth_token: Option<String>,
}

impl ApiConfig {
    const DEFAULT_LISTEN_ADDR: &'static str = "0.0.0.0:8080";

    pub fn from_env() -> Result<Self> {
        let listen_addr = env::var("CREWSEARCH_API_ADDR")
            .unwrap_or_else(|_| Self::DEFAULT_LISTEN_ADDR.to_string());

        let max_concurrency = match env::var("CREWSEARCH_API_MAX_CONCURRENCY") {
            Ok(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|value| *value > 0)
                .with_context(|| {
                    format!("CREWSEARCH_API_MAX_CONCURRENCY must be a positive integer, got '{raw}'")
                })?,
            Err(_) => std::thread::available_parallelism()
                .map(|nz| nz.get())
                .unwrap_or(4),
        };

        let auth_token = env::var("CREWSEARCH_API_AUTH_TOKEN")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        Ok(Self {
            listen_addr,
            max_concurrency,
            auth_token,
        })
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::DEFAULT_LISTEN_ADDR.to_string(),
            max_concurrency: 4,
            auth_token: None,
        }
    }
}
