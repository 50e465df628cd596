//! Runtime configuration for the lexsum CLI.
//!
//! Bridges CLI flags with environment fallback: the pipeline service address
//! resolves from the `--api-url` flag, then `LEXSUM_API_URL`, then the
//! default local address.

use std::env;

/// Default address of the pipeline service.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";

/// Environment variable overriding the pipeline service address.
pub const API_URL_ENV: &str = "LEXSUM_API_URL";

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the pipeline service, without a trailing slash.
    pub api_url: String,
    pub verbose: bool,
}

impl Config {
    pub fn new(api_url: Option<String>, verbose: bool) -> Self {
        let api_url = api_url
            .or_else(|| env::var(API_URL_ENV).ok())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            verbose,
        }
    }
}
