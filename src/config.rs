use serde::Deserialize;

use crate::workflow::transition::ReviewPolicy;

const DEFAULT_API_URL: &str = "http://localhost:8080/api";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the back-office REST API.
    pub api_url: String,
    /// Bearer token sent on every request, if set.
    pub api_token: Option<String>,
    /// Per-request timeout. Set via MINEOPS_TIMEOUT_SECS. Default: 30.
    pub timeout_secs: u64,
    /// Retries for transient read failures. Mutations are never retried.
    pub max_retries: u32,
    /// How long a fetched list stays fresh in the query cache.
    pub cache_ttl_secs: u64,
    pub page_size: usize,
    /// Whether APPROVED records are closed to further decisions.
    /// Set via MINEOPS_APPROVED_IS_TERMINAL. Default: true.
    pub approved_is_terminal: bool,
    /// Emit JSON log lines instead of the human formatter.
    pub log_json: bool,
}

impl Config {
    pub fn review_policy(&self) -> ReviewPolicy {
        ReviewPolicy {
            approved_is_terminal: self.approved_is_terminal,
        }
    }
}

/// Load `.env` and read the process environment. `offline` runs against
/// the seeded demo store, so no API URL is required even in production.
pub fn load(offline: bool) -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();
    load_from(|key| std::env::var(key).ok(), offline)
}

/// Formatter choice, read on its own so logging can start before the rest
/// of the config is loaded.
pub fn log_json_requested<F>(var: F) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    var("MINEOPS_LOG_JSON").map(|v| parse_flag(&v)).unwrap_or(false)
}

/// Build a config from an arbitrary variable lookup.
pub fn load_from<F>(var: F, offline: bool) -> anyhow::Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let api_url = match var("MINEOPS_API_URL").filter(|v| !v.trim().is_empty()) {
        Some(url) => url.trim().to_string(),
        None => {
            let env_mode = var("MINEOPS_ENV")
                .or_else(|| var("RUST_ENV"))
                .unwrap_or_default();
            if env_mode == "production" && !offline {
                anyhow::bail!("MINEOPS_API_URL must be set when running in production.");
            }
            if !offline {
                tracing::warn!("MINEOPS_API_URL is not set, using {}", DEFAULT_API_URL);
            }
            DEFAULT_API_URL.to_string()
        }
    };

    Ok(Config {
        api_url,
        api_token: var("MINEOPS_API_TOKEN").filter(|v| !v.is_empty()),
        timeout_secs: var("MINEOPS_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(30),
        max_retries: var("MINEOPS_MAX_RETRIES")
            .and_then(|v| v.parse().ok())
            .unwrap_or(2),
        cache_ttl_secs: var("MINEOPS_CACHE_TTL_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(60),
        page_size: var("MINEOPS_PAGE_SIZE")
            .and_then(|v| v.parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or(10),
        approved_is_terminal: var("MINEOPS_APPROVED_IS_TERMINAL")
            .map(|v| parse_flag(&v))
            .unwrap_or(true),
        log_json: log_json_requested(&var),
    })
}

fn parse_flag(v: &str) -> bool {
    matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = load_from(env(&[]), false).unwrap();
        assert_eq!(cfg.api_url, DEFAULT_API_URL);
        assert_eq!(cfg.timeout_secs, 30);
        assert_eq!(cfg.max_retries, 2);
        assert_eq!(cfg.page_size, 10);
        assert!(cfg.approved_is_terminal);
        assert!(!cfg.log_json);
        assert!(cfg.api_token.is_none());
    }

    #[test]
    fn test_overrides() {
        let cfg = load_from(env(&[
            ("MINEOPS_API_URL", "https://ops.example.com/api/v2"),
            ("MINEOPS_API_TOKEN", "tok"),
            ("MINEOPS_PAGE_SIZE", "25"),
            ("MINEOPS_APPROVED_IS_TERMINAL", "false"),
            ("MINEOPS_LOG_JSON", "1"),
        ]), false)
        .unwrap();
        assert_eq!(cfg.api_url, "https://ops.example.com/api/v2");
        assert_eq!(cfg.api_token.as_deref(), Some("tok"));
        assert_eq!(cfg.page_size, 25);
        assert!(!cfg.review_policy().approved_is_terminal);
        assert!(cfg.log_json);
    }

    #[test]
    fn test_zero_page_size_falls_back() {
        let cfg = load_from(env(&[("MINEOPS_PAGE_SIZE", "0")]), false).unwrap();
        assert_eq!(cfg.page_size, 10);
    }

    #[test]
    fn test_production_requires_api_url() {
        assert!(load_from(env(&[("MINEOPS_ENV", "production")]), false).is_err());
    }

    #[test]
    fn test_offline_skips_api_url_in_production() {
        let cfg = load_from(env(&[("MINEOPS_ENV", "production")]), true).unwrap();
        assert_eq!(cfg.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn test_log_format_read_without_full_config() {
        // production without a URL fails to load, but the formatter choice
        // is still available for the logger that reports that failure
        let vars = env(&[("MINEOPS_ENV", "production"), ("MINEOPS_LOG_JSON", "yes")]);
        assert!(log_json_requested(&vars));
        assert!(load_from(&vars, false).is_err());
        assert!(!log_json_requested(env(&[])));
    }
}
