use std::{collections::HashMap, env, fs, net::SocketAddr, path::PathBuf};

use anyhow::Result;
use tracing::warn;
use uuid::Uuid;

use crate::assistant::DEFAULT_MAX_CANDIDATES;

const FALLBACK_USER_ID: &str = "local-dev";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// Bearer token → caller user id.
    pub api_tokens: HashMap<String, String>,
    pub api_tokens_are_fallback: bool,
    pub db_path: PathBuf,
    pub catalog_path: Option<PathBuf>,
    pub seed_path: Option<PathBuf>,
    pub max_candidates: usize,
    pub log_queries: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let bind_raw =
            env::var("ASSISTANT_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let bind_normalized = bind_raw
            .trim()
            .trim_matches('"')
            .trim_matches('\'')
            .to_string();
        let bind_addr = bind_normalized
            .parse::<SocketAddr>()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 8080)));

        let (api_tokens, api_tokens_are_fallback) = resolve_api_tokens();

        let db_path = PathBuf::from(
            env::var("ASSISTANT_DB_PATH").unwrap_or_else(|_| "/data/assistant.sqlite".to_string()),
        );

        let catalog_path = optional_path("ASSISTANT_CATALOG_PATH");
        let seed_path = optional_path("ASSISTANT_SEED_PATH");

        let max_candidates = env::var("ASSISTANT_MAX_CANDIDATES")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_MAX_CANDIDATES);

        let log_queries = env::var("ASSISTANT_LOG_QUERIES")
            .ok()
            .map(|v| {
                matches!(
                    v.trim().to_ascii_lowercase().as_str(),
                    "1" | "true" | "yes" | "on"
                )
            })
            .unwrap_or(false);

        Ok(Self {
            bind_addr,
            api_tokens,
            api_tokens_are_fallback,
            db_path,
            catalog_path,
            seed_path,
            max_candidates,
            log_queries,
        })
    }
}

fn optional_path(var: &str) -> Option<PathBuf> {
    env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Parses `token=user_id` pairs separated by commas or newlines. Malformed
/// entries are skipped.
pub fn parse_token_map(raw: &str) -> HashMap<String, String> {
    raw.split([',', '\n'])
        .filter_map(|entry| {
            let (token, user_id) = entry.split_once('=')?;
            let (token, user_id) = (token.trim(), user_id.trim());
            (!token.is_empty() && !user_id.is_empty())
                .then(|| (token.to_string(), user_id.to_string()))
        })
        .collect()
}

fn resolve_api_tokens() -> (HashMap<String, String>, bool) {
    if let Ok(value) = env::var("ASSISTANT_API_TOKENS") {
        let tokens = parse_token_map(&value);
        if !tokens.is_empty() {
            return (tokens, false);
        }
        warn!("ASSISTANT_API_TOKENS has no valid token=user_id entries");
    }

    if let Ok(token_file) = env::var("ASSISTANT_API_TOKENS_FILE") {
        match fs::read_to_string(&token_file) {
            Ok(raw) => {
                let tokens = parse_token_map(&raw);
                if !tokens.is_empty() {
                    return (tokens, false);
                }
                warn!(path = %token_file, "ASSISTANT_API_TOKENS_FILE has no valid entries. Falling back to generated token.");
            }
            Err(err) => {
                warn!(path = %token_file, "Failed reading ASSISTANT_API_TOKENS_FILE: {err}. Falling back to generated token.");
            }
        }
    } else {
        warn!("ASSISTANT_API_TOKENS not set. Falling back to generated token.");
    }

    let generated = format!("fallback-{}", Uuid::new_v4());
    let tokens = HashMap::from([(generated, FALLBACK_USER_ID.to_string())]);
    (tokens, true)
}
