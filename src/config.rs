use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::PathBuf;

pub const DEFAULT_CACHE_DIR: &str = ".github_stats_cache";
pub const DEFAULT_CACHE_TTL: u64 = 3600;
pub const DEFAULT_MAX_CONNECTIONS: usize = 50;

/// Runtime options for one aggregation run. Built once at startup and
/// never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    pub username: String,
    pub access_token: String,
    /// Repositories (as `owner/name`) excluded from every statistic.
    pub exclude_repos: HashSet<String>,
    /// Language names excluded from the language aggregate, matched
    /// case-insensitively.
    pub exclude_langs: HashSet<String>,
    /// When set, repositories the user only contributed to are not counted.
    pub ignore_forked_repos: bool,
    pub enable_cache: bool,
    pub cache_ttl: u64,
    pub cache_dir: PathBuf,
    pub include_views: bool,
    pub include_lines_changed: bool,
    pub max_connections: usize,
}

impl Config {
    pub fn new(username: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            access_token: access_token.into(),
            exclude_repos: HashSet::new(),
            exclude_langs: HashSet::new(),
            ignore_forked_repos: false,
            enable_cache: false,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            include_views: true,
            include_lines_changed: true,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// Load configuration from the environment. Missing credentials are a
    /// fatal error, raised before any network activity.
    pub fn from_env() -> Result<Self> {
        let username =
            std::env::var("GITHUB_ACTOR").context("GITHUB_ACTOR environment variable not set")?;
        let access_token =
            std::env::var("ACCESS_TOKEN").context("ACCESS_TOKEN environment variable not set")?;

        let mut config = Self::new(username, access_token);
        config.exclude_repos = parse_set(env_opt("EXCLUDE_REPOS").as_deref());
        config.exclude_langs = parse_set(env_opt("EXCLUDE_LANGS").as_deref());
        config.ignore_forked_repos = parse_flag(env_opt("IGNORE_FORKED_REPOS").as_deref(), false);
        config.enable_cache = parse_flag(env_opt("ENABLE_CACHE").as_deref(), false);
        config.include_views = parse_flag(env_opt("INCLUDE_VIEWS").as_deref(), true);
        config.include_lines_changed =
            parse_flag(env_opt("INCLUDE_LINES_CHANGED").as_deref(), true);
        if let Some(ttl) = env_opt("CACHE_TTL") {
            config.cache_ttl = ttl
                .trim()
                .parse()
                .with_context(|| format!("CACHE_TTL is not a valid number of seconds: {ttl:?}"))?;
        }
        if let Some(max) = env_opt("MAX_CONNECTIONS") {
            config.max_connections = max
                .trim()
                .parse()
                .with_context(|| format!("MAX_CONNECTIONS is not a valid count: {max:?}"))?;
        }
        Ok(config)
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a comma-separated list into a set, ignoring empty segments.
fn parse_set(value: Option<&str>) -> HashSet<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_flag(value: Option<&str>, default: bool) -> bool {
    match value {
        Some(v) => matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::new("octocat", "token");
        assert!(!config.enable_cache);
        assert!(config.include_views);
        assert!(config.include_lines_changed);
        assert_eq!(config.cache_ttl, DEFAULT_CACHE_TTL);
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert!(config.exclude_repos.is_empty());
    }

    #[test]
    fn parse_set_splits_and_trims() {
        let set = parse_set(Some("owner/repo, other/repo ,,"));
        assert_eq!(set.len(), 2);
        assert!(set.contains("owner/repo"));
        assert!(set.contains("other/repo"));
        assert!(parse_set(None).is_empty());
    }

    #[test]
    fn parse_flag_recognizes_truthy_values() {
        assert!(parse_flag(Some("true"), false));
        assert!(parse_flag(Some("1"), false));
        assert!(parse_flag(Some("YES"), false));
        assert!(!parse_flag(Some("false"), true));
        assert!(!parse_flag(Some("0"), true));
        assert!(parse_flag(None, true));
        assert!(!parse_flag(None, false));
    }
}
