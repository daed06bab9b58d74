//! The stats aggregator: paginates the repository overview, fans out
//! per-repository REST calls, and memoizes every derived statistic for the
//! lifetime of one [`Stats`] instance.

use anyhow::{Result, anyhow};
use futures::future::join_all;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::warn;

use crate::cache::Cache;
use crate::client::GithubApi;
use crate::config::Config;
use crate::queries;

/// Running aggregate for one language across every counted repository.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Language {
    pub size: u64,
    pub occurrences: u64,
    pub color: Option<String>,
    /// Share of total code size, as a percentage. Derived after the
    /// pagination loop completes; zero until then.
    pub prop: f64,
}

/// Memoized results of one aggregation session. Each field transitions once
/// from unset to set and is immutable afterwards.
#[derive(Default)]
struct Snapshot {
    name: Option<String>,
    stargazers: Option<u64>,
    forks: Option<u64>,
    total_contributions: Option<u64>,
    languages: Option<HashMap<String, Language>>,
    repos: Option<HashSet<String>>,
    lines_changed: Option<(u64, u64)>,
    views: Option<u64>,
}

/// Retrieves and stores statistics about GitHub usage.
///
/// Generic over the API seam so tests can script responses; production code
/// uses [`crate::client::Queries`].
pub struct Stats<Q> {
    api: Q,
    config: Config,
    cache: Option<Cache>,
    snapshot: Snapshot,
    degradations: Vec<String>,
}

// Response shapes for the repository overview query. Everything defaults so
// a partially-failed query degrades to an empty page instead of an error.

#[derive(Deserialize, Default)]
struct Overview {
    data: Option<OverviewData>,
}

#[derive(Deserialize)]
struct OverviewData {
    viewer: Option<Viewer>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Viewer {
    login: Option<String>,
    name: Option<String>,
    #[serde(default)]
    repositories: RepoPage,
    #[serde(default)]
    repositories_contributed_to: RepoPage,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RepoPage {
    #[serde(default)]
    page_info: PageInfo,
    #[serde(default)]
    nodes: Vec<Option<RepoNode>>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    #[serde(default)]
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepoNode {
    name_with_owner: Option<String>,
    #[serde(default)]
    stargazers: CountTotal,
    #[serde(default)]
    fork_count: u64,
    #[serde(default)]
    languages: LanguageConnection,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct CountTotal {
    #[serde(default)]
    total_count: u64,
}

#[derive(Deserialize, Default)]
struct LanguageConnection {
    #[serde(default)]
    edges: Vec<Option<LanguageEdge>>,
}

#[derive(Deserialize, Default)]
struct LanguageEdge {
    #[serde(default)]
    size: u64,
    node: Option<LanguageNode>,
}

#[derive(Deserialize)]
struct LanguageNode {
    name: Option<String>,
    color: Option<String>,
}

impl<Q: GithubApi> Stats<Q> {
    pub fn new(config: Config, api: Q) -> Self {
        let cache = config
            .enable_cache
            .then(|| Cache::new(&config.cache_dir, config.cache_ttl));
        Self {
            api,
            config,
            cache,
            snapshot: Snapshot::default(),
            degradations: Vec::new(),
        }
    }

    /// Reasons for silently incomplete data, one per isolated per-repository
    /// failure. Empty when every fan-out task succeeded.
    pub fn degradations(&self) -> &[String] {
        &self.degradations
    }

    /// Umbrella fetch: one paginated pass over the repository overview sets
    /// name, stargazers, forks, the repo set, and the language aggregate.
    ///
    /// Two cursors advance in lockstep, one combined request per iteration.
    /// When one side runs out of pages its cursor is retained while the
    /// other side keeps paginating; the loop ends when neither side has a
    /// next page.
    async fn get_stats(&mut self) {
        let mut name: Option<String> = None;
        let mut stargazers = 0u64;
        let mut forks = 0u64;
        let mut languages: HashMap<String, Language> = HashMap::new();
        let mut repos: HashSet<String> = HashSet::new();

        let exclude_langs: HashSet<String> = self
            .config
            .exclude_langs
            .iter()
            .map(|lang| lang.to_lowercase())
            .collect();

        let mut owned_cursor: Option<String> = None;
        let mut contrib_cursor: Option<String> = None;

        loop {
            let document =
                queries::repos_overview(owned_cursor.as_deref(), contrib_cursor.as_deref());
            let raw = self.api.query(&document).await;
            let overview: Overview = serde_json::from_value(raw).unwrap_or_default();
            let viewer = overview
                .data
                .and_then(|data| data.viewer)
                .unwrap_or_default();

            if name.is_none() {
                name = viewer.name.clone().or_else(|| viewer.login.clone());
            }

            let owned = &viewer.repositories;
            let contrib = &viewer.repositories_contributed_to;

            let mut page_nodes: Vec<&RepoNode> = owned.nodes.iter().flatten().collect();
            if !self.config.ignore_forked_repos {
                page_nodes.extend(contrib.nodes.iter().flatten());
            }

            for repo in page_nodes {
                let Some(full_name) = repo.name_with_owner.as_deref() else {
                    continue;
                };
                if repos.contains(full_name) || self.config.exclude_repos.contains(full_name) {
                    continue;
                }
                repos.insert(full_name.to_string());
                stargazers += repo.stargazers.total_count;
                forks += repo.fork_count;

                for edge in repo.languages.edges.iter().flatten() {
                    let lang_name = edge
                        .node
                        .as_ref()
                        .and_then(|node| node.name.clone())
                        .unwrap_or_else(|| "Other".to_string());
                    if exclude_langs.contains(&lang_name.to_lowercase()) {
                        continue;
                    }
                    let entry = languages.entry(lang_name).or_insert_with(|| Language {
                        color: edge.node.as_ref().and_then(|node| node.color.clone()),
                        ..Language::default()
                    });
                    entry.size += edge.size;
                    entry.occurrences += 1;
                }
            }

            if owned.page_info.has_next_page || contrib.page_info.has_next_page {
                // An exhausted side reports no endCursor; keep its previous
                // cursor so only the other side advances.
                owned_cursor = owned.page_info.end_cursor.clone().or(owned_cursor);
                contrib_cursor = contrib.page_info.end_cursor.clone().or(contrib_cursor);
            } else {
                break;
            }
        }

        let total_size: u64 = languages.values().map(|lang| lang.size).sum();
        if total_size > 0 {
            for lang in languages.values_mut() {
                lang.prop = 100.0 * lang.size as f64 / total_size as f64;
            }
        }

        self.snapshot.name = Some(name.unwrap_or_else(|| "No Name".to_string()));
        self.snapshot.stargazers = Some(stargazers);
        self.snapshot.forks = Some(forks);
        self.snapshot.languages = Some(languages);
        self.snapshot.repos = Some(repos);
    }

    /// The user's display name, falling back to the login.
    pub async fn name(&mut self) -> String {
        if self.snapshot.name.is_none() {
            self.get_stats().await;
        }
        self.snapshot.name.clone().unwrap_or_default()
    }

    /// Total stargazers across the user's counted repositories.
    pub async fn stargazers(&mut self) -> u64 {
        if self.snapshot.stargazers.is_none() {
            self.get_stats().await;
        }
        self.snapshot.stargazers.unwrap_or_default()
    }

    /// Total forks across the user's counted repositories.
    pub async fn forks(&mut self) -> u64 {
        if self.snapshot.forks.is_none() {
            self.get_stats().await;
        }
        self.snapshot.forks.unwrap_or_default()
    }

    /// Per-language aggregate, with proportional usage in `prop`.
    pub async fn languages(&mut self) -> &HashMap<String, Language> {
        if self.snapshot.languages.is_none() {
            self.get_stats().await;
        }
        self.snapshot.languages.get_or_insert_with(HashMap::new)
    }

    /// Full names of every repository counted this session.
    pub async fn repos(&mut self) -> &HashSet<String> {
        if self.snapshot.repos.is_none() {
            self.get_stats().await;
        }
        self.snapshot.repos.get_or_insert_with(HashSet::new)
    }

    /// The user's all-time contribution count, summed over every year with
    /// recorded activity. A cache hit skips the remote calls entirely.
    pub async fn total_contributions(&mut self) -> u64 {
        if let Some(total) = self.snapshot.total_contributions {
            return total;
        }

        let cache_key = format!("total_contributions_{}", self.config.username);
        if let Some(cache) = &self.cache {
            if let Some(total) = cache.get::<u64>(&cache_key) {
                self.snapshot.total_contributions = Some(total);
                return total;
            }
        }

        let raw_years = self.api.query(&queries::contrib_years()).await;
        let years = contribution_years(&raw_years);
        let raw_by_year = self.api.query(&queries::all_contribs(&years)).await;
        let total = sum_yearly_contributions(&raw_by_year);

        self.snapshot.total_contributions = Some(total);
        if let Some(cache) = &self.cache {
            cache.set(&cache_key, &total);
        }
        total
    }

    /// Lines added and deleted by the user across all counted repositories,
    /// from each repository's contributor statistics. One REST call per
    /// repository, all in flight at once; a failed repository is logged and
    /// contributes zero.
    pub async fn lines_changed(&mut self) -> (u64, u64) {
        if let Some(lines) = self.snapshot.lines_changed {
            return lines;
        }
        if !self.config.include_lines_changed {
            self.snapshot.lines_changed = Some((0, 0));
            return (0, 0);
        }

        let cache_key = format!("lines_changed_{}", self.config.username);
        if let Some(cache) = &self.cache {
            if let Some(lines) = cache.get::<(u64, u64)>(&cache_key) {
                self.snapshot.lines_changed = Some(lines);
                return lines;
            }
        }

        if self.snapshot.repos.is_none() {
            self.get_stats().await;
        }
        let repos: Vec<String> = self
            .snapshot
            .repos
            .get_or_insert_with(HashSet::new)
            .iter()
            .cloned()
            .collect();
        let username = self.config.username.clone();

        let api = &self.api;
        let outcomes = join_all(repos.iter().map(|repo| {
            let username = username.as_str();
            async move { (repo.as_str(), repo_lines_changed(api, username, repo).await) }
        }))
        .await;

        let mut additions = 0u64;
        let mut deletions = 0u64;
        for (repo, outcome) in outcomes {
            match outcome {
                Ok((added, deleted)) => {
                    additions += added;
                    deletions += deleted;
                }
                Err(err) => {
                    warn!("failed to fetch contributor stats for {repo}: {err:#}");
                    self.degradations
                        .push(format!("contributor stats for {repo}: {err}"));
                }
            }
        }

        self.snapshot.lines_changed = Some((additions, deletions));
        if let Some(cache) = &self.cache {
            cache.set(&cache_key, &(additions, deletions));
        }
        (additions, deletions)
    }

    /// Total page views over the trailing 14 days (the API keeps no more),
    /// one traffic call per repository with the same fan-out and isolation
    /// as [`Stats::lines_changed`].
    pub async fn views(&mut self) -> u64 {
        if let Some(views) = self.snapshot.views {
            return views;
        }
        if !self.config.include_views {
            self.snapshot.views = Some(0);
            return 0;
        }

        let cache_key = format!("views_{}", self.config.username);
        if let Some(cache) = &self.cache {
            if let Some(views) = cache.get::<u64>(&cache_key) {
                self.snapshot.views = Some(views);
                return views;
            }
        }

        if self.snapshot.repos.is_none() {
            self.get_stats().await;
        }
        let repos: Vec<String> = self
            .snapshot
            .repos
            .get_or_insert_with(HashSet::new)
            .iter()
            .cloned()
            .collect();

        let api = &self.api;
        let outcomes = join_all(
            repos
                .iter()
                .map(|repo| async move { (repo.as_str(), repo_views(api, repo).await) }),
        )
        .await;

        let mut total = 0u64;
        for (repo, outcome) in outcomes {
            match outcome {
                Ok(views) => total += views,
                Err(err) => {
                    warn!("failed to fetch traffic views for {repo}: {err:#}");
                    self.degradations
                        .push(format!("traffic views for {repo}: {err}"));
                }
            }
        }

        self.snapshot.views = Some(total);
        if let Some(cache) = &self.cache {
            cache.set(&cache_key, &total);
        }
        total
    }

    /// Summary of all available statistics.
    pub async fn to_summary(&mut self) -> String {
        let name = self.name().await;
        let stargazers = self.stargazers().await;
        let forks = self.forks().await;
        let contributions = self.total_contributions().await;
        let (added, deleted) = self.lines_changed().await;
        let views = self.views().await;
        let repo_count = self.repos().await.len();

        let mut langs: Vec<(String, f64)> = self
            .languages()
            .await
            .iter()
            .map(|(name, lang)| (name.clone(), lang.prop))
            .collect();
        langs.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let formatted_languages: Vec<String> = langs
            .iter()
            .map(|(name, prop)| format!("{name}: {prop:.4}%"))
            .collect();

        format!(
            "Name: {name}\n\
             Stargazers: {}\n\
             Forks: {}\n\
             All-time contributions: {}\n\
             Repositories with contributions: {repo_count}\n\
             Lines of code added: {}\n\
             Lines of code deleted: {}\n\
             Lines of code changed: {}\n\
             Project page views: {}\n\
             Languages:\n  - {}",
            with_commas(stargazers),
            with_commas(forks),
            with_commas(contributions),
            with_commas(added),
            with_commas(deleted),
            with_commas(added + deleted),
            with_commas(views),
            formatted_languages.join("\n  - "),
        )
    }
}

/// Sum the user's weekly additions and deletions from one repository's
/// contributor statistics. Entries with a missing or non-object author are
/// skipped; a payload that is neither a list nor an (empty) error object is
/// a failure to be isolated by the caller.
async fn repo_lines_changed<Q: GithubApi>(
    api: &Q,
    username: &str,
    repo: &str,
) -> Result<(u64, u64)> {
    let raw = api
        .query_rest(&format!("repos/{repo}/stats/contributors"))
        .await;
    let contributors: &[Value] = match &raw {
        Value::Array(entries) => entries.as_slice(),
        Value::Object(_) | Value::Null => &[],
        other => return Err(anyhow!("unexpected contributor stats payload: {other}")),
    };

    let mut additions = 0u64;
    let mut deletions = 0u64;
    for entry in contributors {
        let Some(author) = entry.get("author").and_then(Value::as_object) else {
            continue;
        };
        if author.get("login").and_then(Value::as_str) != Some(username) {
            continue;
        }
        let weeks = entry
            .get("weeks")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        for week in weeks {
            additions += week.get("a").and_then(Value::as_u64).unwrap_or(0);
            deletions += week.get("d").and_then(Value::as_u64).unwrap_or(0);
        }
    }
    Ok((additions, deletions))
}

/// Sum one repository's per-day view counts from the traffic endpoint.
async fn repo_views<Q: GithubApi>(api: &Q, repo: &str) -> Result<u64> {
    let raw = api.query_rest(&format!("repos/{repo}/traffic/views")).await;
    let days = match &raw {
        Value::Object(map) => map
            .get("views")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]),
        other => return Err(anyhow!("unexpected traffic views payload: {other}")),
    };
    Ok(days
        .iter()
        .filter_map(|day| day.get("count").and_then(Value::as_u64))
        .sum())
}

/// Extract the list of contribution years, tolerating both numeric and
/// string years.
fn contribution_years(raw: &Value) -> Vec<String> {
    raw.pointer("/data/viewer/contributionsCollection/contributionYears")
        .and_then(Value::as_array)
        .map(|years| {
            years
                .iter()
                .filter_map(|year| match year {
                    Value::Number(n) => Some(n.to_string()),
                    Value::String(s) => Some(s.clone()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Sum `totalContributions` across every aliased per-year block.
fn sum_yearly_contributions(raw: &Value) -> u64 {
    raw.pointer("/data/viewer")
        .and_then(Value::as_object)
        .map(|years| {
            years
                .values()
                .filter_map(|year| year.pointer("/contributionCalendar/totalContributions"))
                .filter_map(Value::as_u64)
                .sum()
        })
        .unwrap_or(0)
}

/// Group digits in threes, e.g. 1234567 -> "1,234,567".
fn with_commas(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
