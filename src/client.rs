use anyhow::Result;
use reqwest::{Client, StatusCode};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, warn};

const GRAPHQL_URL: &str = "https://api.github.com/graphql";
const REST_ROOT: &str = "https://api.github.com";
const USER_AGENT: &str = "github-stats";

/// How long to wait between retries when an endpoint answers 202.
const ACCEPTED_BACKOFF: Duration = Duration::from_secs(2);
/// How many 202 responses to tolerate before giving up on a path.
const ACCEPTED_RETRY_LIMIT: usize = 60;

/// The seam between the aggregator and the network.
///
/// Both methods absorb failure: a transport or parse error yields an empty
/// JSON object, and callers default the missing fields to zero/empty.
#[allow(async_fn_in_trait)]
pub trait GithubApi {
    /// Issue one GraphQL request and return the decoded response body.
    async fn query(&self, document: &str) -> Value;

    /// Issue one REST GET against `path` (relative to the API root) and
    /// return the decoded response body.
    async fn query_rest(&self, path: &str) -> Value;
}

/// Production client for the GitHub GraphQL (v4) and REST (v3) APIs.
///
/// Every outbound call holds a permit from a shared pool, bounding the
/// number of concurrent connections; GitHub throttles clients that exceed
/// its limits, so the pool is the sole admission control for the whole run.
pub struct Queries {
    access_token: String,
    http: Client,
    semaphore: Arc<Semaphore>,
}

impl Queries {
    pub fn new(access_token: impl Into<String>, http: Client, max_connections: usize) -> Self {
        Self {
            access_token: access_token.into(),
            http,
            semaphore: Arc::new(Semaphore::new(max_connections)),
        }
    }

    async fn post_graphql(&self, document: &str) -> Result<Value> {
        let _permit = self.semaphore.acquire().await?;
        let response = self
            .http
            .post(GRAPHQL_URL)
            .bearer_auth(&self.access_token)
            .header("User-Agent", USER_AGENT)
            .json(&serde_json::json!({ "query": document }))
            .send()
            .await?;
        Ok(response.json().await?)
    }

    /// One GET attempt. `Ok(None)` means the server answered 202 and the
    /// result is still being computed.
    async fn get_rest(&self, path: &str) -> Result<Option<Value>> {
        let _permit = self.semaphore.acquire().await?;
        let response = self
            .http
            .get(format!("{REST_ROOT}/{path}"))
            .header("Authorization", format!("token {}", self.access_token))
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;
        if response.status() == StatusCode::ACCEPTED {
            return Ok(None);
        }
        Ok(Some(response.json().await?))
    }
}

fn empty_result() -> Value {
    Value::Object(Map::new())
}

impl GithubApi for Queries {
    async fn query(&self, document: &str) -> Value {
        match self.post_graphql(document).await {
            Ok(result) => result,
            Err(err) => {
                warn!("GraphQL query failed: {err:#}");
                empty_result()
            }
        }
    }

    async fn query_rest(&self, path: &str) -> Value {
        let path = path.trim_start_matches('/');
        for _ in 0..ACCEPTED_RETRY_LIMIT {
            // The permit is released before the backoff sleep, so a path
            // stuck on 202 does not hold a connection slot while waiting.
            match self.get_rest(path).await {
                Ok(Some(result)) => return result,
                Ok(None) => {
                    debug!("{path} returned 202, retrying");
                    sleep(ACCEPTED_BACKOFF).await;
                }
                Err(err) => {
                    warn!("REST query failed for {path}: {err:#}");
                    return empty_result();
                }
            }
        }
        warn!("too many 202 responses; data for {path} will be incomplete");
        empty_result()
    }
}
