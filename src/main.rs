use anyhow::Result;
use github_stats::client::Queries;
use github_stats::config::Config;
use github_stats::stats::Stats;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Fails fast on missing credentials, before any network activity.
    let config = Config::from_env()?;

    let http = reqwest::Client::new();
    let api = Queries::new(config.access_token.as_str(), http, config.max_connections);
    let mut stats = Stats::new(config, api);

    println!("{}", stats.to_summary().await);
    for reason in stats.degradations() {
        eprintln!("warning: incomplete data: {reason}");
    }
    Ok(())
}
