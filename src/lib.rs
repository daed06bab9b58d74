//! Aggregate a GitHub user's activity statistics into one report.
//!
//! The heavy lifting happens in [`stats::Stats`], which paginates the
//! GraphQL repository overview, fans out per-repository REST calls for
//! lines-changed and traffic data, and memoizes every derived figure for
//! the lifetime of the instance. Network access goes through
//! [`client::Queries`], which bounds concurrent connections and absorbs
//! transient failures; expensive aggregates can be persisted across runs
//! with the file-backed [`cache::Cache`].

pub mod cache;
pub mod client;
pub mod config;
pub mod queries;
pub mod stats;
