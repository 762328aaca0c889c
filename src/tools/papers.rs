//! Latest-paper lookup against the arXiv Atom API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::common::{required_str, u64_or};
use super::{ParamType, ToolArgs, ToolHandler, ToolRegistry, ToolSchema};

pub const DEFAULT_MAX_RESULTS: u64 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Paper {
    pub title: String,
    pub summary: String,
}

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: String,
}

/// Titles and abstracts arrive hard-wrapped; fold them onto one line.
fn squash_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse an Atom feed body into its entries, in feed order.
pub fn parse_feed(xml: &str) -> Result<Vec<Paper>> {
    let feed: AtomFeed = quick_xml::de::from_str(xml).context("parse arXiv Atom feed")?;
    Ok(feed
        .entries
        .into_iter()
        .map(|e| Paper {
            title: squash_whitespace(&e.title),
            summary: squash_whitespace(&e.summary),
        })
        .collect())
}

#[derive(Debug, Clone)]
pub struct ArxivClient {
    http: reqwest::Client,
    url: String,
}

impl ArxivClient {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }

    /// Newest submissions first.
    pub async fn latest_papers(&self, query: &str, max_results: u64) -> Result<Vec<Paper>> {
        let search = format!("all:{query}");
        let max_results = max_results.to_string();
        debug!(url = %self.url, %search, %max_results, "querying arXiv");
        let body = self
            .http
            .get(&self.url)
            .query(&[
                ("search_query", search.as_str()),
                ("start", "0"),
                ("max_results", max_results.as_str()),
                ("sortBy", "submittedDate"),
                ("sortOrder", "descending"),
            ])
            .send()
            .await
            .context("send arXiv request")?
            .error_for_status()
            .context("arXiv returned an error status")?
            .text()
            .await
            .context("read arXiv response")?;
        parse_feed(&body)
    }
}

struct FetchLatestPapers(ArxivClient);

#[async_trait]
impl ToolHandler for FetchLatestPapers {
    async fn call(&self, args: &ToolArgs) -> Result<String> {
        let query = required_str(args, "query")?;
        let max_results = u64_or(args, "max_results", DEFAULT_MAX_RESULTS);
        let papers = self.0.latest_papers(query, max_results).await?;
        Ok(serde_json::to_string(&papers)?)
    }
}

pub fn register(registry: &mut ToolRegistry, client: ArxivClient) -> Result<()> {
    registry.register(
        ToolSchema::new(
            "fetch_latest_papers",
            "Fetches the most recently submitted arXiv papers matching a query, with their abstracts",
        )
        .required(
            "query",
            ParamType::String,
            "Search terms (e.g., 'Large Language Models').",
        )
        .optional(
            "max_results",
            ParamType::Integer,
            "How many papers to return (default 20).",
        ),
        FetchLatestPapers(client),
    )?;
    Ok(())
}
