pub mod catalog;
mod common;
pub mod papers;
mod registry;
pub mod travel;

pub use registry::{ParamType, ToolArgs, ToolHandler, ToolRegistry, ToolSchema};

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;

use crate::config::AppConfig;

/// Named groups of built-in tools that `call` can advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Toolset {
    /// Learning catalog course and exam search.
    #[default]
    Catalog,
    /// Weather, restaurant and hotel lookups.
    Travel,
    /// Latest arXiv papers on a topic.
    Papers,
    All,
}

/// Build the registry for `toolset`. Clients are created here, once.
pub fn build_registry(cfg: &AppConfig, toolset: Toolset) -> Result<ToolRegistry> {
    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_millis(cfg.llm.connect_timeout_ms))
        .timeout(Duration::from_millis(cfg.llm.request_timeout_ms))
        .build()
        .context("build http client for tools")?;

    let mut registry = ToolRegistry::new();
    if matches!(toolset, Toolset::Catalog | Toolset::All) {
        let client = catalog::CatalogClient::new(http.clone(), cfg.catalog_url.clone());
        catalog::register(&mut registry, client)?;
    }
    if matches!(toolset, Toolset::Travel | Toolset::All) {
        let client = travel::RapidApiClient::new(http.clone(), cfg.rapidapi_key.clone());
        travel::register(&mut registry, client)?;
    }
    if matches!(toolset, Toolset::Papers | Toolset::All) {
        let client = papers::ArxivClient::new(http, cfg.arxiv_url.clone());
        papers::register(&mut registry, client)?;
    }
    debug!(?toolset, tools = ?registry.names(), "tool registry built");
    Ok(registry)
}
