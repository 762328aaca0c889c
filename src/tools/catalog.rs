//! Course and exam search against the public learning catalog.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::common::{required_str, slug, str_or};
use super::{ParamType, ToolArgs, ToolHandler, ToolRegistry, ToolSchema};

/// Only the head of the catalog listing is scanned.
const SCAN_LIMIT: usize = 5;

const ROLE_CHOICES: &str = "administrator, ai-edge-engineer, ai-engineer, auditor, business-analyst, business-owner, business-user, data-analyst, data-engineer, data-scientist, database-administrator, developer, devops-engineer, functional-consultant, higher-ed-educator, identity-access-admin, ip-admin, k-12-educator, maker, network-engineer, parent-guardian, privacy-manager, risk-practitioner, school-leader, security-engineer, security-operations-analyst, service-adoption-specialist, solution-architect, startup-founder, student, support-engineer, technical-writer, technology-manager";

const PRODUCT_CHOICES: &str = "dotnet, azure, bing, clarity, consumer, dynamics-365, entra, fabric, flip, github, hololens, industry-solutions, internet-explorer, intune, m365, microsoft-authentication-library, microsoft-edge, mem, ms-graph, makecode, power-platform, priva, office-teams, viva, microsoft-defender, microsoft-purview, minecraft, mrtk, ms-copilot, ms-website, nuance, office-365, bonsai, qdk, sql-server, sysinternals, vs, vs-app-center, vs-code, windows, xbox";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogHit {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    url: String,
}

impl CatalogClient {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }

    async fn fetch(&self, query: &[(&str, &str)], section: &str) -> Result<Vec<Value>> {
        debug!(url = %self.url, ?query, "querying catalog");
        let resp = self
            .http
            .get(&self.url)
            .query(query)
            .send()
            .await
            .context("send catalog request")?
            .error_for_status()
            .context("catalog returned an error status")?;
        let mut body: Value = resp.json().await.context("decode catalog response")?;
        match body.get_mut(section).map(Value::take) {
            Some(Value::Array(entries)) => Ok(entries),
            _ => Err(anyhow!("catalog response has no `{section}` array")),
        }
    }

    pub async fn search_courses(&self, role: &str, product: &str, level: &str) -> Result<Vec<CatalogHit>> {
        let modules = self
            .fetch(&[("role", role), ("product", product), ("level", level)], "modules")
            .await?;
        Ok(filter_entries(&modules, &slug(role), &slug(product)))
    }

    pub async fn search_exams(&self, role: &str, product: &str) -> Result<Vec<CatalogHit>> {
        let exams = self.fetch(&[("type", "exams")], "exams").await?;
        Ok(filter_entries(&exams, &slug(role), &slug(product)))
    }
}

fn any_contains(entry: &Value, field: &str, needle: &str) -> bool {
    entry
        .get(field)
        .and_then(Value::as_array)
        .is_some_and(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .any(|s| s.contains(needle))
        })
}

/// Keep entries among the first few whose products mention `product` or
/// whose roles mention `role`. Entries without a title or url are skipped.
pub fn filter_entries(entries: &[Value], role: &str, product: &str) -> Vec<CatalogHit> {
    entries
        .iter()
        .take(SCAN_LIMIT)
        .filter(|e| any_contains(e, "products", product) || any_contains(e, "roles", role))
        .filter_map(|e| {
            Some(CatalogHit {
                title: e.get("title")?.as_str()?.to_string(),
                url: e.get("url")?.as_str()?.to_string(),
            })
        })
        .collect()
}

struct SearchCourses(CatalogClient);

#[async_trait]
impl ToolHandler for SearchCourses {
    async fn call(&self, args: &ToolArgs) -> Result<String> {
        let role = required_str(args, "role")?;
        let product = str_or(args, "product", "azure");
        let level = str_or(args, "level", "beginner");
        let hits = self.0.search_courses(role, product, level).await?;
        Ok(serde_json::to_string(&hits)?)
    }
}

struct SearchExams(CatalogClient);

#[async_trait]
impl ToolHandler for SearchExams {
    async fn call(&self, args: &ToolArgs) -> Result<String> {
        let role = required_str(args, "role")?;
        let product = str_or(args, "product", "azure");
        let hits = self.0.search_exams(role, product).await?;
        Ok(serde_json::to_string(&hits)?)
    }
}

pub fn register(registry: &mut ToolRegistry, client: CatalogClient) -> Result<()> {
    registry.register(
        ToolSchema::new(
            "search_courses",
            "Retrieves courses from the search index based on the parameters provided",
        )
        .required(
            "role",
            ParamType::String,
            &format!("The role of the learner ({ROLE_CHOICES})."),
        )
        .optional(
            "product",
            ParamType::String,
            &format!("The product that the lesson is covering ({PRODUCT_CHOICES})."),
        )
        .optional(
            "level",
            ParamType::String,
            "The level of experience the learner has prior to taking the course (i.e. beginner, intermediate, advanced)",
        ),
        SearchCourses(client.clone()),
    )?;
    registry.register(
        ToolSchema::new(
            "search_exams",
            "Retrieves exams from the search index based on the parameters provided",
        )
        .required(
            "role",
            ParamType::String,
            &format!("The role of the examiner ({ROLE_CHOICES})"),
        )
        .optional(
            "product",
            ParamType::String,
            &format!("The product that the lesson is covering ({PRODUCT_CHOICES})"),
        ),
        SearchExams(client),
    )?;
    Ok(())
}
