use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const PROJECT_CONFIG_DIR: &str = ".tdl";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
pub const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-02-01";
pub const DEFAULT_CATALOG_URL: &str = "https://learn.microsoft.com/api/catalog/";
pub const DEFAULT_ARXIV_URL: &str = "http://export.arxiv.org/api/query";
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 5;

/// Which wire dialect the completion endpoints speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[value(name = "openai")]
    OpenAi,
    Azure,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub provider: Provider,
    pub base_url: String,
    pub api_key: Option<String>,
    /// Chat model name, or the deployment name on Azure.
    pub model: String,
    pub embedding_model: String,
    pub image_model: String,
    pub azure_api_version: String,
    pub rapidapi_key: Option<String>,
    pub catalog_url: String,
    pub arxiv_url: String,
    pub rag_store: PathBuf,
    pub project_root: PathBuf,
    pub llm: LlmConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        let project_root =
            std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."));
        Self {
            provider: Provider::OpenAi,
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            azure_api_version: DEFAULT_AZURE_API_VERSION.to_string(),
            rapidapi_key: None,
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            arxiv_url: DEFAULT_ARXIV_URL.to_string(),
            rag_store: default_rag_store(&project_root),
            project_root,
            llm: LlmConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Upper bound on tool executions per interaction.
    pub max_tool_rounds: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            request_timeout_ms: 120_000,
            temperature: None,
            max_tokens: None,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct FileConfig {
    pub provider: Option<Provider>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub embedding_model: Option<String>,
    pub image_model: Option<String>,
    pub azure_api_version: Option<String>,
    pub rapidapi_key: Option<String>,
    pub catalog_url: Option<String>,
    pub arxiv_url: Option<String>,
    pub rag_store: Option<PathBuf>,
    pub llm: Option<PartialLlmConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PartialLlmConfig {
    pub connect_timeout_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub max_tool_rounds: Option<usize>,
}

impl PartialLlmConfig {
    fn or(self, lower: PartialLlmConfig) -> PartialLlmConfig {
        PartialLlmConfig {
            connect_timeout_ms: self.connect_timeout_ms.or(lower.connect_timeout_ms),
            request_timeout_ms: self.request_timeout_ms.or(lower.request_timeout_ms),
            temperature: self.temperature.or(lower.temperature),
            max_tokens: self.max_tokens.or(lower.max_tokens),
            max_tool_rounds: self.max_tool_rounds.or(lower.max_tool_rounds),
        }
    }
}

impl FileConfig {
    /// Layers `self` over `lower`: any value set here wins.
    pub fn merge_over(self, lower: FileConfig) -> FileConfig {
        let llm = match (self.llm, lower.llm) {
            (Some(upper), Some(lower)) => Some(upper.or(lower)),
            (upper, lower) => upper.or(lower),
        };
        FileConfig {
            provider: self.provider.or(lower.provider),
            base_url: self.base_url.or(lower.base_url),
            api_key: self.api_key.or(lower.api_key),
            model: self.model.or(lower.model),
            embedding_model: self.embedding_model.or(lower.embedding_model),
            image_model: self.image_model.or(lower.image_model),
            azure_api_version: self.azure_api_version.or(lower.azure_api_version),
            rapidapi_key: self.rapidapi_key.or(lower.rapidapi_key),
            catalog_url: self.catalog_url.or(lower.catalog_url),
            arxiv_url: self.arxiv_url.or(lower.arxiv_url),
            rag_store: self.rag_store.or(lower.rag_store),
            llm,
        }
    }
}

/// Values given on the command line; they outrank every other source.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub provider: Option<Provider>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub max_tool_rounds: Option<usize>,
}

impl AppConfig {
    pub fn load(overrides: &ConfigOverrides) -> Result<Self> {
        let project_root = std::env::current_dir().context("resolve current dir")?;
        let project_cfg = load_project_config(&project_root).unwrap_or_default();
        let file_cfg = load_file_config().unwrap_or_default();
        Self::resolve(
            overrides,
            |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty()),
            project_cfg.merge_over(file_cfg),
            project_root,
        )
    }

    /// Priority: CLI overrides -> environment -> merged config files -> defaults.
    pub fn resolve(
        overrides: &ConfigOverrides,
        env: impl Fn(&str) -> Option<String>,
        file_cfg: FileConfig,
        project_root: PathBuf,
    ) -> Result<Self> {
        let provider = overrides
            .provider
            .or_else(|| env("AZURE_OPENAI_ENDPOINT").map(|_| Provider::Azure))
            .or(file_cfg.provider)
            .unwrap_or(Provider::OpenAi);

        let (key_var, url_var, model_var, embedding_var) = match provider {
            Provider::OpenAi => (
                "OPENAI_API_KEY",
                "OPENAI_BASE_URL",
                "OPENAI_MODEL",
                "OPENAI_EMBEDDING_MODEL",
            ),
            Provider::Azure => (
                "AZURE_OPENAI_KEY",
                "AZURE_OPENAI_ENDPOINT",
                "AZURE_OPENAI_DEPLOYMENT",
                "AZURE_OPENAI_EMBEDDINGS_DEPLOYMENT",
            ),
        };

        let api_key = overrides
            .api_key
            .clone()
            .or_else(|| env(key_var))
            .or(file_cfg.api_key);

        let base_url = match overrides
            .base_url
            .clone()
            .or_else(|| env(url_var))
            .or(file_cfg.base_url)
        {
            Some(url) => url,
            None if provider == Provider::OpenAi => DEFAULT_OPENAI_BASE_URL.to_string(),
            None => bail!("azure provider requires an endpoint (AZURE_OPENAI_ENDPOINT or base_url)"),
        };

        let model = overrides
            .model
            .clone()
            .or_else(|| env(model_var))
            .or(file_cfg.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let embedding_model = env(embedding_var)
            .or(file_cfg.embedding_model)
            .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string());

        let llm_defaults = LlmConfig::default();
        let partial_llm = file_cfg.llm.unwrap_or_default();
        let max_tool_rounds = overrides
            .max_tool_rounds
            .or_else(|| env("TDL_MAX_TOOL_ROUNDS").and_then(|v| v.parse().ok()))
            .or(partial_llm.max_tool_rounds)
            .unwrap_or(llm_defaults.max_tool_rounds);
        let llm = LlmConfig {
            connect_timeout_ms: partial_llm
                .connect_timeout_ms
                .unwrap_or(llm_defaults.connect_timeout_ms),
            request_timeout_ms: partial_llm
                .request_timeout_ms
                .unwrap_or(llm_defaults.request_timeout_ms),
            temperature: partial_llm.temperature.or(llm_defaults.temperature),
            max_tokens: partial_llm.max_tokens.or(llm_defaults.max_tokens),
            max_tool_rounds,
        };

        let rag_store = match file_cfg.rag_store {
            Some(p) if p.is_relative() => project_root.join(p),
            Some(p) => p,
            None => default_rag_store(&project_root),
        };

        Ok(Self {
            provider,
            base_url,
            api_key,
            model,
            embedding_model,
            image_model: file_cfg
                .image_model
                .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
            azure_api_version: file_cfg
                .azure_api_version
                .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
            rapidapi_key: env("RAPIDAPI_KEY").or(file_cfg.rapidapi_key),
            catalog_url: file_cfg
                .catalog_url
                .unwrap_or_else(|| DEFAULT_CATALOG_URL.to_string()),
            arxiv_url: file_cfg
                .arxiv_url
                .unwrap_or_else(|| DEFAULT_ARXIV_URL.to_string()),
            rag_store,
            project_root,
            llm,
        })
    }
}

fn default_rag_store(project_root: &Path) -> PathBuf {
    project_root.join(PROJECT_CONFIG_DIR).join("rag_store.json")
}

fn read_config_file(path: &Path) -> Result<Option<FileConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let s = fs::read_to_string(path)
        .with_context(|| format!("read config file: {}", path.display()))?;
    match toml::from_str::<FileConfig>(&s) {
        Ok(cfg) => {
            info!(path=%path.display(), "loaded config file");
            Ok(Some(cfg))
        }
        Err(e) => {
            warn!(path=%path.display(), error=%e.to_string(), "parse config failed");
            Ok(None)
        }
    }
}

/// Load the user-wide configuration from `$TDL_CONFIG` or the platform config dir.
pub fn load_file_config() -> Result<FileConfig> {
    let mut candidates = Vec::new();
    if let Ok(p) = std::env::var("TDL_CONFIG") {
        candidates.push(PathBuf::from(p));
    }
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("tool-dispatch").join("config.toml"));
    }

    for p in candidates {
        if let Some(cfg) = read_config_file(&p)? {
            return Ok(cfg);
        }
    }
    Ok(FileConfig::default())
}

/// Load project-specific configuration from .tdl/config.toml
pub fn load_project_config(project_root: &Path) -> Result<FileConfig> {
    let path = project_root.join(PROJECT_CONFIG_DIR).join("config.toml");
    Ok(read_config_file(&path)?.unwrap_or_default())
}
