use anyhow::{Context, Result};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;

use crate::config::{AppConfig, LlmConfig, Provider};

mod network;

pub use network::SamplingOptions;

/// Remote operations the client knows how to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ChatCompletions,
    Embeddings,
    ImageGenerations,
}

impl Operation {
    fn path(self) -> &'static str {
        match self {
            Operation::ChatCompletions => "chat/completions",
            Operation::Embeddings => "embeddings",
            Operation::ImageGenerations => "images/generations",
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenAIClient {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub provider: Provider,
    pub azure_api_version: String,
    pub(crate) inner: reqwest::Client,
    pub llm_cfg: LlmConfig,
}

impl OpenAIClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let inner = reqwest::Client::builder().build()?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: crate::config::DEFAULT_MODEL.to_string(),
            provider: Provider::OpenAi,
            azure_api_version: crate::config::DEFAULT_AZURE_API_VERSION.to_string(),
            inner,
            llm_cfg: LlmConfig::default(),
        })
    }

    /// Build a client from resolved configuration. Fails when no API key is set.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let api_key = cfg.api_key.clone().context(
            "no API key configured; set OPENAI_API_KEY / AZURE_OPENAI_KEY or pass --api-key",
        )?;
        let client = Self::new(cfg.base_url.clone(), api_key)?
            .with_model(cfg.model.clone())
            .with_provider(cfg.provider, cfg.azure_api_version.clone())
            .with_llm_config(cfg.llm.clone());
        Ok(client)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_provider(mut self, provider: Provider, azure_api_version: impl Into<String>) -> Self {
        self.provider = provider;
        self.azure_api_version = azure_api_version.into();
        self
    }

    pub fn with_llm_config(mut self, cfg: LlmConfig) -> Self {
        let builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(cfg.connect_timeout_ms))
            .timeout(Duration::from_millis(cfg.request_timeout_ms));
        // Keep the previous client if the builder is rejected.
        if let Ok(c) = builder.build() {
            self.inner = c;
        }
        self.llm_cfg = cfg;
        self
    }

    /// Resolve the URL of `op` for the given model (deployment on Azure).
    pub(crate) fn endpoint(&self, op: Operation, model: &str) -> String {
        let mut base = self.base_url.trim_end_matches('/').to_string();
        match self.provider {
            Provider::OpenAi => {
                if let Some(pos) = base.rfind("/v1") {
                    base.truncate(pos);
                    base = base.trim_end_matches('/').to_string();
                }
                format!("{base}/v1/{}", op.path())
            }
            Provider::Azure => format!(
                "{base}/openai/deployments/{model}/{}?api-version={}",
                op.path(),
                self.azure_api_version
            ),
        }
    }

    pub(crate) fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        match self.provider {
            Provider::OpenAi => {
                let value = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                    .context("api key is not a valid header value")?;
                headers.insert(AUTHORIZATION, value);
            }
            Provider::Azure => {
                let value = HeaderValue::from_str(&self.api_key)
                    .context("api key is not a valid header value")?;
                headers.insert(HeaderName::from_static("api-key"), value);
            }
        }
        Ok(headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ChatMessage;
    use httptest::{Expectation, Server, matchers::*, responders::*};

    #[tokio::test]
    async fn chat_once_happy_path() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/v1/chat/completions"),
                request::headers(contains(key("authorization"))),
            ])
            .respond_with(json_encoded(serde_json::json!({
                "id": "test",
                "choices": [
                    {"index":0, "message": {"role":"assistant","content":"hello"}}
                ]
            }))),
        );

        // Provide base with a trailing slash to verify normalization
        let client = OpenAIClient::new(format!("{}/", server.url_str("")), "test-key")
            .unwrap()
            .with_model("gpt-test");
        let msg = client
            .chat_once(vec![ChatMessage::user("hi")])
            .await
            .unwrap();
        assert_eq!(msg, "hello");
    }

    #[tokio::test]
    async fn chat_once_non200_is_error() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/v1/chat/completions"))
                .respond_with(status_code(500).body("oops")),
        );
        let client = OpenAIClient::new(server.url_str(""), "test-key").unwrap();
        let err = client
            .chat_once(vec![ChatMessage::user("hi")])
            .await
            .unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("500"));
    }

    #[tokio::test]
    async fn azure_uses_deployment_path_and_api_key_header() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/openai/deployments/gpt35/chat/completions"),
                request::query(url_decoded(contains(("api-version", "2024-02-01")))),
                request::headers(contains(key("api-key"))),
            ])
            .respond_with(json_encoded(serde_json::json!({
                "id": "az",
                "choices": [
                    {"index":0, "message": {"role":"assistant","content":"from azure"}}
                ]
            }))),
        );

        let client = OpenAIClient::new(server.url_str(""), "az-key")
            .unwrap()
            .with_model("gpt35")
            .with_provider(Provider::Azure, "2024-02-01");
        let msg = client
            .chat_once(vec![ChatMessage::user("hi")])
            .await
            .unwrap();
        assert_eq!(msg, "from azure");
    }

    #[test]
    fn endpoint_normalization() {
        let c = OpenAIClient::new("https://api.example.com/v1/", "x").unwrap();
        assert_eq!(
            c.endpoint(Operation::ChatCompletions, "m"),
            "https://api.example.com/v1/chat/completions"
        );
        let c2 = OpenAIClient::new("https://api.example.com/", "x").unwrap();
        assert_eq!(
            c2.endpoint(Operation::Embeddings, "m"),
            "https://api.example.com/v1/embeddings"
        );
        let c3 = OpenAIClient::new("https://res.openai.azure.com/", "x")
            .unwrap()
            .with_provider(Provider::Azure, "2024-02-01");
        assert_eq!(
            c3.endpoint(Operation::ImageGenerations, "dall-e-3"),
            "https://res.openai.azure.com/openai/deployments/dall-e-3/images/generations?api-version=2024-02-01"
        );
    }

    #[test]
    fn from_config_requires_api_key() {
        let cfg = AppConfig::default();
        assert!(OpenAIClient::from_config(&cfg).is_err());

        let cfg = AppConfig {
            api_key: Some("k".into()),
            model: "gpt-x".into(),
            ..AppConfig::default()
        };
        let client = OpenAIClient::from_config(&cfg).unwrap();
        assert_eq!(client.model, "gpt-x");
        assert_eq!(client.provider, Provider::OpenAi);
    }
}
