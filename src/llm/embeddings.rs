use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DispatchError;
use crate::llm::client_core::{OpenAIClient, Operation};

#[derive(Debug, Clone, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

impl OpenAIClient {
    /// Embed `inputs` with `model`, returning one vector per input in input order.
    pub async fn embed(
        &self,
        model: &str,
        inputs: &[String],
    ) -> Result<Vec<Vec<f32>>, DispatchError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let req = EmbeddingRequest {
            model,
            input: inputs,
        };
        let mut resp: EmbeddingResponse =
            self.send_json(Operation::Embeddings, model, &req).await?;
        if resp.data.len() != inputs.len() {
            return Err(DispatchError::MalformedResponse(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                resp.data.len()
            )));
        }
        resp.data.sort_by_key(|d| d.index);
        debug!(count = resp.data.len(), "received embeddings");
        Ok(resp.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httptest::{Expectation, Server, matchers::*, responders::*};
    use serde_json::json;

    #[tokio::test]
    async fn embeddings_are_returned_in_input_order() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/v1/embeddings"),
                request::body(json_decoded(|b: &serde_json::Value| {
                    b["model"] == "ada" && b["input"].as_array().map(|a| a.len()) == Some(2)
                })),
            ])
            .respond_with(json_encoded(json!({
                "data": [
                    {"index": 1, "embedding": [0.0, 1.0]},
                    {"index": 0, "embedding": [1.0, 0.0]}
                ]
            }))),
        );

        let client = OpenAIClient::new(server.url_str(""), "k").unwrap();
        let out = client
            .embed("ada", &["first".to_string(), "second".to_string()])
            .await
            .unwrap();
        assert_eq!(out, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn count_mismatch_is_malformed() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/v1/embeddings"))
                .respond_with(json_encoded(json!({"data": []}))),
        );
        let client = OpenAIClient::new(server.url_str(""), "k").unwrap();
        let err = client.embed("ada", &["x".to_string()]).await.unwrap_err();
        assert!(matches!(err, DispatchError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn empty_input_skips_the_request() {
        let client = OpenAIClient::new("http://127.0.0.1:9", "k").unwrap();
        assert!(client.embed("ada", &[]).await.unwrap().is_empty());
    }
}
