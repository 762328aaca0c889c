use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use super::{OpenAIClient, Operation};
use crate::error::DispatchError;
use crate::llm::types::{
    ChatMessage, ChatRequest, ChatResponse, ChatStreamChunk, ChoiceMessage, ToolDef,
};

/// Per-request sampling knobs. Unset fields fall back to the client's `LlmConfig`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SamplingOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
}

impl OpenAIClient {
    pub(crate) async fn send_json<B, R>(
        &self,
        op: Operation,
        model: &str,
        body: &B,
    ) -> Result<R, DispatchError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.endpoint(op, model);
        let headers = self
            .headers()
            .map_err(|e| DispatchError::transport("build request headers", e))?;

        if let Ok(payload) = serde_json::to_string_pretty(body) {
            debug!(payload=%payload, endpoint=%url, "sending {:?} payload", op);
        }

        let resp = self
            .inner
            .post(&url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!(err=%e, endpoint=%url, "llm send error");
                DispatchError::transport(format!("send {op:?} request"), e)
            })?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| DispatchError::transport(format!("read {op:?} response body"), e))?;

        if !status.is_success() {
            error!(status=%status.as_u16(), body=%text, "llm non-success status");
            return Err(DispatchError::transport(
                format!("{op:?} returned {status}"),
                text.trim().to_owned(),
            ));
        }

        serde_json::from_str::<R>(&text)
            .map_err(|e| DispatchError::MalformedResponse(format!("decode {op:?} response: {e}")))
    }

    fn chat_request(&self, messages: Vec<ChatMessage>, opts: SamplingOptions) -> ChatRequest {
        let mut req = ChatRequest::new(self.model.clone(), messages);
        req.temperature = opts.temperature.or(self.llm_cfg.temperature);
        req.max_tokens = opts.max_tokens.or(self.llm_cfg.max_tokens);
        req.top_p = opts.top_p;
        req
    }

    pub async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, DispatchError> {
        self.send_json(Operation::ChatCompletions, &self.model, req)
            .await
    }

    /// Single plain-text completion.
    pub async fn chat_once(&self, messages: Vec<ChatMessage>) -> Result<String, DispatchError> {
        self.chat_once_with(messages, SamplingOptions::default())
            .await
    }

    pub async fn chat_once_with(
        &self,
        messages: Vec<ChatMessage>,
        opts: SamplingOptions,
    ) -> Result<String, DispatchError> {
        let req = self.chat_request(messages, opts);
        let body = self.chat(&req).await?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| DispatchError::MalformedResponse("no choices returned".into()))
    }

    /// One completion with the given tools advertised and `tool_choice = "auto"`.
    pub async fn chat_tools_once(
        &self,
        messages: Vec<ChatMessage>,
        tools: &[ToolDef],
    ) -> Result<ChoiceMessage, DispatchError> {
        let mut req = self.chat_request(messages, SamplingOptions::default());
        if !tools.is_empty() {
            req.tools = Some(tools.to_vec());
            req.tool_choice = Some("auto".to_string());
        }
        let body = self.chat(&req).await?;
        if let Some(usage) = &body.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "chat_tools_once usage"
            );
        }
        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| DispatchError::MalformedResponse("no choices returned".into()))?;
        debug!(finish_reason = ?choice.finish_reason, "chat_tools_once finished");
        Ok(choice.message)
    }

    /// Stream content deltas of a completion as they arrive.
    pub async fn chat_stream(
        &self,
        messages: Vec<ChatMessage>,
        opts: SamplingOptions,
    ) -> Result<BoxStream<'static, Result<String, DispatchError>>, DispatchError> {
        let url = self.endpoint(Operation::ChatCompletions, &self.model);
        let mut req = self.chat_request(messages, opts);
        req.stream = Some(true);

        let headers = self
            .headers()
            .map_err(|e| DispatchError::transport("build request headers", e))?;
        let resp = self
            .inner
            .post(url)
            .headers(headers)
            .json(&req)
            .send()
            .await
            .map_err(|e| DispatchError::transport("send chat request (stream)", e))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(DispatchError::transport(
                format!("chat stream returned {status}"),
                text,
            ));
        }

        // A trailing `None` marks end of input so an unterminated last line is still parsed.
        let mut lines = SseLineBuffer::default();
        let s = resp
            .bytes_stream()
            .map(Some)
            .chain(futures::stream::once(async { None }))
            .map(move |chunk_res| {
                let out: Vec<Result<String, DispatchError>> = match chunk_res {
                    Some(Ok(chunk)) => lines.push(&chunk).into_iter().map(Ok).collect(),
                    Some(Err(e)) => vec![Err(DispatchError::transport("read chat stream", e))],
                    None => lines.finish().into_iter().map(Ok).collect(),
                };
                futures::stream::iter(out)
            })
            .flatten()
            .boxed();
        Ok(s)
    }
}

/// Splits SSE bytes into lines, keeping the unfinished tail between chunks.
#[derive(Debug, Default)]
struct SseLineBuffer {
    buf: Vec<u8>,
}

impl SseLineBuffer {
    /// Feed a chunk and return the content deltas of every completed line.
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut deltas = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(delta) = delta_of(&line) {
                deltas.push(delta);
            }
        }
        deltas
    }

    /// Parse whatever is left once the stream has ended.
    fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        delta_of(&rest)
    }
}

fn delta_of(line: &[u8]) -> Option<String> {
    match parse_sse_line(std::str::from_utf8(line).ok()?) {
        Some(SseEvent::Delta(delta)) => Some(delta),
        Some(SseEvent::Done) | None => None,
    }
}

#[derive(Debug, PartialEq)]
enum SseEvent {
    Delta(String),
    Done,
}

fn parse_sse_line(line: &str) -> Option<SseEvent> {
    let s = line.trim();
    if s.is_empty() {
        return None;
    }
    let payload = s.strip_prefix("data:").map(str::trim).unwrap_or(s);
    if payload == "[DONE]" {
        return Some(SseEvent::Done);
    }
    let chunk = serde_json::from_str::<ChatStreamChunk>(payload).ok()?;
    let delta: String = chunk
        .choices
        .into_iter()
        .filter_map(|c| c.delta.content)
        .collect();
    if delta.is_empty() {
        None
    } else {
        Some(SseEvent::Delta(delta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::{Role, ToolFunctionDef};
    use httptest::{Expectation, Server, matchers::*, responders::*};
    use serde_json::json;

    #[test]
    fn sse_lines_are_parsed() {
        assert_eq!(
            parse_sse_line(r#"data: {"id":"1","choices":[{"index":0,"delta":{"content":"Hel"}}]}"#),
            Some(SseEvent::Delta("Hel".into()))
        );
        assert_eq!(parse_sse_line("data: [DONE]"), Some(SseEvent::Done));
        assert_eq!(parse_sse_line("   "), None);
        assert_eq!(parse_sse_line(": keep-alive"), None);
        assert_eq!(
            parse_sse_line(r#"data: {"id":"1","choices":[{"index":0,"delta":{"role":"assistant"}}]}"#),
            None
        );
    }

    #[tokio::test]
    async fn chat_tools_once_sends_tools_and_parses_tool_calls() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/v1/chat/completions"),
                request::body(json_decoded(|b: &serde_json::Value| {
                    b["tool_choice"] == "auto" && b["tools"][0]["function"]["name"] == "get_time"
                })),
            ])
            .respond_with(json_encoded(json!({
                "id": "x",
                "choices": [{
                    "index": 0,
                    "finish_reason": "tool_calls",
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": {"name": "get_time", "arguments": "{}"}
                        }]
                    }
                }]
            }))),
        );

        let client = OpenAIClient::new(server.url_str(""), "k").unwrap();
        let tools = vec![ToolDef {
            kind: "function".into(),
            function: ToolFunctionDef {
                name: "get_time".into(),
                description: "time".into(),
                parameters: json!({"type": "object", "properties": {}}),
            },
        }];
        let msg = client
            .chat_tools_once(vec![ChatMessage::user("what time is it?")], &tools)
            .await
            .unwrap();
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.tool_calls.len(), 1);
        assert_eq!(msg.tool_calls[0].name(), "get_time");
    }

    #[tokio::test]
    async fn undecodable_body_is_malformed_response() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/v1/chat/completions"))
                .respond_with(status_code(200).body("not json")),
        );
        let client = OpenAIClient::new(server.url_str(""), "k").unwrap();
        let err = client
            .chat_once(vec![ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn empty_choices_is_malformed_response() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/v1/chat/completions"))
                .respond_with(json_encoded(json!({"id": "x", "choices": []}))),
        );
        let client = OpenAIClient::new(server.url_str(""), "k").unwrap();
        let err = client
            .chat_tools_once(vec![ChatMessage::user("hi")], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn sampling_options_override_config() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/v1/chat/completions"),
                request::body(json_decoded(|b: &serde_json::Value| {
                    b["max_tokens"] == 600 && b.get("top_p").is_none()
                })),
            ])
            .respond_with(json_encoded(json!({
                "id": "x",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "ok"}}]
            }))),
        );
        let client = OpenAIClient::new(server.url_str(""), "k").unwrap();
        let out = client
            .chat_once_with(
                vec![ChatMessage::user("hi")],
                SamplingOptions {
                    temperature: Some(0.1),
                    max_tokens: Some(600),
                    top_p: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(out, "ok");
    }

    #[test]
    fn line_buffer_joins_split_chunks_and_flushes_tail() {
        let mut lines = SseLineBuffer::default();
        assert!(lines.push(b"data: {\"choices\":[{\"index\":0,\"del").is_empty());
        assert_eq!(
            lines.push(b"ta\":{\"content\":\"a\"}}]}\n\ndata: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"b\"}}]}"),
            vec!["a".to_string()]
        );
        assert_eq!(lines.finish(), Some("b".to_string()));
        assert_eq!(lines.finish(), None);
    }

    #[tokio::test]
    async fn chat_stream_keeps_unterminated_last_event() {
        let server = Server::run();
        let body = concat!(
            "data:{\"id\":\"1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data:{\"id\":\"1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"}}]}",
        );
        server.expect(
            Expectation::matching(request::method_path("POST", "/v1/chat/completions"))
                .respond_with(status_code(200).body(body)),
        );
        let client = OpenAIClient::new(server.url_str(""), "k").unwrap();
        let stream = client
            .chat_stream(vec![ChatMessage::user("hi")], SamplingOptions::default())
            .await
            .unwrap();
        let parts: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(parts.concat(), "Hello");
    }

    #[tokio::test]
    async fn chat_stream_yields_deltas() {
        let server = Server::run();
        let body = concat!(
            "data: {\"id\":\"1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"id\":\"1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        server.expect(
            Expectation::matching(request::method_path("POST", "/v1/chat/completions"))
                .respond_with(status_code(200).body(body)),
        );
        let client = OpenAIClient::new(server.url_str(""), "k").unwrap();
        let stream = client
            .chat_stream(vec![ChatMessage::user("hi")], SamplingOptions::default())
            .await
            .unwrap();
        let parts: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(parts.concat(), "Hello");
    }
}
