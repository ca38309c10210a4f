//! Ollama API client implementation.
//!
//! This module implements the `Client` and `StreamingClient` traits for a
//! local Ollama server using the generic options architecture.
//! See: <https://github.com/ollama/ollama/blob/main/docs/api.md>

use async_trait::async_trait;
use futures::{stream, Stream, StreamExt};
use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::client::{ChunkStream, Client, ClientError, StreamingClient};
use crate::http::{build_http_client, prepare};
use crate::model::{FinishReason, Message, ModelInfo, ParsedRecord, Response, StreamChunk, Usage};
use crate::ndjson::NdjsonResponseExt;
use crate::options::{HttpTransport, ModelOptions, OllamaModel, TransportOptions};

pub const DEFAULT_MODEL: &str = "llama3.2";

/// Ollama client using HTTP transport.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    model_options: ModelOptions<OllamaModel>,
    transport_options: TransportOptions<HttpTransport>,
}

impl OllamaClient {
    /// Names and metadata of the models installed on the server.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, ClientError> {
        let http_client = build_http_client(&self.transport_options)?;
        let response = prepare(
            &http_client,
            Method::GET,
            &self.transport_options.provider,
            "/api/tags",
        )
        .send()
        .await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::handle_error_response(status, &body));
        }

        let tags: OllamaTags = response.json().await?;
        Ok(tags.models)
    }

    /// Check that the server answers; returns how many models it offers.
    pub async fn check_connection(&self) -> Result<usize, ClientError> {
        let models = self.list_models().await?;
        tracing::info!(models = models.len(), "connected to Ollama");
        Ok(models.len())
    }

    async fn send(
        messages: Vec<Message>,
        model_options: &ModelOptions<OllamaModel>,
        transport_options: &TransportOptions<HttpTransport>,
        stream: bool,
    ) -> Result<reqwest::Response, ClientError> {
        let request_body = OllamaChatRequest::new(messages, model_options, stream);
        tracing::debug!(
            model = %request_body.model,
            messages = request_body.messages.len(),
            stream,
            "sending chat request"
        );

        let http_client = build_http_client(transport_options)?;
        let response = prepare(
            &http_client,
            Method::POST,
            &transport_options.provider,
            "/api/chat",
        )
        .json(&request_body)
        .send()
        .await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::handle_error_response(status, &body));
        }

        Ok(response)
    }

    /// Process streaming response from Ollama.
    fn process_stream(
        response: reqwest::Response,
    ) -> impl Stream<Item = Result<StreamChunk, ClientError>> + Send {
        response.ndjson().flat_map(|result| {
            let chunks = match result {
                Ok(record) => record_chunks(&record),
                Err(e) => vec![Err(e)],
            };
            stream::iter(chunks)
        })
    }

    /// Handle Ollama error responses.
    fn handle_error_response(status: reqwest::StatusCode, body: &str) -> ClientError {
        if let Ok(error_resp) = serde_json::from_str::<OllamaErrorResponse>(body) {
            ClientError::ProviderError(format!("Ollama error ({}): {}", status, error_resp.error))
        } else {
            ClientError::ProviderError(format!("HTTP {}: {}", status, body))
        }
    }
}

/// Map one streamed record to the chunks it carries.
fn record_chunks(record: &ParsedRecord) -> Vec<Result<StreamChunk, ClientError>> {
    if let Some(error) = record.error() {
        return vec![Err(ClientError::ProviderError(format!("Ollama error: {error}")))];
    }

    let mut chunks = Vec::new();

    if let Some(delta) = record.content_delta() {
        chunks.push(Ok(StreamChunk::Data(delta.to_string())));
    }

    // Usage and finish reason only arrive on the closing record
    if record.is_done() {
        if let Some(usage) = record.usage() {
            chunks.push(Ok(StreamChunk::Usage(usage)));
        }
        let reason = record
            .done_reason()
            .map(FinishReason::from)
            .unwrap_or(FinishReason::Stop);
        chunks.push(Ok(StreamChunk::Finish(reason)));
    }

    chunks
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new(
            ModelOptions::new(OllamaModel::default()).with_model(DEFAULT_MODEL.to_string()),
            TransportOptions::new(HttpTransport::default()),
        )
    }
}

#[async_trait]
impl Client for OllamaClient {
    type ModelProvider = OllamaModel;
    type TransportProvider = HttpTransport;

    async fn request(
        messages: Vec<Message>,
        model_options: &ModelOptions<Self::ModelProvider>,
        transport_options: &TransportOptions<Self::TransportProvider>,
    ) -> Result<Response, ClientError> {
        let response = Self::send(messages, model_options, transport_options, false).await?;
        let body = response.text().await?;
        let ollama_response: OllamaChatResponse = serde_json::from_str(&body)?;
        Ok(ollama_response.into())
    }

    fn new(
        model_options: ModelOptions<Self::ModelProvider>,
        transport_options: TransportOptions<Self::TransportProvider>,
    ) -> Self {
        Self {
            model_options,
            transport_options,
        }
    }

    fn model_options(&self) -> &ModelOptions<Self::ModelProvider> {
        &self.model_options
    }

    fn transport_options(&self) -> &TransportOptions<Self::TransportProvider> {
        &self.transport_options
    }
}

#[async_trait]
impl StreamingClient for OllamaClient {
    async fn request_stream(
        messages: Vec<Message>,
        model_options: &ModelOptions<Self::ModelProvider>,
        transport_options: &TransportOptions<Self::TransportProvider>,
    ) -> Result<ChunkStream, ClientError> {
        let response = Self::send(messages, model_options, transport_options, true).await?;
        Ok(Box::pin(Self::process_stream(response)))
    }
}

// --- Ollama API Request/Response Types ---

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaRequestOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    keep_alive: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    think: Option<bool>,
}

impl OllamaChatRequest {
    fn new(messages: Vec<Message>, model_options: &ModelOptions<OllamaModel>, stream: bool) -> Self {
        let system = model_options
            .instructions
            .as_deref()
            .filter(|prompt| !prompt.trim().is_empty())
            .map(Message::system);

        let options = OllamaRequestOptions {
            temperature: model_options.temperature,
            top_p: model_options.top_p,
            top_k: model_options.provider.top_k,
            num_predict: model_options.max_tokens,
            num_ctx: model_options.provider.num_ctx,
            seed: model_options.provider.seed,
        };

        OllamaChatRequest {
            model: model_options
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            messages: system.into_iter().chain(messages).collect(),
            stream,
            options: (!options.is_empty()).then_some(options),
            keep_alive: model_options.provider.keep_alive.clone(),
            think: model_options.reasoning,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct OllamaRequestOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_ctx: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
}

impl OllamaRequestOptions {
    fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.top_p.is_none()
            && self.top_k.is_none()
            && self.num_predict.is_none()
            && self.num_ctx.is_none()
            && self.seed.is_none()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct OllamaChatResponse {
    model: Option<String>,
    message: Message,
    done_reason: Option<String>,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
}

impl From<OllamaChatResponse> for Response {
    fn from(resp: OllamaChatResponse) -> Self {
        let usage = (resp.prompt_eval_count.is_some() || resp.eval_count.is_some()).then_some(
            Usage {
                prompt_tokens: resp.prompt_eval_count,
                completion_tokens: resp.eval_count,
            },
        );

        Response {
            message: resp.message,
            model: resp.model,
            usage,
            finish: resp
                .done_reason
                .as_deref()
                .map(FinishReason::from)
                .unwrap_or(FinishReason::Stop),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct OllamaTags {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

#[derive(Debug, Clone, Deserialize)]
struct OllamaErrorResponse {
    error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;
    use serde_json::json;

    #[test]
    fn test_request_prepends_system_prompt() {
        let options = ModelOptions::new(OllamaModel::default())
            .with_instructions("Be kind.".to_string())
            .with_temperature(0.7);
        let request = OllamaChatRequest::new(vec![Message::user("Bonjour")], &options, true);

        assert_eq!(request.model, DEFAULT_MODEL);
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[1], Message::user("Bonjour"));

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["stream"], true);
        assert!((body["options"]["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert!(body.get("keep_alive").is_none());
    }

    #[test]
    fn test_request_skips_blank_system_prompt_and_empty_options() {
        let options = ModelOptions::new(OllamaModel::default()).with_instructions("  ".to_string());
        let request = OllamaChatRequest::new(vec![Message::user("Hi")], &options, false);

        assert_eq!(request.messages, vec![Message::user("Hi")]);
        let body = serde_json::to_value(&request).unwrap();
        assert!(body.get("options").is_none());
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn test_record_chunks_for_delta_and_final_record() {
        let delta = ParsedRecord::new(json!({"message": {"content": "Hel"}, "done": false}));
        let chunks: Vec<_> = record_chunks(&delta).into_iter().map(Result::unwrap).collect();
        assert_eq!(chunks, vec![StreamChunk::Data("Hel".to_string())]);

        let last = ParsedRecord::new(json!({
            "message": {"content": ""},
            "done": true,
            "done_reason": "length",
            "prompt_eval_count": 3,
            "eval_count": 5
        }));
        let chunks: Vec<_> = record_chunks(&last).into_iter().map(Result::unwrap).collect();
        assert_eq!(
            chunks,
            vec![
                StreamChunk::Usage(Usage {
                    prompt_tokens: Some(3),
                    completion_tokens: Some(5),
                }),
                StreamChunk::Finish(FinishReason::OutputTokens),
            ]
        );
    }

    #[test]
    fn test_record_chunks_ignores_unrelated_records() {
        let record = ParsedRecord::new(json!({"a": 1}));
        assert!(record_chunks(&record).is_empty());
    }

    #[test]
    fn test_record_chunks_surfaces_in_band_error() {
        let record = ParsedRecord::new(json!({"error": "out of memory"}));
        let chunks = record_chunks(&record);
        assert!(matches!(&chunks[..], [Err(ClientError::ProviderError(msg))] if msg.contains("out of memory")));
    }

    #[test]
    fn test_handle_error_response() {
        let err = OllamaClient::handle_error_response(
            reqwest::StatusCode::NOT_FOUND,
            r#"{"error":"model \"nope\" not found, try pulling it first"}"#,
        );
        assert!(err.to_string().contains("try pulling it first"));

        let err = OllamaClient::handle_error_response(reqwest::StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(err.to_string(), "Provider error: HTTP 502 Bad Gateway: upstream down");
    }

    #[test]
    fn test_response_conversion() {
        let resp: OllamaChatResponse = serde_json::from_value(json!({
            "model": "llama3.2",
            "created_at": "2024-01-01T00:00:00Z",
            "message": {"role": "assistant", "content": "Salut !"},
            "done": true,
            "done_reason": "stop",
            "prompt_eval_count": 12,
            "eval_count": 4
        }))
        .unwrap();

        let response: Response = resp.into();
        assert_eq!(response.message, Message::assistant("Salut !"));
        assert_eq!(response.model.as_deref(), Some("llama3.2"));
        assert_eq!(response.finish, FinishReason::Stop);
        assert_eq!(response.usage.and_then(|u| u.completion_tokens), Some(4));
    }
}
