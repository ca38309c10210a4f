//! Core client trait and error types.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

use crate::model::{Message, Response, StreamChunk};
use crate::ndjson::DecodeError;
use crate::options::{ModelOptions, TransportOptions};

/// Errors that can occur during client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// One streamed line could not be decoded. The stream carries on.
    #[error("Stream decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Stream cancelled")]
    StreamCancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Whether the failure concerns a single streamed item and consumption
    /// of the stream can continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ClientError::Decode(_))
    }
}

/// Boxed stream of reply chunks returned by [`StreamingClient`].
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, ClientError>> + Send>>;

/// Main client trait for chat model servers.
///
/// Each implementation defines its own model and transport option types.
///
/// # Required Methods
/// - `request`: Static method that sends a request with explicit options
/// - `new`: Constructor to create a client instance
/// - `model_options`: Accessor for the stored model options
/// - `transport_options`: Accessor for the stored transport options
///
/// # Provided Methods (with default implementations)
/// - `chat`: Uses default options
/// - `chat_with_options`: Overrides model options
#[async_trait]
pub trait Client: Send + Sync + Sized {
    /// Provider-specific model options type.
    type ModelProvider: Send + Sync;

    /// Provider-specific transport options type.
    type TransportProvider: Send + Sync;

    /// Core static request method that must be implemented by each provider.
    ///
    /// # Arguments
    /// - `messages`: Conversation messages, oldest first
    /// - `model_options`: Model behavior options (temperature, system prompt, etc.)
    /// - `transport_options`: Transport configuration (endpoint, timeout, etc.)
    async fn request(
        messages: Vec<Message>,
        model_options: &ModelOptions<Self::ModelProvider>,
        transport_options: &TransportOptions<Self::TransportProvider>,
    ) -> Result<Response, ClientError>;

    /// Create a new client instance with the given default options.
    fn new(
        model_options: ModelOptions<Self::ModelProvider>,
        transport_options: TransportOptions<Self::TransportProvider>,
    ) -> Self;

    /// Get reference to the model options field.
    fn model_options(&self) -> &ModelOptions<Self::ModelProvider>;

    /// Get reference to the transport options field.
    fn transport_options(&self) -> &TransportOptions<Self::TransportProvider>;

    /// Instance method that uses default options stored in the client.
    async fn chat(&self, messages: Vec<Message>) -> Result<Response, ClientError> {
        Self::request(messages, self.model_options(), self.transport_options()).await
    }

    /// Instance method that overrides default model options.
    async fn chat_with_options(
        &self,
        messages: Vec<Message>,
        model_options: &ModelOptions<Self::ModelProvider>,
    ) -> Result<Response, ClientError> {
        Self::request(messages, model_options, self.transport_options()).await
    }
}

/// Extension trait for streaming support.
///
/// The returned stream yields text deltas as the model generates them.
/// Items that are `Err` with [`ClientError::is_recoverable`] report a skipped
/// line; any other error is the last item of the stream.
#[async_trait]
pub trait StreamingClient: Client {
    /// Static streaming method.
    async fn request_stream(
        messages: Vec<Message>,
        model_options: &ModelOptions<Self::ModelProvider>,
        transport_options: &TransportOptions<Self::TransportProvider>,
    ) -> Result<ChunkStream, ClientError>;

    /// Instance method for streaming that uses default options.
    async fn chat_stream(&self, messages: Vec<Message>) -> Result<ChunkStream, ClientError> {
        Self::request_stream(
            messages,
            <Self as Client>::model_options(self),
            <Self as Client>::transport_options(self),
        )
        .await
    }

    /// Instance method for streaming that overrides default model options.
    async fn chat_stream_with_options(
        &self,
        messages: Vec<Message>,
        model_options: &ModelOptions<Self::ModelProvider>,
    ) -> Result<ChunkStream, ClientError> {
        Self::request_stream(
            messages,
            model_options,
            <Self as Client>::transport_options(self),
        )
        .await
    }
}
