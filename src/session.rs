//! Per-request chat flow: build the history, query the model, accumulate the
//! reply and record the exchange.
//!
//! # Example
//! ```no_run
//! use futures::future::AbortHandle;
//! use ollachat::conversation::ConversationStore;
//! use ollachat::providers::OllamaClient;
//! use ollachat::session::ChatSession;
//!
//! # async fn run() -> Result<(), ollachat::ClientError> {
//! let client = OllamaClient::default();
//! let mut store = ConversationStore::new();
//! let id = store.create();
//!
//! let session = ChatSession::new(&client, "Answer in French.");
//! let (_stop, registration) = AbortHandle::new_pair();
//! let reply = session
//!     .send_streaming(store.get_or_create(&id), "Quels sont les débouchés ?", registration, |delta| {
//!         print!("{delta}")
//!     })
//!     .await?;
//! println!("\n({} characters)", reply.content.len());
//! # Ok(())
//! # }
//! ```

use futures::future::{self, AbortRegistration, Abortable};
use futures::stream::{self, StreamExt};

use crate::client::{ClientError, StreamingClient};
use crate::conversation::Conversation;
use crate::model::{FinishReason, StreamChunk, Usage};
use crate::options::ModelOptions;

/// The outcome of one question.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    /// Full assistant text
    pub content: String,

    pub finish: Option<FinishReason>,

    pub usage: Option<Usage>,

    /// Streamed lines that could not be decoded and were skipped
    pub skipped_lines: usize,
}

/// Context for asking questions with a fixed client and system prompt.
///
/// Cheap to build; make one per request or keep one per front-end.
pub struct ChatSession<'a, C> {
    client: &'a C,
    system_prompt: &'a str,
}

impl<'a, C> ChatSession<'a, C>
where
    C: StreamingClient,
    C::ModelProvider: Clone,
{
    pub fn new(client: &'a C, system_prompt: &'a str) -> Self {
        Self {
            client,
            system_prompt,
        }
    }

    fn model_options(&self) -> ModelOptions<C::ModelProvider> {
        self.client
            .model_options()
            .clone()
            .with_instructions(self.system_prompt.to_string())
    }

    /// Ask a question and wait for the whole answer.
    ///
    /// The exchange is recorded in `conversation` only on success.
    pub async fn send(
        &self,
        conversation: &mut Conversation,
        question: &str,
    ) -> Result<Reply, ClientError> {
        let question = validate(question)?;
        tracing::info!(conversation = %conversation.id, "question received");

        let response = self
            .client
            .chat_with_options(conversation.history_with(question), &self.model_options())
            .await?;

        let reply = Reply {
            content: response.message.content,
            finish: Some(response.finish),
            usage: response.usage,
            skipped_lines: 0,
        };
        conversation.record_exchange(question, &reply.content);
        Ok(reply)
    }

    /// Ask a question and stream the answer to `on_delta` as it is generated.
    ///
    /// Aborting the handle paired with `cancel` stops the request at any
    /// stage, including while waiting for the server to answer.
    /// Deltas already passed to `on_delta` stay delivered, nothing is recorded
    /// in `conversation` and the call returns [`ClientError::StreamCancelled`].
    /// Undecodable lines are logged, counted in [`Reply::skipped_lines`] and
    /// skipped. Any other error ends the call without recording.
    pub async fn send_streaming<F>(
        &self,
        conversation: &mut Conversation,
        question: &str,
        cancel: AbortRegistration,
        mut on_delta: F,
    ) -> Result<Reply, ClientError>
    where
        F: FnMut(&str),
    {
        let question = validate(question)?;
        tracing::info!(conversation = %conversation.id, "question received");

        // One abort point covers both waiting for headers and reading the body.
        let options = self.model_options();
        let request = self
            .client
            .chat_stream_with_options(conversation.history_with(question), &options);
        let chunks = stream::once(request).flat_map(|opened| match opened {
            Ok(chunks) => chunks.left_stream(),
            Err(e) => stream::once(future::ready(Err::<StreamChunk, _>(e))).right_stream(),
        });
        let mut chunks = std::pin::pin!(Abortable::new(chunks, cancel));

        let mut reply = Reply::default();
        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(StreamChunk::Data(delta)) => {
                    reply.content.push_str(&delta);
                    on_delta(&delta);
                }
                Ok(StreamChunk::Usage(usage)) => reply.usage = Some(usage),
                Ok(StreamChunk::Finish(reason)) => reply.finish = Some(reason),
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(error = %e, "skipping undecodable stream line");
                    reply.skipped_lines += 1;
                }
                Err(e) => return Err(e),
            }
        }

        if chunks.is_aborted() {
            tracing::info!(
                conversation = %conversation.id,
                received = reply.content.len(),
                "generation stopped by user"
            );
            return Err(ClientError::StreamCancelled);
        }

        conversation.record_exchange(question, &reply.content);
        Ok(reply)
    }
}

fn validate(question: &str) -> Result<&str, ClientError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(ClientError::InvalidRequest("message is required".to_string()));
    }
    Ok(question)
}
