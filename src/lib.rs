//! # ollachat - Chat client for a local Ollama server
//!
//! A small, pragmatic Rust library for answering visitors' questions with a
//! language model served by [Ollama](https://ollama.com), keeping a thin layer
//! of conversation bookkeeping in memory.
//!
//! ## Features
//! - Async-first, tokio compatible
//! - Incremental NDJSON decoding of streamed replies, robust to arbitrary
//!   chunk boundaries and malformed lines
//! - Cooperative cancellation of a reply in progress
//! - Conversation history with titles, timestamps and age-based purge
//! - System prompt kept in an editable file
//!
//! ## Architecture
//!
//! - [`ndjson`]: the streaming chunk decoder and its `reqwest` adapter
//! - [`client`] / [`providers`]: the `Client` traits and the Ollama client
//! - [`session`]: one question in, one accumulated answer out
//! - [`conversation`], [`prompt`], [`config`]: bookkeeping and settings
//!
//! ## Example
//! ```no_run
//! use ollachat::client::Client;
//! use ollachat::model::Message;
//! use ollachat::options::{HttpTransport, ModelOptions, OllamaModel, TransportOptions};
//! use ollachat::providers::OllamaClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let model_options = ModelOptions::new(OllamaModel::default())
//!         .with_model("llama3.2".to_string())
//!         .with_temperature(0.7);
//!     let transport_options = TransportOptions::new(HttpTransport::new("http://localhost:11434"));
//!
//!     let client = OllamaClient::new(model_options, transport_options);
//!     let response = client.chat(vec![Message::user("Bonjour !")]).await?;
//!     println!("{}", response.message.content);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod conversation;
pub mod http;
pub mod model;
pub mod ndjson;
pub mod options;
pub mod prompt;
pub mod providers;
pub mod session;

// Re-exports for convenience
pub use client::{Client, ClientError, StreamingClient};
pub use model::{Message, ParsedRecord, Response, StreamChunk};
pub use ndjson::{DecodeError, NdjsonDecoder};
pub use session::{ChatSession, Reply};
