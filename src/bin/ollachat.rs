//! Interactive terminal chat against a local Ollama server.
//!
//! Settings come from the JSON file named by `OLLACHAT_CONFIG` (optional) and
//! the environment, see [`ChatConfig`]. Answers stream to stdout as they are
//! generated; logs go to stderr (`RUST_LOG` controls the level).
//!
//! Ctrl-C stops the answer being generated, or exits at the prompt. Ctrl-D or
//! `/quit` also exits.
//!
//! Run with:
//! ```bash
//! OLLAMA_MODEL=llama3.2 cargo run --bin ollachat
//! ```

use std::future::Future;
use std::io::Write;

use futures::future::AbortHandle;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing_subscriber::EnvFilter;

use ollachat::client::Client;
use ollachat::config::ChatConfig;
use ollachat::conversation::{Conversation, ConversationStore};
use ollachat::prompt::SystemPrompt;
use ollachat::providers::OllamaClient;
use ollachat::{ChatSession, ClientError};

const HELP: &str = "Commands: /new, /list, /models, /reload, /help, /quit (or Ctrl-C)";

/// What the prompt produced.
#[derive(Debug, PartialEq)]
enum Input {
    Line(String),
    Eof,
    Interrupted,
}

/// Wait for the next line, giving up when `interrupt` resolves first.
async fn next_input<R>(
    lines: &mut Lines<R>,
    interrupt: impl Future<Output = ()>,
) -> std::io::Result<Input>
where
    R: AsyncBufRead + Unpin,
{
    tokio::select! {
        biased;
        _ = interrupt => Ok(Input::Interrupted),
        line = lines.next_line() => Ok(line?.map_or(Input::Eof, Input::Line)),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = match std::env::var("OLLACHAT_CONFIG") {
        Ok(path) => ChatConfig::load(&path).await?,
        Err(_) => ChatConfig::default(),
    }
    .with_env_overrides();

    let (model_options, transport_options) = config.to_options()?;
    let client = OllamaClient::new(model_options, transport_options);
    let mut prompt = SystemPrompt::load(&config.system_prompt_path).await;

    if let Err(e) = client.check_connection().await {
        tracing::warn!(error = %e, url = %config.ollama_url, "Ollama is not reachable, is it running?");
    }

    let mut store = ConversationStore::new();
    let mut current = store.create();

    println!("Chatting with {} at {}. {HELP}", config.model, config.ollama_url);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let interrupt = async {
            // A failed handler install must not end the session.
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        };
        let line = match next_input(&mut lines, interrupt).await? {
            Input::Line(line) => line,
            Input::Eof => break,
            Input::Interrupted => {
                println!();
                break;
            }
        };

        match line.trim() {
            "" => continue,
            "/quit" => break,
            "/help" => println!("{HELP}"),
            "/new" => {
                current = store.create();
                println!("New conversation.");
            }
            "/list" => {
                for summary in store.list() {
                    let marker = if summary.id == current { '*' } else { ' ' };
                    println!(
                        "{marker} {} ({} messages, {})",
                        summary.title,
                        summary.message_count,
                        summary.timestamp.format("%d/%m/%Y %H:%M")
                    );
                }
            }
            "/models" => match client.list_models().await {
                Ok(models) => {
                    for model in models {
                        println!("{}", model.name);
                    }
                }
                Err(e) => eprintln!("Cannot list models: {e}"),
            },
            "/reload" => {
                prompt.reload().await;
                println!("System prompt reloaded ({} characters).", prompt.len());
            }
            question => {
                let expired = store.purge_older_than(config.retention(), chrono::Utc::now());
                if expired.contains(&current) {
                    current = store.create();
                }
                ask(&client, prompt.text(), store.get_or_create(&current), question).await;
            }
        }
    }

    Ok(())
}

async fn ask(client: &OllamaClient, system_prompt: &str, conversation: &mut Conversation, question: &str) {
    let session = ChatSession::new(client, system_prompt);

    let (stop, registration) = AbortHandle::new_pair();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.abort();
        }
    });

    let result = session
        .send_streaming(conversation, question, registration, |delta| {
            print!("{delta}");
            let _ = std::io::stdout().flush();
        })
        .await;
    watcher.abort();

    match result {
        Ok(reply) => {
            println!();
            if reply.skipped_lines > 0 {
                eprintln!("({} malformed lines skipped)", reply.skipped_lines);
            }
        }
        Err(ClientError::StreamCancelled) => println!("\n[stopped]"),
        Err(e) => {
            println!();
            eprintln!("Error: the answer could not be generated ({e}). Check that Ollama is running.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_next_input_reads_lines_then_eof() {
        let mut lines = BufReader::new(&b"/list\n"[..]).lines();

        let first = next_input(&mut lines, std::future::pending()).await.unwrap();
        assert_eq!(first, Input::Line("/list".to_string()));

        let second = next_input(&mut lines, std::future::pending()).await.unwrap();
        assert_eq!(second, Input::Eof);
    }

    #[tokio::test]
    async fn test_next_input_interrupt_wins_over_pending_read() {
        let (_writer, reader) = tokio::io::duplex(64);
        let mut lines = BufReader::new(reader).lines();

        let input = next_input(&mut lines, async {}).await.unwrap();
        assert_eq!(input, Input::Interrupted);
    }
}
