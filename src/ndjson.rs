//! Newline-delimited JSON (NDJSON) stream processing.
//!
//! Ollama streams chat completions as one JSON object per line:
//! ```text
//! {"message":{"role":"assistant","content":"Hel"},"done":false}
//! {"message":{"role":"assistant","content":"lo"},"done":false}
//! {"message":{"role":"assistant","content":""},"done":true,"done_reason":"stop"}
//! ```
//!
//! Network chunks are not aligned with lines. [`NdjsonDecoder`] keeps the
//! unterminated tail of every chunk and prefixes it onto the next one, so a
//! record split across any number of chunks comes out whole.

use std::collections::VecDeque;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use thiserror::Error;

use crate::client::ClientError;
use crate::model::ParsedRecord;

/// A complete line that could not be parsed as JSON.
///
/// Recoverable: the line is dropped and decoding continues with the next one.
#[derive(Error, Debug)]
#[error("malformed JSON on line {line_number}: {source}")]
pub struct DecodeError {
    line_number: usize,
    line: String,
    #[source]
    source: serde_json::Error,
}

impl DecodeError {
    /// 1-based position of the offending line in the stream, blank lines included.
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// The offending line, lossily decoded as UTF-8.
    pub fn line(&self) -> &str {
        &self.line
    }
}

/// Outcome of decoding one candidate line.
pub type DecodeResult = Result<ParsedRecord, DecodeError>;

/// Incremental NDJSON decoder.
///
/// One decoder serves exactly one response body. Feed it chunks in arrival
/// order with [`feed`](Self::feed) and call [`finish`](Self::finish) once the
/// transport reports end-of-stream.
///
/// # Example
/// ```
/// use ollachat::ndjson::NdjsonDecoder;
///
/// let mut decoder = NdjsonDecoder::new();
/// assert!(decoder.feed(br#"{"message":{"content":"Hel"#).is_empty());
///
/// let records = decoder.feed(b"lo\"}}\n");
/// assert_eq!(records.len(), 1);
/// assert_eq!(records[0].as_ref().unwrap().content_delta(), Some("Hello"));
/// assert!(decoder.finish().is_empty());
/// ```
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    residual: Vec<u8>,
    lines_seen: usize,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and decode every line it completes.
    ///
    /// Blank lines are skipped. A line that fails to parse yields a
    /// [`DecodeError`] in its position and does not affect its neighbours.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<DecodeResult> {
        let start = self.residual.len();
        self.residual.extend_from_slice(chunk);

        // Only the new bytes can hold a newline; the residual never does.
        let Some(pos) = chunk.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let tail = self.residual.split_off(start + pos + 1);
        let complete = std::mem::replace(&mut self.residual, tail);

        complete[..complete.len() - 1]
            .split(|&b| b == b'\n')
            .filter_map(|line| self.decode_line(line))
            .collect()
    }

    /// Decode whatever is left after the final newline.
    ///
    /// Consumes the decoder: a finished stream cannot be fed again.
    pub fn finish(mut self) -> Vec<DecodeResult> {
        let residual = std::mem::take(&mut self.residual);
        self.decode_line(&residual).into_iter().collect()
    }

    /// Number of bytes waiting for a terminating newline.
    pub fn buffered(&self) -> usize {
        self.residual.len()
    }

    fn decode_line(&mut self, line: &[u8]) -> Option<DecodeResult> {
        self.lines_seen += 1;
        let line_number = self.lines_seen;

        let line = line.trim_ascii();
        if line.is_empty() {
            return None;
        }

        let result = serde_json::from_slice(line)
            .map(ParsedRecord::new)
            .map_err(|source| {
                tracing::debug!(line_number, error = %source, "malformed NDJSON line");
                DecodeError {
                    line_number,
                    line: String::from_utf8_lossy(line).into_owned(),
                    source,
                }
            });
        Some(result)
    }
}

/// Decode a byte stream into a stream of NDJSON records.
///
/// Malformed lines surface as `Err(ClientError::Decode(_))` and the stream
/// keeps going. A transport error surfaces once and ends the stream; the
/// partially buffered line is discarded with the decoder.
pub fn records<S, E>(byte_stream: S) -> impl Stream<Item = Result<ParsedRecord, ClientError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<ClientError> + Send,
{
    stream::unfold(
        (
            Box::pin(byte_stream),
            Some(NdjsonDecoder::new()),
            VecDeque::<DecodeResult>::new(),
        ),
        |(mut byte_stream, mut decoder, mut pending)| async move {
            loop {
                if let Some(result) = pending.pop_front() {
                    let item = result.map_err(ClientError::from);
                    return Some((item, (byte_stream, decoder, pending)));
                }

                // No decoder left means the stream finished or failed.
                let active = decoder.as_mut()?;

                match byte_stream.next().await {
                    Some(Ok(chunk)) => pending.extend(active.feed(&chunk)),
                    Some(Err(e)) => {
                        decoder = None;
                        return Some((Err(e.into()), (byte_stream, decoder, pending)));
                    }
                    None => {
                        if let Some(finished) = decoder.take() {
                            pending.extend(finished.finish());
                        }
                    }
                }
            }
        },
    )
}

/// Extension trait for `reqwest::Response` to consume an NDJSON body.
///
/// # Example
/// ```ignore
/// use ollachat::ndjson::NdjsonResponseExt;
///
/// let response = http.post(url).json(&body).send().await?;
/// let mut records = Box::pin(response.ndjson());
/// while let Some(record) = records.next().await {
///     match record {
///         Ok(record) => print!("{}", record.content_delta().unwrap_or_default()),
///         Err(e) if e.is_recoverable() => eprintln!("skipped: {e}"),
///         Err(e) => return Err(e),
///     }
/// }
/// ```
pub trait NdjsonResponseExt {
    /// Convert the response body into a stream of parsed records.
    fn ndjson(self) -> impl Stream<Item = Result<ParsedRecord, ClientError>> + Send;
}

impl NdjsonResponseExt for reqwest::Response {
    fn ndjson(self) -> impl Stream<Item = Result<ParsedRecord, ClientError>> + Send {
        records(self.bytes_stream())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    const PAYLOAD: &str = concat!(
        "{\"message\":{\"role\":\"assistant\",\"content\":\"Bon\"},\"done\":false}\n",
        "{\"message\":{\"role\":\"assistant\",\"content\":\"jour é\u{1F393}\"},\"done\":false}\n",
        "\n",
        "{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true,\"done_reason\":\"stop\"}\n",
    );

    fn values(results: Vec<DecodeResult>) -> Vec<Value> {
        results
            .into_iter()
            .map(|r| r.expect("unexpected decode error").into_value())
            .collect()
    }

    fn decode_chunks(chunks: &[&[u8]]) -> Vec<DecodeResult> {
        let mut decoder = NdjsonDecoder::new();
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(decoder.feed(chunk));
        }
        out.extend(decoder.finish());
        out
    }

    fn reference(payload: &str) -> Vec<Value> {
        payload
            .split('\n')
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_record_split_across_chunks() {
        let mut decoder = NdjsonDecoder::new();

        let first = decoder.feed(br#"{"message":{"content":"Hel"#);
        assert!(first.is_empty());

        let second = decoder.feed(b"lo\"}}\n{\"message\":{\"content\":\" world\"}}\n");
        let deltas: Vec<String> = second
            .into_iter()
            .map(|r| r.unwrap().content_delta().unwrap().to_string())
            .collect();
        assert_eq!(deltas, vec!["Hello", " world"]);
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_malformed_line_is_isolated() {
        let mut decoder = NdjsonDecoder::new();
        let results = decoder.feed(b"{\"a\":1}\n{bad json}\n{\"a\":2}\n");

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().value(), &json!({"a": 1}));
        let err = results[1].as_ref().unwrap_err();
        assert_eq!(err.line_number(), 2);
        assert_eq!(err.line(), "{bad json}");
        assert_eq!(results[2].as_ref().unwrap().value(), &json!({"a": 2}));
    }

    #[test]
    fn test_one_byte_chunks_match_whole_payload() {
        let bytes = PAYLOAD.as_bytes();
        let singles: Vec<&[u8]> = bytes.chunks(1).collect();

        let expected = reference(PAYLOAD);
        assert_eq!(values(decode_chunks(&singles)), expected);
        assert_eq!(values(decode_chunks(&[bytes])), expected);
    }

    #[test]
    fn test_every_split_point_matches_whole_payload() {
        let bytes = PAYLOAD.as_bytes();
        let expected = reference(PAYLOAD);

        for split in 0..=bytes.len() {
            let (a, b) = bytes.split_at(split);
            assert_eq!(values(decode_chunks(&[a, b])), expected, "split at {split}");
        }
    }

    #[test]
    fn test_feeding_a_then_b_equals_feeding_concatenation() {
        let a = b"{\"x\":1}\n{\"x\":";
        let b = b"2}\n{\"x\":3}";

        let mut joined = a.to_vec();
        joined.extend_from_slice(b);

        assert_eq!(
            values(decode_chunks(&[a, b])),
            values(decode_chunks(&[&joined]))
        );
    }

    #[test]
    fn test_finish_decodes_unterminated_final_line() {
        let mut decoder = NdjsonDecoder::new();
        let fed = decoder.feed(b"{\"n\":1}\n{\"n\":2}");
        assert_eq!(values(fed), vec![json!({"n": 1})]);
        assert_eq!(decoder.buffered(), 7);
        assert_eq!(values(decoder.finish()), vec![json!({"n": 2})]);
    }

    #[test]
    fn test_finish_reports_malformed_residual() {
        let mut decoder = NdjsonDecoder::new();
        assert!(decoder.feed(b"{\"n\":").is_empty());
        let results = decoder.finish();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[test]
    fn test_blank_and_empty_streams_yield_nothing() {
        assert!(decode_chunks(&[]).is_empty());
        assert!(decode_chunks(&[b"\n\n   \n", b"\r\n\t\n", b"  "]).is_empty());
    }

    #[test]
    fn test_crlf_line_endings() {
        let results = decode_chunks(&[b"{\"a\":1}\r\n{\"a\":2}\r", b"\n"]);
        assert_eq!(values(results), vec![json!({"a": 1}), json!({"a": 2})]);
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let payload = "{\"message\":{\"content\":\"caf\u{e9} \u{1F393}\"}}\n".as_bytes();
        let emoji_start = payload.len() - 8;
        let results = decode_chunks(&[&payload[..emoji_start + 2], &payload[emoji_start + 2..]]);

        let values = values(results);
        assert_eq!(values[0]["message"]["content"], "caf\u{e9} \u{1F393}");
    }

    #[test]
    fn test_invalid_utf8_line_is_a_decode_error() {
        let results = decode_chunks(&[b"{\"a\":\"\xff\"}\n{\"a\":2}\n"]);
        assert_eq!(results.len(), 2);
        assert!(results[0].is_err());
        assert_eq!(results[1].as_ref().unwrap().value(), &json!({"a": 2}));
    }

    #[test]
    fn test_residual_invariant_holds_after_every_feed() {
        let bytes = PAYLOAD.as_bytes();
        let mut decoder = NdjsonDecoder::new();
        let mut consumed = 0;
        let mut emitted_bytes = 0;

        for chunk in bytes.chunks(7) {
            decoder.feed(chunk);
            consumed += chunk.len();
            // Everything up to and including the last newline has been emitted.
            let last_newline = bytes[..consumed]
                .iter()
                .rposition(|&b| b == b'\n')
                .map_or(0, |p| p + 1);
            emitted_bytes = emitted_bytes.max(last_newline);
            assert_eq!(emitted_bytes + decoder.buffered(), consumed);
        }
    }

    #[test]
    fn test_line_numbers_count_blank_lines() {
        let results = decode_chunks(&[b"\n{\"ok\":true}\n\n nope \n"]);
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].as_ref().unwrap_err().line_number(), 4);
    }

    #[tokio::test]
    async fn test_records_stream_continues_after_decode_error() {
        let chunks: Vec<Result<Bytes, ClientError>> = vec![
            Ok(Bytes::from_static(b"{\"a\":1}\n{oops")),
            Ok(Bytes::from_static(b"}\n{\"a\"")),
            Ok(Bytes::from_static(b":2}")),
        ];

        let items: Vec<_> = records(stream::iter(chunks)).collect().await;
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap().value(), &json!({"a": 1}));
        assert!(matches!(items[1], Err(ClientError::Decode(_))));
        assert_eq!(items[2].as_ref().unwrap().value(), &json!({"a": 2}));
    }

    #[tokio::test]
    async fn test_records_stream_ends_after_transport_error() {
        let chunks: Vec<Result<Bytes, ClientError>> = vec![
            Ok(Bytes::from_static(b"{\"a\":1}\n{\"a\":")),
            Err(ClientError::ProviderError("connection reset".to_string())),
            Ok(Bytes::from_static(b"2}\n")),
        ];

        let items: Vec<_> = records(stream::iter(chunks)).collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(ClientError::ProviderError(_))));
    }

    #[tokio::test]
    async fn test_records_stream_abort_keeps_delivered_prefix() {
        use futures::future::{AbortHandle, Abortable};

        let chunks: Vec<Result<Bytes, ClientError>> = vec![
            Ok(Bytes::from_static(b"{\"n\":1}\n")),
            Ok(Bytes::from_static(b"{\"n\":2}\n")),
        ];
        let (handle, registration) = AbortHandle::new_pair();
        let mut stream = std::pin::pin!(Abortable::new(records(stream::iter(chunks)), registration));

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.value(), &json!({"n": 1}));

        handle.abort();
        assert!(stream.next().await.is_none());
        assert!(stream.is_aborted());
    }
}
