//! SSE streaming parser for Gemini `streamGenerateContent?alt=sse`.
//!
//! Converts a raw byte stream into text fragments. Each `data:` line carries a
//! full `GenerateContentResponse`; chunks without text (usage-only or
//! finish-reason-only chunks) are skipped.

use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::error::GenAIError;
use crate::types::GenerateContentResponse;

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, String>> + Send>>;

/// Stream adapter that converts raw SSE bytes into text fragments.
pub struct GenerateContentStream {
    inner: ByteStream,
    buffer: Vec<u8>,
    eof: bool,
}

impl GenerateContentStream {
    pub(crate) fn new<S, E>(byte_stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: std::fmt::Display,
    {
        Self {
            inner: Box::pin(byte_stream.map(|r| r.map_err(|e| e.to_string()))),
            buffer: Vec::new(),
            eof: false,
        }
    }
}

impl Stream for GenerateContentStream {
    type Item = Result<String, GenAIError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            // Try to parse a complete line from the buffer
            if let Some(fragment) = try_parse_line(&mut this.buffer) {
                return Poll::Ready(Some(fragment));
            }

            if this.eof {
                return Poll::Ready(None);
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => this.buffer.extend_from_slice(&bytes),
                Poll::Ready(Some(Err(e))) => {
                    this.eof = true;
                    this.buffer.clear();
                    return Poll::Ready(Some(Err(GenAIError::Network(e))));
                }
                Poll::Ready(None) => {
                    // Terminate a trailing unterminated line so it gets parsed
                    this.eof = true;
                    if !this.buffer.is_empty() {
                        this.buffer.push(b'\n');
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Try to extract and parse a complete SSE line from the buffer.
/// Returns `None` if no complete text-bearing line is available yet.
fn try_parse_line(buffer: &mut Vec<u8>) -> Option<Result<String, GenAIError>> {
    loop {
        let newline_pos = buffer.iter().position(|b| *b == b'\n')?;
        let raw: Vec<u8> = buffer.drain(..=newline_pos).collect();

        let line = match std::str::from_utf8(&raw) {
            Ok(line) => line.trim(),
            Err(e) => {
                return Some(Err(GenAIError::Parse(format!(
                    "Invalid UTF-8 in stream: {}",
                    e
                ))))
            }
        };

        // Skip non-data lines (blank separators, "event:", "id:", comments)
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();

        match serde_json::from_str::<GenerateContentResponse>(data) {
            Ok(chunk) => {
                if let Some(text) = chunk.text() {
                    return Some(Ok(text));
                }
            }
            Err(e) => {
                return Some(Err(GenAIError::Parse(format!(
                    "Failed to parse stream chunk: {} (data: {})",
                    e,
                    &data[..data.len().min(200)]
                ))));
            }
        }
    }
}
