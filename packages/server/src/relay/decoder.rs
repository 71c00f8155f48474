//! Event-stream decoder.
//!
//! Reads the framer's `text/event-stream` body as it arrives and yields
//! [`StreamFrame`]s. Only `data:` lines carry payload; `id:` lines give the
//! frame sequence, which is used for diagnostics only. Lines may be split
//! anywhere across network chunks, including inside a UTF-8 sequence.
//!
//! The stream ends after the `stream_end` frame, after the first error, or
//! when the body ends (a truncated stream simply stops without `StreamEnd`).

use bytes::Bytes;
use futures::future;
use futures::stream::{Stream, StreamExt};
use serde_json::Value;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, warn};

use crate::common::{StreamFrame, DONE_STATUS};
use crate::relay::error::DecodeError;

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, String>> + Send>>;

pub struct FrameDecoder {
    inner: ByteStream,
    buffer: Vec<u8>,
    pending_id: Option<u64>,
    last_sequence: u64,
    eof: bool,
    finished: bool,
}

impl FrameDecoder {
    pub fn new<S, E>(byte_stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: std::fmt::Display,
    {
        Self {
            inner: Box::pin(byte_stream.map(|r| r.map_err(|e| e.to_string()))),
            buffer: Vec::new(),
            pending_id: None,
            last_sequence: 0,
            eof: false,
            finished: false,
        }
    }

    fn handle_line(&mut self, raw: &[u8]) -> Result<Option<StreamFrame>, DecodeError> {
        let line = std::str::from_utf8(raw)?;

        if let Some(id) = field_value(line, "id") {
            match id.parse::<u64>() {
                Ok(id) => self.pending_id = Some(id),
                Err(_) => debug!(id, "Ignoring non-numeric frame id"),
            }
            return Ok(None);
        }

        // event:, comments and blank separators carry nothing we need
        let Some(data) = field_value(line, "data") else {
            return Ok(None);
        };

        let payload: Value = serde_json::from_str(data).map_err(|source| DecodeError::Json {
            data: data.to_string(),
            source,
        })?;
        let Value::Object(fields) = payload else {
            return Err(DecodeError::UnexpectedPayload(data.to_string()));
        };

        let sequence = self.next_sequence();

        if let Some(chunk) = fields.get("text_chunk") {
            let Value::String(text) = chunk else {
                return Err(DecodeError::UnexpectedPayload(data.to_string()));
            };
            return Ok(Some(StreamFrame::TextChunk {
                sequence,
                text: text.clone(),
            }));
        }

        match fields.get("status") {
            Some(Value::String(status)) if status == DONE_STATUS => {
                Ok(Some(StreamFrame::StreamEnd { sequence }))
            }
            Some(Value::String(status)) => {
                debug!(sequence, status = %status, "Ignoring frame with unrecognized status");
                Ok(None)
            }
            Some(_) => Err(DecodeError::UnexpectedPayload(data.to_string())),
            None => {
                debug!(sequence, "Skipping frame without text_chunk or status");
                Ok(None)
            }
        }
    }

    fn next_sequence(&mut self) -> u64 {
        let expected = self.last_sequence + 1;
        let sequence = self.pending_id.take().unwrap_or(expected);
        if sequence != expected {
            warn!(expected, received = sequence, "Non-contiguous frame id");
        }
        self.last_sequence = sequence;
        sequence
    }
}

impl Stream for FrameDecoder {
    type Item = Result<StreamFrame, DecodeError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if this.finished {
                return Poll::Ready(None);
            }

            while let Some(line) = take_line(&mut this.buffer) {
                match this.handle_line(&line) {
                    Ok(Some(frame)) => {
                        if matches!(frame, StreamFrame::StreamEnd { .. }) {
                            this.finished = true;
                        }
                        return Poll::Ready(Some(Ok(frame)));
                    }
                    Ok(None) => continue,
                    Err(e) => {
                        this.finished = true;
                        return Poll::Ready(Some(Err(e)));
                    }
                }
            }

            if this.eof {
                this.finished = true;
                return Poll::Ready(None);
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => this.buffer.extend_from_slice(&bytes),
                Poll::Ready(Some(Err(e))) => {
                    this.finished = true;
                    this.buffer.clear();
                    return Poll::Ready(Some(Err(DecodeError::Transport(e))));
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

/// Remove the next complete line from `buffer`, without its `\n` / `\r\n`.
fn take_line(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let newline_pos = buffer.iter().position(|b| *b == b'\n')?;
    let mut line: Vec<u8> = buffer.drain(..=newline_pos).collect();
    line.pop();
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Some(line)
}

/// Value of an SSE field line (`name: value` or `name:value`).
fn field_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let value = line.strip_prefix(name)?.strip_prefix(':')?;
    Some(value.strip_prefix(' ').unwrap_or(value))
}

/// Signals derived from the frame sequence, carrying the text received so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    TextUpdated { sequence: u64, text: String },
    StreamComplete { sequence: u64, text: String },
}

/// Fold frames into the running text.
pub fn assemble<S>(frames: S) -> impl Stream<Item = Result<Signal, DecodeError>>
where
    S: Stream<Item = Result<StreamFrame, DecodeError>>,
{
    frames.scan(String::new(), |running, item| {
        let signal = item.map(|frame| match frame {
            StreamFrame::TextChunk { sequence, text } => {
                running.push_str(&text);
                Signal::TextUpdated {
                    sequence,
                    text: running.clone(),
                }
            }
            StreamFrame::StreamEnd { sequence } => Signal::StreamComplete {
                sequence,
                text: running.clone(),
            },
        });
        future::ready(Some(signal))
    })
}
