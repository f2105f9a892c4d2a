//! Helpers for chunked HTTP response bodies.

use std::fmt;

use async_stream::try_stream;
use futures::{Stream, StreamExt};

use crate::error::LlmError;

/// Splits a chunked byte stream into lines.
///
/// Chunk boundaries are arbitrary, so partial lines are buffered until their
/// newline arrives. Trailing `\r` is stripped. A final unterminated line is
/// emitted when the body ends. Transport errors end the stream with
/// `LlmError::StreamInterrupted`.
pub(crate) fn lines<S, B, E>(body: S) -> impl Stream<Item = Result<String, LlmError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send,
    B: AsRef<[u8]> + Send,
    E: fmt::Display + Send,
{
    try_stream! {
        let mut buffer: Vec<u8> = Vec::new();
        futures::pin_mut!(body);

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| LlmError::StreamInterrupted(e.to_string()))?;
            buffer.extend_from_slice(chunk.as_ref());

            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                yield decode_line(&line);
            }
        }

        if !buffer.is_empty() {
            yield decode_line(&buffer);
        }
    }
}

fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}
