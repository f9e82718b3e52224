//! Decodes `text/event-stream` response bodies into their `data:` payloads.

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::llm_client::LlmError;

/// Splits a byte stream into SSE `data:` payloads, one item per data line.
/// Lines are buffered as bytes so multi-byte characters split across chunks survive.
pub fn data_lines<S>(body: S) -> impl Stream<Item = Result<String, LlmError>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    async_stream::try_stream! {
        let mut buffer: Vec<u8> = Vec::new();
        futures_util::pin_mut!(body);

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            buffer.extend_from_slice(&chunk);

            while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                if let Some(data) = data_payload(&line) {
                    yield data;
                }
            }
        }

        if let Some(data) = data_payload(&buffer) {
            yield data;
        }
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches(['\r', '\n']);
    let data = line.strip_prefix("data:")?.trim_start();
    if data.is_empty() {
        None
    } else {
        Some(data.to_string())
    }
}
