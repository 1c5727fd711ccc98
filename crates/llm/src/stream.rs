//! Decoding of streamed (`text/event-stream`) chat completions.

use crate::error::{LlmError, Result};
use crate::types::ChatChunk;

const DONE_MARKER: &str = "[DONE]";

/// Incremental decoder for the server-sent events of a streamed completion.
///
/// Network chunks may split events (and UTF-8 sequences) anywhere, so bytes
/// are buffered until a full line is available. Only `data:` fields carry
/// payload; comments and other fields are skipped, as are chunks without
/// choices (Azure sends content filter results that way).
#[derive(Debug, Default)]
pub struct DeltaDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl DeltaDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the `[DONE]` marker has been seen.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.done
    }

    /// Feed raw bytes and return the content deltas completed by them.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<String>> {
        self.buffer.extend_from_slice(bytes);

        let mut deltas = Vec::new();
        while let Some(end) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=end).collect();
            self.decode_line(&line, &mut deltas)?;
        }
        Ok(deltas)
    }

    /// Decode whatever is left once the body has ended.
    pub fn finish(&mut self) -> Result<Vec<String>> {
        let line = std::mem::take(&mut self.buffer);
        let mut deltas = Vec::new();
        self.decode_line(&line, &mut deltas)?;
        Ok(deltas)
    }

    fn decode_line(&mut self, line: &[u8], deltas: &mut Vec<String>) -> Result<()> {
        if self.done {
            return Ok(());
        }
        let line = std::str::from_utf8(line)
            .map_err(|e| LlmError::InvalidResponse(format!("stream is not UTF-8: {e}")))?
            .trim_end_matches(['\r', '\n']);

        let Some(data) = line.strip_prefix("data:") else {
            return Ok(());
        };
        let data = data.strip_prefix(' ').unwrap_or(data);
        if data == DONE_MARKER {
            self.done = true;
            return Ok(());
        }

        let chunk: ChatChunk = serde_json::from_str(data)
            .map_err(|e| LlmError::InvalidResponse(format!("failed to parse stream chunk: {e}")))?;
        if let Some(content) = chunk.content() {
            deltas.push(content.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const BODY: &str = concat!(
        "data: {\"choices\":[],\"prompt_filter_results\":[]}\n\n",
        ": keep-alive\n\n",
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"},\"finish_reason\":null}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Step 1:\"},\"finish_reason\":null}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Create a class ünd\"},\"finish_reason\":null}]}\r\n\r\n",
        "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    );

    #[test]
    fn decodes_deltas_across_arbitrary_chunk_boundaries() {
        let bytes = BODY.as_bytes();
        for chunk_size in [1, 7, bytes.len()] {
            let mut decoder = DeltaDecoder::new();
            let mut deltas = Vec::new();
            for chunk in bytes.chunks(chunk_size) {
                deltas.extend(decoder.feed(chunk).unwrap());
            }
            deltas.extend(decoder.finish().unwrap());

            assert_eq!(deltas, vec!["Step 1:", "Create a class ünd"], "chunk size {chunk_size}");
            assert!(decoder.is_done());
        }
    }

    #[test]
    fn trailing_event_without_newline_is_flushed() {
        let mut decoder = DeltaDecoder::new();
        let deltas = decoder
            .feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}")
            .unwrap();
        assert!(deltas.is_empty());
        assert_eq!(decoder.finish().unwrap(), vec!["tail"]);
        assert!(!decoder.is_done());
    }

    #[test]
    fn events_after_done_are_ignored() {
        let mut decoder = DeltaDecoder::new();
        let deltas = decoder
            .feed(b"data: [DONE]\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n")
            .unwrap();
        assert!(deltas.is_empty());
    }

    #[test]
    fn malformed_chunk_is_invalid_response() {
        let mut decoder = DeltaDecoder::new();
        let err = decoder.feed(b"data: {not json\n").unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(msg) if msg.contains("stream chunk")));
    }
}
