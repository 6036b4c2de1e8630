//! SSE (Server-Sent Events) stream decoding shared by both providers.
//!
//! Handles the `data: ` prefix, `[DONE]` termination, line buffering across
//! TCP chunk boundaries, and empty keep-alive lines. [`text_stream`] turns an
//! open HTTP response into a lazy [`TextStream`].

use std::collections::VecDeque;

use futures::StreamExt;
use serde_json::Value;

use super::{BackendError, TextStream};

/// SSE stream decoder.
///
/// Handles the `data: {...}` format with `data: [DONE]` termination.
/// `event:` lines are skipped; both providers repeat the event type inside
/// the JSON payload.
///
/// # Example
///
/// ```
/// use report_pipeline::backend::sse::SseDecoder;
///
/// let mut decoder = SseDecoder::new();
/// let data = b"data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\ndata: [DONE]\n\n";
/// let values = decoder.decode(data);
/// assert_eq!(values.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes into the decoder and return any complete JSON payloads.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<Value> {
        // Bytes stay buffered until a full line arrives, so multi-byte
        // characters split across chunks decode intact.
        self.buffer.extend_from_slice(chunk);

        let mut values = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(val) = self.parse_line(&String::from_utf8_lossy(&line)) {
                values.push(val);
            }
        }

        values
    }

    /// Whether `data: [DONE]` has been seen. Nothing after it is decoded.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Flush any remaining buffer content after the body ends.
    pub fn flush(&mut self) -> Vec<Value> {
        let remaining = std::mem::take(&mut self.buffer);
        String::from_utf8_lossy(&remaining)
            .lines()
            .filter_map(|line| self.parse_line(line))
            .collect()
    }

    fn parse_line(&mut self, line: &str) -> Option<Value> {
        if self.done {
            return None;
        }
        let line = line.trim();
        if line.is_empty() || line.starts_with("event:") {
            return None;
        }

        let data = line
            .strip_prefix("data: ")
            .or_else(|| line.strip_prefix("data:"))?
            .trim();

        if data == "[DONE]" {
            self.done = true;
            return None;
        }

        serde_json::from_str::<Value>(data).ok()
    }
}

/// Pulls one text delta (or an in-band error) out of a decoded SSE event.
/// Returns `None` for events that carry no text.
pub(crate) type DeltaExtractor =
    fn(&Value) -> Option<std::result::Result<String, BackendError>>;

struct StreamState {
    response: reqwest::Response,
    decoder: SseDecoder,
    extract: DeltaExtractor,
    pending: VecDeque<std::result::Result<String, BackendError>>,
    finished: bool,
}

impl StreamState {
    fn push_values(&mut self, values: Vec<Value>) {
        for value in values {
            match (self.extract)(&value) {
                Some(Ok(text)) if text.is_empty() => {}
                Some(item) => self.pending.push_back(item),
                None => {}
            }
        }
    }
}

/// Build a lazy text stream over an open SSE response.
///
/// Chunks are read only when the consumer polls. The stream ends at EOF, at
/// `data: [DONE]`, or after the first error. Dropping the stream drops the
/// response and its connection.
pub(crate) fn text_stream(response: reqwest::Response, extract: DeltaExtractor) -> TextStream {
    let state = StreamState {
        response,
        decoder: SseDecoder::new(),
        extract,
        pending: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                if item.is_err() {
                    st.pending.clear();
                    st.finished = true;
                }
                return Some((item, st));
            }
            if st.finished {
                return None;
            }

            match st.response.chunk().await {
                Ok(Some(chunk)) => {
                    let values = st.decoder.decode(&chunk);
                    st.push_values(values);
                    if st.decoder.is_done() {
                        st.finished = true;
                    }
                }
                Ok(None) => {
                    st.finished = true;
                    let values = st.decoder.flush();
                    st.push_values(values);
                }
                Err(e) => {
                    st.finished = true;
                    return Some((Err(BackendError::Transport(e)), st));
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_basic_decode() {
        let mut decoder = SseDecoder::new();
        let chunk = b"data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n";
        let values = decoder.decode(chunk);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0]["choices"][0]["delta"]["content"], "Hello");
    }

    #[test]
    fn test_sse_done_ignored() {
        let mut decoder = SseDecoder::new();
        let chunk = b"data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n\n";
        assert_eq!(decoder.decode(chunk).len(), 1);
    }

    #[test]
    fn test_sse_event_lines_ignored() {
        let mut decoder = SseDecoder::new();
        let chunk = b"event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi\"}}\n\n";
        let values = decoder.decode(chunk);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0]["delta"]["text"], "Hi");
    }

    #[test]
    fn test_sse_keep_alive_lines_ignored() {
        let mut decoder = SseDecoder::new();
        let values = decoder.decode(b"\n\n\ndata: {\"x\":1}\n\n\n\n");
        assert_eq!(values.len(), 1);
        assert_eq!(values[0]["x"], 1);
    }

    #[test]
    fn test_sse_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.decode(b"data: {\"cho").is_empty());
        let values = decoder.decode(b"ices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n");
        assert_eq!(values.len(), 1);
    }

    #[test]
    fn test_sse_multibyte_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        let event = "data: {\"text\":\"café\"}\n\n".as_bytes();
        let split = event.iter().position(|&b| b == 0xC3).unwrap() + 1;
        assert!(decoder.decode(&event[..split]).is_empty());
        let values = decoder.decode(&event[split..]);
        assert_eq!(values[0]["text"], "café");
    }

    #[test]
    fn test_sse_nothing_after_done() {
        let mut decoder = SseDecoder::new();
        let values = decoder.decode(b"data: {\"a\":1}\n\ndata: [DONE]\n\ndata: {\"b\":2}\n\n");
        assert_eq!(values.len(), 1);
        assert!(decoder.is_done());
        assert!(decoder.decode(b"data: {\"c\":3}\n").is_empty());
    }

    #[test]
    fn test_sse_flush_unterminated_line() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.decode(b"data: {\"a\":1}").is_empty());
        let values = decoder.flush();
        assert_eq!(values.len(), 1);
        assert!(decoder.flush().is_empty());
    }
}
