//! Line-oriented frame reassembly for streamed conversational replies.
//!
//! Chunks may split a frame anywhere, including inside a multi-byte
//! character, so input is buffered as bytes and only complete lines are
//! decoded.

use std::mem;

use serde_json::Value;
use tracing::{debug, trace, warn};

pub const DEFAULT_EVENT_PREFIX: &str = "data: ";
pub const DEFAULT_COMMENT_MARKER: &str = ":";
pub const DEFAULT_SENTINEL: &str = "[DONE]";

/// Wire markers recognised by the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameConfig {
    pub event_prefix: String,
    pub comment_marker: String,
    pub sentinel: String,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            event_prefix: DEFAULT_EVENT_PREFIX.to_string(),
            comment_marker: DEFAULT_COMMENT_MARKER.to_string(),
            sentinel: DEFAULT_SENTINEL.to_string(),
        }
    }
}

impl FrameConfig {
    pub fn event_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.event_prefix = prefix.into();
        self
    }

    pub fn comment_marker(mut self, marker: impl Into<String>) -> Self {
        self.comment_marker = marker.into();
        self
    }

    pub fn sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.sentinel = sentinel.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamPayload {
    Data(Value),
    /// Terminal sentinel; nothing follows it.
    Done,
}

/// One decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    /// Undecoded line(s) the payload came from.
    pub raw: String,
    pub payload: StreamPayload,
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self.payload, StreamPayload::Done)
    }

    /// Text carried at `choices[0].delta.content`, if any.
    pub fn fragment(&self) -> Option<&str> {
        match &self.payload {
            StreamPayload::Data(value) => fragment_of(value),
            StreamPayload::Done => None,
        }
    }
}

fn fragment_of(value: &Value) -> Option<&str> {
    value
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
}

enum ReaderState {
    Scanning,
    /// A payload that did not decode yet, waiting for continuation lines.
    Rebuffered {
        payload: String,
        raw: String,
    },
    Finished,
}

/// Pull-based reader: feed chunks with [`push_chunk`](Self::push_chunk), drain
/// events with [`next_event`](Self::next_event), and call
/// [`finish`](Self::finish) once the transport closes.
pub struct StreamFrameReader {
    config: FrameConfig,
    buf: Vec<u8>,
    state: ReaderState,
    text: String,
    dropped: usize,
}

impl Default for StreamFrameReader {
    fn default() -> Self {
        Self::new(FrameConfig::default())
    }
}

impl StreamFrameReader {
    pub fn new(config: FrameConfig) -> Self {
        Self {
            config,
            buf: Vec::new(),
            state: ReaderState::Scanning,
            text: String::new(),
            dropped: 0,
        }
    }

    /// Appends a chunk. Ignored once the sentinel has been seen.
    pub fn push_chunk(&mut self, chunk: &[u8]) {
        if self.is_finished() {
            return;
        }
        self.buf.extend_from_slice(chunk);
    }

    /// Next decoded event from the complete lines buffered so far.
    pub fn next_event(&mut self) -> Option<StreamEvent> {
        while !self.is_finished() {
            let line = self.take_line()?;
            if let Some(event) = self.process_line(line) {
                return Some(event);
            }
        }
        None
    }

    /// Drains the remaining complete lines, then makes one best-effort decode
    /// of whatever is left over. The reader is finished afterwards.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event() {
            events.push(event);
        }

        let tail_bytes = mem::take(&mut self.buf);
        let tail = String::from_utf8_lossy(&tail_bytes);
        let tail = tail.trim_end_matches(['\r', '\n']);
        let (candidate, raw) = match mem::replace(&mut self.state, ReaderState::Finished) {
            ReaderState::Finished => return events,
            ReaderState::Rebuffered { payload, raw } => {
                if tail.starts_with(&self.config.event_prefix) {
                    self.drop_held(&raw);
                    match self.strip_prefix(tail) {
                        Some(rest) => (rest.to_string(), tail.to_string()),
                        None => return events,
                    }
                } else {
                    (format!("{payload}{tail}"), format!("{raw}{tail}"))
                }
            }
            ReaderState::Scanning => match self.strip_prefix(tail) {
                Some(rest) => (rest.to_string(), tail.to_string()),
                None => return events,
            },
        };

        let candidate = candidate.trim();
        if candidate == self.config.sentinel {
            events.push(StreamEvent {
                raw,
                payload: StreamPayload::Done,
            });
        } else if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            if let Some(fragment) = fragment_of(&value) {
                self.text.push_str(fragment);
            }
            events.push(StreamEvent {
                raw,
                payload: StreamPayload::Data(value),
            });
        } else if !candidate.is_empty() {
            debug!(bytes = candidate.len(), "discarding undecodable tail at stream end");
        }
        events
    }

    /// Concatenation of every fragment decoded so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, ReaderState::Finished)
    }

    /// Number of held payloads dropped as malformed.
    pub fn dropped_frames(&self) -> usize {
        self.dropped
    }

    fn take_line(&mut self) -> Option<String> {
        let idx = self.buf.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=idx).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    fn process_line(&mut self, line: String) -> Option<StreamEvent> {
        match mem::replace(&mut self.state, ReaderState::Scanning) {
            ReaderState::Finished => {
                self.state = ReaderState::Finished;
                None
            }
            ReaderState::Rebuffered { payload, raw } => {
                if line.is_empty() || line.starts_with(&self.config.event_prefix) {
                    self.drop_held(&raw);
                    self.scan_line(line)
                } else {
                    let payload = format!("{payload}{}", line.trim());
                    let raw = format!("{raw}\n{line}");
                    self.decode(payload, raw)
                }
            }
            ReaderState::Scanning => self.scan_line(line),
        }
    }

    fn scan_line(&mut self, line: String) -> Option<StreamEvent> {
        if line.is_empty() || line.starts_with(&self.config.comment_marker) {
            return None;
        }
        let Some(rest) = self.strip_prefix(&line) else {
            trace!(line = %line, "ignoring non-data line");
            return None;
        };
        let payload = rest.trim().to_string();
        if payload.is_empty() {
            return None;
        }
        if payload == self.config.sentinel {
            self.state = ReaderState::Finished;
            return Some(StreamEvent {
                raw: line,
                payload: StreamPayload::Done,
            });
        }
        self.decode(payload, line)
    }

    fn decode(&mut self, payload: String, raw: String) -> Option<StreamEvent> {
        match serde_json::from_str::<Value>(&payload) {
            Ok(value) => {
                if let Some(fragment) = fragment_of(&value) {
                    self.text.push_str(fragment);
                }
                Some(StreamEvent {
                    raw,
                    payload: StreamPayload::Data(value),
                })
            }
            Err(_) => {
                trace!(bytes = payload.len(), "payload incomplete, holding for continuation");
                self.state = ReaderState::Rebuffered { payload, raw };
                None
            }
        }
    }

    fn drop_held(&mut self, raw: &str) {
        self.dropped += 1;
        warn!(raw = %raw, "dropping malformed stream frame");
    }

    fn strip_prefix<'a>(&self, line: &'a str) -> Option<&'a str> {
        line.strip_prefix(self.config.event_prefix.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(text: &str) -> String {
        format!(
            "data: {}\n",
            serde_json::json!({"choices":[{"delta":{"content":text}}]})
        )
    }

    fn drain(reader: &mut StreamFrameReader) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = reader.next_event() {
            events.push(event);
        }
        events
    }

    fn read_all(chunks: &[&[u8]]) -> (String, Vec<StreamEvent>) {
        let mut reader = StreamFrameReader::default();
        let mut events = Vec::new();
        for chunk in chunks {
            reader.push_chunk(chunk);
            events.extend(drain(&mut reader));
        }
        events.extend(reader.finish());
        (reader.text().to_string(), events)
    }

    #[test]
    fn payload_split_mid_json_is_reassembled_once() {
        let chunks: [&[u8]; 3] = [
            br#"data: {"choices":[{"delta":{"content":"Hol"#,
            b"a\"}}]}\n",
            b"data: [DONE]\n",
        ];
        let (text, events) = read_all(&chunks);
        assert_eq!(text, "Hola");
        let fragments: Vec<_> = events.iter().filter_map(|e| e.fragment()).collect();
        assert_eq!(fragments, vec!["Hola"]);
        assert!(events.last().is_some_and(StreamEvent::is_terminal));
    }

    #[test]
    fn sentinel_stops_processing_within_the_same_chunk() {
        let chunk = format!("{}data: [DONE]\n{}", delta("uno"), delta("dos"));
        let mut reader = StreamFrameReader::default();
        reader.push_chunk(chunk.as_bytes());
        let events = drain(&mut reader);
        assert_eq!(events.len(), 2);
        assert!(events[1].is_terminal());
        assert!(reader.is_finished());

        reader.push_chunk(delta("tres").as_bytes());
        assert!(reader.next_event().is_none());
        assert!(reader.finish().is_empty());
        assert_eq!(reader.text(), "uno");
    }

    #[test]
    fn reassembly_is_invariant_under_chunking() {
        let transcript = format!(
            ": keep-alive\n{}event: ping\n\n{}{}\r\n{}data: [DONE]\n",
            delta("¡Hola, "),
            delta("señor"),
            delta("! ✓").trim_end(),
            delta(" 日本"),
        );
        let bytes = transcript.as_bytes();
        let (expected, _) = read_all(&[bytes]);
        assert_eq!(expected, "¡Hola, señor! ✓ 日本");

        for split in 0..=bytes.len() {
            let (text, events) = read_all(&[&bytes[..split], &bytes[split..]]);
            assert_eq!(text, expected, "split at {split}");
            assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        }

        let singles: Vec<&[u8]> = bytes.chunks(1).collect();
        assert_eq!(read_all(&singles).0, expected);
        let triples: Vec<&[u8]> = bytes.chunks(3).collect();
        assert_eq!(read_all(&triples).0, expected);
    }

    #[test]
    fn malformed_frame_is_dropped_without_stalling() {
        let after = delta("after");
        let chunks: [&[u8]; 3] = [
            b"data: {\"choices\":[{\"delta\":\n",
            after.as_bytes(),
            b"data: [DONE]\n",
        ];
        let (text, _) = read_all(&chunks);
        assert_eq!(text, "after");

        let mut reader = StreamFrameReader::default();
        reader.push_chunk(b"data: {broken\n\n");
        reader.push_chunk(delta("ok").as_bytes());
        drain(&mut reader);
        assert_eq!(reader.dropped_frames(), 1);
        assert_eq!(reader.text(), "ok");
    }

    #[test]
    fn continuation_line_completes_held_payload() {
        let mut reader = StreamFrameReader::default();
        reader.push_chunk(b"data: {\"choices\":[{\"delta\":\n{\"content\":\"joined\"}}]}\n");
        let events = drain(&mut reader);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].fragment(), Some("joined"));
        assert!(events[0].raw.contains('\n'));
        assert_eq!(reader.dropped_frames(), 0);
    }

    #[test]
    fn finish_flushes_unterminated_tail() {
        let mut reader = StreamFrameReader::default();
        reader.push_chunk(delta("a").as_bytes());
        reader.push_chunk(delta("b").trim_end().as_bytes());
        drain(&mut reader);
        assert_eq!(reader.text(), "a");
        let events = reader.finish();
        assert_eq!(events.len(), 1);
        assert_eq!(reader.text(), "ab");
        assert!(reader.is_finished());
    }

    #[test]
    fn finish_drops_garbage_silently() {
        let mut reader = StreamFrameReader::default();
        reader.push_chunk(delta("kept").as_bytes());
        reader.push_chunk(b"data: {\"choices\":[{\"del");
        drain(&mut reader);
        assert!(reader.finish().is_empty());
        assert_eq!(reader.text(), "kept");
    }

    #[test]
    fn non_fragment_payloads_are_still_events() {
        let mut reader = StreamFrameReader::default();
        reader.push_chunk(b"data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\nid: 7\n");
        let events = drain(&mut reader);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].fragment(), None);
        assert_eq!(reader.text(), "");
    }

    #[test]
    fn custom_markers_are_honoured() {
        let config = FrameConfig::default()
            .event_prefix("chunk=")
            .comment_marker("#")
            .sentinel("END");
        let mut reader = StreamFrameReader::new(config);
        reader.push_chunk(
            b"# note\nchunk={\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\ndata: {}\nchunk=END\n",
        );
        let events = drain(&mut reader);
        assert_eq!(events.len(), 2);
        assert!(events[1].is_terminal());
        assert_eq!(reader.text(), "x");
    }
}
