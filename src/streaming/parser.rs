//! # SSE Event Parser
//!
//! Incremental parser turning backend bytes into discrete `RawEvent`s,
//! honoring text/event-stream framing: `event:` names, `data:` lines joined
//! with newlines, blank-line dispatch, comment and `id:`/`retry:` lines
//! ignored. Line buffering works at the byte level so multi-byte UTF-8
//! sequences split across network chunks are never corrupted.
//!
//! The parser interprets framing only; payload semantics belong to the
//! normalizer. One parser instance serves exactly one request.

use tracing::trace;

/// One parsed unit from the backend stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub event: String,
    pub data: String,
}

/// Parsed classification of a single SSE line.
#[derive(Debug, PartialEq, Eq)]
enum SseLine {
    Event(String),
    Data(String),
    Id(String),
    Retry(String),
    Comment,
    Empty,
}

/// Parse a single line according to the text/event-stream format.
fn parse_sse_line(line: &str) -> SseLine {
    if line.is_empty() {
        SseLine::Empty
    } else if line.starts_with(':') {
        SseLine::Comment
    } else {
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        // A single leading space after the colon is framing, not payload.
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => SseLine::Event(value.to_string()),
            "data" => SseLine::Data(value.to_string()),
            "id" => SseLine::Id(value.to_string()),
            "retry" => SseLine::Retry(value.to_string()),
            _ => SseLine::Comment,
        }
    }
}

/// Incremental SSE frame decoder. Feed raw network chunks in arrival order;
/// complete events come out as they are terminated by blank lines.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    event_name: Option<String>,
    data_lines: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one network chunk and return every event completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<RawEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            let line = String::from_utf8_lossy(&line_bytes);
            let trimmed = line.trim_end_matches(['\n', '\r']);
            trace!(line = trimmed, "processing SSE line");

            match parse_sse_line(trimmed) {
                SseLine::Empty => {
                    if let Some(event) = self.dispatch() {
                        events.push(event);
                    }
                }
                SseLine::Event(name) => self.event_name = Some(name),
                SseLine::Data(data) => self.data_lines.push(data),
                SseLine::Id(_) | SseLine::Retry(_) | SseLine::Comment => {}
            }
        }
        events
    }

    /// Flush residual state at end of stream: a final partial line without
    /// its terminator, plus any event never closed by a blank line.
    pub fn finish(&mut self) -> Option<RawEvent> {
        if !self.buffer.is_empty() {
            let residual: Vec<u8> = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&residual);
            let trimmed = line.trim_end_matches('\r');
            trace!(line = trimmed, "processing residual SSE line");
            match parse_sse_line(trimmed) {
                SseLine::Event(name) => self.event_name = Some(name),
                SseLine::Data(data) => self.data_lines.push(data),
                _ => {}
            }
        }
        self.dispatch()
    }

    /// Dispatch the buffered event, if any. Events with neither a name nor
    /// data (comment-only blocks, keep-alive blank lines) produce nothing.
    fn dispatch(&mut self) -> Option<RawEvent> {
        if self.data_lines.is_empty() && self.event_name.is_none() {
            return None;
        }
        let data = std::mem::take(&mut self.data_lines).join("\n");
        let event = self
            .event_name
            .take()
            .unwrap_or_else(|| "message".to_string());
        Some(RawEvent { event, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sse_line_empty() {
        assert_eq!(parse_sse_line(""), SseLine::Empty);
    }

    #[test]
    fn test_parse_sse_line_comment() {
        assert_eq!(parse_sse_line(": keep-alive"), SseLine::Comment);
        assert_eq!(parse_sse_line(":"), SseLine::Comment);
    }

    #[test]
    fn test_parse_sse_line_fields() {
        assert_eq!(parse_sse_line("event: content"), SseLine::Event("content".to_string()));
        assert_eq!(parse_sse_line("event:done"), SseLine::Event("done".to_string()));
        assert_eq!(parse_sse_line("data: hello"), SseLine::Data("hello".to_string()));
        assert_eq!(parse_sse_line("data:"), SseLine::Data("".to_string()));
        assert_eq!(parse_sse_line("id: 42"), SseLine::Id("42".to_string()));
        assert_eq!(parse_sse_line("retry: 5000"), SseLine::Retry("5000".to_string()));
    }

    #[test]
    fn test_parse_sse_line_strips_single_leading_space() {
        assert_eq!(
            parse_sse_line("data:  two spaces"),
            SseLine::Data(" two spaces".to_string())
        );
    }

    #[test]
    fn test_parse_sse_line_unknown_field_is_comment() {
        assert_eq!(parse_sse_line("unknown: value"), SseLine::Comment);
        assert_eq!(parse_sse_line("no colon here"), SseLine::Comment);
    }

    #[test]
    fn test_single_event() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"event: content\ndata: hello\n\n");
        assert_eq!(
            events,
            vec![RawEvent {
                event: "content".to_string(),
                data: "hello".to_string()
            }]
        );
    }

    #[test]
    fn test_default_event_name_is_message() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: implicit\n\n");
        assert_eq!(events[0].event, "message");
        assert_eq!(events[0].data, "implicit");
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"event: con").is_empty());
        assert!(parser.feed(b"tent\ndata: hel").is_empty());
        let events = parser.feed(b"lo\n\n");
        assert_eq!(events[0].event, "content");
        assert_eq!(events[0].data, "hello");
    }

    #[test]
    fn test_multibyte_utf8_split_across_chunks() {
        let mut parser = SseParser::new();
        let full = "data: héllo\n\n".as_bytes();
        // Split in the middle of the two-byte 'é'
        let split = full.iter().position(|&b| b == 0xc3).unwrap() + 1;
        assert!(parser.feed(&full[..split]).is_empty());
        let events = parser.feed(&full[split..]);
        assert_eq!(events[0].data, "héllo");
    }

    #[test]
    fn test_multiple_data_lines_joined() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: line one\ndata: line two\n\n");
        assert_eq!(events[0].data, "line one\nline two");
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"event: content\r\ndata: hi\r\n\r\n");
        assert_eq!(events[0].event, "content");
        assert_eq!(events[0].data, "hi");
    }

    #[test]
    fn test_comment_and_retry_ignored() {
        let mut parser = SseParser::new();
        let events = parser.feed(b": ping\n\nretry: 100\n\ndata: real\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "real");
    }

    #[test]
    fn test_named_event_without_data_still_dispatches() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"event: close\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "close");
        assert_eq!(events[0].data, "");
    }

    #[test]
    fn test_finish_flushes_unterminated_event() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"event: content\ndata: trailing").is_empty());
        let event = parser.finish().unwrap();
        assert_eq!(event.event, "content");
        assert_eq!(event.data, "trailing");
    }

    #[test]
    fn test_finish_with_nothing_pending() {
        let mut parser = SseParser::new();
        parser.feed(b"data: done\n\n");
        assert!(parser.finish().is_none());
    }

    #[test]
    fn test_two_events_in_one_chunk() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: a\n\nevent: r\ndata: b\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "a");
        assert_eq!(events[1].event, "r");
        assert_eq!(events[1].data, "b");
    }
}
