//! Incremental decoder for `text/event-stream` bodies.

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// `None` for unnamed events.
    pub event: Option<String>,
    pub data: String,
}

/// Feed it body chunks as they arrive; it hands back every event completed so far.
/// Chunks may split lines (or UTF-8 sequences) anywhere.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            let line = self.buffer[start..end]
                .strip_suffix(b"\r")
                .unwrap_or(&self.buffer[start..end]);
            let line = String::from_utf8_lossy(line).into_owned();
            start = end + 1;

            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        self.buffer.drain(..start);

        events
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            let event = self.event.take();
            if self.data.is_empty() {
                // An event with no data is not dispatched.
                return None;
            }
            let data = std::mem::take(&mut self.data).join("\n");
            return Some(SseEvent { event, data });
        }

        // Comments, used for keep-alives.
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            // `id` and `retry` don't matter to us.
            _ => {}
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_named_events() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"event: dataset\ndata: {\"projects\":{}}\n\n");
        assert_eq!(
            events,
            vec![SseEvent {
                event: Some("dataset".into()),
                data: "{\"projects\":{}}".into()
            }]
        );
    }

    #[test]
    fn handles_chunks_split_anywhere() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"event: data").is_empty());
        assert!(decoder.feed(b"set\r\ndata: {\"a\":").is_empty());
        let events = decoder.feed(b"1}\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("dataset"));
        assert_eq!(events[0].data, "{\"a\":1}");
    }

    #[test]
    fn joins_multi_line_data() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data: first\ndata: second\n\n");
        assert_eq!(events[0].data, "first\nsecond");
        assert_eq!(events[0].event, None);
    }

    #[test]
    fn ignores_keep_alive_comments() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b":ping\n\n: ping\n\n").is_empty());
        let events = decoder.feed(b"event: dataset\ndata: {}\n\n:ping\n\n");
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn event_name_does_not_leak_into_the_next_event() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"event: dataset\ndata: 1\n\ndata: 2\n\n");
        assert_eq!(events[1].event, None);
    }
}
