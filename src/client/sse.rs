/// Incremental `text/event-stream` decoder that yields the `data` payload of
/// each complete event.
///
/// Only the `data` field matters for the notification stream; `event`, `id`
/// and `retry` fields are skipped, as are `:` comment lines (keep-alives).
#[derive(Debug, Default)]
pub struct SseDecoder {
    line: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes; returns every event payload it completes.
    /// Chunks may split lines (or UTF-8 sequences) anywhere.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut events = Vec::new();
        for &byte in chunk {
            if byte != b'\n' {
                self.line.push(byte);
                continue;
            }
            let mut line = std::mem::take(&mut self.line);
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if let Some(payload) = self.process_line(&line) {
                events.push(payload);
            }
        }
        events
    }

    fn process_line(&mut self, line: &[u8]) -> Option<String> {
        if line.is_empty() {
            let payload = std::mem::take(&mut self.data).join("\n");
            return (!payload.is_empty()).then_some(payload);
        }
        if line[0] == b':' {
            return None;
        }

        let line = String::from_utf8_lossy(line);
        let (field, value) = match line.find(':') {
            Some(i) => {
                let value = &line[i + 1..];
                (&line[..i], value.strip_prefix(' ').unwrap_or(value))
            }
            None => (&line[..], ""),
        };
        if field == "data" {
            self.data.push(value.to_string());
        }
        None
    }
}
