//! Line framing for streamed HTTP bodies.
//!
//! Both SSE (`data: {...}`) and newline-delimited JSON arrive as arbitrary
//! byte chunks; [`LineBuffer`] reassembles them into complete lines.

/// Accumulates body bytes and yields complete lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes (invalid UTF-8 is replaced).
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
    }

    /// Next complete line without its terminator, if one is buffered.
    pub fn next_line(&mut self) -> Option<String> {
        let line_end = self.buffer.find('\n')?;
        let line = self.buffer[..line_end].trim_end_matches('\r').to_string();
        self.buffer.drain(..=line_end);
        Some(line)
    }

    /// Whatever is left once the body has ended.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let rest = rest.trim();
        if rest.is_empty() {
            None
        } else {
            Some(rest.to_string())
        }
    }
}

/// The JSON payload of one stream line, if it carries one.
///
/// Blank lines, SSE comments and non-data SSE fields yield `None`.
/// Lines without a `data:` prefix are treated as bare NDJSON.
pub fn payload(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    if let Some(data) = line.strip_prefix("data:") {
        let data = data.trim();
        return if data.is_empty() { None } else { Some(data) };
    }
    if line.starts_with("event:") || line.starts_with("id:") || line.starts_with("retry:") {
        return None;
    }
    Some(line)
}
