//! Server-sent-event line decoding for the completions stream.
//!
//! Each non-blank line must be `data: <payload>`. The payload is either the
//! literal `[DONE]` or a JSON object carrying `choices[0].text` or an `error`.

use serde::Deserialize;

use super::CompletionError;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// One decoded stream line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamLine {
    /// Blank keep-alive / event separator.
    Blank,
    /// A text fragment (may be empty).
    Text(String),
    /// End of stream.
    Done,
}

#[derive(Debug, Deserialize)]
struct Payload {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

/// Decodes one raw line (trailing `\r`/`\n` and surrounding whitespace ignored).
pub fn parse_stream_line(line: &str) -> Result<StreamLine, CompletionError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(StreamLine::Blank);
    }
    let payload = line
        .strip_prefix(DATA_PREFIX)
        .ok_or_else(|| CompletionError::MalformedStreamLine(line.to_string()))?;
    if payload == DONE_SENTINEL {
        return Ok(StreamLine::Done);
    }
    let payload: Payload = serde_json::from_str(payload)?;
    if let Some(err) = payload.error {
        return Err(CompletionError::UpstreamStream(err.message));
    }
    let text = payload
        .choices
        .into_iter()
        .next()
        .map(|c| c.text)
        .unwrap_or_default();
    Ok(StreamLine::Text(text))
}

/// Splits a byte stream into lines. Bytes are buffered until a `\n` arrives so
/// multi-byte characters split across network reads decode correctly.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub(crate) fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Next complete line without its terminator, if one is buffered.
    pub(crate) fn next_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        let rest = self.buf.split_off(pos + 1);
        let mut line = std::mem::replace(&mut self.buf, rest);
        line.pop();
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Whatever is left after the body ended without a final newline.
    pub(crate) fn take_rest(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_chunk() {
        let line = r#"data: {"id":"cmpl-1","choices":[{"text":"Hello","index":0}]}"#;
        assert_eq!(
            parse_stream_line(line).unwrap(),
            StreamLine::Text("Hello".to_string())
        );
    }

    #[test]
    fn done_sentinel_ends_stream() {
        assert_eq!(parse_stream_line("data: [DONE]\r\n").unwrap(), StreamLine::Done);
    }

    #[test]
    fn blank_lines_are_skipped() {
        assert_eq!(parse_stream_line("  \r").unwrap(), StreamLine::Blank);
    }

    #[test]
    fn missing_prefix_is_malformed() {
        let err = parse_stream_line("event: ping").unwrap_err();
        assert!(matches!(err, CompletionError::MalformedStreamLine(ref l) if l == "event: ping"));
        assert_eq!(err.kind(), "MalformedStreamLine");
    }

    #[test]
    fn error_object_is_upstream_stream_error() {
        let err = parse_stream_line(r#"data: {"error":{"message":"overloaded","type":"server"}}"#)
            .unwrap_err();
        assert!(matches!(err, CompletionError::UpstreamStream(ref m) if m == "overloaded"));
    }

    #[test]
    fn invalid_json_is_decode_error() {
        let err = parse_stream_line("data: {not json").unwrap_err();
        assert!(matches!(err, CompletionError::Decode(_)));
    }

    #[test]
    fn empty_choices_yield_empty_text() {
        assert_eq!(
            parse_stream_line(r#"data: {"choices":[]}"#).unwrap(),
            StreamLine::Text(String::new())
        );
    }

    #[test]
    fn line_buffer_joins_split_reads() {
        let mut buf = LineBuffer::default();
        let bytes = "data: é\ndata: [DONE]\n".as_bytes();
        let (a, b) = bytes.split_at(7); // splits the two-byte 'é'
        buf.push(a);
        assert_eq!(buf.next_line(), None);
        buf.push(b);
        assert_eq!(buf.next_line().as_deref(), Some("data: é"));
        assert_eq!(buf.next_line().as_deref(), Some("data: [DONE]"));
        assert_eq!(buf.next_line(), None);
        assert_eq!(buf.take_rest(), None);
    }

    #[test]
    fn line_buffer_returns_unterminated_tail() {
        let mut buf = LineBuffer::default();
        buf.push(b"data: [DONE]");
        assert_eq!(buf.next_line(), None);
        assert_eq!(buf.take_rest().as_deref(), Some("data: [DONE]"));
    }
}
