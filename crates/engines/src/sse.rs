//! SSE plumbing for the completions endpoints.
//!
//! The OpenAI-compatible servers stream completions as `data:` lines
//! separated by blank lines, terminated by a `data: [DONE]` sentinel. This
//! module drains complete payloads from a growing byte buffer and turns a
//! `reqwest::Response` into a [`TokenChunk`] stream that honors a shared
//! cancel token.

use bn_domain::cancel::CancelToken;
use bn_domain::stream::{BoxStream, TokenChunk};
use bn_domain::{Error, Result};

/// Extract complete `data:` payloads from an SSE buffer.
///
/// Events are delimited by `\n\n`; only `data:` lines matter here. The
/// buffer is drained in place, leaving any trailing partial event for the
/// next call.
pub(crate) fn drain_data_lines(buffer: &mut String) -> Vec<String> {
    let mut data_lines = Vec::new();

    while let Some(pos) = buffer.find("\n\n") {
        let block: String = buffer.drain(..pos).collect();
        buffer.drain(..2);

        for line in block.lines() {
            let line = line.trim();
            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim();
                if !data.is_empty() {
                    data_lines.push(data.to_string());
                }
            }
        }
    }

    data_lines
}

/// Build a [`TokenChunk`] stream from an SSE response.
///
/// `parse_data` maps one `data:` payload to a text delta (`None` for
/// payloads that carry no text). The stream:
/// 1. stops silently as soon as `cancel` is set, discarding the rest
/// 2. emits a final `done` chunk exactly once (on `[DONE]` or body close)
/// 3. maps transport failures to the shared error type
pub(crate) fn token_stream<F>(
    response: reqwest::Response,
    cancel: CancelToken,
    mut parse_data: F,
) -> BoxStream<'static, Result<TokenChunk>>
where
    F: FnMut(&str) -> Option<String> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut response = response;
        let mut buffer = String::new();

        'read: loop {
            if cancel.is_cancelled() {
                break;
            }
            match response.chunk().await {
                Ok(Some(bytes)) => {
                    buffer.push_str(&String::from_utf8_lossy(&bytes));
                    for data in drain_data_lines(&mut buffer) {
                        if cancel.is_cancelled() {
                            break 'read;
                        }
                        if data == "[DONE]" {
                            break 'read;
                        }
                        if let Some(text) = parse_data(&data) {
                            if !text.is_empty() {
                                yield Ok(TokenChunk::text(text));
                            }
                        }
                    }
                }
                Ok(None) => {
                    // Body closed without the sentinel; flush the remainder.
                    if !buffer.trim().is_empty() {
                        buffer.push_str("\n\n");
                        for data in drain_data_lines(&mut buffer) {
                            if data == "[DONE]" {
                                continue;
                            }
                            if let Some(text) = parse_data(&data) {
                                if !text.is_empty() {
                                    yield Ok(TokenChunk::text(text));
                                }
                            }
                        }
                    }
                    break;
                }
                Err(e) => {
                    yield Err(from_reqwest(e));
                    break;
                }
            }
        }

        yield Ok(TokenChunk::done());
    };

    Box::pin(stream)
}

/// Map a reqwest failure onto the shared error taxonomy.
pub(crate) fn from_reqwest(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout(err.to_string())
    } else if err.is_connect() {
        Error::Connection(err.to_string())
    } else {
        Error::Http(err.to_string())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_single_complete_event() {
        let mut buf = String::from("event: message\ndata: {\"text\":\"hi\"}\n\n");
        let lines = drain_data_lines(&mut buf);
        assert_eq!(lines, vec!["{\"text\":\"hi\"}"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn drain_multiple_events() {
        let mut buf = String::from("data: first\n\ndata: second\n\n");
        assert_eq!(drain_data_lines(&mut buf), vec!["first", "second"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn drain_partial_event_stays_buffered() {
        let mut buf = String::from("data: complete\n\ndata: partial");
        assert_eq!(drain_data_lines(&mut buf), vec!["complete"]);
        assert_eq!(buf, "data: partial");
    }

    #[test]
    fn drain_empty_buffer() {
        let mut buf = String::new();
        assert!(drain_data_lines(&mut buf).is_empty());
    }

    #[test]
    fn drain_skips_blank_data_and_other_fields() {
        let mut buf = String::from("event: ping\nid: 42\ndata: \n\ndata: payload\n\n");
        assert_eq!(drain_data_lines(&mut buf), vec!["payload"]);
    }

    #[test]
    fn drain_done_sentinel_preserved() {
        let mut buf = String::from("data: [DONE]\n\n");
        assert_eq!(drain_data_lines(&mut buf), vec!["[DONE]"]);
    }

    #[test]
    fn drain_incremental_buffering() {
        let mut buf = String::from("data: chunk1");
        assert!(drain_data_lines(&mut buf).is_empty());
        buf.push_str("\n\ndata: chunk2\n\n");
        assert_eq!(drain_data_lines(&mut buf), vec!["chunk1", "chunk2"]);
    }
}
