//! Incremental consumer for streamed chat completions.
//!
//! The server sends a sequence of `data: {...}` frames.  Transport chunk boundaries need
//! not line up with frames; each chunk is assumed to contain at least one complete frame
//! that begins inside it.  A frame that is cut by a chunk boundary fails to parse, is
//! reported as a warning, and is skipped.  An `error` object in a frame ends the
//! stream the same way a bare error body does.

use crate::observability::{STREAM_FRAMES, STREAM_PARSE_ERRORS, STREAM_SERVER_ERRORS};
use crate::render::Renderer;
use crate::transport::ChunkHandler;
use crate::types::{ChatCompletionChunk, ErrorEnvelope};

const FRAME_MARKER: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// What a finished stream looked like.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamOutcome {
    /// A finish reason or `[DONE]` was seen.
    pub finished: bool,
    /// The message of an error envelope the server sent instead of frames.
    pub server_error: Option<String>,
    /// Frames that parsed.
    pub frames: usize,
    /// The renderer asked to stop and the transfer was aborted.
    pub interrupted: bool,
}

/// Chunk handler that renders content fragments as they arrive and accumulates them.
pub struct StreamConsumer<'a> {
    accumulator: &'a mut String,
    renderer: &'a mut dyn Renderer,
    verbose: bool,
    outcome: StreamOutcome,
}

impl<'a> StreamConsumer<'a> {
    /// Creates a consumer that appends content to `accumulator`.
    pub fn new(accumulator: &'a mut String, renderer: &'a mut dyn Renderer, verbose: bool) -> Self {
        Self {
            accumulator,
            renderer,
            verbose,
            outcome: StreamOutcome::default(),
        }
    }

    /// True once the end of the stream has been seen.
    pub fn is_finished(&self) -> bool {
        self.outcome.finished
    }

    /// Consumes the handler and reports what happened.
    pub fn into_outcome(self) -> StreamOutcome {
        self.outcome
    }

    fn warn(&mut self, warning: &str) {
        tracing::warn!("{warning}");
        self.renderer.print_warning(warning);
    }

    fn emit(&mut self, content: &str) {
        self.renderer.print_text(content);
        self.accumulator.push_str(content);
    }

    /// Handles a chunk that is a bare JSON error body.  Returns true if it was one.
    fn server_error(&mut self, text: &str) -> bool {
        let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(text) else {
            return false;
        };
        let Some(message) = envelope.message() else {
            return false;
        };
        self.record_server_error(message.to_string());
        true
    }

    fn record_server_error(&mut self, message: String) {
        STREAM_SERVER_ERRORS.click();
        self.warn(&message);
        self.accumulator.push_str(&message);
        self.outcome.server_error = Some(message);
    }

    fn scan(&mut self, text: &str) {
        let mut pos = 0;
        while let Some(found) = text[pos..].find(FRAME_MARKER) {
            let after_marker = pos + found + FRAME_MARKER.len();
            let rest = &text[after_marker..];
            let value = rest.trim_start();
            let value_start = after_marker + (rest.len() - value.len());

            if value.starts_with(DONE_SENTINEL) {
                self.outcome.finished = true;
                return;
            }

            let mut frames =
                serde_json::Deserializer::from_str(value).into_iter::<ChatCompletionChunk>();
            match frames.next() {
                Some(Ok(frame)) => {
                    STREAM_FRAMES.click();
                    self.outcome.frames += 1;
                    pos = value_start + frames.byte_offset();
                    if let Some(error) = frame.error {
                        let message = error
                            .message
                            .or(error.error_type)
                            .unwrap_or_else(|| "stream reported an error".to_string());
                        self.record_server_error(message);
                        return;
                    }
                    if let Some(content) = frame.content() {
                        self.emit(content);
                    } else if frame.finish_reason().is_some() {
                        self.outcome.finished = true;
                        return;
                    }
                }
                Some(Err(err)) => {
                    STREAM_PARSE_ERRORS.click();
                    self.warn(&format!("skipping unparseable stream frame: {err}"));
                    pos = after_marker;
                }
                None => {
                    pos = after_marker;
                }
            }
        }
    }
}

impl ChunkHandler for StreamConsumer<'_> {
    fn on_chunk(&mut self, chunk: &[u8]) -> usize {
        if self.renderer.should_interrupt() {
            self.outcome.interrupted = true;
            return 0;
        }
        let text = String::from_utf8_lossy(chunk);
        if self.verbose {
            self.renderer.print_raw(&text);
        }
        if self.outcome.finished || self.outcome.server_error.is_some() {
            return chunk.len();
        }
        let trimmed = text.trim_start();
        if trimmed.starts_with('{') && self.server_error(trimmed) {
            return chunk.len();
        }
        self.scan(&text);
        chunk.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{CaptureRenderer, Rendered};
    use crate::transport::deliver_chunk;

    fn feed(chunks: &[&str], verbose: bool) -> (String, CaptureRenderer, StreamOutcome) {
        let mut accumulator = String::new();
        let mut renderer = CaptureRenderer::new();
        let mut consumer = StreamConsumer::new(&mut accumulator, &mut renderer, verbose);
        for chunk in chunks {
            assert_eq!(consumer.on_chunk(chunk.as_bytes()), chunk.len());
        }
        let outcome = consumer.into_outcome();
        (accumulator, renderer, outcome)
    }

    #[test]
    fn content_then_finish_reason() {
        let (acc, renderer, outcome) = feed(
            &[
                "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
                "data: {\"choices\":[{\"finish_reason\":\"stop\"}]}\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
            ],
            false,
        );
        assert_eq!(acc, "Hi");
        assert_eq!(renderer.text(), "Hi");
        assert!(outcome.finished);
        assert_eq!(outcome.frames, 2);
        assert_eq!(outcome.server_error, None);
    }

    #[test]
    fn error_envelope_chunk() {
        let (acc, renderer, outcome) = feed(
            &["{\"error\":{\"message\":\"boom\",\"type\":\"server_error\"}}\n"],
            false,
        );
        assert_eq!(acc, "boom");
        assert_eq!(renderer.text(), "");
        assert_eq!(renderer.warnings(), vec!["boom"]);
        assert_eq!(outcome.server_error.as_deref(), Some("boom"));
        assert_eq!(outcome.frames, 0);
        assert!(!outcome.finished);
    }

    #[test]
    fn error_frame_after_content() {
        let (acc, renderer, outcome) = feed(
            &[
                "data: {\"choices\":[{\"delta\":{\"content\":\"par\"}}]}\n\n",
                concat!(
                    "data: {\"error\":{\"message\":\"overloaded\",\"type\":\"server_error\"}}\n\n",
                    "data: {\"choices\":[{\"delta\":{\"content\":\"after\"}}]}\n\n",
                ),
                "data: {\"choices\":[{\"delta\":{\"content\":\"later\"}}]}\n\n",
            ],
            false,
        );
        assert_eq!(renderer.text(), "par");
        assert_eq!(renderer.warnings(), vec!["overloaded"]);
        assert_eq!(outcome.server_error.as_deref(), Some("overloaded"));
        assert!(acc.starts_with("par"));
        assert!(!acc.contains("after"));
        assert!(!outcome.finished);
    }

    #[test]
    fn error_frame_without_message_uses_type() {
        let (_, renderer, outcome) = feed(
            &["data: {\"error\":{\"type\":\"server_error\"}}\n\n"],
            false,
        );
        assert_eq!(renderer.warnings(), vec!["server_error"]);
        assert_eq!(outcome.server_error.as_deref(), Some("server_error"));
    }

    #[test]
    fn several_frames_in_one_chunk() {
        let chunk = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo \\\"there\\\"\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        );
        let (acc, _, outcome) = feed(&[chunk], false);
        assert_eq!(acc, "Hello \"there\"");
        assert!(outcome.finished);
        assert_eq!(outcome.frames, 4);
    }

    #[test]
    fn done_sentinel_ends_stream() {
        let (acc, _, outcome) = feed(
            &[
                "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\ndata: [DONE]\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n\n",
            ],
            false,
        );
        assert_eq!(acc, "a");
        assert!(outcome.finished);
    }

    #[test]
    fn top_level_finish_reason() {
        let (acc, _, outcome) = feed(
            &[
                "data: {\"choices\":[],\"finish_reason\":\"length\"}\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n\n",
            ],
            false,
        );
        assert_eq!(acc, "");
        assert!(outcome.finished);
    }

    #[test]
    fn broken_frame_is_skipped() {
        let (acc, renderer, outcome) = feed(
            &[concat!(
                "data: {\"choices\":[{\"delta\":{\"cont\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\n",
            )],
            false,
        );
        assert_eq!(acc, "ok");
        assert_eq!(renderer.warnings().len(), 1);
        assert_eq!(outcome.frames, 1);
        assert!(!outcome.finished);
    }

    #[test]
    fn frame_split_across_chunks_loses_only_that_frame() {
        let (acc, renderer, _) = feed(
            &[
                "data: {\"choices\":[{\"delta\":{\"content\":\"one\"}}]}\n\ndata: {\"choi",
                "ces\":[{\"delta\":{\"content\":\"two\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"three\"}}]}\n\n",
            ],
            false,
        );
        assert_eq!(acc, "onethree");
        assert_eq!(renderer.warnings().len(), 1);
    }

    #[test]
    fn verbose_echoes_raw_chunks_even_after_finish() {
        let first = "data: {\"choices\":[{\"finish_reason\":\"stop\"}]}\n\n";
        let second = "data: [DONE]\n\n";
        let (_, renderer, outcome) = feed(&[first, second], true);
        assert!(outcome.finished);
        let raw: Vec<_> = renderer
            .events()
            .iter()
            .filter_map(|event| match event {
                Rendered::Raw(raw) => Some(raw.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(raw, vec![first, second]);
    }

    #[test]
    fn json_chunk_without_error_message_is_scanned() {
        let (acc, renderer, outcome) = feed(&["{\"unrelated\":true}"], false);
        assert_eq!(acc, "");
        assert!(renderer.warnings().is_empty());
        assert_eq!(outcome.server_error, None);
    }

    #[test]
    fn interrupt_aborts_transfer() {
        let mut accumulator = String::new();
        let mut renderer = CaptureRenderer::new();
        renderer.interrupt(true);
        let mut consumer = StreamConsumer::new(&mut accumulator, &mut renderer, false);
        let err = deliver_chunk(&mut consumer, b"data: [DONE]\n\n").unwrap_err();
        assert!(err.is_abort());
        assert!(consumer.into_outcome().interrupted);
    }
}
