//! The contract between a session and the HTTP layer.
//!
//! A [`Transport`] performs the three kinds of exchange a session needs.  The production
//! implementation is [`crate::OpenAi`]; tests substitute scripted transports.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Error, Result};

/// A fully-read HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Value of the `Content-Type` header, if any.
    pub content_type: Option<String>,
    /// Response body.
    pub body: Bytes,
}

impl HttpResponse {
    /// Creates a JSON response.
    pub fn json(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type: Some("application/json".to_string()),
            body: body.into(),
        }
    }

    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// True when the content type is `application/json`, ignoring parameters and case.
    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
    }
}

/// Receives a streamed response body one chunk at a time.
pub trait ChunkHandler {
    /// Processes one chunk and returns how many bytes were consumed.
    ///
    /// Returning fewer than `chunk.len()` aborts the transfer.
    fn on_chunk(&mut self, chunk: &[u8]) -> usize;
}

impl<F> ChunkHandler for F
where
    F: FnMut(&[u8]) -> usize,
{
    fn on_chunk(&mut self, chunk: &[u8]) -> usize {
        self(chunk)
    }
}

/// Hands `chunk` to `handler`, failing with [`Error::Abort`] on short consumption.
pub fn deliver_chunk(handler: &mut dyn ChunkHandler, chunk: &[u8]) -> Result<()> {
    let consumed = handler.on_chunk(chunk);
    if consumed < chunk.len() {
        return Err(Error::abort(format!(
            "chunk handler consumed {consumed} of {} bytes",
            chunk.len()
        )));
    }
    Ok(())
}

/// HTTP operations a session performs against the API.
///
/// Paths are relative to the transport's base URL, e.g. `chat/completions`.
#[async_trait(?Send)]
pub trait Transport {
    /// Performs a GET and reads the whole body.
    async fn get(&self, path: &str) -> Result<HttpResponse>;

    /// POSTs a JSON body and reads the whole response.
    async fn post(&self, path: &str, body: String) -> Result<HttpResponse>;

    /// POSTs a JSON body and feeds the response body to `handler` as it arrives.
    ///
    /// Non-2xx statuses are returned as errors before the handler sees any bytes.
    async fn stream_post(
        &self,
        path: &str,
        body: String,
        handler: &mut dyn ChunkHandler,
    ) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use super::*;

    /// A request observed by [`ScriptedTransport`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) struct Recorded {
        pub method: &'static str,
        pub path: String,
        pub body: Option<String>,
    }

    /// What the scripted transport does for the next request.
    pub(crate) enum Scripted {
        Response(HttpResponse),
        Chunks(Vec<&'static str>),
        Fail(Error),
    }

    /// Replays canned responses in order and records every request.
    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        script: RefCell<VecDeque<Scripted>>,
        requests: RefCell<Vec<Recorded>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn then(self, step: Scripted) -> Self {
            self.script.borrow_mut().push_back(step);
            self
        }

        pub(crate) fn push(&self, step: Scripted) {
            self.script.borrow_mut().push_back(step);
        }

        pub(crate) fn requests(&self) -> Vec<Recorded> {
            self.requests.borrow().clone()
        }

        fn next(&self, method: &'static str, path: &str, body: Option<String>) -> Scripted {
            self.requests.borrow_mut().push(Recorded {
                method,
                path: path.to_string(),
                body,
            });
            self.script
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Scripted::Fail(Error::connection("script exhausted", None)))
        }
    }

    #[async_trait(?Send)]
    impl Transport for ScriptedTransport {
        async fn get(&self, path: &str) -> Result<HttpResponse> {
            match self.next("GET", path, None) {
                Scripted::Response(response) => Ok(response),
                Scripted::Chunks(_) => panic!("GET scripted with chunks"),
                Scripted::Fail(err) => Err(err),
            }
        }

        async fn post(&self, path: &str, body: String) -> Result<HttpResponse> {
            match self.next("POST", path, Some(body)) {
                Scripted::Response(response) => Ok(response),
                Scripted::Chunks(_) => panic!("POST scripted with chunks"),
                Scripted::Fail(err) => Err(err),
            }
        }

        async fn stream_post(
            &self,
            path: &str,
            body: String,
            handler: &mut dyn ChunkHandler,
        ) -> Result<()> {
            match self.next("STREAM", path, Some(body)) {
                Scripted::Chunks(chunks) => {
                    for chunk in chunks {
                        deliver_chunk(handler, chunk.as_bytes())?;
                    }
                    Ok(())
                }
                Scripted::Response(response) if response.is_success() => {
                    deliver_chunk(handler, &response.body)
                }
                Scripted::Response(response) => Err(Error::api(
                    response.status,
                    None,
                    String::from_utf8_lossy(&response.body).into_owned(),
                )),
                Scripted::Fail(err) => Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_content_type_ignores_parameters() {
        let mut response = HttpResponse::json(200, "{}");
        assert!(response.is_json());
        response.content_type = Some("Application/JSON; charset=utf-8".to_string());
        assert!(response.is_json());
        response.content_type = Some("text/html".to_string());
        assert!(!response.is_json());
        response.content_type = None;
        assert!(!response.is_json());
    }

    #[test]
    fn success_range() {
        assert!(HttpResponse::json(200, "").is_success());
        assert!(HttpResponse::json(204, "").is_success());
        assert!(!HttpResponse::json(301, "").is_success());
        assert!(!HttpResponse::json(500, "").is_success());
    }

    #[test]
    fn short_consumption_aborts() {
        let mut seen = Vec::new();
        let mut handler = |chunk: &[u8]| {
            seen.push(chunk.len());
            chunk.len() / 2
        };
        let err = deliver_chunk(&mut handler, b"abcd").unwrap_err();
        assert!(err.is_abort());
        assert_eq!(seen, vec![4]);
    }

    #[test]
    fn full_consumption_succeeds() {
        let mut handler = |chunk: &[u8]| chunk.len();
        assert!(deliver_chunk(&mut handler, b"data: {}").is_ok());
        assert!(deliver_chunk(&mut handler, b"").is_ok());
    }
}
