use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, RequestBuilder, Response, header};

use crate::config::Credentials;
use crate::error::{Error, Result};
use crate::observability::{
    CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS, STREAM_BYTES, STREAM_CHUNKS,
    STREAM_DURATION,
};
use crate::transport::{ChunkHandler, HttpResponse, Transport, deliver_chunk};
use crate::types::ErrorEnvelope;

/// Base URL used when none is configured.
pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for an OpenAI-style chat API.
#[derive(Debug, Clone)]
pub struct OpenAi {
    credentials: Credentials,
    client: ReqwestClient,
    base_url: String,
    timeout: Option<Duration>,
}

impl OpenAi {
    /// Create a new client against the default base URL.
    pub fn new(credentials: Credentials) -> Result<Self> {
        Self::with_options(credentials, None, None)
    }

    /// Create a new client with custom settings.
    ///
    /// Only connecting is bounded by default.  A `timeout` caps the whole request,
    /// including the time spent reading a streamed body.
    pub fn with_options(
        credentials: Credentials,
        base_url: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        if credentials.api_key.trim().is_empty() {
            return Err(Error::authentication("API key is empty"));
        }
        let mut builder = ReqwestClient::builder().connect_timeout(CONNECT_TIMEOUT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            Error::http_client(
                format!("Failed to build HTTP client: {}", e),
                Some(Box::new(e)),
            )
        })?;

        let mut base_url = base_url.unwrap_or_else(|| DEFAULT_API_URL.to_string());
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        url::Url::parse(&base_url)
            .map_err(|e| Error::url(format!("invalid base URL {base_url}"), Some(e)))?;

        Ok(Self {
            credentials,
            client,
            base_url,
            timeout,
        })
    }

    /// The base URL requests are resolved against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create and return default headers for API requests.
    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.credentials.api_key))
            .map_err(|_| Error::authentication("API key contains invalid header characters"))?;
        headers.insert(header::AUTHORIZATION, bearer);
        if let Some(organization) = &self.credentials.organization {
            let organization = HeaderValue::from_str(organization).map_err(|_| {
                Error::configuration("organization contains invalid header characters")
            })?;
            headers.insert("OpenAI-Organization", organization);
        }
        Ok(headers)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }

    fn map_request_error(&self, e: reqwest::Error) -> Error {
        CLIENT_REQUEST_ERRORS.click();
        if e.is_timeout() {
            Error::timeout(
                format!("Request timed out: {}", e),
                self.timeout.map(|timeout| timeout.as_secs_f64()),
            )
        } else if e.is_connect() {
            Error::connection(format!("Connection error: {}", e), Some(Box::new(e)))
        } else {
            Error::http_client(format!("Request failed: {}", e), Some(Box::new(e)))
        }
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response> {
        CLIENT_REQUESTS.click();
        let start = Instant::now();
        let response = request.send().await.map_err(|e| self.map_request_error(e));
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());
        response
    }

    async fn read_whole(&self, response: Response) -> Result<HttpResponse> {
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|val| val.to_str().ok())
            .map(String::from);
        let body = response.bytes().await.map_err(|e| self.map_request_error(e))?;
        tracing::debug!(status, bytes = body.len(), "response read");
        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        CLIENT_REQUEST_ERRORS.click();
        let status_code = response.status().as_u16();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        match response.text().await {
            Ok(body) => error_from_status(status_code, &body, retry_after),
            Err(e) => Error::http_client(
                format!("Failed to read error response: {}", e),
                Some(Box::new(e)),
            ),
        }
    }
}

/// Maps a non-2xx status and its body onto the error taxonomy.
///
/// The body's `error.message` is used when it parses; otherwise the raw body is.
pub(crate) fn error_from_status(status_code: u16, body: &str, retry_after: Option<u64>) -> Error {
    let parsed = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let error_type = parsed
        .as_ref()
        .and_then(|e| e.error_type())
        .map(String::from);
    let error_message = parsed
        .as_ref()
        .and_then(|e| e.message())
        .map(String::from)
        .unwrap_or_else(|| body.to_string());
    let error_param = parsed
        .as_ref()
        .and_then(|e| e.error.as_ref())
        .and_then(|e| e.param.clone());

    match status_code {
        400 => Error::bad_request(error_message, error_param),
        401 => Error::authentication(error_message),
        403 => Error::permission(error_message),
        404 => Error::not_found(error_message, None, None),
        408 => Error::timeout(error_message, None),
        429 => Error::rate_limit(error_message, retry_after),
        502..=504 => Error::service_unavailable(error_message, retry_after),
        _ => Error::api(status_code, error_type, error_message),
    }
}

#[async_trait(?Send)]
impl Transport for OpenAi {
    async fn get(&self, path: &str) -> Result<HttpResponse> {
        let url = self.url(path);
        tracing::debug!(%url, "GET");
        let request = self.client.get(&url).headers(self.default_headers()?);
        let response = self.execute(request).await?;
        self.read_whole(response).await
    }

    async fn post(&self, path: &str, body: String) -> Result<HttpResponse> {
        let url = self.url(path);
        tracing::debug!(%url, bytes = body.len(), "POST");
        let request = self
            .client
            .post(&url)
            .headers(self.default_headers()?)
            .body(body);
        let response = self.execute(request).await?;
        self.read_whole(response).await
    }

    async fn stream_post(
        &self,
        path: &str,
        body: String,
        handler: &mut dyn ChunkHandler,
    ) -> Result<()> {
        let url = self.url(path);
        tracing::debug!(%url, bytes = body.len(), "POST (streaming)");

        let mut headers = self.default_headers()?;
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );
        let request = self.client.post(&url).headers(headers).body(body);
        let start = Instant::now();
        let response = self.execute(request).await?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                Error::streaming(format!("Failed to read stream: {}", e), Some(Box::new(e)))
            })?;
            STREAM_CHUNKS.click();
            STREAM_BYTES.count(chunk.len() as u64);
            deliver_chunk(handler, &chunk)?;
        }
        STREAM_DURATION.add(start.elapsed().as_secs_f64());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = OpenAi::new(Credentials::new("test-key")).unwrap();
        assert_eq!(client.base_url(), DEFAULT_API_URL);
        assert_eq!(client.timeout, None);

        let client = OpenAi::with_options(
            Credentials::new("test-key"),
            Some("http://localhost:8080/v1".to_string()),
            Some(Duration::from_secs(5)),
        )
        .unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080/v1/");
        assert_eq!(client.timeout, Some(Duration::from_secs(5)));
        assert_eq!(client.url("/chat/completions"), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn empty_key_is_rejected() {
        let err = OpenAi::new(Credentials::new("  ")).unwrap_err();
        assert!(err.is_authentication());
    }

    #[test]
    fn headers_carry_bearer_and_organization() {
        let client =
            OpenAi::new(Credentials::new("sk-123").with_organization("org-abc")).unwrap();
        let headers = client.default_headers().unwrap();
        assert_eq!(headers[header::AUTHORIZATION], "Bearer sk-123");
        assert_eq!(headers["OpenAI-Organization"], "org-abc");
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    }

    #[test]
    fn status_mapping_uses_error_message() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        let err = error_from_status(401, body, None);
        assert!(err.is_authentication());
        assert!(err.to_string().contains("Incorrect API key provided"));

        let err = error_from_status(429, "slow down", Some(3));
        assert!(err.is_rate_limit());

        let err = error_from_status(500, body, None);
        assert_eq!(err.status_code(), Some(500));
        assert!(err.is_transport_failure());
    }
}
