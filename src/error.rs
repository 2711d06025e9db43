//! Error types for parley.
//!
//! Every fallible operation in the crate returns [`Result`].  Errors are scoped to a
//! single exchange or store operation; the session stays usable after any of them.
//!
//! The variants fall into three groups:
//! - the server answered with a failure (`Api`, `Authentication`, `Permission`,
//!   `NotFound`, `RateLimit`, `BadRequest`, `ServiceUnavailable`);
//! - the exchange broke before an answer arrived (`Timeout`, `Abort`, `Connection`,
//!   `HttpClient`, `Streaming`);
//! - something local failed (`Serialization`, `Io`, `Url`, `Store`, `Configuration`).

use std::error;
use std::fmt;
use std::io;
use std::sync::Arc;

type Source = Arc<dyn error::Error + Send + Sync>;

/// The main error type for parley.
#[derive(Clone, Debug)]
pub enum Error {
    /// A non-success status without a more specific variant, or an error envelope
    /// received in place of stream frames (reported with status 200).
    Api {
        status_code: u16,
        /// The `error.type` string from the body.
        error_type: Option<String>,
        message: String,
    },

    /// The API key was missing or rejected.
    Authentication { message: String },

    /// The key is valid but may not use the resource.
    Permission { message: String },

    /// A model, endpoint or stored chat does not exist.
    NotFound {
        message: String,
        /// What kind of thing was looked up, e.g. `chat`.
        resource_type: Option<String>,
        resource_id: Option<String>,
    },

    /// The server throttled the request.
    RateLimit {
        message: String,
        /// Seconds the server asked us to wait.
        retry_after: Option<u64>,
    },

    /// The server rejected the request body.
    BadRequest {
        message: String,
        /// The request field at fault.
        param: Option<String>,
    },

    /// The request did not complete in time.
    Timeout {
        message: String,
        /// The configured limit in seconds.
        duration: Option<f64>,
    },

    /// The transfer was aborted because a chunk handler did not consume its chunk.
    Abort { message: String },

    /// The server could not be reached.
    Connection {
        message: String,
        source: Option<Source>,
    },

    /// The server or a gateway in front of it is overloaded or down.
    ServiceUnavailable {
        message: String,
        retry_after: Option<u64>,
    },

    /// A JSON or YAML document could not be produced or read.
    Serialization {
        message: String,
        source: Option<Source>,
    },

    /// A local file could not be read or written.
    Io {
        message: String,
        source: Arc<io::Error>,
    },

    /// reqwest failed outside of the cases above.
    HttpClient {
        message: String,
        source: Option<Source>,
    },

    /// The configured base URL is not a URL.
    Url {
        message: String,
        source: Option<url::ParseError>,
    },

    /// The response body broke off while streaming.
    Streaming {
        message: String,
        source: Option<Source>,
    },

    /// The chat store failed.
    Store {
        message: String,
        source: Option<Arc<rusqlite::Error>>,
    },

    /// Missing or invalid configuration.
    Configuration { message: String },
}

impl Error {
    pub fn api(status_code: u16, error_type: Option<String>, message: impl Into<String>) -> Self {
        Error::Api {
            status_code,
            error_type,
            message: message.into(),
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Error::Authentication {
            message: message.into(),
        }
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Error::Permission {
            message: message.into(),
        }
    }

    pub fn not_found(
        message: impl Into<String>,
        resource_type: Option<String>,
        resource_id: Option<String>,
    ) -> Self {
        Error::NotFound {
            message: message.into(),
            resource_type,
            resource_id,
        }
    }

    pub fn rate_limit(message: impl Into<String>, retry_after: Option<u64>) -> Self {
        Error::RateLimit {
            message: message.into(),
            retry_after,
        }
    }

    pub fn bad_request(message: impl Into<String>, param: Option<String>) -> Self {
        Error::BadRequest {
            message: message.into(),
            param,
        }
    }

    pub fn timeout(message: impl Into<String>, duration: Option<f64>) -> Self {
        Error::Timeout {
            message: message.into(),
            duration,
        }
    }

    pub fn abort(message: impl Into<String>) -> Self {
        Error::Abort {
            message: message.into(),
        }
    }

    pub fn connection(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Connection {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    pub fn service_unavailable(message: impl Into<String>, retry_after: Option<u64>) -> Self {
        Error::ServiceUnavailable {
            message: message.into(),
            retry_after,
        }
    }

    pub fn serialization(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Serialization {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            message: message.into(),
            source: Arc::new(source),
        }
    }

    pub fn http_client(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::HttpClient {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    pub fn url(message: impl Into<String>, source: Option<url::ParseError>) -> Self {
        Error::Url {
            message: message.into(),
            source,
        }
    }

    pub fn streaming(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Streaming {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    pub fn store(message: impl Into<String>, source: Option<rusqlite::Error>) -> Self {
        Error::Store {
            message: message.into(),
            source: source.map(Arc::new),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, Error::Authentication { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Error::RateLimit { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// True when the user interrupted a streamed answer.
    pub fn is_abort(&self) -> bool {
        matches!(self, Error::Abort { .. })
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection { .. })
    }

    pub fn is_store(&self) -> bool {
        matches!(self, Error::Store { .. })
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration { .. })
    }

    /// Returns true if the exchange failed before or while talking to the server.
    ///
    /// Transport failures never mutate session state.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            Error::Api { .. }
                | Error::Authentication { .. }
                | Error::Permission { .. }
                | Error::NotFound { .. }
                | Error::RateLimit { .. }
                | Error::BadRequest { .. }
                | Error::Timeout { .. }
                | Error::Abort { .. }
                | Error::Connection { .. }
                | Error::ServiceUnavailable { .. }
                | Error::HttpClient { .. }
                | Error::Streaming { .. }
        )
    }

    /// The HTTP status this error stands for, when there is exactly one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Api { status_code, .. } => Some(*status_code),
            Error::BadRequest { .. } => Some(400),
            Error::Authentication { .. } => Some(401),
            Error::Permission { .. } => Some(403),
            Error::RateLimit { .. } => Some(429),
            _ => None,
        }
    }
}

fn retry_hint(retry_after: &Option<u64>) -> String {
    retry_after
        .map(|secs| format!(" (retry after {secs} seconds)"))
        .unwrap_or_default()
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Api {
                status_code,
                error_type: Some(error_type),
                message,
            } => write!(f, "API error ({status_code}): {error_type}: {message}"),
            Error::Api {
                status_code,
                message,
                ..
            } => write!(f, "API error ({status_code}): {message}"),
            Error::Authentication { message } => write!(f, "Authentication error: {message}"),
            Error::Permission { message } => write!(f, "Permission error: {message}"),
            Error::NotFound {
                message,
                resource_type,
                resource_id,
            } => {
                match resource_type {
                    Some(kind) => write!(f, "{kind} not found: {message}")?,
                    None => write!(f, "Not found: {message}")?,
                }
                match resource_id {
                    Some(id) => write!(f, " [ID: {id}]"),
                    None => Ok(()),
                }
            }
            Error::RateLimit {
                message,
                retry_after,
            } => write!(f, "Rate limit exceeded: {message}{}", retry_hint(retry_after)),
            Error::BadRequest {
                message,
                param: Some(param),
            } => write!(f, "Bad request: {message} (parameter: {param})"),
            Error::BadRequest { message, .. } => write!(f, "Bad request: {message}"),
            Error::Timeout {
                message,
                duration: Some(duration),
            } => write!(f, "Timeout error: {message} ({duration} seconds)"),
            Error::Timeout { message, .. } => write!(f, "Timeout error: {message}"),
            Error::Abort { message } => write!(f, "Request aborted: {message}"),
            Error::Connection { message, .. } => write!(f, "Connection error: {message}"),
            Error::ServiceUnavailable {
                message,
                retry_after,
            } => write!(f, "Service unavailable: {message}{}", retry_hint(retry_after)),
            Error::Serialization { message, .. } => write!(f, "Serialization error: {message}"),
            Error::Io { message, .. } => write!(f, "I/O error: {message}"),
            Error::HttpClient { message, .. } => write!(f, "HTTP client error: {message}"),
            Error::Url { message, .. } => write!(f, "URL error: {message}"),
            Error::Streaming { message, .. } => write!(f, "Streaming error: {message}"),
            Error::Store { message, .. } => write!(f, "Store error: {message}"),
            Error::Configuration { message } => write!(f, "Configuration error: {message}"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Connection { source, .. }
            | Error::Serialization { source, .. }
            | Error::HttpClient { source, .. }
            | Error::Streaming { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn error::Error + 'static)),
            Error::Io { source, .. } => Some(source.as_ref()),
            Error::Url { source, .. } => source.as_ref().map(|e| e as &(dyn error::Error + 'static)),
            Error::Store { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn error::Error + 'static)),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::io(err.to_string(), err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::serialization(format!("JSON error: {err}"), Some(Box::new(err)))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::serialization(format!("YAML error: {err}"), Some(Box::new(err)))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::url(format!("URL parse error: {err}"), Some(err))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::store(err.to_string(), Some(err))
    }
}

/// A specialized Result type for parley operations.
pub type Result<T> = std::result::Result<T, Error>;
