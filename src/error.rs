//! Error types.
//!
//! Two families live here:
//!
//! - [`RequestError`] is the value delivered to a request's handler. It is part
//!   of the response envelope, never raised across a thread boundary.
//! - [`DispatchError`] is returned by client operations that fail before a
//!   request is accepted (building the client, submitting after shutdown).

use crate::response::ResponseMeta;
use serde::de::DeserializeOwned;
use std::fmt;

/// Classification of a delivered error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorDetail {
    /// Transport failed or returned nothing
    Connection,
    /// Body could not be read or deserialized
    Parse,
    /// The request was cancelled before delivery
    Cancelled,
    /// Server answered with status >= 400
    Server,
}

impl ErrorDetail {
    /// Stable string form of the detail.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorDetail::Connection => "connectionError",
            ErrorDetail::Parse => "parseError",
            ErrorDetail::Cancelled => "requestCancelledError",
            ErrorDetail::Server => "responseFromServerError",
        }
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error delivered to a request's handler.
///
/// `code` is the HTTP status for server errors and `0` otherwise; the
/// [`ErrorDetail`] tells connection, parse and cancellation failures apart.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}", self.render())]
pub struct RequestError {
    code: u16,
    detail: Option<ErrorDetail>,
    body: Option<String>,
    message: Option<String>,
    meta: Option<ResponseMeta>,
}

impl RequestError {
    fn with_detail(detail: ErrorDetail, message: Option<String>) -> Self {
        RequestError {
            code: 0,
            detail: Some(detail),
            body: None,
            message,
            meta: None,
        }
    }

    /// Transport-level failure.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorDetail::Connection, Some(message.into()))
    }

    /// Body read or deserialize failure.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorDetail::Parse, Some(message.into()))
    }

    /// Cancellation marker: code 0, detail [`ErrorDetail::Cancelled`].
    pub fn cancelled() -> Self {
        Self::with_detail(ErrorDetail::Cancelled, None)
    }

    /// Server answered with an error status.
    pub fn server(status: u16, body: Option<String>, meta: ResponseMeta) -> Self {
        RequestError {
            code: status,
            detail: Some(ErrorDetail::Server),
            body,
            message: None,
            meta: Some(meta),
        }
    }

    /// Rewrite this error into the cancellation marker.
    ///
    /// The body and response metadata are kept; the code is forced to 0 so a
    /// cancelled request never reports a server status.
    pub fn mark_cancelled(&mut self) {
        self.code = 0;
        self.detail = Some(ErrorDetail::Cancelled);
    }

    /// Attach response metadata.
    pub fn with_meta(mut self, meta: ResponseMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    /// HTTP status for server errors, 0 otherwise.
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Error classification.
    pub fn detail(&self) -> Option<ErrorDetail> {
        self.detail
    }

    /// Raw error body read from a failed response.
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// Underlying failure description, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Metadata of the response that produced this error.
    pub fn meta(&self) -> Option<&ResponseMeta> {
        self.meta.as_ref()
    }

    /// Whether this is the cancellation marker.
    pub fn is_cancelled(&self) -> bool {
        self.code == 0 && self.detail == Some(ErrorDetail::Cancelled)
    }

    fn render(&self) -> String {
        let detail = self.detail.map(|d| d.as_str()).unwrap_or("unknownError");
        match (&self.message, self.code) {
            (Some(message), 0) => format!("{}: {}", detail, message),
            (Some(message), code) => format!("{} ({}): {}", detail, code, message),
            (None, 0) => detail.to_string(),
            (None, code) => format!("{} ({})", detail, code),
        }
    }

    /// Deserialize the raw error body into a caller type.
    ///
    /// Returns `None` when there is no body or it does not match `T`.
    pub fn body_as<T: DeserializeOwned>(&self) -> Option<T> {
        let body = self.body.as_deref()?;
        match serde_json::from_str(body) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!("error body did not match target type: {}", e);
                None
            }
        }
    }
}


/// Failures of client operations outside a request's delivery path.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The client was shut down; no new submissions are accepted
    #[error("Dispatcher is shut down")]
    ShutDown,

    /// A worker pool could not be started
    #[error("Failed to start worker pool '{pool}': {source}")]
    PoolStart {
        /// Pool name
        pool: &'static str,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// Configuration could not be parsed or is out of range
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The default transport could not be built
    #[error("Transport setup failed: {0}")]
    Transport(String),
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        DispatchError::Config(err.to_string())
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, DispatchError>;
