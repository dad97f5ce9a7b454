//! Transport seam.
//!
//! The dispatcher never speaks HTTP itself. It hands a fully resolved
//! [`TransportRequest`] to a [`Transport`] and gets back a [`RawResponse`]
//! whose body is a byte stream. Connection pooling, TLS, redirects, timeouts and
//! caching all belong to the transport.
//!
//! # Cancellation
//!
//! An in-flight call is cancelled by dropping its future. The dispatcher does
//! this by aborting the task that awaits [`Transport::perform`], so transports
//! only need to release their connection on drop (which `reqwest` does).
//!
//! # Module Organization
//!
//! ```text
//! transport/
//! ├── mod     - Transport trait, request and response types
//! └── reqwest_transport - Default transport backed by reqwest::Client
//! ```

mod reqwest_transport;

pub use reqwest_transport::ReqwestTransport;

use crate::response::ResponseMeta;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt};
use http::{HeaderMap, Method, StatusCode};
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Progress callback: `(bytes_so_far, total_bytes)`. `total_bytes` is 0 when
/// unknown.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Errors raised by a transport.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The call could not be completed
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The transport finished without producing a response
    #[error("No response received")]
    NoResponse,

    /// Reading the response body failed
    #[error("Body read failed: {0}")]
    Body(String),
}

/// Outgoing request body with its content type.
#[derive(Debug, Clone)]
pub struct OutgoingBody {
    /// `Content-Type` header value
    pub content_type: String,
    /// Encoded body
    pub bytes: Bytes,
}

/// A fully resolved request handed to the transport.
#[derive(Clone)]
pub struct TransportRequest {
    /// HTTP method
    pub method: Method,
    /// URL with path parameters substituted and query appended
    pub url: Url,
    /// Request headers
    pub headers: HeaderMap,
    /// Body, if any
    pub body: Option<OutgoingBody>,
    /// `Cache-Control` directive
    pub cache_control: Option<String>,
    /// `User-Agent` override
    pub user_agent: Option<String>,
    /// Upload progress sink, invoked as body chunks are sent
    pub upload_progress: Option<ProgressFn>,
}

impl fmt::Debug for TransportRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportRequest")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers)
            .field("body", &self.body.as_ref().map(|b| b.bytes.len()))
            .field("cache_control", &self.cache_control)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// Streaming response body.
pub type BodyStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Response produced by a transport.
///
/// The body is read at most once. Dropping the response releases the
/// underlying connection.
pub struct RawResponse {
    status: StatusCode,
    headers: HeaderMap,
    url: Option<Url>,
    body: BodyStream,
}

impl RawResponse {
    /// Create a response around a body stream.
    pub fn new(status: StatusCode, headers: HeaderMap, url: Option<Url>, body: BodyStream) -> Self {
        RawResponse {
            status,
            headers,
            url,
            body,
        }
    }

    /// Create a response with an in-memory body.
    ///
    /// ```
    /// use relay_http::transport::RawResponse;
    /// use http::StatusCode;
    ///
    /// let response = RawResponse::from_bytes(StatusCode::OK, Default::default(), "hi");
    /// assert_eq!(response.status(), StatusCode::OK);
    /// ```
    pub fn from_bytes(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self::new(status, headers, None, stream::once(async move { Ok::<_, TransportError>(body) }).boxed())
    }

    /// HTTP status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Final URL, when known.
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// `Content-Length`, when the server sent one.
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get(http::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    }

    /// Snapshot of status, headers and URL.
    pub fn meta(&self) -> ResponseMeta {
        ResponseMeta::new(self.status, self.headers.clone(), self.url.clone())
    }

    /// Next body chunk.
    pub async fn chunk(&mut self) -> Option<Result<Bytes, TransportError>> {
        self.body.next().await
    }

    /// Read the whole body.
    pub async fn bytes(&mut self) -> Result<Bytes, TransportError> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    /// Read the whole body as UTF-8.
    pub async fn text(&mut self) -> Result<String, TransportError> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|e| TransportError::Body(e.to_string()))
    }

    /// Read and discard the body, returning the number of bytes skipped.
    pub async fn drain(&mut self) -> Result<u64, TransportError> {
        let mut total = 0u64;
        while let Some(chunk) = self.body.next().await {
            total += chunk?.len() as u64;
        }
        Ok(total)
    }
}

impl fmt::Debug for RawResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

/// HTTP transport used by the dispatcher.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Perform the call and return the response head with a streaming body.
    async fn perform(&self, request: TransportRequest) -> Result<RawResponse, TransportError>;
}
