//! Fluent request builder.

use crate::executor::Executor;
use crate::image::DecodeOptions;
use crate::transport::ProgressFn;
use crate::types::{CacheControl, Priority, RequestKind, Tag};
use bytes::Bytes;
use http::Method;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Explicit request body.
#[derive(Debug, Clone)]
pub enum RawBody {
    /// Serialized JSON text
    Json(String),
    /// Plain string
    Text(String),
    /// Raw bytes
    Bytes(Bytes),
    /// File contents, read when the request is sent
    File(PathBuf),
}

/// A serializable object to be flattened or serialized by the client's parser
/// when the request is sent.
#[derive(Debug, Clone)]
pub(crate) enum Binding {
    Query(Result<Value, String>),
    Headers(Result<Value, String>),
    Form(Result<Value, String>),
    Multipart(Result<Value, String>),
    JsonBody(Result<Value, String>),
}

fn to_value<T: Serialize + ?Sized>(object: &T) -> Result<Value, String> {
    serde_json::to_value(object).map_err(|e| e.to_string())
}

/// Immutable description of a request.
///
/// Produced by [`RequestBuilder::build`] and handed to
/// [`Client::submit`](crate::Client::submit) or one of the typed helpers.
#[derive(Clone)]
pub struct RequestConfig {
    pub(crate) method: Method,
    pub(crate) url: String,
    pub(crate) kind: RequestKind,
    pub(crate) tag: Option<Tag>,
    pub(crate) priority: Priority,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) path_params: BTreeMap<String, String>,
    pub(crate) form: Vec<(String, String)>,
    pub(crate) multipart: Vec<(String, String)>,
    pub(crate) multipart_files: Vec<(String, PathBuf)>,
    pub(crate) bindings: Vec<Binding>,
    pub(crate) body: Option<RawBody>,
    pub(crate) content_type: Option<String>,
    pub(crate) cache_control: Option<CacheControl>,
    pub(crate) executor: Option<Arc<dyn Executor>>,
    pub(crate) user_agent: Option<String>,
    pub(crate) decode_options: DecodeOptions,
    pub(crate) cancel_threshold: u8,
    pub(crate) download_progress: Option<ProgressFn>,
    pub(crate) upload_progress: Option<ProgressFn>,
}

impl RequestConfig {
    /// HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// URL template, before path parameters are substituted.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Request kind.
    pub fn kind(&self) -> &RequestKind {
        &self.kind
    }

    /// Grouping tag.
    pub fn tag(&self) -> Option<&Tag> {
        self.tag.as_ref()
    }

    /// Scheduling priority.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Progress percentage at or above which a non-forced cancel is ignored.
    /// 0 means every cancel is honored.
    pub fn cancel_threshold(&self) -> u8 {
        self.cancel_threshold
    }

    /// Image decode options.
    pub fn decode_options(&self) -> &DecodeOptions {
        &self.decode_options
    }
}

impl fmt::Debug for RequestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestConfig")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("kind", &self.kind)
            .field("tag", &self.tag)
            .field("priority", &self.priority)
            .field("headers", &self.headers)
            .field("query", &self.query)
            .field("cache_control", &self.cache_control)
            .field("cancel_threshold", &self.cancel_threshold)
            .finish_non_exhaustive()
    }
}

/// Builder for [`RequestConfig`].
///
/// # Examples
///
/// ```
/// use relay_http::{Priority, RequestBuilder};
///
/// let config = RequestBuilder::get("https://example.com/posts/{id}")
///     .path_param("id", "1")
///     .query_param("fields", "title")
///     .header("Accept", "application/json")
///     .tag("posts")
///     .priority(Priority::High)
///     .build();
///
/// assert_eq!(config.priority(), Priority::High);
/// assert_eq!(config.tag().and_then(|t| t.as_str()), Some("posts"));
/// ```
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    config: RequestConfig,
}

impl RequestBuilder {
    /// Start a request with any method.
    pub fn request(method: Method, url: impl Into<String>) -> Self {
        RequestBuilder {
            config: RequestConfig {
                method,
                url: url.into(),
                kind: RequestKind::Simple,
                tag: None,
                priority: Priority::default(),
                headers: Vec::new(),
                query: Vec::new(),
                path_params: BTreeMap::new(),
                form: Vec::new(),
                multipart: Vec::new(),
                multipart_files: Vec::new(),
                bindings: Vec::new(),
                body: None,
                content_type: None,
                cache_control: None,
                executor: None,
                user_agent: None,
                decode_options: DecodeOptions::default(),
                cancel_threshold: 0,
                download_progress: None,
                upload_progress: None,
            },
        }
    }

    /// `GET` request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::request(Method::GET, url)
    }

    /// `HEAD` request.
    pub fn head(url: impl Into<String>) -> Self {
        Self::request(Method::HEAD, url)
    }

    /// `OPTIONS` request.
    pub fn options(url: impl Into<String>) -> Self {
        Self::request(Method::OPTIONS, url)
    }

    /// `POST` request.
    pub fn post(url: impl Into<String>) -> Self {
        Self::request(Method::POST, url)
    }

    /// `PUT` request.
    pub fn put(url: impl Into<String>) -> Self {
        Self::request(Method::PUT, url)
    }

    /// `DELETE` request.
    pub fn delete(url: impl Into<String>) -> Self {
        Self::request(Method::DELETE, url)
    }

    /// `PATCH` request.
    pub fn patch(url: impl Into<String>) -> Self {
        Self::request(Method::PATCH, url)
    }

    /// `GET` whose body is streamed into `dir/file_name`.
    pub fn download(url: impl Into<String>, dir: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        let mut builder = Self::get(url);
        builder.config.kind = RequestKind::Download {
            dir: dir.into(),
            file_name: file_name.into(),
        };
        builder
    }

    /// `POST` with a `multipart/form-data` body.
    pub fn upload(url: impl Into<String>) -> Self {
        let mut builder = Self::post(url);
        builder.config.kind = RequestKind::Multipart;
        builder
    }

    /// Grouping tag used by tag-based cancellation.
    pub fn tag(mut self, tag: impl Into<Tag>) -> Self {
        self.config.tag = Some(tag.into());
        self
    }

    /// Scheduling priority.
    pub fn priority(mut self, priority: Priority) -> Self {
        self.config.priority = priority;
        self
    }

    /// Add a header. Repeated names are all sent, in insertion order.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.push((name.into(), value.into()));
        self
    }

    /// Add every member of a flat serializable object as a header.
    pub fn header_object<T: Serialize + ?Sized>(mut self, object: &T) -> Self {
        self.config.bindings.push(Binding::Headers(to_value(object)));
        self
    }

    /// Append a query parameter. Repeated names are all sent.
    pub fn query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.query.push((name.into(), value.into()));
        self
    }

    /// Append every member of a flat serializable object as a query parameter.
    pub fn query_object<T: Serialize + ?Sized>(mut self, object: &T) -> Self {
        self.config.bindings.push(Binding::Query(to_value(object)));
        self
    }

    /// Substitute `{name}` in the URL.
    pub fn path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.path_params.insert(name.into(), value.into());
        self
    }

    /// Add a url-encoded form field.
    pub fn form_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.form.push((name.into(), value.into()));
        self
    }

    /// Add every member of a flat serializable object as a form field.
    pub fn body_object<T: Serialize + ?Sized>(mut self, object: &T) -> Self {
        self.config.bindings.push(Binding::Form(to_value(object)));
        self
    }

    /// Add a text part to a multipart upload.
    pub fn multipart_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.multipart.push((name.into(), value.into()));
        self
    }

    /// Add every member of a flat serializable object as a multipart text part.
    pub fn multipart_object<T: Serialize + ?Sized>(mut self, object: &T) -> Self {
        self.config.bindings.push(Binding::Multipart(to_value(object)));
        self
    }

    /// Add a file part to a multipart upload.
    pub fn multipart_file(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.config.multipart_files.push((name.into(), path.into()));
        self
    }

    /// Serialize an object through the client's parser and send it as JSON.
    pub fn json_body<T: Serialize + ?Sized>(mut self, object: &T) -> Self {
        self.config.bindings.push(Binding::JsonBody(to_value(object)));
        self
    }

    /// Send already serialized JSON text.
    pub fn json_string(mut self, json: impl Into<String>) -> Self {
        self.config.body = Some(RawBody::Json(json.into()));
        self
    }

    /// Send a plain string body.
    pub fn string_body(mut self, body: impl Into<String>) -> Self {
        self.config.body = Some(RawBody::Text(body.into()));
        self
    }

    /// Send a byte body.
    pub fn bytes_body(mut self, body: impl Into<Bytes>) -> Self {
        self.config.body = Some(RawBody::Bytes(body.into()));
        self
    }

    /// Send a file's contents as the body.
    pub fn file_body(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.body = Some(RawBody::File(path.into()));
        self
    }

    /// Override the body's content type.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.config.content_type = Some(content_type.into());
        self
    }

    /// Set the full cache directive.
    pub fn cache_control(mut self, cache_control: CacheControl) -> Self {
        self.config.cache_control = Some(cache_control);
        self
    }

    /// Do not let the response be cached.
    pub fn no_store(mut self) -> Self {
        self.cache_mut().no_store = true;
        self
    }

    /// Only answer from the cache.
    pub fn only_cache(mut self) -> Self {
        let cache = self.cache_mut();
        cache.only_if_cached = true;
        cache.max_stale = Some(Duration::from_secs(i32::MAX as u64));
        self
    }

    /// Always go to the network.
    pub fn only_network(mut self) -> Self {
        self.cache_mut().no_cache = true;
        self
    }

    /// Accept cached responses at most `max_age` old.
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.cache_mut().max_age = Some(max_age);
        self
    }

    /// Accept stale cached responses up to `max_stale` past expiry.
    pub fn max_stale(mut self, max_stale: Duration) -> Self {
        self.cache_mut().max_stale = Some(max_stale);
        self
    }

    fn cache_mut(&mut self) -> &mut CacheControl {
        self.config.cache_control.get_or_insert_with(CacheControl::default)
    }

    /// Deliver this request's callbacks on `executor` instead of the client's
    /// delivery pool.
    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.config.executor = Some(executor);
        self
    }

    /// Override the client's `User-Agent`.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = Some(user_agent.into());
        self
    }

    /// Image decode options.
    pub fn decode_options(mut self, options: DecodeOptions) -> Self {
        self.config.decode_options = options;
        self
    }

    /// Ignore non-forced cancels once progress reaches `percent`.
    pub fn cancel_threshold(mut self, percent: u8) -> Self {
        self.config.cancel_threshold = percent.min(100);
        self
    }

    /// Receive `(bytes_downloaded, total_bytes)` as a download proceeds.
    pub fn on_download_progress<F>(mut self, listener: F) -> Self
    where
        F: Fn(u64, u64) + Send + Sync + 'static,
    {
        self.config.download_progress = Some(Arc::new(listener));
        self
    }

    /// Receive `(bytes_uploaded, total_bytes)` as an upload proceeds.
    pub fn on_upload_progress<F>(mut self, listener: F) -> Self
    where
        F: Fn(u64, u64) + Send + Sync + 'static,
    {
        self.config.upload_progress = Some(Arc::new(listener));
        self
    }

    /// Finish building.
    pub fn build(self) -> RequestConfig {
        self.config
    }
}
