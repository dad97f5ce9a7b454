//! The client context object.
//!
//! A [`Client`] owns everything a dispatcher needs: the worker pools, the
//! working set of in-flight requests, the transport, the parser strategy and
//! the image decoder. Cloning a client is cheap and every clone shares the
//! same state.
//!
//! # Examples
//!
//! ## Asynchronous request with a typed callback
//!
//! ```no_run
//! use relay_http::{Client, RequestBuilder};
//!
//! let client = Client::new()?;
//! let request = RequestBuilder::get("https://jsonplaceholder.typicode.com/posts/{id}")
//!     .path_param("id", "1")
//!     .tag("posts")
//!     .build();
//!
//! client.get_as_json_object(request, |result| match result {
//!     Ok(post) => println!("title: {:?}", post.get("title")),
//!     Err(e) => eprintln!("failed: {}", e),
//! })?;
//! # Ok::<(), relay_http::DispatchError>(())
//! ```
//!
//! ## Cancelling by tag
//!
//! ```no_run
//! # let client = relay_http::Client::new()?;
//! client.cancel("posts");
//! client.force_cancel_all();
//! assert!(!client.is_request_running("posts"));
//! # Ok::<(), relay_http::DispatchError>(())
//! ```
//!
//! ## Blocking call
//!
//! ```no_run
//! use relay_http::{Client, RequestBuilder, ResponseShape};
//!
//! let client = Client::new()?;
//! let response = client.execute_blocking(
//!     RequestBuilder::get("https://jsonplaceholder.typicode.com/posts/1").build(),
//!     ResponseShape::Text,
//! );
//! println!("{:?}", response.map(|r| r.into_text()));
//! # Ok::<(), relay_http::DispatchError>(())
//! ```

use crate::config::ClientConfig;
use crate::dispatch::{self, Engine, RequestQueue};
use crate::error::{RequestError, Result};
use crate::executor::{Executor, ExecutorSupplier};
use crate::image::{Image, ImageDecoder};
use crate::parser::{JsonParser, Parser};
use crate::request::{RequestConfig, RequestHandle};
use crate::response::Response;
use crate::transport::{RawResponse, ReqwestTransport, Transport};
use crate::types::{ResponseShape, Tag};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;

/// Builder for [`Client`].
///
/// Every collaborator is optional: the default transport is
/// [`ReqwestTransport`], the default parser is [`JsonParser`], callbacks go to
/// a dedicated delivery thread, and image requests fail with a parse error
/// unless a decoder is supplied.
#[derive(Default)]
pub struct ClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    parser: Option<Arc<dyn Parser>>,
    decoder: Option<Box<dyn ImageDecoder>>,
    delivery: Option<Arc<dyn Executor>>,
}

impl ClientBuilder {
    /// Start from the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pool sizes and default transport settings.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the HTTP transport.
    pub fn transport<T: Transport>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Replace the body parser strategy.
    pub fn parser<P: Parser>(mut self, parser: P) -> Self {
        self.parser = Some(Arc::new(parser));
        self
    }

    /// Decoder used by image requests.
    pub fn image_decoder<D: ImageDecoder>(mut self, decoder: D) -> Self {
        self.decoder = Some(Box::new(decoder));
        self
    }

    /// Deliver callbacks on `executor` instead of the built-in delivery thread.
    pub fn delivery_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.delivery = Some(executor);
        self
    }

    /// Start the pools and build the client.
    pub fn build(self) -> Result<Client> {
        self.config.validate()?;

        let executors = match self.delivery {
            Some(delivery) => ExecutorSupplier::with_delivery(&self.config, delivery)?,
            None => ExecutorSupplier::new(&self.config)?,
        };
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&self.config)?),
        };

        let engine = Arc::new(Engine {
            transport,
            parser: self.parser.unwrap_or_else(|| Arc::new(JsonParser)),
            decoder: self.decoder.map(Mutex::new),
            executors,
        });

        tracing::info!(
            network = self.config.network_threads,
            immediate = self.config.immediate_threads,
            transfer = self.config.transfer_threads,
            "client started"
        );

        Ok(Client {
            queue: RequestQueue::new(engine),
            config: Arc::new(self.config),
        })
    }
}

/// Request dispatcher.
#[derive(Clone)]
pub struct Client {
    queue: Arc<RequestQueue>,
    config: Arc<ClientConfig>,
}

impl Client {
    /// Build a client with default collaborators and configuration.
    pub fn new() -> Result<Self> {
        ClientBuilder::new().build()
    }

    /// Start building a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Build a client from configuration.
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        ClientBuilder::new().config(config).build()
    }

    /// Active configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn engine(&self) -> &Arc<Engine> {
        self.queue.engine()
    }

    // ========== Asynchronous ==========

    /// Submit a request and receive the untyped envelope.
    ///
    /// `handler` runs exactly once, on the request's executor override or the
    /// client's delivery executor.
    ///
    /// # Errors
    ///
    /// [`DispatchError::ShutDown`](crate::DispatchError::ShutDown) after [`shutdown`](Self::shutdown); the
    /// handler is then never called.
    pub fn submit<F>(&self, config: RequestConfig, shape: ResponseShape, handler: F) -> Result<RequestHandle>
    where
        F: FnOnce(std::result::Result<Response, RequestError>) + Send + 'static,
    {
        self.queue.submit(config, shape, Some(Box::new(handler)))
    }

    /// Receive the body as text.
    pub fn get_as_string<F>(&self, config: RequestConfig, handler: F) -> Result<RequestHandle>
    where
        F: FnOnce(std::result::Result<String, RequestError>) + Send + 'static,
    {
        self.submit(config, ResponseShape::Text, move |outcome| {
            handler(outcome.and_then(Response::into_text))
        })
    }

    /// Receive the body as a JSON object.
    pub fn get_as_json_object<F>(&self, config: RequestConfig, handler: F) -> Result<RequestHandle>
    where
        F: FnOnce(std::result::Result<Map<String, Value>, RequestError>) + Send + 'static,
    {
        self.submit(config, ResponseShape::JsonObject, move |outcome| {
            handler(outcome.and_then(Response::into_json_object))
        })
    }

    /// Receive the body as a JSON array.
    pub fn get_as_json_array<F>(&self, config: RequestConfig, handler: F) -> Result<RequestHandle>
    where
        F: FnOnce(std::result::Result<Vec<Value>, RequestError>) + Send + 'static,
    {
        self.submit(config, ResponseShape::JsonArray, move |outcome| {
            handler(outcome.and_then(Response::into_json_array))
        })
    }

    /// Receive the body decoded by the client's image decoder.
    pub fn get_as_image<F>(&self, config: RequestConfig, handler: F) -> Result<RequestHandle>
    where
        F: FnOnce(std::result::Result<Image, RequestError>) + Send + 'static,
    {
        self.submit(config, ResponseShape::Image, move |outcome| {
            handler(outcome.and_then(Response::into_image))
        })
    }

    /// Receive the body parsed by the client's parser into `T`.
    ///
    /// A body that parses but does not fit `T` is delivered as a parse error.
    pub fn get_as_parsed<T, F>(&self, config: RequestConfig, handler: F) -> Result<RequestHandle>
    where
        T: DeserializeOwned,
        F: FnOnce(std::result::Result<T, RequestError>) + Send + 'static,
    {
        self.submit(config, ResponseShape::Parsed, move |outcome| {
            handler(outcome.and_then(Response::into_parsed::<T>))
        })
    }

    /// Receive the transport response with its body unread.
    pub fn get_as_raw<F>(&self, config: RequestConfig, handler: F) -> Result<RequestHandle>
    where
        F: FnOnce(std::result::Result<RawResponse, RequestError>) + Send + 'static,
    {
        self.submit(config, ResponseShape::Raw, move |outcome| {
            handler(outcome.and_then(Response::into_raw))
        })
    }

    /// Stream the body of a download request into its target file.
    ///
    /// The handler receives the path written.
    pub fn start_download<F>(&self, config: RequestConfig, handler: F) -> Result<RequestHandle>
    where
        F: FnOnce(std::result::Result<PathBuf, RequestError>) + Send + 'static,
    {
        self.submit(config, ResponseShape::Download, move |outcome| {
            handler(outcome.and_then(Response::into_download_path))
        })
    }

    /// Fetch and discard the body, warming any transport cache.
    pub fn prefetch(&self, config: RequestConfig) -> Result<RequestHandle> {
        self.queue.submit(config, ResponseShape::Prefetch, None)
    }

    // ========== Synchronous ==========

    /// Perform the request on the current task and return the envelope.
    ///
    /// The request never enters the working set and cannot be cancelled by
    /// tag.
    pub async fn execute(
        &self,
        config: RequestConfig,
        shape: ResponseShape,
    ) -> std::result::Result<Response, RequestError> {
        dispatch::execute(self.engine(), &config, shape).await
    }

    /// [`execute`](Self::execute) for a text body.
    pub async fn execute_for_string(&self, config: RequestConfig) -> std::result::Result<String, RequestError> {
        self.execute(config, ResponseShape::Text).await?.into_text()
    }

    /// [`execute`](Self::execute) for a JSON object body.
    pub async fn execute_for_json_object(
        &self,
        config: RequestConfig,
    ) -> std::result::Result<Map<String, Value>, RequestError> {
        self.execute(config, ResponseShape::JsonObject).await?.into_json_object()
    }

    /// [`execute`](Self::execute) for a JSON array body.
    pub async fn execute_for_json_array(&self, config: RequestConfig) -> std::result::Result<Vec<Value>, RequestError> {
        self.execute(config, ResponseShape::JsonArray).await?.into_json_array()
    }

    /// [`execute`](Self::execute) for an image body.
    pub async fn execute_for_image(&self, config: RequestConfig) -> std::result::Result<Image, RequestError> {
        self.execute(config, ResponseShape::Image).await?.into_image()
    }

    /// [`execute`](Self::execute) parsing the body into `T`.
    pub async fn execute_for_parsed<T: DeserializeOwned>(
        &self,
        config: RequestConfig,
    ) -> std::result::Result<T, RequestError> {
        self.execute(config, ResponseShape::Parsed).await?.into_parsed()
    }

    /// [`execute`](Self::execute) returning the unread transport response.
    pub async fn execute_for_raw(&self, config: RequestConfig) -> std::result::Result<RawResponse, RequestError> {
        self.execute(config, ResponseShape::Raw).await?.into_raw()
    }

    /// [`execute`](Self::execute) for a download request.
    pub async fn execute_for_download(&self, config: RequestConfig) -> std::result::Result<PathBuf, RequestError> {
        self.execute(config, ResponseShape::Download).await?.into_download_path()
    }

    /// Perform the request, blocking the calling thread.
    ///
    /// Safe to call from a task inside a tokio runtime; async callers should
    /// still prefer [`execute`](Self::execute), which does not hold a thread.
    pub fn execute_blocking(
        &self,
        config: RequestConfig,
        shape: ResponseShape,
    ) -> std::result::Result<Response, RequestError> {
        dispatch::execute_blocking(self.engine(), config, shape)
    }

    // ========== Cancellation ==========

    /// Cancel in-flight requests carrying `tag`.
    ///
    /// A request whose progress has reached its cancel threshold keeps going;
    /// use [`force_cancel`](Self::force_cancel) to stop it anyway.
    pub fn cancel(&self, tag: impl Into<Tag>) {
        self.queue.cancel_with_tag(&tag.into(), false);
    }

    /// Cancel in-flight requests carrying `tag`, ignoring thresholds.
    pub fn force_cancel(&self, tag: impl Into<Tag>) {
        self.queue.cancel_with_tag(&tag.into(), true);
    }

    /// Cancel every in-flight request below its threshold.
    pub fn cancel_all(&self) {
        self.queue.cancel_all(false);
    }

    /// Cancel every in-flight request.
    pub fn force_cancel_all(&self) {
        self.queue.cancel_all(true);
    }

    /// Whether a request carrying `tag` is currently talking to the network.
    pub fn is_request_running(&self, tag: impl Into<Tag>) -> bool {
        self.queue.is_running(&tag.into())
    }

    /// Number of submitted requests not yet delivered.
    pub fn in_flight(&self) -> usize {
        self.queue.len()
    }

    // ========== Lifecycle ==========

    /// Stop accepting submissions. In-flight requests still complete and
    /// deliver.
    pub fn shutdown(&self) {
        self.engine().executors.shutdown();
    }

    /// Whether [`shutdown`](Self::shutdown) was called on any clone.
    pub fn is_shut_down(&self) -> bool {
        self.engine().executors.is_shut_down()
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("in_flight", &self.in_flight())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
