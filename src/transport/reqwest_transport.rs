//! Default transport backed by `reqwest`.

use super::{ProgressFn, RawResponse, Transport, TransportError, TransportRequest};
use crate::config::ClientConfig;
use crate::error::{DispatchError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use http::header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, USER_AGENT};
use std::time::Duration;

/// Size of the slices an upload body is fed to the connection in.
const UPLOAD_CHUNK: usize = 8 * 1024;

/// [`Transport`] implementation over a shared `reqwest::Client`.
///
/// Connection pooling, timeouts and proxying are configured once from
/// [`ClientConfig`]; per-request cache directives and user agents travel as
/// headers.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    user_agent: Option<String>,
    enable_logging: bool,
}

impl ReqwestTransport {
    /// Build a transport from client configuration.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(config.max_idle_per_host);

        if !config.proxy_url.is_empty() {
            let proxy = reqwest::Proxy::all(&config.proxy_url)
                .map_err(|e| DispatchError::Config(format!("proxy_url: {}", e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        Ok(Self::with_client(client, config))
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn with_client(client: reqwest::Client, config: &ClientConfig) -> Self {
        ReqwestTransport {
            client,
            user_agent: config.user_agent.clone(),
            enable_logging: config.enable_logging,
        }
    }
}

/// Body stream that reports progress as the connection pulls each slice.
fn progress_body(bytes: Bytes, progress: ProgressFn) -> reqwest::Body {
    let total = bytes.len() as u64;
    let chunks: Vec<Bytes> = (0..bytes.len())
        .step_by(UPLOAD_CHUNK)
        .map(|start| bytes.slice(start..(start + UPLOAD_CHUNK).min(bytes.len())))
        .collect();

    let mut sent = 0u64;
    let stream = stream::iter(chunks).map(move |chunk| {
        sent += chunk.len() as u64;
        progress(sent, total);
        Ok::<_, std::io::Error>(chunk)
    });
    reqwest::Body::wrap_stream(stream)
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn perform(&self, request: TransportRequest) -> std::result::Result<RawResponse, TransportError> {
        let TransportRequest {
            method,
            url,
            headers,
            body,
            cache_control,
            user_agent,
            upload_progress,
        } = request;

        if self.enable_logging {
            tracing::info!(%method, %url, "--> sending request");
        }

        let mut req_builder = self.client.request(method.clone(), url.clone()).headers(headers);

        if let Some(directive) = cache_control {
            req_builder = req_builder.header(CACHE_CONTROL, directive);
        }
        if let Some(agent) = user_agent.or_else(|| self.user_agent.clone()) {
            req_builder = req_builder.header(USER_AGENT, agent);
        }
        if let Some(body) = body {
            req_builder = req_builder.header(CONTENT_TYPE, body.content_type);
            req_builder = match upload_progress {
                Some(progress) => req_builder
                    .header(CONTENT_LENGTH, body.bytes.len())
                    .body(progress_body(body.bytes, progress)),
                None => req_builder.body(body.bytes),
            };
        }

        let response = req_builder
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let status = response.status();
        if self.enable_logging {
            tracing::info!(%method, %url, status = status.as_u16(), "<-- received response");
        }

        let headers = response.headers().clone();
        let final_url = response.url().clone();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::Body(e.to_string())))
            .boxed();

        Ok(RawResponse::new(status, headers, Some(final_url), body))
    }
}
