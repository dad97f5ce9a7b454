//! The execution unit.
//!
//! [`perform`] is the one path from a [`RequestConfig`] to an envelope. It is
//! shared by asynchronous units (which hand the envelope to their
//! [`Request`]) and the synchronous caller (which returns it).

use super::Engine;
use crate::error::RequestError;
use crate::request::body;
use crate::request::{Request, RequestConfig};
use crate::response::{Payload, Response, ResponseMeta};
use crate::transport::{ProgressFn, RawResponse, TransportError};
use crate::types::{RequestKind, ResponseShape};
use futures::FutureExt;
use serde_json::Value;
use std::io;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// Run a submitted request and deliver its outcome.
pub(crate) async fn run(engine: Arc<Engine>, request: Arc<Request>) {
    if !request.start() {
        tracing::trace!(sequence = request.sequence(), "skipping unit of finished request");
        return;
    }

    let outcome = AssertUnwindSafe(perform(&engine, request.config(), request.shape(), Some(&request)))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(response)) => request.deliver_response(response),
        Ok(Err(error)) => {
            tracing::debug!(sequence = request.sequence(), %error, "request failed");
            request.deliver_error(error)
        }
        Err(_) => {
            tracing::error!(sequence = request.sequence(), "execution unit panicked");
            request.deliver_error(RequestError::connection("execution unit panicked"))
        }
    }
}

/// Drop a transport response, releasing its connection.
fn release(raw: RawResponse) {
    tracing::trace!(status = raw.status().as_u16(), "releasing transport response");
    drop(raw);
}

/// Perform `config` and classify the result into an envelope.
pub(crate) async fn perform(
    engine: &Engine,
    config: &RequestConfig,
    shape: ResponseShape,
    request: Option<&Arc<Request>>,
) -> Result<Response, RequestError> {
    let upload_progress = match (request, &config.kind) {
        (Some(request), RequestKind::Multipart) => {
            let request = Arc::downgrade(request);
            let progress: ProgressFn = Arc::new(move |done, total| {
                if let Some(request) = request.upgrade() {
                    request.report_upload(done, total);
                }
            });
            Some(progress)
        }
        _ => None,
    };

    let outgoing = body::prepare(
        config,
        engine.parser.as_ref(),
        engine.executors.for_transfers(),
        upload_progress,
    )
    .await?;

    let mut raw = match engine.transport.perform(outgoing).await {
        Ok(raw) => raw,
        Err(TransportError::NoResponse) => return Err(RequestError::connection("no response from transport")),
        Err(e) => return Err(RequestError::connection(e.to_string())),
    };

    if shape == ResponseShape::Raw {
        let meta = raw.meta();
        return Ok(Response::new(Payload::Raw(raw), Some(meta)));
    }

    let meta = raw.meta();
    let status = raw.status().as_u16();
    if status >= 400 {
        let body = match raw.text().await {
            Ok(body) => Some(body),
            Err(e) => {
                tracing::debug!(status, "error body unreadable: {}", e);
                None
            }
        };
        release(raw);
        return Err(RequestError::server(status, body, meta));
    }

    if shape == ResponseShape::Download {
        let payload = download(engine, config, raw, request.cloned()).await;
        return envelope(payload, meta);
    }

    let payload = parse(engine, config, shape, &mut raw).await;
    release(raw);
    envelope(payload, meta)
}

fn envelope(payload: Result<Payload, RequestError>, meta: ResponseMeta) -> Result<Response, RequestError> {
    match payload {
        Ok(payload) => Ok(Response::new(payload, Some(meta))),
        Err(error) => Err(error.with_meta(meta)),
    }
}

async fn parse(
    engine: &Engine,
    config: &RequestConfig,
    shape: ResponseShape,
    raw: &mut RawResponse,
) -> Result<Payload, RequestError> {
    let read_failed = |e: TransportError| RequestError::parse(e.to_string());

    match shape {
        ResponseShape::Text => raw.text().await.map(Payload::Text).map_err(read_failed),
        ResponseShape::JsonObject | ResponseShape::JsonArray => {
            let bytes = raw.bytes().await.map_err(read_failed)?;
            let value: Value =
                serde_json::from_slice(&bytes).map_err(|e| RequestError::parse(e.to_string()))?;
            match (shape, &value) {
                (ResponseShape::JsonObject, Value::Object(_)) | (ResponseShape::JsonArray, Value::Array(_)) => {
                    Ok(Payload::Json(value))
                }
                _ => Err(RequestError::parse(format!("unexpected json shape for {:?}", shape))),
            }
        }
        ResponseShape::Image => {
            let bytes = raw.bytes().await.map_err(read_failed)?;
            let decoder = engine
                .decoder
                .as_ref()
                .ok_or_else(|| RequestError::parse("no image decoder configured"))?;
            let image = decoder
                .lock()
                .decode(&bytes, &config.decode_options)
                .map_err(RequestError::parse)?;
            Ok(Payload::Image(image))
        }
        ResponseShape::Parsed => {
            let bytes = raw.bytes().await.map_err(read_failed)?;
            engine
                .parser
                .parse(&bytes)
                .map(Payload::Parsed)
                .map_err(RequestError::parse)
        }
        ResponseShape::Prefetch => {
            let skipped = raw.drain().await.map_err(read_failed)?;
            tracing::trace!(bytes = skipped, "prefetched");
            Ok(Payload::Prefetched)
        }
        ResponseShape::Raw | ResponseShape::Download => {
            Err(RequestError::parse(format!("{:?} is not parsed from a body", shape)))
        }
    }
}

/// Stream the body into the download target on the transfer pool.
async fn download(
    engine: &Engine,
    config: &RequestConfig,
    raw: RawResponse,
    request: Option<Arc<Request>>,
) -> Result<Payload, RequestError> {
    let (dir, file_name) = match &config.kind {
        RequestKind::Download { dir, file_name } => (dir.clone(), file_name.clone()),
        _ => {
            release(raw);
            return Err(RequestError::parse("request has no download target"));
        }
    };

    engine
        .executors
        .for_transfers()
        .run(write_to_file(raw, dir, file_name, request))
        .await
        .map_err(|e| RequestError::parse(format!("download task failed: {}", e)))?
}

async fn write_to_file(
    mut raw: RawResponse,
    dir: PathBuf,
    file_name: String,
    request: Option<Arc<Request>>,
) -> Result<Payload, RequestError> {
    let total = raw.content_length().unwrap_or(0);
    let path = dir.join(&file_name);

    let written = async {
        tokio::fs::create_dir_all(&dir).await?;
        let mut file = tokio::fs::File::create(&path).await?;
        let mut done = 0u64;
        while let Some(chunk) = raw.chunk().await {
            let chunk = chunk.map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            if let Some(request) = &request {
                if request.is_cancelled() {
                    return Err(io::Error::new(io::ErrorKind::Interrupted, "download cancelled"));
                }
            }
            file.write_all(&chunk).await?;
            done += chunk.len() as u64;
            if let Some(request) = &request {
                request.report_download(done, total);
            }
        }
        file.flush().await?;
        Ok::<_, io::Error>(())
    }
    .await;

    release(raw);

    match written {
        Ok(()) => Ok(Payload::Downloaded(path)),
        Err(e) => {
            if let Err(cleanup) = tokio::fs::remove_file(&path).await {
                tracing::trace!("partial download not removed: {}", cleanup);
            }
            Err(RequestError::parse(format!("download to {} failed: {}", path.display(), e)))
        }
    }
}
