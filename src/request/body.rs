//! Resolving a [`RequestConfig`] into a [`TransportRequest`].
//!
//! Object bindings are flattened through the client's [`Parser`], path
//! parameters are substituted, query parameters appended, and the body encoded
//! according to the request kind and method.

use super::builder::{Binding, RawBody, RequestConfig};
use crate::error::RequestError;
use crate::executor::WorkerPool;
use crate::parser::Parser;
use crate::transport::{OutgoingBody, ProgressFn, TransportRequest};
use crate::types::RequestKind;
use bytes::{BufMut, Bytes, BytesMut};
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::Method;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use url::Url;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
const MARKDOWN_CONTENT_TYPE: &str = "text/x-markdown; charset=utf-8";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const MULTIPART_CONTENT_TYPE: &str = "multipart/form-data";

/// Parameters after object bindings have been merged in.
#[derive(Default)]
struct Resolved {
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
    form: Vec<(String, String)>,
    multipart: Vec<(String, String)>,
    body: Option<RawBody>,
}

fn resolve(config: &RequestConfig, parser: &dyn Parser) -> Result<Resolved, RequestError> {
    let mut resolved = Resolved {
        headers: config.headers.clone(),
        query: config.query.clone(),
        form: config.form.clone(),
        multipart: config.multipart.clone(),
        body: config.body.clone(),
    };

    let flatten = |value: &Result<Value, String>| -> Result<BTreeMap<String, String>, RequestError> {
        let value = value.as_ref().map_err(RequestError::parse)?;
        parser.to_string_map(value).map_err(RequestError::parse)
    };

    for binding in &config.bindings {
        match binding {
            Binding::Query(value) => resolved.query.extend(flatten(value)?),
            Binding::Headers(value) => resolved.headers.extend(flatten(value)?),
            Binding::Form(value) => resolved.form.extend(flatten(value)?),
            Binding::Multipart(value) => resolved.multipart.extend(flatten(value)?),
            Binding::JsonBody(value) => {
                let value = value.as_ref().map_err(RequestError::parse)?;
                let json = parser.serialize(value).map_err(RequestError::parse)?;
                resolved.body = Some(RawBody::Json(json));
            }
        }
    }
    Ok(resolved)
}

/// Substitute `{name}` path parameters and append query parameters.
pub(crate) fn compose_url(
    template: &str,
    path_params: &BTreeMap<String, String>,
    query: &[(String, String)],
) -> Result<Url, RequestError> {
    let mut raw = template.to_string();
    for (name, value) in path_params {
        raw = raw.replace(&format!("{{{}}}", name), value);
    }

    let mut url = Url::parse(&raw)
        .map_err(|e| RequestError::connection(format!("invalid url '{}': {}", raw, e)))?;

    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in query {
            pairs.append_pair(name, value);
        }
    }
    Ok(url)
}

fn header_map(headers: &[(String, String)]) -> Result<HeaderMap, RequestError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| RequestError::connection(format!("invalid header name '{}': {}", name, e)))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|e| RequestError::connection(format!("invalid value for header '{}': {}", name, e)))?;
        map.append(header_name, header_value);
    }
    Ok(map)
}

/// Whether requests with this method carry a body.
fn permits_body(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Url-encode form fields.
pub(crate) fn encode_form(fields: &[(String, String)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (name, value) in fields {
        serializer.append_pair(name, value);
    }
    serializer.finish()
}

/// One file part of a multipart body.
pub(crate) struct FilePart {
    pub(crate) name: String,
    pub(crate) file_name: String,
    pub(crate) content_type: &'static str,
    pub(crate) bytes: Bytes,
}

/// Encode a `multipart/form-data` body with the given boundary.
pub(crate) fn encode_multipart(boundary: &str, texts: &[(String, String)], files: &[FilePart]) -> Bytes {
    let mut buf = BytesMut::new();
    for (name, value) in texts {
        buf.put_slice(format!("--{}\r\n", boundary).as_bytes());
        buf.put_slice(format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes());
        buf.put_slice(value.as_bytes());
        buf.put_slice(b"\r\n");
    }
    for part in files {
        buf.put_slice(format!("--{}\r\n", boundary).as_bytes());
        buf.put_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                part.name, part.file_name
            )
            .as_bytes(),
        );
        buf.put_slice(format!("Content-Type: {}\r\n\r\n", part.content_type).as_bytes());
        buf.put_slice(&part.bytes);
        buf.put_slice(b"\r\n");
    }
    buf.put_slice(format!("--{}--\r\n", boundary).as_bytes());
    buf.freeze()
}

/// Content type for a file, guessed from its extension.
pub(crate) fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "js" => "application/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}

async fn read_file(files: &WorkerPool, path: &Path) -> Result<Bytes, RequestError> {
    let owned: PathBuf = path.to_path_buf();
    let read = files
        .run(tokio::fs::read(owned))
        .await
        .map_err(|e| RequestError::connection(format!("file read task failed: {}", e)))?;
    read.map(Bytes::from)
        .map_err(|e| RequestError::connection(format!("cannot read '{}': {}", path.display(), e)))
}

/// Build the transport request for `config`.
///
/// File contents are read on `files`. `upload_progress` is attached to the
/// request so the transport reports body bytes as they are sent.
pub(crate) async fn prepare(
    config: &RequestConfig,
    parser: &dyn Parser,
    files: &WorkerPool,
    upload_progress: Option<ProgressFn>,
) -> Result<TransportRequest, RequestError> {
    let resolved = resolve(config, parser)?;
    let url = compose_url(&config.url, &config.path_params, &resolved.query)?;
    let headers = header_map(&resolved.headers)?;

    let body = if config.kind == RequestKind::Multipart {
        let mut parts = Vec::with_capacity(config.multipart_files.len());
        for (name, path) in &config.multipart_files {
            parts.push(FilePart {
                name: name.clone(),
                file_name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                content_type: guess_mime(path),
                bytes: read_file(files, path).await?,
            });
        }
        let boundary = uuid::Uuid::new_v4().simple().to_string();
        let media = config.content_type.as_deref().unwrap_or(MULTIPART_CONTENT_TYPE);
        Some(OutgoingBody {
            content_type: format!("{}; boundary={}", media, boundary),
            bytes: encode_multipart(&boundary, &resolved.multipart, &parts),
        })
    } else if permits_body(&config.method) {
        let custom = config.content_type.clone();
        let body = match resolved.body {
            Some(RawBody::Json(json)) => OutgoingBody {
                content_type: custom.unwrap_or_else(|| JSON_CONTENT_TYPE.to_string()),
                bytes: Bytes::from(json),
            },
            Some(RawBody::Text(text)) => OutgoingBody {
                content_type: custom.unwrap_or_else(|| MARKDOWN_CONTENT_TYPE.to_string()),
                bytes: Bytes::from(text),
            },
            Some(RawBody::Bytes(bytes)) => OutgoingBody {
                content_type: custom.unwrap_or_else(|| MARKDOWN_CONTENT_TYPE.to_string()),
                bytes,
            },
            Some(RawBody::File(path)) => OutgoingBody {
                content_type: custom.unwrap_or_else(|| MARKDOWN_CONTENT_TYPE.to_string()),
                bytes: read_file(files, &path).await?,
            },
            None => OutgoingBody {
                content_type: FORM_CONTENT_TYPE.to_string(),
                bytes: Bytes::from(encode_form(&resolved.form)),
            },
        };
        Some(body)
    } else {
        None
    };

    Ok(TransportRequest {
        method: config.method.clone(),
        url,
        headers,
        body,
        cache_control: config
            .cache_control
            .as_ref()
            .filter(|c| !c.is_empty())
            .map(|c| c.header_value()),
        user_agent: config.user_agent.clone(),
        upload_progress,
    })
}
