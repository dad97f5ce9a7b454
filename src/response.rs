//! Response envelope.
//!
//! A finished request yields `Result<Response, RequestError>`. [`Response`]
//! carries the [`Payload`] in the shape that was asked for, plus the
//! [`ResponseMeta`] of the transport response it came from.

use crate::error::RequestError;
use crate::image::Image;
use crate::transport::RawResponse;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::PathBuf;
use url::Url;

/// Transport metadata kept alongside a success value or an error.
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    /// HTTP status
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Final URL, when the transport reports it
    pub url: Option<Url>,
}

impl ResponseMeta {
    /// Create response metadata.
    pub fn new(status: StatusCode, headers: HeaderMap, url: Option<Url>) -> Self {
        ResponseMeta {
            status,
            headers,
            url,
        }
    }

    /// Look up a header as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Success value of a request.
#[derive(Debug)]
pub enum Payload {
    /// UTF-8 body
    Text(String),
    /// Parsed JSON object or array
    Json(Value),
    /// Decoded image
    Image(Image),
    /// Value produced by the parser strategy, converted to the caller type on
    /// the way out
    Parsed(Value),
    /// Unread transport response
    Raw(RawResponse),
    /// Body was drained and discarded
    Prefetched,
    /// Body was written to this file
    Downloaded(PathBuf),
}

impl Payload {
    fn name(&self) -> &'static str {
        match self {
            Payload::Text(_) => "text",
            Payload::Json(_) => "json",
            Payload::Image(_) => "image",
            Payload::Parsed(_) => "parsed",
            Payload::Raw(_) => "raw",
            Payload::Prefetched => "prefetched",
            Payload::Downloaded(_) => "downloaded",
        }
    }
}

/// Successful result of a request.
#[derive(Debug)]
pub struct Response {
    payload: Payload,
    meta: Option<ResponseMeta>,
}

impl Response {
    /// Create a response from a payload and optional metadata.
    pub fn new(payload: Payload, meta: Option<ResponseMeta>) -> Self {
        Response { payload, meta }
    }

    /// The success value.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Metadata of the transport response.
    pub fn meta(&self) -> Option<&ResponseMeta> {
        self.meta.as_ref()
    }

    /// Split into payload and metadata.
    pub fn into_parts(self) -> (Payload, Option<ResponseMeta>) {
        (self.payload, self.meta)
    }

    fn mismatch(&self, wanted: &str) -> RequestError {
        RequestError::parse(format!(
            "expected {} payload, got {}",
            wanted,
            self.payload.name()
        ))
    }

    /// Take the body as text.
    pub fn into_text(self) -> Result<String, RequestError> {
        match self.payload {
            Payload::Text(text) => Ok(text),
            _ => Err(self.mismatch("text")),
        }
    }

    /// Take the body as a JSON object.
    pub fn into_json_object(self) -> Result<Map<String, Value>, RequestError> {
        match self.payload {
            Payload::Json(Value::Object(map)) => Ok(map),
            _ => Err(self.mismatch("json object")),
        }
    }

    /// Take the body as a JSON array.
    pub fn into_json_array(self) -> Result<Vec<Value>, RequestError> {
        match self.payload {
            Payload::Json(Value::Array(items)) => Ok(items),
            _ => Err(self.mismatch("json array")),
        }
    }

    /// Take the decoded image.
    pub fn into_image(self) -> Result<Image, RequestError> {
        match self.payload {
            Payload::Image(image) => Ok(image),
            _ => Err(self.mismatch("image")),
        }
    }

    /// Take the unread transport response.
    pub fn into_raw(self) -> Result<RawResponse, RequestError> {
        match self.payload {
            Payload::Raw(raw) => Ok(raw),
            _ => Err(self.mismatch("raw")),
        }
    }

    /// Convert the parsed body into a caller type.
    ///
    /// Accepts both [`Payload::Parsed`] and [`Payload::Json`]; a value that does
    /// not fit `T` becomes a parse error.
    pub fn into_parsed<T: DeserializeOwned>(self) -> Result<T, RequestError> {
        match self.payload {
            Payload::Parsed(value) | Payload::Json(value) => {
                serde_json::from_value(value).map_err(|e| RequestError::parse(e.to_string()))
            }
            _ => Err(self.mismatch("parsed")),
        }
    }

    /// Path of the downloaded file.
    pub fn into_download_path(self) -> Result<PathBuf, RequestError> {
        match self.payload {
            Payload::Downloaded(path) => Ok(path),
            _ => Err(self.mismatch("downloaded")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorDetail;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Post {
        id: u64,
    }

    #[test]
    fn test_into_json_object() {
        let response = Response::new(Payload::Json(json!({"id": 1})), None);
        let map = response.into_json_object().unwrap();
        assert_eq!(map.get("id"), Some(&json!(1)));
    }

    #[test]
    fn test_shape_mismatch_is_parse_error() {
        let response = Response::new(Payload::Json(json!([1, 2])), None);
        let err = response.into_json_object().unwrap_err();
        assert_eq!(err.detail(), Some(ErrorDetail::Parse));
        assert_eq!(err.code(), 0);
    }

    #[test]
    fn test_into_parsed() {
        let response = Response::new(Payload::Parsed(json!({"id": 7})), None);
        assert_eq!(response.into_parsed::<Post>().unwrap(), Post { id: 7 });

        let response = Response::new(Payload::Parsed(json!({"name": "x"})), None);
        assert!(response.into_parsed::<Post>().is_err());
    }

    #[test]
    fn test_meta_header_lookup() {
        let mut headers = HeaderMap::new();
        headers.insert("etag", "\"abc\"".parse().unwrap());
        let meta = ResponseMeta::new(StatusCode::OK, headers, None);
        assert_eq!(meta.header("etag"), Some("\"abc\""));
        assert_eq!(meta.header("missing"), None);
    }
}
