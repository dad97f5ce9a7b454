//! End-to-end requests through the default `reqwest` transport.

use mockito::Matcher;
use relay_http::{
    Client, ClientConfig, ErrorDetail, RequestBuilder, RequestError, ResponseShape,
};
use serde_json::{json, Map, Value};
use std::sync::mpsc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(10);

fn client() -> Client {
    Client::with_config(ClientConfig {
        network_threads: 2,
        immediate_threads: 1,
        transfer_threads: 1,
        user_agent: Some("relay-test/1.0".to_string()),
        enable_logging: true,
        ..Default::default()
    })
    .unwrap()
}

#[test]
fn test_get_json_object() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/posts/1")
        .match_header("user-agent", "relay-test/1.0")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":1}"#)
        .create();

    let client = client();
    let (tx, rx) = mpsc::channel::<Result<Map<String, Value>, RequestError>>();
    client
        .get_as_json_object(
            RequestBuilder::get(format!("{}/posts/{{id}}", server.url()))
                .path_param("id", "1")
                .build(),
            move |result| {
                let _ = tx.send(result);
            },
        )
        .unwrap();

    let object = rx.recv_timeout(WAIT).unwrap().unwrap();
    assert_eq!(Value::Object(object), json!({"id": 1}));
    mock.assert();
}

#[test]
fn test_not_found_keeps_raw_body() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/posts/999")
        .with_status(404)
        .with_body(r#"{"error":"not found"}"#)
        .create();

    let err = client()
        .execute_blocking(
            RequestBuilder::get(format!("{}/posts/999", server.url())).build(),
            ResponseShape::JsonObject,
        )
        .unwrap_err();

    assert_eq!(err.code(), 404);
    assert_eq!(err.detail(), Some(ErrorDetail::Server));
    assert_eq!(err.body(), Some(r#"{"error":"not found"}"#));
    let parsed: Value = err.body_as().unwrap();
    assert_eq!(parsed["error"], "not found");
    mock.assert();
}

#[test]
fn test_post_json_with_query_and_cache_directive() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/posts")
        .match_query(Matcher::UrlEncoded("draft".into(), "true".into()))
        .match_header("content-type", "application/json; charset=utf-8")
        .match_header("cache-control", "no-cache")
        .match_header("user-agent", "override/2.0")
        .match_body(Matcher::Json(json!({"title": "hello"})))
        .with_status(201)
        .with_body(r#"{"id":101}"#)
        .create();

    let text = client()
        .execute_blocking(
            RequestBuilder::post(format!("{}/posts", server.url()))
                .query_param("draft", "true")
                .json_body(&json!({"title": "hello"}))
                .only_network()
                .user_agent("override/2.0")
                .build(),
            ResponseShape::Text,
        )
        .unwrap()
        .into_text()
        .unwrap();

    assert_eq!(text, r#"{"id":101}"#);
    mock.assert();
}

#[test]
fn test_multipart_upload() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/upload")
        .match_header(
            "content-type",
            Matcher::Regex("^multipart/form-data; boundary=[0-9a-f]+$".to_string()),
        )
        .match_body(Matcher::Regex("name=\"caption\"\r\n\r\nholiday".to_string()))
        .with_status(200)
        .with_body("ok")
        .create();

    let (tx, rx) = mpsc::channel();
    client()
        .get_as_string(
            RequestBuilder::upload(format!("{}/upload", server.url()))
                .multipart_param("caption", "holiday")
                .on_upload_progress(|_, _| {})
                .build(),
            move |result| {
                let _ = tx.send(result);
            },
        )
        .unwrap();

    assert_eq!(rx.recv_timeout(WAIT).unwrap().unwrap(), "ok");
    mock.assert();
}

#[test]
fn test_download_to_file() {
    let mut server = mockito::Server::new();
    let body = "x".repeat(64 * 1024);
    let mock = server
        .mock("GET", "/files/blob")
        .with_status(200)
        .with_body(&body)
        .create();

    let dir = std::env::temp_dir().join(format!("relay-it-{}", uuid::Uuid::new_v4()));
    let (tx, rx) = mpsc::channel();
    client()
        .start_download(
            RequestBuilder::download(format!("{}/files/blob", server.url()), &dir, "blob.bin").build(),
            move |result| {
                let _ = tx.send(result);
            },
        )
        .unwrap();

    let path = rx.recv_timeout(WAIT).unwrap().unwrap();
    assert_eq!(std::fs::read(&path).unwrap().len(), body.len());
    std::fs::remove_dir_all(&dir).unwrap();
    mock.assert();
}

#[test]
fn test_connection_refused() {
    let err = client()
        .execute_blocking(
            RequestBuilder::get("http://127.0.0.1:9/unreachable").build(),
            ResponseShape::Text,
        )
        .unwrap_err();
    assert_eq!(err.code(), 0);
    assert_eq!(err.detail(), Some(ErrorDetail::Connection));
}
