//! Dispatcher scenarios against a scripted transport.

use crate::error::{DispatchError, ErrorDetail, RequestError};
use crate::image::{DecodeOptions, Image, PixelFormat};
use crate::transport::{RawResponse, Transport, TransportError, TransportRequest};
use crate::{Client, ClientConfig, Executor, Job, Priority, RequestBuilder, ResponseShape, Tag};
use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

#[derive(Clone)]
struct Route {
    status: u16,
    body: Bytes,
    delay: Duration,
}

/// Transport answering from a fixed route table.
#[derive(Clone, Default)]
struct ScriptedTransport {
    routes: Arc<HashMap<String, Route>>,
    calls: Arc<AtomicUsize>,
    last: Arc<Mutex<Option<TransportRequest>>>,
}

impl ScriptedTransport {
    fn new(routes: &[(&str, u16, &str, u64)]) -> Self {
        let routes = routes
            .iter()
            .map(|(path, status, body, delay_ms)| {
                (
                    path.to_string(),
                    Route {
                        status: *status,
                        body: Bytes::from(body.to_string()),
                        delay: Duration::from_millis(*delay_ms),
                    },
                )
            })
            .collect();
        ScriptedTransport {
            routes: Arc::new(routes),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn perform(&self, request: TransportRequest) -> Result<RawResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock() = Some(request.clone());

        let route = self
            .routes
            .get(request.url.path())
            .cloned()
            .ok_or_else(|| TransportError::Connect(format!("no route for {}", request.url)))?;

        let sent = request.body.as_ref().map(|b| b.bytes.len() as u64);
        if let (Some(progress), Some(total)) = (&request.upload_progress, sent) {
            progress(total * 6 / 10, total);
        }
        tokio::time::sleep(route.delay).await;
        if let (Some(progress), Some(total)) = (&request.upload_progress, sent) {
            progress(total, total);
        }

        let mut headers = HeaderMap::new();
        headers.insert(http::header::CONTENT_LENGTH, route.body.len().into());
        let status = StatusCode::from_u16(route.status).map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(RawResponse::from_bytes(status, headers, route.body))
    }
}

/// Transport that never produces a response.
struct SilentTransport;

#[async_trait]
impl Transport for SilentTransport {
    async fn perform(&self, _request: TransportRequest) -> Result<RawResponse, TransportError> {
        Err(TransportError::NoResponse)
    }
}

fn small_config() -> ClientConfig {
    ClientConfig {
        network_threads: 2,
        immediate_threads: 1,
        transfer_threads: 1,
        ..Default::default()
    }
}

fn client_with<T: Transport>(transport: T) -> Client {
    init_tracing();
    Client::builder()
        .config(small_config())
        .transport(transport)
        .build()
        .unwrap()
}

fn posts() -> ScriptedTransport {
    ScriptedTransport::new(&[
        ("/posts/1", 200, r#"{"id":1}"#, 0),
        ("/posts", 200, r#"[{"id":1},{"id":2}]"#, 0),
        ("/missing", 404, r#"{"error":"not found"}"#, 0),
        ("/text", 200, "hello", 0),
        ("/slow", 200, "late", 10_000),
        ("/upload", 200, "stored", 300),
        ("/slow-upload", 200, "stored", 10_000),
    ])
}

fn channel<T: Send + 'static>() -> (impl FnOnce(T) + Send + 'static, mpsc::Receiver<T>) {
    let (tx, rx) = mpsc::channel();
    (
        move |value| {
            let _ = tx.send(value);
        },
        rx,
    )
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[derive(Debug, Deserialize, PartialEq)]
struct Post {
    id: u64,
}

#[derive(Debug, PartialEq)]
struct Screen(u32);

// ========== End to end ==========

#[test]
fn test_json_object_delivered() {
    let client = client_with(posts());
    let (done, rx) = channel();
    client
        .get_as_json_object(RequestBuilder::get("http://api.test/posts/{id}").path_param("id", "1").build(), done)
        .unwrap();

    let object = rx.recv_timeout(WAIT).unwrap().unwrap();
    assert_eq!(serde_json::Value::Object(object), json!({"id": 1}));
    assert!(wait_until(|| client.in_flight() == 0));
}

#[test]
fn test_not_found_delivers_server_error() {
    let client = client_with(posts());
    let (done, rx) = channel();
    client
        .get_as_json_object(RequestBuilder::get("http://api.test/missing").build(), done)
        .unwrap();

    let err = rx.recv_timeout(WAIT).unwrap().unwrap_err();
    assert_eq!(err.code(), 404);
    assert_eq!(err.detail(), Some(ErrorDetail::Server));
    assert_eq!(err.body(), Some(r#"{"error":"not found"}"#));
    assert_eq!(err.meta().map(|m| m.status), Some(StatusCode::NOT_FOUND));
}

#[test]
fn test_cancel_mid_flight() {
    let client = client_with(posts());
    let (done, rx) = channel();
    let handle = client
        .get_as_string(RequestBuilder::get("http://api.test/slow").tag("slow").build(), done)
        .unwrap();

    assert!(wait_until(|| client.is_request_running("slow")));
    client.cancel("slow");

    let err = rx.recv_timeout(WAIT).unwrap().unwrap_err();
    assert_eq!(err.code(), 0);
    assert_eq!(err.detail(), Some(ErrorDetail::Cancelled));
    assert!(handle.is_cancelled());
    assert!(!client.is_request_running("slow"));
    assert_eq!(client.in_flight(), 0);
}

#[test]
fn test_typed_results() {
    let client = client_with(posts());

    let (done, rx) = channel();
    client
        .get_as_parsed::<Post, _>(RequestBuilder::get("http://api.test/posts/1").build(), done)
        .unwrap();
    assert_eq!(rx.recv_timeout(WAIT).unwrap().unwrap(), Post { id: 1 });

    let (done, rx) = channel();
    client
        .get_as_json_array(RequestBuilder::get("http://api.test/posts").build(), done)
        .unwrap();
    assert_eq!(rx.recv_timeout(WAIT).unwrap().unwrap().len(), 2);

    let (done, rx) = channel();
    client
        .get_as_string(RequestBuilder::get("http://api.test/text").build(), done)
        .unwrap();
    assert_eq!(rx.recv_timeout(WAIT).unwrap().unwrap(), "hello");
}

#[test]
fn test_shape_mismatch_is_single_parse_error() {
    let client = client_with(posts());
    let calls = Arc::new(AtomicUsize::new(0));
    let (done, rx) = channel();
    let counter = Arc::clone(&calls);
    client
        .get_as_parsed::<Vec<Post>, _>(RequestBuilder::get("http://api.test/posts/1").build(), move |r| {
            counter.fetch_add(1, Ordering::SeqCst);
            done(r)
        })
        .unwrap();

    let err = rx.recv_timeout(WAIT).unwrap().unwrap_err();
    assert_eq!(err.detail(), Some(ErrorDetail::Parse));
    assert_eq!(err.code(), 0);
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let (done, rx) = channel();
    client
        .get_as_json_array(RequestBuilder::get("http://api.test/text").build(), done)
        .unwrap();
    assert_eq!(rx.recv_timeout(WAIT).unwrap().unwrap_err().detail(), Some(ErrorDetail::Parse));
}

#[test]
fn test_connection_errors() {
    let client = client_with(posts());
    let (done, rx) = channel();
    client
        .get_as_string(RequestBuilder::get("http://api.test/unknown").build(), done)
        .unwrap();
    let err = rx.recv_timeout(WAIT).unwrap().unwrap_err();
    assert_eq!(err.detail(), Some(ErrorDetail::Connection));
    assert_eq!(err.code(), 0);

    let client = client_with(SilentTransport);
    let (done, rx) = channel();
    client
        .get_as_string(RequestBuilder::get("http://api.test/").build(), done)
        .unwrap();
    assert_eq!(rx.recv_timeout(WAIT).unwrap().unwrap_err().detail(), Some(ErrorDetail::Connection));
}

#[test]
fn test_raw_shape_skips_status_classification() {
    let client = client_with(posts());
    let (done, rx) = channel();
    client
        .get_as_raw(RequestBuilder::get("http://api.test/missing").build(), done)
        .unwrap();
    let mut raw = rx.recv_timeout(WAIT).unwrap().unwrap();
    assert_eq!(raw.status(), StatusCode::NOT_FOUND);
    let body = tokio_test::block_on(raw.text()).unwrap();
    assert_eq!(body, r#"{"error":"not found"}"#);
}

#[test]
fn test_prefetch_finishes_silently() {
    let transport = posts();
    let calls = Arc::clone(&transport.calls);
    let client = client_with(transport);
    let handle = client.prefetch(RequestBuilder::get("http://api.test/text").build()).unwrap();
    assert!(wait_until(|| handle.is_delivered()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(wait_until(|| client.in_flight() == 0));
}

#[test]
fn test_image_requests_use_decoder() {
    init_tracing();
    let client = Client::builder()
        .config(small_config())
        .transport(posts())
        .image_decoder(|bytes: &[u8], options: &DecodeOptions| {
            Ok::<_, String>(Image {
                width: options.max_width,
                height: bytes.len() as u32,
                format: PixelFormat::Alpha8,
                pixels: Bytes::copy_from_slice(bytes),
            })
        })
        .build()
        .unwrap();

    let (done, rx) = channel();
    let options = DecodeOptions {
        max_width: 32,
        ..Default::default()
    };
    client
        .get_as_image(RequestBuilder::get("http://api.test/text").decode_options(options).build(), done)
        .unwrap();
    let image = rx.recv_timeout(WAIT).unwrap().unwrap();
    assert_eq!((image.width, image.height), (32, 5));

    let client = client_with(posts());
    let (done, rx) = channel();
    client
        .get_as_image(RequestBuilder::get("http://api.test/text").build(), done)
        .unwrap();
    assert_eq!(rx.recv_timeout(WAIT).unwrap().unwrap_err().detail(), Some(ErrorDetail::Parse));
}

// ========== Cancellation ==========

#[test]
fn test_tag_filtering() {
    let client = client_with(posts());
    let (string_done, string_rx) = channel();
    let (typed_done, typed_rx) = channel();

    client
        .get_as_string(RequestBuilder::get("http://api.test/slow").tag("feed").build(), string_done)
        .unwrap();
    client
        .get_as_string(
            RequestBuilder::get("http://api.test/slow").tag(Tag::new(Screen(1))).build(),
            typed_done,
        )
        .unwrap();
    assert!(wait_until(|| client.is_request_running("feed")));
    assert!(wait_until(|| client.is_request_running(Tag::new(Screen(1)))));

    client.cancel(Tag::new(Screen(2)));
    client.cancel(String::from("other"));
    assert_eq!(client.in_flight(), 2);

    client.cancel(Tag::new(Screen(1)));
    assert!(typed_rx.recv_timeout(WAIT).unwrap().unwrap_err().is_cancelled());
    assert!(string_rx.try_recv().is_err());
    assert!(client.is_request_running(String::from("feed")));

    client.cancel_all();
    assert!(string_rx.recv_timeout(WAIT).unwrap().unwrap_err().is_cancelled());
    assert_eq!(client.in_flight(), 0);
}

#[test]
fn test_threshold_protects_upload_until_forced() {
    let client = client_with(posts());
    let (done, rx) = channel();
    let handle = client
        .get_as_string(
            RequestBuilder::upload("http://api.test/slow-upload")
                .multipart_param("name", "report")
                .tag("upload")
                .cancel_threshold(50)
                .build(),
            done,
        )
        .unwrap();

    assert!(wait_until(|| handle.progress() >= 50));
    client.cancel("upload");
    assert!(!handle.is_cancelled());
    assert!(client.is_request_running("upload"));

    client.force_cancel("upload");
    assert!(rx.recv_timeout(WAIT).unwrap().unwrap_err().is_cancelled());
}

#[test]
fn test_upload_progress_and_completion() {
    let client = client_with(posts());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let (done, rx) = channel();

    client
        .get_as_string(
            RequestBuilder::upload("http://api.test/upload")
                .multipart_param("name", "report")
                .on_upload_progress(move |sent, total| sink.lock().push((sent, total)))
                .build(),
            done,
        )
        .unwrap();

    assert_eq!(rx.recv_timeout(WAIT).unwrap().unwrap(), "stored");
    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1].0, seen[1].1);
    assert!(seen[0].0 < seen[1].0);
}

#[test]
fn test_handle_cancel_before_start() {
    let client = client_with(posts());
    let (done, rx) = channel();
    let handle = client
        .get_as_string(RequestBuilder::get("http://api.test/slow").build(), done)
        .unwrap();
    handle.cancel(false);
    assert!(rx.recv_timeout(WAIT).unwrap().unwrap_err().is_cancelled());
    assert!(handle.is_delivered());
}

// ========== Scheduling ==========

#[test]
fn test_immediate_not_queued_behind_network_pool() {
    init_tracing();
    let client = Client::builder()
        .config(ClientConfig {
            network_threads: 1,
            immediate_threads: 1,
            transfer_threads: 1,
            ..Default::default()
        })
        .transport(posts())
        .build()
        .unwrap();

    let (slow_done, _slow_rx) = channel();
    client
        .get_as_string(
            RequestBuilder::get("http://api.test/slow").priority(Priority::Low).tag("bulk").build(),
            slow_done,
        )
        .unwrap();
    assert!(wait_until(|| client.is_request_running("bulk")));

    let (queued_done, queued_rx) = channel();
    client
        .get_as_string(
            RequestBuilder::get("http://api.test/text").priority(Priority::High).tag("bulk").build(),
            queued_done,
        )
        .unwrap();

    let (fast_done, fast_rx) = channel();
    client
        .get_as_string(
            RequestBuilder::get("http://api.test/text").priority(Priority::Immediate).build(),
            fast_done,
        )
        .unwrap();

    assert_eq!(fast_rx.recv_timeout(WAIT).unwrap().unwrap(), "hello");
    assert!(queued_rx.recv_timeout(Duration::from_millis(200)).is_err());

    client.force_cancel_all();
    assert!(queued_rx.recv_timeout(WAIT).unwrap().unwrap_err().is_cancelled());
}

#[test]
fn test_sequence_numbers_unique_under_concurrency() {
    let client = client_with(posts());
    let threads: Vec<_> = (0..8)
        .map(|_| {
            let client = client.clone();
            std::thread::spawn(move || {
                (0..25)
                    .map(|_| {
                        client
                            .prefetch(RequestBuilder::get("http://api.test/text").build())
                            .unwrap()
                            .sequence()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut all = Vec::new();
    for thread in threads {
        let sequences = thread.join().unwrap();
        assert!(sequences.windows(2).all(|w| w[0] < w[1]));
        all.extend(sequences);
    }
    all.sort_unstable();
    all.dedup();
    assert_eq!(all.len(), 200);
}

#[test]
fn test_executor_override_receives_callbacks() {
    let client = client_with(posts());
    let posted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&posted);
    let inline: Arc<dyn Executor> = Arc::new(move |job: Job| {
        counter.fetch_add(1, Ordering::SeqCst);
        job()
    });

    let (done, rx) = channel();
    client
        .get_as_string(RequestBuilder::get("http://api.test/text").executor(inline).build(), done)
        .unwrap();
    assert_eq!(rx.recv_timeout(WAIT).unwrap().unwrap(), "hello");
    assert_eq!(posted.load(Ordering::SeqCst), 1);
}

#[test]
fn test_callbacks_delivered_on_delivery_thread() {
    let client = client_with(posts());
    let (done, rx) = channel();
    client
        .submit(
            RequestBuilder::get("http://api.test/text").build(),
            ResponseShape::Text,
            move |_| done(std::thread::current().name().map(str::to_string)),
        )
        .unwrap();
    assert_eq!(rx.recv_timeout(WAIT).unwrap().as_deref(), Some("relay-delivery"));
}

#[test]
fn test_submit_after_shutdown_rejected() {
    let client = client_with(posts());
    let (done, rx) = channel();
    client
        .get_as_string(RequestBuilder::get("http://api.test/upload").build(), done)
        .unwrap();
    client.shutdown();
    assert!(client.is_shut_down());

    let (late, late_rx) = channel::<Result<String, RequestError>>();
    let err = client
        .get_as_string(RequestBuilder::get("http://api.test/text").build(), late)
        .unwrap_err();
    assert!(matches!(err, DispatchError::ShutDown));

    assert_eq!(rx.recv_timeout(WAIT).unwrap().unwrap(), "stored");
    assert!(late_rx.recv_timeout(Duration::from_millis(50)).is_err());
}

// ========== Transport request ==========

#[test]
fn test_transport_sees_resolved_request() {
    let transport = posts();
    let last = Arc::clone(&transport.last);
    let client = client_with(transport);
    let (done, rx) = channel();
    client
        .get_as_string(
            RequestBuilder::get("http://api.test/text")
                .query_param("q", "rust")
                .header("X-Trace", "1")
                .user_agent("relay-test")
                .no_store()
                .build(),
            done,
        )
        .unwrap();
    rx.recv_timeout(WAIT).unwrap().unwrap();

    let seen = last.lock().clone().unwrap();
    assert_eq!(seen.url.as_str(), "http://api.test/text?q=rust");
    assert_eq!(seen.headers.get("x-trace").unwrap(), "1");
    assert_eq!(seen.user_agent.as_deref(), Some("relay-test"));
    assert_eq!(seen.cache_control.as_deref(), Some("no-store"));
    assert!(seen.body.is_none());
}

// ========== Downloads ==========

#[test]
fn test_download_writes_file_and_reports_progress() {
    let client = client_with(posts());
    let dir = std::env::temp_dir().join(format!("relay-download-{}", uuid::Uuid::new_v4()));
    let progress = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&progress);

    let (done, rx) = channel();
    let handle = client
        .start_download(
            RequestBuilder::download("http://api.test/posts", &dir, "posts.json")
                .on_download_progress(move |done, total| sink.lock().push((done, total)))
                .build(),
            done,
        )
        .unwrap();

    let path = rx.recv_timeout(WAIT).unwrap().unwrap();
    assert_eq!(path, dir.join("posts.json"));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), r#"[{"id":1},{"id":2}]"#);
    assert!(wait_until(|| !progress.lock().is_empty()));
    assert_eq!(progress.lock().last(), Some(&(19, 19)));
    assert_eq!(handle.progress(), 100);
    std::fs::remove_dir_all(&dir).unwrap();
}

// ========== Synchronous ==========

#[test]
fn test_execute_async() {
    let client = client_with(posts());
    let object = tokio_test::block_on(
        client.execute_for_json_object(RequestBuilder::get("http://api.test/posts/1").build()),
    )
    .unwrap();
    assert_eq!(object.get("id"), Some(&json!(1)));

    let err = tokio_test::block_on(client.execute_for_string(RequestBuilder::get("http://api.test/missing").build()))
        .unwrap_err();
    assert_eq!(err.code(), 404);
    assert_eq!(client.in_flight(), 0);
}

#[test]
fn test_execute_blocking() {
    let client = client_with(posts());
    let response = client
        .execute_blocking(RequestBuilder::get("http://api.test/posts/1").build(), ResponseShape::Parsed)
        .unwrap();
    assert_eq!(response.meta().map(|m| m.status), Some(StatusCode::OK));
    assert_eq!(response.into_parsed::<Post>().unwrap(), Post { id: 1 });
}

#[test]
fn test_execute_blocking_inside_runtime_task() {
    let client = client_with(posts());
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();

    let inner = client.clone();
    let text = runtime
        .block_on(runtime.spawn(async move {
            inner.execute_blocking(RequestBuilder::get("http://api.test/text").build(), ResponseShape::Text)
        }))
        .unwrap()
        .unwrap()
        .into_text()
        .unwrap();
    assert_eq!(text, "hello");
}

#[test]
fn test_execute_blocking_on_current_thread_runtime() {
    let client = client_with(posts());
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();

    let err = runtime
        .block_on(async {
            client.execute_blocking(RequestBuilder::get("http://api.test/missing").build(), ResponseShape::Text)
        })
        .unwrap_err();
    assert_eq!(err.code(), 404);
    assert_eq!(err.detail(), Some(ErrorDetail::Server));
}
