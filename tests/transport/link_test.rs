// Master Link Tests
// Tests for typed requests, bearer handling and error handlers

use async_trait::async_trait;
use cluster_link::transport::{
    Auth, ErrorHandler, HttpTransport, LinkError, MasterLink, Method, Request, Response,
    Transport, TransportConfig, TransportError,
};
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Replies with a fixed body and records every request
struct Scripted {
    reply: Result<String, TransportError>,
    seen: Mutex<Vec<Request>>,
    released: AtomicUsize,
}

impl Scripted {
    fn replying(body: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(body.to_string()),
            seen: Mutex::new(Vec::new()),
            released: AtomicUsize::new(0),
        })
    }

    fn failing(error: TransportError) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(error),
            seen: Mutex::new(Vec::new()),
            released: AtomicUsize::new(0),
        })
    }

    fn last(&self) -> Request {
        self.seen.lock().last().cloned().unwrap()
    }
}

#[async_trait]
impl Transport for Scripted {
    async fn exchange(&self, request: Request) -> Result<Response, TransportError> {
        self.seen.lock().push(request);
        self.reply.clone().map(Response::ok)
    }

    async fn release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Deserialize)]
struct Value {
    value: u32,
}

fn counting_handler() -> (ErrorHandler, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = count.clone();
    let handler = ErrorHandler::new(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    (handler, count)
}

// ============================================================================
// REQUEST SHAPING
// ============================================================================

#[test]
fn test_request_builders() {
    let request = Request::get("/sync")
        .with_query("key", "round")
        .with_bearer("tok")
        .with_header("X-Trace", "1");

    assert_eq!(request.method(), Method::Get);
    assert_eq!(request.path(), "/sync");
    assert_eq!(request.query_param("key"), Some("round"));
    assert_eq!(request.query_param("missing"), None);
    assert_eq!(request.bearer(), Some("tok"));
    assert_eq!(request.body(), None);
    assert_eq!(request.headers().len(), 1);
}

#[tokio::test]
async fn test_bearer_attached_only_when_token_set() {
    let transport = Scripted::replying(r#"{"successful":true,"value":1}"#);
    let link = MasterLink::new(transport.clone());

    let _: Value = link.try_get("/ping", Auth::Bearer).await.unwrap();
    assert_eq!(transport.last().bearer(), None);

    link.set_session_token("session-1");
    let _: Value = link.try_get("/ping", Auth::Bearer).await.unwrap();
    assert_eq!(transport.last().bearer(), Some("session-1"));

    let _: Value = link.try_post("/handshake", &1u8, Auth::Anonymous).await.unwrap();
    assert_eq!(transport.last().bearer(), None);
    assert_eq!(transport.last().method(), Method::Post);
    assert_eq!(transport.last().body(), Some("1"));

    link.clear_session_token();
    assert_eq!(link.session_token(), None);
}

// ============================================================================
// ERROR HANDLERS
// ============================================================================

#[tokio::test]
async fn test_success_does_not_invoke_handler() {
    let link = MasterLink::new(Scripted::replying(r#"{"successful":true,"value":9}"#));
    let (handler, count) = counting_handler();

    let reply: Option<Value> = link.get("/x", &handler).await;

    assert_eq!(reply.map(|v| v.value), Some(9));
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_rejection_invokes_handler_once() {
    let link = MasterLink::new(Scripted::replying(r#"{"successful":false,"message":"no"}"#));
    let captured: Arc<Mutex<Option<LinkError>>> = Arc::new(Mutex::new(None));
    let sink = captured.clone();
    let handler = ErrorHandler::new(move |e| *sink.lock() = Some(e.clone()));

    let reply: Option<Value> = link.post("/x", &"body", &handler).await;

    assert!(reply.is_none());
    assert!(captured.lock().as_ref().unwrap().is_rejection());
}

#[tokio::test]
async fn test_transport_failure_invokes_handler() {
    let link = MasterLink::new(Scripted::failing(TransportError::Timeout));
    let (handler, count) = counting_handler();

    let reply: Option<Value> = link.request(Request::get("/x"), &handler).await;

    assert!(reply.is_none());
    assert_eq!(count.load(Ordering::SeqCst), 1);

    let error = link.try_get::<Value>("/x", Auth::Bearer).await.unwrap_err();
    assert!(matches!(error, LinkError::Transport(TransportError::Timeout)));
    assert!(!error.is_rejection());
}

#[tokio::test]
async fn test_release_reaches_transport() {
    let transport = Scripted::replying("{}");
    let link = MasterLink::new(transport.clone());

    link.release().await;
    link.release().await;

    assert_eq!(transport.released.load(Ordering::SeqCst), 2);
}

// ============================================================================
// HTTP TRANSPORT
// ============================================================================

#[test]
fn test_http_transport_rejects_bad_base_url() {
    assert!(matches!(
        HttpTransport::new("master:8880", TransportConfig::default()),
        Err(TransportError::InvalidAddress(_))
    ));
}

#[test]
fn test_http_transport_trims_trailing_slash() {
    let transport = HttpTransport::new("http://master:8880/", TransportConfig::default()).unwrap();

    assert_eq!(transport.base_url(), "http://master:8880");
    assert!(!transport.is_active());
}

#[test]
fn test_transport_config_builders() {
    let config = TransportConfig::new()
        .with_request_timeout(Duration::from_secs(3))
        .with_connect_timeout(Duration::from_secs(1));

    assert_eq!(config.request_timeout(), Duration::from_secs(3));
    assert_eq!(config.connect_timeout(), Duration::from_secs(1));
    assert!(config.validate().is_ok());
    assert!(TransportConfig::new()
        .with_request_timeout(Duration::ZERO)
        .validate()
        .is_err());
}

#[tokio::test]
async fn test_http_transport_unreachable_master() {
    let config = TransportConfig::new()
        .with_request_timeout(Duration::from_millis(500))
        .with_connect_timeout(Duration::from_millis(200));
    let transport = HttpTransport::new("http://127.0.0.1:1", config).unwrap();

    let result = transport.exchange(Request::get("/ping")).await;

    assert!(result.is_err());
    transport.release().await;
    assert!(!transport.is_active());
}
