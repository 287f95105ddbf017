// Master Link - typed requests over a Transport
//
// Every reply is first read as a status envelope {successful, message}; only
// a successful envelope is parsed again into the typed payload. Failures at
// either level go to an ErrorHandler instead of aborting the caller.

use crate::transport::{Request, Transport, TransportError};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// ENVELOPE
// ============================================================================

/// Generic status envelope carried by every reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEnvelope {
    pub successful: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusEnvelope {
    pub fn ok() -> Self {
        Self {
            successful: true,
            message: None,
        }
    }

    pub fn failed(message: &str) -> Self {
        Self {
            successful: false,
            message: Some(message.to_string()),
        }
    }
}

/// Malformed or rejected replies
#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    #[error("Reply is not a status envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Request failed: {0}")]
    Rejected(String),

    #[error("Unexpected payload: {0}")]
    UnexpectedPayload(String),

    #[error("Encoding failed: {0}")]
    Encoding(String),
}

/// Either level of failure on a master request
#[derive(Debug, Clone, Error)]
pub enum LinkError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl LinkError {
    /// Whether the master explicitly answered `successful = false`
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Protocol(ProtocolError::Rejected(_)))
    }
}

/// Parse a reply body through the two-level success model
pub fn parse_reply<T: DeserializeOwned>(body: &str) -> Result<T, ProtocolError> {
    let envelope: StatusEnvelope = serde_json::from_str(body)
        .map_err(|e| ProtocolError::MalformedEnvelope(e.to_string()))?;

    if !envelope.successful {
        return Err(ProtocolError::Rejected(
            envelope.message.unwrap_or_else(|| "no reason given".to_string()),
        ));
    }

    serde_json::from_str(body).map_err(|e| ProtocolError::UnexpectedPayload(e.to_string()))
}

// ============================================================================
// ERROR HANDLER
// ============================================================================

/// Receives request failures in place of the caller
#[derive(Clone)]
pub struct ErrorHandler(Arc<dyn Fn(&LinkError) + Send + Sync>);

impl ErrorHandler {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&LinkError) + Send + Sync + 'static,
    {
        Self(Arc::new(handler))
    }

    /// Forward to the log at error level (the default)
    pub fn log(origin: &'static str) -> Self {
        Self::new(move |error| tracing::error!(origin, %error, "master request failed"))
    }

    /// Record at debug level only
    pub fn quiet(origin: &'static str) -> Self {
        Self::new(move |error| tracing::debug!(origin, %error, "master request failed"))
    }

    pub fn handle(&self, error: &LinkError) {
        (self.0)(error)
    }
}

impl fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ErrorHandler(..)")
    }
}

// ============================================================================
// MASTER LINK
// ============================================================================

/// Whether a request carries the session token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Auth {
    Bearer,
    Anonymous,
}

struct LinkInner {
    transport: Arc<dyn Transport>,
    session_token: RwLock<Option<String>>,
}

/// Shared handle for typed requests to the master
#[derive(Clone)]
pub struct MasterLink {
    inner: Arc<LinkInner>,
}

impl MasterLink {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(LinkInner {
                transport,
                session_token: RwLock::new(None),
            }),
        }
    }

    /// Install the token sent as `Authorization: Bearer`
    pub fn set_session_token(&self, token: &str) {
        *self.inner.session_token.write() = Some(token.to_string());
    }

    pub fn clear_session_token(&self) {
        self.inner.session_token.write().take();
    }

    pub fn session_token(&self) -> Option<String> {
        self.inner.session_token.read().clone()
    }

    /// Release the underlying transport's resources
    pub async fn release(&self) {
        self.inner.transport.release().await;
    }

    fn authorize(&self, request: Request, auth: Auth) -> Request {
        match (auth, self.session_token()) {
            (Auth::Bearer, Some(token)) => request.with_bearer(&token),
            _ => request,
        }
    }

    /// Send a prepared request and parse the reply; errors are returned
    pub async fn send<T: DeserializeOwned>(
        &self,
        request: Request,
        auth: Auth,
    ) -> Result<T, LinkError> {
        let request = self.authorize(request, auth);
        let response = self.inner.transport.exchange(request).await?;
        Ok(parse_reply(&response.body)?)
    }

    /// GET `path`; errors are returned
    pub async fn try_get<T: DeserializeOwned>(&self, path: &str, auth: Auth) -> Result<T, LinkError> {
        self.send(Request::get(path), auth).await
    }

    /// POST `body` as JSON to `path`; errors are returned
    pub async fn try_post<T, B>(&self, path: &str, body: &B, auth: Auth) -> Result<T, LinkError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let text =
            serde_json::to_string(body).map_err(|e| ProtocolError::Encoding(e.to_string()))?;
        self.send(Request::post(path, text), auth).await
    }

    /// Authenticated GET; failures go to `handler` and yield `None`
    pub async fn get<T: DeserializeOwned>(&self, path: &str, handler: &ErrorHandler) -> Option<T> {
        self.try_get(path, Auth::Bearer)
            .await
            .map_err(|e| handler.handle(&e))
            .ok()
    }

    /// Authenticated POST; failures go to `handler` and yield `None`
    pub async fn post<T, B>(&self, path: &str, body: &B, handler: &ErrorHandler) -> Option<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.try_post(path, body, Auth::Bearer)
            .await
            .map_err(|e| handler.handle(&e))
            .ok()
    }

    /// Authenticated request with a prepared `Request`; failures go to `handler`
    pub async fn request<T: DeserializeOwned>(
        &self,
        request: Request,
        handler: &ErrorHandler,
    ) -> Option<T> {
        self.send(request, Auth::Bearer)
            .await
            .map_err(|e| handler.handle(&e))
            .ok()
    }
}
