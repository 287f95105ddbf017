// HTTP Transport Implementation
// Reaches the master over HTTP using reqwest

use crate::transport::{
    Method, Request, Response, StatusEnvelope, Transport, TransportConfig, TransportError,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};

/// HTTP transport rooted at the master's base URL
pub struct HttpTransport {
    base_url: String,
    config: TransportConfig,
    client: Mutex<Option<reqwest::Client>>,
}

impl HttpTransport {
    pub fn new(base_url: &str, config: TransportConfig) -> Result<Self, TransportError> {
        config.validate()?;
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(TransportError::InvalidAddress(base_url.to_string()));
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            config,
            client: Mutex::new(None),
        })
    }

    /// Base URL every request path is appended to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether a connection pool is currently held
    pub fn is_active(&self) -> bool {
        self.client.lock().is_some()
    }

    fn client(&self) -> Result<reqwest::Client, TransportError> {
        let mut slot = self.client.lock();
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }

        let client = reqwest::Client::builder()
            .timeout(self.config.request_timeout())
            .connect_timeout(self.config.connect_timeout())
            .user_agent(self.config.user_agent.clone())
            .build()
            .map_err(|e| TransportError::InvalidConfig(e.to_string()))?;
        *slot = Some(client.clone());
        Ok(client)
    }

    fn map_error(error: reqwest::Error) -> TransportError {
        if error.is_timeout() {
            TransportError::Timeout
        } else if error.is_connect() {
            TransportError::ConnectionFailed(error.to_string())
        } else {
            TransportError::ReceiveFailed(error.to_string())
        }
    }

    /// Decide whether a raw reply is handed up or is an HTTP failure.
    ///
    /// The master answers failures with an envelope too, so a non-2xx reply
    /// passes through when its body parses as one. Anything else outside
    /// 2xx (an empty body, a proxy's error page) is a status error.
    fn classify(status: u16, body: String) -> Result<Response, TransportError> {
        if !(200..300).contains(&status)
            && serde_json::from_str::<StatusEnvelope>(&body).is_err()
        {
            return Err(TransportError::Status { status });
        }
        Ok(Response::new(status, body))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn exchange(&self, request: Request) -> Result<Response, TransportError> {
        let client = self.client()?;
        let url = format!("{}{}", self.base_url, request.path());

        let mut builder = match request.method() {
            Method::Get => client.get(&url),
            Method::Post => client.post(&url),
        };

        if !request.query().is_empty() {
            builder = builder.query(request.query());
        }
        if let Some(token) = request.bearer() {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body() {
            tracing::trace!(target: "cluster_link::transport", "<<< {} {} {}", request.method(), url, body);
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(body.to_string());
        }

        let reply = builder.send().await.map_err(Self::map_error)?;
        let status = reply.status().as_u16();
        let body = reply.text().await.map_err(Self::map_error)?;
        tracing::trace!(target: "cluster_link::transport", ">>> {} {} [{}] {}", request.method(), url, status, body);

        Self::classify(status, body)
    }

    async fn release(&self) {
        // Dropping the client closes its idle pooled connections
        self.client.lock().take();
    }
}
