use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

pub mod custom;
pub mod encoding;
pub mod synochat;
pub mod webhook;

/// Every outbound call gives up after this long.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on response text kept for diagnostics.
pub const SNIPPET_LIMIT: usize = 200;

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Webhook call failed: {0}")]
    WebhookCallFailed(String),
    #[error("Synology Chat send failed: status={status}, error={snippet}")]
    SynologyChatSendFailed { status: u16, snippet: String },
    #[error("Synology Chat send failed: {0}")]
    SynologyChatUnavailable(String),
    #[error("Failed to encode payload: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

/// One client that validates certificates and one that does not, both with
/// the fixed send timeout. Picking per call keeps `verify_ssl=false` scoped
/// to that call.
#[derive(Clone)]
pub struct HttpClients {
    verified: Client,
    unverified: Client,
}

impl HttpClients {
    pub fn new() -> Result<Self, SenderError> {
        Self::with_timeout(SEND_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, SenderError> {
        Ok(Self {
            verified: Client::builder().timeout(timeout).build()?,
            unverified: Client::builder()
                .timeout(timeout)
                .danger_accept_invalid_certs(true)
                .build()?,
        })
    }

    pub fn get(&self, verify_ssl: bool) -> &Client {
        if verify_ssl {
            &self.verified
        } else {
            &self.unverified
        }
    }
}

/// Hides the query string (where chat webhooks keep their token) before a
/// URL goes anywhere near a log line.
pub fn mask_url(url: &str) -> String {
    let without_fragment = url.split_once('#').map_or(url, |(base, _)| base);
    match without_fragment.split_once('?') {
        Some((base, query)) if !query.is_empty() => format!("{base}?***masked***"),
        Some((base, _)) => base.to_string(),
        None => without_fragment.to_string(),
    }
}

/// First [`SNIPPET_LIMIT`] characters of `text`.
pub fn truncate_snippet(text: &str) -> String {
    text.chars().take(SNIPPET_LIMIT).collect()
}

#[cfg(test)]
pub(crate) mod test_server {
    //! A local HTTP endpoint standing in for chat services and webhooks.

    use axum::{
        Router,
        body::Bytes,
        extract::State,
        http::{HeaderMap, StatusCode, header},
        routing::post,
    };
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Debug, Clone)]
    pub struct RecordedRequest {
        pub content_type: String,
        pub body: String,
    }

    #[derive(Clone)]
    struct Reply {
        status: StatusCode,
        body: String,
        delay: Duration,
        requests: Arc<Mutex<Vec<RecordedRequest>>>,
    }

    pub struct TestServer {
        pub base_url: String,
        requests: Arc<Mutex<Vec<RecordedRequest>>>,
    }

    impl TestServer {
        pub async fn start(status: u16, body: &str) -> Self {
            Self::start_with_delay(status, body, Duration::ZERO).await
        }

        pub async fn start_with_delay(status: u16, body: &str, delay: Duration) -> Self {
            let requests = Arc::new(Mutex::new(Vec::new()));
            let reply = Reply {
                status: StatusCode::from_u16(status).unwrap(),
                body: body.to_string(),
                delay,
                requests: requests.clone(),
            };
            let app = Router::new()
                .route("/{*path}", post(handle))
                .with_state(reply);
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });
            Self { base_url: format!("http://{addr}"), requests }
        }

        pub fn url(&self, path: &str) -> String {
            format!("{}{}", self.base_url, path)
        }

        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    async fn handle(
        State(reply): State<Reply>,
        headers: HeaderMap,
        body: Bytes,
    ) -> (StatusCode, String) {
        reply.requests.lock().unwrap().push(RecordedRequest {
            content_type: headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string(),
            body: String::from_utf8_lossy(&body).to_string(),
        });
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        (reply.status, reply.body.clone())
    }
}
