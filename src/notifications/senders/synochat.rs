use sea_orm::DatabaseConnection;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::encoding::{ChannelKind, post_encoded};
use super::{HttpClients, SenderError, mask_url, truncate_snippet};
use crate::db::services as db_services;
use crate::notifications::models::SendResult;

const UPDATE_HEADER: &str = "**WeRSS 更新公众号**";

/// Builds the feed-update summary pushed by the scheduler and the settings test send.
pub fn build_text(feeds: &[&str]) -> String {
    let mut text = UPDATE_HEADER.to_string();
    for feed in feeds {
        text.push_str("\n• ");
        text.push_str(feed);
    }
    text
}

/// Raw Synology Chat incoming-webhook client.
///
/// Never fails: transport problems come back as `status_code == 0` with the
/// error text as the snippet, HTTP responses come back as-is whatever the
/// status. Deciding what counts as success is left to the caller.
#[derive(Clone)]
pub struct SynochatSender {
    clients: HttpClients,
}

impl SynochatSender {
    pub fn new() -> Result<Self, SenderError> {
        Ok(Self { clients: HttpClients::new()? })
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, SenderError> {
        Ok(Self { clients: HttpClients::with_timeout(timeout)? })
    }

    pub async fn send(&self, text: &str, webhook_url: &str, verify_ssl: bool) -> SendResult {
        let masked_url = mask_url(webhook_url);
        info!(url = %masked_url, "Sending message to Synology Chat");

        let client = self.clients.get(verify_ssl);
        match post_encoded(client, webhook_url, ChannelKind::SynologyChat, text).await {
            Ok(response) => {
                let status_code = response.status().as_u16();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|e| format!("Failed to read response body: {e}"));
                let snippet = truncate_snippet(&body);
                if (200..300).contains(&status_code) {
                    info!(status = status_code, "Synology Chat message sent successfully");
                } else {
                    error!(status = status_code, snippet = %snippet, "Synology Chat message failed");
                }
                SendResult { status_code, snippet }
            }
            Err(SenderError::NetworkError(e)) if e.is_timeout() => {
                let message = "Synology Chat request timeout";
                error!(url = %masked_url, "{message}");
                SendResult { status_code: 0, snippet: truncate_snippet(message) }
            }
            Err(e) => {
                let message = format!("Synology Chat request failed: {e}");
                error!(url = %masked_url, "{message}");
                SendResult { status_code: 0, snippet: truncate_snippet(&message) }
            }
        }
    }
}

/// Synology Chat delivery for message tasks.
///
/// Fills in whatever the task leaves out from the stored channel settings
/// and turns a non-2xx result into an error.
#[derive(Clone)]
pub struct SynologyNotifier {
    sender: SynochatSender,
    db: DatabaseConnection,
}

impl SynologyNotifier {
    pub fn new(sender: SynochatSender, db: DatabaseConnection) -> Self {
        Self { sender, db }
    }

    pub async fn notify(
        &self,
        webhook_url: Option<&str>,
        title: &str,
        text: &str,
    ) -> Result<SendResult, SenderError> {
        let message = if title.is_empty() {
            text.to_string()
        } else {
            format!("{title}\n{text}")
        };

        let stored = db_services::load_synochat_settings(&self.db).await;

        let url = match webhook_url.filter(|u| !u.trim().is_empty()) {
            Some(url) => url.to_string(),
            None => match &stored {
                Ok(settings) => match settings.webhook.clone() {
                    Some(url) => {
                        debug!(url = %mask_url(&url), "Using stored Synology Chat webhook");
                        url
                    }
                    None => {
                        return Err(SenderError::SynologyChatUnavailable(
                            "Webhook URL not configured and none provided".to_string(),
                        ));
                    }
                },
                Err(e) => {
                    error!(error = %e, "Failed to read Synology Chat webhook setting");
                    return Err(SenderError::SynologyChatUnavailable(
                        "Database access error for webhook configuration".to_string(),
                    ));
                }
            },
        };

        let verify_ssl = match &stored {
            Ok(settings) => settings.verify_ssl,
            Err(e) => {
                warn!(error = %e, "Failed to read verify_ssl setting, verifying certificates");
                true
            }
        };

        let result = self.sender.send(&message, &url, verify_ssl).await;
        if !result.is_success() {
            return Err(SenderError::SynologyChatSendFailed {
                status: result.status_code,
                snippet: result.snippet,
            });
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, services::SynochatSettingsUpdate};
    use crate::notifications::senders::test_server::TestServer;

    const HOOK_PATH: &str = "/webapi/entry.cgi?api=SYNO.Chat.External&method=incoming&version=2&token=abc";

    fn decode_text(body: &str) -> String {
        let encoded = body.strip_prefix("payload=").unwrap();
        let json = urlencoding::decode(encoded).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value["text"].as_str().unwrap().to_string()
    }

    #[test]
    fn test_build_text() {
        assert_eq!(build_text(&[]), "**WeRSS 更新公众号**");
        assert_eq!(build_text(&["A", "B"]), "**WeRSS 更新公众号**\n• A\n• B");
    }

    #[tokio::test]
    async fn test_send_posts_form_encoded_payload() {
        let server = TestServer::start(200, r#"{"success":true}"#).await;
        let sender = SynochatSender::new().unwrap();

        let result = sender.send("hello 群晖", &server.url(HOOK_PATH), true).await;

        assert_eq!(result, SendResult { status_code: 200, snippet: r#"{"success":true}"#.to_string() });
        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].content_type, "application/x-www-form-urlencoded");
        assert_eq!(decode_text(&requests[0].body), "hello 群晖");
    }

    #[tokio::test]
    async fn test_send_truncates_error_body() {
        let body = "x".repeat(300);
        let server = TestServer::start(500, &body).await;
        let sender = SynochatSender::new().unwrap();

        let result = sender.send("hi", &server.url("/hook"), false).await;

        assert_eq!(result.status_code, 500);
        assert_eq!(result.snippet, "x".repeat(200));
    }

    #[tokio::test]
    async fn test_send_timeout_returns_status_zero() {
        let server = TestServer::start_with_delay(200, "late", Duration::from_secs(2)).await;
        let sender = SynochatSender::with_timeout(Duration::from_millis(200)).unwrap();

        let result = sender.send("hi", &server.url("/hook"), true).await;

        assert_eq!(result.status_code, 0);
        assert!(result.snippet.contains("timeout"));
    }

    #[tokio::test]
    async fn test_send_connection_error_returns_status_zero() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let sender = SynochatSender::new().unwrap();

        let result = sender.send("hi", &format!("http://{addr}/hook"), true).await;

        assert_eq!(result.status_code, 0);
        assert!(result.snippet.starts_with("Synology Chat request failed"));
        assert!(result.snippet.chars().count() <= 200);
    }

    #[tokio::test]
    async fn test_notify_prefixes_title_and_maps_failure() {
        let db = db::test_db().await;
        let ok_server = TestServer::start(200, "ok").await;
        let notifier = SynologyNotifier::new(SynochatSender::new().unwrap(), db.clone());

        notifier
            .notify(Some(&ok_server.url(HOOK_PATH)), "Feed 更新通知", "body")
            .await
            .unwrap();
        assert_eq!(decode_text(&ok_server.requests()[0].body), "Feed 更新通知\nbody");

        let failing = TestServer::start(403, "forbidden").await;
        let err = notifier
            .notify(Some(&failing.url(HOOK_PATH)), "", "body")
            .await
            .unwrap_err();
        assert!(matches!(err, SenderError::SynologyChatSendFailed { status: 403, .. }));
        assert_eq!(decode_text(&failing.requests()[0].body), "body");
    }

    #[tokio::test]
    async fn test_notify_falls_back_to_stored_webhook() {
        let db = db::test_db().await;
        let notifier = SynologyNotifier::new(SynochatSender::new().unwrap(), db.clone());

        let err = notifier.notify(None, "t", "x").await.unwrap_err();
        assert!(matches!(err, SenderError::SynologyChatUnavailable(_)));

        let server = TestServer::start(200, "ok").await;
        db_services::save_synochat_settings(
            &db,
            &SynochatSettingsUpdate {
                enabled: true,
                webhook: Some(server.url(HOOK_PATH)),
                verify_ssl: Some(false),
            },
        )
        .await
        .unwrap();

        let result = notifier.notify(Some("  "), "t", "x").await.unwrap();
        assert_eq!(result.status_code, 200);
        assert_eq!(server.requests().len(), 1);
    }
}
