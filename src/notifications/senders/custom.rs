use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use super::encoding::{ChannelKind, post_encoded};
use super::synochat::SynologyNotifier;
use super::{HttpClients, SenderError, mask_url};

lazy_static! {
    static ref SYNOLOGY_CHAT_URL: Regex =
        Regex::new(r"(?i)/webapi/entry\.cgi\?.*\bapi=SYNO\.Chat\.External\b")
            .expect("valid regex");
}

/// Whether `url` is a Synology Chat incoming webhook.
pub fn is_synology_chat_url(url: &str) -> bool {
    SYNOLOGY_CHAT_URL.is_match(url)
}

/// `[title]\ntext`, or just the text when there is no title.
pub fn compose_message(title: &str, text: &str) -> String {
    if title.is_empty() {
        text.to_string()
    } else {
        format!("[{title}]\n{text}")
    }
}

/// Delivers direct messages, picking the wire format from the URL.
#[derive(Clone)]
pub struct DirectMessageDispatcher {
    clients: HttpClients,
    synology: SynologyNotifier,
}

impl DirectMessageDispatcher {
    pub fn new(clients: HttpClients, synology: SynologyNotifier) -> Self {
        Self { clients, synology }
    }

    pub async fn notify(&self, url: Option<&str>, title: &str, text: &str) -> Result<(), SenderError> {
        let Some(url) = url.filter(|u| !u.trim().is_empty()) else {
            warn!(title, "No webhook URL configured, direct message not delivered");
            return Ok(());
        };

        if is_synology_chat_url(url) {
            self.synology.notify(Some(url), title, text).await?;
            return Ok(());
        }

        let message = compose_message(title, text);
        // Generic chat webhooks are frequently self-hosted with self-signed certificates.
        let response = post_encoded(self.clients.get(false), url, ChannelKind::CustomJson, &message)
            .await
            .map_err(|e| SenderError::WebhookCallFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(SenderError::WebhookCallFailed(format!(
                "Custom webhook returned HTTP {status}: {error_body}"
            )));
        }

        info!(url = %mask_url(url), "Direct message sent");
        Ok(())
    }
}
