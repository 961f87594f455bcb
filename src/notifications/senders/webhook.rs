use tracing::info;

use super::encoding::{ChannelKind, post_encoded};
use super::{HttpClients, SenderError, mask_url};

/// Posts a rendered JSON document to a task's webhook.
#[derive(Clone)]
pub struct WebhookSender {
    clients: HttpClients,
}

impl WebhookSender {
    pub fn new(clients: HttpClients) -> Self {
        Self { clients }
    }

    /// Any transport error or non-2xx status is a [`SenderError::WebhookCallFailed`].
    pub async fn call(&self, url: &str, payload: &str) -> Result<(), SenderError> {
        let response = post_encoded(self.clients.get(true), url, ChannelKind::Webhook, payload)
            .await
            .map_err(|e| SenderError::WebhookCallFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(SenderError::WebhookCallFailed(format!(
                "Webhook returned non-success status: {status}. Body: {error_body}"
            )));
        }

        info!(url = %mask_url(url), status = status.as_u16(), "Webhook called");
        Ok(())
    }
}
