//! Request body encodings, one per channel.
//!
//! A channel picks its encoding once via [`encoding_for`]; adding a channel
//! means adding a strategy here rather than another branch in a sender.

use reqwest::{Client, Response, header};
use serde::Serialize;

use super::SenderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Direct messages to a generic chat webhook: `{"text": ...}` as JSON.
    CustomJson,
    /// Generic webhooks: the rendered template is the body.
    Webhook,
    /// Synology Chat incoming webhooks: JSON wrapped in a form field.
    SynologyChat,
}

pub trait PayloadEncoding: Send + Sync {
    fn content_type(&self) -> &'static str;

    /// Turns the message text into the exact request body.
    fn encode(&self, text: &str) -> Result<String, SenderError>;
}

#[derive(Serialize)]
struct TextPayload<'a> {
    text: &'a str,
}

/// `{"text": "<message>"}`, `application/json`.
pub struct JsonTextPayload;

impl PayloadEncoding for JsonTextPayload {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn encode(&self, text: &str) -> Result<String, SenderError> {
        Ok(serde_json::to_string(&TextPayload { text })?)
    }
}

/// The text is already a JSON document; send it verbatim.
pub struct RawJsonBody;

impl PayloadEncoding for RawJsonBody {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn encode(&self, text: &str) -> Result<String, SenderError> {
        Ok(text.to_string())
    }
}

/// `payload=<url-encoded {"text": "<message>"}>`, form encoded.
///
/// Synology Chat only reads the `payload` form field and parses it as JSON.
pub struct SynochatFormPayload;

impl PayloadEncoding for SynochatFormPayload {
    fn content_type(&self) -> &'static str {
        "application/x-www-form-urlencoded"
    }

    fn encode(&self, text: &str) -> Result<String, SenderError> {
        let json = serde_json::to_string(&TextPayload { text })?;
        Ok(format!("payload={}", urlencoding::encode(&json)))
    }
}

pub fn encoding_for(kind: ChannelKind) -> &'static dyn PayloadEncoding {
    match kind {
        ChannelKind::CustomJson => &JsonTextPayload,
        ChannelKind::Webhook => &RawJsonBody,
        ChannelKind::SynologyChat => &SynochatFormPayload,
    }
}

/// POSTs `text` to `url` using the channel's encoding.
pub async fn post_encoded(
    client: &Client,
    url: &str,
    kind: ChannelKind,
    text: &str,
) -> Result<Response, SenderError> {
    let encoding = encoding_for(kind);
    let body = encoding.encode(text)?;
    let response = client
        .post(url)
        .header(header::CONTENT_TYPE, encoding.content_type())
        .body(body)
        .send()
        .await?;
    Ok(response)
}
