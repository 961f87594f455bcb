use serde::{Deserialize, Serialize};
use std::fmt;

/// Channel a task delivers its updates through.
///
/// Stored as a small integer on the task row (`0`, `1`, `2`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    /// Render a message and hand it to the direct-message dispatcher.
    Message,
    /// POST a rendered JSON document to the task's webhook.
    Webhook,
    /// Push a rendered message to a Synology Chat incoming webhook.
    SynologyChat,
}

impl MessageType {
    pub fn code(self) -> i64 {
        match self {
            MessageType::Message => 0,
            MessageType::Webhook => 1,
            MessageType::SynologyChat => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(MessageType::Message),
            1 => Some(MessageType::Webhook),
            2 => Some(MessageType::SynologyChat),
            _ => None,
        }
    }
}

/// The message type exactly as it was stored on the task.
///
/// Task rows written by older versions carry the value as text, so both
/// representations are accepted here and validated by [`RawMessageType::resolve`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawMessageType {
    Code(i64),
    Text(String),
}

impl RawMessageType {
    /// Resolves the stored value to one of the known channels.
    pub fn resolve(&self) -> Option<MessageType> {
        match self {
            RawMessageType::Code(code) => MessageType::from_code(*code),
            RawMessageType::Text(text) => text
                .trim()
                .parse::<i64>()
                .ok()
                .and_then(MessageType::from_code),
        }
    }
}

impl From<MessageType> for RawMessageType {
    fn from(message_type: MessageType) -> Self {
        RawMessageType::Code(message_type.code())
    }
}

impl fmt::Display for RawMessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawMessageType::Code(code) => write!(f, "{code}"),
            RawMessageType::Text(text) => write!(f, "{text:?}"),
        }
    }
}

/// A message task: which feed updates go where, and how they are rendered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub message_type: RawMessageType,
    #[serde(default)]
    pub web_hook_url: Option<String>,
    #[serde(default)]
    pub message_template: Option<String>,
}

impl Task {
    /// The configured template, ignoring blank values.
    pub fn template(&self) -> Option<&str> {
        self.message_template
            .as_deref()
            .filter(|t| !t.trim().is_empty())
    }

    /// The configured webhook URL, ignoring blank values.
    pub fn webhook_url(&self) -> Option<&str> {
        self.web_hook_url.as_deref().filter(|u| !u.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    pub id: String,
    pub mp_name: String,
}

/// An article as persisted by the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub mp_id: String,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub pic_url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: Option<String>,
    /// Unix timestamp, seconds.
    pub publish_time: i64,
}

/// An article as handed over by the aggregation job.
///
/// Jobs built from database rows carry full records; jobs built by the
/// crawler carry loose key/value maps with whatever fields were scraped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArticleInput {
    Record(Article),
    Mapping(serde_json::Map<String, serde_json::Value>),
}

impl From<Article> for ArticleInput {
    fn from(article: Article) -> Self {
        ArticleInput::Record(article)
    }
}

/// The single shape every article is rendered from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalArticle {
    pub id: String,
    pub mp_id: String,
    pub title: String,
    pub url: String,
    pub pic_url: String,
    pub description: String,
    pub content: String,
    /// `YYYY-MM-DD HH:MM:SS`, local time.
    pub publish_time: String,
}

/// One aggregation cycle's worth of updates for a single task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationJob {
    pub task: Task,
    pub feed: Feed,
    #[serde(default)]
    pub articles: Vec<ArticleInput>,
}

/// Outcome of a single Synology Chat call.
///
/// `status_code == 0` means the request never produced an HTTP response
/// (timeout, refused connection, TLS failure).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResult {
    pub status_code: u16,
    pub snippet: String,
}

impl SendResult {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}
