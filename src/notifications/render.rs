//! Template rendering and article normalization.
//!
//! Templates use Tera syntax (`{{ feed.mp_name }}`, `{% for article in articles %}`),
//! rendered one-off with autoescaping disabled: the output is Markdown or JSON,
//! never HTML.

use chrono::{Local, TimeZone};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use tera::{Context, Tera};
use thiserror::Error;

use super::models::{Article, ArticleInput, CanonicalArticle, Feed, Task};

pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Default body for direct messages and Synology Chat pushes.
pub const DEFAULT_MESSAGE_TEMPLATE: &str = "### {{ feed.mp_name }} 订阅消息：
{% if articles %}{% for article in articles %}
- [**{{ article.title }}**]({{ article.url }}) ({{ article.publish_time }})
{% endfor %}{% else %}
- 暂无文章
{% endif %}";

/// Default JSON document posted to generic webhooks.
pub const DEFAULT_WEBHOOK_TEMPLATE: &str = r#"{
  "feed": {
    "id": "{{ feed.id }}",
    "name": "{{ feed.mp_name }}"
  },
  "articles": [
    {% for article in articles %}
    {
      "id": "{{ article.id }}",
      "mp_id": "{{ article.mp_id }}",
      "title": "{{ article.title }}",
      "pic_url": "{{ article.pic_url }}",
      "url": "{{ article.url }}",
      "description": "{{ article.description }}",
      "publish_time": "{{ article.publish_time }}"
    }{% if not loop.last %},{% endif %}
    {% endfor %}
  ],
  "task": {
    "id": "{{ task.id }}",
    "name": "{{ task.name }}"
  },
  "now": "{{ now }}"
}"#;

/// Body of the synthetic push sent when a forced run found nothing new.
pub const EMPTY_PUSH_TEMPLATE: &str = "【测试】{{ task.name }} - 无更新通知
公众号: {{ feed.mp_name }}
时间: {{ now }}
新增文章数: 0
状态: 联调测试推送";

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Template error: {0}")]
    Template(String),
    #[error("Invalid publish_time: {0}")]
    InvalidPublishTime(String),
    #[error("Content conversion failed: {0}")]
    ContentFormat(String),
    #[error("JSON escaping failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<tera::Error> for RenderError {
    fn from(err: tera::Error) -> Self {
        // Tera's top-level message only names the template; the cause is in the chain.
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        RenderError::Template(message)
    }
}

/// How article `content` is converted before it is embedded in a webhook body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    #[default]
    Html,
    Markdown,
    Text,
}

lazy_static! {
    static ref BLOCK_BREAK: Regex =
        Regex::new(r"(?i)<br\s*/?>|</(p|div|li|h[1-6]|tr|blockquote)>").expect("valid regex");
    static ref ANY_TAG: Regex = Regex::new(r"(?s)<[^>]*>").expect("valid regex");
    static ref BLANK_RUNS: Regex = Regex::new(r"\n{3,}").expect("valid regex");
}

/// Converts raw article HTML into the configured delivery format.
pub fn convert_content(html: &str, format: ContentFormat) -> Result<String, RenderError> {
    match format {
        ContentFormat::Html => Ok(html.to_string()),
        ContentFormat::Markdown => {
            htmd::convert(html).map_err(|e| RenderError::ContentFormat(e.to_string()))
        }
        ContentFormat::Text => Ok(html_to_text(html)),
    }
}

fn html_to_text(html: &str) -> String {
    let with_breaks = BLOCK_BREAK.replace_all(html, "\n");
    let stripped = ANY_TAG.replace_all(&with_breaks, "");
    let decoded = html_escape::decode_html_entities(&stripped).replace('\u{a0}', " ");
    let lines: Vec<&str> = decoded.lines().map(str::trim).collect();
    BLANK_RUNS
        .replace_all(&lines.join("\n"), "\n\n")
        .trim()
        .to_string()
}

/// Escapes `value` for embedding between the quotes of a JSON string literal.
pub fn json_escape_fragment(value: &str) -> Result<String, RenderError> {
    let quoted = serde_json::to_string(value)?;
    Ok(quoted[1..quoted.len() - 1].to_string())
}

/// Formats a unix timestamp the way every template shows it.
pub fn format_timestamp(timestamp: i64) -> Result<String, RenderError> {
    Local
        .timestamp_opt(timestamp, 0)
        .single()
        .map(|dt| dt.format(TIME_FORMAT).to_string())
        .ok_or_else(|| RenderError::InvalidPublishTime(timestamp.to_string()))
}

pub fn now_string() -> String {
    Local::now().format(TIME_FORMAT).to_string()
}

/// Brings either article representation into the canonical shape.
pub fn normalize_article(input: &ArticleInput) -> Result<CanonicalArticle, RenderError> {
    match input {
        ArticleInput::Record(article) => normalize_record(article),
        ArticleInput::Mapping(map) => normalize_mapping(map),
    }
}

fn normalize_record(article: &Article) -> Result<CanonicalArticle, RenderError> {
    Ok(CanonicalArticle {
        id: article.id.clone(),
        mp_id: article.mp_id.clone(),
        title: article.title.clone(),
        url: article.url.clone(),
        pic_url: article.pic_url.clone(),
        description: article.description.clone(),
        content: article.content.clone().unwrap_or_default(),
        publish_time: format_timestamp(article.publish_time)?,
    })
}

fn normalize_mapping(
    map: &serde_json::Map<String, serde_json::Value>,
) -> Result<CanonicalArticle, RenderError> {
    let field = |name: &str| map.get(name).map(value_to_string).unwrap_or_default();

    let publish_time = match map.get("publish_time") {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(value) => format_timestamp(timestamp_from_value(value)?)?,
    };

    Ok(CanonicalArticle {
        id: field("id"),
        mp_id: field("mp_id"),
        title: field("title"),
        url: field("url"),
        pic_url: field("pic_url"),
        description: field("description"),
        content: field("content"),
        publish_time,
    })
}

fn timestamp_from_value(value: &serde_json::Value) -> Result<i64, RenderError> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| RenderError::InvalidPublishTime(value.to_string()))
}

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Context with everything a task template may reference.
pub fn full_context(
    feed: &Feed,
    articles: &[CanonicalArticle],
    task: &Task,
    now: &str,
) -> Context {
    let mut context = feed_context(feed, articles);
    context.insert("task", task);
    context.insert("now", now);
    context
}

/// Context used by Synology Chat pushes: the feed and its articles only.
pub fn feed_context(feed: &Feed, articles: &[CanonicalArticle]) -> Context {
    let mut context = Context::new();
    context.insert("feed", feed);
    context.insert("articles", articles);
    context
}

pub fn render(template: &str, context: &Context) -> Result<String, RenderError> {
    Ok(Tera::one_off(template, context, false)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::models::MessageType;

    fn feed() -> Feed {
        Feed { id: "feed-1".to_string(), mp_name: "Rust 周刊".to_string() }
    }

    fn task() -> Task {
        Task {
            id: "task-1".to_string(),
            name: "daily".to_string(),
            message_type: MessageType::Message.into(),
            web_hook_url: None,
            message_template: None,
        }
    }

    fn article(n: usize) -> CanonicalArticle {
        CanonicalArticle {
            id: format!("a{n}"),
            title: format!("Title {n}"),
            url: format!("https://example.com/{n}"),
            publish_time: "2024-01-01 08:00:00".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_message_template_lists_articles_in_order() {
        let articles: Vec<_> = (1..=3).map(article).collect();
        let out = render(
            DEFAULT_MESSAGE_TEMPLATE,
            &full_context(&feed(), &articles, &task(), "now"),
        )
        .unwrap();

        let bullets: Vec<&str> = out.lines().filter(|l| l.starts_with("- [")).collect();
        assert_eq!(bullets.len(), 3);
        for (i, line) in bullets.iter().enumerate() {
            assert!(line.contains(&format!("[**Title {}**](https://example.com/{})", i + 1, i + 1)));
        }
        assert!(out.starts_with("### Rust 周刊 订阅消息："));
        assert!(!out.contains("暂无文章"));
    }

    #[test]
    fn test_default_message_template_without_articles() {
        let out = render(
            DEFAULT_MESSAGE_TEMPLATE,
            &full_context(&feed(), &[], &task(), "now"),
        )
        .unwrap();
        assert_eq!(out.lines().filter(|l| l.starts_with("- ")).count(), 1);
        assert!(out.contains("- 暂无文章"));
    }

    #[test]
    fn test_default_webhook_template_is_valid_json() {
        let articles: Vec<_> = (1..=2).map(article).collect();
        let out = render(
            DEFAULT_WEBHOOK_TEMPLATE,
            &full_context(&feed(), &articles, &task(), "2024-01-01 09:00:00"),
        )
        .unwrap();
        let doc: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(doc["feed"]["name"], "Rust 周刊");
        assert_eq!(doc["articles"].as_array().unwrap().len(), 2);
        assert_eq!(doc["articles"][1]["id"], "a2");
        assert_eq!(doc["task"]["name"], "daily");
        assert_eq!(doc["now"], "2024-01-01 09:00:00");
    }

    #[test]
    fn test_json_escape_fragment_strips_outer_quotes() {
        assert_eq!(json_escape_fragment("plain").unwrap(), "plain");
        assert_eq!(
            json_escape_fragment("say \"hi\"\n\tnow").unwrap(),
            r#"say \"hi\"\n\tnow"#
        );
        assert_eq!(json_escape_fragment("中文").unwrap(), "中文");
    }

    #[test]
    fn test_normalize_record_formats_publish_time() {
        let input = ArticleInput::Record(Article {
            id: "a1".to_string(),
            mp_id: "mp".to_string(),
            title: "T".to_string(),
            url: "u".to_string(),
            pic_url: String::new(),
            description: String::new(),
            content: None,
            publish_time: 1_700_000_000,
        });
        let normalized = normalize_article(&input).unwrap();
        assert_eq!(normalized.publish_time, format_timestamp(1_700_000_000).unwrap());
        assert_eq!(normalized.publish_time.len(), 19);
        assert_eq!(normalized.content, "");
    }

    #[test]
    fn test_normalize_mapping_fills_missing_fields() {
        let map = serde_json::json!({
            "id": 42,
            "title": "Loose",
            "publish_time": "1700000000",
            "content": "<p>x</p>"
        });
        let input: ArticleInput = serde_json::from_value(map).unwrap();
        let normalized = normalize_article(&input).unwrap();
        assert_eq!(normalized.id, "42");
        assert_eq!(normalized.title, "Loose");
        assert_eq!(normalized.url, "");
        assert_eq!(normalized.content, "<p>x</p>");
        assert_eq!(normalized.publish_time, format_timestamp(1_700_000_000).unwrap());
    }

    #[test]
    fn test_normalize_mapping_without_publish_time() {
        let input: ArticleInput =
            serde_json::from_value(serde_json::json!({ "title": "No date" })).unwrap();
        assert_eq!(normalize_article(&input).unwrap().publish_time, "");
    }

    #[test]
    fn test_normalize_mapping_rejects_bad_publish_time() {
        let input: ArticleInput =
            serde_json::from_value(serde_json::json!({ "publish_time": "yesterday" })).unwrap();
        assert!(matches!(
            normalize_article(&input),
            Err(RenderError::InvalidPublishTime(_))
        ));
    }

    #[test]
    fn test_convert_content_formats() {
        let html = "<p>Hello <b>world</b></p><p>a &amp; b</p>";
        assert_eq!(convert_content(html, ContentFormat::Html).unwrap(), html);
        assert_eq!(
            convert_content(html, ContentFormat::Text).unwrap(),
            "Hello world\na & b"
        );
        let markdown = convert_content(html, ContentFormat::Markdown).unwrap();
        assert!(markdown.contains("**world**"));
    }

    #[test]
    fn test_text_format_decodes_entities() {
        let html = "<p>Rust&#8217;s &ldquo;fast&rdquo; &#x4E2D;</p><p>a&nbsp;&lt;b&gt;</p>";
        assert_eq!(
            convert_content(html, ContentFormat::Text).unwrap(),
            "Rust\u{2019}s \u{201c}fast\u{201d} \u{4e2d}\na <b>"
        );
    }

    #[test]
    fn test_render_reports_template_errors() {
        let err = render("{{ missing.value }}", &Context::new()).unwrap_err();
        assert!(matches!(err, RenderError::Template(_)));
    }
}
