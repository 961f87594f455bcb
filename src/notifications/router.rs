//! Routes one aggregation job to the channel its task is configured for.

use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::models::{
    CanonicalArticle, MessageType, NotificationJob, RawMessageType, SendResult,
};
use super::render::{
    self, ContentFormat, DEFAULT_MESSAGE_TEMPLATE, DEFAULT_WEBHOOK_TEMPLATE, EMPTY_PUSH_TEMPLATE,
    RenderError,
};
use super::senders::{
    SenderError, custom::DirectMessageDispatcher, mask_url, synochat::SynologyNotifier,
    webhook::WebhookSender,
};

/// A failure in one stage of dispatching a job.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("无效的消息类型: {0}")]
    InvalidMessageType(RawMessageType),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Sender(#[from] SenderError),
}

/// The only error the router returns; the failing stage is kept as the source.
#[derive(Error, Debug)]
#[error("处理消息时出错: {source}")]
pub struct RoutingFailed {
    #[from]
    source: DispatchError,
}

impl RoutingFailed {
    pub fn cause(&self) -> &DispatchError {
        &self.source
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouterOutcome {
    /// The job had no articles and no forced push applied.
    NothingToSend,
    /// A direct message was rendered and handed to the dispatcher.
    MessageSent { message: String },
    /// The rendered document was posted to the task's webhook.
    WebhookCalled,
    /// The task has no webhook URL; nothing was sent.
    WebhookUrlMissing,
    /// A Synology Chat push went out.
    SynochatSent { title: String, result: SendResult },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RouterOptions {
    /// Push a "no update" message to Synology Chat tasks even without a caller request.
    pub debug_force_notify_on_empty: bool,
    pub content_format: ContentFormat,
}

pub struct NotificationRouter {
    direct: DirectMessageDispatcher,
    webhook: WebhookSender,
    synology: SynologyNotifier,
    options: RouterOptions,
}

impl NotificationRouter {
    pub fn new(
        direct: DirectMessageDispatcher,
        webhook: WebhookSender,
        synology: SynologyNotifier,
        options: RouterOptions,
    ) -> Self {
        Self { direct, webhook, synology, options }
    }

    pub async fn route(
        &self,
        job: &NotificationJob,
        force_empty_push: bool,
    ) -> Result<RouterOutcome, RoutingFailed> {
        debug!(
            message_type = %job.task.message_type,
            force = force_empty_push,
            task = %job.task.name,
            "Routing notification job"
        );
        Ok(self.dispatch(job, force_empty_push).await?)
    }

    async fn dispatch(
        &self,
        job: &NotificationJob,
        force_empty_push: bool,
    ) -> Result<RouterOutcome, DispatchError> {
        // Read once; normalization below only touches articles.
        let message_type = job.task.message_type.resolve();

        if job.articles.is_empty() {
            warn!(task = %job.task.name, feed = %job.feed.mp_name, "没有更新到文章");
            let debug_force = self.options.debug_force_notify_on_empty;
            if (force_empty_push || debug_force) && message_type == Some(MessageType::SynologyChat) {
                let source = if force_empty_push { "parameter" } else { "config" };
                info!(
                    source,
                    task = %job.task.name,
                    feed = %job.feed.mp_name,
                    "Pushing empty update notice"
                );
                return self.send_synochat(job, &[], true).await;
            }
            return Ok(RouterOutcome::NothingToSend);
        }

        let articles = job
            .articles
            .iter()
            .map(render::normalize_article)
            .collect::<Result<Vec<_>, _>>()?;

        let message_type = message_type.ok_or_else(|| {
            error!(message_type = %job.task.message_type, "Invalid message_type");
            DispatchError::InvalidMessageType(job.task.message_type.clone())
        })?;

        match message_type {
            MessageType::Message => {
                debug!("Routing -> message");
                self.send_message(job, &articles).await
            }
            MessageType::Webhook => {
                debug!("Routing -> webhook");
                self.call_webhook(job, articles).await
            }
            MessageType::SynologyChat => {
                debug!("Routing -> synochat");
                self.send_synochat(job, &articles, false).await
            }
        }
    }

    async fn send_message(
        &self,
        job: &NotificationJob,
        articles: &[CanonicalArticle],
    ) -> Result<RouterOutcome, DispatchError> {
        let template = job.task.template().unwrap_or(DEFAULT_MESSAGE_TEMPLATE);
        let context = render::full_context(&job.feed, articles, &job.task, &render::now_string());
        let message = render::render(template, &context)?;

        self.direct
            .notify(job.task.webhook_url(), &job.task.name, &message)
            .await?;
        Ok(RouterOutcome::MessageSent { message })
    }

    async fn call_webhook(
        &self,
        job: &NotificationJob,
        mut articles: Vec<CanonicalArticle>,
    ) -> Result<RouterOutcome, DispatchError> {
        let template = job.task.template().unwrap_or(DEFAULT_WEBHOOK_TEMPLATE);
        let needs_content = template.to_lowercase().contains("content");
        info!(format = ?self.options.content_format, "Webhook content format");

        for article in &mut articles {
            if needs_content && !article.content.is_empty() {
                article.content = render::convert_content(&article.content, self.options.content_format)?;
            }
            // Always escaped so a template that embeds content stays valid JSON.
            article.content = render::json_escape_fragment(&article.content)?;
        }

        let context = render::full_context(&job.feed, &articles, &job.task, &render::now_string());
        let payload = render::render(template, &context)?;

        let Some(url) = job.task.webhook_url() else {
            warn!(task = %job.task.name, "web_hook_url为空");
            return Ok(RouterOutcome::WebhookUrlMissing);
        };

        self.webhook.call(url, &payload).await?;
        info!(url = %mask_url(url), task = %job.task.name, "Webhook调用成功");
        Ok(RouterOutcome::WebhookCalled)
    }

    async fn send_synochat(
        &self,
        job: &NotificationJob,
        articles: &[CanonicalArticle],
        empty_push: bool,
    ) -> Result<RouterOutcome, DispatchError> {
        let (template, context) = if empty_push {
            let context =
                render::full_context(&job.feed, articles, &job.task, &render::now_string());
            (EMPTY_PUSH_TEMPLATE, context)
        } else {
            let template = job.task.template().unwrap_or(DEFAULT_MESSAGE_TEMPLATE);
            (template, render::feed_context(&job.feed, articles))
        };
        let text = render::render(template, &context)?;

        let title = synochat_title(&job.feed.mp_name, empty_push);
        let result = self
            .synology
            .notify(job.task.webhook_url(), &title, &text)
            .await?;
        Ok(RouterOutcome::SynochatSent { title, result })
    }
}

fn synochat_title(feed_name: &str, empty_push: bool) -> String {
    if empty_push {
        format!("【测试】{feed_name} 无更新通知")
    } else {
        format!("{feed_name} 更新通知")
    }
}
