use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, IntoActiveModel, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;
use tracing::info;

use crate::db::entities::config_entry;

pub const SYNOCHAT_ENABLED_KEY: &str = "notify.synochat.enabled";
pub const SYNOCHAT_WEBHOOK_KEY: &str = "notify.synochat.webhook";
pub const SYNOCHAT_VERIFY_SSL_KEY: &str = "notify.synochat.verify_ssl";

pub const SYNOLOGY_CHAT_WEBHOOK_ENV: &str = "SYNOLOGY_CHAT_WEBHOOK";
pub const SYNOLOGY_CHAT_VERIFY_SSL_ENV: &str = "SYNOLOGY_CHAT_VERIFY_SSL";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("{0}")]
    Validation(String),
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

/// Synology Chat channel settings, parsed from their string rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynochatSettings {
    pub enabled: bool,
    pub webhook: Option<String>,
    pub verify_ssl: bool,
}

impl Default for SynochatSettings {
    fn default() -> Self {
        Self { enabled: false, webhook: None, verify_ssl: true }
    }
}

/// Body of a settings update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynochatSettingsUpdate {
    pub enabled: bool,
    #[serde(default)]
    pub webhook: Option<String>,
    #[serde(default)]
    pub verify_ssl: Option<bool>,
}

/// The one rule for reading booleans stored as text.
///
/// `true`, `1`, `yes` and `on` (any case, surrounding whitespace ignored)
/// are true; everything else is false.
pub fn parse_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

fn bool_value(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

/// Retrieves a configuration value by its key.
pub async fn get_config_value(db: &DatabaseConnection, key: &str) -> Result<Option<String>, DbErr> {
    Ok(config_entry::Entity::find_by_id(key.to_owned())
        .one(db)
        .await?
        .map(|m| m.config_value))
}

/// Creates or updates a configuration value.
pub async fn set_config_value<C: ConnectionTrait>(
    db: &C,
    key: &str,
    value: &str,
    description: &str,
) -> Result<(), DbErr> {
    let now = Utc::now();
    match config_entry::Entity::find_by_id(key.to_owned()).one(db).await? {
        Some(existing) => {
            let mut active = existing.into_active_model();
            active.config_value = Set(value.to_owned());
            if !description.is_empty() {
                active.description = Set(Some(description.to_owned()));
            }
            active.updated_at = Set(now);
            active.update(db).await?;
        }
        None => {
            config_entry::ActiveModel {
                config_key: Set(key.to_owned()),
                config_value: Set(value.to_owned()),
                description: Set(Some(description.to_owned()).filter(|d| !d.is_empty())),
                updated_at: Set(now),
            }
            .insert(db)
            .await?;
        }
    }
    Ok(())
}

/// Reads the stored value, treating blank text as absent.
async fn get_non_blank(db: &DatabaseConnection, key: &str) -> Result<Option<String>, DbErr> {
    Ok(get_config_value(db, key)
        .await?
        .filter(|v| !v.trim().is_empty()))
}

/// Loads the Synology Chat settings, applying defaults for missing rows.
pub async fn load_synochat_settings(db: &DatabaseConnection) -> Result<SynochatSettings, DbErr> {
    let defaults = SynochatSettings::default();
    let enabled = get_non_blank(db, SYNOCHAT_ENABLED_KEY)
        .await?
        .map_or(defaults.enabled, |v| parse_truthy(&v));
    let webhook = get_non_blank(db, SYNOCHAT_WEBHOOK_KEY).await?;
    let verify_ssl = get_non_blank(db, SYNOCHAT_VERIFY_SSL_KEY)
        .await?
        .map_or(defaults.verify_ssl, |v| parse_truthy(&v));
    Ok(SynochatSettings { enabled, webhook, verify_ssl })
}

pub fn validate_synochat_update(update: &SynochatSettingsUpdate) -> Result<(), SettingsError> {
    let has_webhook = update
        .webhook
        .as_deref()
        .is_some_and(|w| !w.trim().is_empty());
    if update.enabled && !has_webhook {
        return Err(SettingsError::Validation(
            "启用通知时 Webhook URL 不能为空".to_string(),
        ));
    }
    Ok(())
}

/// Validates and stores a settings update.
///
/// A missing or blank webhook leaves the stored one untouched.
pub async fn save_synochat_settings(
    db: &DatabaseConnection,
    update: &SynochatSettingsUpdate,
) -> Result<(), SettingsError> {
    validate_synochat_update(update)?;

    // All three rows or none.
    let txn = db.begin().await?;

    set_config_value(
        &txn,
        SYNOCHAT_ENABLED_KEY,
        bool_value(update.enabled),
        "Synology Chat 通知是否启用",
    )
    .await?;

    if let Some(webhook) = update.webhook.as_deref().map(str::trim).filter(|w| !w.is_empty()) {
        set_config_value(&txn, SYNOCHAT_WEBHOOK_KEY, webhook, "Synology Chat Webhook URL").await?;
    }

    set_config_value(
        &txn,
        SYNOCHAT_VERIFY_SSL_KEY,
        bool_value(update.verify_ssl.unwrap_or(true)),
        "是否验证 SSL 证书",
    )
    .await?;

    txn.commit().await?;
    Ok(())
}

/// Seeds the Synology Chat rows from a bootstrap webhook.
///
/// Only runs when no webhook row exists at all; the channel always starts
/// disabled. Returns whether anything was written.
pub async fn seed_synochat_settings(
    db: &DatabaseConnection,
    webhook: Option<&str>,
    verify_ssl: Option<&str>,
) -> Result<bool, DbErr> {
    let Some(webhook) = webhook.map(str::trim).filter(|w| !w.is_empty()) else {
        return Ok(false);
    };
    if config_entry::Entity::find_by_id(SYNOCHAT_WEBHOOK_KEY.to_owned())
        .one(db)
        .await?
        .is_some()
    {
        return Ok(false);
    }

    info!("Initializing Synology Chat configuration from environment variables");
    let verify_ssl = verify_ssl.map_or(true, parse_truthy);
    let txn = db.begin().await?;
    set_config_value(&txn, SYNOCHAT_ENABLED_KEY, "false", "Synology Chat 通知是否启用").await?;
    set_config_value(&txn, SYNOCHAT_WEBHOOK_KEY, webhook, "Synology Chat Webhook URL").await?;
    set_config_value(&txn, SYNOCHAT_VERIFY_SSL_KEY, bool_value(verify_ssl), "是否验证 SSL 证书").await?;
    txn.commit().await?;
    Ok(true)
}

/// Runs [`seed_synochat_settings`] with `SYNOLOGY_CHAT_WEBHOOK` / `SYNOLOGY_CHAT_VERIFY_SSL`.
pub async fn bootstrap_synochat_from_env(db: &DatabaseConnection) -> Result<bool, DbErr> {
    let webhook = env::var(SYNOLOGY_CHAT_WEBHOOK_ENV).ok();
    let verify_ssl = env::var(SYNOLOGY_CHAT_VERIFY_SSL_ENV).ok();
    seed_synochat_settings(db, webhook.as_deref(), verify_ssl.as_deref()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn update(enabled: bool, webhook: Option<&str>, verify_ssl: Option<bool>) -> SynochatSettingsUpdate {
        SynochatSettingsUpdate {
            enabled,
            webhook: webhook.map(str::to_string),
            verify_ssl,
        }
    }

    #[test]
    fn test_parse_truthy() {
        for value in ["true", "TRUE", " 1 ", "yes", "On"] {
            assert!(parse_truthy(value), "{value}");
        }
        for value in ["false", "0", "", "no", "enabled"] {
            assert!(!parse_truthy(value), "{value}");
        }
    }

    #[tokio::test]
    async fn test_load_defaults_when_empty() {
        let db = db::test_db().await;
        let settings = load_synochat_settings(&db).await.unwrap();
        assert_eq!(settings, SynochatSettings { enabled: false, webhook: None, verify_ssl: true });
    }

    #[tokio::test]
    async fn test_set_config_value_upserts() {
        let db = db::test_db().await;
        set_config_value(&db, "k", "v1", "first").await.unwrap();
        set_config_value(&db, "k", "v2", "").await.unwrap();

        assert_eq!(get_config_value(&db, "k").await.unwrap().as_deref(), Some("v2"));
        let row = config_entry::Entity::find_by_id("k".to_owned()).one(&db).await.unwrap().unwrap();
        assert_eq!(row.description.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_enabled_without_webhook_is_rejected() {
        let db = db::test_db().await;
        let err = save_synochat_settings(&db, &update(true, Some("  "), None)).await.unwrap_err();
        assert!(matches!(err, SettingsError::Validation(_)));
        assert_eq!(get_config_value(&db, SYNOCHAT_ENABLED_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_then_load_round_trip() {
        let db = db::test_db().await;
        save_synochat_settings(&db, &update(true, Some("https://x"), Some(false))).await.unwrap();

        let settings = load_synochat_settings(&db).await.unwrap();
        assert_eq!(
            settings,
            SynochatSettings { enabled: true, webhook: Some("https://x".to_string()), verify_ssl: false }
        );
    }

    #[tokio::test]
    async fn test_save_keeps_webhook_when_omitted() {
        let db = db::test_db().await;
        save_synochat_settings(&db, &update(true, Some("https://x"), None)).await.unwrap();
        save_synochat_settings(&db, &update(false, None, None)).await.unwrap();

        let settings = load_synochat_settings(&db).await.unwrap();
        assert!(!settings.enabled);
        assert_eq!(settings.webhook.as_deref(), Some("https://x"));
        assert!(settings.verify_ssl);
    }

    #[tokio::test]
    async fn test_failed_save_writes_nothing() {
        let db = db::test_db().await;
        db.execute_unprepared(
            "CREATE TRIGGER reject_webhook BEFORE INSERT ON config_management
             WHEN NEW.config_key = 'notify.synochat.webhook'
             BEGIN SELECT RAISE(ABORT, 'webhook rejected'); END",
        )
        .await
        .unwrap();

        let err = save_synochat_settings(&db, &update(true, Some("https://x"), None))
            .await
            .unwrap_err();
        assert!(matches!(err, SettingsError::Database(_)));

        assert_eq!(get_config_value(&db, SYNOCHAT_ENABLED_KEY).await.unwrap(), None);
        assert_eq!(load_synochat_settings(&db).await.unwrap(), SynochatSettings::default());
    }

    #[tokio::test]
    async fn test_seed_only_when_webhook_row_absent() {
        let db = db::test_db().await;

        assert!(!seed_synochat_settings(&db, None, None).await.unwrap());
        assert!(seed_synochat_settings(&db, Some("https://env"), Some("No")).await.unwrap());

        let settings = load_synochat_settings(&db).await.unwrap();
        assert_eq!(
            settings,
            SynochatSettings { enabled: false, webhook: Some("https://env".to_string()), verify_ssl: false }
        );

        assert!(!seed_synochat_settings(&db, Some("https://other"), None).await.unwrap());
        assert_eq!(
            load_synochat_settings(&db).await.unwrap().webhook.as_deref(),
            Some("https://env")
        );
    }
}
