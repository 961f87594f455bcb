use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::db::services::{self as db_services, SynochatSettingsUpdate};
use crate::notifications::senders::{mask_url, synochat::build_text, truncate_snippet};
use crate::web::{AppError, AppState};

const TEST_FEED: &str = "测试通道连通性";

// Mounted under /api/settings
pub fn create_synochat_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/notify/synochat",
            get(get_synochat_settings).put(update_synochat_settings),
        )
        .route("/notify/synochat/test", post(test_synochat_notification))
}

/// Result of a test send, returned as the response body.
#[derive(Debug, Serialize)]
pub struct TestResponse {
    pub ok: bool,
    pub status: u16,
    pub snippet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TestResponse {
    fn rejected(status: StatusCode, snippet: String, error: &str) -> Response {
        let body = TestResponse {
            ok: false,
            status: status.as_u16(),
            snippet,
            error: Some(error.to_string()),
        };
        (status, Json(body)).into_response()
    }
}

async fn get_synochat_settings(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Value>, AppError> {
    let settings = db_services::load_synochat_settings(&app_state.db_pool)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to load Synology Chat settings");
            AppError::from(e)
        })?;
    Ok(Json(json!({ "code": 0, "message": "success", "data": settings })))
}

async fn update_synochat_settings(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<SynochatSettingsUpdate>,
) -> Result<Json<Value>, AppError> {
    db_services::save_synochat_settings(&app_state.db_pool, &payload).await?;
    info!(enabled = payload.enabled, "Synology Chat settings updated");
    Ok(Json(json!({ "code": 0, "message": "配置保存成功" })))
}

async fn test_synochat_notification(State(app_state): State<Arc<AppState>>) -> Response {
    let permit = match app_state.test_cooldown.acquire().await {
        Ok(permit) => permit,
        Err(active) => {
            return TestResponse::rejected(
                StatusCode::TOO_MANY_REQUESTS,
                format!("请等待 {} 秒后再试", active.remaining_secs),
                "Cooling period",
            );
        }
    };

    let settings = match db_services::load_synochat_settings(&app_state.db_pool).await {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "Synology Chat test failed");
            return TestResponse::rejected(
                StatusCode::INTERNAL_SERVER_ERROR,
                truncate_snippet(&e.to_string()),
                "Internal server error",
            );
        }
    };

    let Some(webhook) = settings.webhook else {
        warn!("Synology Chat test requested without a configured webhook");
        return TestResponse::rejected(
            StatusCode::BAD_REQUEST,
            "Webhook URL 未配置".to_string(),
            "Webhook not configured",
        );
    };

    let result = app_state
        .synochat_sender
        .send(&build_text(&[TEST_FEED]), &webhook, settings.verify_ssl)
        .await;
    permit.record();

    info!(
        url = %mask_url(&webhook),
        status = result.status_code,
        "Synology Chat test message sent"
    );

    let ok = result.is_success();
    let body = TestResponse {
        ok,
        status: result.status_code,
        error: (!ok).then(|| format!("HTTP {}", result.status_code)),
        snippet: result.snippet,
    };
    (StatusCode::OK, Json(body)).into_response()
}
