use axum::{Router, http::Method, routing::get};
use chrono::Duration;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::notifications::senders::synochat::SynochatSender;
use crate::services::{Clock, Cooldown};

pub use error::AppError;

pub mod error;
pub mod routes;

/// Minimum gap between two test sends from the settings page.
pub const TEST_COOLDOWN_SECS: i64 = 10;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DatabaseConnection,
    pub synochat_sender: Arc<SynochatSender>,
    pub test_cooldown: Arc<Cooldown>,
}

impl AppState {
    pub fn new(
        db_pool: DatabaseConnection,
        synochat_sender: SynochatSender,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db_pool,
            synochat_sender: Arc::new(synochat_sender),
            test_cooldown: Arc::new(Cooldown::new(Duration::seconds(TEST_COOLDOWN_SECS), clock)),
        }
    }
}

async fn health_check_handler() -> &'static str {
    "OK"
}

pub fn create_axum_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(vec![Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_check_handler))
        .nest("/api/settings", routes::synochat_routes::create_synochat_router())
        .with_state(app_state)
        .layer(cors)
}
