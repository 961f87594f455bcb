use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr};
use tracing::info;

pub mod entities;
pub mod services;

// Portable between PostgreSQL and SQLite.
const CREATE_CONFIG_TABLE: &str = "CREATE TABLE IF NOT EXISTS config_management (
    config_key VARCHAR(255) PRIMARY KEY,
    config_value TEXT NOT NULL,
    description TEXT,
    updated_at TIMESTAMPTZ NOT NULL
)";

/// Opens the configuration database.
///
/// `sqlite::memory:` URLs get a single pinned connection: every pooled
/// connection would otherwise see its own empty database.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(database_url.to_owned());
    if database_url.starts_with("sqlite::memory:") {
        opt.max_connections(1).min_connections(1);
    } else {
        opt.max_connections(10);
    }
    opt.sqlx_logging(false);

    let db = Database::connect(opt).await?;
    info!("Connected to configuration database");
    Ok(db)
}

/// Creates the tables this service owns if they do not exist yet.
pub async fn init_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    db.execute_unprepared(CREATE_CONFIG_TABLE).await?;
    Ok(())
}

#[cfg(test)]
pub(crate) async fn test_db() -> DatabaseConnection {
    let db = connect("sqlite::memory:").await.unwrap();
    init_schema(&db).await.unwrap();
    db
}
