use clap::{Parser, Subcommand};
use sea_orm::DatabaseConnection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use werss_notify::db::{self, services as db_services};
use werss_notify::notifications::models::NotificationJob;
use werss_notify::notifications::router::{NotificationRouter, RouterOptions};
use werss_notify::notifications::senders::{
    HttpClients, custom::DirectMessageDispatcher, synochat::SynochatSender,
    synochat::SynologyNotifier, webhook::WebhookSender,
};
use werss_notify::server::config::ServerConfig;
use werss_notify::services::SystemClock;
use werss_notify::web::{self, AppState};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the settings API (default)
    Serve,
    /// Route one JSON-encoded notification job and exit
    Dispatch {
        /// File holding `{task, feed, articles}`
        #[arg(long)]
        job: PathBuf,
        /// Push a "no update" notice even when the job has no articles
        #[arg(long)]
        force_empty: bool,
    },
}

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "werss-notify.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sea_orm=warn,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();

    // Logging needs log_dir, so configuration errors go to stderr.
    let server_config = match ServerConfig::load(args.config.as_deref()) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Failed to load server configuration: {e}");
            return Err(e.into());
        }
    };

    init_logging(&server_config.log_dir);
    info!("Starting werss-notify, version: {}", env!("CARGO_PKG_VERSION"));

    let db_pool = db::connect(&server_config.database_url).await?;
    db::init_schema(&db_pool).await?;
    match db_services::bootstrap_synochat_from_env(&db_pool).await {
        Ok(true) => info!("Synology Chat settings seeded from environment"),
        Ok(false) => {}
        Err(e) => error!(error = %e, "Failed to seed Synology Chat settings"),
    }

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(db_pool, server_config).await,
        Command::Dispatch { job, force_empty } => {
            dispatch(db_pool, &server_config, &job, force_empty).await
        }
    }
}

async fn serve(db_pool: DatabaseConnection, config: Arc<ServerConfig>) -> Result<(), BoxError> {
    let app_state = Arc::new(AppState::new(
        db_pool,
        SynochatSender::new()?,
        Arc::new(SystemClock),
    ));
    let app = web::create_axum_router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!("Settings API listening on {}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutting down");
        })
        .await?;
    Ok(())
}

async fn dispatch(
    db_pool: DatabaseConnection,
    config: &ServerConfig,
    job_path: &Path,
    force_empty: bool,
) -> Result<(), BoxError> {
    let raw = tokio::fs::read_to_string(job_path).await?;
    let job: NotificationJob = serde_json::from_str(&raw)?;

    let clients = HttpClients::new()?;
    let synology = SynologyNotifier::new(SynochatSender::new()?, db_pool);
    let router = NotificationRouter::new(
        DirectMessageDispatcher::new(clients.clone(), synology.clone()),
        WebhookSender::new(clients),
        synology,
        RouterOptions {
            debug_force_notify_on_empty: config.debug_force_notify_on_empty,
            content_format: config.webhook_content_format,
        },
    );

    match router.route(&job, force_empty).await {
        Ok(outcome) => {
            info!(task = %job.task.name, ?outcome, "Notification job finished");
            Ok(())
        }
        Err(e) => {
            error!(task = %job.task.name, error = %e, "Notification job failed");
            Err(e.into())
        }
    }
}
