mod auth;
mod config;
mod database;
mod error;
mod handlers;
mod pagination;
mod response;
mod services;
mod validation;

#[cfg(test)]
mod tests;

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::config::Config;
use crate::services::email::{Mailer, SmtpMailer};
use crate::services::storage::ImageStorage;

/// Shared application state
pub struct AppState {
    pub db_pool: sqlx::PgPool,
    pub mailer: Arc<dyn Mailer>,
    pub storage: ImageStorage,
    pub config: Config,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let upload_dir = state.config.upload.dir.clone();

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/amc-contracts", handlers::contracts::contract_routes())
        .nest(
            "/api/amc-contracts/:contract_id/assets",
            handlers::assets::asset_routes(),
        )
        .nest("/api/contact", handlers::email::contact_routes())
        .nest("/api/email", handlers::email::email_routes())
        .nest("/api/admin/vendor", handlers::vendors::admin_vendor_routes())
        .nest("/api/vendors/me", handlers::vendors::vendor_self_routes())
        .nest_service("/uploads", ServeDir::new(upload_dir))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "upkeep_backend=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;

    let db_pool = database::create_pool(&config.database_url).await?;
    database::migrate(&db_pool).await?;

    if !config.smtp.is_configured() {
        tracing::warn!("SMTP credentials missing, outbound email will fail");
    }
    let mailer: Arc<dyn Mailer> = Arc::new(SmtpMailer::new(&config.smtp));
    let storage = ImageStorage::new(&config.upload);

    let addr = config.server_addr.clone();
    let state = Arc::new(AppState {
        db_pool,
        mailer,
        storage,
        config,
    });

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Upkeep backend listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
