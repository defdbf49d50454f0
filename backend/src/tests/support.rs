use crate::config::Config;
use crate::services::email::{EmailError, EmailTemplate, Mailer};
use crate::services::storage::ImageStorage;
use crate::{AppState, build_router, database};
use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::Value;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use upkeep_shared::User;
use uuid::Uuid;

/// Mailer that records every send and always succeeds.
pub struct RecordingMailer {
    pub sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(
        &self,
        to_email: &str,
        _to_name: Option<&str>,
        template: &EmailTemplate,
    ) -> Result<(), EmailError> {
        self.sent
            .lock()
            .unwrap()
            .push((to_email.to_string(), template.subject.clone()));
        Ok(())
    }

    async fn verify(&self) -> Result<(), EmailError> {
        Ok(())
    }
}

/// Build a router over the test database, or `None` when no test database
/// is configured.
pub async fn test_app() -> Option<(Router, PgPool)> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("connect to TEST_DATABASE_URL");
    database::migrate(&pool).await.expect("run migrations");

    sqlx::query(
        "TRUNCATE amc_assets, service_requests, amc_contracts, contract_counters,
                  catalog_services, vendors, users",
    )
    .execute(&pool)
    .await
    .expect("truncate test tables");

    let config = Config::from_env().expect("test config");
    let upload_dir = tempfile::tempdir().expect("tempdir").into_path();
    let storage = ImageStorage::new(&crate::config::UploadConfig {
        dir: upload_dir.to_string_lossy().to_string(),
        public_base_url: "/uploads".to_string(),
    });

    let state = Arc::new(AppState {
        db_pool: pool.clone(),
        mailer: Arc::new(RecordingMailer {
            sent: Mutex::new(Vec::new()),
        }),
        storage,
        config,
    });

    Some((build_router(state), pool))
}

pub async fn insert_user(pool: &PgPool, role: &str) -> User {
    let id = Uuid::new_v4();
    sqlx::query_as::<_, User>(
        "INSERT INTO users (id, email, name, phone, role)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING *",
    )
    .bind(id)
    .bind(format!("{}-{}@test.example", role, id.simple()))
    .bind(format!("Test {}", role))
    .bind("+14155550100")
    .bind(role)
    .fetch_one(pool)
    .await
    .expect("insert user")
}

pub async fn insert_catalog_service(
    pool: &PgPool,
    name: &str,
    is_active: bool,
    sub_services: Value,
) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO catalog_services (id, name, category, sub_services, is_active)
         VALUES ($1, $2, 'Maintenance', $3, $4)",
    )
    .bind(id)
    .bind(name)
    .bind(sub_services)
    .bind(is_active)
    .execute(pool)
    .await
    .expect("insert catalog service");
    id
}

pub fn bearer(user: &User) -> String {
    let token = crate::auth::jwt::create_jwt(user).expect("sign test token");
    format!("Bearer {}", token.token)
}

/// One JSON round trip through the router.
pub async fn send_json(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, token);
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .expect("build request"),
        None => builder.body(Body::empty()).expect("build request"),
    };

    let response = app.clone().oneshot(request).await.expect("route request");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("parse json body")
    };
    (status, value)
}

/// Skip message for environments without a test database.
pub fn skip_notice(test: &str) {
    eprintln!("{}: skipped, TEST_DATABASE_URL not set", test);
}
