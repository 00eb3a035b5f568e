use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use quill_api::auth::{self, AppState, AppStateInner};
use quill_api::middleware::attach_identity;
use quill_api::posts;
use quill_api::users;
use quill_mailer::{HttpMailer, LogMailer, OtpMailer};
use quill_storage::LocalImageStore;

/// 50 MB cap for multipart bodies (post fields + image upload).
const MAX_BODY_SIZE: usize = 50 * 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quill=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("QUILL_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("QUILL_DB_PATH").unwrap_or_else(|_| "quill.db".into());
    let upload_dir = std::env::var("QUILL_UPLOAD_DIR").unwrap_or_else(|_| "uploads".into());
    let host = std::env::var("QUILL_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("QUILL_PORT")
        .unwrap_or_else(|_| "5000".into())
        .parse()?;

    // Init database
    let db = quill_db::Database::open(&PathBuf::from(&db_path))?;

    // Image storage, served back under /uploads
    let images = LocalImageStore::new(PathBuf::from(&upload_dir), "/uploads").await?;

    // Mail: real HTTP API when configured, log-only otherwise
    let mailer: Arc<dyn OtpMailer> = match std::env::var("QUILL_MAIL_API_URL") {
        Ok(endpoint) => {
            let api_key = std::env::var("QUILL_MAIL_API_KEY").unwrap_or_default();
            let from = std::env::var("QUILL_MAIL_FROM")
                .unwrap_or_else(|_| "no-reply@quill.local".into());
            Arc::new(HttpMailer::new(endpoint, api_key, from))
        }
        Err(_) => {
            warn!("QUILL_MAIL_API_URL not set; OTP codes will only be logged");
            Arc::new(LogMailer)
        }
    };

    // Shared state
    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret,
        mailer,
        images: Arc::new(images),
    });

    // Routes
    let api = Router::new()
        .route("/signUp", post(auth::sign_up))
        .route("/verify-otp", post(auth::verify_otp))
        .route("/resend-otp", post(auth::resend_otp))
        .route("/signIn", post(auth::sign_in))
        .route("/users", get(users::list_users))
        .route("/blogs", get(posts::list_posts).post(posts::create_post))
        .route("/blogs/my-posts", get(posts::my_posts))
        .route(
            "/blogs/{id}",
            get(posts::get_post)
                .put(posts::update_post)
                .delete(posts::delete_post),
        )
        .layer(middleware::from_fn_with_state(state.clone(), attach_identity))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE));

    let app = Router::new()
        .merge(api)
        .nest_service("/uploads", ServeDir::new(&upload_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Quill server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
