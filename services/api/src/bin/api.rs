//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        DbAdapter, HttpFunctionsAdapter, NoopNotifier, ObjectStorageAdapter, OpenAiChatAdapter,
        PgChangeFeed, WebhookNotifier,
    },
    config::Config,
    error::ApiError,
    web::{
        auth::{login_handler, logout_handler, me_handler, signup_handler},
        chat::chat_handler,
        packages::{
            create_package_handler, delete_package_handler, list_packages_handler,
            templates_handler,
        },
        packages_ws_handler,
        reader::{navigate_handler, reader_handler},
        reports::{
            company_history_handler, create_report_handler, delete_report_handler,
            exercise_handler, health_score_handler, list_reports_handler, new_company_handler,
            rerun_report_handler,
        },
        require_auth,
        rest::{
            credits_handler, delete_document_handler, list_documents_handler,
            upload_document_handler, ApiDoc,
        },
        state::{load_book, AppState},
    },
};
use async_openai::{config::OpenAIConfig, Client};
use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    Method,
};
use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use coaching_core::ports::{AdvisorChat, Notifier};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Room for a 10 MB document plus the multipart framing.
const BODY_LIMIT_BYTES: usize = 11 * 1024 * 1024;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .map_err(ApiError::Connect)?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool.clone()));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let http = reqwest::Client::new();
    let shutdown = CancellationToken::new();

    let storage_adapter = Arc::new(ObjectStorageAdapter::new(
        http.clone(),
        config.storage_url.clone(),
        config.storage_bucket.clone(),
        config.service_key.clone(),
        db_pool.clone(),
    ));
    let functions_adapter = Arc::new(HttpFunctionsAdapter::new(
        http.clone(),
        config.functions_url.clone(),
        config.service_key.clone(),
    ));
    let change_feed = Arc::new(
        PgChangeFeed::start(&db_pool, shutdown.clone())
            .await
            .map_err(ApiError::ChangeFeed)?,
    );

    let notifier: Arc<dyn Notifier> = match &config.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(http.clone(), url.clone())),
        None => {
            info!("No webhook configured; notifications are only logged.");
            Arc::new(NoopNotifier)
        }
    };

    let chat: Option<Arc<dyn AdvisorChat>> = match &config.openai_api_key {
        Some(key) => {
            let openai_client = Client::with_config(OpenAIConfig::new().with_api_key(key));
            Some(Arc::new(OpenAiChatAdapter::new(openai_client, config.chat_model.clone())))
        }
        None => {
            warn!("OPENAI_API_KEY not set; the advisor chat is disabled.");
            None
        }
    };

    let book = match load_book(&config.book_path) {
        Ok(chapters) => {
            info!(chapters = chapters.len(), path = %config.book_path.display(), "Book loaded");
            chapters
        }
        Err(e) => {
            warn!(path = %config.book_path.display(), error = %e, "Could not load the book; the reader is disabled.");
            Vec::new()
        }
    };

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        db: db_adapter.clone(),
        credits: db_adapter.clone(),
        documents: storage_adapter,
        reports: db_adapter.clone(),
        packages: db_adapter,
        functions: functions_adapter,
        changes: change_feed,
        notifier,
        chat,
        config: config.clone(),
        book: Arc::new(book),
    });

    let cors = CorsLayer::new()
        .allow_origin(config.cors_origin.clone())
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/signup", post(signup_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/auth/me", get(me_handler))
        .route("/credits", get(credits_handler))
        .route("/documents", get(list_documents_handler).post(upload_document_handler))
        .route("/documents/{id}", delete(delete_document_handler))
        .route("/reports", get(list_reports_handler).post(create_report_handler))
        .route("/reports/health-score", post(health_score_handler))
        .route("/reports/exercise", post(exercise_handler))
        .route("/reports/new-company", post(new_company_handler))
        .route("/reports/{id}", delete(delete_report_handler))
        .route("/reports/{id}/rerun", post(rerun_report_handler))
        .route("/reports/{id}/history", get(company_history_handler))
        .route(
            "/reports/{id}/packages",
            get(list_packages_handler).post(create_package_handler),
        )
        .route("/reports/{id}/packages/ws", get(packages_ws_handler))
        .route("/packages/{id}", delete(delete_package_handler))
        .route("/package-templates", get(templates_handler))
        .route("/reader", get(reader_handler))
        .route("/reader/navigate", post(navigate_handler))
        .route("/chat", post(chat_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Combine API routes
    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .map_err(|source| ApiError::Bind {
            address: config.bind_address.to_string(),
            source,
        })?;
    let stop = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            stop.cancel();
        })
        .await
        .map_err(ApiError::Serve)?;

    shutdown.cancel();
    info!("Server stopped.");
    Ok(())
}
