//! Package ingest server - Main entry point.
//!
//! Starts the Actix-web server with configured routes and middleware.

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, http::header, web};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use package_ingest_lib::api::{self, ApiDoc, IntakeLimits};
use package_ingest_lib::config::Config;
use package_ingest_lib::db::{DbPool, PersistenceGateway};
use package_ingest_lib::middleware;
use package_ingest_lib::services::{
    CompletionNotifier, IngestPipeline, ObjectStore, Storage, WebhookNotifier,
};

/// Perform health check (for Docker healthcheck).
async fn health_check() -> bool {
    // Simple check - just verify we can load config
    Config::from_env().is_ok()
}

/// Log a fatal startup error and exit.
fn fail_startup(what: &str, err: impl std::fmt::Display) -> ! {
    error!("{}: {}", what, err);
    std::process::exit(1);
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Check for --health-check flag (used by Docker HEALTHCHECK)
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|arg| arg == "--health-check") {
        dotenvy::dotenv().ok();
        if health_check().await {
            std::process::exit(0);
        } else {
            std::process::exit(1);
        }
    }

    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            error!("");
            error!("Please check your environment variables:");
            error!("  - RUST_ENV must be set to 'development' or 'production'");
            error!("  - In production, DATABASE_URL, S3 credentials and the encryption key must be set");
            error!("  - In production, values must not match development defaults");
            std::process::exit(1);
        }
    };

    info!("========================================");
    info!("  Package Ingest Server");
    info!("  Environment: {}", config.environment);
    info!("========================================");

    if config.is_development() {
        warn!("Running in DEVELOPMENT mode - do not use in production!");
        info!("Using development defaults for DATABASE_URL, S3 and the encryption key");
    }

    if let Err(e) = tokio::fs::create_dir_all(&config.ingest.work_dir).await {
        fail_startup("Failed to create working directory", e);
    }

    // Initialize database
    let pool = match DbPool::new(&config.database).await {
        Ok(pool) => pool,
        Err(e) => fail_startup("Failed to initialize database", e),
    };
    info!("Database connection established");

    if let Err(e) = pool.run_migrations().await {
        fail_startup("Failed to run migrations", e);
    }
    info!("Database migrations complete");

    let storage = match Storage::new(&config.storage).await {
        Ok(storage) => storage,
        Err(e) => fail_startup("Failed to initialize S3 storage", e),
    };

    let notifier = match WebhookNotifier::new(&config.webhook) {
        Ok(notifier) => notifier,
        Err(e) => fail_startup("Failed to initialize webhook client", e),
    };
    info!("Completion webhook: {}", config.webhook.url);

    let gateway: Arc<dyn PersistenceGateway> = Arc::new(pool);
    let store: Arc<dyn ObjectStore> = Arc::new(storage);
    let notifier: Arc<dyn CompletionNotifier> = Arc::new(notifier);

    info!(
        "Upload dispatch: {} workers per request, queue capacity {}",
        config.ingest.upload_workers, config.ingest.queue_capacity
    );

    let pipeline = web::Data::new(IngestPipeline::new(
        config.ingest.clone(),
        Arc::clone(&gateway),
        store,
        notifier,
    ));
    let gateway_data: web::Data<dyn PersistenceGateway> = web::Data::from(gateway);

    // Bounds memory usage: max_concurrent_ingests x max_upload_size
    let limits = web::Data::new(IntakeLimits::new(
        config.max_upload_size,
        config.max_concurrent_ingests,
    ));
    info!(
        "Upload limits: {}MB max size, {} concurrent ingestions ({}MB peak memory)",
        config.max_upload_size / 1024 / 1024,
        config.max_concurrent_ingests,
        (config.max_upload_size * config.max_concurrent_ingests) / 1024 / 1024
    );

    let bind_address = config.bind_address();
    let is_development = config.is_development();
    let cors_origin = config.cors_allowed_origin.clone();

    let worker_count = if is_development {
        info!(
            "Starting server at http://{} (4 workers - development mode)",
            bind_address
        );
        4
    } else {
        let cpus = num_cpus::get();
        info!("Starting server at http://{} ({} workers)", bind_address, cpus);
        cpus
    };

    let server = HttpServer::new(move || {
        let cors = if is_development {
            Cors::default()
                .allowed_origin(&cors_origin)
                .allowed_origin("http://127.0.0.1:3000")
                .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
                .max_age(3600)
        } else {
            Cors::default()
                .allowed_origin(&cors_origin)
                .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
                .max_age(3600)
        };

        App::new()
            // Add CORS middleware (must be before other middleware)
            .wrap(cors)
            .wrap(middleware::RequestLogger)
            .app_data(pipeline.clone())
            .app_data(gateway_data.clone())
            .app_data(limits.clone())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", ApiDoc::openapi()),
            )
            .service(web::scope("/api/v1").configure(api::configure_routes))
    });

    server.workers(worker_count).bind(&bind_address)?.run().await
}
