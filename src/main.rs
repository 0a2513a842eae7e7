mod core;
mod features;
mod shared;

use crate::core::config::Config;
use crate::core::openapi::{ApiDoc, SwaggerInfoModifier};
use crate::core::{database, middleware};
use crate::features::gateway::{routes as gateway_routes, ProxyService};
use crate::features::rate_limits::{
    routes as rate_limits_routes, ConfigStore, InMemoryConfigStore, PgConfigStore,
    RateLimitConfigService, RateLimitEngine,
};
use axum::{extract::DefaultBodyLimit, middleware::from_fn, Router};
use std::sync::Arc;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::Modify;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

fn main() -> anyhow::Result<()> {
    // Build Tokio runtime with configurable worker threads
    let worker_threads = std::env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(4)
        });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .max_blocking_threads(worker_threads * 4)
        .enable_all()
        .build()?;

    runtime.block_on(async_main(worker_threads))
}

async fn async_main(worker_threads: usize) -> anyhow::Result<()> {
    // Load .env file BEFORE initializing logger so RUST_LOG is available
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    tracing::info!(
        "System info: available_cpus={}, tokio_worker_threads={}, pid={}",
        std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(1),
        worker_threads,
        std::process::id()
    );

    tracing::info!("Configuration loaded successfully");

    // Pick the config store: Postgres when DATABASE_URL is set, memory otherwise
    let store: Arc<dyn ConfigStore> = match config.database.url.as_deref() {
        Some(url) => {
            let pool = database::create_pool(&config.database, url).await?;
            tracing::info!("Database connection pool created");

            tracing::info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;
            tracing::info!("Database migrations completed successfully");

            Arc::new(PgConfigStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, rate limit configs are kept in memory");
            Arc::new(InMemoryConfigStore::new())
        }
    };

    // Initialize Rate Limit Services
    let engine = Arc::new(RateLimitEngine::new(
        Arc::clone(&store),
        config.rate_limit.clone(),
    ));
    let rate_limit_config_service = Arc::new(RateLimitConfigService::new(
        Arc::clone(&store),
        Arc::clone(&engine),
    ));
    tracing::info!(
        "Rate limit services initialized (header={}, fallback={}/{}s, invalidate_on_write={}, store_failure_policy={:?})",
        config.rate_limit.client_header,
        config.rate_limit.default_capacity,
        config.rate_limit.default_refill_period.as_secs(),
        config.rate_limit.invalidate_on_write,
        config.rate_limit.store_failure_policy
    );

    // Initialize upstream forwarder
    let proxy = Arc::new(
        ProxyService::new(&config.upstream, config.app.max_request_body_size)
            .map_err(|e| anyhow::anyhow!("Failed to initialize proxy: {}", e))?,
    );
    match config.upstream.url.as_deref() {
        Some(url) => tracing::info!("Forwarding admitted requests to {}", url),
        None => tracing::warn!("UPSTREAM_URL not set, admitted requests will get 502"),
    }

    // Build application router with dynamic swagger config
    let swagger_modifier = SwaggerInfoModifier {
        title: config.swagger.title.clone(),
        version: config.swagger.version.clone(),
        description: config.swagger.description.clone(),
    };

    let mut openapi = ApiDoc::openapi();
    swagger_modifier.modify(&mut openapi);

    // Build swagger router
    let swagger = if let Some(credentials) = config.swagger.credentials() {
        tracing::info!("Swagger UI basic auth enabled");
        Router::new()
            .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi))
            .layer(from_fn(middleware::basic_auth_middleware(Arc::new(
                credentials,
            ))))
    } else {
        tracing::info!("Swagger UI basic auth disabled (no credentials configured)");
        Router::new().merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi))
    };

    // Simple health check endpoint (not rate limited)
    async fn health_check() -> axum::http::StatusCode {
        axum::http::StatusCode::OK
    }
    let health_route = Router::new().route("/health", axum::routing::get(health_check));

    let app = Router::new()
        .merge(swagger)
        .merge(rate_limits_routes::routes(
            rate_limit_config_service,
            Arc::clone(&engine),
        ))
        .merge(health_route)
        // Everything else is proxied, behind admission
        .fallback_service(gateway_routes::routes(proxy, engine))
        .layer(DefaultBodyLimit::max(config.app.max_request_body_size))
        .layer(middleware::cors_layer(
            config.app.cors_allowed_origins.clone(),
        ))
        // Propagate X-Request-Id to response headers
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(middleware::MakeSpanWithRequestId)
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Generate X-Request-Id using UUID v7 (or use client-provided one)
        .layer(SetRequestIdLayer::x_request_id(middleware::MakeRequestUuid));

    // Start server
    let addr = config.app.server_address();
    let socket_addr: std::net::SocketAddr = addr
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid address: {}", e))?;

    // Use socket2 for TCP listener configuration
    let socket = socket2::Socket::new(
        socket2::Domain::for_address(socket_addr),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_nodelay(true)?;

    socket.set_recv_buffer_size(256 * 1024)?;
    socket.set_send_buffer_size(256 * 1024)?;

    #[cfg(target_os = "linux")]
    {
        let keepalive = socket2::TcpKeepalive::new()
            .with_time(std::time::Duration::from_secs(60))
            .with_interval(std::time::Duration::from_secs(10))
            .with_retries(3);
        socket.set_tcp_keepalive(&keepalive)?;
    }
    #[cfg(not(target_os = "linux"))]
    {
        let keepalive = socket2::TcpKeepalive::new().with_time(std::time::Duration::from_secs(60));
        socket.set_tcp_keepalive(&keepalive)?;
    }

    socket.set_nonblocking(true)?;
    socket.bind(&socket_addr.into())?;
    socket.listen(65535)?;

    let listener = tokio::net::TcpListener::from_std(socket.into())?;
    tracing::info!("Server listening on {}", format!("http://{}", addr));
    tracing::info!(
        "Swagger UI available at {}",
        format!("http://{}/swagger-ui/", addr)
    );

    axum::serve(listener, app).await?;

    Ok(())
}
