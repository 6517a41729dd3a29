use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    axum::{
        Router,
        extract::Request,
        middleware::{self, Next},
        response::Response,
        routing::{delete, get, post},
    },
    secrecy::ExposeSecret,
    tokio::time::Instant,
    tower_http::cors::{Any, CorsLayer},
    tracing::{info, warn},
    wabridge_config::{AuthConfig, GatewayConfig, SqliteConfigStore},
    wabridge_driver::SidecarDriverFactory,
    wabridge_sessions::{SessionManager, SessionOptions},
};

use crate::{
    auth, routes,
    session::session_hook,
    state::{AppState, GatewaySettings},
};

// ── Router ───────────────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let client_routes = Router::new()
        .route("/screen", get(routes::screen))
        .route("/chats", post(routes::send_chat))
        .route("/sendfile", post(routes::send_file))
        .route("/info", get(routes::info))
        .route("/webhook", get(routes::get_webhook).post(routes::set_webhook))
        .route_layer(middleware::from_fn_with_state(state.clone(), session_hook));

    Router::new()
        .route("/", get(routes::welcome))
        .route("/health", get(routes::health))
        .route("/admin/clients/{client_id}", delete(routes::delete_client))
        .merge(client_routes)
        .layer(middleware::from_fn(log_request))
        .layer(cors)
        .with_state(state)
}

/// Log every API call. The query string is left out: it carries the token.
async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();
    let response = next.run(request).await;
    info!(
        %method,
        path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "API call"
    );
    response
}

// ── Startup ──────────────────────────────────────────────────────────────────

/// Seed the default client unless it already exists. Returns its token
/// when a record was created.
pub async fn seed_default_client(
    store: &SqliteConfigStore,
    auth_config: &AuthConfig,
) -> anyhow::Result<Option<String>> {
    let token = auth_config
        .bootstrap_token
        .as_ref()
        .map(|t| t.expose_secret().clone())
        .unwrap_or_else(auth::generate_token);
    let created = store.bootstrap(&auth_config.default_client, &token).await?;
    Ok(created.then_some(token))
}

/// Start the gateway and serve until interrupted.
pub async fn start_gateway(config: GatewayConfig) -> anyhow::Result<()> {
    let store = Arc::new(SqliteConfigStore::connect(&config.storage.database_url).await?);
    if seed_default_client(&store, &config.auth).await?.is_some() {
        info!(
            client = %config.auth.default_client,
            "seeded default client; `wabridge clients list` shows its token"
        );
    }
    for dir in [
        &config.storage.static_dir,
        &config.storage.media_dir,
        &config.sessions.cache_dir,
    ] {
        tokio::fs::create_dir_all(dir).await?;
    }

    let factory = SidecarDriverFactory::new(&config.sidecar.url)
        .with_request_timeout(Duration::from_secs(config.sidecar.request_timeout_secs))
        .with_launch_timeout(Duration::from_secs(config.sidecar.launch_timeout_secs))
        .with_connect_retries(config.sidecar.connect_retries);
    let options = SessionOptions::new(&config.sessions.cache_dir)
        .with_launch(config.browser.clone())
        .with_poll_interval(config.sessions.poll_interval())
        .with_semaphore_timeout(config.sessions.semaphore_timeout())
        .with_webhook_timeout(config.sessions.webhook_timeout());
    let sessions = SessionManager::new(Arc::new(factory), store, options);

    let state = AppState::new(Arc::clone(&sessions), GatewaySettings::from_config(&config));
    let version = state.version;
    let app = build_app(state);

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let lines = [
        format!("wabridge gateway v{version}"),
        format!("listening on {addr}"),
        format!("sidecar: {}", config.sidecar.url),
        format!("default client: {}", config.auth.default_client),
    ];
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sessions.shutdown().await;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl+c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
