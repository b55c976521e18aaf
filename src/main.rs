use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{http::HeaderValue, routing::get, Router};
use tokio::{signal, sync::mpsc};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};
use tracing::{error, info, warn};

use retail_pos_api as api;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);

    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
    let event_sender = api::events::EventSender::new(event_tx);
    tokio::spawn(api::events::process_events(event_rx, Vec::new()));

    let dispatcher = match api::notifications::NotificationDispatcher::from_config(&cfg) {
        Ok(dispatcher) => dispatcher,
        Err(e) => {
            warn!("Notification channels misconfigured, falling back to log-only: {}", e);
            api::notifications::NotificationDispatcher::log_only()
        }
    };
    let outbox_worker = api::notifications::outbox::start_worker(
        db_arc.clone(),
        Arc::new(dispatcher),
        cfg.outbox_poll_interval(),
        cfg.outbox_batch_size,
        cfg.outbox_max_attempts,
    );

    let services = api::handlers::AppServices::new(db_arc.clone(), event_sender.clone());
    let app_state = api::AppState {
        db: db_arc.clone(),
        config: cfg.clone(),
        event_sender,
        services,
        health: api::health::HealthState::new(),
    };

    let origins: Vec<HeaderValue> = cfg
        .cors_origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    let cors_layer = if !origins.is_empty() {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if cfg.is_production() {
        anyhow::bail!("Missing CORS configuration: set APP__CORS_ALLOWED_ORIGINS");
    } else {
        info!("Using permissive CORS outside production");
        CorsLayer::permissive()
    };

    let app = Router::<api::AppState>::new()
        .route("/", get(|| async { "retail-pos-api up" }))
        .merge(api::app_router())
        .merge(api::openapi::swagger_ui())
        .layer(axum::middleware::from_fn(
            api::middleware_helpers::security_headers_middleware,
        ))
        .layer(api::tracing::configure_http_tracing())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(CompressionLayer::new())
        .layer(cors_layer)
        .layer(axum::middleware::from_fn(
            api::middleware_helpers::request_id_middleware,
        ))
        .with_state(app_state);

    let ip: std::net::IpAddr = cfg.host.parse()?;
    let addr = SocketAddr::from((ip, cfg.port));
    info!("retail-pos-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    outbox_worker.abort();
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
