use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::{signal, sync::mpsc};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use pawstore_api as api;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);

    // Init events
    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
    let event_sender = api::events::EventSender::new(event_tx);

    // Spawn event processor with the log-backed notifier
    let notifier: Arc<dyn api::services::notifications::OrderNotifier> =
        Arc::new(api::services::notifications::LogNotifier);
    tokio::spawn(api::events::process_events(
        event_rx,
        db_arc.clone(),
        Some(notifier),
    ));

    // Auth service for bearer token validation
    let auth_cfg = api::auth::AuthConfig::new(
        cfg.jwt_secret.clone(),
        Duration::from_secs(cfg.jwt_expiration as u64),
    );
    let auth_service = Arc::new(api::auth::AuthService::new(auth_cfg));

    // Request access logging
    let logger_config = api::logging::LoggerConfig::default();
    let base_logger = api::logging::setup_logger(&logger_config);
    let logging_state = Arc::new(api::logging::LoggingState::new(base_logger, &logger_config));

    // Compose shared app state
    let app_state = api::build_state(db_arc, cfg.clone(), event_sender);

    let app = api::app_routes()
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(if cfg.is_development() {
            CorsLayer::permissive()
        } else {
            CorsLayer::new()
        })
        // Inject AuthService into request extensions for the AuthUser extractor
        .layer(axum::middleware::from_fn_with_state(
            auth_service.clone(),
            |axum::extract::State(auth): axum::extract::State<Arc<api::auth::AuthService>>,
             mut req: axum::http::Request<axum::body::Body>,
             next: axum::middleware::Next| async move {
                req.extensions_mut().insert(auth);
                next.run(req).await
            },
        ))
        .layer(axum::middleware::from_fn_with_state(
            logging_state,
            api::logging::logging_middleware,
        ))
        .with_state(app_state);

    // Bind and serve
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    info!("pawstore-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
