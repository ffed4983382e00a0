use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use slog::{o, Drain, Logger};
use slog_async::Async;
use slog_term::{FullFormat, TermDecorator};
use std::sync::Arc;
use std::time::Instant;

/// Configuration for the access logger
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub async_buffer_size: usize,
    pub use_color: bool,
    /// Paths excluded from access logging. Load balancer health checks hit
    /// /health every few seconds and would drown out real traffic.
    pub quiet_paths: Vec<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            async_buffer_size: 1024,
            use_color: true,
            quiet_paths: vec!["/health".to_string()],
        }
    }
}

/// Builds the slog access logger. Service diagnostics go through `tracing`;
/// this drain writes one line per handled request.
pub fn setup_logger(config: &LoggerConfig) -> Logger {
    let decorator = {
        let builder = TermDecorator::new();
        let builder = if config.use_color {
            builder.force_color()
        } else {
            builder
        };
        builder.build()
    };

    let drain = FullFormat::new(decorator).build().fuse();

    let drain = Async::new(drain)
        .chan_size(config.async_buffer_size)
        .build()
        .fuse();

    Logger::root(
        drain,
        o!(
            "service" => "pawstore-api",
            "version" => env!("CARGO_PKG_VERSION"),
        ),
    )
}

/// Shared state for the access logging middleware
pub struct LoggingState {
    logger: Logger,
    quiet_paths: Vec<String>,
}

impl LoggingState {
    pub fn new(logger: Logger, config: &LoggerConfig) -> Self {
        Self {
            logger,
            quiet_paths: config.quiet_paths.clone(),
        }
    }
}

/// Per-request access logging middleware. Client and server errors are
/// escalated to warn so they stand out in the access log.
pub async fn logging_middleware(
    axum::extract::State(state): axum::extract::State<Arc<LoggingState>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let start_time = Instant::now();
    let method = req.method().to_string();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    if state.quiet_paths.iter().any(|p| p == &path) {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let duration_ms: u128 = start_time.elapsed().as_millis();

    if response.status().is_client_error() || response.status().is_server_error() {
        slog::warn!(
            &state.logger,
            "request failed";
            "method" => method,
            "path" => path,
            "status" => status,
            "duration_ms" => duration_ms,
        );
    } else {
        slog::info!(
            &state.logger,
            "request handled";
            "method" => method,
            "path" => path,
            "status" => status,
            "duration_ms" => duration_ms,
        );
    }

    Ok(response)
}
