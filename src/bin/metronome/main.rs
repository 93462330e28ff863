#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_copy_implementations)]
#![deny(missing_debug_implementations)]

use axum::{
    Extension, Router,
    extract::Path as UrlPath,
    http::StatusCode,
    routing::get,
};
use metronome::{
    DEFAULT_HOST, DEFAULT_PORT, adapter,
    config::{self, Config, ConfigError, LogLevel},
    exporter::Exporter,
    filter::Filter,
    hook::{Instrumentation, InstrumentationOptions, MetronomeContext},
    logger,
};
use std::{
    env,
    io::{Error, ErrorKind, Result},
    net::SocketAddr,
    path::Path,
    sync::Arc,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let loaded = load_config();
    logger::enable_logging_subsystem(
        loaded
            .as_ref()
            .map_or(LogLevel::default(), Config::effective_log_level),
    );
    let config = Arc::new(config::config_or_default(loaded));

    let exporter = Exporter::spawn(Arc::clone(&config));
    let filter = Arc::new(Filter::new(Arc::clone(&config)));
    let options = InstrumentationOptions {
        app_version: env::var("APP_VERSION").unwrap_or_default(),
        hash: env::var("APP_BUILD_HASH").unwrap_or_default(),
        ..InstrumentationOptions::default()
    };
    let instrumentation = Instrumentation::new(filter, exporter.clone(), options)
        .map(Arc::new)
        .map_err(|e| Error::new(ErrorKind::InvalidInput, e.to_string()))?;

    let app = adapter::instrumented(demo_routes(), instrumentation);

    let port = env::var("METRONOME_PORT")
        .ok()
        .and_then(|port| port.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let address = format!("{DEFAULT_HOST}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Serving on {address}, exporting to {}", exporter.endpoint());

    let shutdown_token = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown_token.clone()));

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_token.cancelled_owned())
    .await;
    if let Err(e) = &served {
        error!("Server stopped: {e}");
    }

    debug!("Flushing pending telemetry");
    exporter.shutdown().await;

    served
}

fn load_config() -> std::result::Result<Config, ConfigError> {
    let config_directory = env::var("METRONOME_CONFIG_DIR").unwrap_or_else(|_| ".".to_string());
    config::get_config(Path::new(&config_directory))
}

async fn wait_for_signal(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    debug!("Shutdown signal received");
    shutdown_token.cancel();
}

fn demo_routes() -> Router {
    Router::new()
        .route("/", get(|| async { "metronome demo" }))
        .route("/healthz", get(|| async { StatusCode::OK }))
        .route("/products/{id}", get(product))
}

async fn product(
    UrlPath(id): UrlPath<String>,
    Extension(context): Extension<MetronomeContext>,
) -> (StatusCode, String) {
    let span = context.route_span("routes/products.$id", "loader");

    let status = if id.chars().all(|c| c.is_ascii_digit()) {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };

    if let Some(mut span) = span {
        span.set_attribute("product.id", id.as_str());
        context.send_span(span.end(None));
    }

    (status, format!("product {id}"))
}
