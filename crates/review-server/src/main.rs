mod gemini;
mod routes;

use gemini::GeminiClient;
use review_core::config::{Environment, Settings};
use routes::AppState;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let settings = Settings::from_env();
    let environment = settings
        .as_ref()
        .map(|s| s.environment)
        .unwrap_or(Environment::Production);
    init_tracing(environment);

    let settings = match settings {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Refusing to start");
            std::process::exit(1);
        }
    };

    let generator = match GeminiClient::new(&settings) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Failed to build Gemini client");
            std::process::exit(1);
        }
    };

    let port = settings.port;
    let state = Arc::new(AppState {
        settings,
        generator: Arc::new(generator),
    });
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("Failed to bind");

    info!(port, environment = %environment, "Book review generator API starting");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

/// Human-readable logs in development, JSON otherwise. `RUST_LOG` overrides
/// the default level.
fn init_tracing(environment: Environment) {
    let default_level = if environment.is_development() {
        "debug"
    } else {
        "info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    if environment.is_development() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C handler");
    info!("Shutdown signal received");
}
