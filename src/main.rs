use std::sync::Arc;

use codesync_server::api;
use codesync_server::collab::Coordinator;
use codesync_server::config::{Config, LogFormat};
use codesync_server::judge::JdoodleClient;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    init_tracing(config.log_format);

    let judge = match JdoodleClient::new(config.judge.clone()) {
        Ok(judge) => judge,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize judge client");
            std::process::exit(1);
        }
    };

    let coordinator = Coordinator::new(Arc::new(judge), config.judge.timeout());
    let routes = api::routes(coordinator, config.server.public_url.clone());

    let address = config.bind_address();
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        judge = %config.judge.api_url,
        "Code sync server starting"
    );

    let (_, server) = warp::serve(routes).bind_with_graceful_shutdown(address, async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received, closing server"),
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                futures::future::pending::<()>().await;
            }
        }
    });

    server.await;
    tracing::info!("Server closed");
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}
