pub mod error;
mod modules;
mod proxy;

use tracing::{error, info, warn};

use crate::error::{AppError, AppResult};

async fn start_gateway_runtime() -> AppResult<proxy::AxumServer> {
    let config = modules::system::config::load_widget_config();
    modules::system::validation::validate_widget_config(&config).map_err(|errors| {
        AppError::Config(format!(
            "configuration_validation_failed:\n{}",
            errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("\n")
        ))
    })?;

    info!("Starting widget gateway on port {}", config.port);
    if config.allow_lan_access {
        warn!("LAN access is enabled (bind address will be 0.0.0.0)");
    } else {
        info!("LAN access is disabled (bind address will be 127.0.0.1)");
    }

    let host = config.get_bind_address().to_string();
    let port = config.port;
    let state = proxy::AppState::new(config);
    proxy::AxumServer::start(&host, port, state).await
}

pub fn run() {
    modules::system::logger::init_logger();

    let runtime = tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime");
    runtime.block_on(async {
        let server = match start_gateway_runtime().await {
            Ok(server) => server,
            Err(e) => {
                error!("{}", e);
                std::process::exit(1);
            }
        };

        info!(
            "Widget gateway is running at http://{}. Press Ctrl+C to exit.",
            server.addr
        );
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutting down widget gateway");
        server.handle.abort();
    });
}
