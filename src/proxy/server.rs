use axum::{extract::DefaultBodyLimit, Router};
use std::net::SocketAddr;
use tracing::{debug, error};

use crate::error::AppResult;
use crate::proxy::routes::build_widget_routes;
use crate::proxy::state::AppState;

const MAX_BODY_SIZE: usize = 1024 * 1024;

pub struct AxumServer {
    pub addr: SocketAddr,
    pub handle: tokio::task::JoinHandle<()>,
}

impl AxumServer {
    pub async fn start(host: &str, port: u16, state: AppState) -> AppResult<Self> {
        let app = Router::new()
            .merge(build_widget_routes(state.clone()))
            .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
            .with_state(state);

        let bind_addr = format!("{}:{}", host, port);
        let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
        let addr = listener.local_addr()?;

        tracing::info!("Widget gateway started at http://{}", addr);

        let handle = tokio::spawn(async move {
            use hyper::server::conn::http1;
            use hyper_util::rt::TokioIo;
            use hyper_util::service::TowerToHyperService;

            loop {
                match listener.accept().await {
                    Ok((stream, _remote_addr)) => {
                        let io = TokioIo::new(stream);
                        let service = TowerToHyperService::new(app.clone());

                        tokio::task::spawn(async move {
                            if let Err(err) = http1::Builder::new().serve_connection(io, service).await
                            {
                                debug!("Connection handling ended or failed: {:?}", err);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {:?}", e);
                    }
                }
            }
        });

        Ok(Self { addr, handle })
    }
}
