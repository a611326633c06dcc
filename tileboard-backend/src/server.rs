/// HTTP server: binds the write endpoints and serves until Ctrl-C.
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::api::api_router;
use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    api_router().layer(cors).with_state(state)
}

pub async fn serve(state: AppState) -> Result<(), Box<dyn std::error::Error>> {
    let bind_addr = format!("{}:{}", state.config.bind_address, state.config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    let local = listener.local_addr()?;

    log::info!(target: "tileboard.server", "HTTP server listening on http://{}", local);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!(target: "tileboard.server", "Failed to listen for Ctrl-C: {}", e);
            }
            log::info!(target: "tileboard.server", "Shutting down");
        })
        .await?;
    Ok(())
}
