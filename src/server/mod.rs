pub mod routes;
pub mod state;
pub mod ws;

pub use routes::routes;
pub use state::{AppState, ChatRequest, ChatResponse, ServerEvent, StatusReport};

use std::future::Future;
use std::net::SocketAddr;

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve(
    state: AppState,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), warp::Error> {
    let (bound, server) = warp::serve(routes(state)).try_bind_with_graceful_shutdown(addr, shutdown)?;
    tracing::info!(%bound, "dialogue server listening");
    server.await;
    tracing::info!("dialogue server stopped");
    Ok(())
}
