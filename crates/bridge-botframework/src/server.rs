//! Messaging endpoint
//!
//! `POST /api/messages` takes one activity per request and replies through the
//! connector. `GET /api/messages` upgrades to a WebSocket carrying activities
//! in both directions.

use std::future::Future;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::adapter::BotAdapter;
use crate::connector::ActivitySender;
use crate::error::Result;
use crate::types::Activity;
use crate::ws::websocket_handler;

/// Messaging endpoint path
pub const MESSAGES_PATH: &str = "/api/messages";

/// Server state
#[derive(Clone)]
pub struct ServerState {
    pub adapter: Arc<BotAdapter>,
    /// Delivery for activities received over HTTP
    pub connector: Arc<dyn ActivitySender>,
}

/// Create the messaging router
pub fn create_router(state: ServerState) -> Router {
    Router::new()
        .route(MESSAGES_PATH, post(handle_activity).get(websocket_handler))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// Handle one activity posted by the channel
async fn handle_activity(State(state): State<Arc<ServerState>>, body: Bytes) -> StatusCode {
    let activity: Activity = match serde_json::from_slice(&body) {
        Ok(activity) => activity,
        Err(e) => {
            warn!("Failed to parse activity: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };

    debug!(
        "Received {} activity on channel {:?}",
        activity.activity_type, activity.channel_id
    );

    state
        .adapter
        .process(&activity, state.connector.as_ref())
        .await;

    StatusCode::OK
}

async fn health_check() -> &'static str {
    "OK"
}

/// Serve on an already bound listener until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: ServerState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Bind `addr` and serve until a shutdown signal is broadcast
pub async fn start_server(
    addr: &str,
    state: ServerState,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Bot server listening on {}{}", addr, MESSAGES_PATH);

    serve(listener, state, async move {
        let _ = shutdown.recv().await;
        info!("Bot server shutting down");
    })
    .await
}
