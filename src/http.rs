//! Notifier listener.
//!
//! The host automation server pushes its alerts here as JSON; the
//! router fans them out over SMS. This is the only inbound HTTP
//! surface the bridge exposes.

use crate::notify::{NotificationEvent, NotificationRouter};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use std::sync::Arc;
use tracing::{error, info};

pub fn router(notifier: Arc<NotificationRouter>) -> Router {
    Router::new()
        .route("/notify", post(notify))
        .with_state(notifier)
}

async fn notify(
    State(notifier): State<Arc<NotificationRouter>>,
    Json(event): Json<NotificationEvent>,
) -> StatusCode {
    notifier.route(&event).await;
    StatusCode::NO_CONTENT
}

/// Bind and serve the notifier endpoint in a background task.
pub async fn spawn(listen: &str, notifier: Arc<NotificationRouter>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!("notifier listening on {listen}");
    let app = router(notifier);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("notifier listener stopped: {e}");
        }
    });
    Ok(())
}
