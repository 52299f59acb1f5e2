use axum::http::StatusCode;
use jurnl_core::actions::StreamAction;
use jurnl_core::models::User;
use jurnl_core::store::Store;
use serde_json::Value;

use crate::subsystems::streams::{self, ActionResult};

/// Dispatch a parsed stream action for an authenticated caller.
pub async fn handle_action(action: StreamAction, user: &User, store: &dyn Store) -> ActionResult {
    tracing::debug!(action = action.name(), user_id = %user.id, "Handling stream action");

    match action {
        StreamAction::CreateStream { topic } => streams::create_stream(store, user, topic).await,
        StreamAction::GetAllUserStreams => streams::list_streams(store, user).await,
        StreamAction::GetStreamWithUpdates { stream_id } => {
            streams::stream_with_updates(store, user, stream_id).await
        }
        StreamAction::DeleteStream { stream_id } => streams::delete_stream(store, user, stream_id).await,
        StreamAction::GetDashboardStats => streams::dashboard_stats(store, user).await,
    }
}

pub fn into_http(result: ActionResult) -> (StatusCode, Value) {
    match result {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => (e.status, e.to_json()),
    }
}
