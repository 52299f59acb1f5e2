//! Request envelope for the multiplexed stream-management endpoint.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StreamAction {
    CreateStream {
        #[serde(default, deserialize_with = "lenient_string")]
        topic: Option<String>,
    },
    GetAllUserStreams,
    GetStreamWithUpdates {
        #[serde(default, deserialize_with = "lenient_id")]
        stream_id: Option<i64>,
    },
    DeleteStream {
        #[serde(default, deserialize_with = "lenient_id")]
        stream_id: Option<i64>,
    },
    GetDashboardStats,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionParseError {
    /// Body is not a JSON object.
    InvalidBody,
    /// `action` missing or not one of the known names.
    InvalidAction,
}

impl StreamAction {
    pub fn parse(body: Value) -> Result<Self, ActionParseError> {
        if !body.is_object() {
            return Err(ActionParseError::InvalidBody);
        }
        serde_json::from_value(body).map_err(|_| ActionParseError::InvalidAction)
    }

    pub fn name(&self) -> &'static str {
        match self {
            StreamAction::CreateStream { .. } => "create_stream",
            StreamAction::GetAllUserStreams => "get_all_user_streams",
            StreamAction::GetStreamWithUpdates { .. } => "get_stream_with_updates",
            StreamAction::DeleteStream { .. } => "delete_stream",
            StreamAction::GetDashboardStats => "get_dashboard_stats",
        }
    }
}

/// Strings pass through; anything else reads as absent.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

/// Integer ids, also accepted as numeric strings.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}
