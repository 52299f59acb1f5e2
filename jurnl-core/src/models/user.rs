use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity resolved from the hosted session provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl User {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            email: None,
            display_name: None,
        }
    }
}
