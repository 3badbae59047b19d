//! Activity log entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Entry to append
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub organisation_id: Uuid,
    pub user_id: Uuid,
    /// Dotted verb, e.g. `contact.created`
    pub action: &'static str,
    pub entity_type: &'static str,
    pub entity_id: Option<Uuid>,
    pub details: serde_json::Value,
}

impl NewActivity {
    pub fn new(
        organisation_id: Uuid,
        user_id: Uuid,
        action: &'static str,
        entity_type: &'static str,
        entity_id: Option<Uuid>,
    ) -> Self {
        Self {
            organisation_id,
            user_id,
            action,
            entity_type,
            entity_id,
            details: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityResponse {
    pub id: Uuid,
    pub organisation_id: Uuid,
    pub user_id: Uuid,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
