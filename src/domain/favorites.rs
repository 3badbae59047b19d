use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What can be starred
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FavoriteKind {
    Contact,
    Product,
}

impl FavoriteKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Contact => "contact",
            Self::Product => "product",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "contact" => Some(Self::Contact),
            "product" => Some(Self::Product),
            _ => None,
        }
    }

    /// Table holding the starred entity
    pub fn table(self) -> &'static str {
        match self {
            Self::Contact => "contacts",
            Self::Product => "products",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToggleFavoriteRequest {
    pub entity_type: FavoriteKind,
    pub entity_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleFavoriteResponse {
    pub entity_type: FavoriteKind,
    pub entity_id: Uuid,
    pub favorite: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FavoriteResponse {
    pub entity_type: FavoriteKind,
    pub entity_id: Uuid,
    /// Display name of the starred contact or product
    pub name: String,
    pub created_at: DateTime<Utc>,
}
