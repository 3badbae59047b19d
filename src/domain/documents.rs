//! Document metadata
//!
//! Files live in the external upload service; only their metadata is kept
//! here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::require_text;
use crate::api::{Listable, SortKey};
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDocumentRequest {
    pub name: String,
    /// Location returned by the upload service
    pub url: String,
    pub mime_type: String,
    pub size_bytes: i64,
    #[serde(default)]
    pub contact_id: Option<Uuid>,
    #[serde(default)]
    pub devis_id: Option<Uuid>,
}

impl CreateDocumentRequest {
    pub fn validated(mut self) -> ApiResult<Self> {
        self.name = require_text("name", &self.name)?;
        let url = self.url.trim();
        let parsed =
            url::Url::parse(url).map_err(|_| ApiError::validation("url must be an absolute URL"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ApiError::validation("url must use http or https"));
        }
        self.url = url.to_string();
        self.mime_type = require_text("mime_type", &self.mime_type)?;
        if self.size_bytes < 0 {
            return Err(ApiError::validation("size_bytes must not be negative"));
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenameDocumentRequest {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DocumentFilter {
    #[serde(default)]
    pub contact_id: Option<Uuid>,
    #[serde(default)]
    pub devis_id: Option<Uuid>,
    #[serde(default)]
    pub include_archived: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub organisation_id: Uuid,
    pub contact_id: Option<Uuid>,
    pub devis_id: Option<Uuid>,
    pub name: String,
    pub url: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub uploaded_by: Uuid,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentResponse {
    pub fn matches(&self, filter: &DocumentFilter) -> bool {
        (!self.archived || filter.include_archived)
            && filter.contact_id.map_or(true, |c| self.contact_id == Some(c))
            && filter.devis_id.map_or(true, |d| self.devis_id == Some(d))
    }
}

impl Listable for DocumentResponse {
    const SORT_COLUMNS: &'static [&'static str] = &["name", "mime_type", "size_bytes", "created_at"];

    fn search_fields(&self) -> Vec<&str> {
        vec![self.name.as_str(), self.mime_type.as_str()]
    }

    fn sort_key(&self, column: &str) -> SortKey {
        match column {
            "name" => SortKey::text(&self.name),
            "mime_type" => SortKey::text(&self.mime_type),
            "size_bytes" => SortKey::Number(self.size_bytes),
            _ => SortKey::Timestamp(self.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(url: &str, size: i64) -> CreateDocumentRequest {
        serde_json::from_value(json!({
            "name": "Bon de commande.pdf",
            "url": url,
            "mime_type": "application/pdf",
            "size_bytes": size
        }))
        .unwrap()
    }

    #[test]
    fn accepts_http_urls() {
        let req = request(" https://files.example.com/f/abc ", 2048).validated().unwrap();
        assert_eq!(req.url, "https://files.example.com/f/abc");
    }

    #[test]
    fn rejects_bad_urls_and_sizes() {
        assert!(request("not a url", 1).validated().is_err());
        assert!(request("ftp://files.example.com/a", 1).validated().is_err());
        assert!(request("https://files.example.com/a", -1).validated().is_err());
    }
}
