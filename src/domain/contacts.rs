//! Contact (CRM record) types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{normalize_tags, require_text, validate_email};
use crate::api::{Listable, SortKey};
use crate::error::ApiResult;

/// Person or company
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContactKind {
    #[default]
    Person,
    Company,
}

impl ContactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Company => "company",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "company" => Self::Company,
            _ => Self::Person,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateContactRequest {
    #[serde(default)]
    pub kind: ContactKind,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CreateContactRequest {
    /// Trim fields, check the name and email, normalise tags.
    pub fn validated(mut self) -> ApiResult<Self> {
        self.name = require_text("name", &self.name)?;
        self.email = validate_email(self.email.as_deref())?;
        self.tags = normalize_tags(&self.tags);
        Ok(self)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct UpdateContactRequest {
    #[serde(default)]
    pub kind: Option<ContactKind>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

impl UpdateContactRequest {
    pub fn validated(mut self) -> ApiResult<Self> {
        if let Some(name) = &self.name {
            self.name = Some(require_text("name", name)?);
        }
        self.email = validate_email(self.email.as_deref())?;
        self.tags = self.tags.map(|t| normalize_tags(&t));
        Ok(self)
    }
}

/// Filters specific to the contact list
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ContactFilter {
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub kind: Option<ContactKind>,
    #[serde(default)]
    pub include_archived: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactResponse {
    pub id: Uuid,
    pub organisation_id: Uuid,
    pub kind: ContactKind,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub notes: Option<String>,
    pub tags: Vec<String>,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContactResponse {
    pub fn matches(&self, filter: &ContactFilter) -> bool {
        if self.archived && !filter.include_archived {
            return false;
        }
        if filter.kind.is_some_and(|k| k != self.kind) {
            return false;
        }
        match filter.tag.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            Some(tag) => self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)),
            None => true,
        }
    }
}

impl Listable for ContactResponse {
    const SORT_COLUMNS: &'static [&'static str] =
        &["name", "email", "city", "created_at", "updated_at"];

    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.name.as_str()];
        fields.extend(self.email.as_deref());
        fields.extend(self.phone.as_deref());
        fields
    }

    fn sort_key(&self, column: &str) -> SortKey {
        match column {
            "name" => SortKey::text(&self.name),
            "email" => SortKey::opt_text(self.email.as_deref()),
            "city" => SortKey::opt_text(self.city.as_deref()),
            "updated_at" => SortKey::Timestamp(self.updated_at),
            _ => SortKey::Timestamp(self.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;

    fn contact(tags: &[&str], archived: bool) -> ContactResponse {
        ContactResponse {
            id: Uuid::new_v4(),
            organisation_id: Uuid::new_v4(),
            kind: ContactKind::Company,
            name: "Sénégal Import".into(),
            email: Some("contact@senimport.sn".into()),
            phone: Some("+221 77 000 00 00".into()),
            address: None,
            city: Some("Dakar".into()),
            country: Some("SN".into()),
            notes: None,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            archived,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn create_request_validation() {
        let req: CreateContactRequest = serde_json::from_value(serde_json::json!({
            "name": "  Awa Diallo ",
            "email": " awa@example.com ",
            "tags": ["VIP", "vip", " ", "client"]
        }))
        .unwrap();
        let req = req.validated().unwrap();
        assert_eq!(req.name, "Awa Diallo");
        assert_eq!(req.email.as_deref(), Some("awa@example.com"));
        assert_eq!(req.tags, vec!["VIP".to_string(), "client".to_string()]);
        assert_eq!(req.kind, ContactKind::Person);
    }

    #[test]
    fn create_request_rejects_blank_name_and_bad_email() {
        let req: CreateContactRequest =
            serde_json::from_value(serde_json::json!({ "name": "   " })).unwrap();
        assert!(matches!(req.validated(), Err(ApiError::Validation(_))));

        let req: CreateContactRequest =
            serde_json::from_value(serde_json::json!({ "name": "X", "email": "nope" })).unwrap();
        assert!(matches!(req.validated(), Err(ApiError::Validation(_))));
    }

    #[test]
    fn filter_by_tag_and_archive_state() {
        let c = contact(&["Fournisseur"], false);
        assert!(c.matches(&ContactFilter::default()));
        assert!(c.matches(&ContactFilter {
            tag: Some("fournisseur".into()),
            ..Default::default()
        }));
        assert!(!c.matches(&ContactFilter {
            tag: Some("client".into()),
            ..Default::default()
        }));
        assert!(!c.matches(&ContactFilter {
            kind: Some(ContactKind::Person),
            ..Default::default()
        }));

        let archived = contact(&[], true);
        assert!(!archived.matches(&ContactFilter::default()));
        assert!(archived.matches(&ContactFilter {
            include_archived: true,
            ..Default::default()
        }));
    }

    #[test]
    fn searchable_by_phone() {
        let c = contact(&[], false);
        assert!(c.search_fields().iter().any(|f| f.contains("77 000")));
    }
}
