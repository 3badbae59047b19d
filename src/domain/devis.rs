//! Devis (quote) types and status lifecycle

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::pricing::{quantity_problem, unit_price_problem, DevisTotals, PricingTier};
use super::{nullable, optional_text, require_text};
use crate::api::{Listable, SortKey};
use crate::error::{ApiError, ApiResult};

/// Devis status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum DevisStatus {
    #[default]
    Draft,
    Sent,
    Accepted,
    Rejected,
    Expired,
}

impl DevisStatus {
    pub const ALL: [DevisStatus; 5] = [
        Self::Draft,
        Self::Sent,
        Self::Accepted,
        Self::Rejected,
        Self::Expired,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|st| st.as_str() == s)
    }

    pub fn can_transition_to(self, next: DevisStatus) -> bool {
        use DevisStatus::*;
        matches!(
            (self, next),
            (Draft, Sent) | (Draft, Expired) | (Sent, Accepted) | (Sent, Rejected) | (Sent, Expired)
        )
    }

    /// Items and header can only change while drafting
    pub fn is_editable(self) -> bool {
        self == Self::Draft
    }
}

/// Human-facing devis number, e.g. `DEV-2026-0007`
pub fn format_devis_number(year: i32, sequence: i32) -> String {
    format!("DEV-{}-{:04}", year, sequence)
}

/// Line item as submitted
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DevisItemInput {
    /// Catalogue product; fills description and price when those are omitted
    #[serde(default)]
    pub product_id: Option<Uuid>,
    #[serde(default)]
    pub description: Option<String>,
    pub quantity: Decimal,
    /// Catalogue (standard tier) unit price
    #[serde(default)]
    pub unit_price: Option<Decimal>,
}

impl DevisItemInput {
    fn check(&self, index: usize) -> ApiResult<()> {
        if let Some(problem) = quantity_problem(self.quantity) {
            return Err(ApiError::validation(format!(
                "items[{}].quantity {}",
                index, problem
            )));
        }
        if let Some(problem) = self.unit_price.and_then(unit_price_problem) {
            return Err(ApiError::validation(format!(
                "items[{}].unit_price {}",
                index, problem
            )));
        }
        let has_description = self
            .description
            .as_deref()
            .is_some_and(|d| !d.trim().is_empty());
        if self.product_id.is_none() && (!has_description || self.unit_price.is_none()) {
            return Err(ApiError::validation(format!(
                "items[{}] needs a product_id or a description and unit_price",
                index
            )));
        }
        Ok(())
    }
}

pub fn validate_items(items: &[DevisItemInput]) -> ApiResult<()> {
    if items.is_empty() {
        return Err(ApiError::validation("a devis needs at least one item"));
    }
    items.iter().enumerate().try_for_each(|(i, item)| item.check(i))
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDevisRequest {
    pub contact_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub tier: PricingTier,
    #[serde(default)]
    pub valid_until: Option<NaiveDate>,
    pub items: Vec<DevisItemInput>,
}

impl CreateDevisRequest {
    pub fn validated(mut self) -> ApiResult<Self> {
        self.title = require_text("title", &self.title)?;
        validate_items(&self.items)?;
        Ok(self)
    }
}

/// Replaces header fields; `items`, when present, replaces every line.
/// `notes` and `valid_until` are cleared by `null` (or blank notes).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct UpdateDevisRequest {
    #[serde(default)]
    pub contact_id: Option<Uuid>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub notes: Option<Option<String>>,
    #[serde(default)]
    pub tier: Option<PricingTier>,
    #[serde(default, deserialize_with = "nullable")]
    pub valid_until: Option<Option<NaiveDate>>,
    #[serde(default)]
    pub items: Option<Vec<DevisItemInput>>,
}

impl UpdateDevisRequest {
    pub fn validated(mut self) -> ApiResult<Self> {
        if let Some(title) = &self.title {
            self.title = Some(require_text("title", title)?);
        }
        self.notes = self.notes.map(|n| optional_text(n.as_deref()));
        if let Some(items) = &self.items {
            validate_items(items)?;
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeDevisStatusRequest {
    pub status: DevisStatus,
}

/// Items to price under every tier
#[derive(Debug, Clone, Deserialize)]
pub struct CompareTiersRequest {
    pub items: Vec<DevisItemInput>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DevisFilter {
    #[serde(default)]
    pub status: Option<DevisStatus>,
    #[serde(default)]
    pub contact_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevisItemResponse {
    pub id: Uuid,
    pub position: i32,
    pub product_id: Option<Uuid>,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub tier_unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevisResponse {
    pub id: Uuid,
    pub organisation_id: Uuid,
    pub contact_id: Uuid,
    pub contact_name: Option<String>,
    pub number: String,
    pub title: String,
    pub notes: Option<String>,
    pub tier: PricingTier,
    pub status: DevisStatus,
    pub valid_until: Option<NaiveDate>,
    #[serde(flatten)]
    pub totals: DevisTotals,
    /// Empty on list endpoints
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub items: Vec<DevisItemResponse>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DevisResponse {
    pub fn matches(&self, filter: &DevisFilter) -> bool {
        filter.status.map_or(true, |s| s == self.status)
            && filter.contact_id.map_or(true, |c| c == self.contact_id)
    }
}

impl Listable for DevisResponse {
    const SORT_COLUMNS: &'static [&'static str] = &[
        "number",
        "title",
        "contact",
        "status",
        "total",
        "valid_until",
        "created_at",
    ];

    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.number.as_str(), self.title.as_str()];
        fields.extend(self.contact_name.as_deref());
        fields
    }

    fn sort_key(&self, column: &str) -> SortKey {
        match column {
            "number" => SortKey::text(&self.number),
            "title" => SortKey::text(&self.title),
            "contact" => SortKey::opt_text(self.contact_name.as_deref()),
            "status" => SortKey::text(self.status.as_str()),
            "total" => SortKey::Decimal(self.totals.total),
            "valid_until" => self.valid_until.map(SortKey::Date).unwrap_or(SortKey::Missing),
            _ => SortKey::Timestamp(self.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_transitions() {
        use DevisStatus::*;
        let allowed: Vec<(DevisStatus, DevisStatus)> = DevisStatus::ALL
            .into_iter()
            .flat_map(|from| DevisStatus::ALL.into_iter().map(move |to| (from, to)))
            .filter(|(from, to)| from.can_transition_to(*to))
            .collect();

        assert_eq!(
            allowed,
            vec![
                (Draft, Sent),
                (Draft, Expired),
                (Sent, Accepted),
                (Sent, Rejected),
                (Sent, Expired),
            ]
        );
        assert!(Draft.is_editable());
        assert!(!Sent.is_editable());
    }

    #[test]
    fn numbers_are_zero_padded() {
        assert_eq!(format_devis_number(2026, 7), "DEV-2026-0007");
        assert_eq!(format_devis_number(2026, 12345), "DEV-2026-12345");
    }

    #[test]
    fn item_validation() {
        let ok: Vec<DevisItemInput> = serde_json::from_value(json!([
            { "product_id": Uuid::new_v4(), "quantity": 2 },
            { "description": "Main d'oeuvre", "quantity": "1.5", "unit_price": 15000 }
        ]))
        .unwrap();
        assert!(validate_items(&ok).is_ok());

        assert!(validate_items(&[]).is_err());

        let zero: Vec<DevisItemInput> = serde_json::from_value(json!([
            { "description": "x", "quantity": 0, "unit_price": 1 }
        ]))
        .unwrap();
        assert!(validate_items(&zero).is_err());

        let free_text_without_price: Vec<DevisItemInput> =
            serde_json::from_value(json!([{ "description": "x", "quantity": 1 }])).unwrap();
        assert!(validate_items(&free_text_without_price).is_err());

        let negative: Vec<DevisItemInput> = serde_json::from_value(json!([
            { "description": "x", "quantity": 1, "unit_price": -5 }
        ]))
        .unwrap();
        assert!(validate_items(&negative).is_err());
    }

    #[test]
    fn item_amounts_must_fit_storage() {
        let oversized: Vec<DevisItemInput> = serde_json::from_value(json!([{
            "description": "x",
            "quantity": "100000000000000000000",
            "unit_price": "100000000000000000000"
        }]))
        .unwrap();
        assert!(matches!(
            validate_items(&oversized),
            Err(ApiError::Validation(_))
        ));

        let tiny: Vec<DevisItemInput> = serde_json::from_value(json!([
            { "description": "x", "quantity": "0.0001", "unit_price": 1 }
        ]))
        .unwrap();
        assert!(matches!(validate_items(&tiny), Err(ApiError::Validation(_))));

        let fine_price: Vec<DevisItemInput> = serde_json::from_value(json!([
            { "description": "x", "quantity": "1.500", "unit_price": "10.005" }
        ]))
        .unwrap();
        assert!(validate_items(&fine_price).is_err());

        let ok: Vec<DevisItemInput> = serde_json::from_value(json!([
            { "description": "x", "quantity": "1.250", "unit_price": "10.50" }
        ]))
        .unwrap();
        assert!(validate_items(&ok).is_ok());
    }

    #[test]
    fn create_request_defaults_to_standard_tier() {
        let req: CreateDevisRequest = serde_json::from_value(json!({
            "contact_id": Uuid::new_v4(),
            "title": " Rénovation cuisine ",
            "items": [{ "description": "Carrelage", "quantity": 12, "unit_price": 8000 }]
        }))
        .unwrap();
        let req = req.validated().unwrap();
        assert_eq!(req.tier, PricingTier::Standard);
        assert_eq!(req.title, "Rénovation cuisine");
    }

    #[test]
    fn update_distinguishes_absent_from_cleared() {
        let untouched: UpdateDevisRequest = serde_json::from_value(json!({ "title": "t" })).unwrap();
        let untouched = untouched.validated().unwrap();
        assert_eq!(untouched.notes, None);
        assert_eq!(untouched.valid_until, None);

        let cleared: UpdateDevisRequest =
            serde_json::from_value(json!({ "notes": null, "valid_until": null })).unwrap();
        let cleared = cleared.validated().unwrap();
        assert_eq!(cleared.notes, Some(None));
        assert_eq!(cleared.valid_until, Some(None));

        let blank: UpdateDevisRequest = serde_json::from_value(json!({ "notes": "   " })).unwrap();
        assert_eq!(blank.validated().unwrap().notes, Some(None));

        let set: UpdateDevisRequest = serde_json::from_value(json!({
            "notes": " Livraison incluse ",
            "valid_until": "2026-12-31"
        }))
        .unwrap();
        let set = set.validated().unwrap();
        assert_eq!(set.notes, Some(Some("Livraison incluse".to_string())));
        assert_eq!(set.valid_until, NaiveDate::from_ymd_opt(2026, 12, 31).map(Some));
    }

    #[test]
    fn totals_are_flattened_in_json() {
        let totals = DevisTotals::from_subtotal(Decimal::from(1000), &Default::default()).unwrap();
        let devis = DevisResponse {
            id: Uuid::new_v4(),
            organisation_id: Uuid::new_v4(),
            contact_id: Uuid::new_v4(),
            contact_name: None,
            number: format_devis_number(2026, 1),
            title: "t".into(),
            notes: None,
            tier: PricingTier::Premium,
            status: DevisStatus::Draft,
            valid_until: None,
            totals,
            items: vec![],
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let value = serde_json::to_value(&devis).unwrap();
        assert_eq!(value["tier"], "premium");
        assert_eq!(value["status"], "draft");
        assert!(value.get("total").is_some());
        assert!(value.get("items").is_none());
    }
}
