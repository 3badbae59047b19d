//! AI drafting models.
//!
//! Drafts are what the model proposes after normalisation; nothing here is
//! persisted until the caller saves it through the regular endpoints.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::contacts::ContactKind;
use super::devis::DevisResponse;
use super::pricing::{DevisTotals, PricedLine, PricingTier, TierQuote};

/// Contact proposed from free text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContactDraft {
    pub kind: ContactKind,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub notes: Option<String>,
    pub tags: Vec<String>,
}

/// Product proposed from a description.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductDraft {
    pub name: String,
    pub description: Option<String>,
    pub sku: Option<String>,
    pub unit_price: Option<Decimal>,
    pub unit: Option<String>,
    /// Name as written by the model
    pub brand: Option<String>,
    pub category: Option<String>,
    /// Resolved against the organisation's catalogue when the name matches
    pub brand_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
}

/// Brand name ideas.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrandSuggestions {
    pub names: Vec<String>,
}

/// One line proposed for a devis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DevisItemDraft {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// Catalogue product the model named, when it exists
    pub product_id: Option<Uuid>,
}

/// Devis proposed from a job description.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DevisDraft {
    pub title: String,
    pub notes: Option<String>,
    pub items: Vec<DevisItemDraft>,
}

// =============================================================================
// Endpoint DTOs
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct DraftContactRequest {
    /// Free text: email signature, business card, notes...
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DraftProductRequest {
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuggestBrandsRequest {
    pub description: String,
    #[serde(default)]
    pub count: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateDevisRequest {
    pub contact_id: Uuid,
    /// Work to be quoted
    pub description: String,
    #[serde(default)]
    pub tier: PricingTier,
    /// Persist the result as a draft devis
    #[serde(default)]
    pub save: bool,
}

/// Priced AI proposal; `devis` is set when the draft was saved.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateDevisResponse {
    pub draft: DevisDraft,
    pub tier: PricingTier,
    pub lines: Vec<PricedLine>,
    pub totals: DevisTotals,
    pub tiers: Vec<TierQuote>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub devis: Option<DevisResponse>,
}
