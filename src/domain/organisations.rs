//! Organisation (tenant) types and slug generation

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::team::Role;
use super::{optional_text, require_text, validate_email};
use crate::error::{ApiError, ApiResult};

/// Longest slug we store
pub const SLUG_MAX_LEN: usize = 50;

fn fold_accent(c: char) -> Option<&'static str> {
    let folded = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => "a",
        'ç' => "c",
        'è' | 'é' | 'ê' | 'ë' => "e",
        'ì' | 'í' | 'î' | 'ï' => "i",
        'ñ' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => "o",
        'ù' | 'ú' | 'û' | 'ü' => "u",
        'ý' | 'ÿ' => "y",
        'æ' => "ae",
        'œ' => "oe",
        'ß' => "ss",
        _ => return None,
    };
    Some(folded)
}

/// URL-safe identifier derived from an organisation name.
///
/// The result only contains `[a-z0-9-]`, has no leading, trailing or doubled
/// hyphens, is at most [`SLUG_MAX_LEN`] characters, and is unchanged when
/// fed back in.
pub fn generate_slug(input: &str) -> String {
    let mut slug = String::with_capacity(input.len().min(SLUG_MAX_LEN * 2));

    for c in input.chars().flat_map(char::to_lowercase) {
        if c.is_whitespace() || c == '_' || c == '-' {
            if !slug.is_empty() && !slug.ends_with('-') {
                slug.push('-');
            }
        } else if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if let Some(folded) = fold_accent(c) {
            slug.push_str(folded);
        }
    }

    // Only ASCII remains, so byte truncation is safe
    slug.truncate(SLUG_MAX_LEN);
    slug.trim_end_matches('-').to_string()
}

/// Slug to try on the `attempt`-th collision: `base`, `base-2`, `base-3`, ...
/// The base is shortened so the suffix always fits.
pub fn slug_candidate(base: &str, attempt: u32) -> String {
    if attempt <= 1 {
        return base.to_string();
    }
    let suffix = format!("-{}", attempt);
    let keep = SLUG_MAX_LEN.saturating_sub(suffix.len()).min(base.len());
    let head = base[..keep].trim_end_matches('-');
    format!("{}{}", head, suffix)
}

/// Organisation entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Organisation {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub currency: String,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Onboarding request
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrganisationRequest {
    pub name: String,
    /// Preferred slug; normalised, falls back to the name when empty
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
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
    pub currency: Option<String>,
}

/// Default currency for new organisations
pub const DEFAULT_CURRENCY: &str = "XOF";

/// ISO 4217 shape: three ASCII letters, upper-cased
fn normalize_currency(value: &str) -> ApiResult<String> {
    let code = value.trim().to_ascii_uppercase();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(ApiError::validation(format!(
            "'{}' is not a three-letter currency code",
            value.trim()
        )));
    }
    Ok(code)
}

impl CreateOrganisationRequest {
    pub fn validated(mut self) -> ApiResult<Self> {
        self.name = require_text("name", &self.name)?;
        self.email = validate_email(self.email.as_deref())?;
        self.currency = Some(match optional_text(self.currency.as_deref()) {
            Some(c) => normalize_currency(&c)?,
            None => DEFAULT_CURRENCY.to_string(),
        });
        Ok(self)
    }

    /// Base slug before collision handling
    pub fn base_slug(&self) -> String {
        let preferred = self
            .slug
            .as_deref()
            .map(generate_slug)
            .filter(|s| !s.is_empty());
        preferred.unwrap_or_else(|| generate_slug(&self.name))
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct UpdateOrganisationRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
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
    pub currency: Option<String>,
}

impl UpdateOrganisationRequest {
    pub fn validated(mut self) -> ApiResult<Self> {
        if let Some(name) = &self.name {
            self.name = Some(require_text("name", name)?);
        }
        self.email = validate_email(self.email.as_deref())?;
        if let Some(currency) = optional_text(self.currency.as_deref()) {
            self.currency = Some(normalize_currency(&currency)?);
        } else {
            self.currency = None;
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganisationResponse {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub currency: String,
    pub archived: bool,
    /// Role of the caller, filled in on membership-aware reads
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Organisation> for OrganisationResponse {
    fn from(o: Organisation) -> Self {
        Self {
            id: o.id,
            name: o.name,
            slug: o.slug,
            description: o.description,
            email: o.email,
            phone: o.phone,
            address: o.address,
            city: o.city,
            country: o.country,
            currency: o.currency,
            archived: o.archived_at.is_some(),
            role: None,
            created_at: o.created_at,
            updated_at: o.updated_at,
        }
    }
}

/// Dashboard counters for one organisation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrganisationOverview {
    pub organisation_id: Uuid,
    pub contacts: i64,
    pub products: i64,
    pub devis: i64,
    pub open_tasks: i64,
    /// Sum of devis totals keyed by status
    pub devis_totals_by_status: BTreeMap<String, Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_well_formed(slug: &str) -> bool {
        slug.len() <= SLUG_MAX_LEN
            && slug
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            && !slug.starts_with('-')
            && !slug.ends_with('-')
            && !slug.contains("--")
    }

    #[test]
    fn basic_names() {
        assert_eq!(generate_slug("Acme Corp"), "acme-corp");
        assert_eq!(generate_slug("  Hello   World  "), "hello-world");
        assert_eq!(generate_slug("Ma Boîte & Fils!"), "ma-boite-fils");
        assert_eq!(generate_slug("Société Générale"), "societe-generale");
        assert_eq!(generate_slug("snake_case_name"), "snake-case-name");
        assert_eq!(generate_slug("a -- b"), "a-b");
        assert_eq!(generate_slug("Cœur de Lion"), "coeur-de-lion");
    }

    #[test]
    fn degenerate_inputs() {
        assert_eq!(generate_slug(""), "");
        assert_eq!(generate_slug("!!!"), "");
        assert_eq!(generate_slug("---"), "");
        assert_eq!(generate_slug("日本"), "");
    }

    #[test]
    fn truncates_without_trailing_hyphen() {
        let name = format!("{} tail", "a".repeat(49));
        let slug = generate_slug(&name);
        assert_eq!(slug, "a".repeat(49));

        let slug = generate_slug(&"word ".repeat(30));
        assert!(slug.len() <= SLUG_MAX_LEN);
        assert!(is_well_formed(&slug));
    }

    #[test]
    fn idempotent_and_well_formed() {
        let samples = [
            "Acme Corp",
            "  --Leading and trailing--  ",
            "Ünïcödé  Çafé   &   Crème Brûlée",
            "tabs\tand\nnewlines",
            "Ratio 50% / 100%",
            "x_y-z__w",
            "ÆØÅ æøå ß",
            &"long name ".repeat(20),
        ];
        for sample in samples {
            let once = generate_slug(sample);
            assert!(is_well_formed(&once), "{:?} -> {:?}", sample, once);
            assert_eq!(generate_slug(&once), once, "not idempotent for {:?}", sample);
        }
    }

    #[test]
    fn collision_candidates_fit() {
        assert_eq!(slug_candidate("acme", 1), "acme");
        assert_eq!(slug_candidate("acme", 2), "acme-2");
        let long = "b".repeat(SLUG_MAX_LEN);
        let candidate = slug_candidate(&long, 12);
        assert_eq!(candidate.len(), SLUG_MAX_LEN);
        assert!(candidate.ends_with("-12"));
    }

    #[test]
    fn preferred_slug_wins_over_name() {
        let req = CreateOrganisationRequest {
            name: "Acme Corp".into(),
            slug: Some("ACME HQ".into()),
            description: None,
            email: None,
            phone: None,
            address: None,
            city: None,
            country: None,
            currency: None,
        };
        assert_eq!(req.base_slug(), "acme-hq");

        let req = CreateOrganisationRequest {
            slug: Some("???".into()),
            ..req
        };
        assert_eq!(req.base_slug(), "acme-corp");
    }

    #[test]
    fn currency_defaults_and_normalises() {
        let req: CreateOrganisationRequest =
            serde_json::from_value(serde_json::json!({ "name": " Acme " })).unwrap();
        let req = req.validated().unwrap();
        assert_eq!(req.name, "Acme");
        assert_eq!(req.currency.as_deref(), Some(DEFAULT_CURRENCY));

        let req: CreateOrganisationRequest =
            serde_json::from_value(serde_json::json!({ "name": "Acme", "currency": "eur" }))
                .unwrap();
        assert_eq!(req.validated().unwrap().currency.as_deref(), Some("EUR"));

        let req: CreateOrganisationRequest =
            serde_json::from_value(serde_json::json!({ "name": "Acme", "currency": "euro" }))
                .unwrap();
        assert!(req.validated().is_err());
    }
}
