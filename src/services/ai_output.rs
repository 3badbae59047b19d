//! Parsing of generative-model text into typed drafts.
//!
//! Models are asked for a single JSON object but routinely wrap it in
//! markdown fences or prose. [`extract_json_object`] recovers the object;
//! the `*_draft` functions then check required fields and normalise values
//! (numbers written as strings, tags written as a comma list, French keys).

use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::{Map, Value};
use std::str::FromStr;
use thiserror::Error;

use crate::domain::ai::{BrandSuggestions, ContactDraft, DevisDraft, DevisItemDraft, ProductDraft};
use crate::domain::contacts::ContactKind;
use crate::domain::pricing::{
    quantity_problem, unit_price_problem, PRICE_SCALE, QUANTITY_SCALE,
};
use crate::domain::{is_plausible_email, normalize_tags};
use crate::error::ApiError;

pub type JsonObject = Map<String, Value>;

/// Upper bound on brand suggestions
pub const MAX_BRAND_SUGGESTIONS: usize = 10;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AiOutputError {
    #[error("no JSON object found in model output")]
    NoJson,
    #[error("malformed JSON in model output: {0}")]
    Malformed(String),
    #[error("model output is missing required field '{0}'")]
    MissingField(&'static str),
    #[error("invalid value for '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl From<AiOutputError> for ApiError {
    fn from(e: AiOutputError) -> Self {
        ApiError::Upstream(e.to_string())
    }
}

/// Content of the first markdown code block, or the trimmed input.
fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();

    if let Some(start) = text.find("```") {
        let after = &text[start + 3..];
        // Skip an optional language tag such as `json`
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after[body_start..];
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
        // Unterminated fence: keep everything after the opening line
        return body.trim();
    }

    text
}

fn outer_braces(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn parse_object(candidate: &str) -> Result<JsonObject, AiOutputError> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(AiOutputError::Malformed("expected a JSON object".to_string())),
        Err(e) => Err(AiOutputError::Malformed(e.to_string())),
    }
}

/// Recover the JSON object from raw model output.
///
/// The fenced block is tried first. Backticks can also appear inside string
/// values, so when that candidate does not parse the whole text is tried.
pub fn extract_json_object(text: &str) -> Result<JsonObject, AiOutputError> {
    let whole = outer_braces(text);

    match outer_braces(strip_code_fences(text)) {
        Some(fenced) => parse_object(fenced).or_else(|err| match whole {
            Some(candidate) if candidate != fenced => parse_object(candidate),
            _ => Err(err),
        }),
        None => whole.map_or(Err(AiOutputError::NoJson), parse_object),
    }
}

// =============================================================================
// Field helpers
// =============================================================================

/// First present, non-null value among `keys`
fn field<'a>(map: &'a JsonObject, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .find(|v| !v.is_null())
}

fn text(map: &JsonObject, keys: &[&str]) -> Option<String> {
    match field(map, keys)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn required_text(
    map: &JsonObject,
    keys: &[&str],
    name: &'static str,
) -> Result<String, AiOutputError> {
    text(map, keys).ok_or(AiOutputError::MissingField(name))
}

/// Parse an amount written as a number or as text like `"12 500 FCFA"`,
/// `"1,250.50"` or `"1250,5"`.
pub fn parse_amount(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Value::String(s) => parse_amount_text(s),
        _ => None,
    }
}

fn parse_amount_text(raw: &str) -> Option<Decimal> {
    let mut cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();

    if cleaned.contains(',') && cleaned.contains('.') {
        cleaned.retain(|c| c != ',');
    } else if let Some(pos) = cleaned.rfind(',') {
        let decimals = cleaned.len() - pos - 1;
        if cleaned.matches(',').count() == 1 && (1..=2).contains(&decimals) {
            cleaned.replace_range(pos..=pos, ".");
        } else {
            cleaned.retain(|c| c != ',');
        }
    }

    Decimal::from_str(&cleaned).ok()
}

fn amount(
    map: &JsonObject,
    keys: &[&str],
    name: &'static str,
) -> Result<Option<Decimal>, AiOutputError> {
    let Some(value) = field(map, keys) else {
        return Ok(None);
    };
    let parsed = parse_amount(value).ok_or_else(|| AiOutputError::InvalidField {
        field: name,
        reason: format!("not a number: {}", value),
    })?;
    if parsed < Decimal::ZERO {
        return Err(AiOutputError::InvalidField {
            field: name,
            reason: "must not be negative".to_string(),
        });
    }
    Ok(Some(parsed))
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => s.split([',', ';']).map(str::to_string).collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Object(o) => text(o, &["name", "nom"]),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

// =============================================================================
// Drafts
// =============================================================================

pub fn contact_draft(map: &JsonObject) -> Result<ContactDraft, AiOutputError> {
    let name = required_text(map, &["name", "nom", "full_name", "company"], "name")?;

    let kind = match text(map, &["kind", "type"]).as_deref().map(str::to_lowercase) {
        Some(k) if k.starts_with("compan") || k.starts_with("entreprise") || k == "societe" => {
            ContactKind::Company
        }
        _ => ContactKind::Person,
    };

    // A malformed email is dropped rather than failing the whole draft
    let email = text(map, &["email", "courriel"]).filter(|e| is_plausible_email(e));

    let tags = field(map, &["tags", "etiquettes"])
        .map(string_list)
        .map(|t| normalize_tags(&t))
        .unwrap_or_default();

    Ok(ContactDraft {
        kind,
        name,
        email,
        phone: text(map, &["phone", "telephone", "téléphone"]),
        address: text(map, &["address", "adresse"]),
        city: text(map, &["city", "ville"]),
        country: text(map, &["country", "pays"]),
        notes: text(map, &["notes", "description"]),
        tags,
    })
}

pub fn product_draft(map: &JsonObject) -> Result<ProductDraft, AiOutputError> {
    Ok(ProductDraft {
        name: required_text(map, &["name", "nom", "product_name"], "name")?,
        description: text(map, &["description"]),
        sku: text(map, &["sku", "reference", "référence"]),
        unit_price: amount(map, &["unit_price", "price", "prix", "prix_unitaire"], "unit_price")?,
        unit: text(map, &["unit", "unite", "unité"]),
        brand: text(map, &["brand", "marque"]),
        category: text(map, &["category", "categorie", "catégorie"]),
        brand_id: None,
        category_id: None,
    })
}

pub fn brand_suggestions(
    map: &JsonObject,
    limit: usize,
) -> Result<BrandSuggestions, AiOutputError> {
    let raw = field(map, &["names", "brands", "suggestions", "marques"])
        .ok_or(AiOutputError::MissingField("names"))?;

    let mut names = normalize_tags(&string_list(raw));
    names.truncate(limit.clamp(1, MAX_BRAND_SUGGESTIONS));

    if names.is_empty() {
        return Err(AiOutputError::InvalidField {
            field: "names",
            reason: "no usable name".to_string(),
        });
    }
    Ok(BrandSuggestions { names })
}

fn devis_item(value: &Value, index: usize) -> Result<DevisItemDraft, AiOutputError> {
    let Value::Object(item) = value else {
        return Err(AiOutputError::InvalidField {
            field: "items",
            reason: format!("item {} is not an object", index),
        });
    };

    let description = required_text(
        item,
        &["description", "designation", "désignation", "name", "nom"],
        "items.description",
    )?;

    // Extra decimals are rounded away rather than rejected
    let quantity = amount(item, &["quantity", "quantite", "quantité", "qty"], "items.quantity")?
        .unwrap_or(Decimal::ONE)
        .round_dp_with_strategy(QUANTITY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    if let Some(problem) = quantity_problem(quantity) {
        return Err(AiOutputError::InvalidField {
            field: "items.quantity",
            reason: format!("item {} quantity {}", index, problem),
        });
    }

    let unit_price = amount(
        item,
        &["unit_price", "prix_unitaire", "price", "prix"],
        "items.unit_price",
    )?
    .ok_or(AiOutputError::MissingField("items.unit_price"))?
    .round_dp_with_strategy(PRICE_SCALE, RoundingStrategy::MidpointAwayFromZero);
    if let Some(problem) = unit_price_problem(unit_price) {
        return Err(AiOutputError::InvalidField {
            field: "items.unit_price",
            reason: format!("item {} unit price {}", index, problem),
        });
    }

    Ok(DevisItemDraft {
        description,
        quantity,
        unit_price,
        product_id: None,
    })
}

pub fn devis_draft(map: &JsonObject) -> Result<DevisDraft, AiOutputError> {
    let title = required_text(map, &["title", "titre", "objet"], "title")?;

    let items = match field(map, &["items", "lignes", "lines"]) {
        Some(Value::Array(items)) if !items.is_empty() => items
            .iter()
            .enumerate()
            .map(|(i, v)| devis_item(v, i))
            .collect::<Result<Vec<_>, _>>()?,
        _ => return Err(AiOutputError::MissingField("items")),
    };

    Ok(DevisDraft {
        title,
        notes: text(map, &["notes", "conditions"]),
        items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> JsonObject {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn plain_object() {
        let map = extract_json_object(r#"{"name": "Awa"}"#).unwrap();
        assert_eq!(map["name"], "Awa");
    }

    #[test]
    fn fenced_object_with_language_tag() {
        let text = "Voici le résultat :\n```json\n{\"name\": \"Awa\", \"tags\": [\"vip\"]}\n```\nBonne journée";
        let map = extract_json_object(text).unwrap();
        assert_eq!(Value::Object(map), json!({"name": "Awa", "tags": ["vip"]}));
    }

    #[test]
    fn bare_fence_and_unterminated_fence() {
        let map = extract_json_object("```\n{\"a\": 1}\n```").unwrap();
        assert_eq!(map["a"], 1);

        let map = extract_json_object("```json\n{\"a\": 2}").unwrap();
        assert_eq!(map["a"], 2);
    }

    #[test]
    fn object_embedded_in_prose() {
        let text = r#"Sure! {"title": "Pose de carrelage", "items": [{"description": "x"}]} Hope it helps."#;
        let map = extract_json_object(text).unwrap();
        assert_eq!(map["title"], "Pose de carrelage");
    }

    #[test]
    fn fence_without_json_falls_back_to_whole_text() {
        let text = "```\nnothing here\n```\n{\"a\": 3}";
        assert_eq!(extract_json_object(text).unwrap()["a"], 3);
    }

    #[test]
    fn backticks_inside_a_string_value() {
        let map = extract_json_object(r#"{"title": "See ```{x}``` here", "a": 1}"#).unwrap();
        assert_eq!(map["title"], "See ```{x}``` here");
        assert_eq!(map["a"], 1);
    }

    #[test]
    fn no_json_found() {
        assert_eq!(
            extract_json_object("Je ne peux pas répondre."),
            Err(AiOutputError::NoJson)
        );
        assert_eq!(extract_json_object("} oops {"), Err(AiOutputError::NoJson));
        assert_eq!(extract_json_object(""), Err(AiOutputError::NoJson));
        assert_eq!(
            AiOutputError::NoJson.to_string(),
            "no JSON object found in model output"
        );
    }

    #[test]
    fn malformed_json() {
        assert!(matches!(
            extract_json_object("{name: 'Awa'}"),
            Err(AiOutputError::Malformed(_))
        ));
    }

    #[test]
    fn amounts_in_many_spellings() {
        let cases = [
            (json!(12500), "12500"),
            (json!(99.5), "99.5"),
            (json!("12 500 FCFA"), "12500"),
            (json!("1,250.50"), "1250.50"),
            (json!("1250,5"), "1250.5"),
            (json!("1,250,000"), "1250000"),
            (json!("15\u{a0}000 F"), "15000"),
        ];
        for (value, expected) in cases {
            assert_eq!(
                parse_amount(&value),
                Some(Decimal::from_str(expected).unwrap()),
                "{}",
                value
            );
        }
        assert_eq!(parse_amount(&json!("gratuit")), None);
        assert_eq!(parse_amount(&json!(true)), None);
    }

    #[test]
    fn contact_draft_normalises_fields() {
        let map = obj(json!({
            "nom": "Boulangerie Ndiaye",
            "type": "Entreprise",
            "email": "not-an-email",
            "telephone": "+221 33 800 00 00",
            "ville": "Thiès",
            "tags": "boulangerie, client, Client"
        }));
        let draft = contact_draft(&map).unwrap();
        assert_eq!(draft.name, "Boulangerie Ndiaye");
        assert_eq!(draft.kind, ContactKind::Company);
        assert_eq!(draft.email, None);
        assert_eq!(draft.city.as_deref(), Some("Thiès"));
        assert_eq!(draft.tags, vec!["boulangerie".to_string(), "client".to_string()]);
    }

    #[test]
    fn contact_draft_requires_a_name() {
        let map = obj(json!({ "email": "a@b.co", "name": "  " }));
        assert_eq!(contact_draft(&map), Err(AiOutputError::MissingField("name")));
    }

    #[test]
    fn product_draft_reads_price_text() {
        let map = obj(json!({
            "name": "Ciment CPJ 45",
            "prix": "4 750 FCFA",
            "marque": "Sococim",
            "unit": "sac"
        }));
        let draft = product_draft(&map).unwrap();
        assert_eq!(draft.unit_price, Some(Decimal::from(4750)));
        assert_eq!(draft.brand.as_deref(), Some("Sococim"));
        assert_eq!(draft.brand_id, None);

        let negative = obj(json!({ "name": "x", "price": -3 }));
        assert!(matches!(
            product_draft(&negative),
            Err(AiOutputError::InvalidField { field: "unit_price", .. })
        ));
    }

    #[test]
    fn brand_suggestions_are_deduplicated_and_capped() {
        let map = obj(json!({
            "names": ["Teranga", "teranga", {"name": "Baobab"}, "", 42, "Sahel", "Kora"]
        }));
        let s = brand_suggestions(&map, 3).unwrap();
        assert_eq!(s.names, vec!["Teranga", "Baobab", "Sahel"]);

        let accented = obj(json!({ "names": ["Élan", "élan", "Œuvre", "œuvre"] }));
        assert_eq!(brand_suggestions(&accented, 5).unwrap().names, vec!["Élan", "Œuvre"]);

        let empty = obj(json!({ "names": [] }));
        assert!(brand_suggestions(&empty, 5).is_err());
        assert_eq!(
            brand_suggestions(&obj(json!({})), 5),
            Err(AiOutputError::MissingField("names"))
        );
    }

    #[test]
    fn devis_draft_defaults_quantity_and_requires_price() {
        let map = obj(json!({
            "titre": "Peinture salon",
            "lignes": [
                { "designation": "Peinture acrylique", "quantite": "3", "prix_unitaire": 9000 },
                { "description": "Main d'oeuvre", "unit_price": "25 000" }
            ]
        }));
        let draft = devis_draft(&map).unwrap();
        assert_eq!(draft.title, "Peinture salon");
        assert_eq!(draft.items.len(), 2);
        assert_eq!(draft.items[0].quantity, Decimal::from(3));
        assert_eq!(draft.items[1].quantity, Decimal::ONE);
        assert_eq!(draft.items[1].unit_price, Decimal::from(25000));

        let missing_price = obj(json!({
            "title": "t",
            "items": [{ "description": "x", "quantity": 1 }]
        }));
        assert_eq!(
            devis_draft(&missing_price),
            Err(AiOutputError::MissingField("items.unit_price"))
        );

        let no_items = obj(json!({ "title": "t", "items": [] }));
        assert_eq!(devis_draft(&no_items), Err(AiOutputError::MissingField("items")));

        let zero_qty = obj(json!({
            "title": "t",
            "items": [{ "description": "x", "quantity": 0, "unit_price": 1 }]
        }));
        assert!(devis_draft(&zero_qty).is_err());
    }

    #[test]
    fn devis_draft_amounts_fit_storage() {
        let fine = obj(json!({
            "title": "t",
            "items": [{ "description": "x", "quantity": "1.23456", "unit_price": "999.999" }]
        }));
        let draft = devis_draft(&fine).unwrap();
        assert_eq!(draft.items[0].quantity, Decimal::new(1235, 3));
        assert_eq!(draft.items[0].unit_price, Decimal::from(1000));

        let rounds_to_zero = obj(json!({
            "title": "t",
            "items": [{ "description": "x", "quantity": "0.0001", "unit_price": 1 }]
        }));
        assert!(matches!(
            devis_draft(&rounds_to_zero),
            Err(AiOutputError::InvalidField { field: "items.quantity", .. })
        ));

        let huge = obj(json!({
            "title": "t",
            "items": [{
                "description": "x",
                "quantity": "100000000000000000000",
                "unit_price": "100000000000000000000"
            }]
        }));
        assert!(devis_draft(&huge).is_err());

        let huge_price = obj(json!({
            "title": "t",
            "items": [{ "description": "x", "quantity": 1, "unit_price": "100000000000000000000" }]
        }));
        assert!(matches!(
            devis_draft(&huge_price),
            Err(AiOutputError::InvalidField { field: "items.unit_price", .. })
        ));
    }
}
