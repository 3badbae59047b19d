//! Domain types and DTOs
//!
//! Request/response shapes for every resource, plus the pure pieces of
//! business logic (pricing, slugs, status rules) that handlers call into.

pub mod activity;
pub mod ai;
pub mod catalogue;
pub mod contacts;
pub mod devis;
pub mod documents;
pub mod favorites;
pub mod organisations;
pub mod pricing;
pub mod tasks;
pub mod team;

use serde::{Deserialize, Deserializer};
use std::collections::HashSet;

use crate::error::{ApiError, ApiResult};

/// Trimmed value of a required text field
pub fn require_text(field: &str, value: &str) -> ApiResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

/// Blank strings become `None`
pub fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Field that a PATCH can clear: absent is `None`, `null` is `Some(None)`.
/// Use together with `#[serde(default)]`.
pub fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Loose shape check: one `@`, non-empty local part, dotted domain.
pub fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain.contains('.')
        && !email.chars().any(char::is_whitespace)
}

pub fn validate_email(email: Option<&str>) -> ApiResult<Option<String>> {
    match optional_text(email) {
        Some(e) if !is_plausible_email(&e) => {
            Err(ApiError::validation(format!("'{}' is not a valid email", e)))
        }
        other => Ok(other),
    }
}

/// Trim, drop blanks and case-insensitive duplicates, keep first spelling.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::with_capacity(tags.len());
    tags.iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty() && seen.insert(t.to_lowercase()))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shapes() {
        assert!(is_plausible_email("awa@example.com"));
        assert!(is_plausible_email("a.b+c@mail.example.sn"));
        assert!(!is_plausible_email("awa"));
        assert!(!is_plausible_email("@example.com"));
        assert!(!is_plausible_email("awa@"));
        assert!(!is_plausible_email("awa@localhost"));
        assert!(!is_plausible_email("a@b@c.com"));
        assert!(!is_plausible_email("a b@c.com"));
    }

    #[test]
    fn blank_email_is_none() {
        assert_eq!(validate_email(Some("   ")).unwrap(), None);
        assert_eq!(validate_email(None).unwrap(), None);
    }

    #[test]
    fn tags_are_deduplicated() {
        let tags = vec![" VIP ".to_string(), "vip".into(), "".into(), "Dakar".into()];
        assert_eq!(normalize_tags(&tags), vec!["VIP".to_string(), "Dakar".to_string()]);
    }

    #[test]
    fn accented_tags_fold_case_too() {
        let tags: Vec<String> = ["Élan", "élan", "Œuvre", "œuvre", "ÉLAN"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(normalize_tags(&tags), vec!["Élan".to_string(), "Œuvre".to_string()]);
    }
}
