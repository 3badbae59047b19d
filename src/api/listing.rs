//! In-memory search, sort and pagination for organisation-scoped lists.
//!
//! List handlers load the organisation's rows, then hand them to [`apply`]
//! together with the request's [`ListQuery`]. Entities opt in by
//! implementing [`Listable`].

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::pagination::{Paginated, PaginationParams};

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Query-string parameters shared by every list endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    /// Case-insensitive substring matched against the entity's search fields
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub order: Option<SortOrder>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub per_page: Option<u32>,
}

impl ListQuery {
    pub fn pagination(&self) -> PaginationParams {
        PaginationParams {
            page: self.page,
            per_page: self.per_page,
        }
    }

    fn needle(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }
}

/// Comparable value of one column.
///
/// `Missing` always sorts after present values regardless of direction.
#[derive(Debug, Clone, PartialEq)]
pub enum SortKey {
    Text(String),
    Number(i64),
    Decimal(Decimal),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Missing,
}

impl SortKey {
    pub fn text(value: &str) -> Self {
        Self::Text(value.to_lowercase())
    }

    pub fn opt_text(value: Option<&str>) -> Self {
        value.map(Self::text).unwrap_or(Self::Missing)
    }

    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Number(a), Self::Number(b)) => a.cmp(b),
            (Self::Decimal(a), Self::Decimal(b)) => a.cmp(b),
            (Self::Date(a), Self::Date(b)) => a.cmp(b),
            (Self::Timestamp(a), Self::Timestamp(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

pub trait Listable {
    /// Columns accepted by `?sort=`.
    const SORT_COLUMNS: &'static [&'static str];

    /// Fields searched by `?search=`.
    fn search_fields(&self) -> Vec<&str>;

    /// Key for a column listed in `SORT_COLUMNS`.
    fn sort_key(&self, column: &str) -> SortKey;
}

fn matches<T: Listable>(item: &T, needle: &str) -> bool {
    item.search_fields()
        .iter()
        .any(|field| field.to_lowercase().contains(needle))
}

/// Filter, sort and paginate `items`.
///
/// Unknown sort columns are ignored and the input order is kept. The sort is
/// stable, so equal keys keep their relative order.
pub fn apply<T: Listable + Serialize>(items: Vec<T>, query: &ListQuery) -> Paginated<T> {
    let mut items: Vec<T> = match query.needle() {
        Some(needle) => items.into_iter().filter(|i| matches(i, &needle)).collect(),
        None => items,
    };

    if let Some(column) = query
        .sort
        .as_deref()
        .filter(|c| T::SORT_COLUMNS.contains(c))
    {
        let order = query.order.unwrap_or_default();
        let mut keyed: Vec<(SortKey, T)> = items
            .into_iter()
            .map(|item| (item.sort_key(column), item))
            .collect();

        keyed.sort_by(|(a, _), (b, _)| match (a, b) {
            (SortKey::Missing, SortKey::Missing) => Ordering::Equal,
            (SortKey::Missing, _) => Ordering::Greater,
            (_, SortKey::Missing) => Ordering::Less,
            _ => match order {
                SortOrder::Asc => a.compare(b),
                SortOrder::Desc => b.compare(a),
            },
        });

        items = keyed.into_iter().map(|(_, item)| item).collect();
    }

    let params = query.pagination();
    let total = items.len() as u64;
    let page: Vec<T> = items
        .into_iter()
        .skip(params.offset() as usize)
        .take(params.limit() as usize)
        .collect();

    Paginated::new(page, &params, total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Serialize, PartialEq)]
    struct Row {
        name: &'static str,
        email: Option<&'static str>,
        amount: i64,
    }

    impl Listable for Row {
        const SORT_COLUMNS: &'static [&'static str] = &["name", "email", "amount"];

        fn search_fields(&self) -> Vec<&str> {
            let mut fields = vec![self.name];
            fields.extend(self.email);
            fields
        }

        fn sort_key(&self, column: &str) -> SortKey {
            match column {
                "name" => SortKey::text(self.name),
                "email" => SortKey::opt_text(self.email),
                _ => SortKey::Number(self.amount),
            }
        }
    }

    fn rows() -> Vec<Row> {
        vec![
            Row { name: "Diallo", email: Some("awa@diallo.sn"), amount: 30 },
            Row { name: "ba", email: None, amount: 10 },
            Row { name: "Ndiaye", email: Some("moussa@example.com"), amount: 20 },
            Row { name: "Camara", email: Some("c@example.com"), amount: 10 },
        ]
    }

    fn names(page: &Paginated<Row>) -> Vec<&'static str> {
        page.data.iter().map(|r| r.name).collect()
    }

    #[test]
    fn search_is_case_insensitive_across_fields() {
        let query = ListQuery {
            search: Some("  EXAMPLE ".into()),
            ..Default::default()
        };
        let page = apply(rows(), &query);
        assert_eq!(names(&page), vec!["Ndiaye", "Camara"]);
        assert_eq!(page.pagination.total_items, 2);
    }

    #[test]
    fn blank_search_keeps_everything() {
        let query = ListQuery {
            search: Some("   ".into()),
            ..Default::default()
        };
        assert_eq!(apply(rows(), &query).data.len(), 4);
    }

    #[test]
    fn text_sort_ignores_case() {
        let query = ListQuery {
            sort: Some("name".into()),
            ..Default::default()
        };
        assert_eq!(
            names(&apply(rows(), &query)),
            vec!["ba", "Camara", "Diallo", "Ndiaye"]
        );
    }

    #[test]
    fn descending_sort_is_stable_for_ties() {
        let query = ListQuery {
            sort: Some("amount".into()),
            order: Some(SortOrder::Desc),
            ..Default::default()
        };
        assert_eq!(
            names(&apply(rows(), &query)),
            vec!["Diallo", "Ndiaye", "ba", "Camara"]
        );
    }

    #[test]
    fn missing_values_sort_last_in_both_directions() {
        for order in [SortOrder::Asc, SortOrder::Desc] {
            let query = ListQuery {
                sort: Some("email".into()),
                order: Some(order),
                ..Default::default()
            };
            let page = apply(rows(), &query);
            assert_eq!(page.data.last().map(|r| r.name), Some("ba"));
        }
    }

    #[test]
    fn unknown_sort_column_keeps_input_order() {
        let query = ListQuery {
            sort: Some("password".into()),
            ..Default::default()
        };
        assert_eq!(
            names(&apply(rows(), &query)),
            vec!["Diallo", "ba", "Ndiaye", "Camara"]
        );
    }

    #[test]
    fn pages_are_sliced_after_filtering() {
        let query = ListQuery {
            sort: Some("name".into()),
            page: Some(2),
            per_page: Some(3),
            ..Default::default()
        };
        let page = apply(rows(), &query);
        assert_eq!(names(&page), vec!["Ndiaye"]);
        assert_eq!(page.pagination.total_pages, 2);
        assert!(!page.pagination.has_next);
        assert!(page.pagination.has_prev);
    }

    #[test]
    fn page_past_the_end_is_empty() {
        let query = ListQuery {
            page: Some(9),
            ..Default::default()
        };
        let page = apply(rows(), &query);
        assert!(page.data.is_empty());
        assert_eq!(page.pagination.total_items, 4);
    }
}
