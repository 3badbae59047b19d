//! Product catalogue: brands, categories and products

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::pricing::unit_price_problem;
use super::{optional_text, require_text};
use crate::api::{Listable, SortKey};
use crate::error::{ApiError, ApiResult};

// =============================================================================
// Brands ("marques") and categories
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBrandRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub logo_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct UpdateBrandRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub logo_url: Option<String>,
}

impl CreateBrandRequest {
    pub fn validated(mut self) -> ApiResult<Self> {
        self.name = require_text("name", &self.name)?;
        self.description = optional_text(self.description.as_deref());
        self.logo_url = optional_text(self.logo_url.as_deref());
        Ok(self)
    }
}

impl UpdateBrandRequest {
    pub fn validated(mut self) -> ApiResult<Self> {
        if let Some(name) = &self.name {
            self.name = Some(require_text("name", name)?);
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandResponse {
    pub id: Uuid,
    pub organisation_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub product_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listable for BrandResponse {
    const SORT_COLUMNS: &'static [&'static str] = &["name", "product_count", "created_at"];

    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.name.as_str()];
        fields.extend(self.description.as_deref());
        fields
    }

    fn sort_key(&self, column: &str) -> SortKey {
        match column {
            "name" => SortKey::text(&self.name),
            "product_count" => SortKey::Number(self.product_count),
            _ => SortKey::Timestamp(self.created_at),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct UpdateCategoryRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl CreateCategoryRequest {
    pub fn validated(mut self) -> ApiResult<Self> {
        self.name = require_text("name", &self.name)?;
        self.description = optional_text(self.description.as_deref());
        Ok(self)
    }
}

impl UpdateCategoryRequest {
    pub fn validated(mut self) -> ApiResult<Self> {
        if let Some(name) = &self.name {
            self.name = Some(require_text("name", name)?);
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryResponse {
    pub id: Uuid,
    pub organisation_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub product_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listable for CategoryResponse {
    const SORT_COLUMNS: &'static [&'static str] = &["name", "product_count", "created_at"];

    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.name.as_str()];
        fields.extend(self.description.as_deref());
        fields
    }

    fn sort_key(&self, column: &str) -> SortKey {
        match column {
            "name" => SortKey::text(&self.name),
            "product_count" => SortKey::Number(self.product_count),
            _ => SortKey::Timestamp(self.created_at),
        }
    }
}

// =============================================================================
// Products
// =============================================================================

fn default_unit() -> String {
    "unité".to_string()
}

fn check_price(price: Decimal) -> ApiResult<()> {
    match unit_price_problem(price) {
        Some(problem) => Err(ApiError::validation(format!("unit_price {}", problem))),
        None => Ok(()),
    }
}

fn check_stock(stock: Option<i32>) -> ApiResult<()> {
    match stock {
        Some(s) if s < 0 => Err(ApiError::validation("stock_quantity must not be negative")),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    pub unit_price: Decimal,
    #[serde(default = "default_unit")]
    pub unit: String,
    #[serde(default)]
    pub brand_id: Option<Uuid>,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub stock_quantity: Option<i32>,
}

impl CreateProductRequest {
    pub fn validated(mut self) -> ApiResult<Self> {
        self.name = require_text("name", &self.name)?;
        check_price(self.unit_price)?;
        check_stock(self.stock_quantity)?;
        let unit = self.unit.trim();
        self.unit = if unit.is_empty() {
            default_unit()
        } else {
            unit.to_string()
        };
        Ok(self)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct UpdateProductRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub brand_id: Option<Uuid>,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub stock_quantity: Option<i32>,
}

impl UpdateProductRequest {
    pub fn validated(mut self) -> ApiResult<Self> {
        if let Some(name) = &self.name {
            self.name = Some(require_text("name", name)?);
        }
        if let Some(price) = self.unit_price {
            check_price(price)?;
        }
        check_stock(self.stock_quantity)?;
        Ok(self)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProductFilter {
    #[serde(default)]
    pub brand_id: Option<Uuid>,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub include_archived: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductResponse {
    pub id: Uuid,
    pub organisation_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub sku: Option<String>,
    pub unit_price: Decimal,
    pub unit: String,
    pub brand_id: Option<Uuid>,
    pub brand_name: Option<String>,
    pub category_id: Option<Uuid>,
    pub category_name: Option<String>,
    pub stock_quantity: Option<i32>,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductResponse {
    pub fn matches(&self, filter: &ProductFilter) -> bool {
        (!self.archived || filter.include_archived)
            && filter.brand_id.map_or(true, |b| self.brand_id == Some(b))
            && filter.category_id.map_or(true, |c| self.category_id == Some(c))
    }
}

impl Listable for ProductResponse {
    const SORT_COLUMNS: &'static [&'static str] = &[
        "name",
        "sku",
        "unit_price",
        "stock_quantity",
        "brand",
        "category",
        "created_at",
    ];

    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.name.as_str()];
        fields.extend(self.sku.as_deref());
        fields.extend(self.description.as_deref());
        fields
    }

    fn sort_key(&self, column: &str) -> SortKey {
        match column {
            "name" => SortKey::text(&self.name),
            "sku" => SortKey::opt_text(self.sku.as_deref()),
            "unit_price" => SortKey::Decimal(self.unit_price),
            "stock_quantity" => self
                .stock_quantity
                .map(|s| SortKey::Number(s as i64))
                .unwrap_or(SortKey::Missing),
            "brand" => SortKey::opt_text(self.brand_name.as_deref()),
            "category" => SortKey::opt_text(self.category_name.as_deref()),
            _ => SortKey::Timestamp(self.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn product_price_accepts_numbers_and_strings() {
        let req: CreateProductRequest =
            serde_json::from_value(json!({ "name": "Ciment", "unit_price": 4500 })).unwrap();
        assert_eq!(req.unit_price, Decimal::from(4500));
        assert_eq!(req.unit, "unité");

        let req: CreateProductRequest =
            serde_json::from_value(json!({ "name": "Fer", "unit_price": "1250.50" })).unwrap();
        assert_eq!(req.unit_price, Decimal::new(125050, 2));
    }

    #[test]
    fn product_validation() {
        let req: CreateProductRequest = serde_json::from_value(
            json!({ "name": " Tôle ", "unit_price": -1, "unit": "m2" }),
        )
        .unwrap();
        assert!(matches!(req.validated(), Err(ApiError::Validation(_))));

        let req: CreateProductRequest = serde_json::from_value(
            json!({ "name": " Tôle ", "unit_price": 0, "unit": "  " }),
        )
        .unwrap();
        let req = req.validated().unwrap();
        assert_eq!(req.name, "Tôle");
        assert_eq!(req.unit, "unité");

        let req: UpdateProductRequest =
            serde_json::from_value(json!({ "stock_quantity": -3 })).unwrap();
        assert!(req.validated().is_err());

        let req: UpdateProductRequest =
            serde_json::from_value(json!({ "unit_price": "1000000000000" })).unwrap();
        assert!(matches!(req.validated(), Err(ApiError::Validation(_))));
    }

    #[test]
    fn product_filter() {
        let brand = Uuid::new_v4();
        let product = ProductResponse {
            id: Uuid::new_v4(),
            organisation_id: Uuid::new_v4(),
            name: "Peinture".into(),
            description: None,
            sku: Some("PNT-01".into()),
            unit_price: Decimal::from(9000),
            unit: "pot".into(),
            brand_id: Some(brand),
            brand_name: Some("Seigneurie".into()),
            category_id: None,
            category_name: None,
            stock_quantity: None,
            archived: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert!(product.matches(&ProductFilter::default()));
        assert!(product.matches(&ProductFilter {
            brand_id: Some(brand),
            ..Default::default()
        }));
        assert!(!product.matches(&ProductFilter {
            category_id: Some(Uuid::new_v4()),
            ..Default::default()
        }));
        assert_eq!(product.sort_key("stock_quantity"), SortKey::Missing);
    }
}
