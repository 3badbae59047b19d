//! Product routes
//!
//! Catalogue items that devis lines can reference.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::access::{require_permission, ActingUser};
use crate::api::{listing, Created, DataResponse, ListQuery, MessageResponse};
use crate::app::AppState;
use crate::domain::activity::NewActivity;
use crate::domain::catalogue::{
    CreateProductRequest, ProductFilter, ProductResponse, UpdateProductRequest,
};
use crate::domain::team::Permission;
use crate::error::{ApiError, ApiResult};
use crate::services::activity;

/// Database row for product, with brand and category names joined in
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ProductRow {
    id: Uuid,
    organisation_id: Uuid,
    name: String,
    description: Option<String>,
    sku: Option<String>,
    unit_price: Decimal,
    unit: String,
    brand_id: Option<Uuid>,
    brand_name: Option<String>,
    category_id: Option<Uuid>,
    category_name: Option<String>,
    stock_quantity: Option<i32>,
    archived: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for ProductResponse {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            organisation_id: row.organisation_id,
            name: row.name,
            description: row.description,
            sku: row.sku,
            unit_price: row.unit_price,
            unit: row.unit,
            brand_id: row.brand_id,
            brand_name: row.brand_name,
            category_id: row.category_id,
            category_name: row.category_name,
            stock_quantity: row.stock_quantity,
            archived: row.archived,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const PRODUCT_SELECT: &str = r#"
    SELECT p.id, p.organisation_id, p.name, p.description, p.sku, p.unit_price, p.unit,
           p.brand_id, b.name AS brand_name, p.category_id, c.name AS category_name,
           p.stock_quantity, p.archived, p.created_at, p.updated_at
    FROM products p
    LEFT JOIN brands b ON b.id = p.brand_id
    LEFT JOIN categories c ON c.id = p.category_id
"#;

/// Every product of the organisation, archived ones included
pub(crate) async fn load_products(state: &AppState, org_id: Uuid) -> ApiResult<Vec<ProductResponse>> {
    let rows = sqlx::query_as::<_, ProductRow>(&format!(
        "{} WHERE p.organisation_id = $1 ORDER BY p.name",
        PRODUCT_SELECT
    ))
    .bind(org_id)
    .fetch_all(&state.db)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

async fn fetch_product(state: &AppState, org_id: Uuid, product_id: Uuid) -> ApiResult<ProductResponse> {
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "{} WHERE p.id = $1 AND p.organisation_id = $2",
        PRODUCT_SELECT
    ))
    .bind(product_id)
    .bind(org_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Product not found"))?;
    Ok(row.into())
}

/// A brand or category id must point inside the same organisation
async fn check_reference(
    state: &AppState,
    org_id: Uuid,
    table: &'static str,
    field: &'static str,
    id: Option<Uuid>,
) -> ApiResult<()> {
    let Some(id) = id else {
        return Ok(());
    };
    let exists: bool = sqlx::query_scalar(&format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1 AND organisation_id = $2)",
        table
    ))
    .bind(id)
    .bind(org_id)
    .fetch_one(&state.db)
    .await?;

    if !exists {
        return Err(ApiError::bad_request(format!(
            "{} does not belong to this organisation",
            field
        )));
    }
    Ok(())
}

/// GET /api/organisations/:org_id/products
pub async fn list_products(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
    Query(filter): Query<ProductFilter>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Read).await?;

    let products: Vec<ProductResponse> = load_products(&state, org_id)
        .await?
        .into_iter()
        .filter(|p| p.matches(&filter))
        .collect();

    Ok(listing::apply(products, &query))
}

/// GET /api/organisations/:org_id/products/:product_id
pub async fn get_product(
    State(state): State<Arc<AppState>>,
    Path((org_id, product_id)): Path<(Uuid, Uuid)>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Read).await?;
    Ok(Json(DataResponse::new(
        fetch_product(&state, org_id, product_id).await?,
    )))
}

/// POST /api/organisations/:org_id/products
pub async fn create_product(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<Uuid>,
    user: ActingUser,
    Json(req): Json<CreateProductRequest>,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Write).await?;
    let req = req.validated()?;
    check_reference(&state, org_id, "brands", "brand_id", req.brand_id).await?;
    check_reference(&state, org_id, "categories", "category_id", req.category_id).await?;

    let product_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO products (id, organisation_id, name, description, sku, unit_price, unit,
                              brand_id, category_id, stock_quantity)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(product_id)
    .bind(org_id)
    .bind(&req.name)
    .bind(&req.description)
    .bind(&req.sku)
    .bind(req.unit_price)
    .bind(&req.unit)
    .bind(req.brand_id)
    .bind(req.category_id)
    .bind(req.stock_quantity)
    .execute(&state.db)
    .await?;

    state.cache.invalidate_overview(org_id).await;
    activity::record(
        &state.db,
        NewActivity::new(org_id, user.user_id, "product.created", "product", Some(product_id))
            .with_details(serde_json::json!({ "name": req.name, "unit_price": req.unit_price })),
    )
    .await;

    tracing::info!(organisation_id = %org_id, product_id = %product_id, "Product created");

    Ok(Created(fetch_product(&state, org_id, product_id).await?))
}

/// PATCH /api/organisations/:org_id/products/:product_id
pub async fn update_product(
    State(state): State<Arc<AppState>>,
    Path((org_id, product_id)): Path<(Uuid, Uuid)>,
    user: ActingUser,
    Json(req): Json<UpdateProductRequest>,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Write).await?;
    let req = req.validated()?;
    check_reference(&state, org_id, "brands", "brand_id", req.brand_id).await?;
    check_reference(&state, org_id, "categories", "category_id", req.category_id).await?;

    let result = sqlx::query(
        r#"
        UPDATE products SET
            name = COALESCE($3, name),
            description = COALESCE($4, description),
            sku = COALESCE($5, sku),
            unit_price = COALESCE($6, unit_price),
            unit = COALESCE($7, unit),
            brand_id = COALESCE($8, brand_id),
            category_id = COALESCE($9, category_id),
            stock_quantity = COALESCE($10, stock_quantity),
            updated_at = NOW()
        WHERE id = $1 AND organisation_id = $2
        "#,
    )
    .bind(product_id)
    .bind(org_id)
    .bind(&req.name)
    .bind(&req.description)
    .bind(&req.sku)
    .bind(req.unit_price)
    .bind(&req.unit)
    .bind(req.brand_id)
    .bind(req.category_id)
    .bind(req.stock_quantity)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Product not found"));
    }

    activity::record(
        &state.db,
        NewActivity::new(org_id, user.user_id, "product.updated", "product", Some(product_id)),
    )
    .await;

    Ok(Json(DataResponse::new(
        fetch_product(&state, org_id, product_id).await?,
    )))
}

async fn set_archived(
    state: &AppState,
    user: ActingUser,
    org_id: Uuid,
    product_id: Uuid,
    archived: bool,
) -> ApiResult<ProductResponse> {
    let result = sqlx::query(
        "UPDATE products SET archived = $3, updated_at = NOW() WHERE id = $1 AND organisation_id = $2",
    )
    .bind(product_id)
    .bind(org_id)
    .bind(archived)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Product not found"));
    }

    state.cache.invalidate_overview(org_id).await;
    let action = if archived { "product.archived" } else { "product.unarchived" };
    activity::record(
        &state.db,
        NewActivity::new(org_id, user.user_id, action, "product", Some(product_id)),
    )
    .await;

    fetch_product(state, org_id, product_id).await
}

/// POST /api/organisations/:org_id/products/:product_id/archive
pub async fn archive_product(
    State(state): State<Arc<AppState>>,
    Path((org_id, product_id)): Path<(Uuid, Uuid)>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Delete).await?;
    let product = set_archived(&state, user, org_id, product_id, true).await?;
    Ok(Json(DataResponse::new(product)))
}

/// POST /api/organisations/:org_id/products/:product_id/unarchive
pub async fn unarchive_product(
    State(state): State<Arc<AppState>>,
    Path((org_id, product_id)): Path<(Uuid, Uuid)>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Write).await?;
    let product = set_archived(&state, user, org_id, product_id, false).await?;
    Ok(Json(DataResponse::new(product)))
}

/// DELETE /api/organisations/:org_id/products/:product_id
///
/// Devis lines keep their copied description and price; favourites go.
pub async fn delete_product(
    State(state): State<Arc<AppState>>,
    Path((org_id, product_id)): Path<(Uuid, Uuid)>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Delete).await?;

    let mut tx = state.db.begin().await?;

    let result = sqlx::query("DELETE FROM products WHERE id = $1 AND organisation_id = $2")
        .bind(product_id)
        .bind(org_id)
        .execute(&mut *tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Product not found"));
    }

    sqlx::query(
        "DELETE FROM favorites WHERE organisation_id = $1 AND entity_type = 'product' AND entity_id = $2",
    )
    .bind(org_id)
    .bind(product_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    state.cache.invalidate_overview(org_id).await;
    activity::record(
        &state.db,
        NewActivity::new(org_id, user.user_id, "product.deleted", "product", Some(product_id)),
    )
    .await;

    Ok(Json(MessageResponse::new("Product deleted successfully")))
}
