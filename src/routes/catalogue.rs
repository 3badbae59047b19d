//! Brand ("marque") and category routes

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::access::{require_permission, ActingUser};
use crate::api::{listing, Created, DataResponse, ListQuery, MessageResponse};
use crate::app::AppState;
use crate::domain::activity::NewActivity;
use crate::domain::catalogue::{
    BrandResponse, CategoryResponse, CreateBrandRequest, CreateCategoryRequest,
    UpdateBrandRequest, UpdateCategoryRequest,
};
use crate::domain::team::Permission;
use crate::error::{conflict_on_unique, ApiError, ApiResult};
use crate::services::activity;

#[derive(Debug, sqlx::FromRow)]
struct BrandRow {
    id: Uuid,
    organisation_id: Uuid,
    name: String,
    description: Option<String>,
    logo_url: Option<String>,
    product_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<BrandRow> for BrandResponse {
    fn from(row: BrandRow) -> Self {
        Self {
            id: row.id,
            organisation_id: row.organisation_id,
            name: row.name,
            description: row.description,
            logo_url: row.logo_url,
            product_count: row.product_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CategoryRow {
    id: Uuid,
    organisation_id: Uuid,
    name: String,
    description: Option<String>,
    product_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CategoryRow> for CategoryResponse {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: row.id,
            organisation_id: row.organisation_id,
            name: row.name,
            description: row.description,
            product_count: row.product_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const BRAND_SELECT: &str = r#"
    SELECT b.id, b.organisation_id, b.name, b.description, b.logo_url,
           (SELECT COUNT(*) FROM products p WHERE p.brand_id = b.id) AS product_count,
           b.created_at, b.updated_at
    FROM brands b
"#;

const CATEGORY_SELECT: &str = r#"
    SELECT c.id, c.organisation_id, c.name, c.description,
           (SELECT COUNT(*) FROM products p WHERE p.category_id = c.id) AS product_count,
           c.created_at, c.updated_at
    FROM categories c
"#;

/// Names of the organisation's brands, for AI prompts
pub(crate) async fn brand_names(state: &AppState, org_id: Uuid) -> ApiResult<Vec<String>> {
    let names = sqlx::query_scalar("SELECT name FROM brands WHERE organisation_id = $1 ORDER BY name")
        .bind(org_id)
        .fetch_all(&state.db)
        .await?;
    Ok(names)
}

/// Names of the organisation's categories, for AI prompts
pub(crate) async fn category_names(state: &AppState, org_id: Uuid) -> ApiResult<Vec<String>> {
    let names =
        sqlx::query_scalar("SELECT name FROM categories WHERE organisation_id = $1 ORDER BY name")
            .bind(org_id)
            .fetch_all(&state.db)
            .await?;
    Ok(names)
}

// =============================================================================
// Brands
// =============================================================================

async fn fetch_brand(state: &AppState, org_id: Uuid, brand_id: Uuid) -> ApiResult<BrandResponse> {
    let row = sqlx::query_as::<_, BrandRow>(&format!(
        "{} WHERE b.id = $1 AND b.organisation_id = $2",
        BRAND_SELECT
    ))
    .bind(brand_id)
    .bind(org_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Brand not found"))?;
    Ok(row.into())
}

/// GET /api/organisations/:org_id/brands
pub async fn list_brands(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Read).await?;

    let rows = sqlx::query_as::<_, BrandRow>(&format!(
        "{} WHERE b.organisation_id = $1 ORDER BY b.name",
        BRAND_SELECT
    ))
    .bind(org_id)
    .fetch_all(&state.db)
    .await?;

    let brands: Vec<BrandResponse> = rows.into_iter().map(Into::into).collect();
    Ok(listing::apply(brands, &query))
}

/// GET /api/organisations/:org_id/brands/:brand_id
pub async fn get_brand(
    State(state): State<Arc<AppState>>,
    Path((org_id, brand_id)): Path<(Uuid, Uuid)>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Read).await?;
    Ok(Json(DataResponse::new(fetch_brand(&state, org_id, brand_id).await?)))
}

/// POST /api/organisations/:org_id/brands
pub async fn create_brand(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<Uuid>,
    user: ActingUser,
    Json(req): Json<CreateBrandRequest>,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Write).await?;
    let req = req.validated()?;
    let brand_id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO brands (id, organisation_id, name, description, logo_url)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(brand_id)
    .bind(org_id)
    .bind(&req.name)
    .bind(&req.description)
    .bind(&req.logo_url)
    .execute(&state.db)
    .await
    .map_err(|e| conflict_on_unique(e, "A brand with this name already exists"))?;

    activity::record(
        &state.db,
        NewActivity::new(org_id, user.user_id, "brand.created", "brand", Some(brand_id))
            .with_details(serde_json::json!({ "name": req.name })),
    )
    .await;

    Ok(Created(fetch_brand(&state, org_id, brand_id).await?))
}

/// PATCH /api/organisations/:org_id/brands/:brand_id
pub async fn update_brand(
    State(state): State<Arc<AppState>>,
    Path((org_id, brand_id)): Path<(Uuid, Uuid)>,
    user: ActingUser,
    Json(req): Json<UpdateBrandRequest>,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Write).await?;
    let req = req.validated()?;

    let result = sqlx::query(
        r#"
        UPDATE brands SET
            name = COALESCE($3, name),
            description = COALESCE($4, description),
            logo_url = COALESCE($5, logo_url),
            updated_at = NOW()
        WHERE id = $1 AND organisation_id = $2
        "#,
    )
    .bind(brand_id)
    .bind(org_id)
    .bind(&req.name)
    .bind(&req.description)
    .bind(&req.logo_url)
    .execute(&state.db)
    .await
    .map_err(|e| conflict_on_unique(e, "A brand with this name already exists"))?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Brand not found"));
    }

    activity::record(
        &state.db,
        NewActivity::new(org_id, user.user_id, "brand.updated", "brand", Some(brand_id)),
    )
    .await;

    Ok(Json(DataResponse::new(fetch_brand(&state, org_id, brand_id).await?)))
}

/// DELETE /api/organisations/:org_id/brands/:brand_id
///
/// Refused while products still reference the brand.
pub async fn delete_brand(
    State(state): State<Arc<AppState>>,
    Path((org_id, brand_id)): Path<(Uuid, Uuid)>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Delete).await?;

    let brand = fetch_brand(&state, org_id, brand_id).await?;
    if brand.product_count > 0 {
        return Err(ApiError::conflict(format!(
            "Brand is used by {} product(s)",
            brand.product_count
        )));
    }

    sqlx::query("DELETE FROM brands WHERE id = $1 AND organisation_id = $2")
        .bind(brand_id)
        .bind(org_id)
        .execute(&state.db)
        .await?;

    activity::record(
        &state.db,
        NewActivity::new(org_id, user.user_id, "brand.deleted", "brand", Some(brand_id))
            .with_details(serde_json::json!({ "name": brand.name })),
    )
    .await;

    Ok(Json(MessageResponse::new("Brand deleted successfully")))
}

// =============================================================================
// Categories
// =============================================================================

async fn fetch_category(
    state: &AppState,
    org_id: Uuid,
    category_id: Uuid,
) -> ApiResult<CategoryResponse> {
    let row = sqlx::query_as::<_, CategoryRow>(&format!(
        "{} WHERE c.id = $1 AND c.organisation_id = $2",
        CATEGORY_SELECT
    ))
    .bind(category_id)
    .bind(org_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Category not found"))?;
    Ok(row.into())
}

/// GET /api/organisations/:org_id/categories
pub async fn list_categories(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Read).await?;

    let rows = sqlx::query_as::<_, CategoryRow>(&format!(
        "{} WHERE c.organisation_id = $1 ORDER BY c.name",
        CATEGORY_SELECT
    ))
    .bind(org_id)
    .fetch_all(&state.db)
    .await?;

    let categories: Vec<CategoryResponse> = rows.into_iter().map(Into::into).collect();
    Ok(listing::apply(categories, &query))
}

/// GET /api/organisations/:org_id/categories/:category_id
pub async fn get_category(
    State(state): State<Arc<AppState>>,
    Path((org_id, category_id)): Path<(Uuid, Uuid)>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Read).await?;
    Ok(Json(DataResponse::new(
        fetch_category(&state, org_id, category_id).await?,
    )))
}

/// POST /api/organisations/:org_id/categories
pub async fn create_category(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<Uuid>,
    user: ActingUser,
    Json(req): Json<CreateCategoryRequest>,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Write).await?;
    let req = req.validated()?;
    let category_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO categories (id, organisation_id, name, description) VALUES ($1, $2, $3, $4)",
    )
    .bind(category_id)
    .bind(org_id)
    .bind(&req.name)
    .bind(&req.description)
    .execute(&state.db)
    .await
    .map_err(|e| conflict_on_unique(e, "A category with this name already exists"))?;

    activity::record(
        &state.db,
        NewActivity::new(org_id, user.user_id, "category.created", "category", Some(category_id))
            .with_details(serde_json::json!({ "name": req.name })),
    )
    .await;

    Ok(Created(fetch_category(&state, org_id, category_id).await?))
}

/// PATCH /api/organisations/:org_id/categories/:category_id
pub async fn update_category(
    State(state): State<Arc<AppState>>,
    Path((org_id, category_id)): Path<(Uuid, Uuid)>,
    user: ActingUser,
    Json(req): Json<UpdateCategoryRequest>,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Write).await?;
    let req = req.validated()?;

    let result = sqlx::query(
        r#"
        UPDATE categories SET
            name = COALESCE($3, name),
            description = COALESCE($4, description),
            updated_at = NOW()
        WHERE id = $1 AND organisation_id = $2
        "#,
    )
    .bind(category_id)
    .bind(org_id)
    .bind(&req.name)
    .bind(&req.description)
    .execute(&state.db)
    .await
    .map_err(|e| conflict_on_unique(e, "A category with this name already exists"))?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Category not found"));
    }

    activity::record(
        &state.db,
        NewActivity::new(org_id, user.user_id, "category.updated", "category", Some(category_id)),
    )
    .await;

    Ok(Json(DataResponse::new(
        fetch_category(&state, org_id, category_id).await?,
    )))
}

/// DELETE /api/organisations/:org_id/categories/:category_id
///
/// Refused while products still reference the category.
pub async fn delete_category(
    State(state): State<Arc<AppState>>,
    Path((org_id, category_id)): Path<(Uuid, Uuid)>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Delete).await?;

    let category = fetch_category(&state, org_id, category_id).await?;
    if category.product_count > 0 {
        return Err(ApiError::conflict(format!(
            "Category is used by {} product(s)",
            category.product_count
        )));
    }

    sqlx::query("DELETE FROM categories WHERE id = $1 AND organisation_id = $2")
        .bind(category_id)
        .bind(org_id)
        .execute(&state.db)
        .await?;

    activity::record(
        &state.db,
        NewActivity::new(org_id, user.user_id, "category.deleted", "category", Some(category_id))
            .with_details(serde_json::json!({ "name": category.name })),
    )
    .await;

    Ok(Json(MessageResponse::new("Category deleted successfully")))
}
