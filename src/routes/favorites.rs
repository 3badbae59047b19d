//! Favourite routes
//!
//! Per-user stars on contacts and products.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::access::{require_permission, ActingUser};
use crate::api::DataResponse;
use crate::app::AppState;
use crate::domain::favorites::{
    FavoriteKind, FavoriteResponse, ToggleFavoriteRequest, ToggleFavoriteResponse,
};
use crate::domain::team::Permission;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, sqlx::FromRow)]
struct FavoriteRow {
    entity_type: String,
    entity_id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
}

/// GET /api/organisations/:org_id/favorites
///
/// The acting user's favourites, most recent first.
pub async fn list_favorites(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<Uuid>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Read).await?;

    let rows = sqlx::query_as::<_, FavoriteRow>(
        r#"
        SELECT f.entity_type, f.entity_id, COALESCE(c.name, p.name) AS name, f.created_at
        FROM favorites f
        LEFT JOIN contacts c ON f.entity_type = 'contact' AND c.id = f.entity_id
        LEFT JOIN products p ON f.entity_type = 'product' AND p.id = f.entity_id
        WHERE f.organisation_id = $1 AND f.user_id = $2
          AND COALESCE(c.name, p.name) IS NOT NULL
        ORDER BY f.created_at DESC
        "#,
    )
    .bind(org_id)
    .bind(user.user_id)
    .fetch_all(&state.db)
    .await?;

    let favorites: Vec<FavoriteResponse> = rows
        .into_iter()
        .filter_map(|row| {
            Some(FavoriteResponse {
                entity_type: FavoriteKind::parse(&row.entity_type)?,
                entity_id: row.entity_id,
                name: row.name,
                created_at: row.created_at,
            })
        })
        .collect();

    Ok(Json(DataResponse::new(favorites)))
}

/// POST /api/organisations/:org_id/favorites/toggle
///
/// Star or unstar a contact or product; returns the new state.
pub async fn toggle_favorite(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<Uuid>,
    user: ActingUser,
    Json(req): Json<ToggleFavoriteRequest>,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Read).await?;

    let exists: bool = sqlx::query_scalar(&format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1 AND organisation_id = $2)",
        req.entity_type.table()
    ))
    .bind(req.entity_id)
    .bind(org_id)
    .fetch_one(&state.db)
    .await?;

    if !exists {
        return Err(ApiError::not_found(format!(
            "{} not found",
            req.entity_type.as_str()
        )));
    }

    let removed = sqlx::query(
        r#"
        DELETE FROM favorites
        WHERE organisation_id = $1 AND user_id = $2 AND entity_type = $3 AND entity_id = $4
        "#,
    )
    .bind(org_id)
    .bind(user.user_id)
    .bind(req.entity_type.as_str())
    .bind(req.entity_id)
    .execute(&state.db)
    .await?
    .rows_affected();

    if removed == 0 {
        sqlx::query(
            r#"
            INSERT INTO favorites (organisation_id, user_id, entity_type, entity_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(org_id)
        .bind(user.user_id)
        .bind(req.entity_type.as_str())
        .bind(req.entity_id)
        .execute(&state.db)
        .await?;
    }

    tracing::debug!(
        user_id = %user.user_id,
        entity_type = req.entity_type.as_str(),
        entity_id = %req.entity_id,
        favorite = removed == 0,
        "Favourite toggled"
    );

    Ok(Json(DataResponse::new(ToggleFavoriteResponse {
        entity_type: req.entity_type,
        entity_id: req.entity_id,
        favorite: removed == 0,
    })))
}
