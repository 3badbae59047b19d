//! Activity log routes

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use sqlx::types::Json as JsonColumn;
use std::sync::Arc;
use uuid::Uuid;

use crate::access::{require_permission, ActingUser};
use crate::api::{Paginated, PaginationParams};
use crate::app::AppState;
use crate::domain::activity::ActivityResponse;
use crate::domain::team::Permission;
use crate::error::ApiResult;

#[derive(Debug, sqlx::FromRow)]
struct ActivityRow {
    id: Uuid,
    organisation_id: Uuid,
    user_id: Uuid,
    action: String,
    entity_type: String,
    entity_id: Option<Uuid>,
    details: JsonColumn<serde_json::Value>,
    created_at: DateTime<Utc>,
}

impl From<ActivityRow> for ActivityResponse {
    fn from(row: ActivityRow) -> Self {
        Self {
            id: row.id,
            organisation_id: row.organisation_id,
            user_id: row.user_id,
            action: row.action,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            details: row.details.0,
            created_at: row.created_at,
        }
    }
}

/// GET /api/organisations/:org_id/activity
///
/// Newest first. The log can grow large, so paging happens in SQL.
pub async fn list_activity(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<Uuid>,
    Query(pagination): Query<PaginationParams>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Read).await?;

    let total: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM activity_logs WHERE organisation_id = $1")
            .bind(org_id)
            .fetch_one(&state.db)
            .await?;

    let rows = sqlx::query_as::<_, ActivityRow>(
        r#"
        SELECT id, organisation_id, user_id, action, entity_type, entity_id, details, created_at
        FROM activity_logs
        WHERE organisation_id = $1
        ORDER BY created_at DESC, id
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(org_id)
    .bind(pagination.limit() as i64)
    .bind(pagination.offset() as i64)
    .fetch_all(&state.db)
    .await?;

    let data = rows.into_iter().map(ActivityResponse::from).collect();

    Ok(Paginated::new(data, &pagination, total as u64))
}
