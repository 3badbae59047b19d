//! Task routes
//!
//! Follow-up work inside an organisation.

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
use crate::domain::tasks::{
    CreateTaskRequest, TaskFilter, TaskPriority, TaskResponse, TaskStatus, UpdateTaskRequest,
};
use crate::domain::team::Permission;
use crate::error::{ApiError, ApiResult};
use crate::services::activity;

const TASK_COLUMNS: &str = "id, organisation_id, title, description, status, priority, \
     assignee_id, due_date, contact_id, created_by, created_at, updated_at";

/// Database row for task
#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    organisation_id: Uuid,
    title: String,
    description: Option<String>,
    status: String,
    priority: String,
    assignee_id: Option<Uuid>,
    due_date: Option<DateTime<Utc>>,
    contact_id: Option<Uuid>,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TaskRow> for TaskResponse {
    fn from(row: TaskRow) -> Self {
        Self {
            id: row.id,
            organisation_id: row.organisation_id,
            title: row.title,
            description: row.description,
            status: TaskStatus::parse(&row.status),
            priority: TaskPriority::parse(&row.priority),
            assignee_id: row.assignee_id,
            due_date: row.due_date,
            contact_id: row.contact_id,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Assignee must be a member and the contact must be ours
async fn check_links(
    state: &AppState,
    org_id: Uuid,
    assignee_id: Option<Uuid>,
    contact_id: Option<Uuid>,
) -> ApiResult<()> {
    if let Some(assignee_id) = assignee_id {
        let member: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM organisation_members WHERE organisation_id = $1 AND user_id = $2)",
        )
        .bind(org_id)
        .bind(assignee_id)
        .fetch_one(&state.db)
        .await?;

        if !member {
            return Err(ApiError::bad_request(
                "assignee_id is not a member of this organisation",
            ));
        }
    }

    if let Some(contact_id) = contact_id {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM contacts WHERE id = $1 AND organisation_id = $2)",
        )
        .bind(contact_id)
        .bind(org_id)
        .fetch_one(&state.db)
        .await?;

        if !exists {
            return Err(ApiError::bad_request(
                "contact_id does not belong to this organisation",
            ));
        }
    }

    Ok(())
}

/// GET /api/organisations/:org_id/tasks
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
    Query(filter): Query<TaskFilter>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Read).await?;

    let rows = sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {} FROM tasks WHERE organisation_id = $1 ORDER BY created_at DESC",
        TASK_COLUMNS
    ))
    .bind(org_id)
    .fetch_all(&state.db)
    .await?;

    let tasks: Vec<TaskResponse> = rows
        .into_iter()
        .map(TaskResponse::from)
        .filter(|t| t.matches(&filter))
        .collect();

    Ok(listing::apply(tasks, &query))
}

/// GET /api/organisations/:org_id/tasks/:task_id
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path((org_id, task_id)): Path<(Uuid, Uuid)>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Read).await?;

    let task = sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {} FROM tasks WHERE id = $1 AND organisation_id = $2",
        TASK_COLUMNS
    ))
    .bind(task_id)
    .bind(org_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Task not found"))?;

    Ok(Json(DataResponse::new(TaskResponse::from(task))))
}

/// POST /api/organisations/:org_id/tasks
pub async fn create_task(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<Uuid>,
    user: ActingUser,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Write).await?;
    let req = req.validated()?;
    check_links(&state, org_id, req.assignee_id, req.contact_id).await?;

    let task = sqlx::query_as::<_, TaskRow>(&format!(
        r#"
        INSERT INTO tasks (id, organisation_id, title, description, status, priority,
                           assignee_id, due_date, contact_id, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING {}
        "#,
        TASK_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(org_id)
    .bind(&req.title)
    .bind(&req.description)
    .bind(req.status.as_str())
    .bind(req.priority.as_str())
    .bind(req.assignee_id)
    .bind(req.due_date)
    .bind(req.contact_id)
    .bind(user.user_id)
    .fetch_one(&state.db)
    .await?;

    let task = TaskResponse::from(task);

    state.cache.invalidate_overview(org_id).await;
    activity::record(
        &state.db,
        NewActivity::new(org_id, user.user_id, "task.created", "task", Some(task.id))
            .with_details(serde_json::json!({ "title": task.title, "priority": task.priority })),
    )
    .await;

    Ok(Created(task))
}

/// PATCH /api/organisations/:org_id/tasks/:task_id
pub async fn update_task(
    State(state): State<Arc<AppState>>,
    Path((org_id, task_id)): Path<(Uuid, Uuid)>,
    user: ActingUser,
    Json(req): Json<UpdateTaskRequest>,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Write).await?;
    let req = req.validated()?;
    check_links(&state, org_id, req.assignee_id, req.contact_id).await?;

    let task = sqlx::query_as::<_, TaskRow>(&format!(
        r#"
        UPDATE tasks SET
            title = COALESCE($3, title),
            description = COALESCE($4, description),
            status = COALESCE($5, status),
            priority = COALESCE($6, priority),
            assignee_id = COALESCE($7, assignee_id),
            due_date = COALESCE($8, due_date),
            contact_id = COALESCE($9, contact_id),
            updated_at = NOW()
        WHERE id = $1 AND organisation_id = $2
        RETURNING {}
        "#,
        TASK_COLUMNS
    ))
    .bind(task_id)
    .bind(org_id)
    .bind(&req.title)
    .bind(&req.description)
    .bind(req.status.map(TaskStatus::as_str))
    .bind(req.priority.map(TaskPriority::as_str))
    .bind(req.assignee_id)
    .bind(req.due_date)
    .bind(req.contact_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Task not found"))?;

    if req.status.is_some() {
        state.cache.invalidate_overview(org_id).await;
    }
    activity::record(
        &state.db,
        NewActivity::new(org_id, user.user_id, "task.updated", "task", Some(task_id))
            .with_details(serde_json::json!({ "status": req.status })),
    )
    .await;

    Ok(Json(DataResponse::new(TaskResponse::from(task))))
}

/// DELETE /api/organisations/:org_id/tasks/:task_id
pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path((org_id, task_id)): Path<(Uuid, Uuid)>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Delete).await?;

    let result = sqlx::query("DELETE FROM tasks WHERE id = $1 AND organisation_id = $2")
        .bind(task_id)
        .bind(org_id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Task not found"));
    }

    state.cache.invalidate_overview(org_id).await;
    activity::record(
        &state.db,
        NewActivity::new(org_id, user.user_id, "task.deleted", "task", Some(task_id)),
    )
    .await;

    Ok(Json(MessageResponse::new("Task deleted successfully")))
}
