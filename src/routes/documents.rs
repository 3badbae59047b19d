//! Document routes
//!
//! Metadata for files stored by the upload service.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::access::{require_permission, ActingUser};
use crate::api::{listing, Created, DataResponse, ListQuery};
use crate::app::AppState;
use crate::domain::activity::NewActivity;
use crate::domain::documents::{
    CreateDocumentRequest, DocumentFilter, DocumentResponse, RenameDocumentRequest,
};
use crate::domain::require_text;
use crate::domain::team::Permission;
use crate::error::{ApiError, ApiResult};
use crate::services::activity;

const DOCUMENT_COLUMNS: &str = "id, organisation_id, contact_id, devis_id, name, url, mime_type, \
     size_bytes, uploaded_by, archived, created_at, updated_at";

/// Database row for document
#[derive(Debug, sqlx::FromRow)]
struct DocumentRow {
    id: Uuid,
    organisation_id: Uuid,
    contact_id: Option<Uuid>,
    devis_id: Option<Uuid>,
    name: String,
    url: String,
    mime_type: String,
    size_bytes: i64,
    uploaded_by: Uuid,
    archived: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DocumentRow> for DocumentResponse {
    fn from(row: DocumentRow) -> Self {
        Self {
            id: row.id,
            organisation_id: row.organisation_id,
            contact_id: row.contact_id,
            devis_id: row.devis_id,
            name: row.name,
            url: row.url,
            mime_type: row.mime_type,
            size_bytes: row.size_bytes,
            uploaded_by: row.uploaded_by,
            archived: row.archived,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Linked contact or devis must live in the same organisation
async fn check_link(
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

/// GET /api/organisations/:org_id/documents
pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
    Query(filter): Query<DocumentFilter>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Read).await?;

    let rows = sqlx::query_as::<_, DocumentRow>(&format!(
        "SELECT {} FROM documents WHERE organisation_id = $1 ORDER BY created_at DESC",
        DOCUMENT_COLUMNS
    ))
    .bind(org_id)
    .fetch_all(&state.db)
    .await?;

    let documents: Vec<DocumentResponse> = rows
        .into_iter()
        .map(DocumentResponse::from)
        .filter(|d| d.matches(&filter))
        .collect();

    Ok(listing::apply(documents, &query))
}

/// GET /api/organisations/:org_id/documents/:document_id
pub async fn get_document(
    State(state): State<Arc<AppState>>,
    Path((org_id, document_id)): Path<(Uuid, Uuid)>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Read).await?;

    let row = sqlx::query_as::<_, DocumentRow>(&format!(
        "SELECT {} FROM documents WHERE id = $1 AND organisation_id = $2",
        DOCUMENT_COLUMNS
    ))
    .bind(document_id)
    .bind(org_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Document not found"))?;

    Ok(Json(DataResponse::new(DocumentResponse::from(row))))
}

/// POST /api/organisations/:org_id/documents
///
/// Register a file already uploaded to the storage service.
pub async fn create_document(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<Uuid>,
    user: ActingUser,
    Json(req): Json<CreateDocumentRequest>,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Write).await?;
    let req = req.validated()?;
    check_link(&state, org_id, "contacts", "contact_id", req.contact_id).await?;
    check_link(&state, org_id, "devis", "devis_id", req.devis_id).await?;

    let row = sqlx::query_as::<_, DocumentRow>(&format!(
        r#"
        INSERT INTO documents (id, organisation_id, contact_id, devis_id, name, url, mime_type,
                               size_bytes, uploaded_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {}
        "#,
        DOCUMENT_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(org_id)
    .bind(req.contact_id)
    .bind(req.devis_id)
    .bind(&req.name)
    .bind(&req.url)
    .bind(&req.mime_type)
    .bind(req.size_bytes)
    .bind(user.user_id)
    .fetch_one(&state.db)
    .await?;

    let document = DocumentResponse::from(row);

    activity::record(
        &state.db,
        NewActivity::new(org_id, user.user_id, "document.created", "document", Some(document.id))
            .with_details(serde_json::json!({
                "name": document.name,
                "mime_type": document.mime_type,
                "size_bytes": document.size_bytes,
            })),
    )
    .await;

    tracing::info!(
        organisation_id = %org_id,
        document_id = %document.id,
        document_name = %document.name,
        "Document registered"
    );

    Ok(Created(document))
}

/// PATCH /api/organisations/:org_id/documents/:document_id
pub async fn rename_document(
    State(state): State<Arc<AppState>>,
    Path((org_id, document_id)): Path<(Uuid, Uuid)>,
    user: ActingUser,
    Json(req): Json<RenameDocumentRequest>,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Write).await?;
    let name = require_text("name", &req.name)?;

    let row = sqlx::query_as::<_, DocumentRow>(&format!(
        r#"
        UPDATE documents SET name = $3, updated_at = NOW()
        WHERE id = $1 AND organisation_id = $2
        RETURNING {}
        "#,
        DOCUMENT_COLUMNS
    ))
    .bind(document_id)
    .bind(org_id)
    .bind(&name)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Document not found"))?;

    activity::record(
        &state.db,
        NewActivity::new(org_id, user.user_id, "document.renamed", "document", Some(document_id))
            .with_details(serde_json::json!({ "name": name })),
    )
    .await;

    Ok(Json(DataResponse::new(DocumentResponse::from(row))))
}

/// POST /api/organisations/:org_id/documents/:document_id/archive
pub async fn archive_document(
    State(state): State<Arc<AppState>>,
    Path((org_id, document_id)): Path<(Uuid, Uuid)>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Delete).await?;

    let row = sqlx::query_as::<_, DocumentRow>(&format!(
        r#"
        UPDATE documents SET archived = TRUE, updated_at = NOW()
        WHERE id = $1 AND organisation_id = $2
        RETURNING {}
        "#,
        DOCUMENT_COLUMNS
    ))
    .bind(document_id)
    .bind(org_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Document not found"))?;

    activity::record(
        &state.db,
        NewActivity::new(org_id, user.user_id, "document.archived", "document", Some(document_id)),
    )
    .await;

    Ok(Json(DataResponse::new(DocumentResponse::from(row))))
}
