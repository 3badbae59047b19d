//! Contact routes
//!
//! The organisation's CRM records.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use sqlx::types::Json as JsonColumn;
use std::sync::Arc;
use uuid::Uuid;

use crate::access::{require_permission, ActingUser};
use crate::api::{listing, Created, DataResponse, ListQuery};
use crate::app::AppState;
use crate::domain::activity::NewActivity;
use crate::domain::contacts::{
    ContactFilter, ContactKind, ContactResponse, CreateContactRequest, UpdateContactRequest,
};
use crate::domain::team::Permission;
use crate::error::{ApiError, ApiResult};
use crate::services::activity;

pub(crate) const CONTACT_COLUMNS: &str = "id, organisation_id, kind, name, email, phone, address, \
     city, country, notes, tags, archived, created_at, updated_at";

/// Database row for contact
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ContactRow {
    id: Uuid,
    organisation_id: Uuid,
    kind: String,
    name: String,
    email: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    city: Option<String>,
    country: Option<String>,
    notes: Option<String>,
    tags: JsonColumn<Vec<String>>,
    archived: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ContactRow> for ContactResponse {
    fn from(row: ContactRow) -> Self {
        Self {
            id: row.id,
            organisation_id: row.organisation_id,
            kind: ContactKind::parse(&row.kind),
            name: row.name,
            email: row.email,
            phone: row.phone,
            address: row.address,
            city: row.city,
            country: row.country,
            notes: row.notes,
            tags: row.tags.0,
            archived: row.archived,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

async fn fetch_contact(state: &AppState, org_id: Uuid, contact_id: Uuid) -> ApiResult<ContactResponse> {
    let row = sqlx::query_as::<_, ContactRow>(&format!(
        "SELECT {} FROM contacts WHERE id = $1 AND organisation_id = $2",
        CONTACT_COLUMNS
    ))
    .bind(contact_id)
    .bind(org_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Contact not found"))?;

    Ok(row.into())
}

/// GET /api/organisations/:org_id/contacts
///
/// List contacts with search, filters, sort and pagination.
pub async fn list_contacts(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
    Query(filter): Query<ContactFilter>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Read).await?;

    let rows = sqlx::query_as::<_, ContactRow>(&format!(
        "SELECT {} FROM contacts WHERE organisation_id = $1 ORDER BY created_at DESC",
        CONTACT_COLUMNS
    ))
    .bind(org_id)
    .fetch_all(&state.db)
    .await?;

    let contacts: Vec<ContactResponse> = rows
        .into_iter()
        .map(ContactResponse::from)
        .filter(|c| c.matches(&filter))
        .collect();

    Ok(listing::apply(contacts, &query))
}

/// GET /api/organisations/:org_id/contacts/:contact_id
pub async fn get_contact(
    State(state): State<Arc<AppState>>,
    Path((org_id, contact_id)): Path<(Uuid, Uuid)>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Read).await?;
    let contact = fetch_contact(&state, org_id, contact_id).await?;
    Ok(Json(DataResponse::new(contact)))
}

/// POST /api/organisations/:org_id/contacts
pub async fn create_contact(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<Uuid>,
    user: ActingUser,
    Json(req): Json<CreateContactRequest>,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Write).await?;
    let req = req.validated()?;

    let row = sqlx::query_as::<_, ContactRow>(&format!(
        r#"
        INSERT INTO contacts (id, organisation_id, kind, name, email, phone, address, city, country, notes, tags)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING {}
        "#,
        CONTACT_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(org_id)
    .bind(req.kind.as_str())
    .bind(&req.name)
    .bind(&req.email)
    .bind(&req.phone)
    .bind(&req.address)
    .bind(&req.city)
    .bind(&req.country)
    .bind(&req.notes)
    .bind(JsonColumn(&req.tags))
    .fetch_one(&state.db)
    .await?;

    let contact = ContactResponse::from(row);

    state.cache.invalidate_overview(org_id).await;
    activity::record(
        &state.db,
        NewActivity::new(org_id, user.user_id, "contact.created", "contact", Some(contact.id))
            .with_details(serde_json::json!({ "name": contact.name })),
    )
    .await;

    tracing::info!(organisation_id = %org_id, contact_id = %contact.id, "Contact created");

    Ok(Created(contact))
}

/// PATCH /api/organisations/:org_id/contacts/:contact_id
pub async fn update_contact(
    State(state): State<Arc<AppState>>,
    Path((org_id, contact_id)): Path<(Uuid, Uuid)>,
    user: ActingUser,
    Json(req): Json<UpdateContactRequest>,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Write).await?;
    let req = req.validated()?;

    let row = sqlx::query_as::<_, ContactRow>(&format!(
        r#"
        UPDATE contacts SET
            kind = COALESCE($3, kind),
            name = COALESCE($4, name),
            email = COALESCE($5, email),
            phone = COALESCE($6, phone),
            address = COALESCE($7, address),
            city = COALESCE($8, city),
            country = COALESCE($9, country),
            notes = COALESCE($10, notes),
            tags = COALESCE($11, tags),
            updated_at = NOW()
        WHERE id = $1 AND organisation_id = $2
        RETURNING {}
        "#,
        CONTACT_COLUMNS
    ))
    .bind(contact_id)
    .bind(org_id)
    .bind(req.kind.map(ContactKind::as_str))
    .bind(&req.name)
    .bind(&req.email)
    .bind(&req.phone)
    .bind(&req.address)
    .bind(&req.city)
    .bind(&req.country)
    .bind(&req.notes)
    .bind(req.tags.as_ref().map(JsonColumn))
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Contact not found"))?;

    activity::record(
        &state.db,
        NewActivity::new(org_id, user.user_id, "contact.updated", "contact", Some(contact_id)),
    )
    .await;

    Ok(Json(DataResponse::new(ContactResponse::from(row))))
}

async fn set_archived(
    state: &AppState,
    org_id: Uuid,
    contact_id: Uuid,
    archived: bool,
) -> ApiResult<ContactResponse> {
    let row = sqlx::query_as::<_, ContactRow>(&format!(
        r#"
        UPDATE contacts SET archived = $3, updated_at = NOW()
        WHERE id = $1 AND organisation_id = $2
        RETURNING {}
        "#,
        CONTACT_COLUMNS
    ))
    .bind(contact_id)
    .bind(org_id)
    .bind(archived)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Contact not found"))?;

    state.cache.invalidate_overview(org_id).await;
    Ok(row.into())
}

/// POST /api/organisations/:org_id/contacts/:contact_id/archive
pub async fn archive_contact(
    State(state): State<Arc<AppState>>,
    Path((org_id, contact_id)): Path<(Uuid, Uuid)>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Delete).await?;
    let contact = set_archived(&state, org_id, contact_id, true).await?;

    activity::record(
        &state.db,
        NewActivity::new(org_id, user.user_id, "contact.archived", "contact", Some(contact_id)),
    )
    .await;

    Ok(Json(DataResponse::new(contact)))
}

/// POST /api/organisations/:org_id/contacts/:contact_id/unarchive
pub async fn unarchive_contact(
    State(state): State<Arc<AppState>>,
    Path((org_id, contact_id)): Path<(Uuid, Uuid)>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Write).await?;
    let contact = set_archived(&state, org_id, contact_id, false).await?;

    activity::record(
        &state.db,
        NewActivity::new(org_id, user.user_id, "contact.unarchived", "contact", Some(contact_id)),
    )
    .await;

    Ok(Json(DataResponse::new(contact)))
}
