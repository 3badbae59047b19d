//! Organisation routes
//!
//! Onboarding, lookup by id or slug, settings and the dashboard overview.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::access::{require_permission, ActingUser};
use crate::api::{Created, DataResponse, MessageResponse};
use crate::app::AppState;
use crate::domain::activity::NewActivity;
use crate::domain::organisations::{
    slug_candidate, CreateOrganisationRequest, Organisation, OrganisationOverview,
    OrganisationResponse, UpdateOrganisationRequest,
};
use crate::domain::team::{Permission, Role};
use crate::error::{conflict_on_unique, ApiError, ApiResult};
use crate::services::activity;
use crate::services::cache::keys;

/// Give up looking for a free slug after this many suffixes
const MAX_SLUG_ATTEMPTS: u32 = 100;

/// Used when the name has no character that survives slugging
const FALLBACK_SLUG: &str = "organisation";

const SLUG_LOOKUP_TTL: Duration = Duration::from_secs(6 * 60 * 60);

const ORGANISATION_COLUMNS: &str = "id, name, slug, description, email, phone, address, city, \
     country, currency, archived_at, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct MembershipRow {
    #[sqlx(flatten)]
    organisation: Organisation,
    role: String,
}

/// Live organisation by id, through the cache.
pub(crate) async fn load_organisation(state: &AppState, organisation_id: Uuid) -> ApiResult<OrganisationResponse> {
    let cache_key = keys::organisation(organisation_id);
    if let Some(cached) = state.cache.get::<OrganisationResponse>(&cache_key).await {
        return Ok(cached);
    }

    let organisation = sqlx::query_as::<_, Organisation>(&format!(
        "SELECT {} FROM organisations WHERE id = $1 AND archived_at IS NULL",
        ORGANISATION_COLUMNS
    ))
    .bind(organisation_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Organisation not found"))?;

    let response = OrganisationResponse::from(organisation);
    if let Err(e) = state.cache.set(&cache_key, &response).await {
        tracing::warn!(organisation_id = %organisation_id, error = %e, "Failed to cache organisation");
    }
    Ok(response)
}

/// POST /api/organisations
///
/// Create an organisation; the caller becomes its owner.
pub async fn create_organisation(
    State(state): State<Arc<AppState>>,
    user: ActingUser,
    Json(req): Json<CreateOrganisationRequest>,
) -> ApiResult<impl IntoResponse> {
    let req = req.validated()?;
    let mut base = req.base_slug();
    if base.is_empty() {
        base = FALLBACK_SLUG.to_string();
    }

    let mut tx = state.db.begin().await?;

    let mut slug = None;
    for attempt in 1..=MAX_SLUG_ATTEMPTS {
        let candidate = slug_candidate(&base, attempt);
        let taken: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM organisations WHERE slug = $1)")
                .bind(&candidate)
                .fetch_one(&mut *tx)
                .await?;
        if !taken {
            slug = Some(candidate);
            break;
        }
    }
    let slug = slug.ok_or_else(|| {
        ApiError::conflict(format!("No free slug left for '{}', choose another one", base))
    })?;

    let organisation = sqlx::query_as::<_, Organisation>(&format!(
        r#"
        INSERT INTO organisations (id, name, slug, description, email, phone, address, city, country, currency)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING {}
        "#,
        ORGANISATION_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(&req.name)
    .bind(&slug)
    .bind(&req.description)
    .bind(&req.email)
    .bind(&req.phone)
    .bind(&req.address)
    .bind(&req.city)
    .bind(&req.country)
    .bind(&req.currency)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| conflict_on_unique(e, "Slug already taken, try again"))?;

    sqlx::query(
        "INSERT INTO organisation_members (organisation_id, user_id, role) VALUES ($1, $2, $3)",
    )
    .bind(organisation.id)
    .bind(user.user_id)
    .bind(Role::Owner.as_str())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        organisation_id = %organisation.id,
        slug = %organisation.slug,
        user_id = %user.user_id,
        "Organisation created"
    );

    activity::record(
        &state.db,
        NewActivity::new(
            organisation.id,
            user.user_id,
            "organisation.created",
            "organisation",
            Some(organisation.id),
        )
        .with_details(serde_json::json!({ "slug": organisation.slug })),
    )
    .await;

    let mut response = OrganisationResponse::from(organisation);
    response.role = Some(Role::Owner);
    Ok(Created(response))
}

/// GET /api/organisations
///
/// Organisations the caller belongs to, by name.
pub async fn list_my_organisations(
    State(state): State<Arc<AppState>>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    let rows = sqlx::query_as::<_, MembershipRow>(
        r#"
        SELECT o.id, o.name, o.slug, o.description, o.email, o.phone, o.address, o.city,
               o.country, o.currency, o.archived_at, o.created_at, o.updated_at, m.role
        FROM organisations o
        JOIN organisation_members m ON m.organisation_id = o.id
        WHERE m.user_id = $1 AND o.archived_at IS NULL
        ORDER BY LOWER(o.name)
        "#,
    )
    .bind(user.user_id)
    .fetch_all(&state.db)
    .await?;

    let data: Vec<OrganisationResponse> = rows
        .into_iter()
        .map(|row| {
            let role = Role::parse(&row.role);
            OrganisationResponse {
                role,
                ..row.organisation.into()
            }
        })
        .collect();

    Ok(Json(DataResponse::new(data)))
}

/// GET /api/organisations/:org_id
pub async fn get_organisation(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<Uuid>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    let membership = require_permission(&state.db, org_id, user, Permission::Read).await?;
    let mut response = load_organisation(&state, org_id).await?;
    response.role = Some(membership.role);
    Ok(Json(DataResponse::new(response)))
}

/// GET /api/slugs/:slug
///
/// Resolve an organisation by its slug.
pub async fn get_organisation_by_slug(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    let cache_key = keys::organisation_slug(&slug);
    let org_id = match state.cache.get::<Uuid>(&cache_key).await {
        Some(id) => id,
        None => {
            let id: Uuid = sqlx::query_scalar(
                "SELECT id FROM organisations WHERE slug = $1 AND archived_at IS NULL",
            )
            .bind(&slug)
            .fetch_optional(&state.db)
            .await?
            .ok_or_else(|| ApiError::not_found("Organisation not found"))?;

            // Slugs never change, so the lookup can outlive regular entries
            if let Err(e) = state.cache.set_with_ttl(&cache_key, &id, SLUG_LOOKUP_TTL).await {
                tracing::warn!(slug = %slug, error = %e, "Failed to cache slug lookup");
            }
            id
        }
    };

    let membership = require_permission(&state.db, org_id, user, Permission::Read).await?;
    let mut response = load_organisation(&state, org_id).await?;
    response.role = Some(membership.role);
    Ok(Json(DataResponse::new(response)))
}

/// PATCH /api/organisations/:org_id
///
/// Update settings. The slug is kept so existing links keep working.
pub async fn update_organisation(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<Uuid>,
    user: ActingUser,
    Json(req): Json<UpdateOrganisationRequest>,
) -> ApiResult<impl IntoResponse> {
    let membership =
        require_permission(&state.db, org_id, user, Permission::ManageOrganisation).await?;
    let req = req.validated()?;

    let organisation = sqlx::query_as::<_, Organisation>(&format!(
        r#"
        UPDATE organisations SET
            name = COALESCE($2, name),
            description = COALESCE($3, description),
            email = COALESCE($4, email),
            phone = COALESCE($5, phone),
            address = COALESCE($6, address),
            city = COALESCE($7, city),
            country = COALESCE($8, country),
            currency = COALESCE($9, currency),
            updated_at = NOW()
        WHERE id = $1 AND archived_at IS NULL
        RETURNING {}
        "#,
        ORGANISATION_COLUMNS
    ))
    .bind(org_id)
    .bind(&req.name)
    .bind(&req.description)
    .bind(&req.email)
    .bind(&req.phone)
    .bind(&req.address)
    .bind(&req.city)
    .bind(&req.country)
    .bind(&req.currency)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Organisation not found"))?;

    state
        .cache
        .invalidate_organisation(org_id, Some(&organisation.slug))
        .await;

    activity::record(
        &state.db,
        NewActivity::new(org_id, user.user_id, "organisation.updated", "organisation", Some(org_id)),
    )
    .await;

    tracing::info!(organisation_id = %org_id, "Organisation updated");

    let mut response = OrganisationResponse::from(organisation);
    response.role = Some(membership.role);
    Ok(Json(DataResponse::new(response)))
}

/// DELETE /api/organisations/:org_id
///
/// Soft delete: the organisation disappears from every route.
pub async fn archive_organisation(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<Uuid>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::ManageOrganisation).await?;

    let slug: String = sqlx::query_scalar(
        r#"
        UPDATE organisations SET archived_at = NOW(), updated_at = NOW()
        WHERE id = $1 AND archived_at IS NULL
        RETURNING slug
        "#,
    )
    .bind(org_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Organisation not found"))?;

    state.cache.invalidate_organisation(org_id, Some(&slug)).await;

    activity::record(
        &state.db,
        NewActivity::new(org_id, user.user_id, "organisation.archived", "organisation", Some(org_id)),
    )
    .await;

    tracing::info!(organisation_id = %org_id, user_id = %user.user_id, "Organisation archived");

    Ok(Json(MessageResponse::new("Organisation archived")))
}

#[derive(Debug, sqlx::FromRow)]
struct OverviewCounts {
    contacts: i64,
    products: i64,
    devis: i64,
    open_tasks: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct StatusTotal {
    status: String,
    total: Decimal,
}

/// GET /api/organisations/:org_id/overview
///
/// Dashboard counters, cached until the next write in the organisation.
pub async fn get_overview(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<Uuid>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Read).await?;

    let cache_key = keys::overview(org_id);
    if let Some(cached) = state.cache.get::<OrganisationOverview>(&cache_key).await {
        tracing::debug!(organisation_id = %org_id, "Returning cached overview");
        return Ok(Json(DataResponse::new(cached)));
    }

    let counts = sqlx::query_as::<_, OverviewCounts>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM contacts WHERE organisation_id = $1 AND NOT archived) AS contacts,
            (SELECT COUNT(*) FROM products WHERE organisation_id = $1 AND NOT archived) AS products,
            (SELECT COUNT(*) FROM devis WHERE organisation_id = $1) AS devis,
            (SELECT COUNT(*) FROM tasks WHERE organisation_id = $1 AND status <> 'done') AS open_tasks
        "#,
    )
    .bind(org_id)
    .fetch_one(&state.db)
    .await?;

    let totals = sqlx::query_as::<_, StatusTotal>(
        r#"
        SELECT status, COALESCE(SUM(total), 0) AS total
        FROM devis
        WHERE organisation_id = $1
        GROUP BY status
        "#,
    )
    .bind(org_id)
    .fetch_all(&state.db)
    .await?;

    let overview = OrganisationOverview {
        organisation_id: org_id,
        contacts: counts.contacts,
        products: counts.products,
        devis: counts.devis,
        open_tasks: counts.open_tasks,
        devis_totals_by_status: totals
            .into_iter()
            .map(|t| (t.status, t.total))
            .collect::<BTreeMap<_, _>>(),
    };

    if let Err(e) = state.cache.set(&cache_key, &overview).await {
        tracing::warn!(organisation_id = %org_id, error = %e, "Failed to cache overview");
    }

    Ok(Json(DataResponse::new(overview)))
}
