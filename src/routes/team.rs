//! Team routes
//!
//! Membership of an organisation and the role each member holds.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction};
use std::sync::Arc;
use uuid::Uuid;

use crate::access::{require_permission, ActingUser, Membership};
use crate::api::{Created, DataResponse, MessageResponse};
use crate::app::AppState;
use crate::domain::activity::NewActivity;
use crate::domain::team::{
    would_orphan, AddMemberRequest, MemberResponse, Permission, Role, UpdateMemberRequest,
};
use crate::error::{conflict_on_unique, ApiError, ApiResult};
use crate::services::activity;

/// Database row for a member
#[derive(Debug, sqlx::FromRow)]
struct MemberRow {
    organisation_id: Uuid,
    user_id: Uuid,
    role: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MemberRow> for MemberResponse {
    type Error = ApiError;

    fn try_from(row: MemberRow) -> Result<Self, Self::Error> {
        let role = Role::parse(&row.role)
            .ok_or_else(|| ApiError::internal(format!("Unknown role '{}'", row.role)))?;
        Ok(Self {
            organisation_id: row.organisation_id,
            user_id: row.user_id,
            role,
            created_at: row.created_at,
        })
    }
}

/// Only owners hand out or take away the owner role
fn check_owner_change(acting: &Membership, touched: &[Role]) -> ApiResult<()> {
    if touched.contains(&Role::Owner) && acting.role != Role::Owner {
        return Err(ApiError::forbidden("Only an owner can grant or revoke ownership"));
    }
    Ok(())
}

fn keep_an_owner(current: Role, next: Option<Role>, owners: &[Uuid]) -> ApiResult<()> {
    if would_orphan(current, next, owners.len() as i64) {
        return Err(ApiError::conflict("An organisation must keep at least one owner"));
    }
    Ok(())
}

/// Lock the owner rows until `tx` ends. Concurrent demotions queue here and
/// the later one counts the owners left by the earlier.
async fn lock_owners(tx: &mut Transaction<'_, Postgres>, org_id: Uuid) -> ApiResult<Vec<Uuid>> {
    let owners: Vec<Uuid> = sqlx::query_scalar(
        r#"
        SELECT user_id FROM organisation_members
        WHERE organisation_id = $1 AND role = 'owner'
        ORDER BY user_id
        FOR UPDATE
        "#,
    )
    .bind(org_id)
    .fetch_all(&mut **tx)
    .await?;
    Ok(owners)
}

async fn current_role(
    tx: &mut Transaction<'_, Postgres>,
    org_id: Uuid,
    user_id: Uuid,
) -> ApiResult<Role> {
    let role: Option<String> = sqlx::query_scalar(
        "SELECT role FROM organisation_members WHERE organisation_id = $1 AND user_id = $2 FOR UPDATE",
    )
    .bind(org_id)
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await?;

    role.as_deref()
        .and_then(Role::parse)
        .ok_or_else(|| ApiError::not_found("Member not found"))
}

/// GET /api/organisations/:org_id/members
pub async fn list_members(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<Uuid>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Read).await?;

    let rows = sqlx::query_as::<_, MemberRow>(
        r#"
        SELECT organisation_id, user_id, role, created_at
        FROM organisation_members
        WHERE organisation_id = $1
        ORDER BY created_at
        "#,
    )
    .bind(org_id)
    .fetch_all(&state.db)
    .await?;

    let data = rows
        .into_iter()
        .map(MemberResponse::try_from)
        .collect::<ApiResult<Vec<_>>>()?;

    Ok(Json(DataResponse::new(data)))
}

/// POST /api/organisations/:org_id/members
pub async fn add_member(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<Uuid>,
    user: ActingUser,
    Json(req): Json<AddMemberRequest>,
) -> ApiResult<impl IntoResponse> {
    let membership = require_permission(&state.db, org_id, user, Permission::ManageTeam).await?;
    check_owner_change(&membership, &[req.role])?;

    let row = sqlx::query_as::<_, MemberRow>(
        r#"
        INSERT INTO organisation_members (organisation_id, user_id, role)
        VALUES ($1, $2, $3)
        RETURNING organisation_id, user_id, role, created_at
        "#,
    )
    .bind(org_id)
    .bind(req.user_id)
    .bind(req.role.as_str())
    .fetch_one(&state.db)
    .await
    .map_err(|e| conflict_on_unique(e, "User is already a member"))?;

    activity::record(
        &state.db,
        NewActivity::new(org_id, user.user_id, "member.added", "member", Some(req.user_id))
            .with_details(serde_json::json!({ "role": req.role })),
    )
    .await;

    tracing::info!(organisation_id = %org_id, member_id = %req.user_id, role = req.role.as_str(), "Member added");

    Ok(Created(MemberResponse::try_from(row)?))
}

/// PATCH /api/organisations/:org_id/members/:user_id
pub async fn update_member(
    State(state): State<Arc<AppState>>,
    Path((org_id, member_id)): Path<(Uuid, Uuid)>,
    user: ActingUser,
    Json(req): Json<UpdateMemberRequest>,
) -> ApiResult<impl IntoResponse> {
    let membership = require_permission(&state.db, org_id, user, Permission::ManageTeam).await?;

    let mut tx = state.db.begin().await?;
    let owners = lock_owners(&mut tx, org_id).await?;
    let current = current_role(&mut tx, org_id, member_id).await?;
    check_owner_change(&membership, &[current, req.role])?;
    keep_an_owner(current, Some(req.role), &owners)?;

    let row = sqlx::query_as::<_, MemberRow>(
        r#"
        UPDATE organisation_members SET role = $3
        WHERE organisation_id = $1 AND user_id = $2
        RETURNING organisation_id, user_id, role, created_at
        "#,
    )
    .bind(org_id)
    .bind(member_id)
    .bind(req.role.as_str())
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::not_found("Member not found"))?;

    tx.commit().await?;

    activity::record(
        &state.db,
        NewActivity::new(org_id, user.user_id, "member.role_changed", "member", Some(member_id))
            .with_details(serde_json::json!({ "from": current, "to": req.role })),
    )
    .await;

    Ok(Json(DataResponse::new(MemberResponse::try_from(row)?)))
}

/// DELETE /api/organisations/:org_id/members/:user_id
///
/// Members may always remove themselves; removing others needs ManageTeam.
pub async fn remove_member(
    State(state): State<Arc<AppState>>,
    Path((org_id, member_id)): Path<(Uuid, Uuid)>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    let permission = if member_id == user.user_id {
        Permission::Read
    } else {
        Permission::ManageTeam
    };
    let membership = require_permission(&state.db, org_id, user, permission).await?;

    let mut tx = state.db.begin().await?;
    let owners = lock_owners(&mut tx, org_id).await?;
    let current = current_role(&mut tx, org_id, member_id).await?;
    if member_id != user.user_id {
        check_owner_change(&membership, &[current])?;
    }
    keep_an_owner(current, None, &owners)?;

    sqlx::query("DELETE FROM organisation_members WHERE organisation_id = $1 AND user_id = $2")
        .bind(org_id)
        .bind(member_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    activity::record(
        &state.db,
        NewActivity::new(org_id, user.user_id, "member.removed", "member", Some(member_id)),
    )
    .await;

    Ok(Json(MessageResponse::new("Member removed")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acting(role: Role) -> Membership {
        Membership {
            organisation_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            role,
        }
    }

    #[test]
    fn only_owners_touch_ownership() {
        assert!(check_owner_change(&acting(Role::Owner), &[Role::Owner]).is_ok());
        assert!(check_owner_change(&acting(Role::Admin), &[Role::Member, Role::Viewer]).is_ok());
        assert!(check_owner_change(&acting(Role::Admin), &[Role::Owner, Role::Admin]).is_err());
    }

    #[test]
    fn second_of_two_crossed_demotions_is_refused() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        // First request locks both owners and demotes one of them
        assert!(keep_an_owner(Role::Owner, Some(Role::Admin), &[a, b]).is_ok());

        // The second request only gets the lock after that commit
        let err = keep_an_owner(Role::Owner, Some(Role::Admin), &[b]).unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        assert!(matches!(
            keep_an_owner(Role::Owner, None, &[b]),
            Err(ApiError::Conflict(_))
        ));

        assert!(keep_an_owner(Role::Member, None, &[b]).is_ok());
        assert!(keep_an_owner(Role::Owner, Some(Role::Owner), &[b]).is_ok());
    }
}
