use sqlx::PgPool;
use uuid::Uuid;

use super::ActingUser;
use crate::domain::team::{Permission, Role};
use crate::error::{ApiError, ApiResult};

/// Caller's standing in an organisation, once checked
#[derive(Debug, Clone, Copy)]
pub struct Membership {
    pub organisation_id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
}

/// Check that `user` belongs to a live organisation and holds `permission`.
///
/// Non-members get 404 so that organisation ids are not confirmed to
/// outsiders; members lacking the permission get 403.
pub async fn require_permission(
    db: &PgPool,
    organisation_id: Uuid,
    user: ActingUser,
    permission: Permission,
) -> ApiResult<Membership> {
    let role: Option<String> = sqlx::query_scalar(
        r#"
        SELECT m.role
        FROM organisation_members m
        JOIN organisations o ON o.id = m.organisation_id
        WHERE m.organisation_id = $1 AND m.user_id = $2 AND o.archived_at IS NULL
        "#,
    )
    .bind(organisation_id)
    .bind(user.user_id)
    .fetch_optional(db)
    .await?;

    let role = role
        .as_deref()
        .and_then(Role::parse)
        .ok_or_else(|| ApiError::not_found("Organisation not found"))?;

    if !role.allows(permission) {
        tracing::debug!(
            organisation_id = %organisation_id,
            user_id = %user.user_id,
            role = role.as_str(),
            ?permission,
            "Permission denied"
        );
        return Err(ApiError::forbidden(format!(
            "Role '{}' is not allowed to do this",
            role.as_str()
        )));
    }

    Ok(Membership {
        organisation_id,
        user_id: user.user_id,
        role,
    })
}
