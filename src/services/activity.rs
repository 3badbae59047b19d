//! Activity log writer.

use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::activity::NewActivity;

/// Append an entry. A failed insert is logged and swallowed so the audit
/// trail never turns a successful write into an error.
pub async fn record(db: &PgPool, entry: NewActivity) {
    let result = sqlx::query(
        r#"
        INSERT INTO activity_logs (id, organisation_id, user_id, action, entity_type, entity_id, details)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(entry.organisation_id)
    .bind(entry.user_id)
    .bind(entry.action)
    .bind(entry.entity_type)
    .bind(entry.entity_id)
    .bind(&entry.details)
    .execute(db)
    .await;

    if let Err(e) = result {
        tracing::warn!(
            organisation_id = %entry.organisation_id,
            action = entry.action,
            error = %e,
            "Failed to record activity"
        );
    }
}
