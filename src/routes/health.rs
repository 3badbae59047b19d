use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::app::AppState;
use crate::db;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub services: ServiceHealth,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ServiceHealth {
    pub database: &'static str,
    pub redis: &'static str,
    pub ai: &'static str,
}

fn label(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "error"
    }
}

/// The database is the only hard dependency; losing Redis or the AI API
/// degrades the service.
fn summarize(database: bool, redis: bool, ai: bool) -> (StatusCode, HealthResponse) {
    let status = match (database, redis && ai) {
        (true, true) => "healthy",
        (true, false) => "degraded",
        (false, _) => "unhealthy",
    };
    let code = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            services: ServiceHealth {
                database: label(database),
                redis: label(redis),
                ai: label(ai),
            },
        },
    )
}

/// GET /api/health
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let (database, redis, ai) = tokio::join!(
        db::health_check(&state.db),
        state.cache.health_check(),
        state.ai_client.health_check(),
    );

    if let Err(e) = &ai {
        tracing::debug!(error = %e, "AI API probe failed");
    }

    let (code, body) = summarize(database, redis.is_ok(), ai.is_ok());
    (code, Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_decides_availability() {
        let (code, body) = summarize(true, true, true);
        assert_eq!((code, body.status), (StatusCode::OK, "healthy"));

        let (code, body) = summarize(true, false, true);
        assert_eq!((code, body.status), (StatusCode::OK, "degraded"));
        assert_eq!(body.services.redis, "error");

        let (code, body) = summarize(false, true, true);
        assert_eq!((code, body.status), (StatusCode::SERVICE_UNAVAILABLE, "unhealthy"));
    }
}
