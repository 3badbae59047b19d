use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::ApiError;

/// Header carrying the caller's user id
pub const X_USER_ID: &str = "x-user-id";

/// Caller identity, extracted from the `X-User-Id` header.
///
/// ```ignore
/// async fn handler(user: ActingUser) -> impl IntoResponse {
///     format!("Hello, user {}", user.user_id)
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActingUser {
    pub user_id: Uuid,
}

#[async_trait]
impl<S> FromRequestParts<S> for ActingUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(X_USER_ID)
            .ok_or_else(|| ApiError::Unauthorized("Missing X-User-Id header".to_string()))?
            .to_str()
            .map_err(|_| ApiError::Unauthorized("Invalid X-User-Id header".to_string()))?;

        let user_id = Uuid::parse_str(raw.trim())
            .map_err(|_| ApiError::Unauthorized("Invalid X-User-Id header".to_string()))?;

        Ok(Self { user_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};

    async fn extract(header: Option<&str>) -> Result<ActingUser, ApiError> {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header(X_USER_ID, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        ActingUser::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn reads_the_user_id() {
        let id = Uuid::new_v4();
        let user = extract(Some(&format!(" {} ", id))).await.unwrap();
        assert_eq!(user.user_id, id);
    }

    #[tokio::test]
    async fn missing_or_malformed_header_is_unauthorized() {
        for header in [None, Some("nope"), Some("")] {
            let err = extract(header).await.unwrap_err();
            assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        }
    }
}
