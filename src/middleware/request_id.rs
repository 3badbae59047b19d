//! Request ID middleware for request tracing

use axum::{
    extract::Request,
    http::{header, HeaderName},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

use crate::error::ErrorResponse;

/// Header name for request ID
pub const X_REQUEST_ID: &str = "x-request-id";

/// Creates a layered middleware that:
/// 1. Sets a request ID if not present (using UUID v4)
/// 2. Propagates the request ID to the response
pub fn request_id_layer() -> (SetRequestIdLayer<MakeRequestUuid>, PropagateRequestIdLayer) {
    let header_name = HeaderName::from_static(X_REQUEST_ID);

    (
        SetRequestIdLayer::new(header_name.clone(), MakeRequestUuid),
        PropagateRequestIdLayer::new(header_name),
    )
}

/// Copy the request id into `ApiError` bodies. Must run inside the layer
/// that sets the id.
pub async fn stamp_error_bodies(request: Request, next: Next) -> Response {
    let request_id = request.headers().request_id().map(str::to_string);
    let mut response = next.run(request).await;

    let Some(request_id) = request_id else {
        return response;
    };
    let Some(mut error) = response.extensions_mut().remove::<ErrorResponse>() else {
        return response;
    };
    error.request_id = Some(request_id);

    let (mut parts, _) = response.into_parts();
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Json(error).into_response().into_body())
}

/// Extension trait for extracting request ID from headers
pub trait RequestIdExt {
    fn request_id(&self) -> Option<&str>;
}

impl RequestIdExt for axum::http::HeaderMap {
    fn request_id(&self) -> Option<&str> {
        self.get(X_REQUEST_ID)?.to_str().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{ActingUser, X_USER_ID};
    use crate::error::{ApiError, ApiResult};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        middleware::from_fn,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    fn router() -> Router {
        let (set_request_id, propagate_request_id) = request_id_layer();
        Router::new()
            .route("/whoami", get(|user: ActingUser| async move { user.user_id.to_string() }))
            .layer(propagate_request_id)
            .layer(set_request_id)
    }

    #[tokio::test]
    async fn generates_and_echoes_request_ids() {
        let response = router()
            .oneshot(Request::get("/whoami").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().request_id().is_some());

        let response = router()
            .oneshot(
                Request::get("/whoami")
                    .header(X_REQUEST_ID, "req-42")
                    .header(X_USER_ID, uuid::Uuid::new_v4().to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().request_id(), Some("req-42"));
    }

    #[tokio::test]
    async fn error_bodies_carry_the_request_id() {
        let (set_request_id, propagate_request_id) = request_id_layer();
        let app = Router::new()
            .route(
                "/missing",
                get(|| async { ApiResult::<()>::Err(ApiError::not_found("Devis not found")) }),
            )
            .route("/ok", get(|| async { "fine" }))
            .layer(from_fn(stamp_error_bodies))
            .layer(propagate_request_id)
            .layer(set_request_id);

        let response = app
            .clone()
            .oneshot(
                Request::get("/missing")
                    .header(X_REQUEST_ID, "req-7")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers().request_id(), Some("req-7"));

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "NOT_FOUND");
        assert_eq!(body["message"], "Devis not found");
        assert_eq!(body["request_id"], "req-7");

        let response = app
            .oneshot(Request::get("/ok").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"fine");
    }
}
