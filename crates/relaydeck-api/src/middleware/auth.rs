//! JWT Authentication Middleware
//!
//! Extracts the bearer token from the `session_token` cookie or the
//! Authorization header, validates it, and makes the caller's identity and
//! scope available to handlers via Axum's Extension.

use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use relaydeck_auth::JwtValidator;
use relaydeck_proto::CallerScope;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::models::ErrorResponse;

/// Authenticated caller extracted from the JWT
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    /// Token subject
    pub subject: String,
    /// Role and tenant every fleet query is filtered by
    pub scope: CallerScope,
}

/// JWT validation state shared across middleware instances
#[derive(Clone)]
pub struct JwtState {
    pub validator: Arc<JwtValidator>,
}

impl JwtState {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            validator: Arc::new(JwtValidator::new(secret)),
        }
    }

    /// Only accept tokens issued by `issuer`
    pub fn with_issuer(secret: &[u8], issuer: String) -> Self {
        Self {
            validator: Arc::new(JwtValidator::new(secret).with_issuer(issuer)),
        }
    }
}

fn unauthorized(error: impl Into<String>, code: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: error.into(),
            code: Some(code.to_string()),
        }),
    )
}

/// Authentication middleware
///
/// # Errors
/// Returns 401 Unauthorized if:
/// - Both cookie and Authorization header are missing
/// - The Authorization header is not a Bearer token
/// - Token is malformed, has a bad signature or is expired
pub async fn require_auth(
    state: axum::extract::State<Arc<JwtState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    // Cookie first (web dashboard), then Authorization header (API clients)
    let token = request
        .headers()
        .get(header::COOKIE)
        .and_then(|h| h.to_str().ok())
        .and_then(|cookies| {
            cookies
                .split(';')
                .map(|c| c.trim())
                .find_map(|c| c.strip_prefix("session_token="))
        })
        .map(str::to_string);

    let token = match token {
        Some(t) => t,
        None => {
            let auth_header = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|h| h.to_str().ok())
                .ok_or_else(|| {
                    unauthorized(
                        "Missing authentication token (cookie or Authorization header)",
                        "MISSING_AUTH",
                    )
                })?;

            auth_header
                .strip_prefix("Bearer ")
                .ok_or_else(|| {
                    unauthorized(
                        "Invalid Authorization header format. Expected 'Bearer <token>'",
                        "INVALID_AUTH_FORMAT",
                    )
                })?
                .to_string()
        }
    };

    let claims = state
        .validator
        .validate(&token)
        .map_err(|e| unauthorized(format!("Invalid or expired token: {}", e), "INVALID_TOKEN"))?;

    let auth_user = AuthUser {
        scope: claims.scope(),
        subject: claims.sub,
    };
    debug!(subject = %auth_user.subject, role = %auth_user.scope.role, "Authenticated request");

    request.extensions_mut().insert(auth_user);

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, middleware, routing::get, Router};
    use chrono::Duration;
    use relaydeck_auth::JwtClaims;
    use tower::ServiceExt; // For oneshot()

    async fn protected_handler(axum::Extension(user): axum::Extension<AuthUser>) -> Json<AuthUser> {
        Json(user)
    }

    fn create_test_app(jwt_secret: &[u8]) -> Router {
        let jwt_state = Arc::new(JwtState::new(jwt_secret));

        Router::new()
            .route("/protected", get(protected_handler))
            .layer(middleware::from_fn_with_state(
                jwt_state.clone(),
                require_auth,
            ))
            .with_state(jwt_state)
    }

    fn token(secret: &[u8], role: &str, tenant: Option<i32>, validity: Duration) -> String {
        let mut claims = JwtClaims::new(
            "alice".to_string(),
            "relaydeck".to_string(),
            role.to_string(),
            validity,
        );
        if let Some(tenant) = tenant {
            claims = claims.with_tenant(tenant);
        }
        JwtValidator::encode(secret, &claims).unwrap()
    }

    async fn error_of(response: Response) -> ErrorResponse {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_bearer_token_yields_scope() {
        let secret = b"test-secret-key";
        let app = create_test_app(secret);
        let token = token(secret, "engineer", Some(7), Duration::hours(1));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/protected")
                    .header("Authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let user: AuthUser = serde_json::from_slice(&body).unwrap();
        assert_eq!(user.subject, "alice");
        assert_eq!(user.scope, CallerScope::new("engineer", Some(7)));
    }

    #[tokio::test]
    async fn test_cookie_token_accepted() {
        let secret = b"test-secret-key";
        let app = create_test_app(secret);
        let token = token(secret, "admin", None, Duration::hours(1));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/protected")
                    .header("Cookie", format!("theme=dark; session_token={}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_token() {
        let app = create_test_app(b"test-secret-key");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/protected")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(error_of(response).await.code.as_deref(), Some("MISSING_AUTH"));
    }

    #[tokio::test]
    async fn test_invalid_bearer_format() {
        let app = create_test_app(b"test-secret-key");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/protected")
                    .header("Authorization", "Basic YWxpY2U6cGFzcw==")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            error_of(response).await.code.as_deref(),
            Some("INVALID_AUTH_FORMAT")
        );
    }

    #[tokio::test]
    async fn test_wrong_secret_and_expired_tokens() {
        let secret = b"test-secret-key";

        for token in [
            token(b"other-secret", "admin", None, Duration::hours(1)),
            token(secret, "admin", None, Duration::hours(-2)),
        ] {
            let response = create_test_app(secret)
                .oneshot(
                    Request::builder()
                        .uri("/protected")
                        .header("Authorization", format!("Bearer {}", token))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(error_of(response).await.code.as_deref(), Some("INVALID_TOKEN"));
        }
    }
}
