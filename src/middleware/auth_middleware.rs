use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use crate::handlers::response::ErrorResponse;
use crate::services::auth_service::{AuthError, AuthService};

/// Extension type to store authenticated user ID in request
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
}

/// Auth middleware that validates JWT tokens and adds user_id to request extensions
pub async fn auth_middleware(
    State(auth_service): State<Arc<dyn AuthService>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthMiddlewareError> {
    let auth_header = headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(AuthMiddlewareError::MissingToken)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AuthMiddlewareError::InvalidTokenFormat)?;

    let user_id = auth_service
        .validate_token(token)
        .await
        .map_err(|e| match e {
            AuthError::TokenExpired => AuthMiddlewareError::TokenExpired,
            _ => AuthMiddlewareError::InvalidToken,
        })?;

    request
        .extensions_mut()
        .insert(AuthenticatedUser { user_id });

    Ok(next.run(request).await)
}

/// Gate that only lets active, email-verified users through.
/// Must run after [`auth_middleware`].
pub async fn require_verified(
    State(auth_service): State<Arc<dyn AuthService>>,
    request: Request,
    next: Next,
) -> Result<Response, AuthMiddlewareError> {
    let user_id = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|user| user.user_id)
        .ok_or(AuthMiddlewareError::MissingToken)?;

    let user = auth_service.get_user(user_id).await.map_err(|e| match e {
        AuthError::UserNotFound => AuthMiddlewareError::UserNotFound,
        e => {
            error!(error = %e, "Failed to load user for verification check");
            AuthMiddlewareError::Internal(e.to_string())
        }
    })?;

    if !user.is_active {
        warn!(%user_id, "Rejected request from deactivated account");
        return Err(AuthMiddlewareError::AccountDeactivated);
    }
    if !user.is_verified {
        return Err(AuthMiddlewareError::NotVerified);
    }

    Ok(next.run(request).await)
}

/// Auth middleware errors
#[derive(Debug)]
pub enum AuthMiddlewareError {
    MissingToken,
    InvalidTokenFormat,
    InvalidToken,
    TokenExpired,
    UserNotFound,
    AccountDeactivated,
    NotVerified,
    Internal(String),
}

impl IntoResponse for AuthMiddlewareError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AuthMiddlewareError::MissingToken => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse::new("Missing authorization token"),
            ),
            AuthMiddlewareError::InvalidTokenFormat => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse::new("Invalid authorization header format. Expected: Bearer <token>"),
            ),
            AuthMiddlewareError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse::new("Invalid or malformed token"),
            ),
            AuthMiddlewareError::TokenExpired => {
                (StatusCode::UNAUTHORIZED, ErrorResponse::new("Token has expired"))
            }
            AuthMiddlewareError::UserNotFound => {
                (StatusCode::UNAUTHORIZED, ErrorResponse::new("User not found"))
            }
            AuthMiddlewareError::AccountDeactivated => {
                (StatusCode::FORBIDDEN, ErrorResponse::new("Account is deactivated"))
            }
            AuthMiddlewareError::NotVerified => (
                StatusCode::FORBIDDEN,
                ErrorResponse {
                    requires_verification: Some(true),
                    ..ErrorResponse::new("Please verify your email to access this resource")
                },
            ),
            AuthMiddlewareError::Internal(cause) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::internal("Error checking account status", cause),
            ),
        };

        body.into_response_with(status)
    }
}
