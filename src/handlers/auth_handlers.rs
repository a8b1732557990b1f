use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::error;
use validator::Validate;

use crate::handlers::response::{ApiResponse, ErrorResponse, bad_request, validation_message};
use crate::models::auth::{AuthToken, LoginRequest, VerifyEmailRequest};
use crate::models::user::{CreateUserRequest, User};
use crate::services::auth_service::{AuthError, AuthService};

/// Convert AuthError to HTTP response
impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::DuplicateEmail => (StatusCode::CONFLICT, "Email already exists"),
            AuthError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "Invalid email or password")
            }
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid authentication token"),
            AuthError::TokenExpired => {
                (StatusCode::UNAUTHORIZED, "Authentication token has expired")
            }
            AuthError::InvalidVerificationToken => (
                StatusCode::BAD_REQUEST,
                "Invalid or already used verification token",
            ),
            AuthError::UserNotFound => (StatusCode::NOT_FOUND, "User not found"),
            AuthError::DatabaseError(ref msg) => {
                error!(error = %msg, "Authentication storage failure");
                return ErrorResponse::internal("Error processing authentication request", msg)
                    .into_response_with(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };

        ErrorResponse::new(message).into_response_with(status)
    }
}

/// Handler for user registration
///
/// Creates a new, unverified user account. The account must be verified
/// through `/api/auth/verify` before category routes accept its token.
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User successfully registered", body = User),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 409, description = "Email already exists", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn register_handler(
    State(auth_service): State<Arc<dyn AuthService>>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<User>>), Response> {
    let Json(request) = payload.map_err(|rejection| bad_request(rejection.body_text()))?;
    request
        .validate()
        .map_err(|errors| bad_request(validation_message(&errors)))?;

    let user = auth_service
        .register(request)
        .await
        .map_err(IntoResponse::into_response)?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::data(user).with_message("User registered. Please verify your email")),
    ))
}

/// Handler for user login
///
/// Authenticates a user and returns a JWT token.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthToken),
        (status = 400, description = "Malformed body", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login_handler(
    State(auth_service): State<Arc<dyn AuthService>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<AuthToken>>, Response> {
    let Json(request) = payload.map_err(|rejection| bad_request(rejection.body_text()))?;

    let token = auth_service
        .login(request)
        .await
        .map_err(IntoResponse::into_response)?;

    Ok(Json(ApiResponse::data(token)))
}

/// Handler for email verification
#[utoipa::path(
    post,
    path = "/api/auth/verify",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified", body = User),
        (status = 400, description = "Unknown or already used token", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn verify_email_handler(
    State(auth_service): State<Arc<dyn AuthService>>,
    payload: Result<Json<VerifyEmailRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<User>>, Response> {
    let Json(request) = payload.map_err(|rejection| bad_request(rejection.body_text()))?;

    let user = auth_service
        .verify_email(&request.token)
        .await
        .map_err(IntoResponse::into_response)?;

    Ok(Json(
        ApiResponse::data(user).with_message("Email verified successfully"),
    ))
}
