//! Signup and profile endpoints.
//!
//! - POST /api/v1/signup - Public self-signup under a tenant
//! - GET /api/v1/me - The authenticated user

use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    error::AppError,
    middleware::auth::AuthContext,
    models::user::{SignupRequest, User},
    services::onboarding_service,
    state::AppState,
};

/// Create a user, their wallet and their first API key.
///
/// # Request Body
///
/// ```json
/// {
///   "tenant_id": "3f1c6a2e-5b7d-4c8e-9f00-1a2b3c4d5e6f",
///   "email": "ada@example.com",
///   "full_name": "Ada Obi"
/// }
/// ```
///
/// # Response
///
/// - **201 Created**: `{ "user": {...}, "wallet": {...}, "api_key": "sk_..." }`
/// - **404**: Unknown tenant
/// - **403**: Tenant suspended
/// - **409**: Email already registered
///
/// The `api_key` is shown only in this response.
pub async fn signup(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response =
        onboarding_service::signup(&state.pool, &state.config.default_currency, request).await?;

    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<User>, AppError> {
    let user = onboarding_service::get_user(&state.pool, auth.user_id).await?;

    Ok(Json(user))
}
