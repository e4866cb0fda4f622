//! KYC endpoints for end users.

use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::kyc::{KycSubmission, SubmitKycRequest},
    services::kyc_service,
};

/// Submit a document for a higher KYC level.
///
/// # Request Body
///
/// ```json
/// {
///   "requested_level": 1,
///   "document_type": "bvn",
///   "document_number": "22212345678"
/// }
/// ```
///
/// Returns 201 with the submission; the document number itself is never
/// echoed back, only its last four characters. 409 if a submission is already
/// pending.
pub async fn submit(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<SubmitKycRequest>,
) -> Result<impl IntoResponse, AppError> {
    let submission = kyc_service::submit(&pool, auth.user_id, request).await?;

    Ok((StatusCode::CREATED, Json(submission)))
}

pub async fn list(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<KycSubmission>>, AppError> {
    let submissions = kyc_service::list_mine(&pool, auth.user_id).await?;

    Ok(Json(submissions))
}
