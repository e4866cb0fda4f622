//! KYC submissions and reviews.
//!
//! Approving a submission raises the user's `kyc_level` to the requested
//! level in the same transaction as the status change.

use serde_json::json;
use uuid::Uuid;

use crate::{
    db::{DbPool, is_unique_violation},
    error::AppError,
    models::{
        kyc::{KycStatus, KycSubmission, ListKycQuery, ReviewKycRequest, SubmitKycRequest},
        page,
    },
    services::{audit_service, onboarding_service},
};

/// Open a submission for a higher KYC level.
///
/// A user can only have one pending submission at a time.
pub async fn submit(
    pool: &DbPool,
    user_id: Uuid,
    request: SubmitKycRequest,
) -> Result<KycSubmission, AppError> {
    let user = onboarding_service::get_user(pool, user_id).await?;
    let fingerprint = request.fingerprint(user.kyc_level)?;

    let submission = sqlx::query_as::<_, KycSubmission>(
        r#"
        INSERT INTO kyc_submissions (user_id, requested_level, document_type, document_hash, document_last4)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(user.id)
    .bind(request.requested_level)
    .bind(request.document_type.as_str())
    .bind(&fingerprint.hash)
    .bind(&fingerprint.last4)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("A KYC submission is already pending review".to_string())
        } else {
            e.into()
        }
    })?;

    tracing::info!(
        user_id = %user.id,
        submission_id = %submission.id,
        requested_level = submission.requested_level,
        "kyc submitted"
    );

    Ok(submission)
}

pub async fn list_mine(pool: &DbPool, user_id: Uuid) -> Result<Vec<KycSubmission>, AppError> {
    let submissions = sqlx::query_as::<_, KycSubmission>(
        "SELECT * FROM kyc_submissions WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(submissions)
}

pub async fn list(pool: &DbPool, query: &ListKycQuery) -> Result<Vec<KycSubmission>, AppError> {
    let (limit, offset) = page(query.limit, query.offset);

    let submissions = sqlx::query_as::<_, KycSubmission>(
        r#"
        SELECT * FROM kyc_submissions
        WHERE ($1::text IS NULL OR status = $1)
        ORDER BY created_at
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(query.status.map(|s| s.as_str()))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(submissions)
}

pub async fn approve(
    pool: &DbPool,
    reviewer: Uuid,
    submission_id: Uuid,
    request: ReviewKycRequest,
) -> Result<KycSubmission, AppError> {
    review(pool, reviewer, submission_id, KycStatus::Approved, request.note).await
}

pub async fn reject(
    pool: &DbPool,
    reviewer: Uuid,
    submission_id: Uuid,
    request: ReviewKycRequest,
) -> Result<KycSubmission, AppError> {
    review(pool, reviewer, submission_id, KycStatus::Rejected, request.note).await
}

/// Check that `reviewer` may record `decision` on `current`.
///
/// `document_owner` is another user already approved with the same document.
fn ensure_reviewable(
    current: &KycSubmission,
    reviewer: Uuid,
    decision: KycStatus,
    document_owner: Option<Uuid>,
) -> Result<(), AppError> {
    if current.status != KycStatus::Pending {
        return Err(AppError::InvalidStateTransition {
            from: current.status.to_string(),
            to: decision.to_string(),
        });
    }
    if current.user_id == reviewer {
        return Err(AppError::Forbidden);
    }
    if decision == KycStatus::Approved && document_owner.is_some() {
        return Err(AppError::Conflict(format!(
            "{} ending in {} is already verified for another user",
            current.document_type.as_str().to_uppercase(),
            current.document_last4
        )));
    }
    Ok(())
}

async fn review(
    pool: &DbPool,
    reviewer: Uuid,
    submission_id: Uuid,
    decision: KycStatus,
    note: Option<String>,
) -> Result<KycSubmission, AppError> {
    let mut tx = pool.begin().await?;

    let current = sqlx::query_as::<_, KycSubmission>(
        "SELECT * FROM kyc_submissions WHERE id = $1 FOR UPDATE",
    )
    .bind(submission_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::KycSubmissionNotFound)?;

    let document_owner = if decision == KycStatus::Approved {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT user_id FROM kyc_submissions
            WHERE document_hash = $1 AND status = 'approved' AND user_id <> $2
            LIMIT 1
            "#,
        )
        .bind(&current.document_hash)
        .bind(current.user_id)
        .fetch_optional(&mut *tx)
        .await?
    } else {
        None
    };

    ensure_reviewable(&current, reviewer, decision, document_owner)?;

    let submission = sqlx::query_as::<_, KycSubmission>(
        r#"
        UPDATE kyc_submissions
        SET status = $1, review_note = $2, reviewed_by = $3, reviewed_at = NOW()
        WHERE id = $4
        RETURNING *
        "#,
    )
    .bind(decision.as_str())
    .bind(note.as_deref().map(str::trim).filter(|n| !n.is_empty()))
    .bind(reviewer)
    .bind(submission_id)
    .fetch_one(&mut *tx)
    .await?;

    if decision == KycStatus::Approved {
        // Never lowers a level raised by an earlier approval
        sqlx::query(
            "UPDATE users SET kyc_level = GREATEST(kyc_level, $1), updated_at = NOW() WHERE id = $2",
        )
        .bind(submission.requested_level)
        .bind(submission.user_id)
        .execute(&mut *tx)
        .await?;
    }

    audit_service::record(
        &mut *tx,
        Some(reviewer),
        if decision == KycStatus::Approved {
            "kyc.approve"
        } else {
            "kyc.reject"
        },
        "kyc_submission",
        submission.id,
        json!({
            "user_id": submission.user_id,
            "requested_level": submission.requested_level,
            "note": submission.review_note,
        }),
    )
    .await?;

    tx.commit().await?;
    tracing::info!(
        submission_id = %submission.id,
        user_id = %submission.user_id,
        decision = %decision,
        "kyc reviewed"
    );

    Ok(submission)
}
