//! KYC submission models.
//!
//! Users submit an identity document to move up a KYC tier; an admin approves
//! or rejects it. Document numbers are never stored in the clear.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{error::AppError, models::user::MAX_KYC_LEVEL};

text_enum! {
    pub enum KycStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
    }
}

text_enum! {
    pub enum DocumentType {
        Bvn => "bvn",
        Nin => "nin",
        Passport => "passport",
        DriversLicense => "drivers_license",
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct KycSubmission {
    pub id: Uuid,
    pub user_id: Uuid,
    pub requested_level: i16,
    #[sqlx(try_from = "String")]
    pub document_type: DocumentType,
    /// SHA-256 of the normalized document number
    #[serde(skip_serializing)]
    pub document_hash: String,
    pub document_last4: String,
    #[sqlx(try_from = "String")]
    pub status: KycStatus,
    pub review_note: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// Request body for `POST /api/v1/kyc`.
#[derive(Debug, Deserialize)]
pub struct SubmitKycRequest {
    pub requested_level: i16,
    pub document_type: DocumentType,
    pub document_number: String,
}

/// Document details safe to persist.
#[derive(Debug, PartialEq, Eq)]
pub struct DocumentFingerprint {
    pub hash: String,
    pub last4: String,
}

impl SubmitKycRequest {
    /// Check the requested level against the user's current one and
    /// fingerprint the document number.
    pub fn fingerprint(&self, current_level: i16) -> Result<DocumentFingerprint, AppError> {
        if self.requested_level <= current_level || self.requested_level > MAX_KYC_LEVEL {
            return Err(AppError::InvalidRequest(format!(
                "Requested level must be above {} and at most {}",
                current_level, MAX_KYC_LEVEL
            )));
        }

        let normalized: String = self
            .document_number
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .map(|c| c.to_ascii_uppercase())
            .collect();

        if normalized.len() < 6 || normalized.len() > 32 || !normalized.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(AppError::InvalidRequest("Invalid document number".to_string()));
        }
        if matches!(self.document_type, DocumentType::Bvn | DocumentType::Nin)
            && (normalized.len() != 11 || !normalized.chars().all(|c| c.is_ascii_digit()))
        {
            return Err(AppError::InvalidRequest(format!(
                "{} must be 11 digits",
                self.document_type.as_str().to_uppercase()
            )));
        }

        let mut hasher = Sha256::new();
        hasher.update(self.document_type.as_str().as_bytes());
        hasher.update(b":");
        hasher.update(normalized.as_bytes());

        Ok(DocumentFingerprint {
            hash: hex::encode(hasher.finalize()),
            last4: normalized[normalized.len() - 4..].to_string(),
        })
    }
}

/// Request body for KYC approval/rejection.
#[derive(Debug, Deserialize, Default)]
pub struct ReviewKycRequest {
    pub note: Option<String>,
}

/// Query string for `GET /admin/kyc`.
#[derive(Debug, Deserialize)]
pub struct ListKycQuery {
    pub status: Option<KycStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
