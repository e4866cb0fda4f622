//! Virtual account endpoints.

use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    error::AppError,
    middleware::auth::AuthContext,
    models::virtual_account::VirtualAccount,
    services::virtual_account_service::{self, VirtualAccountIssue},
    state::AppState,
};

/// `POST /api/v1/virtual-accounts`
///
/// Issues a virtual account through the banking partner (201), or returns
/// the caller's existing active account (200). Requires the configured
/// minimum KYC level (422 otherwise).
pub async fn issue(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<impl IntoResponse, AppError> {
    let issue = virtual_account_service::issue(
        &state.pool,
        state.partner.as_ref(),
        state.config.min_virtual_account_kyc_level,
        auth.user_id,
    )
    .await?;

    Ok((issue_status(&issue), Json(issue.account)))
}

fn issue_status(issue: &VirtualAccountIssue) -> StatusCode {
    if issue.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    }
}

/// `GET /api/v1/virtual-accounts`
pub async fn list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<VirtualAccount>>, AppError> {
    let accounts = virtual_account_service::list_for_user(&state.pool, auth.user_id).await?;

    Ok(Json(accounts))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    fn account() -> VirtualAccount {
        VirtualAccount {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            wallet_id: Uuid::new_v4(),
            account_number: "9912345678".to_string(),
            account_name: "Ada Obi".to_string(),
            bank_name: "Partner MFB".to_string(),
            provider_reference: "VA_1".to_string(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn new_account_answers_created() {
        let issue = VirtualAccountIssue {
            account: account(),
            created: true,
        };
        assert_eq!(issue_status(&issue), StatusCode::CREATED);
    }

    #[test]
    fn existing_account_answers_ok() {
        let issue = VirtualAccountIssue {
            account: account(),
            created: false,
        };
        assert_eq!(issue_status(&issue), StatusCode::OK);
    }
}
