//! API key authentication middleware.
//!
//! This middleware intercepts every protected request to:
//! 1. Extract the API key from the Authorization header
//! 2. Hash it and look up the key, its user and the user's tenant
//! 3. Reject unknown keys (401) and inactive users or tenants (403)
//! 4. Inject an [`AuthContext`] into the request
//!
//! [`require_admin`] is layered on top for `/admin` routes.

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        api_key::hash_api_key,
        tenant::TenantStatus,
        user::{Role, UserStatus},
    },
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

/// Authentication context attached to authenticated requests.
///
/// Handlers extract it with `Extension<AuthContext>`.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub api_key_id: Uuid,

    /// Used to scope every query to the caller's own records
    pub user_id: Uuid,

    pub tenant_id: Uuid,

    pub role: Role,
}

impl AuthContext {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, sqlx::FromRow)]
struct KeyOwner {
    api_key_id: Uuid,
    user_id: Uuid,
    tenant_id: Uuid,
    #[sqlx(try_from = "String")]
    role: Role,
    #[sqlx(try_from = "String")]
    user_status: UserStatus,
    #[sqlx(try_from = "String")]
    tenant_status: TenantStatus,
}

/// Pull the raw key out of `Authorization: Bearer <key>`.
fn bearer_token(request: &Request) -> Result<&str, AppError> {
    request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or(AppError::InvalidApiKey)
}

/// API key authentication middleware function.
///
/// # Flow
///
/// 1. Extract `Authorization: Bearer <key>` header from request
/// 2. Hash the `<key>` using SHA-256
/// 3. Query for an active key joined with its user and tenant
/// 4. If the user or tenant is not active: 403
/// 5. Otherwise inject `AuthContext` and call the next handler
pub async fn auth_middleware(
    State(pool): State<DbPool>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key_hash = hash_api_key(bearer_token(&request)?);

    let owner = sqlx::query_as::<_, KeyOwner>(
        r#"
        SELECT k.id AS api_key_id, u.id AS user_id, u.tenant_id, u.role,
               u.status AS user_status, t.status AS tenant_status
        FROM api_keys k
        JOIN users u ON u.id = k.user_id
        JOIN tenants t ON t.id = u.tenant_id
        WHERE k.key_hash = $1 AND k.is_active = true
        "#,
    )
    .bind(&key_hash)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::InvalidApiKey)?;

    if owner.user_status != UserStatus::Active || owner.tenant_status != TenantStatus::Active {
        tracing::warn!(user_id = %owner.user_id, "rejected request from inactive account");
        return Err(AppError::AccountInactive);
    }

    request.extensions_mut().insert(AuthContext {
        api_key_id: owner.api_key_id,
        user_id: owner.user_id,
        tenant_id: owner.tenant_id,
        role: owner.role,
    });

    Ok(next.run(request).await)
}

/// Allow the request through only for admins.
///
/// Must run after [`auth_middleware`].
pub async fn require_admin(request: Request, next: Next) -> Result<Response, AppError> {
    let auth = request
        .extensions()
        .get::<AuthContext>()
        .ok_or(AppError::InvalidApiKey)?;

    if !auth.is_admin() {
        tracing::warn!(
            user_id = %auth.user_id,
            tenant_id = %auth.tenant_id,
            api_key_id = %auth.api_key_id,
            path = %request.uri().path(),
            "non-admin hit admin route"
        );
        return Err(AppError::Forbidden);
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with(header: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/api/v1/wallet");
        if let Some(value) = header {
            builder = builder.header("Authorization", value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn bearer_token_is_extracted() {
        let req = request_with(Some("Bearer sk_abc"));
        assert_eq!(bearer_token(&req).unwrap(), "sk_abc");
    }

    #[test]
    fn missing_or_malformed_headers_are_rejected() {
        for header in [None, Some("sk_abc"), Some("Basic abc"), Some("Bearer   ")] {
            let req = request_with(header);
            assert!(matches!(bearer_token(&req), Err(AppError::InvalidApiKey)));
        }
    }
}
