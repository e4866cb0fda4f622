//! Tenant and user onboarding.
//!
//! Signing up creates the user, their wallet and their first API key in one
//! database transaction, so a user never exists without a wallet.

use serde_json::json;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    db::{DbPool, is_unique_violation},
    error::AppError,
    models::{
        api_key::{generate_api_key, hash_api_key},
        page,
        tenant::{CreateTenantRequest, Tenant, TenantStatus},
        user::{ListUsersQuery, Role, SignupRequest, SignupResponse, User, UserStatus},
    },
    services::{audit_service, wallet_service},
};

/// Name of the tenant that platform administrators belong to.
pub const PLATFORM_TENANT: &str = "platform";

pub async fn create_tenant(
    pool: &DbPool,
    actor: Uuid,
    request: CreateTenantRequest,
) -> Result<Tenant, AppError> {
    let name = request.name.trim();
    if name.is_empty() || name.len() > 120 {
        return Err(AppError::InvalidRequest(
            "Tenant name must be between 1 and 120 characters".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let tenant = sqlx::query_as::<_, Tenant>("INSERT INTO tenants (name) VALUES ($1) RETURNING *")
        .bind(name)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("Tenant {} already exists", name))
            } else {
                e.into()
            }
        })?;

    audit_service::record(
        &mut *tx,
        Some(actor),
        "tenant.create",
        "tenant",
        tenant.id,
        json!({ "name": tenant.name }),
    )
    .await?;

    tx.commit().await?;
    tracing::info!(tenant_id = %tenant.id, "tenant created");

    Ok(tenant)
}

pub async fn list_tenants(pool: &DbPool) -> Result<Vec<Tenant>, AppError> {
    let tenants = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants ORDER BY created_at DESC")
        .fetch_all(pool)
        .await?;

    Ok(tenants)
}

pub async fn set_tenant_status(
    pool: &DbPool,
    actor: Uuid,
    tenant_id: Uuid,
    status: TenantStatus,
) -> Result<Tenant, AppError> {
    let mut tx = pool.begin().await?;

    let tenant = sqlx::query_as::<_, Tenant>(
        "UPDATE tenants SET status = $1 WHERE id = $2 RETURNING *",
    )
    .bind(status.as_str())
    .bind(tenant_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::TenantNotFound)?;

    if tenant.name == PLATFORM_TENANT && status != TenantStatus::Active {
        return Err(AppError::InvalidRequest(
            "The platform tenant cannot be suspended".to_string(),
        ));
    }

    audit_service::record(
        &mut *tx,
        Some(actor),
        "tenant.set_status",
        "tenant",
        tenant.id,
        json!({ "status": status }),
    )
    .await?;

    tx.commit().await?;

    Ok(tenant)
}

/// Public self-signup under an existing, active tenant.
///
/// # Process
///
/// 1. Validate and normalize the request
/// 2. Check the tenant exists and is active
/// 3. Insert user, wallet and API key in one transaction
/// 4. Return the raw API key (the only time it is visible)
pub async fn signup(
    pool: &DbPool,
    currency: &str,
    request: SignupRequest,
) -> Result<SignupResponse, AppError> {
    let request = request.normalized()?;

    let mut tx = pool.begin().await?;

    let tenant_status: String = sqlx::query_scalar("SELECT status FROM tenants WHERE id = $1")
        .bind(request.tenant_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::TenantNotFound)?;

    if tenant_status != TenantStatus::Active.as_str() {
        return Err(AppError::AccountInactive);
    }

    let user = insert_user(
        &mut tx,
        request.tenant_id,
        &request.email,
        &request.full_name,
        Role::User,
    )
    .await?;
    let wallet = wallet_service::create_wallet(&mut tx, user.id, currency).await?;
    let api_key = generate_api_key();
    insert_api_key(&mut tx, user.id, &api_key).await?;

    tx.commit().await?;
    tracing::info!(user_id = %user.id, tenant_id = %user.tenant_id, "user signed up");

    Ok(SignupResponse {
        user,
        wallet: wallet.into(),
        api_key,
    })
}

pub async fn get_user(pool: &DbPool, user_id: Uuid) -> Result<User, AppError> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::UserNotFound)
}

pub async fn list_users(pool: &DbPool, query: &ListUsersQuery) -> Result<Vec<User>, AppError> {
    let (limit, offset) = page(query.limit, query.offset);

    let users = sqlx::query_as::<_, User>(
        r#"
        SELECT * FROM users
        WHERE ($1::uuid IS NULL OR tenant_id = $1)
          AND ($2::text IS NULL OR status = $2)
        ORDER BY created_at DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(query.tenant_id)
    .bind(query.status.map(|s| s.as_str()))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(users)
}

pub async fn set_user_status(
    pool: &DbPool,
    actor: Uuid,
    user_id: Uuid,
    status: UserStatus,
) -> Result<User, AppError> {
    if actor == user_id {
        return Err(AppError::InvalidRequest(
            "Admins cannot change their own status".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET status = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
    )
    .bind(status.as_str())
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::UserNotFound)?;

    audit_service::record(
        &mut *tx,
        Some(actor),
        "user.set_status",
        "user",
        user.id,
        json!({ "status": status }),
    )
    .await?;

    tx.commit().await?;
    tracing::info!(user_id = %user.id, status = %status, "user status changed");

    Ok(user)
}

/// Deactivate every key the user holds and issue a fresh one.
pub async fn rotate_api_key(pool: &DbPool, actor: Uuid, user_id: Uuid) -> Result<String, AppError> {
    let mut tx = pool.begin().await?;

    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
    if !exists {
        return Err(AppError::UserNotFound);
    }

    let revoked = sqlx::query("UPDATE api_keys SET is_active = false WHERE user_id = $1 AND is_active")
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let api_key = generate_api_key();
    insert_api_key(&mut tx, user_id, &api_key).await?;

    audit_service::record(
        &mut *tx,
        Some(actor),
        "user.rotate_api_key",
        "user",
        user_id,
        json!({ "revoked_keys": revoked }),
    )
    .await?;

    tx.commit().await?;

    Ok(api_key)
}

/// Create the first platform admin, authenticated by `raw_key`.
///
/// Does nothing when an admin already exists. Returns whether an admin was
/// created.
pub async fn bootstrap_admin(pool: &DbPool, raw_key: &str, currency: &str) -> Result<bool, AppError> {
    let mut tx = pool.begin().await?;

    let admin_exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE role = 'admin')")
            .fetch_one(&mut *tx)
            .await?;
    if admin_exists {
        return Ok(false);
    }

    let tenant_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO tenants (name) VALUES ($1)
        ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
        RETURNING id
        "#,
    )
    .bind(PLATFORM_TENANT)
    .fetch_one(&mut *tx)
    .await?;

    let admin = insert_user(
        &mut tx,
        tenant_id,
        "admin@platform.local",
        "Platform Admin",
        Role::Admin,
    )
    .await?;
    wallet_service::create_wallet(&mut tx, admin.id, currency).await?;
    insert_api_key(&mut tx, admin.id, raw_key).await?;

    audit_service::record(
        &mut *tx,
        None,
        "user.bootstrap_admin",
        "user",
        admin.id,
        json!({}),
    )
    .await?;

    tx.commit().await?;
    tracing::info!(user_id = %admin.id, "bootstrap admin created");

    Ok(true)
}

async fn insert_user(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    email: &str,
    full_name: &str,
    role: Role,
) -> Result<User, AppError> {
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (tenant_id, email, full_name, role)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(tenant_id)
    .bind(email)
    .bind(full_name)
    .bind(role.as_str())
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("Email is already registered".to_string())
        } else {
            e.into()
        }
    })
}

async fn insert_api_key(conn: &mut PgConnection, user_id: Uuid, raw_key: &str) -> Result<(), AppError> {
    sqlx::query("INSERT INTO api_keys (user_id, key_hash) VALUES ($1, $2)")
        .bind(user_id)
        .bind(hash_api_key(raw_key))
        .execute(&mut *conn)
        .await?;

    Ok(())
}
