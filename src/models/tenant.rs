//! Tenant model.
//!
//! A tenant is the organisation users sign up under. Suspending a tenant
//! blocks every user that belongs to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

text_enum! {
    pub enum TenantStatus {
        Active => "active",
        Suspended => "suspended",
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub status: TenantStatus,
    pub created_at: DateTime<Utc>,
}

/// Request body for `POST /admin/tenants`.
#[derive(Debug, Deserialize)]
pub struct CreateTenantRequest {
    pub name: String,
}

/// Request body for `PATCH /admin/tenants/{id}/status`.
#[derive(Debug, Deserialize)]
pub struct UpdateTenantStatusRequest {
    pub status: TenantStatus,
}
