//! HTTP routing.
//!
//! Three groups of routes:
//!
//! - public: health, signup and the processor webhook (signature checked in the handler)
//! - `/api/v1/*`: any valid API key
//! - `/admin/*`: a valid API key belonging to an admin

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post, put},
};
use tower_http::trace::TraceLayer;

use crate::{
    handlers::{admin, health, kyc, onboarding, payouts, virtual_accounts, wallet, webhooks},
    middleware::auth::{auth_middleware, require_admin},
    state::AppState,
};

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/tenants", post(admin::create_tenant).get(admin::list_tenants))
        .route("/admin/tenants/{id}/status", patch(admin::set_tenant_status))
        .route("/admin/users", get(admin::list_users))
        .route("/admin/users/{id}", get(admin::get_user))
        .route("/admin/users/{id}/status", patch(admin::set_user_status))
        .route("/admin/users/{id}/api-keys", post(admin::rotate_api_key))
        .route("/admin/kyc", get(admin::list_kyc))
        .route("/admin/kyc/{id}/approve", post(admin::approve_kyc))
        .route("/admin/kyc/{id}/reject", post(admin::reject_kyc))
        .route("/admin/wallets/{user_id}", get(admin::get_wallet))
        .route(
            "/admin/wallets/{user_id}/transactions",
            get(admin::list_wallet_transactions),
        )
        .route(
            "/admin/wallets/{user_id}/adjustments",
            post(admin::adjust_wallet),
        )
        .route(
            "/admin/wallets/{user_id}/reconciliation",
            get(admin::reconcile_wallet),
        )
        .route("/admin/virtual-accounts", get(admin::list_virtual_accounts))
        .route(
            "/admin/virtual-accounts/{id}/deactivate",
            post(admin::deactivate_virtual_account),
        )
        .route("/admin/payouts", get(admin::list_payouts))
        .route("/admin/payouts/{id}", get(admin::get_payout))
        .route("/admin/payouts/{id}/requery", post(admin::requery_payout))
        .route("/admin/fee-rules", get(admin::list_fee_rules))
        .route("/admin/fee-rules/{operation}", put(admin::upsert_fee_rule))
        .route(
            "/admin/risk-rules",
            get(admin::list_risk_rules).post(admin::create_risk_rule),
        )
        .route(
            "/admin/risk-rules/{id}",
            patch(admin::update_risk_rule).delete(admin::delete_risk_rule),
        )
        .route(
            "/admin/settlements",
            get(admin::list_settlements).post(admin::run_settlement),
        )
        .route("/admin/webhook-events", get(admin::list_webhook_events))
        .route(
            "/admin/webhook-events/{id}/replay",
            post(admin::replay_webhook_event),
        )
        .route("/admin/audit-logs", get(admin::list_audit_logs))
        .route_layer(from_fn(require_admin))
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    // route_layer only wraps routes already added, so admin routes get
    // require_admin first and auth_middleware (which runs first) on top
    let authenticated = Router::new()
        .route("/api/v1/me", get(onboarding::me))
        .route("/api/v1/wallet", get(wallet::get_wallet))
        .route("/api/v1/wallet/transactions", get(wallet::list_transactions))
        .route(
            "/api/v1/virtual-accounts",
            post(virtual_accounts::issue).get(virtual_accounts::list),
        )
        .route("/api/v1/payouts/quote", post(payouts::quote))
        .route("/api/v1/payouts", post(payouts::create).get(payouts::list))
        .route("/api/v1/payouts/{id}", get(payouts::get))
        .route("/api/v1/kyc", post(kyc::submit).get(kyc::list))
        .merge(admin_routes())
        .route_layer(from_fn_with_state(state.pool.clone(), auth_middleware));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/signup", post(onboarding::signup))
        .route("/webhooks/processor", post(webhooks::processor_webhook))
        .merge(authenticated)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        config::Config,
        models::webhook::SIGNATURE_HEADER,
        partner::{
            BankingPartner, IssuedVirtualAccount, PartnerError, TransferRequest, TransferStatus,
            VirtualAccountRequest,
        },
        services::webhook_service::sign,
    };

    const SECRET: &str = "whsec_router_test";

    /// Partner that is never reached by the requests under test.
    struct UnreachablePartner;

    #[async_trait]
    impl BankingPartner for UnreachablePartner {
        async fn create_virtual_account(
            &self,
            _request: &VirtualAccountRequest,
        ) -> Result<IssuedVirtualAccount, PartnerError> {
            Err(PartnerError::Unavailable("not in tests".into()))
        }

        async fn initiate_transfer(
            &self,
            _request: &TransferRequest,
        ) -> Result<TransferStatus, PartnerError> {
            Err(PartnerError::Unavailable("not in tests".into()))
        }

        async fn fetch_transfer(&self, _reference: &str) -> Result<TransferStatus, PartnerError> {
            Err(PartnerError::Unavailable("not in tests".into()))
        }
    }

    fn app() -> Router {
        let config: Config = envy::from_iter(vec![
            ("DATABASE_URL".to_string(), "postgres://localhost/unused".to_string()),
            ("PROCESSOR_WEBHOOK_SECRET".to_string(), SECRET.to_string()),
            ("PARTNER_BASE_URL".to_string(), "https://partner.test/v1/".to_string()),
            ("PARTNER_API_KEY".to_string(), "pk_test".to_string()),
        ])
        .unwrap();

        // Never connects: every request below is rejected before a query runs
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .unwrap();

        router(AppState {
            pool,
            config: Arc::new(config),
            partner: Arc::new(UnreachablePartner),
        })
    }

    async fn error_code(response: axum::response::Response) -> String {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        json["error"]["code"].as_str().unwrap().to_string()
    }

    fn webhook(body: &'static str, signature: Option<String>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/webhooks/processor")
            .header("Content-Type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        builder.body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn webhook_without_signature_is_unauthorized() {
        let response = app()
            .oneshot(webhook(r#"{"id":"evt_1","event":"deposit.received"}"#, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(response).await, "invalid_signature");
    }

    #[tokio::test]
    async fn webhook_with_foreign_signature_is_unauthorized() {
        let body = r#"{"id":"evt_1","event":"deposit.received"}"#;
        let signature = sign("some_other_secret", body.as_bytes());

        let response = app().oneshot(webhook(body, Some(signature))).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn signed_garbage_is_a_bad_request() {
        let body = "{not json";
        let signature = sign(SECRET, body.as_bytes());

        let response = app().oneshot(webhook(body, Some(signature))).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_code(response).await, "invalid_request");
    }

    #[tokio::test]
    async fn signed_event_without_id_is_a_bad_request() {
        let body = r#"{"id":"  ","event":"deposit.received","data":{}}"#;
        let signature = sign(SECRET, body.as_bytes());

        let response = app().oneshot(webhook(body, Some(signature))).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn api_routes_require_an_api_key() {
        for uri in ["/api/v1/wallet", "/api/v1/me", "/api/v1/payouts", "/admin/users"] {
            let response = app()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
            assert_eq!(error_code(response).await, "invalid_api_key");
        }
    }

    #[tokio::test]
    async fn malformed_authorization_header_is_unauthorized() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/admin/payouts")
                    .header("Authorization", "Token abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_routes_are_not_found() {
        let response = app()
            .oneshot(Request::builder().uri("/api/v2/wallet").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
