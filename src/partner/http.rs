//! HTTP client for the banking partner API.
//!
//! # Endpoints
//!
//! - `POST {base}/virtual-accounts`
//! - `POST {base}/transfers`
//! - `GET  {base}/transfers/{reference}`
//!
//! All requests carry `Authorization: Bearer <PARTNER_API_KEY>` and JSON bodies.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Serialize, de::DeserializeOwned};
use url::Url;

use super::{
    BankingPartner, IssuedVirtualAccount, PartnerError, TransferRequest, TransferStatus,
    VirtualAccountRequest,
};

/// reqwest-backed [`BankingPartner`].
#[derive(Debug, Clone)]
pub struct HttpBankingPartner {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl HttpBankingPartner {
    /// Build a client with a per-request timeout.
    pub fn new(base_url: Url, api_key: String, timeout: Duration) -> Result<Self, PartnerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PartnerError::Unavailable(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            client,
            base_url: normalize_base(base_url),
            api_key,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, PartnerError> {
        self.base_url
            .join(path)
            .map_err(|e| PartnerError::Rejected(format!("invalid partner path {}: {}", path, e)))
    }

    /// `{base}/transfers/{reference}` with the reference percent-encoded as a
    /// single path segment, since references are client supplied.
    fn transfer_url(&self, reference: &str) -> Result<Url, PartnerError> {
        let mut url = self.endpoint("transfers/")?;
        url.path_segments_mut()
            .map_err(|_| PartnerError::Rejected("partner base URL cannot be a base".to_string()))?
            .pop_if_empty()
            .push(reference);
        Ok(url)
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, PartnerError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        read_response(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, PartnerError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(transport_error)?;

        read_response(response).await
    }
}

#[async_trait]
impl BankingPartner for HttpBankingPartner {
    async fn create_virtual_account(
        &self,
        request: &VirtualAccountRequest,
    ) -> Result<IssuedVirtualAccount, PartnerError> {
        self.post_json("virtual-accounts", request).await
    }

    async fn initiate_transfer(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferStatus, PartnerError> {
        tracing::info!(
            reference = %request.reference,
            amount_cents = request.amount_cents,
            "initiating partner transfer"
        );
        self.post_json("transfers", request).await
    }

    async fn fetch_transfer(&self, reference: &str) -> Result<TransferStatus, PartnerError> {
        let url = self.transfer_url(reference)?;
        self.get_json(url).await
    }
}

/// Ensure the base path ends with `/` so `Url::join` appends instead of replacing
/// the last segment.
fn normalize_base(mut base: Url) -> Url {
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}

fn transport_error(err: reqwest::Error) -> PartnerError {
    if err.is_timeout() {
        PartnerError::Unavailable("request timed out".to_string())
    } else {
        PartnerError::Unavailable(err.to_string())
    }
}

async fn read_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, PartnerError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| PartnerError::Unavailable(format!("unreadable partner response: {}", e)));
    }

    let body = response.text().await.unwrap_or_default();
    Err(classify_failure(status, body))
}

/// Map a non-2xx partner response to an error.
///
/// 4xx means the partner understood and refused; anything else leaves the
/// outcome unknown.
fn classify_failure(status: StatusCode, body: String) -> PartnerError {
    let detail = if body.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, body)
    };

    if status.is_client_error() {
        PartnerError::Rejected(detail)
    } else {
        PartnerError::Unavailable(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partner(base: &str) -> HttpBankingPartner {
        HttpBankingPartner::new(
            Url::parse(base).unwrap(),
            "pk_test".to_string(),
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[test]
    fn endpoints_append_to_base_path() {
        let p = partner("https://partner.example.com/api/v2");
        assert_eq!(
            p.endpoint("transfers").unwrap().as_str(),
            "https://partner.example.com/api/v2/transfers"
        );

        let p = partner("https://partner.example.com/api/v2/");
        assert_eq!(
            p.endpoint("virtual-accounts").unwrap().as_str(),
            "https://partner.example.com/api/v2/virtual-accounts"
        );
    }

    #[test]
    fn transfer_reference_stays_in_one_segment() {
        let p = partner("https://partner.example.com/api");
        assert_eq!(
            p.transfer_url("po/../1").unwrap().as_str(),
            "https://partner.example.com/api/transfers/po%2F..%2F1"
        );
    }

    #[test]
    fn client_errors_are_rejections() {
        let err = classify_failure(StatusCode::UNPROCESSABLE_ENTITY, "invalid bank".into());
        assert!(matches!(err, PartnerError::Rejected(msg) if msg.contains("invalid bank")));
    }

    #[test]
    fn server_errors_are_ambiguous() {
        let err = classify_failure(StatusCode::BAD_GATEWAY, String::new());
        assert!(matches!(err, PartnerError::Unavailable(_)));
    }
}
