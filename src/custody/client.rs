//! Key-custody service client
//!
//! [`CustodyClient`] is the seam the registration and signing flows talk
//! through. [`HttpCustodyClient`] is the production implementation; tests use
//! the in-memory service from `crate::testing` (feature `testing`).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use url::Url;

use super::errors::CustodyError;
use super::stamp::{ApiKeyStamper, Stamper};
use super::types::{
    paths, Activity, ActivityRequest, ActivityResponse, CreatePrivateKeysParams,
    CreateSubOrganizationParams, GetActivityRequest, GetOrganizationResponse,
    GetPrivateKeyRequest, GetPrivateKeyResponse, ListUsersResponse, OrganizationRequest,
    PrivateKey, RootQuorum, SignedRequest, UpdateRootQuorumParams, User,
    ACTIVITY_TYPE_CREATE_PRIVATE_KEYS, ACTIVITY_TYPE_CREATE_SUB_ORGANIZATION,
    ACTIVITY_TYPE_UPDATE_ROOT_QUORUM,
};
use crate::settings::CustodySettings;

/// Operations against the key-custody service
///
/// Methods other than [`CustodyClient::submit_signed`] are authorized by the
/// server's own API key.
#[async_trait]
pub trait CustodyClient: Send + Sync {
    /// Absolute URL for a service path, as it must appear in a signed request
    fn endpoint_url(&self, path: &str) -> String;

    async fn create_sub_organization(
        &self,
        organization_id: &str,
        params: CreateSubOrganizationParams,
    ) -> Result<Activity, CustodyError>;

    async fn create_private_keys(
        &self,
        organization_id: &str,
        params: CreatePrivateKeysParams,
    ) -> Result<Activity, CustodyError>;

    async fn update_root_quorum(
        &self,
        organization_id: &str,
        params: UpdateRootQuorumParams,
    ) -> Result<Activity, CustodyError>;

    async fn get_activity(
        &self,
        organization_id: &str,
        activity_id: &str,
    ) -> Result<Activity, CustodyError>;

    async fn get_private_key(
        &self,
        organization_id: &str,
        private_key_id: &str,
    ) -> Result<PrivateKey, CustodyError>;

    async fn list_users(&self, organization_id: &str) -> Result<Vec<User>, CustodyError>;

    async fn get_root_quorum(&self, organization_id: &str) -> Result<RootQuorum, CustodyError>;

    /// Submit a request stamped by someone else, unchanged
    async fn submit_signed(&self, request: &SignedRequest) -> Result<Activity, CustodyError>;
}

/// HTTP client for the custody service, stamping with the server's API key
pub struct HttpCustodyClient {
    http: Client,
    base_url: Url,
    stamper: Arc<dyn Stamper>,
    request_timeout: Duration,
}

impl HttpCustodyClient {
    /// Every HTTP exchange is abandoned after `request_timeout`
    ///
    /// # Errors
    ///
    /// Returns `CustodyError::Configuration` if `base_url` is not an absolute
    /// http(s) URL
    pub fn new(
        base_url: &str,
        stamper: Arc<dyn Stamper>,
        request_timeout: Duration,
    ) -> Result<Self, CustodyError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| CustodyError::Configuration(format!("invalid custody base URL: {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(CustodyError::Configuration(format!(
                "unsupported custody URL scheme: {}",
                base_url.scheme()
            )));
        }
        if base_url.scheme() == "http" {
            warn!("Custody base URL is not TLS protected: {base_url}");
        }

        let http = Client::builder()
            .user_agent(concat!("passkey-custody/", env!("CARGO_PKG_VERSION")))
            .timeout(request_timeout)
            .build()
            .map_err(|e| CustodyError::Configuration(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            stamper,
            request_timeout,
        })
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Build a client from settings, loading the API key pair
    ///
    /// # Errors
    ///
    /// Returns `CustodyError::Configuration` if the URL or key pair is invalid
    pub fn from_settings(settings: &CustodySettings) -> Result<Self, CustodyError> {
        let stamper = ApiKeyStamper::from_key_pair(&settings.api_private_key, &settings.api_public_key)?;
        Self::new(&settings.base_url, Arc::new(stamper), settings.poll_policy().deadline)
    }

    /// Serialize and stamp a body for `path` with the server's key
    fn sign<T: Serialize>(&self, path: &str, body: &T) -> Result<SignedRequest, CustodyError> {
        let body = serde_json::to_string(body)?;
        let stamp = self.stamper.stamp(&body)?;
        Ok(SignedRequest {
            body,
            stamp,
            url: self.endpoint_url(path),
        })
    }

    /// Only requests aimed at this service's base URL may be sent
    fn check_destination(&self, url: &str) -> Result<(), CustodyError> {
        let target = Url::parse(url)
            .map_err(|e| CustodyError::Configuration(format!("invalid request URL: {e}")))?;
        if target.origin() != self.base_url.origin() || !target.path().starts_with("/public/v1/") {
            return Err(CustodyError::Configuration(format!(
                "request URL {target} is not a custody endpoint"
            )));
        }
        Ok(())
    }

    async fn send<R: DeserializeOwned>(&self, request: &SignedRequest) -> Result<R, CustodyError> {
        self.check_destination(&request.url)?;
        debug!("POST {}", request.url);

        let response = self
            .http
            .post(&request.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(request.stamp.stamp_header_name.as_str(), request.stamp.stamp_header_value.as_str())
            .body(request.body.clone())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CustodyError::Status {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn submit<P: Serialize + Sync>(
        &self,
        path: &str,
        request: &ActivityRequest<P>,
    ) -> Result<Activity, CustodyError> {
        let signed = self.sign(path, request)?;
        let response: ActivityResponse = self.send(&signed).await?;
        Ok(response.activity)
    }

    async fn query<B: Serialize + Sync, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, CustodyError> {
        let signed = self.sign(path, body)?;
        self.send(&signed).await
    }
}

/// Pull the service's `message` out of an error body, or keep the raw text
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.chars().take(256).collect())
}

#[async_trait]
impl CustodyClient for HttpCustodyClient {
    fn endpoint_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    async fn create_sub_organization(
        &self,
        organization_id: &str,
        params: CreateSubOrganizationParams,
    ) -> Result<Activity, CustodyError> {
        let request = ActivityRequest::new(ACTIVITY_TYPE_CREATE_SUB_ORGANIZATION, organization_id, params);
        self.submit(paths::CREATE_SUB_ORGANIZATION, &request).await
    }

    async fn create_private_keys(
        &self,
        organization_id: &str,
        params: CreatePrivateKeysParams,
    ) -> Result<Activity, CustodyError> {
        let request = ActivityRequest::new(ACTIVITY_TYPE_CREATE_PRIVATE_KEYS, organization_id, params);
        self.submit(paths::CREATE_PRIVATE_KEYS, &request).await
    }

    async fn update_root_quorum(
        &self,
        organization_id: &str,
        params: UpdateRootQuorumParams,
    ) -> Result<Activity, CustodyError> {
        let request = ActivityRequest::new(ACTIVITY_TYPE_UPDATE_ROOT_QUORUM, organization_id, params);
        self.submit(paths::UPDATE_ROOT_QUORUM, &request).await
    }

    async fn get_activity(
        &self,
        organization_id: &str,
        activity_id: &str,
    ) -> Result<Activity, CustodyError> {
        let body = GetActivityRequest {
            organization_id: organization_id.to_string(),
            activity_id: activity_id.to_string(),
        };
        let response: ActivityResponse = self.query(paths::GET_ACTIVITY, &body).await?;
        Ok(response.activity)
    }

    async fn get_private_key(
        &self,
        organization_id: &str,
        private_key_id: &str,
    ) -> Result<PrivateKey, CustodyError> {
        let body = GetPrivateKeyRequest {
            organization_id: organization_id.to_string(),
            private_key_id: private_key_id.to_string(),
        };
        let response: GetPrivateKeyResponse = self.query(paths::GET_PRIVATE_KEY, &body).await?;
        Ok(response.private_key)
    }

    async fn list_users(&self, organization_id: &str) -> Result<Vec<User>, CustodyError> {
        let body = OrganizationRequest {
            organization_id: organization_id.to_string(),
        };
        let response: ListUsersResponse = self.query(paths::LIST_USERS, &body).await?;
        Ok(response.users)
    }

    async fn get_root_quorum(&self, organization_id: &str) -> Result<RootQuorum, CustodyError> {
        let body = OrganizationRequest {
            organization_id: organization_id.to_string(),
        };
        let response: GetOrganizationResponse = self.query(paths::GET_ORGANIZATION, &body).await?;
        response
            .organization_data
            .root_quorum
            .ok_or_else(|| CustodyError::Decode("organization has no root quorum".into()))
    }

    async fn submit_signed(&self, request: &SignedRequest) -> Result<Activity, CustodyError> {
        let response: ActivityResponse = self.send(request).await?;
        Ok(response.activity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custody::types::Stamp;

    fn client(base_url: &str) -> HttpCustodyClient {
        HttpCustodyClient::new(base_url, Arc::new(ApiKeyStamper::generate()), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_endpoint_url_joins_cleanly() {
        for base in ["https://api.custody.test", "https://api.custody.test/"] {
            assert_eq!(
                client(base).endpoint_url(paths::SIGN_RAW_PAYLOAD),
                "https://api.custody.test/public/v1/submit/sign_raw_payload"
            );
        }
    }

    #[test]
    fn test_rejects_bad_base_urls() {
        for base in ["not a url", "ftp://api.custody.test", "/relative"] {
            assert!(matches!(
                HttpCustodyClient::new(base, Arc::new(ApiKeyStamper::generate()), Duration::from_secs(5)),
                Err(CustodyError::Configuration(_))
            ));
        }
    }

    #[test]
    fn test_signed_requests_target_the_service() {
        let client = client("https://api.custody.test");
        let signed = client
            .sign(paths::LIST_USERS, &OrganizationRequest { organization_id: "org".into() })
            .unwrap();
        assert_eq!(signed.body, r#"{"organizationId":"org"}"#);
        assert_eq!(signed.stamp.stamp_header_name, "X-Stamp");
        assert!(client.check_destination(&signed.url).is_ok());
    }

    #[tokio::test]
    async fn test_refuses_foreign_destinations() {
        let client = client("https://api.custody.test");
        for url in [
            "https://evil.test/public/v1/submit/sign_raw_payload",
            "http://api.custody.test/public/v1/submit/sign_raw_payload",
            "https://api.custody.test/internal/admin",
        ] {
            let request = SignedRequest {
                body: "{}".into(),
                stamp: Stamp {
                    stamp_header_name: "X-Stamp".into(),
                    stamp_header_value: "x".into(),
                },
                url: url.into(),
            };
            assert!(matches!(
                client.submit_signed(&request).await,
                Err(CustodyError::Configuration(_))
            ));
        }
    }

    #[test]
    fn test_from_settings_checks_key_pair() {
        let settings = crate::testing::TestFixtures::settings();
        let client = HttpCustodyClient::from_settings(&settings.custody).unwrap();
        assert_eq!(client.request_timeout(), settings.custody.poll_policy().deadline);

        let mut mismatched = settings.custody;
        mismatched.api_public_key = ApiKeyStamper::generate().public_key_hex().to_string();
        assert!(matches!(
            HttpCustodyClient::from_settings(&mismatched),
            Err(CustodyError::Configuration(_))
        ));
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(r#"{"code":7,"message":"denied"}"#), "denied");
        assert_eq!(error_message("plain failure"), "plain failure");
    }
}
