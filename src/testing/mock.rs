//! In-memory custody service
//!
//! [`MockCustody`] keeps organizations, users, keys and activities in memory
//! and checks stamps on forwarded requests the way the real service does:
//! API-key stamps by P-256 signature, passkey stamps against the credential
//! registered from the attestation. Only root-quorum members may sign.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use ed25519_dalek::{Signer as _, SigningKey as Ed25519SigningKey};
use p256::ecdsa::{signature::Verifier as _, Signature, VerifyingKey};
use uuid::Uuid;

use super::passkey::{verify_webauthn_stamp, verifying_key_from_cose, WebAuthnStamp};
use crate::ceremony::parse_attestation_object;
use crate::custody::types::{
    paths, Activity, ActivityRequest, ActivityResult, CreatePrivateKeysParams, CreatePrivateKeysResult,
    CreateSubOrganizationParams, CreateSubOrganizationResult, CreatedPrivateKey, PrivateKey, RootQuorum,
    SignRawPayloadParams, SignRawPayloadResult, SignedRequest, Stamp, UpdateRootQuorumParams, User,
    ACTIVITY_TYPE_CREATE_PRIVATE_KEYS, ACTIVITY_TYPE_CREATE_SUB_ORGANIZATION, ACTIVITY_TYPE_SIGN_RAW_PAYLOAD,
    ACTIVITY_TYPE_UPDATE_ROOT_QUORUM, CURVE_ED25519,
};
use crate::custody::{
    ActivityStatus, ApiKeyStampPayload, ApiKeyStamper, CustodyClient, CustodyError, API_KEY_STAMP_HEADER,
    WEBAUTHN_STAMP_HEADER,
};
use crate::registration::OWNER_USER_NAME;
use crate::utils::crypto::random_bytes;
use crate::utils::encoding::{from_base64url, from_hex, to_base58, to_hex};

const MOCK_BASE_URL: &str = "https://custody.mock";
const ROOT_USER_NAME: &str = "Root";

/// Switches for the failure modes a test wants to provoke
#[derive(Debug, Clone, Copy, Default)]
pub struct MockBehavior {
    /// Queries that report PENDING before an activity settles
    pub pending_polls: u32,
    /// Leave the passkey owner out of `list_users`
    pub hide_owner_user: bool,
    /// Acknowledge root quorum updates without applying them
    pub ignore_quorum_update: bool,
    /// Key creation activities end FAILED
    pub fail_key_creation: bool,
    /// Signing activities complete without a result
    pub omit_sign_result: bool,
    /// Signing activities end REJECTED regardless of who stamped them
    pub reject_signing: bool,
    /// `list_users` never answers
    pub stall_user_listing: bool,
    /// Signing submissions never answer
    pub stall_signing: bool,
}

struct MockAuthenticator {
    credential_id: String,
    rp_id_hash: [u8; 32],
    public_key: VerifyingKey,
}

struct MockUser {
    user_id: String,
    user_name: String,
    api_keys: Vec<String>,
    authenticators: Vec<MockAuthenticator>,
}

struct MockPrivateKey {
    name: String,
    signing_key: Ed25519SigningKey,
}

struct MockOrganization {
    name: String,
    users: Vec<MockUser>,
    root_quorum: RootQuorum,
    private_keys: HashMap<String, MockPrivateKey>,
}

struct MockActivity {
    settled: Activity,
    pending_polls: u32,
}

#[derive(Default)]
struct MockState {
    organizations: HashMap<String, MockOrganization>,
    activities: HashMap<String, MockActivity>,
    submitted: usize,
}

pub struct MockCustody {
    behavior: MockBehavior,
    root_organization_id: String,
    root_private_key_id: String,
    root_stamper: ApiKeyStamper,
    state: Mutex<MockState>,
}

impl Default for MockCustody {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCustody {
    #[must_use]
    pub fn new() -> Self {
        Self::with_behavior(MockBehavior::default())
    }

    /// A service with one root organization, whose only user holds
    /// [`MockCustody::root_stamper`] and one Ed25519 key
    #[must_use]
    pub fn with_behavior(behavior: MockBehavior) -> Self {
        let root_organization_id = Uuid::new_v4().to_string();
        let root_private_key_id = Uuid::new_v4().to_string();
        let root_stamper = ApiKeyStamper::generate();
        let root_user_id = Uuid::new_v4().to_string();

        let root = MockOrganization {
            name: "Root Organization".to_string(),
            users: vec![MockUser {
                user_id: root_user_id.clone(),
                user_name: ROOT_USER_NAME.to_string(),
                api_keys: vec![root_stamper.public_key_hex().to_string()],
                authenticators: vec![],
            }],
            root_quorum: RootQuorum {
                threshold: 1,
                user_ids: vec![root_user_id],
            },
            private_keys: HashMap::from([(
                root_private_key_id.clone(),
                MockPrivateKey {
                    name: "Root Signing Key".to_string(),
                    signing_key: Ed25519SigningKey::from_bytes(&random_bytes::<32>()),
                },
            )]),
        };

        let mut state = MockState::default();
        state.organizations.insert(root_organization_id.clone(), root);

        Self {
            behavior,
            root_organization_id,
            root_private_key_id,
            root_stamper,
            state: Mutex::new(state),
        }
    }

    #[must_use]
    pub fn root_organization_id(&self) -> &str {
        &self.root_organization_id
    }

    /// Stamper for the root organization's only user
    #[must_use]
    pub fn root_stamper(&self) -> ApiKeyStamper {
        self.root_stamper.clone()
    }

    /// `(organization_id, private_key_id, base58 public key)` of the root key
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    #[must_use]
    pub fn root_signing_key(&self) -> (String, String, String) {
        let state = self.state();
        let public_key = state
            .organizations
            .get(&self.root_organization_id)
            .and_then(|org| org.private_keys.get(&self.root_private_key_id))
            .map(|key| to_base58(key.signing_key.verifying_key().as_bytes()))
            .unwrap_or_default();
        (
            self.root_organization_id.clone(),
            self.root_private_key_id.clone(),
            public_key,
        )
    }

    /// Number of requests that came in through `submit_signed`
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    #[must_use]
    pub fn submitted_count(&self) -> usize {
        self.state().submitted
    }

    /// Organizations created through `create_sub_organization`
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    #[must_use]
    pub fn sub_organization_count(&self) -> usize {
        self.state().organizations.len() - 1
    }

    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    #[must_use]
    pub fn sub_organization_name(&self, organization_id: &str) -> Option<String> {
        self.state()
            .organizations
            .get(organization_id)
            .map(|org| org.name.clone())
    }

    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    #[must_use]
    pub fn user_id_by_name(&self, organization_id: &str, user_name: &str) -> Option<String> {
        self.state().organizations.get(organization_id).and_then(|org| {
            org.users
                .iter()
                .find(|user| user.user_name == user_name)
                .map(|user| user.user_id.clone())
        })
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("mock custody state lock poisoned")
    }

    /// Store a settled activity and return what the submitter sees first
    fn record(
        &self,
        state: &mut MockState,
        organization_id: &str,
        activity_type: &str,
        status: ActivityStatus,
        result: ActivityResult,
    ) -> Activity {
        let settled = Activity {
            id: Uuid::new_v4().to_string(),
            organization_id: organization_id.to_string(),
            activity_type: activity_type.to_string(),
            status,
            result,
        };
        state.activities.insert(
            settled.id.clone(),
            MockActivity {
                settled: settled.clone(),
                pending_polls: self.behavior.pending_polls,
            },
        );

        if self.behavior.pending_polls > 0 {
            pending(&settled)
        } else {
            settled
        }
    }

    fn sign_raw_payload(&self, state: &mut MockState, request: &SignedRequest) -> Result<Activity, CustodyError> {
        let body: ActivityRequest<SignRawPayloadParams> =
            serde_json::from_str(&request.body).map_err(|e| bad_request(&e.to_string()))?;
        if body.activity_type != ACTIVITY_TYPE_SIGN_RAW_PAYLOAD {
            return Err(bad_request("unexpected activity type"));
        }
        let organization_id = body.organization_id.as_str();
        let org = state
            .organizations
            .get(organization_id)
            .ok_or_else(|| not_found("organization"))?;

        let user_id = authenticate(org, &request.stamp, &request.body).ok_or(CustodyError::Status {
            status: 401,
            message: "stamp does not verify".to_string(),
        })?;

        let authorized = org.root_quorum.user_ids.contains(&user_id) && !self.behavior.reject_signing;
        let key = org.private_keys.get(&body.parameters.private_key_id);
        let payload = from_hex(&body.parameters.payload).map_err(|_| bad_request("payload is not hex"))?;

        let (status, result) = match key {
            _ if !authorized => (ActivityStatus::Rejected, ActivityResult::default()),
            None => (ActivityStatus::Failed, ActivityResult::default()),
            Some(_) if self.behavior.omit_sign_result => (ActivityStatus::Completed, ActivityResult::default()),
            Some(key) => {
                let signature = key.signing_key.sign(&payload).to_bytes();
                let result = ActivityResult {
                    sign_raw_payload_result: Some(SignRawPayloadResult {
                        r: to_hex(&signature[..32]),
                        s: to_hex(&signature[32..]),
                        v: "00".to_string(),
                    }),
                    ..ActivityResult::default()
                };
                (ActivityStatus::Completed, result)
            }
        };

        Ok(self.record(state, organization_id, ACTIVITY_TYPE_SIGN_RAW_PAYLOAD, status, result))
    }
}

fn pending(activity: &Activity) -> Activity {
    Activity {
        status: ActivityStatus::Pending,
        result: ActivityResult::default(),
        ..activity.clone()
    }
}

fn not_found(what: &str) -> CustodyError {
    CustodyError::Status {
        status: 404,
        message: format!("{what} not found"),
    }
}

fn bad_request(message: &str) -> CustodyError {
    CustodyError::Status {
        status: 400,
        message: message.to_string(),
    }
}

/// The user whose credential produced `stamp` over `body`, if any
fn authenticate(org: &MockOrganization, stamp: &Stamp, body: &str) -> Option<String> {
    match stamp.stamp_header_name.as_str() {
        API_KEY_STAMP_HEADER => {
            let decoded = from_base64url(&stamp.stamp_header_value).ok()?;
            let payload: ApiKeyStampPayload = serde_json::from_slice(&decoded).ok()?;
            let key = VerifyingKey::from_sec1_bytes(&from_hex(&payload.public_key).ok()?).ok()?;
            let signature = Signature::from_der(&from_hex(&payload.signature).ok()?).ok()?;
            key.verify(body.as_bytes(), &signature).ok()?;

            org.users
                .iter()
                .find(|user| {
                    user.api_keys
                        .iter()
                        .any(|k| k.eq_ignore_ascii_case(&payload.public_key))
                })
                .map(|user| user.user_id.clone())
        }
        WEBAUTHN_STAMP_HEADER => {
            let webauthn: WebAuthnStamp = serde_json::from_str(&stamp.stamp_header_value).ok()?;
            org.users
                .iter()
                .find(|user| {
                    user.authenticators.iter().any(|a| {
                        a.credential_id == webauthn.credential_id
                            && verify_webauthn_stamp(&webauthn, body, &a.rp_id_hash, &a.public_key)
                    })
                })
                .map(|user| user.user_id.clone())
        }
        _ => None,
    }
}

#[async_trait]
impl CustodyClient for MockCustody {
    fn endpoint_url(&self, path: &str) -> String {
        format!("{MOCK_BASE_URL}{path}")
    }

    async fn create_sub_organization(
        &self,
        organization_id: &str,
        params: CreateSubOrganizationParams,
    ) -> Result<Activity, CustodyError> {
        let mut users = Vec::with_capacity(params.root_users.len());
        for root_user in params.root_users {
            let mut authenticators = Vec::new();
            for authenticator in root_user.authenticators {
                let auth_data = parse_attestation_object(&authenticator.attestation.attestation_object)
                    .map_err(|e| bad_request(&e.to_string()))?;
                let public_key = verifying_key_from_cose(&auth_data.credential_public_key)
                    .ok_or_else(|| bad_request("unsupported credential public key"))?;
                authenticators.push(MockAuthenticator {
                    credential_id: authenticator.attestation.credential_id,
                    rp_id_hash: auth_data.rp_id_hash,
                    public_key,
                });
            }
            users.push(MockUser {
                user_id: Uuid::new_v4().to_string(),
                user_name: root_user.user_name,
                api_keys: root_user.api_keys.into_iter().map(|k| k.public_key).collect(),
                authenticators,
            });
        }

        let mut state = self.state();
        if !state.organizations.contains_key(organization_id) {
            return Err(not_found("organization"));
        }

        let sub_organization_id = Uuid::new_v4().to_string();
        let root_quorum = RootQuorum {
            threshold: params.root_quorum_threshold,
            user_ids: users.iter().map(|u| u.user_id.clone()).collect(),
        };
        state.organizations.insert(
            sub_organization_id.clone(),
            MockOrganization {
                name: params.sub_organization_name,
                users,
                root_quorum,
                private_keys: HashMap::new(),
            },
        );

        let result = ActivityResult {
            create_sub_organization_result: Some(CreateSubOrganizationResult { sub_organization_id }),
            ..ActivityResult::default()
        };
        Ok(self.record(
            &mut state,
            organization_id,
            ACTIVITY_TYPE_CREATE_SUB_ORGANIZATION,
            ActivityStatus::Completed,
            result,
        ))
    }

    async fn create_private_keys(
        &self,
        organization_id: &str,
        params: CreatePrivateKeysParams,
    ) -> Result<Activity, CustodyError> {
        let mut state = self.state();
        if self.behavior.fail_key_creation {
            return Ok(self.record(
                &mut state,
                organization_id,
                ACTIVITY_TYPE_CREATE_PRIVATE_KEYS,
                ActivityStatus::Failed,
                ActivityResult::default(),
            ));
        }

        let org = state
            .organizations
            .get_mut(organization_id)
            .ok_or_else(|| not_found("organization"))?;
        let mut created = Vec::with_capacity(params.private_keys.len());
        for key in params.private_keys {
            if key.curve != CURVE_ED25519 {
                return Err(bad_request("only CURVE_ED25519 is supported"));
            }
            let private_key_id = Uuid::new_v4().to_string();
            org.private_keys.insert(
                private_key_id.clone(),
                MockPrivateKey {
                    name: key.private_key_name,
                    signing_key: Ed25519SigningKey::from_bytes(&random_bytes::<32>()),
                },
            );
            created.push(CreatedPrivateKey { private_key_id });
        }

        let result = ActivityResult {
            create_private_keys_result_v2: Some(CreatePrivateKeysResult { private_keys: created }),
            ..ActivityResult::default()
        };
        Ok(self.record(
            &mut state,
            organization_id,
            ACTIVITY_TYPE_CREATE_PRIVATE_KEYS,
            ActivityStatus::Completed,
            result,
        ))
    }

    async fn update_root_quorum(
        &self,
        organization_id: &str,
        params: UpdateRootQuorumParams,
    ) -> Result<Activity, CustodyError> {
        let mut state = self.state();
        let org = state
            .organizations
            .get_mut(organization_id)
            .ok_or_else(|| not_found("organization"))?;
        if !self.behavior.ignore_quorum_update {
            org.root_quorum = RootQuorum {
                threshold: params.threshold,
                user_ids: params.user_ids,
            };
        }

        let result = ActivityResult {
            update_root_quorum_result: Some(serde_json::json!({})),
            ..ActivityResult::default()
        };
        Ok(self.record(
            &mut state,
            organization_id,
            ACTIVITY_TYPE_UPDATE_ROOT_QUORUM,
            ActivityStatus::Completed,
            result,
        ))
    }

    async fn get_activity(&self, organization_id: &str, activity_id: &str) -> Result<Activity, CustodyError> {
        let mut state = self.state();
        let activity = state
            .activities
            .get_mut(activity_id)
            .filter(|a| a.settled.organization_id == organization_id)
            .ok_or_else(|| not_found("activity"))?;

        if activity.pending_polls > 0 {
            activity.pending_polls -= 1;
            return Ok(pending(&activity.settled));
        }
        Ok(activity.settled.clone())
    }

    async fn get_private_key(
        &self,
        organization_id: &str,
        private_key_id: &str,
    ) -> Result<PrivateKey, CustodyError> {
        let state = self.state();
        let key = state
            .organizations
            .get(organization_id)
            .and_then(|org| org.private_keys.get(private_key_id))
            .ok_or_else(|| not_found("private key"))?;

        Ok(PrivateKey {
            private_key_id: private_key_id.to_string(),
            private_key_name: key.name.clone(),
            public_key: to_hex(key.signing_key.verifying_key().as_bytes()),
            curve: CURVE_ED25519.to_string(),
        })
    }

    async fn list_users(&self, organization_id: &str) -> Result<Vec<User>, CustodyError> {
        if self.behavior.stall_user_listing {
            std::future::pending::<()>().await;
        }
        let state = self.state();
        let org = state
            .organizations
            .get(organization_id)
            .ok_or_else(|| not_found("organization"))?;

        Ok(org
            .users
            .iter()
            .filter(|user| !(self.behavior.hide_owner_user && user.user_name == OWNER_USER_NAME))
            .map(|user| User {
                user_id: user.user_id.clone(),
                user_name: user.user_name.clone(),
            })
            .collect())
    }

    async fn get_root_quorum(&self, organization_id: &str) -> Result<RootQuorum, CustodyError> {
        self.state()
            .organizations
            .get(organization_id)
            .map(|org| org.root_quorum.clone())
            .ok_or_else(|| not_found("organization"))
    }

    async fn submit_signed(&self, request: &SignedRequest) -> Result<Activity, CustodyError> {
        if self.behavior.stall_signing {
            std::future::pending::<()>().await;
        }
        let mut state = self.state();
        state.submitted += 1;

        if request.url != self.endpoint_url(paths::SIGN_RAW_PAYLOAD) {
            return Err(not_found("endpoint"));
        }
        self.sign_raw_payload(&mut state, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custody::Stamper;
    use crate::signing::sign_raw_payload_request;

    fn signed_by(stamper: &dyn Stamper, custody: &MockCustody, org: &str, key_id: &str) -> SignedRequest {
        let body = serde_json::to_string(&sign_raw_payload_request(b"mock", org, key_id)).unwrap();
        SignedRequest {
            stamp: stamper.stamp(&body).unwrap(),
            body,
            url: custody.endpoint_url(paths::SIGN_RAW_PAYLOAD),
        }
    }

    #[tokio::test]
    async fn test_unknown_stamp_is_unauthorized() {
        let custody = MockCustody::new();
        let (org, key_id, _) = custody.root_signing_key();
        let request = signed_by(&ApiKeyStamper::generate(), &custody, &org, &key_id);

        assert!(matches!(
            custody.submit_signed(&request).await,
            Err(CustodyError::Status { status: 401, .. })
        ));
        assert_eq!(custody.submitted_count(), 1);
    }

    #[tokio::test]
    async fn test_tampered_body_is_unauthorized() {
        let custody = MockCustody::new();
        let (org, key_id, _) = custody.root_signing_key();
        let mut request = signed_by(&custody.root_stamper(), &custody, &org, &key_id);
        request.body = request.body.replace("6d6f636b", "6d6f636c");

        assert!(matches!(
            custody.submit_signed(&request).await,
            Err(CustodyError::Status { status: 401, .. })
        ));
    }

    #[tokio::test]
    async fn test_pending_activity_settles_after_polls() {
        let custody = MockCustody::with_behavior(MockBehavior {
            pending_polls: 2,
            ..MockBehavior::default()
        });
        let (org, key_id, _) = custody.root_signing_key();
        let submitted = custody
            .submit_signed(&signed_by(&custody.root_stamper(), &custody, &org, &key_id))
            .await
            .unwrap();
        assert_eq!(submitted.status, ActivityStatus::Pending);

        let mut statuses = Vec::new();
        for _ in 0..3 {
            statuses.push(custody.get_activity(&org, &submitted.id).await.unwrap().status);
        }
        assert_eq!(
            statuses,
            vec![ActivityStatus::Pending, ActivityStatus::Pending, ActivityStatus::Completed]
        );
    }
}
