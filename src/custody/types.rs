//! Wire model of the key-custody service
//!
//! Field names follow the service's camelCase JSON. Only the fields this
//! crate reads or writes are modelled; everything else is ignored on decode.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ceremony::Attestation;

pub const ACTIVITY_TYPE_CREATE_SUB_ORGANIZATION: &str = "ACTIVITY_TYPE_CREATE_SUB_ORGANIZATION_V2";
pub const ACTIVITY_TYPE_CREATE_PRIVATE_KEYS: &str = "ACTIVITY_TYPE_CREATE_PRIVATE_KEYS_V2";
pub const ACTIVITY_TYPE_UPDATE_ROOT_QUORUM: &str = "ACTIVITY_TYPE_UPDATE_ROOT_QUORUM";
pub const ACTIVITY_TYPE_SIGN_RAW_PAYLOAD: &str = "ACTIVITY_TYPE_SIGN_RAW_PAYLOAD";

pub const CURVE_ED25519: &str = "CURVE_ED25519";
pub const PAYLOAD_ENCODING_HEXADECIMAL: &str = "PAYLOAD_ENCODING_HEXADECIMAL";
pub const HASH_FUNCTION_NOT_APPLICABLE: &str = "HASH_FUNCTION_NOT_APPLICABLE";

/// Service endpoints, relative to the base URL
pub mod paths {
    pub const CREATE_SUB_ORGANIZATION: &str = "/public/v1/submit/create_sub_organization";
    pub const CREATE_PRIVATE_KEYS: &str = "/public/v1/submit/create_private_keys";
    pub const UPDATE_ROOT_QUORUM: &str = "/public/v1/submit/update_root_quorum";
    pub const SIGN_RAW_PAYLOAD: &str = "/public/v1/submit/sign_raw_payload";
    pub const GET_ACTIVITY: &str = "/public/v1/query/get_activity";
    pub const GET_PRIVATE_KEY: &str = "/public/v1/query/get_private_key";
    pub const LIST_USERS: &str = "/public/v1/query/list_users";
    pub const GET_ORGANIZATION: &str = "/public/v1/query/get_organization";
}

/// Lifecycle state of an activity
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum ActivityStatus {
    Created,
    Pending,
    Completed,
    Failed,
    Rejected,
    ConsensusNeeded,
    Unknown(String),
}

impl ActivityStatus {
    /// Whether the activity will not change state any more
    ///
    /// Unrecognized statuses count as terminal so they surface instead of
    /// being polled until the deadline.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Created | Self::Pending)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Created => "ACTIVITY_STATUS_CREATED",
            Self::Pending => "ACTIVITY_STATUS_PENDING",
            Self::Completed => "ACTIVITY_STATUS_COMPLETED",
            Self::Failed => "ACTIVITY_STATUS_FAILED",
            Self::Rejected => "ACTIVITY_STATUS_REJECTED",
            Self::ConsensusNeeded => "ACTIVITY_STATUS_CONSENSUS_NEEDED",
            Self::Unknown(other) => other,
        }
    }
}

impl From<String> for ActivityStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "ACTIVITY_STATUS_CREATED" => Self::Created,
            "ACTIVITY_STATUS_PENDING" => Self::Pending,
            "ACTIVITY_STATUS_COMPLETED" => Self::Completed,
            "ACTIVITY_STATUS_FAILED" => Self::Failed,
            "ACTIVITY_STATUS_REJECTED" => Self::Rejected,
            "ACTIVITY_STATUS_CONSENSUS_NEEDED" => Self::ConsensusNeeded,
            _ => Self::Unknown(value),
        }
    }
}

impl From<ActivityStatus> for String {
    fn from(status: ActivityStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub organization_id: String,
    #[serde(rename = "type")]
    pub activity_type: String,
    pub status: ActivityStatus,
    #[serde(default)]
    pub result: ActivityResult,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_sub_organization_result: Option<CreateSubOrganizationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_private_keys_result_v2: Option<CreatePrivateKeysResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_root_quorum_result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_raw_payload_result: Option<SignRawPayloadResult>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubOrganizationResult {
    pub sub_organization_id: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreatePrivateKeysResult {
    #[serde(default)]
    pub private_keys: Vec<CreatedPrivateKey>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreatedPrivateKey {
    pub private_key_id: String,
}

/// Raw signature components, each hex encoded
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SignRawPayloadResult {
    pub r: String,
    pub s: String,
    #[serde(default)]
    pub v: String,
}

/// Envelope returned by submit endpoints and `get_activity`
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ActivityResponse {
    pub activity: Activity,
}

/// Body of a submitted activity
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRequest<P> {
    #[serde(rename = "type")]
    pub activity_type: String,
    pub timestamp_ms: String,
    pub organization_id: String,
    pub parameters: P,
}

impl<P> ActivityRequest<P> {
    /// New request stamped with the current time
    pub fn new(activity_type: &str, organization_id: &str, parameters: P) -> Self {
        Self {
            activity_type: activity_type.to_string(),
            timestamp_ms: chrono::Utc::now().timestamp_millis().to_string(),
            organization_id: organization_id.to_string(),
            parameters,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubOrganizationParams {
    pub sub_organization_name: String,
    pub root_users: Vec<RootUserParams>,
    pub root_quorum_threshold: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RootUserParams {
    pub user_name: String,
    #[serde(default)]
    pub api_keys: Vec<ApiKeyParams>,
    #[serde(default)]
    pub authenticators: Vec<AuthenticatorParams>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyParams {
    pub api_key_name: String,
    pub public_key: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorParams {
    pub authenticator_name: String,
    pub challenge: String,
    pub attestation: Attestation,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreatePrivateKeysParams {
    pub private_keys: Vec<PrivateKeyParams>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PrivateKeyParams {
    pub private_key_name: String,
    pub curve: String,
    #[serde(default)]
    pub address_formats: Vec<String>,
    #[serde(default)]
    pub private_key_tags: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRootQuorumParams {
    pub threshold: u32,
    pub user_ids: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SignRawPayloadParams {
    pub private_key_id: String,
    pub payload: String,
    pub encoding: String,
    pub hash_function: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GetActivityRequest {
    pub organization_id: String,
    pub activity_id: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GetPrivateKeyRequest {
    pub organization_id: String,
    pub private_key_id: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationRequest {
    pub organization_id: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PrivateKey {
    pub private_key_id: String,
    #[serde(default)]
    pub private_key_name: String,
    pub public_key: String, // hex
    #[serde(default)]
    pub curve: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GetPrivateKeyResponse {
    pub private_key: PrivateKey,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user_id: String,
    pub user_name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ListUsersResponse {
    #[serde(default)]
    pub users: Vec<User>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RootQuorum {
    pub threshold: u32,
    #[serde(default)]
    pub user_ids: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationData {
    #[serde(default)]
    pub root_quorum: Option<RootQuorum>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GetOrganizationResponse {
    pub organization_data: OrganizationData,
}

/// Authentication stamp carried in a request header
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Stamp {
    pub stamp_header_name: String,
    pub stamp_header_value: String,
}

/// A request body together with the stamp over exactly that body
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SignedRequest {
    pub body: String,
    pub stamp: Stamp,
    pub url: String,
}

/// An activity body that still needs a stamp
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UnsignedRequest {
    pub body: String,
    pub url: String,
}
