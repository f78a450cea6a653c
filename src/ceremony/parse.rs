//! Shape validation for registration responses
//!
//! Two shapes are accepted: the browser's `PublicKeyCredential` JSON
//! (`{id, rawId, type, response: {clientDataJSON, attestationObject}}`) and
//! the flat form the custody service itself uses
//! (`{credentialId, clientDataJson, attestationObject, transports}`).

use log::debug;
use serde::Deserialize;
use serde_json::Value;

use super::cbor::parse_attestation_object;
use super::errors::CeremonyError;
use super::types::{Attestation, CollectedClientData, ParsedRegistration};
use crate::utils::encoding::from_base64url;

const TRANSPORT_PREFIX: &str = "AUTHENTICATOR_TRANSPORT_";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BrowserCredential {
    id: String,
    #[serde(rename = "type", default)]
    credential_type: Option<String>,
    response: BrowserAttestationResponse,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BrowserAttestationResponse {
    #[serde(rename = "clientDataJSON")]
    client_data_json: String,
    attestation_object: String,
    #[serde(default)]
    transports: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RegistrationShape {
    Browser(BrowserCredential),
    Flat(Attestation),
}

impl RegistrationShape {
    fn into_attestation(self) -> Result<Attestation, CeremonyError> {
        match self {
            Self::Browser(credential) => {
                if let Some(kind) = credential.credential_type.as_deref() {
                    if kind != "public-key" {
                        return Err(CeremonyError::ShapeInvalid(format!(
                            "unsupported credential type: {kind}"
                        )));
                    }
                }
                Ok(Attestation {
                    credential_id: credential.id,
                    client_data_json: credential.response.client_data_json,
                    attestation_object: credential.response.attestation_object,
                    transports: credential.response.transports,
                })
            }
            Self::Flat(attestation) => Ok(attestation),
        }
    }
}

/// Map a transport hint to the custody service's enum name
///
/// Unknown hints yield `None` and are dropped.
fn normalize_transport(transport: &str) -> Option<String> {
    if transport.starts_with(TRANSPORT_PREFIX) {
        return Some(transport.to_string());
    }
    let name = match transport {
        "usb" => "USB",
        "nfc" => "NFC",
        "ble" => "BLE",
        "internal" => "INTERNAL",
        "hybrid" => "HYBRID",
        _ => return None,
    };
    Some(format!("{TRANSPORT_PREFIX}{name}"))
}

/// Validate the shape of a registration response and decode its parts
///
/// # Errors
///
/// Returns `CeremonyError::ShapeInvalid` if the value is not one of the
/// accepted shapes or any of its encoded fields fail to decode
pub fn parse_registration(value: &Value) -> Result<ParsedRegistration, CeremonyError> {
    let shape = RegistrationShape::deserialize(value)
        .map_err(|_| CeremonyError::ShapeInvalid("unrecognized registration response".into()))?;
    let mut attestation = shape.into_attestation()?;

    if attestation.credential_id.is_empty() {
        return Err(CeremonyError::ShapeInvalid("empty credential id".into()));
    }
    from_base64url(&attestation.credential_id)
        .map_err(|_| CeremonyError::ShapeInvalid("credential id is not base64url".into()))?;

    let client_data_bytes = from_base64url(&attestation.client_data_json)
        .map_err(|_| CeremonyError::ShapeInvalid("client data encoding".into()))?;
    let client_data: CollectedClientData = serde_json::from_slice(&client_data_bytes)
        .map_err(|_| CeremonyError::ShapeInvalid("client data JSON".into()))?;

    if client_data.challenge.is_empty() {
        return Err(CeremonyError::ShapeInvalid("client data has no challenge".into()));
    }

    let authenticator_data = parse_attestation_object(&attestation.attestation_object)?;

    let original_transports = std::mem::take(&mut attestation.transports);
    attestation.transports = original_transports
        .iter()
        .filter_map(|t| {
            let normalized = normalize_transport(t);
            if normalized.is_none() {
                debug!("Dropping unknown authenticator transport: {t}");
            }
            normalized
        })
        .collect();

    Ok(ParsedRegistration {
        challenge: client_data.challenge.clone(),
        client_data,
        authenticator_data,
        attestation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::AttestationFixture;
    use serde_json::json;

    fn fixture() -> AttestationFixture {
        AttestationFixture::new("localhost", "http://localhost:8080")
    }

    #[test]
    fn test_parses_browser_shape() {
        let fixture = fixture();
        let value = fixture.browser_response("the-challenge");

        let parsed = parse_registration(&value).unwrap();
        assert_eq!(parsed.challenge, "the-challenge");
        assert_eq!(parsed.client_data.ceremony_type, "webauthn.create");
        assert_eq!(parsed.credential_id(), fixture.credential_id_b64());
        assert_eq!(
            parsed.attestation.transports,
            vec![
                "AUTHENTICATOR_TRANSPORT_INTERNAL".to_string(),
                "AUTHENTICATOR_TRANSPORT_HYBRID".to_string()
            ]
        );
    }

    #[test]
    fn test_parses_flat_shape() {
        let fixture = fixture();
        let attestation = fixture.attestation_for("flat-challenge");
        let value = serde_json::to_value(&attestation).unwrap();

        let parsed = parse_registration(&value).unwrap();
        assert_eq!(parsed.challenge, "flat-challenge");
        assert_eq!(parsed.attestation, attestation);
    }

    #[test]
    fn test_unknown_transports_are_dropped() {
        let fixture = fixture();
        let mut value = fixture.browser_response("c");
        value["response"]["transports"] = json!(["usb", "smoke-signal", "AUTHENTICATOR_TRANSPORT_NFC"]);

        let parsed = parse_registration(&value).unwrap();
        assert_eq!(
            parsed.attestation.transports,
            vec![
                "AUTHENTICATOR_TRANSPORT_USB".to_string(),
                "AUTHENTICATOR_TRANSPORT_NFC".to_string()
            ]
        );
    }

    #[test]
    fn test_rejects_unrecognized_shapes() {
        for value in [
            json!(null),
            json!("string"),
            json!({}),
            json!({"id": "abc"}),
            json!({"credentialId": "abc", "clientDataJson": "x"}),
        ] {
            assert!(
                matches!(parse_registration(&value), Err(CeremonyError::ShapeInvalid(_))),
                "accepted {value}"
            );
        }
    }

    #[test]
    fn test_rejects_wrong_credential_type() {
        let mut value = fixture().browser_response("c");
        value["type"] = json!("password");
        assert!(matches!(
            parse_registration(&value),
            Err(CeremonyError::ShapeInvalid(_))
        ));
    }

    #[test]
    fn test_rejects_undecodable_client_data() {
        let mut value = fixture().browser_response("c");
        value["response"]["clientDataJSON"] = json!("!!!");
        assert_eq!(
            parse_registration(&value).unwrap_err(),
            CeremonyError::ShapeInvalid("client data encoding".into())
        );

        value["response"]["clientDataJSON"] = json!(crate::utils::encoding::to_base64url(b"{not json"));
        assert_eq!(
            parse_registration(&value).unwrap_err(),
            CeremonyError::ShapeInvalid("client data JSON".into())
        );
    }

    #[test]
    fn test_rejects_undecodable_attestation_object() {
        let mut value = fixture().browser_response("c");
        value["response"]["attestationObject"] = json!("AAAA");
        assert!(matches!(
            parse_registration(&value),
            Err(CeremonyError::ShapeInvalid(_))
        ));
    }
}
