// HTTP surface exercised end to end with actix-web's test server
use std::sync::Arc;
use std::time::Duration;

use actix_web::{http::StatusCode, test, web, App};
use passkey_custody::ceremony::ClientDataVerifier;
use passkey_custody::challenge::ChallengeToken;
use passkey_custody::custody::{ApiKeyStamper, PollPolicy, SignedRequest, Stamper, UnsignedRequest};
use passkey_custody::handlers::{self, register::ChallengeResponse, sign::SignResponse};
use passkey_custody::registration::{Registration, RegistrationConfig, RegistrationOrchestrator};
use passkey_custody::signing::{SignatureVerifier, SigningProxy};
use passkey_custody::testing::constants::{TEST_RP_ID, TEST_RP_ORIGIN};
use passkey_custody::testing::{MockCustody, TestFixtures};
use passkey_custody::utils::crypto::generate_encryption_key;
use passkey_custody::utils::encoding::from_hex;
use serde_json::{json, Value};

struct Services {
    custody: Arc<MockCustody>,
    bootstrap: ApiKeyStamper,
    orchestrator: web::Data<RegistrationOrchestrator>,
    signing: web::Data<SigningProxy>,
}

fn services() -> Services {
    let custody = Arc::new(MockCustody::new());
    let bootstrap = ApiKeyStamper::generate();
    let policy = PollPolicy::new(Duration::from_millis(1), Duration::from_secs(2));

    let orchestrator = RegistrationOrchestrator::new(
        RegistrationConfig {
            organization_id: custody.root_organization_id().to_string(),
            sub_organization_prefix: "Passkey Wallet".to_string(),
            bootstrap_public_key: bootstrap.public_key_hex().to_string(),
            poll_policy: policy,
        },
        ChallengeToken::new(generate_encryption_key(), Duration::from_secs(60)),
        custody.clone(),
        Arc::new(ClientDataVerifier::new(TEST_RP_ID, TEST_RP_ORIGIN)),
    );
    let signing = SigningProxy::new(custody.clone(), Arc::new(bootstrap.clone()), policy);

    Services {
        custody,
        bootstrap,
        orchestrator: web::Data::new(orchestrator),
        signing: web::Data::new(signing),
    }
}

macro_rules! app {
    ($services:expr) => {
        test::init_service(
            App::new()
                .app_data($services.orchestrator.clone())
                .app_data($services.signing.clone())
                .configure(handlers::configure),
        )
        .await
    };
}

#[actix_web::test]
async fn test_ping() {
    let services = services();
    let app = app!(services);

    let response = test::call_service(&app, test::TestRequest::get().uri("/ping").to_request()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = test::read_body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[actix_web::test]
async fn test_register_then_sign_with_passkey() {
    let services = services();
    let app = app!(services);
    let fixture = TestFixtures::attestation();

    // Challenge
    let response = test::call_service(&app, test::TestRequest::get().uri("/api/register").to_request()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("Cache-Control").unwrap(), "no-store");
    let ChallengeResponse { challenge } = test::read_body_json(response).await;

    // Registration
    let request = test::TestRequest::post()
        .uri("/api/register")
        .set_json(json!({ "registration": fixture.browser_response(&challenge) }))
        .to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let registration: Registration = test::read_body_json(response).await;
    assert_eq!(services.custody.sub_organization_count(), 1);

    // Prepare
    let request = test::TestRequest::post()
        .uri("/api/sign/prepare")
        .set_json(json!({
            "payload": "48656c6c6f",
            "subOrganizationId": registration.sub_organization_id,
            "privateKeyId": registration.private_key_id,
        }))
        .to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let unsigned: UnsignedRequest = test::read_body_json(response).await;

    // Stamp in the "browser" and forward
    let signed = SignedRequest {
        stamp: fixture.passkey().stamp(&unsigned.body).unwrap(),
        body: unsigned.body,
        url: unsigned.url,
    };
    let request = test::TestRequest::post()
        .uri("/api/sign")
        .set_json(json!({ "signedRequest": signed, "publicKey": registration.public_key }))
        .to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let signed: SignResponse = test::read_body_json(response).await;
    assert_eq!(signed.signature.len(), 128);
    assert!(SignatureVerifier::verify_base58(
        b"Hello",
        &from_hex(&signed.signature).unwrap(),
        &registration.public_key
    ));
}

#[actix_web::test]
async fn test_forged_challenge_is_bad_request() {
    let services = services();
    let app = app!(services);

    let request = test::TestRequest::post()
        .uri("/api/register")
        .set_json(json!({ "registration": TestFixtures::attestation().browser_response("Zm9yZ2Vk") }))
        .to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(response).await;
    assert_eq!(body["error"], "registration_rejected");
    assert!(body["error_description"].is_string());
    assert_eq!(services.custody.sub_organization_count(), 0);
}

#[actix_web::test]
async fn test_prepare_rejects_non_hex_payload() {
    let services = services();
    let app = app!(services);

    let request = test::TestRequest::post()
        .uri("/api/sign/prepare")
        .set_json(json!({ "payload": "not hex", "subOrganizationId": "s", "privateKeyId": "k" }))
        .to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(response).await;
    assert_eq!(body["error"], "invalid_field");
}

#[actix_web::test]
async fn test_bootstrap_stamped_request_is_forbidden_after_handoff() {
    let services = services();
    let app = app!(services);
    let fixture = TestFixtures::attestation();

    let response = test::call_service(&app, test::TestRequest::get().uri("/api/register").to_request()).await;
    let ChallengeResponse { challenge } = test::read_body_json(response).await;
    let request = test::TestRequest::post()
        .uri("/api/register")
        .set_json(json!({ "registration": fixture.browser_response(&challenge) }))
        .to_request();
    let registration: Registration = test::read_body_json(test::call_service(&app, request).await).await;

    let unsigned = services
        .signing
        .prepare(b"drain", &registration.sub_organization_id, &registration.private_key_id)
        .unwrap();
    let signed = SignedRequest {
        stamp: services.bootstrap.stamp(&unsigned.body).unwrap(),
        body: unsigned.body,
        url: unsigned.url,
    };
    let request = test::TestRequest::post()
        .uri("/api/sign")
        .set_json(json!({ "signedRequest": signed, "publicKey": registration.public_key }))
        .to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body: Value = test::read_body_json(response).await;
    assert_eq!(body["error"], "signing_rejected");
}

#[actix_web::test]
async fn test_sign_refuses_requests_for_other_endpoints() {
    let services = services();
    let app = app!(services);

    let signed = SignedRequest {
        body: "{}".to_string(),
        stamp: services.bootstrap.stamp("{}").unwrap(),
        url: "https://elsewhere.example/public/v1/submit/sign_raw_payload".to_string(),
    };
    let (_, _, public_key) = services.custody.root_signing_key();
    let request = test::TestRequest::post()
        .uri("/api/sign")
        .set_json(json!({ "signedRequest": signed, "publicKey": public_key }))
        .to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(response).await;
    assert_eq!(body["error"], "malformed_request");
    assert_eq!(services.custody.submitted_count(), 0);
}

#[actix_web::test]
async fn test_sign_requires_public_key() {
    let services = services();
    let app = app!(services);
    let (org, key_id, _) = services.custody.root_signing_key();

    let unsigned = services.signing.prepare(b"unchecked", &org, &key_id).unwrap();
    let signed = SignedRequest {
        stamp: services.custody.root_stamper().stamp(&unsigned.body).unwrap(),
        body: unsigned.body,
        url: unsigned.url,
    };

    let request = test::TestRequest::post()
        .uri("/api/sign")
        .set_json(json!({ "signedRequest": signed.clone() }))
        .to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(response).await;
    assert_eq!(body["error"], "malformed_request");

    let request = test::TestRequest::post()
        .uri("/api/sign")
        .set_json(json!({ "signedRequest": signed, "publicKey": "" }))
        .to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(response).await;
    assert_eq!(body["error"], "invalid_field");

    assert_eq!(services.custody.submitted_count(), 0);
}
