// HTTP request handlers for registration and signing
pub mod health;
pub mod register;
pub mod sign;

use actix_web::{error::InternalError, web};

use crate::utils::responses::ResponseBuilder;

pub use health::health;
pub use register::{complete_registration, registration_challenge};
pub use sign::{prepare_signing, sign};

/// Register every route the service exposes
///
/// Expects `web::Data<RegistrationOrchestrator>` and `web::Data<SigningProxy>`
/// in app data.
///
/// [`RegistrationOrchestrator`]: crate::registration::RegistrationOrchestrator
/// [`SigningProxy`]: crate::signing::SigningProxy
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        // Registration endpoints
        .route("/api/register", web::get().to(registration_challenge))
        .route("/api/register", web::post().to(complete_registration))
        // Signing endpoints
        .route("/api/sign/prepare", web::post().to(prepare_signing))
        .route("/api/sign", web::post().to(sign))
        // Health endpoint
        .route("/ping", web::get().to(health));
}

/// Bodies that do not deserialize get the same error shape as everything else
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let response = ResponseBuilder::bad_request()
            .with_error_code("malformed_request")
            .with_message("Request body does not match the expected JSON shape")
            .build();
        InternalError::from_response(err, response).into()
    })
}
