#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use passkey_custody::{
    ceremony::ClientDataVerifier,
    challenge::ChallengeToken,
    custody::{ApiKeyStamper, CustodyClient, HttpCustodyClient},
    handlers,
    registration::{RegistrationConfig, RegistrationOrchestrator},
    settings::AppSettings,
    signing::SigningProxy,
    utils::logging::LoggingHelper,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load configuration from Settings.toml and environment variables
    // This also loads .env file and initializes the logger
    let settings = AppSettings::load()
        .map_err(|e| std::io::Error::other(format!("Failed to load settings: {e}")))?;
    settings
        .validate()
        .map_err(|e| std::io::Error::other(format!("Invalid settings: {e:#}")))?;

    start_server(settings).await
}

/// Start the server
///
/// # Errors
///
/// Returns an error if:
/// - The custody client or challenge key cannot be built from settings
/// - Server binding fails
/// - Server fails to start
async fn start_server(settings: AppSettings) -> std::io::Result<()> {
    let bind_address = settings.get_bind_address();

    let stamper = Arc::new(
        ApiKeyStamper::from_key_pair(&settings.custody.api_private_key, &settings.custody.api_public_key)
            .map_err(|e| std::io::Error::other(format!("Failed to load custody API key: {e}")))?,
    );
    let custody: Arc<dyn CustodyClient> = Arc::new(
        HttpCustodyClient::new(
            &settings.custody.base_url,
            stamper.clone(),
            settings.custody.poll_policy().deadline,
        )
            .map_err(|e| std::io::Error::other(format!("Failed to build custody client: {e}")))?,
    );
    LoggingHelper::log_custody_configured(
        &settings.custody.base_url,
        &settings.custody.organization_id,
        &settings.custody.api_public_key,
    );

    let challenge_key = settings
        .challenge
        .key()
        .map_err(|e| std::io::Error::other(format!("{e:#}")))?;
    let challenges = ChallengeToken::new(challenge_key, settings.challenge.timeout());
    let verifier = Arc::new(
        ClientDataVerifier::new(&settings.passkey.rp_id, &settings.passkey.rp_origin)
            .require_user_verification(settings.passkey.require_user_verification),
    );

    let orchestrator = web::Data::new(RegistrationOrchestrator::new(
        RegistrationConfig::from_settings(&settings),
        challenges,
        custody.clone(),
        verifier,
    ));
    let signing = web::Data::new(SigningProxy::new(
        custody,
        stamper,
        settings.custody.poll_policy(),
    ));

    print_startup_info(&bind_address, &settings);

    // Configure CORS for the browser client
    let cors_origins = settings.get_cors_origins();

    HttpServer::new(move || {
        let cors_origins = cors_origins.clone();
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _| {
                cors_origins
                    .iter()
                    .any(|allowed| allowed == origin.to_str().unwrap_or(""))
            })
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec!["Content-Type", "Accept"])
            .max_age(3600);

        App::new()
            .app_data(orchestrator.clone())
            .app_data(signing.clone())
            .wrap(cors)
            .wrap(Logger::default())
            .configure(handlers::configure)
    })
    .bind(&bind_address)?
    .run()
    .await
}

fn print_startup_info(bind_address: &str, settings: &AppSettings) {
    println!(
        "Starting Passkey Custody {} on http://{bind_address}",
        passkey_custody::VERSION
    );
    println!(
        "Relying party: {} - {} ({})",
        settings.passkey.rp_name, settings.passkey.rp_id, settings.passkey.rp_origin
    );
    println!("Custody service: {}", settings.custody.base_url);
    println!();
    println!("Registration endpoints:");
    println!("  GET  /api/register       - Issue a registration challenge");
    println!("  POST /api/register       - Verify a passkey and provision its wallet");
    println!();
    println!("Signing endpoints:");
    println!("  POST /api/sign/prepare   - Build a signing request for the passkey to stamp");
    println!("  POST /api/sign           - Forward a stamped request and return the signature");
    println!();
    println!("System endpoints:");
    println!("  GET  /ping               - Health check");
}
