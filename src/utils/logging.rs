// Centralized logging for the registration and signing flows
use log::{debug, error, info, warn};

use crate::custody::ActivityStatus;

pub struct LoggingHelper;

impl LoggingHelper {
    /// Log challenge issuance (never the token itself)
    pub fn log_challenge_issued(stage: &str) {
        debug!("🎟️  Issued {stage} challenge");
    }

    /// Log a rejected challenge or ceremony
    pub fn log_registration_rejected(reason: &str) {
        warn!("🚫 Passkey registration rejected: {reason}");
    }

    /// Log a registration stage transition
    pub fn log_registration_stage(stage: &str, sub_organization_id: Option<&str>) {
        match sub_organization_id {
            Some(id) => info!("🔐 Registration stage {stage} (sub-organization {id})"),
            None => info!("🔐 Registration stage {stage}"),
        }
    }

    /// Log a sub-organization left behind by a failed registration
    ///
    /// There is no automatic rollback, so this line is what out-of-band
    /// cleanup works from.
    pub fn log_orphaned_sub_organization(sub_organization_id: &str, stage: &str, reason: &str) {
        error!(
            "🧹 Orphaned sub-organization {sub_organization_id} after failure in {stage}: {reason}"
        );
    }

    /// Log a completed registration
    pub fn log_registration_complete(sub_organization_id: &str, private_key_id: &str, public_key: &str) {
        info!(
            "✅ Registered sub-organization {sub_organization_id} with key {private_key_id} ({public_key})"
        );
    }

    /// Log an activity that has to be polled
    pub fn log_activity_pending(activity_id: &str, activity_type: &str) {
        debug!("⏳ Waiting for activity {activity_id} ({activity_type})");
    }

    /// Log an activity status seen while polling
    pub fn log_activity_status(activity_id: &str, status: &ActivityStatus) {
        debug!("🔄 Activity {activity_id} is {status}");
    }

    /// Log a signing request leaving for the custody service
    pub fn log_signing_submitted(organization_id: &str, payload_len: usize) {
        info!("✍️  Submitting {payload_len}-byte payload for signing in {organization_id}");
    }

    /// Log the outcome of a signing activity
    pub fn log_signing_result(activity_id: &str, status: &ActivityStatus) {
        if matches!(status, ActivityStatus::Completed) {
            info!("✅ Signing activity {activity_id} completed");
        } else {
            warn!("❌ Signing activity {activity_id} ended with {status}");
        }
    }

    /// Log a signature that failed verification
    pub fn log_signature_rejected(activity_id: &str) {
        error!("🚨 Signature from activity {activity_id} failed verification; discarding it");
    }

    /// Log custody client configuration at startup
    pub fn log_custody_configured(base_url: &str, organization_id: &str, api_public_key: &str) {
        info!("🏦 Custody service {base_url} (organization {organization_id}, API key {api_public_key})");
    }
}
