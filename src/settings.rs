use std::fs;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::challenge::DEFAULT_CHALLENGE_TIMEOUT_MS;
use crate::custody::{ApiKeyStamper, PollPolicy};
use crate::utils::crypto::{generate_encryption_key, parse_encryption_key, ENCRYPTION_KEY_SIZE};
use crate::utils::encoding::to_hex;

const SECRETS_DIR_ENV: &str = "PASSKEY_CUSTODY_SECRETS_DIR";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppSettings {
    pub application: ApplicationSettings,
    pub challenge: ChallengeSettings,
    pub passkey: PasskeySettings,
    pub custody: CustodySettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    pub cors_origins: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChallengeSettings {
    /// Hex-encoded AES-256 key sealing challenge tokens
    pub encryption_key: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PasskeySettings {
    pub rp_id: String,
    pub rp_name: String,
    pub rp_origin: String,
    pub require_user_verification: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CustodySettings {
    pub base_url: String,
    /// Parent organization that owns the per-user sub-organizations
    pub organization_id: String,
    /// Compressed P-256 public key, hex
    pub api_public_key: String,
    /// P-256 private scalar, hex
    pub api_private_key: String,
    pub sub_organization_prefix: String,
    pub poll_interval_ms: u64,
    pub poll_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: "http://localhost:3000,http://localhost:8080".to_string(),
        }
    }
}

impl Default for ChallengeSettings {
    fn default() -> Self {
        Self {
            encryption_key: String::new(), // Will be generated if empty
            timeout_ms: DEFAULT_CHALLENGE_TIMEOUT_MS,
        }
    }
}

impl Default for PasskeySettings {
    fn default() -> Self {
        Self {
            rp_id: "localhost".to_string(),
            rp_name: "Solana Passkeys".to_string(),
            rp_origin: "http://localhost:8080".to_string(),
            require_user_verification: true,
        }
    }
}

impl Default for CustodySettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.turnkey.com".to_string(),
            organization_id: String::new(),
            api_public_key: String::new(),
            api_private_key: String::new(),
            sub_organization_prefix: "Passkey Wallet".to_string(),
            poll_interval_ms: 250,
            poll_timeout_seconds: 30,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ChallengeSettings {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Decode the configured token key
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not 32 hex-encoded bytes
    pub fn key(&self) -> anyhow::Result<[u8; ENCRYPTION_KEY_SIZE]> {
        parse_encryption_key(&self.encryption_key).context("Invalid challenge encryption key")
    }
}

impl LoggingSettings {
    /// Logger filtered by `level`, which uses `RUST_LOG` syntax
    #[must_use]
    pub fn logger(&self) -> env_logger::Builder {
        let mut builder = env_logger::Builder::new();
        builder.parse_filters(&self.level);
        builder
    }
}

impl CustodySettings {
    #[must_use]
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(
            Duration::from_millis(self.poll_interval_ms),
            Duration::from_secs(self.poll_timeout_seconds),
        )
    }
}

impl AppSettings {
    /// Load settings from configuration files and environment variables
    ///
    /// The logger is installed last, at the resolved `logging.level`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Settings file cannot be read or parsed
    /// - Logger initialization fails
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Self::load_env_file();

        let mut settings = Self::load_base_settings()?;
        Self::apply_env_overrides(&mut settings);
        settings.logging.logger().try_init()?;

        Ok(settings)
    }

    /// Load base settings from TOML file(s) or use defaults
    /// Settings are loaded with the following priority (highest to lowest):
    /// 1. Environment variables (applied separately after loading base settings)
    /// 2. Settings.toml in `PASSKEY_CUSTODY_SECRETS_DIR` (if specified and exists)
    /// 3. Settings.toml in current directory (if exists)
    /// 4. Default settings
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Settings file cannot be read
    /// - TOML parsing fails
    fn load_base_settings() -> Result<Self, Box<dyn std::error::Error>> {
        let mut settings = Self::default();

        let default_config_path = std::path::PathBuf::from("Settings.toml");
        if default_config_path.exists() {
            let toml_content = fs::read_to_string(&default_config_path)?;
            settings = basic_toml::from_str(&toml_content)?;
            println!("✓ Loaded base settings from {}", default_config_path.display());
        }

        if let Ok(secrets_dir) = std::env::var(SECRETS_DIR_ENV) {
            let secrets_path = std::path::Path::new(&secrets_dir).join("Settings.toml");
            if secrets_path.exists() {
                let secrets_toml_content = fs::read_to_string(&secrets_path)?;
                settings = basic_toml::from_str(&secrets_toml_content)?;
                println!("✓ Overriding settings from {}", secrets_path.display());
            } else {
                println!(
                    "ℹ {SECRETS_DIR_ENV} set but no Settings.toml found at: {}",
                    secrets_path.display()
                );
            }
        }

        Ok(settings)
    }

    /// Apply environment variable overrides to settings
    pub fn apply_env_overrides(settings: &mut Self) {
        Self::apply_application_env_overrides(&mut settings.application);
        Self::apply_challenge_env_overrides(&mut settings.challenge);
        Self::apply_passkey_env_overrides(&mut settings.passkey);
        Self::apply_custody_env_overrides(&mut settings.custody);
        Self::apply_logging_env_overrides(&mut settings.logging);
    }

    fn apply_application_env_overrides(app_settings: &mut ApplicationSettings) {
        Self::apply_string_env_override("HOST", &mut app_settings.host);
        if let Ok(port_str) = std::env::var("PORT") {
            if let Ok(port) = port_str.parse::<u16>() {
                app_settings.port = port;
            }
        }
        Self::apply_string_env_override("CORS_ORIGINS", &mut app_settings.cors_origins);
    }

    /// Apply challenge overrides, generating a key when none is configured
    pub fn apply_challenge_env_overrides(challenge_settings: &mut ChallengeSettings) {
        Self::apply_string_env_override("ENCRYPTION_PRIVATE_KEY", &mut challenge_settings.encryption_key);
        Self::apply_numeric_env_override("CHALLENGE_TIMEOUT_MS", &mut challenge_settings.timeout_ms);

        if challenge_settings.encryption_key.is_empty() {
            challenge_settings.encryption_key = to_hex(&generate_encryption_key());
            Self::warn_about_generated_key();
        }
    }

    fn apply_passkey_env_overrides(passkey_settings: &mut PasskeySettings) {
        Self::apply_string_env_override("RP_ID", &mut passkey_settings.rp_id);
        Self::apply_string_env_override("RP_NAME", &mut passkey_settings.rp_name);
        Self::apply_string_env_override("RP_ORIGIN", &mut passkey_settings.rp_origin);
    }

    fn apply_custody_env_overrides(custody_settings: &mut CustodySettings) {
        Self::apply_string_env_override("CUSTODY_API_BASE_URL", &mut custody_settings.base_url);
        Self::apply_string_env_override("CUSTODY_ORGANIZATION_ID", &mut custody_settings.organization_id);
        Self::apply_string_env_override("CUSTODY_API_PUBLIC_KEY", &mut custody_settings.api_public_key);
        Self::apply_string_env_override("CUSTODY_API_PRIVATE_KEY", &mut custody_settings.api_private_key);
        Self::apply_numeric_env_override("POLL_INTERVAL_MS", &mut custody_settings.poll_interval_ms);
        Self::apply_numeric_env_override("POLL_TIMEOUT_SECONDS", &mut custody_settings.poll_timeout_seconds);
    }

    fn apply_logging_env_overrides(logging_settings: &mut LoggingSettings) {
        Self::apply_string_env_override("RUST_LOG", &mut logging_settings.level);
    }

    /// Non-empty environment values replace the target
    fn apply_string_env_override(env_var: &str, target: &mut String) {
        if let Ok(value) = std::env::var(env_var) {
            if !value.is_empty() {
                *target = value;
            }
        }
    }

    fn apply_numeric_env_override(env_var: &str, target: &mut u64) {
        if let Ok(value_str) = std::env::var(env_var) {
            if let Ok(value) = value_str.parse::<u64>() {
                *target = value;
            }
        }
    }

    fn warn_about_generated_key() {
        eprintln!("⚠️  WARNING: Using auto-generated challenge encryption key");
        eprintln!("🔒 For production use, set the ENCRYPTION_PRIVATE_KEY environment variable");
        eprintln!("   or configure challenge.encryption_key in Settings.toml");
        eprintln!("💡 Outstanding challenges become invalid on every restart unless explicitly configured");
    }

    /// Load environment variables from .env file
    fn load_env_file() {
        if let Ok(contents) = std::fs::read_to_string(".env") {
            for line in contents.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    std::env::set_var(key.trim(), value.trim());
                }
            }
        }
    }

    /// Reject configurations the service cannot run with
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting
    pub fn validate(&self) -> anyhow::Result<()> {
        self.challenge.key()?;
        if self.challenge.timeout_ms == 0 {
            bail!("challenge.timeout_ms must be positive");
        }

        let origin = Url::parse(&self.passkey.rp_origin)
            .with_context(|| format!("Invalid relying party origin: {}", self.passkey.rp_origin))?;
        let host = origin
            .host_str()
            .ok_or_else(|| anyhow!("Relying party origin has no host"))?;
        let rp_id = self.passkey.rp_id.as_str();
        if host != rp_id && !host.ends_with(&format!(".{rp_id}")) {
            bail!("RP ID {rp_id} is not a registrable suffix of origin host {host}");
        }

        Url::parse(&self.custody.base_url)
            .with_context(|| format!("Invalid custody base URL: {}", self.custody.base_url))?;
        if self.custody.organization_id.is_empty() {
            bail!("custody.organization_id is required");
        }
        ApiKeyStamper::from_key_pair(&self.custody.api_private_key, &self.custody.api_public_key)
            .context("Invalid custody API key pair")?;
        if self.custody.poll_interval_ms == 0 || self.custody.poll_timeout_seconds == 0 {
            bail!("custody polling interval and timeout must be positive");
        }

        Ok(())
    }

    /// Get the bind address for the server
    #[must_use]
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }

    /// Get CORS origins as a vector of strings
    #[must_use]
    pub fn get_cors_origins(&self) -> Vec<String> {
        self.application
            .cors_origins
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}
