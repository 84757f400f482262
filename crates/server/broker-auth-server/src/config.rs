//! Configuration for the broker auth server
//!
//! Sources, lowest precedence first:
//! - Built-in defaults
//! - Configuration file (`broker-auth.toml`, or the path in `BROKER_AUTH_CONFIG_FILE`)
//! - Environment variables with the `BROKER_AUTH` prefix, e.g. `BROKER_AUTH__SERVER__PORT`
//! - Legacy variables (`AUTHENTICATION_CHECK_ENDPOINT`, `TOKEN_VALIDATION_REGEX`, `HOST`,
//!   `PORT`, `RUST_LOG`)

use anyhow::{Context, Result};
use broker_identity_local::HasherConfig;
use broker_identity_mongo::MongoStoreConfig;
use broker_identity_session::{CALLS_UNDER_LEASE, ReconcilerConfig};
use broker_identity_verifier::VerifierConfig;
use config::{Config as ConfigBuilder, Environment, File};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub verifier: VerifierSettings,
    pub reconciler: ReconcilerSettings,
    pub hasher: HasherSettings,
    pub token: TokenSettings,
    pub backend: BackendSettings,
    pub logging: LoggingConfig,
}

/// Server network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to (default: 0.0.0.0)
    pub host: IpAddr,

    /// Port to bind to (default: 8085)
    pub port: u16,

    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Whether to allow any origin (default: true)
    pub allow_any_origin: bool,

    /// Specific allowed origins (only used if allow_any_origin is false)
    pub allowed_origins: Vec<String>,
}

/// Identity provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierSettings {
    /// Token check endpoint. Required.
    pub authentication_check_endpoint: String,

    pub http_timeout_seconds: u64,

    /// Header the token is forwarded in
    pub token_header: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerSettings {
    pub call_timeout_ms: u64,
    pub lease_ttl_ms: u64,
    pub lease_wait_ms: u64,
    pub lease_poll_interval_ms: u64,
}

/// Argon2 cost parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HasherSettings {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenSettings {
    /// Tokens not matching this pattern are refused without contacting the
    /// identity provider. Unset disables the check.
    pub validation_regex: Option<String>,
}

/// Where sessions and broker credential records are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process cache and store. State is lost on restart.
    #[default]
    Memory,
    /// Redis session cache and MongoDB credential store.
    External,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub kind: BackendKind,
    pub redis_url: String,
    pub mongodb_uri: String,
    pub mongodb_database: String,
    /// Collection read by the broker's auth plugin
    pub mongodb_collection: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter string
    pub level: String,

    /// Log format (pretty, compact)
    pub format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            port: 8085,
            cors: CorsConfig::default(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_any_origin: true,
            allowed_origins: vec![],
        }
    }
}

impl Default for VerifierSettings {
    fn default() -> Self {
        let defaults = VerifierConfig::new("");
        Self {
            authentication_check_endpoint: defaults.authentication_check_endpoint,
            http_timeout_seconds: defaults.http_timeout_seconds,
            token_header: defaults.token_header,
        }
    }
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        let defaults = ReconcilerConfig::default();
        Self {
            call_timeout_ms: defaults.call_timeout.as_millis() as u64,
            lease_ttl_ms: defaults.lease_ttl.as_millis() as u64,
            lease_wait_ms: defaults.lease_wait.as_millis() as u64,
            lease_poll_interval_ms: defaults.lease_poll_interval.as_millis() as u64,
        }
    }
}

impl Default for HasherSettings {
    fn default() -> Self {
        let defaults = HasherConfig::default();
        Self {
            memory_kib: defaults.memory_kib,
            iterations: defaults.iterations,
            parallelism: defaults.parallelism,
        }
    }
}

impl Default for BackendSettings {
    fn default() -> Self {
        let mongo = MongoStoreConfig::default();
        Self {
            kind: BackendKind::default(),
            redis_url: "redis://localhost:6379".to_string(),
            mongodb_uri: mongo.uri,
            mongodb_database: mongo.database,
            mongodb_collection: mongo.collection,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("BROKER_AUTH_CONFIG_FILE")
            .unwrap_or_else(|_| "broker-auth.toml".to_string());
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &str) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if Path::new(config_path).exists() {
            info!("Loading configuration from {}", config_path);
            builder = builder.add_source(File::with_name(config_path));
        } else {
            debug!("No config file found at {}, using defaults", config_path);
        }

        builder = builder.add_source(
            Environment::with_prefix("BROKER_AUTH")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut settings: Config = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        settings.apply_env_overrides()?;
        settings.validate()?;

        Ok(settings)
    }

    /// Variables from older deployments that don't follow the prefix scheme.
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(endpoint) = std::env::var("AUTHENTICATION_CHECK_ENDPOINT") {
            info!("Using AUTHENTICATION_CHECK_ENDPOINT environment variable");
            self.verifier.authentication_check_endpoint = endpoint;
        }

        if let Ok(pattern) = std::env::var("TOKEN_VALIDATION_REGEX") {
            info!("Using TOKEN_VALIDATION_REGEX environment variable");
            self.token.validation_regex = Some(pattern).filter(|p| !p.is_empty());
        }

        if let Ok(host) = std::env::var("HOST") {
            info!("Using HOST environment variable");
            self.server.host = host.parse().context("Invalid HOST value")?;
        }

        if let Ok(port) = std::env::var("PORT") {
            info!("Using PORT environment variable");
            self.server.port = port.parse().context("Invalid PORT value")?;
        }

        if let Ok(log_level) = std::env::var("RUST_LOG") {
            self.logging.level = log_level;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.verifier.authentication_check_endpoint.is_empty() {
            anyhow::bail!("verifier.authentication_check_endpoint must be set");
        }
        let endpoint = url::Url::parse(&self.verifier.authentication_check_endpoint)
            .context("verifier.authentication_check_endpoint is not a valid URL")?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            anyhow::bail!(
                "verifier.authentication_check_endpoint must be http or https, got '{}'",
                endpoint.scheme()
            );
        }

        if self.verifier.http_timeout_seconds == 0 {
            anyhow::bail!("verifier.http_timeout_seconds must be positive");
        }
        if self.verifier.token_header.is_empty() {
            anyhow::bail!("verifier.token_header cannot be empty");
        }

        let reconciler = &self.reconciler;
        if reconciler.call_timeout_ms == 0
            || reconciler.lease_ttl_ms == 0
            || reconciler.lease_poll_interval_ms == 0
        {
            anyhow::bail!("Reconciler timeouts and intervals must be positive");
        }
        if reconciler.lease_wait_ms < reconciler.lease_poll_interval_ms {
            anyhow::bail!("reconciler.lease_wait_ms cannot be shorter than the poll interval");
        }
        let min_lease_ttl_ms =
            u64::from(CALLS_UNDER_LEASE).saturating_mul(reconciler.call_timeout_ms);
        if reconciler.lease_ttl_ms < min_lease_ttl_ms {
            anyhow::bail!(
                "reconciler.lease_ttl_ms must be at least {} ({} calls of call_timeout_ms), got {}",
                min_lease_ttl_ms,
                CALLS_UNDER_LEASE,
                reconciler.lease_ttl_ms
            );
        }

        if let Some(pattern) = &self.token.validation_regex {
            Regex::new(pattern).context("token.validation_regex does not compile")?;
        }

        if self.backend.kind == BackendKind::External {
            self.validate_external_backend()?;
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        let level_lower = self.logging.level.to_lowercase();
        if !self.is_filter_string() && !valid_levels.contains(&level_lower.as_str()) {
            anyhow::bail!(
                "Invalid log level '{}'. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            );
        }

        let valid_formats = ["pretty", "compact"];
        let format_lower = self.logging.format.to_lowercase();
        if !valid_formats.contains(&format_lower.as_str()) {
            anyhow::bail!(
                "Invalid log format '{}'. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            );
        }

        if !self.server.cors.allow_any_origin && self.server.cors.allowed_origins.is_empty() {
            anyhow::bail!("CORS: If allow_any_origin is false, allowed_origins must be specified");
        }

        Ok(())
    }

    fn validate_external_backend(&self) -> Result<()> {
        let backend = &self.backend;

        let redis_url =
            url::Url::parse(&backend.redis_url).context("backend.redis_url is not a valid URL")?;
        if !matches!(redis_url.scheme(), "redis" | "rediss") {
            anyhow::bail!(
                "backend.redis_url must be redis or rediss, got '{}'",
                redis_url.scheme()
            );
        }

        if !(backend.mongodb_uri.starts_with("mongodb://")
            || backend.mongodb_uri.starts_with("mongodb+srv://"))
        {
            anyhow::bail!("backend.mongodb_uri must start with mongodb:// or mongodb+srv://");
        }
        if backend.mongodb_database.is_empty() || backend.mongodb_collection.is_empty() {
            anyhow::bail!("backend.mongodb_database and backend.mongodb_collection must be set");
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((self.server.host, self.server.port))
    }

    fn is_filter_string(&self) -> bool {
        self.logging.level.contains('=') || self.logging.level.contains(',')
    }

    /// Filter string for tracing
    pub fn log_filter(&self) -> String {
        if self.is_filter_string() {
            self.logging.level.clone()
        } else {
            format!(
                "broker_auth_server={level},broker_identity_session={level},{level}",
                level = self.logging.level
            )
        }
    }

    pub fn verifier_config(&self) -> VerifierConfig {
        VerifierConfig::new(self.verifier.authentication_check_endpoint.clone())
            .with_http_timeout(self.verifier.http_timeout_seconds)
            .with_token_header(self.verifier.token_header.clone())
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        let settings = &self.reconciler;
        ReconcilerConfig::new()
            .with_call_timeout(Duration::from_millis(settings.call_timeout_ms))
            .with_lease_ttl(Duration::from_millis(settings.lease_ttl_ms))
            .with_lease_wait(
                Duration::from_millis(settings.lease_wait_ms),
                Duration::from_millis(settings.lease_poll_interval_ms),
            )
    }

    pub fn hasher_config(&self) -> HasherConfig {
        HasherConfig {
            memory_kib: self.hasher.memory_kib,
            iterations: self.hasher.iterations,
            parallelism: self.hasher.parallelism,
        }
    }

    pub fn mongo_store_config(&self) -> MongoStoreConfig {
        MongoStoreConfig::new(self.backend.mongodb_uri.clone())
            .with_database(self.backend.mongodb_database.clone())
            .with_collection(self.backend.mongodb_collection.clone())
    }

    pub fn token_pattern(&self) -> Result<Option<Regex>> {
        self.token
            .validation_regex
            .as_deref()
            .map(|pattern| Regex::new(pattern).context("token.validation_regex does not compile"))
            .transpose()
    }
}
