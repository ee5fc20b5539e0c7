// crates/aqualab-config/src/config.rs
// ============================================================================
// Module: AquaLab Configuration
// Description: Configuration loading and validation for the lab service.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: aqualab-core, aqualab-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Every section has defaults, so an empty file is a valid local setup;
//! values that are present are validated and rejected when inconsistent.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use aqualab_core::DeletePolicy;
use aqualab_store_sqlite::SqliteStoreConfig;
use aqualab_store_sqlite::SqliteStoreMode;
use aqualab_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "aqualab.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "AQUALAB_CONFIG";
/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Upper bound for the audit queue.
const MAX_AUDIT_QUEUE_CAPACITY: usize = 65_536;
/// Upper bound for the token cache TTL (one day).
const MAX_TOKEN_CACHE_TTL_SECS: u64 = 86_400;
/// Upper bound for any outbound timeout.
const MAX_TIMEOUT_MS: u64 = 120_000;

// ============================================================================
// SECTION: Root
// ============================================================================

/// Root configuration for the lab service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LabConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Token resolution configuration.
    #[serde(default)]
    pub auth: AuthConfig,
    /// External user directory configuration.
    #[serde(default)]
    pub user_directory: UserDirectoryConfig,
    /// Persistence backend configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Lifecycle policy configuration.
    #[serde(default)]
    pub policy: PolicyConfig,
}

impl LabConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// The path comes from `path`, then [`CONFIG_ENV_VAR`], then
    /// `./aqualab.toml`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| {
            ConfigError::Io(format!("{}: {err}", resolved.display()))
        })?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(content)
    }

    /// Parses and validates configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] when validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.auth.validate()?;
        self.user_directory.validate()?;
        self.store.validate()?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Service event log configuration.
    #[serde(default)]
    pub log: ServerLogConfig,
    /// Audit pipeline configuration.
    #[serde(default)]
    pub audit: ServerAuditConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
            log: ServerLogConfig::default(),
            audit: ServerAuditConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Returns the parsed bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the address does not parse.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let bind = self.bind.trim();
        if bind.is_empty() {
            return Err(ConfigError::Invalid("server.bind must be set".to_string()));
        }
        bind.parse().map_err(|_| ConfigError::Invalid(format!("invalid bind address: {bind}")))
    }

    /// Validates server configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_body_bytes must be greater than zero".to_string(),
            ));
        }
        self.log.validate()?;
        self.audit.validate()
    }
}

/// Destination for service events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogSinkKind {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to a file.
    File,
    /// Discard events.
    #[serde(rename = "none")]
    Disabled,
}

/// Service event log configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerLogConfig {
    /// Sink kind.
    #[serde(default)]
    pub sink: LogSinkKind,
    /// Log file path for the file sink.
    #[serde(default)]
    pub path: Option<String>,
}

impl ServerLogConfig {
    /// Validates log configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (LogSinkKind::File, None) => {
                Err(ConfigError::Invalid("file log sink requires server.log.path".to_string()))
            }
            (LogSinkKind::File, Some(path)) => validate_path_string("server.log.path", path),
            (_, Some(_)) => Err(ConfigError::Invalid(
                "server.log.path is only valid with the file sink".to_string(),
            )),
            (_, None) => Ok(()),
        }
    }
}

/// Audit pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerAuditConfig {
    /// Bounded queue capacity between requests and the audit worker.
    #[serde(default = "default_audit_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for ServerAuditConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_audit_queue_capacity(),
        }
    }
}

impl ServerAuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 || self.queue_capacity > MAX_AUDIT_QUEUE_CAPACITY {
            return Err(ConfigError::Invalid(format!(
                "server.audit.queue_capacity must be between 1 and {MAX_AUDIT_QUEUE_CAPACITY}"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Auth
// ============================================================================

/// How a decoded token's role is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoleConfirmation {
    /// Ask the user directory to confirm the user and role.
    #[default]
    Directory,
    /// Trust the token claims.
    Claims,
}

/// Token resolution configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Seconds a resolved token stays cached; zero disables caching.
    #[serde(default = "default_token_cache_ttl_secs")]
    pub token_cache_ttl_secs: u64,
    /// Maximum cached tokens.
    #[serde(default = "default_token_cache_max_entries")]
    pub token_cache_max_entries: usize,
    /// Role confirmation mode.
    #[serde(default)]
    pub role_confirmation: RoleConfirmation,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_cache_ttl_secs: default_token_cache_ttl_secs(),
            token_cache_max_entries: default_token_cache_max_entries(),
            role_confirmation: RoleConfirmation::default(),
        }
    }
}

impl AuthConfig {
    /// Validates auth configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.token_cache_ttl_secs > MAX_TOKEN_CACHE_TTL_SECS {
            return Err(ConfigError::Invalid(format!(
                "auth.token_cache_ttl_secs must not exceed {MAX_TOKEN_CACHE_TTL_SECS}"
            )));
        }
        if self.token_cache_max_entries == 0 {
            return Err(ConfigError::Invalid(
                "auth.token_cache_max_entries must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: User Directory
// ============================================================================

/// External user directory configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UserDirectoryConfig {
    /// Base URL of the directory API.
    #[serde(default = "default_directory_base_url")]
    pub base_url: String,
    /// Connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Total request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for UserDirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: default_directory_base_url(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl UserDirectoryConfig {
    /// Returns the base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url.trim().trim_end_matches('/')
    }

    /// Validates directory configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let base = self.base_url();
        let rest = base
            .strip_prefix("http://")
            .or_else(|| base.strip_prefix("https://"))
            .ok_or_else(|| {
                ConfigError::Invalid("user_directory.base_url must be http or https".to_string())
            })?;
        if rest.is_empty() || rest.starts_with('/') {
            return Err(ConfigError::Invalid("user_directory.base_url must include a host".to_string()));
        }
        for (field, value) in [
            ("user_directory.connect_timeout_ms", self.connect_timeout_ms),
            ("user_directory.request_timeout_ms", self.request_timeout_ms),
        ] {
            if value == 0 || value > MAX_TIMEOUT_MS {
                return Err(ConfigError::Invalid(format!(
                    "{field} must be between 1 and {MAX_TIMEOUT_MS}"
                )));
            }
        }
        if self.connect_timeout_ms > self.request_timeout_ms {
            return Err(ConfigError::Invalid(
                "user_directory.connect_timeout_ms must not exceed request_timeout_ms".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Persistence backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// Use the in-memory store.
    #[default]
    Memory,
    /// Use `SQLite`-backed durable store.
    Sqlite,
}

/// Persistence backend configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Store backend type.
    #[serde(rename = "type", default)]
    pub store_type: StoreType,
    /// `SQLite` database path when using the sqlite backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_store_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::default(),
            path: None,
            busy_timeout_ms: default_store_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl StoreConfig {
    /// Returns the `SQLite` store configuration for the sqlite backend.
    #[must_use]
    pub fn sqlite(&self) -> Option<SqliteStoreConfig> {
        match (self.store_type, &self.path) {
            (StoreType::Sqlite, Some(path)) => Some(SqliteStoreConfig {
                path: path.clone(),
                busy_timeout_ms: self.busy_timeout_ms,
                journal_mode: self.journal_mode,
                sync_mode: self.sync_mode,
            }),
            _ => None,
        }
    }

    /// Validates store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.store_type {
            StoreType::Memory => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid("memory store must not set path".to_string()));
                }
                Ok(())
            }
            StoreType::Sqlite => {
                let path = self.path.as_ref().ok_or_else(|| {
                    ConfigError::Invalid("sqlite store requires path".to_string())
                })?;
                validate_path_string("store.path", &path.to_string_lossy())?;
                if self.busy_timeout_ms == 0 {
                    return Err(ConfigError::Invalid(
                        "store.busy_timeout_ms must be greater than zero".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Lifecycle policy configuration.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PolicyConfig {
    /// Refuse to delete samples in state `Verificada`.
    #[serde(default)]
    pub protect_verified_samples: bool,
}

impl PolicyConfig {
    /// Returns the sample delete policy.
    #[must_use]
    pub const fn delete_policy(self) -> DeletePolicy {
        DeletePolicy {
            protect_verified: self.protect_verified_samples,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default bind address.
fn default_bind() -> String {
    "127.0.0.1:4000".to_string()
}

/// Default request body limit; signatures travel inline.
const fn default_max_body_bytes() -> usize {
    50 * 1024 * 1024
}

/// Default audit queue capacity.
const fn default_audit_queue_capacity() -> usize {
    1024
}

/// Default token cache TTL.
const fn default_token_cache_ttl_secs() -> u64 {
    300
}

/// Default token cache bound.
const fn default_token_cache_max_entries() -> usize {
    10_000
}

/// Default directory base URL.
fn default_directory_base_url() -> String {
    "http://localhost:5000/api".to_string()
}

/// Default directory connect timeout.
const fn default_connect_timeout_ms() -> u64 {
    2_000
}

/// Default directory request timeout.
const fn default_request_timeout_ms() -> u64 {
    5_000
}

/// Default `SQLite` busy timeout.
const fn default_store_busy_timeout_ms() -> u64 {
    5_000
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        let component_value = component.as_os_str().to_string_lossy();
        if component_value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}
