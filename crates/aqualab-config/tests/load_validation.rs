// crates/aqualab-config/tests/load_validation.rs
// =============================================================================
// Module: Config Load Validation Tests
// Description: File loading limits and full-document parsing.
// Purpose: Ensure config files are bounded, UTF-8, and parsed fail-closed.
// =============================================================================

//! Config file loading limit and full-document parsing tests.

use std::fs;
use std::path::PathBuf;

use aqualab_config::ConfigError;
use aqualab_config::LabConfig;
use aqualab_config::LogSinkKind;
use aqualab_config::MAX_CONFIG_FILE_SIZE;
use aqualab_config::RoleConfirmation;
use aqualab_config::StoreType;
use tempfile::TempDir;

mod common;

use common::TestResult;
use common::assert_invalid;

const FULL_CONFIG: &str = r#"
[server]
bind = "0.0.0.0:4100"
max_body_bytes = 1048576
[server.log]
sink = "file"
path = "events.jsonl"
[server.audit]
queue_capacity = 64

[auth]
token_cache_ttl_secs = 0
token_cache_max_entries = 10
role_confirmation = "claims"

[user_directory]
base_url = "https://users.example.com/api/"
connect_timeout_ms = 500
request_timeout_ms = 1500

[store]
type = "sqlite"
path = "data/aqualab.db"
busy_timeout_ms = 2500
journal_mode = "delete"
sync_mode = "normal"

[policy]
protect_verified_samples = true
"#;

fn write_config(dir: &TempDir, bytes: &[u8]) -> Result<PathBuf, String> {
    let path = dir.path().join("aqualab.toml");
    fs::write(&path, bytes).map_err(|err| err.to_string())?;
    Ok(path)
}

#[test]
fn load_parses_every_section() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let path = write_config(&dir, FULL_CONFIG.as_bytes())?;
    let config = LabConfig::load(Some(&path)).map_err(|err| err.to_string())?;
    if config.server.bind_addr().map_err(|err| err.to_string())?.port() != 4100 {
        return Err("bind port not parsed".to_string());
    }
    if config.server.log.sink != LogSinkKind::File || config.server.audit.queue_capacity != 64 {
        return Err("server section not parsed".to_string());
    }
    if config.auth.role_confirmation != RoleConfirmation::Claims
        || config.auth.token_cache_ttl_secs != 0
    {
        return Err("auth section not parsed".to_string());
    }
    if config.user_directory.base_url() != "https://users.example.com/api" {
        return Err(format!("unexpected base url {}", config.user_directory.base_url()));
    }
    if config.store.store_type != StoreType::Sqlite {
        return Err("store type not parsed".to_string());
    }
    let sqlite = config.store.sqlite().ok_or_else(|| "missing sqlite config".to_string())?;
    if sqlite.busy_timeout_ms != 2500 || sqlite.path != PathBuf::from("data/aqualab.db") {
        return Err("sqlite config not carried over".to_string());
    }
    if !config.policy.delete_policy().protect_verified {
        return Err("policy not parsed".to_string());
    }
    Ok(())
}

#[test]
fn empty_file_uses_defaults() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let path = write_config(&dir, b"")?;
    let config = LabConfig::load(Some(&path)).map_err(|err| err.to_string())?;
    if config.server.bind != "127.0.0.1:4000" || config.server.max_body_bytes != 50 * 1024 * 1024 {
        return Err("server defaults not applied".to_string());
    }
    if config.auth.token_cache_ttl_secs != 300 || config.store.sqlite().is_some() {
        return Err("auth or store defaults not applied".to_string());
    }
    if config.policy.delete_policy().protect_verified {
        return Err("delete policy should default to permissive".to_string());
    }
    Ok(())
}

#[test]
fn load_rejects_missing_file() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let result = LabConfig::load(Some(&dir.path().join("missing.toml")));
    match result {
        Err(ConfigError::Io(_)) => Ok(()),
        other => Err(format!("expected io error, got {:?}", other.map(|_| ()))),
    }
}

#[test]
fn load_rejects_oversized_file() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let mut bytes = b"# ".to_vec();
    bytes.resize(MAX_CONFIG_FILE_SIZE + 1, b'x');
    let path = write_config(&dir, &bytes)?;
    assert_invalid(LabConfig::load(Some(&path)), "exceeds size limit")
}

#[test]
fn load_rejects_non_utf8() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let path = write_config(&dir, &[0xff, 0xfe, 0x00])?;
    assert_invalid(LabConfig::load(Some(&path)), "must be utf-8")
}

#[test]
fn load_rejects_overlong_path_component() -> TestResult {
    let path = PathBuf::from("x".repeat(300)).join("aqualab.toml");
    assert_invalid(LabConfig::load(Some(&path)), "component too long")
}

#[test]
fn from_toml_reports_parse_errors() -> TestResult {
    match LabConfig::from_toml("[server\nbind = 1") {
        Err(ConfigError::Parse(_)) => Ok(()),
        other => Err(format!("expected parse error, got {:?}", other.map(|_| ()))),
    }
}

#[test]
fn from_toml_rejects_unknown_enum_values() -> TestResult {
    match LabConfig::from_toml("[store]\ntype = \"postgres\"") {
        Err(ConfigError::Parse(_)) => Ok(()),
        other => Err(format!("expected parse error, got {:?}", other.map(|_| ()))),
    }
}
