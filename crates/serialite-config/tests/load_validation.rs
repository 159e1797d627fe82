//! Config load validation tests for serialite-config.
// crates/serialite-config/tests/load_validation.rs
// =============================================================================
// Module: Config Load Validation Tests
// Description: Validate config loading guards (path, size, encoding, limits).
// Purpose: Ensure config input handling is strict and fail-closed.
// =============================================================================

use std::io::Write;
use std::path::Path;

use serialite_config::BridgeConfig;
use serialite_config::ConfigError;
use serialite_config::DEFAULT_PREPARE_BACKOFF_STEP_US;
use serialite_config::DEFAULT_PREPARE_MAX_RETRIES;
use serialite_config::OpenMode;
use tempfile::NamedTempFile;

type TestResult = Result<(), String>;

fn assert_invalid(result: Result<BridgeConfig, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config load".to_string()),
    }
}

fn write_config(contents: &[u8]) -> Result<NamedTempFile, String> {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(contents).map_err(|err| err.to_string())?;
    Ok(file)
}

#[test]
fn load_rejects_path_too_long() -> TestResult {
    let long_path = "a".repeat(5_000);
    let path = Path::new(&long_path);
    assert_invalid(BridgeConfig::load(Some(path)), "config path exceeds max length")
}

#[test]
fn load_rejects_path_component_too_long() -> TestResult {
    let long_component = "a".repeat(300);
    let path = Path::new(&long_component);
    assert_invalid(BridgeConfig::load(Some(path)), "config path component too long")
}

#[test]
fn load_rejects_oversized_file() -> TestResult {
    let file = write_config(&vec![b'a'; 1_048_577])?;
    assert_invalid(BridgeConfig::load(Some(file.path())), "config file exceeds size limit")
}

#[test]
fn load_rejects_non_utf8_file() -> TestResult {
    let file = write_config(&[0xFF, 0xFE, 0xFF])?;
    assert_invalid(BridgeConfig::load(Some(file.path())), "config file must be utf-8")
}

#[test]
fn load_rejects_unknown_keys() -> TestResult {
    let file = write_config(b"[prepare]\nmax_retry = 3\n")?;
    assert_invalid(BridgeConfig::load(Some(file.path())), "config parse error")
}

#[test]
fn empty_file_yields_defaults() -> TestResult {
    let file = write_config(b"")?;
    let config = BridgeConfig::load(Some(file.path())).map_err(|err| err.to_string())?;
    if config != BridgeConfig::default() {
        return Err(format!("expected defaults, got {config:?}"));
    }
    if config.prepare.max_retries != DEFAULT_PREPARE_MAX_RETRIES
        || config.prepare.backoff_step_us != DEFAULT_PREPARE_BACKOFF_STEP_US
    {
        return Err("prepare defaults drifted".to_string());
    }
    Ok(())
}

#[test]
fn full_file_round_trips_every_section() -> TestResult {
    let file = write_config(
        br#"
[worker]
thread_name_prefix = "db"
stack_size_bytes = 262144

[prepare]
max_retries = 5
backoff_step_us = 10

[engine]
busy_timeout_ms = 250
open_mode = "read_only"
max_path_bytes = 1024

[logging]
filter = "serialite=debug"
ansi = true
"#,
    )?;
    let config = BridgeConfig::load(Some(file.path())).map_err(|err| err.to_string())?;
    if config.worker.thread_name_prefix != "db" || config.worker.stack_size_bytes != Some(262_144)
    {
        return Err(format!("worker section not applied: {:?}", config.worker));
    }
    if config.prepare.max_retries != 5 || config.prepare.backoff_step_us != 10 {
        return Err(format!("prepare section not applied: {:?}", config.prepare));
    }
    if config.engine.open_mode != OpenMode::ReadOnly || config.engine.busy_timeout_ms != 250 {
        return Err(format!("engine section not applied: {:?}", config.engine));
    }
    if config.logging.filter != "serialite=debug" || !config.logging.ansi {
        return Err(format!("logging section not applied: {:?}", config.logging));
    }
    Ok(())
}

#[test]
fn validate_rejects_excessive_retries() -> TestResult {
    assert_invalid(
        BridgeConfig::from_toml_str("[prepare]\nmax_retries = 10001\n"),
        "prepare.max_retries out of range",
    )
}

#[test]
fn validate_rejects_empty_thread_prefix() -> TestResult {
    assert_invalid(
        BridgeConfig::from_toml_str("[worker]\nthread_name_prefix = \"  \"\n"),
        "worker.thread_name_prefix must be non-empty",
    )
}

#[test]
fn validate_rejects_tiny_stack() -> TestResult {
    assert_invalid(
        BridgeConfig::from_toml_str("[worker]\nstack_size_bytes = 1024\n"),
        "worker.stack_size_bytes must be at least",
    )
}

#[test]
fn validate_rejects_zero_path_limit() -> TestResult {
    assert_invalid(
        BridgeConfig::from_toml_str("[engine]\nmax_path_bytes = 0\n"),
        "engine.max_path_bytes out of range",
    )
}

#[test]
fn validate_rejects_empty_log_filter() -> TestResult {
    assert_invalid(
        BridgeConfig::from_toml_str("[logging]\nfilter = \"\"\n"),
        "logging.filter must be non-empty",
    )
}
