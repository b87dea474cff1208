//! Integration tests for reading settings from a profile directory.

#![allow(missing_docs, clippy::missing_panics_doc)]

use std::fs;
use std::time::Duration;

use bambu_networking::config::{
    DEFAULT_WEBHOOK_TIMEOUT, DebugLevel, ProxyConfig, Setting, plugin_path, read_setting,
    setting_path, write_setting,
};
use bambu_networking::loader::VersionPolicy;
use tempfile::TempDir;

fn profile() -> TempDir {
    tempfile::tempdir().expect("create profile dir")
}

#[test]
fn test_missing_files_use_defaults() {
    let dir = profile();
    let config = ProxyConfig::load(dir.path());

    assert_eq!(config.debug_level, DebugLevel::Silent);
    assert_eq!(config.webhook.url, None);
    assert_eq!(config.webhook.timeout, DEFAULT_WEBHOOK_TIMEOUT);
    assert_eq!(config.version_policy, VersionPolicy::Permissive);
    assert_eq!(config.plugin_path, plugin_path(dir.path()));
}

#[test]
fn test_first_line_is_trimmed() {
    let dir = profile();
    fs::write(
        setting_path(dir.path(), Setting::WebhookUrl),
        "  https://example.test/hook \t\nignored second line\n",
    )
    .expect("write url");
    fs::write(setting_path(dir.path(), Setting::DebugLevel), "2\r\n").expect("write debug");

    let config = ProxyConfig::load(dir.path());
    assert_eq!(config.webhook.url.as_deref(), Some("https://example.test/hook"));
    assert_eq!(config.debug_level, DebugLevel::Verbose);
}

#[test]
fn test_blank_url_disables_webhook() {
    let dir = profile();
    fs::write(setting_path(dir.path(), Setting::WebhookUrl), "   \n").expect("write url");

    assert_eq!(read_setting(dir.path(), Setting::WebhookUrl), None);
    assert_eq!(ProxyConfig::load(dir.path()).webhook.url, None);
}

#[test]
fn test_invalid_values_fall_back() {
    let dir = profile();
    fs::write(setting_path(dir.path(), Setting::DebugLevel), "verbose").expect("write debug");
    fs::write(setting_path(dir.path(), Setting::VersionPolicy), "lenient").expect("write policy");
    fs::write(setting_path(dir.path(), Setting::WebhookTimeout), "soon").expect("write timeout");

    let config = ProxyConfig::load(dir.path());
    assert_eq!(config.debug_level, DebugLevel::Silent);
    assert_eq!(config.version_policy, VersionPolicy::Permissive);
    assert_eq!(config.webhook.timeout, DEFAULT_WEBHOOK_TIMEOUT);
}

#[test]
fn test_zero_timeout_falls_back() {
    let dir = profile();
    fs::write(setting_path(dir.path(), Setting::WebhookTimeout), "0\n").expect("write timeout");

    let config = ProxyConfig::load(dir.path());
    assert_eq!(config.webhook.timeout, DEFAULT_WEBHOOK_TIMEOUT);

    fs::write(setting_path(dir.path(), Setting::WebhookTimeout), "1\n").expect("write timeout");
    assert_eq!(
        ProxyConfig::load(dir.path()).webhook.timeout,
        Duration::from_millis(1)
    );
}

#[test]
fn test_optional_settings() {
    let dir = profile();
    fs::write(setting_path(dir.path(), Setting::VersionPolicy), "strict\n").expect("write policy");
    fs::write(setting_path(dir.path(), Setting::WebhookTimeout), "1500\n").expect("write timeout");

    let config = ProxyConfig::load(dir.path());
    assert_eq!(config.version_policy, VersionPolicy::Strict);
    assert_eq!(config.webhook.timeout, Duration::from_millis(1500));
}

#[test]
fn test_write_and_clear_setting() {
    let dir = profile();

    write_setting(dir.path(), Setting::WebhookUrl, Some(" http://127.0.0.1:8123/hook "))
        .expect("write url");
    assert_eq!(
        read_setting(dir.path(), Setting::WebhookUrl).as_deref(),
        Some("http://127.0.0.1:8123/hook")
    );

    write_setting(dir.path(), Setting::WebhookUrl, None).expect("clear url");
    assert!(!setting_path(dir.path(), Setting::WebhookUrl).exists());

    // Clearing an absent setting is fine.
    write_setting(dir.path(), Setting::WebhookUrl, None).expect("clear again");
}
