//! Proxy settings.
//!
//! Settings live in single-line text files in the Bambu Studio profile
//! directory. Each file is optional; only its first line is read, with
//! surrounding whitespace trimmed, and an empty value counts as absent.
//! [`ProxyConfig`] is read once and then handed to the components that need
//! it.

use std::env;
use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::fmt;
use std::fs;
use std::io;
use std::num::NonZeroU64;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::loader::VersionPolicy;

/// Environment variable overriding the profile directory.
pub const PROFILE_DIR_ENV: &str = "BSWHP_PROFILE_DIR";

/// Name of the Bambu Studio directory under the platform data directory.
pub const STUDIO_DIR_NAME: &str = "BambuStudioBeta";

/// Plugin sub-directory of the profile directory.
pub const PLUGIN_DIR_NAME: &str = "plugins";

/// Default webhook request timeout.
pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_millis(5000);

/// A settings file of the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setting {
    /// Webhook URL.
    WebhookUrl,
    /// Logging verbosity.
    DebugLevel,
    /// Version compatibility policy.
    VersionPolicy,
    /// Webhook timeout in milliseconds.
    WebhookTimeout,
}

impl Setting {
    /// Every setting, in display order.
    pub const ALL: [Setting; 4] = [
        Setting::WebhookUrl,
        Setting::DebugLevel,
        Setting::VersionPolicy,
        Setting::WebhookTimeout,
    ];

    /// File name of the setting inside the profile directory.
    #[must_use]
    pub fn file_name(self) -> &'static str {
        match self {
            Setting::WebhookUrl => "bswhp_url.txt",
            Setting::DebugLevel => "bswhp_debug.txt",
            Setting::VersionPolicy => "bswhp_version_policy.txt",
            Setting::WebhookTimeout => "bswhp_timeout_ms.txt",
        }
    }

    /// Short name used in diagnostics.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Setting::WebhookUrl => "url",
            Setting::DebugLevel => "debug",
            Setting::VersionPolicy => "version_policy",
            Setting::WebhookTimeout => "timeout_ms",
        }
    }
}

/// Logging verbosity, as written in `bswhp_debug.txt`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum DebugLevel {
    /// `0`: no output.
    #[default]
    Silent,
    /// `1`: lifecycle and message logging.
    Basic,
    /// `2`: additionally traces every forwarded call.
    Verbose,
}

impl DebugLevel {
    /// Parses the file contents. Anything but `1` or `2` is silent.
    #[must_use]
    pub fn from_setting(value: &str) -> Self {
        match value {
            "1" => Self::Basic,
            "2" => Self::Verbose,
            _ => Self::Silent,
        }
    }
}

impl fmt::Display for DebugLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Silent => "0",
            Self::Basic => "1",
            Self::Verbose => "2",
        })
    }
}

/// Webhook settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    /// Target URL; `None` disables notifications.
    pub url: Option<String>,
    /// Bound on each notification request.
    pub timeout: Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout: DEFAULT_WEBHOOK_TIMEOUT,
        }
    }
}

/// Everything the proxy needs to know about its environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Bambu Studio profile directory holding the settings files.
    pub profile_dir: PathBuf,
    /// The real plugin image.
    pub plugin_path: PathBuf,
    /// Logging verbosity.
    pub debug_level: DebugLevel,
    /// Compatibility policy applied to the plugin's version.
    pub version_policy: VersionPolicy,
    /// Webhook settings.
    pub webhook: WebhookConfig,
}

impl ProxyConfig {
    /// Reads the configuration from the current user's profile directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProfileDirUnavailable`] if the profile directory
    /// cannot be determined.
    pub fn from_environment() -> Result<Self> {
        Ok(Self::load(&profile_dir()?))
    }

    /// Reads the configuration from `profile_dir`.
    ///
    /// Missing, unreadable or invalid files fall back to their defaults.
    #[must_use]
    pub fn load(profile_dir: &Path) -> Self {
        let url = read_setting(profile_dir, Setting::WebhookUrl);
        let debug_level = read_setting(profile_dir, Setting::DebugLevel)
            .map_or(DebugLevel::Silent, |v| DebugLevel::from_setting(&v));
        let version_policy = parse_setting(profile_dir, Setting::VersionPolicy).unwrap_or_default();
        // Zero is rejected like any other invalid value.
        let timeout = parse_setting::<NonZeroU64>(profile_dir, Setting::WebhookTimeout)
            .map_or(DEFAULT_WEBHOOK_TIMEOUT, |ms| Duration::from_millis(ms.get()));

        Self {
            profile_dir: profile_dir.to_path_buf(),
            plugin_path: plugin_path(profile_dir),
            debug_level,
            version_policy,
            webhook: WebhookConfig { url, timeout },
        }
    }
}

/// Determines the Bambu Studio profile directory.
///
/// # Errors
///
/// Returns [`Error::ProfileDirUnavailable`] if neither [`PROFILE_DIR_ENV`] nor
/// the platform data directory is available.
pub fn profile_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os(PROFILE_DIR_ENV).filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    dirs::data_dir()
        .map(|data| data.join(STUDIO_DIR_NAME))
        .ok_or(Error::ProfileDirUnavailable)
}

/// File name the host loads the networking plugin from.
#[must_use]
pub fn plugin_file_name() -> String {
    format!("{DLL_PREFIX}bambu_networking{DLL_SUFFIX}")
}

/// File name the real plugin is moved to once the proxy is installed.
#[must_use]
pub fn original_plugin_file_name() -> String {
    format!("o_{}", plugin_file_name())
}

/// Path of the real plugin inside `profile_dir`.
#[must_use]
pub fn plugin_path(profile_dir: &Path) -> PathBuf {
    profile_dir
        .join(PLUGIN_DIR_NAME)
        .join(original_plugin_file_name())
}

/// Path of `setting`'s file inside `profile_dir`.
#[must_use]
pub fn setting_path(profile_dir: &Path, setting: Setting) -> PathBuf {
    profile_dir.join(setting.file_name())
}

/// Reads the trimmed first line of `setting`, `None` if absent or empty.
#[must_use]
pub fn read_setting(profile_dir: &Path, setting: Setting) -> Option<String> {
    let path = setting_path(profile_dir, setting);
    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            debug!("ignoring unreadable {}: {e}", path.display());
            return None;
        }
    };

    let value = contents.lines().next().unwrap_or_default().trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Writes `value` as the contents of `setting`'s file. `None` removes the
/// file.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file cannot be written or removed.
pub fn write_setting(profile_dir: &Path, setting: Setting, value: Option<&str>) -> Result<()> {
    let path = setting_path(profile_dir, setting);
    match value {
        Some(value) => fs::write(&path, format!("{}\n", value.trim()))?,
        None => match fs::remove_file(&path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        },
    }
    Ok(())
}

fn parse_setting<T: FromStr>(profile_dir: &Path, setting: Setting) -> Option<T> {
    let value = read_setting(profile_dir, setting)?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(
                "{}",
                Error::InvalidSetting {
                    setting: setting.key(),
                    value,
                }
            );
            None
        }
    }
}
