//! Error and result types returned by the proxy.

use std::path::PathBuf;

/// The main result type which is passed by the proxy.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The main error type which is passed by the proxy.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The user profile directory could not be determined, so neither the
    /// plugin nor the settings files can be located.
    #[error("unable to determine the user profile directory (set BSWHP_PROFILE_DIR or HOME)")]
    ProfileDirUnavailable,
    /// The real plugin image could not be loaded.
    #[error("failed to load plugin library {}", path.display())]
    LibraryLoad {
        /// Path that was passed to the dynamic loader.
        path: PathBuf,
        /// Loader error.
        #[source]
        source: libloading::Error,
    },
    /// The plugin does not export the requested entry point, or exports it as
    /// a null address.
    #[error("symbol `{name}` not found in plugin library")]
    SymbolNotFound {
        /// Name of the missing export.
        name: String,
        /// Loader error, if the lookup itself failed.
        #[source]
        source: Option<libloading::Error>,
    },
    /// The plugin reported a version other than the one the proxy was built
    /// against and the compatibility policy is strict.
    #[error("unexpected plugin version {found:?} (expected {expected:?})")]
    VersionMismatch {
        /// Version the proxy was built against.
        expected: &'static str,
        /// Version the plugin reported.
        found: String,
    },
    /// A C++ exception was thrown across the plugin boundary and caught by
    /// the bridge.
    #[error("C++ exception thrown by {call}")]
    CxxException {
        /// What was being called.
        call: &'static str,
    },
    /// A settings file contains a value that cannot be parsed.
    #[error("invalid value {value:?} for setting `{setting}`")]
    InvalidSetting {
        /// Setting name.
        setting: &'static str,
        /// Offending value.
        value: String,
    },
    /// The webhook request failed.
    #[error("webhook request failed")]
    Webhook(#[from] ureq::Error),
    /// Filesystem error while reading or writing settings.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
