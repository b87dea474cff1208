//! Loading of the real plugin image and its version check.

use std::ffi::c_void;
use std::fmt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::str::FromStr;

use cfg_if::cfg_if;
use libloading::Library;
use log::{info, warn};

use crate::abi::{EXPECTED_PLUGIN_VERSION, VERSION_SYMBOL};
use crate::bridge;
use crate::error::{Error, Result};

/// Something exported entry points can be looked up in.
///
/// Implemented by [`PluginLibrary`]; tests substitute their own sources.
pub trait SymbolSource: Send + Sync {
    /// Returns the address of the export `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SymbolNotFound`] if there is no such export. A null
    /// address is never returned.
    fn symbol(&self, name: &str) -> Result<NonNull<c_void>>;

    /// Calls the `std::string` version export and returns its bytes.
    ///
    /// # Errors
    ///
    /// * [`Error::SymbolNotFound`] if the version export is missing.
    /// * [`Error::CxxException`] if it throws.
    fn plugin_version(&self) -> Result<Vec<u8>> {
        let get_version = self.symbol(VERSION_SYMBOL)?;
        // SAFETY: the plugin exports `std::string bambu_network_get_version()`.
        unsafe { bridge::read_version(get_version) }
    }
}

/// What to do when the plugin reports an unexpected version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VersionPolicy {
    /// Warn and keep going.
    #[default]
    Permissive,
    /// Refuse to load the plugin.
    Strict,
}

impl FromStr for VersionPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "permissive" => Ok(Self::Permissive),
            "strict" => Ok(Self::Strict),
            _ => Err(Error::InvalidSetting {
                setting: "version_policy",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for VersionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Permissive => "permissive",
            Self::Strict => "strict",
        })
    }
}

/// Outcome of the version check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionCheck {
    /// The plugin reported [`EXPECTED_PLUGIN_VERSION`].
    Matched,
    /// The plugin reported something else and the policy let it through.
    Mismatched {
        /// Version string reported by the plugin.
        found: String,
    },
}

/// Calls the plugin's version export and applies `policy` to the result.
///
/// The comparison is byte-for-byte. A mismatch under
/// [`VersionPolicy::Permissive`] logs one warning.
///
/// # Errors
///
/// * Any error from [`SymbolSource::plugin_version`].
/// * [`Error::VersionMismatch`] on a mismatch under [`VersionPolicy::Strict`].
pub fn verify_version(source: &dyn SymbolSource, policy: VersionPolicy) -> Result<VersionCheck> {
    let found = source.plugin_version()?;

    if found == EXPECTED_PLUGIN_VERSION.as_bytes() {
        info!("matched plugin version {EXPECTED_PLUGIN_VERSION}");
        return Ok(VersionCheck::Matched);
    }

    let found = String::from_utf8_lossy(&found).into_owned();
    match policy {
        VersionPolicy::Permissive => {
            warn!(
                "unexpected plugin version {found:?} (expected {EXPECTED_PLUGIN_VERSION:?}); \
                 signatures may not match"
            );
            Ok(VersionCheck::Mismatched { found })
        }
        VersionPolicy::Strict => Err(Error::VersionMismatch {
            expected: EXPECTED_PLUGIN_VERSION,
            found,
        }),
    }
}

/// The real plugin image.
///
/// Once opened it is kept for the lifetime of the process; entry points
/// handed out by [`symbol`](SymbolSource::symbol) stay valid as long as the
/// library is alive.
pub struct PluginLibrary {
    path: PathBuf,
    library: Library,
    version: VersionCheck,
}

impl PluginLibrary {
    /// Loads the plugin at `path` and checks its version.
    ///
    /// # Errors
    ///
    /// * [`Error::LibraryLoad`] if the dynamic loader rejects the image.
    /// * Any error from [`verify_version`].
    pub fn open(path: &Path, policy: VersionPolicy) -> Result<Self> {
        info!("loading plugin {}", path.display());

        let library = Self::load(path).map_err(|source| Error::LibraryLoad {
            path: path.to_path_buf(),
            source,
        })?;

        let mut plugin = Self {
            path: path.to_path_buf(),
            library,
            version: VersionCheck::Matched,
        };
        plugin.version = verify_version(&plugin, policy)?;
        Ok(plugin)
    }

    fn load(path: &Path) -> Result<Library, libloading::Error> {
        cfg_if! {
            if #[cfg(target_os = "macos")] {
                use libloading::os::unix::{Library as UnixLibrary, RTLD_LAZY, RTLD_LOCAL};
                // RTLD_FIRST keeps lookups on the handle to the plugin image
                // itself.
                // SAFETY: loading runs the plugin's initialisers; the path is
                // the operator-installed plugin.
                unsafe {
                    UnixLibrary::open(Some(path), RTLD_LAZY | RTLD_LOCAL | libc::RTLD_FIRST)
                }
                .map(Library::from)
            } else if #[cfg(unix)] {
                use libloading::os::unix::{Library as UnixLibrary, RTLD_LAZY, RTLD_LOCAL};
                // SAFETY: as above.
                unsafe { UnixLibrary::open(Some(path), RTLD_LAZY | RTLD_LOCAL) }.map(Library::from)
            } else {
                // SAFETY: as above.
                unsafe { Library::new(path) }
            }
        }
    }

    /// Path the plugin was loaded from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Result of the version check run when the plugin was opened.
    #[must_use]
    pub fn version(&self) -> &VersionCheck {
        &self.version
    }
}

impl SymbolSource for PluginLibrary {
    fn symbol(&self, name: &str) -> Result<NonNull<c_void>> {
        log::trace!("looking up {name}");
        // SAFETY: the address is only read out here, it is not called.
        let address = unsafe { self.library.get::<*mut c_void>(name.as_bytes()) }
            .map(|symbol| *symbol)
            .map_err(|source| Error::SymbolNotFound {
                name: name.to_string(),
                source: Some(source),
            })?;

        NonNull::new(address).ok_or_else(|| Error::SymbolNotFound {
            name: name.to_string(),
            source: None,
        })
    }
}

impl fmt::Debug for PluginLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginLibrary")
            .field("path", &self.path)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}
