//! Process-wide proxy state.
//!
//! The host gives the proxy no initialisation hook, so the state is built
//! on the first call into any export: configuration is read, logging is
//! installed, and the real plugin is loaded the first time a symbol is
//! needed. Conditions that leave the proxy unable to forward anything are
//! fatal.

use std::process;

use log::error;
use once_cell::sync::OnceCell;

use crate::config::ProxyConfig;
use crate::error::{Error, Result};
use crate::interceptor::MessageInterceptor;
use crate::loader::PluginLibrary;
use crate::logging;
use crate::symbol::SymbolSlot;
use crate::webhook::WebhookDispatcher;

static RUNTIME: OnceCell<Runtime> = OnceCell::new();

/// State shared by every export.
#[derive(Debug)]
pub struct Runtime {
    config: ProxyConfig,
    library: OnceCell<PluginLibrary>,
    interceptor: MessageInterceptor<WebhookDispatcher>,
}

impl Runtime {
    /// Creates the state for `config`. The plugin is not loaded yet.
    #[must_use]
    pub fn new(config: ProxyConfig) -> Self {
        let interceptor = MessageInterceptor::new(WebhookDispatcher::new(&config.webhook));
        Self {
            config,
            library: OnceCell::new(),
            interceptor,
        }
    }

    /// Configuration the runtime was built with.
    #[must_use]
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// The real plugin, loaded on first use.
    ///
    /// # Errors
    ///
    /// Returns any error from [`PluginLibrary::open`].
    pub fn library(&self) -> Result<&PluginLibrary> {
        self.library.get_or_try_init(|| {
            PluginLibrary::open(&self.config.plugin_path, self.config.version_policy)
        })
    }

    /// Interceptor for the local message callback.
    #[must_use]
    pub fn interceptor(&self) -> &MessageInterceptor<WebhookDispatcher> {
        &self.interceptor
    }
}

/// Returns the process runtime, creating it on first use.
///
/// Terminates the process if the profile directory cannot be determined.
pub fn get() -> &'static Runtime {
    RUNTIME.get_or_init(|| {
        let config = ProxyConfig::from_environment().unwrap_or_else(|e| fatal(&e));
        logging::init(config.debug_level);
        log::info!(
            "proxy {} for plugin {}",
            crate::VERSION,
            config.plugin_path.display()
        );
        if let Some(url) = &config.webhook.url {
            log::info!("webhook url: {url}");
        }
        Runtime::new(config)
    })
}

/// Returns `slot`'s entry point from the real plugin.
///
/// Terminates the process if the plugin cannot be loaded or does not export
/// the symbol; an export cannot report either condition to the host.
///
/// # Safety
///
/// `F` must be the export's real function pointer type.
pub unsafe fn resolve<F: Copy>(slot: &SymbolSlot<F>) -> F {
    let runtime = get();
    let resolved = runtime
        .library()
        .and_then(|library| unsafe { slot.resolve(library) });
    resolved.unwrap_or_else(|e| fatal(&e))
}

/// Reports `err` and exits the process.
pub fn fatal(err: &Error) -> ! {
    error!("{err}");
    eprintln!("bswhp: fatal: {err}");
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        eprintln!("    caused by: {cause}");
        source = cause.source();
    }
    process::exit(1)
}
