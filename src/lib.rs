//! Drop-in replacement for Bambu Studio's `bambu_networking` plugin.
//!
//! The proxy is installed under the plugin's file name and loads the real
//! plugin from `o_<name>` next to it. Every export is forwarded unchanged
//! except `bambu_network_set_on_local_message_fn`: messages delivered to the
//! callback registered there are first POSTed to a webhook, then handed to
//! the host's callback.
//!
//! Printers in LAN mode accept only one working MQTT connection, which Bambu
//! Studio holds; relaying its local messages is how other tools get to see
//! printer status.
//!
//! # Settings
//!
//! Plain text files in the Bambu Studio profile directory (see
//! [`config`]): `bswhp_url.txt` holds the webhook URL, `bswhp_debug.txt` the
//! debug level (`0`, `1` or `2`).
//!
//! The proxy must be built for the plugin version it wraps,
//! [`abi::EXPECTED_PLUGIN_VERSION`]; other versions are reported and, under
//! the default policy, used anyway.
#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic)]

pub mod abi;
pub mod bridge;
pub mod config;
pub mod error;
#[macro_use]
pub mod macros;
pub mod exports;
pub mod interceptor;
pub mod loader;
pub mod logging;
pub mod runtime;
pub mod symbol;
pub mod webhook;

/// Commonly used types.
pub mod prelude {
    pub use crate::config::{DebugLevel, ProxyConfig, WebhookConfig};
    pub use crate::error::{Error, Result};
    pub use crate::interceptor::{
        CallbackSlot, Message, MessageInterceptor, Notifier, Subscriber,
    };
    pub use crate::loader::{PluginLibrary, SymbolSource, VersionCheck, VersionPolicy};
    pub use crate::symbol::SymbolSlot;
    pub use crate::webhook::WebhookDispatcher;
}

/// Proxy version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
