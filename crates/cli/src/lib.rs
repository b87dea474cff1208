#![doc = include_str!("../README.md")]

use anyhow::{Context, Result as AResult, bail};
use bambu_networking::config::{self, DebugLevel, ProxyConfig, Setting};
use bambu_networking::exports::{FORWARDED_SYMBOLS, INTERCEPTED_SYMBOLS};
use bambu_networking::loader::{PluginLibrary, SymbolSource, VersionCheck, VersionPolicy};
use bambu_networking::{abi, logging};
use clap::Parser;
use dialoguer::Confirm;

use std::{
    fs,
    path::{Path, PathBuf},
};

/// Result type returned from the [`run`] function.
pub type CrateResult = AResult<()>;

/// Runs the CLI application. Returns nothing in a result on success.
///
/// # Errors
///
/// Returns an error if the application fails to run.
pub fn run() -> CrateResult {
    logging::init(DebugLevel::Silent);
    Args::parse().handle()
}

#[derive(Parser)]
#[clap(
    about = "Installs and configures the Bambu Studio networking webhook proxy.",
    version = env!("CARGO_PKG_VERSION")
)]
enum Args {
    /// Installs the proxy in a Bambu Studio profile.
    ///
    /// The real plugin is renamed to `o_<plugin>` the first time, and the
    /// proxy is copied in under the plugin's name. Installing again replaces
    /// the proxy and leaves the real plugin alone.
    Install(Install),
    /// Removes the proxy and puts the real plugin back in place.
    Remove(Remove),
    /// Writes proxy settings and prints the effective configuration.
    Config(Config),
    /// Loads the real plugin and checks that it exports everything the proxy
    /// forwards.
    Check(Check),
}

#[derive(Parser)]
struct Install {
    /// Path to the built proxy library.
    #[arg(long)]
    proxy: PathBuf,
    /// Bambu Studio profile directory. Defaults to `BSWHP_PROFILE_DIR`, then
    /// the platform data directory.
    #[arg(long)]
    profile_dir: Option<PathBuf>,
    /// Whether to bypass the install prompt.
    #[clap(long)]
    yes: bool,
}

#[derive(Parser)]
struct Remove {
    /// Bambu Studio profile directory.
    #[arg(long)]
    profile_dir: Option<PathBuf>,
    /// Whether to bypass the remove prompt.
    #[clap(long)]
    yes: bool,
}

#[derive(Parser)]
struct Config {
    /// Bambu Studio profile directory.
    #[arg(long)]
    profile_dir: Option<PathBuf>,
    /// Webhook URL to POST local messages to.
    #[arg(long, conflicts_with = "clear_url")]
    url: Option<String>,
    /// Disables webhook notifications.
    #[arg(long)]
    clear_url: bool,
    /// Debug level: 0 is silent, 1 logs messages, 2 traces every call.
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=2))]
    debug: Option<u8>,
    /// What to do when the real plugin reports an unexpected version.
    #[arg(long, value_parser = ["permissive", "strict"])]
    policy: Option<String>,
    /// Bound on each webhook request, in milliseconds.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    timeout_ms: Option<u64>,
}

#[derive(Parser)]
struct Check {
    /// Bambu Studio profile directory.
    #[arg(long)]
    profile_dir: Option<PathBuf>,
}

impl Args {
    pub fn handle(self) -> CrateResult {
        match self {
            Args::Install(install) => install.handle(),
            Args::Remove(remove) => remove.handle(),
            Args::Config(config) => config.handle(),
            Args::Check(check) => check.handle(),
        }
    }
}

/// Resolves the profile directory from the command line or the environment.
fn resolve_profile_dir(profile_dir: Option<PathBuf>) -> AResult<PathBuf> {
    match profile_dir {
        Some(dir) => Ok(dir),
        None => config::profile_dir().context("Failed to locate the Bambu Studio profile"),
    }
}

/// Where the plugin and the proxy live inside a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginLayout {
    /// File the host loads: the real plugin before installation, the proxy
    /// after.
    pub live: PathBuf,
    /// File the real plugin is moved to.
    pub original: PathBuf,
}

impl PluginLayout {
    /// Layout of the plugin directory in `profile_dir`.
    #[must_use]
    pub fn new(profile_dir: &Path) -> Self {
        let plugins = profile_dir.join(config::PLUGIN_DIR_NAME);
        Self {
            live: plugins.join(config::plugin_file_name()),
            original: plugins.join(config::original_plugin_file_name()),
        }
    }

    /// Whether the real plugin has already been moved aside.
    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.original.is_file()
    }
}

/// Installs `proxy` into `layout`.
///
/// # Errors
///
/// Returns an error if neither the real plugin nor a previous installation is
/// present, or if a file operation fails.
pub fn install_proxy(layout: &PluginLayout, proxy: &Path) -> CrateResult {
    if !proxy.is_file() {
        bail!("Proxy library not found at {}", proxy.display());
    }

    if !layout.is_installed() {
        if !layout.live.is_file() {
            bail!(
                "No networking plugin found at {}. Install the plugin from Bambu Studio first.",
                layout.live.display()
            );
        }
        fs::rename(&layout.live, &layout.original)
            .with_context(|| "Failed to move the real plugin aside")?;
    }

    // Copy next to the target, then rename, so the host never loads a
    // partially written library.
    let temp_path = layout
        .live
        .with_extension(format!("tmp.{}", std::process::id()));
    fs::copy(proxy, &temp_path).with_context(|| "Failed to copy the proxy library")?;

    if let Err(e) = fs::rename(&temp_path, &layout.live) {
        let _ = fs::remove_file(&temp_path);
        return Err(e).with_context(|| "Failed to move the proxy library into place");
    }

    Ok(())
}

/// Removes the proxy from `layout` and restores the real plugin.
///
/// # Errors
///
/// Returns an error if the proxy is not installed or a file operation fails.
pub fn restore_plugin(layout: &PluginLayout) -> CrateResult {
    if !layout.is_installed() {
        bail!("Unable to find the proxy installed.");
    }

    if layout.live.exists() {
        fs::remove_file(&layout.live).with_context(|| "Failed to remove the proxy library")?;
    }
    fs::rename(&layout.original, &layout.live)
        .with_context(|| "Failed to restore the real plugin")?;

    Ok(())
}

/// Names of exports the proxy needs that `source` does not provide.
#[must_use]
pub fn missing_symbols(source: &dyn SymbolSource) -> Vec<&'static str> {
    INTERCEPTED_SYMBOLS
        .iter()
        .chain(FORWARDED_SYMBOLS)
        .copied()
        .filter(|name| source.symbol(name).is_err())
        .collect()
}

impl Install {
    pub fn handle(self) -> CrateResult {
        let profile_dir = resolve_profile_dir(self.profile_dir)?;
        let layout = PluginLayout::new(&profile_dir);

        let prompt = if layout.is_installed() {
            format!(
                "The proxy is already installed. Replace it at `{}`?",
                layout.live.display()
            )
        } else {
            format!(
                "Are you sure you want to install the proxy at `{}`?",
                layout.live.display()
            )
        };
        if !self.yes && !Confirm::new().with_prompt(prompt).interact()? {
            bail!("Installation cancelled.");
        }

        install_proxy(&layout, &self.proxy)?;
        println!(
            "Installed the proxy. The real plugin is at `{}`.",
            layout.original.display()
        );
        Ok(())
    }
}

impl Remove {
    pub fn handle(self) -> CrateResult {
        let profile_dir = resolve_profile_dir(self.profile_dir)?;
        let layout = PluginLayout::new(&profile_dir);

        if !self.yes
            && !Confirm::new()
                .with_prompt(format!(
                    "Are you sure you want to remove the proxy from `{}`?",
                    layout.live.display()
                ))
                .interact()?
        {
            bail!("Removal cancelled.");
        }

        restore_plugin(&layout)?;
        println!("Restored the real plugin.");
        Ok(())
    }
}

impl Config {
    pub fn handle(self) -> CrateResult {
        let profile_dir = resolve_profile_dir(self.profile_dir)?;
        fs::create_dir_all(&profile_dir).with_context(|| {
            format!(
                "Failed to create profile directory at {}",
                profile_dir.display()
            )
        })?;

        let write = |setting: Setting, value: Option<&str>| {
            config::write_setting(&profile_dir, setting, value)
                .with_context(|| format!("Failed to write `{}`", setting.file_name()))
        };

        if let Some(url) = &self.url {
            write(Setting::WebhookUrl, Some(url.as_str()))?;
        } else if self.clear_url {
            write(Setting::WebhookUrl, None)?;
        }
        if let Some(debug) = self.debug {
            write(Setting::DebugLevel, Some(debug.to_string().as_str()))?;
        }
        if let Some(policy) = &self.policy {
            write(Setting::VersionPolicy, Some(policy.as_str()))?;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            write(Setting::WebhookTimeout, Some(timeout_ms.to_string().as_str()))?;
        }

        print!("{}", render_config(&ProxyConfig::load(&profile_dir)));
        Ok(())
    }
}

/// Formats the effective configuration, one `key = value` per line.
#[must_use]
pub fn render_config(config: &ProxyConfig) -> String {
    format!(
        "profile_dir = {}\n\
         plugin = {}\n\
         webhook_url = {}\n\
         webhook_timeout_ms = {}\n\
         debug_level = {}\n\
         version_policy = {}\n",
        config.profile_dir.display(),
        config.plugin_path.display(),
        config.webhook.url.as_deref().unwrap_or("(disabled)"),
        config.webhook.timeout.as_millis(),
        config.debug_level,
        config.version_policy,
    )
}

impl Check {
    pub fn handle(self) -> CrateResult {
        let profile_dir = resolve_profile_dir(self.profile_dir)?;
        let plugin_path = config::plugin_path(&profile_dir);

        let plugin = PluginLibrary::open(&plugin_path, VersionPolicy::Permissive)
            .with_context(|| format!("Failed to load {}", plugin_path.display()))?;

        match plugin.version() {
            VersionCheck::Matched => {
                println!("Plugin version {} matches.", abi::EXPECTED_PLUGIN_VERSION);
            }
            VersionCheck::Mismatched { found } => println!(
                "Plugin version {found:?} differs from {:?}; forwarded signatures may not match.",
                abi::EXPECTED_PLUGIN_VERSION
            ),
        }

        let missing = missing_symbols(&plugin);
        if !missing.is_empty() {
            for name in &missing {
                println!("missing: {name}");
            }
            bail!(
                "{} of {} symbols are missing from {}",
                missing.len(),
                INTERCEPTED_SYMBOLS.len() + FORWARDED_SYMBOLS.len(),
                plugin_path.display()
            );
        }

        println!(
            "All {} symbols are exported.",
            INTERCEPTED_SYMBOLS.len() + FORWARDED_SYMBOLS.len()
        );
        Ok(())
    }
}
