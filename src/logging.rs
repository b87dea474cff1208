//! Logger installation.

use log::LevelFilter;

use crate::config::DebugLevel;

impl DebugLevel {
    /// Log level filter corresponding to this verbosity.
    #[must_use]
    pub fn level_filter(self) -> LevelFilter {
        match self {
            DebugLevel::Silent => LevelFilter::Off,
            DebugLevel::Basic => LevelFilter::Info,
            DebugLevel::Verbose => LevelFilter::Trace,
        }
    }
}

/// Installs the proxy's logger at `level`.
///
/// `RUST_LOG` overrides the level when set. If the host process already
/// installed a `log` logger it is left in place and only the maximum level
/// is raised.
pub fn init(level: DebugLevel) {
    let filter = level.level_filter();
    let installed = env_logger::Builder::new()
        .filter_level(filter)
        .parse_default_env()
        .format_target(false)
        .try_init();

    if installed.is_err() && log::max_level() < filter {
        log::set_max_level(filter);
    }

    log::info!("debug level {level}");
}
