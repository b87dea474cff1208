//! # `bswhp`
//!
//! Installs and configures the Bambu Studio networking webhook proxy. Use
//! `bswhp --help` for more information.

fn main() -> bswhp_cli::CrateResult {
    bswhp_cli::run()
}
