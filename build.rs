//! The build script for the proxy.
//! Compiles the C++ bridge that creates and reads the `std::string` and
//! `std::function` values crossing the plugin's exports.

use std::{
    env,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

/// Words in a `std::string` of the target's default C++ runtime. Must agree
/// with `abi::CXX_STRING_WORDS`; the bridge asserts it at compile time.
fn cxx_string_words() -> Result<&'static str> {
    let vendor = env::var("CARGO_CFG_TARGET_VENDOR").context("Failed to get the target vendor")?;
    Ok(if vendor == "apple" { "3" } else { "4" })
}

/// Builds the bridge library.
fn build_bridge(manifest: &Path) -> Result<()> {
    let bridge = manifest.join("src").join("bridge");
    cc::Build::new()
        .cpp(true)
        .std("c++17")
        .define("BSWHP_CXX_STRING_WORDS", cxx_string_words()?)
        .include(&bridge)
        .file(bridge.join("bridge.cpp"))
        .try_compile("bswhp_bridge")
        .context("Failed to compile the C++ bridge")?;
    Ok(())
}

fn main() -> Result<()> {
    let manifest: PathBuf = env::var_os("CARGO_MANIFEST_DIR")
        .context("Failed to get CARGO_MANIFEST_DIR")?
        .into();
    for path in [
        manifest.join("src").join("bridge").join("bridge.h"),
        manifest.join("src").join("bridge").join("bridge.cpp"),
    ] {
        println!("cargo:rerun-if-changed={}", path.to_string_lossy());
    }
    println!("cargo:rerun-if-changed=build.rs");

    // The plugin tests compile their fixture for the same target.
    let target = env::var("TARGET").context("Failed to get TARGET")?;
    println!("cargo:rustc-env=BSWHP_BUILD_TARGET={target}");

    build_bridge(&manifest)
}
