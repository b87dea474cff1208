//! Rust projection of the `bambu_networking` plugin interface.
//!
//! The plugin's exports are `extern "C"` but traffic in C++ types:
//! `std::string` and `std::function` by value, `std::map` and `std::string`
//! by reference, structs by value. The proxy only forwards most of them, and
//! on the Itanium C++ ABI they all reduce to shapes Rust can pass through
//! untouched:
//!
//! * a class with a non-trivial copy constructor or destructor is passed "by
//!   invisible reference", so a by-value `std::string`, `std::function` or
//!   parameter struct arrives as a pointer to the caller's temporary
//!   ([`Str`], [`RawCallback`], `*const PrintParams`);
//! * references and out-parameters are plain pointers ([`OutPtr`],
//!   [`InPtr`]);
//! * a returned `std::string` is built by the callee in a slot the caller
//!   provides. [`CxxString`] has the same size, which makes Rust use the same
//!   hidden return pointer.
//!
//! Values the proxy has to create or read itself go through
//! [`bridge`](crate::bridge).

use std::ffi::{c_char, c_void};
use std::marker::{PhantomData, PhantomPinned};
use std::ptr::NonNull;

use cfg_if::cfg_if;

/// Version of the plugin this proxy was built against.
///
/// The plugin does not keep its signatures stable between releases, so any
/// other version may be ABI incompatible.
pub const EXPECTED_PLUGIN_VERSION: &str = "01.08.00.03";

/// Export queried right after loading to learn the plugin's version.
pub const VERSION_SYMBOL: &str = "bambu_network_get_version";

/// Export intercepted by the proxy.
pub const LOCAL_MESSAGE_SYMBOL: &str = "bambu_network_set_on_local_message_fn";

/// Handle to a plugin networking agent.
pub type Agent = *mut c_void;

/// By-value `std::string` argument, as a pointer to the caller's temporary.
pub type Str = *const c_void;

/// Opaque out-parameter (`std::string*`, `std::string&`, maps, vectors).
pub type OutPtr = *mut c_void;

/// Opaque by-reference input that is not a string (maps, string lists).
pub type InPtr = *const c_void;

/// By-value `std::function` argument, as a pointer to the caller's
/// temporary.
pub type RawCallback = *const c_void;

cfg_if! {
    if #[cfg(target_vendor = "apple")] {
        /// Words in a libc++ `std::string`.
        pub const CXX_STRING_WORDS: usize = 3;
    } else {
        /// Words in a libstdc++ `std::string`.
        pub const CXX_STRING_WORDS: usize = 4;
    }
}

/// Storage for a `std::string` returned by value.
///
/// Only ever produced by a call into the plugin and handed straight back to
/// the host, which owns and destroys it. The bytes are never read in Rust:
/// libstdc++ strings point into themselves, so the value must not be moved
/// either.
#[repr(C)]
pub struct CxxString {
    _repr: [usize; CXX_STRING_WORDS],
    _marker: PhantomData<PhantomPinned>,
}

/// Address of a plugin export that is only called through
/// [`bridge`](crate::bridge) because its signature has C++ types in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct CxxEntry(NonNull<c_void>);

// SAFETY: a code address; calling it is what needs care, not sharing it.
unsafe impl Send for CxxEntry {}
unsafe impl Sync for CxxEntry {}

impl CxxEntry {
    /// Wraps the address of an export.
    #[must_use]
    pub const fn new(address: NonNull<c_void>) -> Self {
        Self(address)
    }

    /// The export's address.
    #[must_use]
    pub const fn address(self) -> NonNull<c_void> {
        self.0
    }
}

/// Receives one local message from the C++ side of the bridge.
///
/// `dev_id` and `msg` point at `dev_id_len` and `msg_len` bytes that are
/// only valid for the duration of the call.
pub type DeliverFn = unsafe extern "C" fn(
    context: *mut c_void,
    dev_id: *const c_char,
    dev_id_len: usize,
    msg: *const c_char,
    msg_len: usize,
);

macro_rules! opaque_types {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[repr(C)]
            pub struct $name {
                _data: [u8; 0],
                _marker: PhantomData<(*mut u8, PhantomPinned)>,
            }
        )*
    };
}

opaque_types! {
    /// Print job parameters.
    PrintParams,
    /// Model publishing parameters.
    PublishParams,
    /// Print profile description.
    BBLProfile,
    /// Model mall sub-task.
    BBLModelTask,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem;

    #[test]
    fn test_cxx_string_matches_bridge() {
        assert_eq!(mem::size_of::<CxxString>(), crate::bridge::cxx_string_size());
        assert!(mem::size_of::<CxxString>() > 2 * mem::size_of::<usize>());
    }
}
