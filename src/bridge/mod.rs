//! Calls that need C++ on the other side.
//!
//! `std::string` and `std::function` values cannot be built or read from
//! Rust. `bridge.cpp`, compiled by the build script with the same C++
//! runtime as the plugin, does that work and exposes plain C entry points,
//! which this module wraps. Every C++ exception is caught on that side and
//! comes back as [`Error::CxxException`].

mod ffi;

use std::ffi::{c_char, c_int, c_void};
use std::fmt;
use std::ptr::{self, NonNull};
use std::slice;

use log::warn;

use crate::abi::{Agent, CxxEntry, DeliverFn};
use crate::error::{Error, Result};
use crate::interceptor::{Message, Subscriber};

unsafe extern "C" fn collect_bytes(sink: *mut c_void, data: *const c_char, len: usize) {
    // SAFETY: `sink` is the `Vec` passed to `bswhp_read_version` below.
    let sink = unsafe { &mut *sink.cast::<Vec<u8>>() };
    if !data.is_null() {
        sink.extend_from_slice(unsafe { slice::from_raw_parts(data.cast::<u8>(), len) });
    }
}

/// Calls `std::string get_version()` and returns the string's bytes.
///
/// # Errors
///
/// Returns [`Error::CxxException`] if the call throws.
///
/// # Safety
///
/// `get_version` must be the address of a function with that signature.
pub unsafe fn read_version(get_version: NonNull<c_void>) -> Result<Vec<u8>> {
    let mut version = Vec::new();
    let status = unsafe {
        ffi::bswhp_read_version(
            get_version.as_ptr(),
            ptr::from_mut(&mut version).cast(),
            collect_bytes,
        )
    };
    if status == 0 {
        Ok(version)
    } else {
        Err(Error::CxxException {
            call: "bambu_network_get_version",
        })
    }
}

/// Registers `deliver` as the plugin's local message callback.
///
/// The plugin is handed a `std::function` that calls `deliver` with
/// `context` and the bytes of each message. Returns the plugin's result.
///
/// # Errors
///
/// Returns [`Error::CxxException`] if the plugin throws.
///
/// # Safety
///
/// `set_on_local_message` must be
/// `int (*)(void *, std::function<void(std::string, std::string)>)` and
/// `agent` must be valid for it. `deliver` must tolerate being called with
/// `context` from any thread until it is replaced.
pub unsafe fn install_local_message_fn(
    set_on_local_message: CxxEntry,
    agent: Agent,
    deliver: DeliverFn,
    context: *mut c_void,
) -> Result<c_int> {
    let mut result = 0;
    let status = unsafe {
        ffi::bswhp_install_local_message_fn(
            set_on_local_message.address().as_ptr(),
            agent,
            deliver,
            context,
            &raw mut result,
        )
    };
    if status == 0 {
        Ok(result)
    } else {
        Err(Error::CxxException {
            call: "bambu_network_set_on_local_message_fn",
        })
    }
}

/// Size of `std::string` in the C++ runtime the bridge was built with.
#[must_use]
pub fn cxx_string_size() -> usize {
    unsafe { ffi::bswhp_cxx_string_size() }
}

/// The host's `std::function<void(std::string, std::string)>`, moved to
/// the heap.
pub struct HostCallback {
    raw: NonNull<c_void>,
}

// SAFETY: the host's callback is registered to be called from the plugin's
// network threads, and it is only ever invoked through `&self`.
unsafe impl Send for HostCallback {}
unsafe impl Sync for HostCallback {}

impl HostCallback {
    /// Takes ownership of the callback behind `callback`, leaving an empty
    /// function in its place. Returns `None` for a null pointer or an empty
    /// function.
    ///
    /// # Safety
    ///
    /// `callback` must be null or point at a live
    /// `std::function<void(std::string, std::string)>` the caller is allowed
    /// to move from, such as a by-value parameter.
    #[must_use]
    pub unsafe fn take(callback: *mut c_void) -> Option<Self> {
        NonNull::new(unsafe { ffi::bswhp_host_callback_take(callback) }).map(|raw| Self { raw })
    }

    /// Calls the host with a copy of `device_id` and `payload`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CxxException`] if the host throws.
    pub fn invoke(&self, device_id: &[u8], payload: &[u8]) -> Result<()> {
        let status = unsafe {
            ffi::bswhp_host_callback_invoke(
                self.raw.as_ptr(),
                device_id.as_ptr().cast(),
                device_id.len(),
                payload.as_ptr().cast(),
                payload.len(),
            )
        };
        if status == 0 {
            Ok(())
        } else {
            Err(Error::CxxException {
                call: "local message callback",
            })
        }
    }
}

impl Subscriber for HostCallback {
    fn receive(&self, message: &Message<'_>) {
        if let Err(e) = self.invoke(message.device_id_bytes(), message.payload()) {
            warn!("{e} for message from {}", message.device_id());
        }
    }
}

impl Drop for HostCallback {
    fn drop(&mut self) {
        unsafe { ffi::bswhp_host_callback_release(self.raw.as_ptr()) }
    }
}

impl fmt::Debug for HostCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HostCallback").field(&self.raw).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_callback_is_none() {
        assert!(unsafe { HostCallback::take(ptr::null_mut()) }.is_none());
    }
}
