//! Entry points of `bridge.cpp`, mirroring `bridge.h`.

use std::ffi::{c_char, c_int, c_void};

use crate::abi::DeliverFn;

/// Receives the bytes of a `std::string`.
pub type BytesSink = unsafe extern "C" fn(sink: *mut c_void, data: *const c_char, len: usize);

unsafe extern "C" {
    pub fn bswhp_read_version(get_version: *const c_void, sink: *mut c_void, write: BytesSink) -> c_int;

    pub fn bswhp_install_local_message_fn(
        set_on_local_message: *const c_void,
        agent: *mut c_void,
        deliver: DeliverFn,
        context: *mut c_void,
        result: *mut c_int,
    ) -> c_int;

    pub fn bswhp_host_callback_take(callback: *mut c_void) -> *mut c_void;

    pub fn bswhp_host_callback_invoke(
        callback: *const c_void,
        dev_id: *const c_char,
        dev_id_len: usize,
        msg: *const c_char,
        msg_len: usize,
    ) -> c_int;

    pub fn bswhp_host_callback_release(callback: *mut c_void);

    pub fn bswhp_cxx_string_size() -> usize;
}
