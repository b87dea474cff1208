//! The plugin surface exported to the host.
//!
//! Everything here carries the real plugin's export names, so the proxy can
//! be installed in place of `bambu_networking`. All exports but
//! [`bambu_network_set_on_local_message_fn`] are plain pass-throughs.

use std::ffi::{c_char, c_int, c_uint, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use log::error;

use crate::abi::{
    Agent, BBLModelTask, BBLProfile, CxxEntry, CxxString, InPtr, LOCAL_MESSAGE_SYMBOL, OutPtr,
    PrintParams, PublishParams, RawCallback, Str,
};
use crate::bridge::{self, HostCallback};
use crate::forward;
use crate::interceptor::{Message, Subscriber};
use crate::runtime;
use crate::symbol::SymbolSlot;

/// Exports that do more than forward.
pub const INTERCEPTED_SYMBOLS: &[&str] = &[LOCAL_MESSAGE_SYMBOL];

static SET_ON_LOCAL_MESSAGE: SymbolSlot<CxxEntry> = SymbolSlot::new(LOCAL_MESSAGE_SYMBOL);

/// Registers the host's local message callback.
///
/// The host's `std::function` is moved out of the argument and remembered,
/// replacing any earlier one, and the plugin is given the proxy's trampoline
/// instead so every message can be sent to the webhook before the host sees
/// it.
///
/// # Safety
///
/// Same contract as the real plugin's export: `agent` must come from
/// `bambu_network_create_agent` and `callback` must point at the
/// `std::function<void(std::string, std::string)>` passed by value.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn bambu_network_set_on_local_message_fn(
    agent: Agent,
    callback: *mut c_void,
) -> c_int {
    log::trace!("bambu_network_set_on_local_message_fn");

    let subscriber = unsafe { HostCallback::take(callback) }
        .map(|callback| Arc::new(callback) as Arc<dyn Subscriber>);
    unsafe { set_on_local_message(agent, subscriber) }
}

/// Makes `subscriber` the receiver of local messages for `agent` and puts
/// the trampoline in place with the plugin. Returns the plugin's result, or
/// `-1` if the plugin threw.
///
/// # Safety
///
/// `agent` must be valid for the real plugin.
pub unsafe fn set_on_local_message(agent: Agent, subscriber: Option<Arc<dyn Subscriber>>) -> c_int {
    let runtime = runtime::get();
    runtime.interceptor().register(subscriber);

    // SAFETY: the slot only holds the address; the bridge calls it with the
    // plugin's real signature.
    let target = unsafe { runtime::resolve(&SET_ON_LOCAL_MESSAGE) };
    match unsafe {
        bridge::install_local_message_fn(target, agent, on_local_message, std::ptr::null_mut())
    } {
        Ok(result) => result,
        Err(e) => {
            error!("{e}");
            -1
        }
    }
}

/// Trampoline the plugin calls, through the bridge, for each local message.
unsafe extern "C" fn on_local_message(
    _context: *mut c_void,
    dev_id: *const c_char,
    dev_id_len: usize,
    msg: *const c_char,
    msg_len: usize,
) {
    // SAFETY: the bridge passes the bytes of the plugin's two strings, which
    // live for the duration of the call.
    let message = unsafe { Message::from_raw(dev_id, dev_id_len, msg, msg_len) };
    let delivered = panic::catch_unwind(AssertUnwindSafe(|| {
        runtime::get().interceptor().deliver(&message);
    }));
    if delivered.is_err() {
        error!(
            "panic while delivering local message from {}",
            message.device_id()
        );
    }
}

forward! {
    fn bambu_network_check_debug_consistent(is_debug: bool) -> bool;
    fn bambu_network_get_version() -> CxxString;
    fn bambu_network_create_agent(log_dir: Str) -> *mut c_void;
    fn bambu_network_destroy_agent(agent: Agent) -> c_int;
    fn bambu_network_init_log(agent: Agent) -> c_int;
    fn bambu_network_set_config_dir(agent: Agent, config_dir: Str) -> c_int;
    fn bambu_network_set_cert_file(agent: Agent, folder: Str, filename: Str) -> c_int;
    fn bambu_network_set_country_code(agent: Agent, country_code: Str) -> c_int;
    fn bambu_network_start(agent: Agent) -> c_int;

    // Callback registration
    fn bambu_network_set_on_ssdp_msg_fn(agent: Agent, callback: RawCallback) -> c_int;
    fn bambu_network_set_on_user_login_fn(agent: Agent, callback: RawCallback) -> c_int;
    fn bambu_network_set_on_printer_connected_fn(agent: Agent, callback: RawCallback) -> c_int;
    fn bambu_network_set_on_server_connected_fn(agent: Agent, callback: RawCallback) -> c_int;
    fn bambu_network_set_on_http_error_fn(agent: Agent, callback: RawCallback) -> c_int;
    fn bambu_network_set_get_country_code_fn(agent: Agent, callback: RawCallback) -> c_int;
    fn bambu_network_set_on_subscribe_failure_fn(agent: Agent, callback: RawCallback) -> c_int;
    /// Cloud messages; only local messages are relayed to the webhook.
    fn bambu_network_set_on_message_fn(agent: Agent, callback: RawCallback) -> c_int;
    fn bambu_network_set_on_local_connect_fn(agent: Agent, callback: RawCallback) -> c_int;
    fn bambu_network_set_queue_on_main_fn(agent: Agent, callback: RawCallback) -> c_int;

    // Connections and messaging
    fn bambu_network_connect_server(agent: Agent) -> c_int;
    fn bambu_network_is_server_connected(agent: Agent) -> bool;
    fn bambu_network_refresh_connection(agent: Agent) -> c_int;
    fn bambu_network_start_subscribe(agent: Agent, module: Str) -> c_int;
    fn bambu_network_stop_subscribe(agent: Agent, module: Str) -> c_int;
    fn bambu_network_send_message(agent: Agent, dev_id: Str, json_str: Str, qos: c_int) -> c_int;
    fn bambu_network_connect_printer(
        agent: Agent,
        dev_id: Str,
        dev_ip: Str,
        username: Str,
        password: Str,
        use_ssl: bool,
    ) -> c_int;
    fn bambu_network_disconnect_printer(agent: Agent) -> c_int;
    fn bambu_network_send_message_to_printer(
        agent: Agent,
        dev_id: Str,
        json_str: Str,
        qos: c_int,
    ) -> c_int;
    fn bambu_network_start_discovery(agent: Agent, start: bool, sending: bool) -> bool;

    // User session
    fn bambu_network_change_user(agent: Agent, user_info: Str) -> c_int;
    fn bambu_network_is_user_login(agent: Agent) -> bool;
    fn bambu_network_user_logout(agent: Agent) -> c_int;
    fn bambu_network_get_user_id(agent: Agent) -> CxxString;
    fn bambu_network_get_user_name(agent: Agent) -> CxxString;
    fn bambu_network_get_user_avatar(agent: Agent) -> CxxString;
    fn bambu_network_get_user_nickanme(agent: Agent) -> CxxString;
    fn bambu_network_build_login_cmd(agent: Agent) -> CxxString;
    fn bambu_network_build_logout_cmd(agent: Agent) -> CxxString;
    fn bambu_network_build_login_info(agent: Agent) -> CxxString;

    // Binding
    fn bambu_network_bind(
        agent: Agent,
        dev_ip: Str,
        dev_id: Str,
        sec_link: Str,
        timezone: Str,
        improved: bool,
        update_fn: RawCallback,
    ) -> c_int;
    fn bambu_network_unbind(agent: Agent, dev_id: Str) -> c_int;
    fn bambu_network_get_bambulab_host(agent: Agent) -> CxxString;
    fn bambu_network_get_user_selected_machine(agent: Agent) -> CxxString;
    fn bambu_network_set_user_selected_machine(agent: Agent, dev_id: Str) -> c_int;

    // Printing
    fn bambu_network_start_print(
        agent: Agent,
        params: *const PrintParams,
        update_fn: RawCallback,
        cancel_fn: RawCallback,
        wait_fn: RawCallback,
    ) -> c_int;
    fn bambu_network_start_local_print_with_record(
        agent: Agent,
        params: *const PrintParams,
        update_fn: RawCallback,
        cancel_fn: RawCallback,
        wait_fn: RawCallback,
    ) -> c_int;
    fn bambu_network_start_send_gcode_to_sdcard(
        agent: Agent,
        params: *const PrintParams,
        update_fn: RawCallback,
        cancel_fn: RawCallback,
        wait_fn: RawCallback,
    ) -> c_int;
    fn bambu_network_start_local_print(
        agent: Agent,
        params: *const PrintParams,
        update_fn: RawCallback,
        cancel_fn: RawCallback,
    ) -> c_int;

    // Presets and settings
    fn bambu_network_get_user_presets(agent: Agent, user_presets: OutPtr) -> c_int;
    fn bambu_network_request_setting_id(
        agent: Agent,
        name: Str,
        values_map: OutPtr,
        http_code: *mut c_uint,
    ) -> CxxString;
    fn bambu_network_put_setting(
        agent: Agent,
        setting_id: Str,
        name: Str,
        values_map: OutPtr,
        http_code: *mut c_uint,
    ) -> c_int;
    fn bambu_network_get_setting_list(
        agent: Agent,
        bundle_version: Str,
        pro_fn: RawCallback,
        cancel_fn: RawCallback,
    ) -> c_int;
    fn bambu_network_get_setting_list2(
        agent: Agent,
        bundle_version: Str,
        chk_fn: RawCallback,
        pro_fn: RawCallback,
        cancel_fn: RawCallback,
    ) -> c_int;
    fn bambu_network_delete_setting(agent: Agent, setting_id: Str) -> c_int;
    fn bambu_network_get_studio_info_url(agent: Agent) -> CxxString;
    fn bambu_network_set_extra_http_header(agent: Agent, extra_headers: InPtr) -> c_int;

    // Cloud queries
    fn bambu_network_get_my_message(
        agent: Agent,
        kind: c_int,
        after: c_int,
        limit: c_int,
        http_code: *mut c_uint,
        http_body: OutPtr,
    ) -> c_int;
    fn bambu_network_check_user_task_report(
        agent: Agent,
        task_id: *mut c_int,
        printable: *mut bool,
    ) -> c_int;
    fn bambu_network_get_user_print_info(
        agent: Agent,
        http_code: *mut c_uint,
        http_body: OutPtr,
    ) -> c_int;
    fn bambu_network_get_printer_firmware(
        agent: Agent,
        dev_id: Str,
        http_code: *mut c_uint,
        http_body: OutPtr,
    ) -> c_int;
    fn bambu_network_get_task_plate_index(agent: Agent, task_id: Str, plate_index: *mut c_int) -> c_int;
    fn bambu_network_get_user_info(agent: Agent, identifier: *mut c_int) -> c_int;
    fn bambu_network_request_bind_ticket(agent: Agent, ticket: OutPtr) -> c_int;
    fn bambu_network_get_subtask_info(
        agent: Agent,
        subtask_id: Str,
        task_json: OutPtr,
        http_code: *mut c_uint,
        http_body: OutPtr,
    ) -> c_int;
    fn bambu_network_get_slice_info(
        agent: Agent,
        project_id: Str,
        profile_id: Str,
        plate_index: c_int,
        slice_json: OutPtr,
    ) -> c_int;
    fn bambu_network_query_bind_status(
        agent: Agent,
        query_list: InPtr,
        http_code: *mut c_uint,
        http_body: OutPtr,
    ) -> c_int;
    fn bambu_network_modify_printer_name(agent: Agent, dev_id: Str, dev_name: Str) -> c_int;
    fn bambu_network_get_camera_url(agent: Agent, dev_id: Str, callback: RawCallback) -> c_int;
    fn bambu_network_get_design_staffpick(
        agent: Agent,
        offset: c_int,
        limit: c_int,
        callback: RawCallback,
    ) -> c_int;

    // Model mall
    fn bambu_network_start_publish(
        agent: Agent,
        params: *const PublishParams,
        update_fn: RawCallback,
        cancel_fn: RawCallback,
        out: OutPtr,
    ) -> c_int;
    fn bambu_network_get_profile_3mf(agent: Agent, profile: *mut BBLProfile) -> c_int;
    fn bambu_network_get_model_publish_url(agent: Agent, url: OutPtr) -> c_int;
    fn bambu_network_get_subtask(
        agent: Agent,
        task: *mut BBLModelTask,
        getsub_fn: RawCallback,
    ) -> c_int;
    fn bambu_network_get_model_mall_home_url(agent: Agent, url: OutPtr) -> c_int;
    fn bambu_network_get_model_mall_detail_url(agent: Agent, url: OutPtr, id: Str) -> c_int;
    fn bambu_network_get_my_profile(
        agent: Agent,
        token: Str,
        http_code: *mut c_uint,
        http_body: OutPtr,
    ) -> c_int;

    // Telemetry
    fn bambu_network_track_enable(agent: Agent, enable: bool) -> c_int;
    fn bambu_network_track_event(agent: Agent, evt_key: Str, content: Str) -> c_int;
    fn bambu_network_track_header(agent: Agent, header: Str) -> c_int;
    fn bambu_network_track_update_property(agent: Agent, name: Str, value: Str, kind: Str) -> c_int;
    fn bambu_network_track_get_property(agent: Agent, name: Str, value: OutPtr, kind: Str) -> c_int;

    // Ratings
    fn bambu_network_put_model_mall_rating(
        agent: Agent,
        rating_id: c_int,
        score: c_int,
        content: Str,
        images: InPtr,
        http_code: *mut c_uint,
        http_error: OutPtr,
    ) -> c_int;
    fn bambu_network_get_oss_config(
        agent: Agent,
        config: OutPtr,
        country_code: Str,
        http_code: *mut c_uint,
        http_error: OutPtr,
    ) -> c_int;
    fn bambu_network_put_rating_picture_oss(
        agent: Agent,
        config: OutPtr,
        pic_oss_path: OutPtr,
        model_id: Str,
        profile_id: c_int,
        http_code: *mut c_uint,
        http_error: OutPtr,
    ) -> c_int;
    fn bambu_network_get_model_mall_rating(
        agent: Agent,
        job_id: c_int,
        rating_result: OutPtr,
        http_code: *mut c_uint,
        http_error: OutPtr,
    ) -> c_int;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_forwarded_symbols_are_unique() {
        let unique: HashSet<_> = FORWARDED_SYMBOLS.iter().collect();
        assert_eq!(unique.len(), FORWARDED_SYMBOLS.len());
    }

    #[test]
    fn test_intercepted_symbol_is_not_forwarded() {
        for name in INTERCEPTED_SYMBOLS {
            assert!(!FORWARDED_SYMBOLS.contains(name));
        }
    }

    #[test]
    fn test_surface_covers_plugin() {
        assert!(FORWARDED_SYMBOLS.contains(&"bambu_network_get_version"));
        assert!(FORWARDED_SYMBOLS.contains(&"bambu_network_set_on_message_fn"));
        assert!(FORWARDED_SYMBOLS.iter().all(|name| name.starts_with("bambu_network_")));
        assert_eq!(FORWARDED_SYMBOLS.len(), 85);
    }
}
