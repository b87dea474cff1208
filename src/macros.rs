//! Code generation for the forwarded plugin surface.

/// Generates pass-through exports for plugin entry points.
///
/// Each `fn` item becomes an exported `unsafe extern "C"` function with the
/// same name and signature. On first call it resolves the identically named
/// symbol in the real plugin; every call forwards the arguments and returns
/// the result untouched. With debug level `2` each call is traced.
///
/// The forwarded call is the tail expression, so a [`CxxString`] result is
/// built by the plugin directly in the host's return slot.
///
/// The macro also defines `FORWARDED_SYMBOLS`, the names of all generated
/// exports.
///
/// [`CxxString`]: crate::abi::CxxString
///
/// # Example
///
/// ```ignore
/// forward! {
///     /// Starts the agent.
///     fn bambu_network_start(agent: Agent) -> c_int;
///     fn bambu_network_is_user_login(agent: Agent) -> bool;
/// }
/// ```
#[macro_export]
macro_rules! forward {
    ($(
        $(#[$meta:meta])*
        fn $name:ident($($arg:ident: $ty:ty),* $(,)?) $(-> $ret:ty)?;
    )*) => {
        /// Names of every export forwarded unchanged to the real plugin.
        pub const FORWARDED_SYMBOLS: &[&str] = &[$(stringify!($name)),*];

        $(
            $(#[$meta])*
            ///
            /// # Safety
            ///
            /// Same contract as the real plugin's export of this name.
            #[unsafe(no_mangle)]
            pub unsafe extern "C" fn $name($($arg: $ty),*) $(-> $ret)? {
                static SLOT: $crate::symbol::SymbolSlot<
                    unsafe extern "C" fn($($ty),*) $(-> $ret)?
                > = $crate::symbol::SymbolSlot::new(stringify!($name));

                ::log::trace!(stringify!($name));
                // SAFETY: the slot type is this export's own signature.
                let target = unsafe { $crate::runtime::resolve(&SLOT) };
                unsafe { target($($arg),*) }
            }
        )*
    };
}
