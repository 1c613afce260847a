//! Default value functions for serde deserialization.
//!
//! These functions forward to constants defined in `skiff_core::defaults`.

use skiff_core::defaults;

/// Generate default value functions that forward to skiff_core::defaults constants.
macro_rules! default_fns {
    ($($fn_name:ident => $const_name:ident : $ty:ty),* $(,)?) => {
        $(
            pub(crate) fn $fn_name() -> $ty {
                defaults::$const_name
            }
        )*
    };
}

default_fns! {
    default_relay_buffer_size => DEFAULT_RELAY_BUFFER_SIZE: usize,
    default_tcp_no_delay      => DEFAULT_TCP_NO_DELAY: bool,
}
