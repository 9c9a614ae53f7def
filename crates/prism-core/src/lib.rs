// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_directive` (e.g. `"info"` or
/// `"prism_render_vk=debug"`) is used. Calling this twice is harmless.
pub fn init_tracing(default_directive: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(default_directive).unwrap_or_else(|_| EnvFilter::new("info"))
    });

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}
