//! cvfolio: personal résumé management with CV + certificate PDF export.

pub mod admin_cli;
pub mod auth;
pub mod core;
pub mod environment;
pub mod export;
pub mod media_validator;
pub mod reconcile;
pub mod storage;
pub mod types;
pub mod utils;
pub mod web;

pub use web::{build_rocket, start_web_server};

#[doc(hidden)]
pub use tracing as __tracing;

/// Log through `tracing` at the given level: `app_log!(info, "x = {}", x)`.
#[macro_export]
macro_rules! app_log {
    ($level:ident, $($arg:tt)+) => {
        $crate::__tracing::$level!($($arg)+)
    };
}

/// Build an info-level span: `app_span!("export", user = %name)`.
#[macro_export]
macro_rules! app_span {
    ($name:expr) => {
        $crate::__tracing::info_span!($name)
    };
    ($name:expr, $($fields:tt)+) => {
        $crate::__tracing::info_span!($name, $($fields)+)
    };
}
