// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! `info!`, `warn!` and `diagnostic!` for the labsave crates.
//!
//! Records go to the `log` facade with the target `labsave.rust::<module>`,
//! e.g. `labsave.rust::labsave::saver`, so a host application can filter
//! them apart from its own output. No backend is installed here.

use std::sync::atomic::{AtomicBool, Ordering};

#[doc(hidden)]
pub use log as _log;

#[doc(hidden)]
#[macro_export]
macro_rules! __emit {
    ($level:ident, $($fmt:tt)+) => {{
        $crate::_log::$level!(target: concat!("labsave.rust::", module_path!()), $($fmt)+)
    }};
}

#[macro_export]
macro_rules! info {
    ($msg:literal $(, $arg:expr)* $(,)?) => {
        $crate::__emit!(info, $msg $(, $arg)*)
    };
}

#[macro_export]
macro_rules! warn {
    ($msg:literal $(, $arg:expr)* $(,)?) => {
        $crate::__emit!(warn, $msg $(, $arg)*)
    };
}

/// Like `info!`, but dropped unless [`init_logging`] switched diagnostics on.
#[macro_export]
macro_rules! diagnostic {
    ($msg:literal $(, $arg:expr)* $(,)?) => {
        if $crate::is_diagnostics_enabled() {
            $crate::__emit!(info, $msg $(, $arg)*)
        }
    };
}

static DIAGNOSTICS: AtomicBool = AtomicBool::new(false);

#[inline]
pub fn is_diagnostics_enabled() -> bool {
    DIAGNOSTICS.load(Ordering::Acquire)
}

/// Switch diagnostic records on or off. The logger itself belongs to the
/// application.
pub fn init_logging(with_diagnostics: bool) {
    DIAGNOSTICS.store(with_diagnostics, Ordering::Release);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostics_switch() {
        init_logging(true);
        assert!(is_diagnostics_enabled());
        diagnostic!("stored {} as text", "value");
        init_logging(false);
        assert!(!is_diagnostics_enabled());
        diagnostic!("dropped");
    }

    #[test]
    fn test_macros_accept_trailing_comma() {
        info!("{} records", 3,);
        warn!("no destination configured");
    }
}
