//! Feature-gated tracing macros for zero-overhead instrumentation.
//!
//! When the `tracing` feature is enabled, this module re-exports the
//! tracing crate's macros. When disabled, all macros compile to no-ops
//! with zero overhead.

// When tracing feature is enabled, re-export from tracing crate
#[cfg(feature = "tracing")]
pub use tracing::{debug, error, info, trace, warn, Level};

// When tracing feature is disabled, provide no-op implementations
#[cfg(not(feature = "tracing"))]
mod noop {
    /// Tracing levels (no-op)
    #[derive(Clone, Copy, Debug)]
    pub struct Level;

    impl Level {
        pub const TRACE: Level = Level;
        pub const DEBUG: Level = Level;
        pub const INFO: Level = Level;
        pub const WARN: Level = Level;
        pub const ERROR: Level = Level;
    }

    /// No-op trace macro
    #[macro_export]
    macro_rules! trace {
        ($($tt:tt)*) => {};
    }

    /// No-op debug macro
    #[macro_export]
    macro_rules! debug {
        ($($tt:tt)*) => {};
    }

    /// No-op info macro
    #[macro_export]
    macro_rules! info {
        ($($tt:tt)*) => {};
    }

    /// No-op warn macro
    #[macro_export]
    macro_rules! warn {
        ($($tt:tt)*) => {};
    }

    /// No-op error macro
    #[macro_export]
    macro_rules! error {
        ($($tt:tt)*) => {};
    }

    // Re-export macros at module level
    pub use crate::{debug, error, info, trace, warn};
}

#[cfg(not(feature = "tracing"))]
pub use noop::*;

/// Initialize tracing subscriber for tests/development.
///
/// This function should be called once at the start of a test or
/// application when tracing is enabled.
#[cfg(feature = "tracing")]
pub fn init_subscriber() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true)
                .with_ansi(false),
        )
        .with(filter)
        .try_init()
        .ok(); // Ignore error if already initialized
}

#[cfg(not(feature = "tracing"))]
pub fn init_subscriber() {
    // No-op when tracing is disabled
}
