#![allow(unused_macros)]
//! Diagnostics emitted by the channel and by the appenders built on it.
//!
//! Every event carries a mandatory `name` identifying the operation, followed by optional
//! `key = value` pairs. With the `internal-logs` feature of the *calling* crate enabled, events
//! go through `tracing` with the calling crate's package name as the target. Bridges rely on
//! that target to keep these events out of the telemetry pipeline. Test builds also print each
//! event to stdout, visible with `--nocapture`.
//!
//! These macros are not meant for application logging.

/// Shared body of the `ai_*!` macros. `$level` names one of the `tracing` level macros.
#[doc(hidden)]
#[macro_export]
macro_rules! ai_log {
    ($level:ident, name: $name:expr $(, $key:ident = $value:expr)* $(,)?) => {{
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::$level!(
                name: $name,
                target: env!("CARGO_PKG_NAME"),
                name = $name
                $(, $key = $value)*
            );
        }

        #[cfg(test)]
        {
            print!("{}: name={}", concat!("ai_", stringify!($level)), $name);
            $(
                print!(", {}={}", stringify!($key), $value);
            )*
            println!();
        }

        #[cfg(all(not(feature = "internal-logs"), not(test)))]
        {
            let _ = ($name, $($value),*);
        }
    }};
}

/// Logs an informational diagnostic.
///
/// ```rust
/// use appinsights_channel::ai_info;
/// ai_info!(name: "Channel.Started", max_batch_size = 1024);
/// ```
#[macro_export]
macro_rules! ai_info {
    ($($args:tt)+) => {
        $crate::ai_log!(info, $($args)+)
    };
}

/// Logs a warning diagnostic.
///
/// ```rust
/// use appinsights_channel::ai_warn;
/// ai_warn!(name: "Channel.QueueFull", dropped = 1);
/// ```
#[macro_export]
macro_rules! ai_warn {
    ($($args:tt)+) => {
        $crate::ai_log!(warn, $($args)+)
    };
}

/// Logs a debug diagnostic.
///
/// ```rust
/// use appinsights_channel::ai_debug;
/// ai_debug!(name: "Transmitter.ExportingDueToTimer", batch_size = 12);
/// ```
#[macro_export]
macro_rules! ai_debug {
    ($($args:tt)+) => {
        $crate::ai_log!(debug, $($args)+)
    };
}

/// Logs an error diagnostic.
///
/// ```rust
/// use appinsights_channel::ai_error;
/// ai_error!(name: "Transmitter.ExportError", error = "connection refused");
/// ```
#[macro_export]
macro_rules! ai_error {
    ($($args:tt)+) => {
        $crate::ai_log!(error, $($args)+)
    };
}
