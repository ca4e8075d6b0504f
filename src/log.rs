//! Logging macros forwarding to `defmt` when the `defmt` feature is enabled
//!
//! Without the feature the arguments are still type-checked but nothing is emitted, which keeps
//! host builds free of a defmt global logger.

macro_rules! log_impl {
    ($level:ident, $($arg:tt)+) => {{
        #[cfg(feature = "defmt")]
        defmt::$level!($($arg)+);
        #[cfg(not(feature = "defmt"))]
        let _ = || {
            let _ = format_args!($($arg)+);
        };
    }};
}

macro_rules! trace {
    ($($arg:tt)+) => { log_impl!(trace, $($arg)+) };
}

macro_rules! debug {
    ($($arg:tt)+) => { log_impl!(debug, $($arg)+) };
}

macro_rules! info {
    ($($arg:tt)+) => { log_impl!(info, $($arg)+) };
}

macro_rules! warn {
    ($($arg:tt)+) => { log_impl!(warn, $($arg)+) };
}

macro_rules! error {
    ($($arg:tt)+) => { log_impl!(error, $($arg)+) };
}
