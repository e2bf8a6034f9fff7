//! Console-call macros.
//!
//! Each macro takes a console and any number of arguments convertible into
//! [`Arg`](crate::Arg), mirroring a variadic console call.
//!
//! # Examples
//!
//! ```
//! use rust_log_tap::prelude::*;
//! use rust_log_tap::{info, log};
//!
//! let console = Console::new();
//!
//! log!(console, "Server started");
//!
//! let port = 8080;
//! info!(console, "listening on port", port);
//!
//! let user = serde_json::json!({"id": 42, "action": "login"});
//! info!(console, "user event", user);
//! ```

/// Call a console level with the given arguments.
///
/// ```
/// # use rust_log_tap::prelude::*;
/// # let console = Console::new();
/// use rust_log_tap::console_call;
/// console_call!(console, LogLevel::Info, "value:", 42);
/// ```
#[macro_export]
macro_rules! console_call {
    ($console:expr, $level:expr $(, $arg:expr)* $(,)?) => {
        $console.call($level, &[$($crate::Arg::from($arg)),*])
    };
}

/// Call `console.log`.
#[macro_export]
macro_rules! log {
    ($console:expr $(, $arg:expr)* $(,)?) => {
        $crate::console_call!($console, $crate::LogLevel::Log $(, $arg)*)
    };
}

/// Call `console.info`.
#[macro_export]
macro_rules! info {
    ($console:expr $(, $arg:expr)* $(,)?) => {
        $crate::console_call!($console, $crate::LogLevel::Info $(, $arg)*)
    };
}

/// Call `console.warn`.
///
/// ```
/// # use rust_log_tap::prelude::*;
/// # let console = Console::new();
/// use rust_log_tap::warn;
/// warn!(console, "Retry attempt", 3, "of", 5);
/// ```
#[macro_export]
macro_rules! warn {
    ($console:expr $(, $arg:expr)* $(,)?) => {
        $crate::console_call!($console, $crate::LogLevel::Warn $(, $arg)*)
    };
}

/// Call `console.error`.
///
/// ```
/// # use rust_log_tap::prelude::*;
/// # let console = Console::new();
/// use rust_log_tap::error;
/// let err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
/// error!(console, "write failed", Arg::error(&err));
/// ```
#[macro_export]
macro_rules! error {
    ($console:expr $(, $arg:expr)* $(,)?) => {
        $crate::console_call!($console, $crate::LogLevel::Error $(, $arg)*)
    };
}

/// Call `console.debug`.
#[macro_export]
macro_rules! debug {
    ($console:expr $(, $arg:expr)* $(,)?) => {
        $crate::console_call!($console, $crate::LogLevel::Debug $(, $arg)*)
    };
}

#[cfg(test)]
mod tests {
    use crate::core::console::Handler;
    use crate::core::serializer::format_message;
    use crate::{Arg, Console, LogLevel};
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn recording_console() -> (Console, Arc<Mutex<Vec<(LogLevel, String)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handlers = LogLevel::ALL.map(|level| {
            let seen = Arc::clone(&seen);
            Arc::new(move |args: &[Arg]| seen.lock().push((level, format_message(args)))) as Handler
        });
        (Console::with_handlers(handlers), seen)
    }

    #[test]
    fn test_level_macros_route_to_their_level() {
        let (console, seen) = recording_console();
        log!(console, "a");
        info!(console, "b", 1);
        warn!(console, "c", true);
        error!(console, "d", None::<i32>);
        debug!(console, "e", 2.5,);

        assert_eq!(
            *seen.lock(),
            vec![
                (LogLevel::Log, "a".to_string()),
                (LogLevel::Info, "b 1".to_string()),
                (LogLevel::Warn, "c true".to_string()),
                (LogLevel::Error, "d null".to_string()),
                (LogLevel::Debug, "e 2.5".to_string()),
            ]
        );
    }

    #[test]
    fn test_macro_without_arguments() {
        let (console, seen) = recording_console();
        log!(console);
        assert_eq!(*seen.lock(), vec![(LogLevel::Log, String::new())]);
    }
}
