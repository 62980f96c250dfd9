//! Verbosity-aware logging on top of `tracing`.
//!
//! Library code logs through [`VerboseLog`], which promotes messages to INFO
//! when they are at least as severe as the configured [`Verbosity`]. That lets a
//! caller see slice lifecycle messages without lowering the level of their whole
//! subscriber.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Ordered from least to most restrictive: `Debug < Info < Warn < Error < None`.
///
/// With `Debug`, debug/warn/error messages are emitted at INFO. With `Warn`,
/// only warn/error messages are promoted. `None` promotes nothing.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    None,
}

impl Verbosity {
    /// True when `self` is at or below `level` in the ordering above.
    pub fn is_at_least(self, level: Verbosity) -> bool {
        self != Verbosity::None && self <= level
    }
}

/// Thin wrapper that re-levels messages according to a [`Verbosity`].
#[derive(Debug, Clone, Copy, Default)]
pub struct VerboseLog {
    verbosity: Verbosity,
}

impl VerboseLog {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    pub fn info(&self, msg: fmt::Arguments<'_>) {
        tracing::info!("{msg}");
    }

    pub fn debug(&self, msg: fmt::Arguments<'_>) {
        if self.verbosity.is_at_least(Verbosity::Debug) {
            tracing::info!("{msg}");
        } else {
            tracing::debug!("{msg}");
        }
    }

    pub fn warn(&self, msg: fmt::Arguments<'_>) {
        if self.verbosity.is_at_least(Verbosity::Warn) {
            tracing::info!("{msg}");
        } else {
            tracing::warn!("{msg}");
        }
    }

    pub fn error(&self, msg: fmt::Arguments<'_>) {
        if self.verbosity.is_at_least(Verbosity::Error) {
            tracing::info!("{msg}");
        } else {
            tracing::error!("{msg}");
        }
    }
}

/// Environment variable read by [`init_subscriber`].
pub const LOG_ENV: &str = "TARLZ4_LOG";

/// Installs a global fmt subscriber writing to stderr. The filter comes from
/// `TARLZ4_LOG` when set, otherwise `default_directive`. A subscriber that is
/// already installed is left alone.
pub fn init_subscriber(default_directive: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Collects everything logged on the current thread while `f` runs.
#[cfg(test)]
pub(crate) fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl io::Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    let buf = SharedBuf::default();
    let writer = buf.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    let text = String::from_utf8_lossy(&buf.0.lock().unwrap()).into_owned();
    (out, text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_keep_their_level_unless_promoted() {
        let ((), logs) = capture_logs(|| {
            VerboseLog::new(Verbosity::None).error(format_args!("disk on fire"));
            VerboseLog::new(Verbosity::Error).error(format_args!("promoted failure"));
        });
        let lines: Vec<&str> = logs.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("ERROR") && lines[0].contains("disk on fire"));
        assert!(lines[1].contains("INFO") && lines[1].contains("promoted failure"));
    }

    #[test]
    fn ordering_matches_restrictiveness() {
        assert!(Verbosity::Debug.is_at_least(Verbosity::Debug));
        assert!(Verbosity::Debug.is_at_least(Verbosity::Error));
        assert!(Verbosity::Warn.is_at_least(Verbosity::Error));
        assert!(!Verbosity::Warn.is_at_least(Verbosity::Debug));
        assert!(!Verbosity::Error.is_at_least(Verbosity::Warn));
        assert!(!Verbosity::None.is_at_least(Verbosity::Error));
    }

    #[test]
    fn verbosity_parses_from_json() {
        let v: Verbosity = serde_json::from_str("\"warn\"").unwrap();
        assert_eq!(v, Verbosity::Warn);
        assert_eq!(Verbosity::default(), Verbosity::Info);
    }
}
