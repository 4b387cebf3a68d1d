//! Fatal error escalation for watch callbacks.
//!
//! Watch callbacks run on the store's delivery thread and have nobody to
//! return an error to. Anything other than an expected race is handed to a
//! [`FatalHandler`]; in production that ends the process so a supervisor can
//! restart it with clean in-memory state.

use crate::error::CoreError;
use parking_lot::Mutex;

/// Receives errors that cannot be recovered from in place.
pub trait FatalHandler: Send + Sync {
    /// Called once per fatal error. `context` names the failing operation.
    fn fatal(&self, context: &str, error: &CoreError);
}

/// Logs the error and aborts the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct AbortOnFatal;

impl FatalHandler for AbortOnFatal {
    fn fatal(&self, context: &str, error: &CoreError) {
        tracing::error!(context, error = %error, "unrecoverable error, aborting");
        std::process::abort();
    }
}

/// Records fatal errors instead of aborting. Intended for tests.
#[derive(Debug, Default)]
pub struct RecordingFatal {
    errors: Mutex<Vec<String>>,
}

impl RecordingFatal {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fatal errors seen.
    #[must_use]
    pub fn count(&self) -> usize {
        self.errors.lock().len()
    }

    /// Recorded errors as `context: error` strings.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.errors.lock().clone()
    }
}

impl FatalHandler for RecordingFatal {
    fn fatal(&self, context: &str, error: &CoreError) {
        tracing::error!(context, error = %error, "fatal error recorded");
        self.errors.lock().push(format!("{context}: {error}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_handler_keeps_messages() {
        let handler = RecordingFatal::new();
        handler.fatal("sync_data /a", &CoreError::invalid_operation("boom"));
        assert_eq!(handler.count(), 1);
        assert!(handler.messages()[0].starts_with("sync_data /a: "));
    }
}
