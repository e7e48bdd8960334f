//! Diagnostic frame logging
//!
//! An optional callback sink receives a hex dump of every envelope the
//! session writes and reads. The library itself logs through `tracing`; the
//! callback exists so embedding applications can route raw frame dumps into
//! their own diagnostics without enabling a tracing subscriber.

use std::fmt;
use std::sync::Arc;

/// Callback signature for frame dumps
pub type LogCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Format raw bytes as a lowercase, space-separated hex string
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Sink for TX/RX envelope dumps.
///
/// The callback runs while the session holds its exchange lock. Do not call
/// back into the same session from inside it: that deadlocks.
#[derive(Clone)]
pub struct FrameLogger {
    callback: LogCallback,
}

impl FrameLogger {
    /// Create a logger from a callback
    pub fn new(callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// Log an outbound envelope
    pub fn tx(&self, frame: &[u8]) {
        (self.callback)(&format!("solarmanv5 tx: {}", format_hex(frame)));
    }

    /// Log an inbound envelope
    pub fn rx(&self, frame: &[u8]) {
        (self.callback)(&format!("solarmanv5 rx: {}", format_hex(frame)));
    }
}

impl Default for FrameLogger {
    /// Route dumps to `tracing` at debug level
    fn default() -> Self {
        Self::new(|line| tracing::debug!("{line}"))
    }
}

impl fmt::Debug for FrameLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameLogger").finish_non_exhaustive()
    }
}
