//! Leveled diagnostics channel.
//!
//! Components and schedulers report problems through a [`MessageHub`] rather
//! than by returning errors from the hot path. Messages carry a severity, a
//! machine-readable tag and free text; consumers pull them with
//! [`MessageHub::drain`]. Every message is also forwarded to the `log`
//! facade so a subscriber is never required just to see what happened.
//!
//! Each [`ComponentSystem`](crate::system::ComponentSystem) is constructed
//! with an explicit hub; [`default_hub`] provides a process-wide instance
//! for top-level convenience.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

/// Severity of a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    /// Indicates a bug in a component library. Behavior after a Fatal
    /// message is explicitly undefined.
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// A single diagnostic message.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Machine-readable tag, e.g. "SingularJacobian" or "SlotOutOfRange"
    pub tag: String,
    /// Free-text description
    pub text: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.severity, self.tag, self.text)
    }
}

/// Shared sink for diagnostic messages.
///
/// Cheap to clone through an `Arc`; safe to report to from any worker
/// thread. The queue is unbounded; consumers are expected to drain between
/// runs or on a timer.
#[derive(Debug, Default)]
pub struct MessageHub {
    queue: Mutex<VecDeque<Diagnostic>>,
}

impl MessageHub {
    /// Create a new, empty hub.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Report a message at the given severity.
    pub fn report(&self, severity: Severity, tag: &str, text: impl Into<String>) {
        let text = text.into();
        match severity {
            Severity::Debug => log::debug!("[{tag}] {text}"),
            Severity::Info => log::info!("[{tag}] {text}"),
            Severity::Warning => log::warn!("[{tag}] {text}"),
            Severity::Error => log::error!("[{tag}] {text}"),
            Severity::Fatal => log::error!("FATAL [{tag}] {text}"),
        }
        let mut queue = self.queue.lock().expect("diagnostics queue poisoned");
        queue.push_back(Diagnostic {
            severity,
            tag: tag.to_string(),
            text,
        });
    }

    /// Report at Debug severity.
    pub fn debug(&self, tag: &str, text: impl Into<String>) {
        self.report(Severity::Debug, tag, text);
    }

    /// Report at Info severity.
    pub fn info(&self, tag: &str, text: impl Into<String>) {
        self.report(Severity::Info, tag, text);
    }

    /// Report at Warning severity.
    pub fn warning(&self, tag: &str, text: impl Into<String>) {
        self.report(Severity::Warning, tag, text);
    }

    /// Report at Error severity.
    pub fn error(&self, tag: &str, text: impl Into<String>) {
        self.report(Severity::Error, tag, text);
    }

    /// Report at Fatal severity.
    pub fn fatal(&self, tag: &str, text: impl Into<String>) {
        self.report(Severity::Fatal, tag, text);
    }

    /// Remove and return all queued messages.
    pub fn drain(&self) -> Vec<Diagnostic> {
        let mut queue = self.queue.lock().expect("diagnostics queue poisoned");
        queue.drain(..).collect()
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.queue.lock().expect("diagnostics queue poisoned").len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Highest severity currently queued, if any.
    pub fn max_severity(&self) -> Option<Severity> {
        let queue = self.queue.lock().expect("diagnostics queue poisoned");
        queue.iter().map(|d| d.severity).max()
    }
}

/// Process-wide default hub for top-level convenience.
pub fn default_hub() -> Arc<MessageHub> {
    static HUB: OnceLock<Arc<MessageHub>> = OnceLock::new();
    HUB.get_or_init(MessageHub::new).clone()
}
