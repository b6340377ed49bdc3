// src/events.rs

//! State event reporting
//!
//! Components report user-visible state changes through a `Reporter`
//! injected at construction. Reporters observe only: nothing they do
//! influences control flow.

use std::cell::RefCell;
use std::fmt;

/// Phase tag carried by every state event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Unpacking of a package started
    Unpack,
    /// Unpacking failed (terminal)
    UnpackFail,
    /// A configuration file was renamed or installed beside the current one
    ConfigFile,
    /// An obsolete file was removed
    RemoveFileObsolete,
    /// An obsolete file could not be removed
    RemoveFileObsoleteFail,
}

impl Phase {
    pub fn as_str(&self) -> &str {
        match self {
            Phase::Unpack => "unpack",
            Phase::UnpackFail => "unpack-fail",
            Phase::ConfigFile => "config-file",
            Phase::RemoveFileObsolete => "remove-file-obsolete",
            Phase::RemoveFileObsoleteFail => "remove-file-obsolete-fail",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state event: phase, error code (0 = informational), package identity
/// and a formatted message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateEvent {
    pub phase: Phase,
    pub code: i32,
    pub pkgname: String,
    pub version: String,
    pub message: Option<String>,
}

impl StateEvent {
    pub fn new(phase: Phase, pkgname: &str, version: &str) -> Self {
        Self {
            phase,
            code: 0,
            pkgname: pkgname.to_string(),
            version: version.to_string(),
            message: None,
        }
    }

    pub fn with_code(mut self, code: i32) -> Self {
        self.code = code;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Per-entry unpack progress
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnpackProgress {
    /// Archive path of the current entry
    pub entry: String,
    pub entry_size: u64,
    pub entry_is_metadata: bool,
    pub entry_is_conf: bool,
    /// Entries extracted so far
    pub entry_extract_count: usize,
    /// Expected entries: metadata + files + conf_files + links
    pub entry_total_count: usize,
}

/// Sink for state events and unpack progress
pub trait Reporter {
    /// Receive a state event
    fn report(&self, event: &StateEvent);

    /// Receive per-entry progress; ignored by default
    fn progress(&self, _progress: &UnpackProgress) {}
}

/// Reporter that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl Reporter for NoopReporter {
    fn report(&self, _event: &StateEvent) {}
}

/// Reporter that keeps every event and progress update in memory
#[derive(Debug, Default)]
pub struct EventLog {
    events: RefCell<Vec<StateEvent>>,
    progress: RefCell<Vec<UnpackProgress>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StateEvent> {
        self.events.borrow().clone()
    }

    pub fn progress_updates(&self) -> Vec<UnpackProgress> {
        self.progress.borrow().clone()
    }

    /// Events of a given phase
    pub fn phase(&self, phase: Phase) -> Vec<StateEvent> {
        self.events
            .borrow()
            .iter()
            .filter(|e| e.phase == phase)
            .cloned()
            .collect()
    }
}

impl Reporter for EventLog {
    fn report(&self, event: &StateEvent) {
        self.events.borrow_mut().push(event.clone());
    }

    fn progress(&self, progress: &UnpackProgress) {
        self.progress.borrow_mut().push(progress.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_builder() {
        let event = StateEvent::new(Phase::UnpackFail, "foo", "1.0_1")
            .with_code(5)
            .with_message("boom");
        assert_eq!(event.code, 5);
        assert_eq!(event.message.as_deref(), Some("boom"));
        assert_eq!(event.phase.to_string(), "unpack-fail");
    }

    #[test]
    fn test_event_log_filters_by_phase() {
        let log = EventLog::new();
        log.report(&StateEvent::new(Phase::Unpack, "foo", "1.0_1"));
        log.report(&StateEvent::new(Phase::ConfigFile, "foo", "1.0_1"));
        log.progress(&UnpackProgress::default());

        assert_eq!(log.events().len(), 2);
        assert_eq!(log.phase(Phase::ConfigFile).len(), 1);
        assert_eq!(log.progress_updates().len(), 1);
    }
}
