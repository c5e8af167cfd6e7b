//! Progress and status events, plus the stop signal

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::Sender;
use log::{error, info, trace, warn};

/// Something a front end may want to show while a run is in progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportEvent {
    /// Share of files processed, 0-100
    Progress(u8),
    /// Human readable note about the file being handled
    FileStatus(String),
    Warning { title: String, message: String },
    Error { title: String, message: String },
    Info { title: String, message: String },
    /// Last event of every run
    Finished,
}

impl ExportEvent {
    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        ExportEvent::Warning {
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        ExportEvent::Error {
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        ExportEvent::Info {
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Receiver of run events. Called from the coordinator thread only.
pub trait EventSink {
    fn emit(&self, event: ExportEvent);
}

impl EventSink for Sender<ExportEvent> {
    fn emit(&self, event: ExportEvent) {
        // A front end that went away is not a reason to stop the run
        let _ = self.send(event);
    }
}

impl<S: EventSink + ?Sized> EventSink for &S {
    fn emit(&self, event: ExportEvent) {
        (**self).emit(event)
    }
}

/// Sink that forwards events to the `log` facade
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: ExportEvent) {
        match event {
            ExportEvent::Progress(percent) => trace!("progress {}%", percent),
            ExportEvent::FileStatus(message) => trace!("{}", message),
            ExportEvent::Warning { title, message } => warn!("{}: {}", title, message),
            ExportEvent::Error { title, message } => error!("{}: {}", title, message),
            ExportEvent::Info { title, message } => info!("{}: {}", title, message),
            ExportEvent::Finished => trace!("finished"),
        }
    }
}

/// Sink that records every event in memory
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<ExportEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far
    pub fn events(&self) -> Vec<ExportEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count(&self, predicate: impl Fn(&ExportEvent) -> bool) -> usize {
        self.events().iter().filter(|e| predicate(e)).count()
    }
}

impl EventSink for EventLog {
    fn emit(&self, event: ExportEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Shared "terminate requested" signal.
///
/// Clones observe the same flag. Setting it more than once has no further effect.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
