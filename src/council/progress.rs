//! Progress reporting for council sessions.
//!
//! Events for one model are strictly ordered (preparing, querying, then
//! complete); no ordering holds across models. The provided reporter
//! serializes delivery on a worker thread so callbacks need not be
//! thread-safe.

use std::sync::mpsc;

/// Lifecycle stage of one model within one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStage {
    Preparing,
    Querying,
    Complete,
}

impl ProgressStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStage::Preparing => "preparing",
            ProgressStage::Querying => "querying",
            ProgressStage::Complete => "complete",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    /// 1-based round number.
    pub round: usize,
    pub model: String,
    pub stage: ProgressStage,
}

/// Sink for progress events. Invoked from multiple tasks; implementations
/// must be thread-safe, or use [`SerializedReporter`] which already is.
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Reporter that forwards events to a single callback on a dedicated
/// worker thread, in arrival order.
#[derive(Clone)]
pub struct SerializedReporter {
    sender: mpsc::Sender<ProgressEvent>,
}

pub struct ReporterWorker {
    handle: Option<std::thread::JoinHandle<()>>,
}

impl ReporterWorker {
    /// Wait for all queued events to drain. Call after dropping every
    /// clone of the reporter.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl SerializedReporter {
    pub fn new<F>(callback: F) -> (Self, ReporterWorker)
    where
        F: FnMut(ProgressEvent) + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel::<ProgressEvent>();
        let handle = std::thread::spawn(move || deliver_loop(receiver, callback));
        (
            Self { sender },
            ReporterWorker {
                handle: Some(handle),
            },
        )
    }
}

impl ProgressSink for SerializedReporter {
    fn report(&self, event: ProgressEvent) {
        // A closed receiver means the observer went away; progress is
        // best-effort, so the event is dropped.
        let _ = self.sender.send(event);
    }
}

fn deliver_loop<F>(receiver: mpsc::Receiver<ProgressEvent>, mut callback: F)
where
    F: FnMut(ProgressEvent),
{
    for event in receiver {
        callback(event);
    }
}
