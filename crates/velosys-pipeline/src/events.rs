//! Progress events and the sinks that receive them.
//!
//! A run emits an ordered stream of [`ProgressEvent`]s: free-form log lines,
//! per-step status transitions, and exactly one terminal result. Sinks must
//! not fail the pipeline: [`ProgressSink::emit`] has no error channel, so a
//! sink that cannot deliver drops the event.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Observable status of one pipeline step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Waiting,
    Pending,
    Success,
    Error,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Waiting => "waiting",
            StepStatus::Pending => "pending",
            StepStatus::Success => "success",
            StepStatus::Error => "error",
        }
    }
}

/// One event on the progress channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Log {
        message: String,
    },
    Step {
        index: usize,
        status: StepStatus,
    },
    Result {
        success: bool,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        deployed_url: Option<String>,
    },
}

impl ProgressEvent {
    pub fn log(message: impl Into<String>) -> Self {
        ProgressEvent::Log {
            message: message.into(),
        }
    }

    pub fn step(index: usize, status: StepStatus) -> Self {
        ProgressEvent::Step { index, status }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Result { .. })
    }
}

/// Receiver of progress events, called synchronously in emission order.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);

    fn log(&self, message: &str) {
        self.emit(ProgressEvent::log(message));
    }

    fn step(&self, index: usize, status: StepStatus) {
        self.emit(ProgressEvent::step(index, status));
    }
}

/// Sink that writes every event to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn emit(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Log { message } => info!(target: "velosys::progress", "{message}"),
            ProgressEvent::Step { index, status } => {
                info!(target: "velosys::progress", step = index, status = status.as_str())
            }
            ProgressEvent::Result {
                success,
                message,
                deployed_url,
            } => info!(
                target: "velosys::progress",
                success,
                deployed_url = deployed_url.as_deref().unwrap_or(""),
                "{message}"
            ),
        }
    }
}

/// Sink that forwards events into an unbounded tokio channel.
///
/// A closed receiver is logged once per event and otherwise ignored.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink together with its receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&self, event: ProgressEvent) {
        if self.tx.send(event).is_err() {
            warn!("progress receiver dropped; event discarded");
        }
    }
}
