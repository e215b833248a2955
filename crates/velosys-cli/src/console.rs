//! Progress output on stdout.

use std::io::{self, Write};

use velosys_pipeline::{ProgressEvent, ProgressSink, Stage, StepStatus};

/// Prints each progress event as it arrives, either as text or as one JSON
/// object per line.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleSink {
    json: bool,
}

impl ConsoleSink {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    /// Write one event as a single line to `out`.
    pub fn write_event(&self, out: &mut impl Write, event: &ProgressEvent) -> io::Result<()> {
        let line = if self.json {
            serde_json::to_string(event)?
        } else {
            render(event)
        };
        writeln!(out, "{line}")?;
        out.flush()
    }
}

impl ProgressSink for ConsoleSink {
    // A closed or broken stdout drops the event; the run carries on.
    fn emit(&self, event: ProgressEvent) {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        if let Err(e) = self.write_event(&mut out, &event) {
            tracing::warn!(error = %e, "could not write progress event; event discarded");
        }
    }
}

/// Human-readable form of an event.
pub fn render(event: &ProgressEvent) -> String {
    match event {
        ProgressEvent::Log { message } => format!("  {message}"),
        ProgressEvent::Step { index, status } => {
            let name = Stage::ALL
                .get(*index)
                .map(Stage::name)
                .unwrap_or("unknown");
            let marker = match status {
                StepStatus::Waiting => "..",
                StepStatus::Pending => ">>",
                StepStatus::Success => "ok",
                StepStatus::Error => "!!",
            };
            format!("[{marker}] step {index} ({name}): {}", status.as_str())
        }
        ProgressEvent::Result {
            success,
            message,
            deployed_url,
        } => {
            let mut line = format!("{} {message}", if *success { "==>" } else { "xx>" });
            if let Some(url) = deployed_url {
                line.push_str(&format!("\n    {url}"));
            }
            line
        }
    }
}
