//! Structured lifecycle events for deployment runs.
//!
//! Every record carries an `event` field (`deployment.started`,
//! `deployment.stage_started`, ...) so log pipelines can filter on it. Run
//! futures are instrumented with [`deployment_span`], which tags everything
//! emitted inside with the deployment id.

use tracing::{info, warn, Span};

use crate::stage::Stage;

/// Span for one run. Attach with `tracing::Instrument::instrument`.
pub fn deployment_span(deployment_id: &str) -> Span {
    tracing::info_span!("velosys.deployment", deployment_id = %deployment_id)
}

/// Emit event: run started for a repository.
pub fn emit_deployment_started(deployment_id: &str, repository_url: &str) {
    info!(
        event = "deployment.started",
        deployment_id = %deployment_id,
        repository_url = %repository_url,
    );
}

pub fn emit_stage_started(deployment_id: &str, stage: Stage) {
    info!(
        event = "deployment.stage_started",
        deployment_id = %deployment_id,
        stage = stage.name(),
        step = stage.index(),
    );
}

/// Emit event: stage finished, with its outcome and wall time.
pub fn emit_stage_finished(deployment_id: &str, stage: Stage, duration_ms: u64, success: bool) {
    info!(
        event = "deployment.stage_finished",
        deployment_id = %deployment_id,
        stage = stage.name(),
        step = stage.index(),
        duration_ms = duration_ms,
        success = success,
    );
}

/// Emit event: run finished. `error_kind` is empty on success.
pub fn emit_deployment_finished(
    deployment_id: &str,
    duration_ms: u64,
    success: bool,
    error_kind: &str,
) {
    info!(
        event = "deployment.finished",
        deployment_id = %deployment_id,
        duration_ms = duration_ms,
        success = success,
        error_kind = %error_kind,
    );
}

/// Emit event: workspace removal failed (warning level).
pub fn emit_cleanup_error(deployment_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "deployment.cleanup_error", deployment_id = %deployment_id, error = %error);
}
