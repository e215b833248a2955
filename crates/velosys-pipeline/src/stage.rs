//! Pipeline stages and run states.

use serde::{Deserialize, Serialize};

/// The five observable steps of a deployment run, in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// git clone into the workspace
    Clone,

    /// classify the project and install its dependencies
    Install,

    /// zero-cost marker: classification is a side effect of `Install`
    Classify,

    /// ensure a deployment manifest exists
    Configure,

    /// package the workspace and submit it to the deployment API
    Deploy,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 5] = [
        Stage::Clone,
        Stage::Install,
        Stage::Classify,
        Stage::Configure,
        Stage::Deploy,
    ];

    /// Step index reported on the progress channel.
    pub fn index(&self) -> usize {
        match self {
            Stage::Clone => 0,
            Stage::Install => 1,
            Stage::Classify => 2,
            Stage::Configure => 3,
            Stage::Deploy => 4,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Clone => "clone",
            Stage::Install => "install",
            Stage::Classify => "classify",
            Stage::Configure => "configure",
            Stage::Deploy => "deploy",
        }
    }

    /// Whether the stage reports `pending` before running.
    ///
    /// `Classify` has no work of its own and goes straight to `success`.
    pub fn reports_pending(&self) -> bool {
        !matches!(self, Stage::Classify)
    }

    /// The run state while this stage is active.
    pub fn state(&self) -> PipelineState {
        match self {
            Stage::Clone => PipelineState::Cloning,
            Stage::Install => PipelineState::Installing,
            Stage::Classify => PipelineState::Classified,
            Stage::Configure => PipelineState::Configuring,
            Stage::Deploy => PipelineState::Deploying,
        }
    }
}

/// State machine of a single run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Cloning,
    Installing,
    Classified,
    Configuring,
    Deploying,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    /// Next state after the current one completes successfully.
    pub fn advance(&self) -> PipelineState {
        match self {
            PipelineState::Idle => PipelineState::Cloning,
            PipelineState::Cloning => PipelineState::Installing,
            PipelineState::Installing => PipelineState::Classified,
            PipelineState::Classified => PipelineState::Configuring,
            PipelineState::Configuring => PipelineState::Deploying,
            PipelineState::Deploying => PipelineState::Done,
            PipelineState::Done => PipelineState::Done,
            PipelineState::Failed => PipelineState::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_indices_follow_execution_order() {
        for (i, stage) in Stage::ALL.iter().enumerate() {
            assert_eq!(stage.index(), i);
        }
    }

    #[test]
    fn test_only_classify_skips_pending() {
        let skipping: Vec<_> = Stage::ALL
            .iter()
            .filter(|s| !s.reports_pending())
            .collect();
        assert_eq!(skipping, vec![&Stage::Classify]);
    }

    #[test]
    fn test_state_walk_reaches_done() {
        let mut state = PipelineState::Idle;
        for stage in Stage::ALL {
            state = state.advance();
            assert_eq!(state, stage.state());
        }
        state = state.advance();
        assert_eq!(state, PipelineState::Done);
        assert!(state.is_terminal());
        assert_eq!(PipelineState::Failed.advance(), PipelineState::Failed);
    }
}
