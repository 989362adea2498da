//! Resume state for iterative pipelines.
//!
//! The iteration controller (label → train → explore → screen, repeated) asks
//! the workflow builder whether a stage should be instantiated. Completed
//! stages are recorded in a [`ResumeState`] supplied by the caller, usually
//! loaded from the `[resume]` section of `galaxy.toml`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stages of one iteration of the active-learning loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Label,
    Train,
    Explore,
    Screen,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Label, Stage::Train, Stage::Explore, Stage::Screen];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Label => "label",
            Stage::Train => "train",
            Stage::Explore => "explore",
            Stage::Screen => "screen",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Namespace of a stage within an iteration, e.g. `iter-000/train`
pub fn stage_namespace(iteration: usize, stage: Stage) -> String {
    format!("iter-{:03}/{}", iteration, stage)
}

/// Map of stage name to completion
///
/// Stage names are free-form; [`stage_namespace`] names are the usual keys so
/// that completion is tracked per iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResumeState {
    stages: BTreeMap<String, bool>,
}

impl ResumeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_done(&mut self, stage: impl Into<String>) {
        self.stages.insert(stage.into(), true);
    }

    pub fn is_done(&self, stage: &str) -> bool {
        self.stages.get(stage).copied().unwrap_or(false)
    }

    /// Stages not recorded as done run
    pub fn should_run(&self, stage: &str) -> bool {
        !self.is_done(stage)
    }

    /// First stage, in loop order, not recorded as done
    pub fn resume_point(&self) -> (usize, Stage) {
        // Terminates: only finitely many stages can be recorded
        let mut iteration = 0;
        loop {
            let pending = Stage::ALL
                .into_iter()
                .find(|&stage| !self.is_done(&stage_namespace(iteration, stage)));
            if let Some(stage) = pending {
                return (iteration, stage);
            }
            iteration += 1;
        }
    }

    pub fn completed(&self) -> impl Iterator<Item = &str> {
        self.stages
            .iter()
            .filter(|(_, done)| **done)
            .map(|(stage, _)| stage.as_str())
    }
}

impl FromIterator<(String, bool)> for ResumeState {
    fn from_iter<I: IntoIterator<Item = (String, bool)>>(iter: I) -> Self {
        Self {
            stages: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_namespace() {
        assert_eq!(stage_namespace(0, Stage::Train), "iter-000/train");
        assert_eq!(stage_namespace(12, Stage::Label), "iter-012/label");
    }

    #[test]
    fn test_resume_state() {
        let mut state = ResumeState::new();
        let train = stage_namespace(0, Stage::Train);
        assert!(state.should_run(&train));

        state.mark_done(&train);
        assert!(!state.should_run(&train));
        assert!(state.should_run(&stage_namespace(1, Stage::Train)));
        assert_eq!(state.completed().collect::<Vec<_>>(), vec!["iter-000/train"]);
    }

    #[test]
    fn test_resume_point() {
        let mut state = ResumeState::new();
        assert_eq!(state.resume_point(), (0, Stage::Label));

        for stage in Stage::ALL {
            state.mark_done(stage_namespace(0, stage));
        }
        state.mark_done(stage_namespace(1, Stage::Label));
        assert_eq!(state.resume_point(), (1, Stage::Train));

        // Later stages recorded out of order do not skip a pending one
        state.mark_done(stage_namespace(1, Stage::Screen));
        assert_eq!(state.resume_point(), (1, Stage::Train));
    }

    #[test]
    fn test_explicit_false_runs() {
        let state: ResumeState = [("iter-000/label".to_string(), false)].into_iter().collect();
        assert!(state.should_run("iter-000/label"));
    }

    #[test]
    fn test_deserialize() {
        let state: ResumeState = toml::from_str(
            r#"
            "iter-000/train" = true
            "iter-000/explore" = false
            "#,
        )
        .unwrap();
        assert!(state.is_done("iter-000/train"));
        assert!(!state.is_done("iter-000/explore"));
    }
}
