//! Next-step selection.
//!
//! Flow graphs allow several successors per step, but every shipped flow is
//! linear in practice. The engine asks a `NextStepSelector` which successor
//! to take; `FirstSuccessor` is the default.

use mindstack_types::flow::{FlowDefinition, FlowExecution, FlowStep};

pub trait NextStepSelector: Send + Sync {
    /// Successor id for `step`, or `None` when the step has no successors.
    ///
    /// May return the completion sentinel.
    fn select<'a>(
        &self,
        flow: &'a FlowDefinition,
        step: &'a FlowStep,
        execution: &FlowExecution,
    ) -> Option<&'a str>;
}

/// Takes the first listed successor.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstSuccessor;

impl NextStepSelector for FirstSuccessor {
    fn select<'a>(
        &self,
        _flow: &'a FlowDefinition,
        step: &'a FlowStep,
        _execution: &FlowExecution,
    ) -> Option<&'a str> {
        step.next_steps.first().map(String::as_str)
    }
}

/// Takes the first successor not already completed, falling back to the
/// first one. Useful for graphs that loop back to earlier steps.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstUnvisitedSuccessor;

impl NextStepSelector for FirstUnvisitedSuccessor {
    fn select<'a>(
        &self,
        _flow: &'a FlowDefinition,
        step: &'a FlowStep,
        execution: &FlowExecution,
    ) -> Option<&'a str> {
        step.next_steps
            .iter()
            .find(|next| !execution.completed_steps.contains(*next))
            .or_else(|| step.next_steps.first())
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{flow, step};
    use chrono::Utc;

    #[test]
    fn test_first_successor() {
        let def = flow("f1", &[], 0, vec![step("s1", &["s2", "s3"]), step("s2", &[]), step("s3", &[])]);
        let exec = FlowExecution::start("sess", "f1", "s1", Utc::now());
        assert_eq!(FirstSuccessor.select(&def, &def.steps[0], &exec), Some("s2"));
        assert_eq!(FirstSuccessor.select(&def, &def.steps[1], &exec), None);
    }

    #[test]
    fn test_first_unvisited_skips_completed() {
        let def = flow("f1", &[], 0, vec![step("s1", &["s2", "s3"]), step("s2", &[]), step("s3", &[])]);
        let mut exec = FlowExecution::start("sess", "f1", "s1", Utc::now());
        exec.completed_steps.push("s2".to_string());
        assert_eq!(FirstUnvisitedSuccessor.select(&def, &def.steps[0], &exec), Some("s3"));

        exec.completed_steps.push("s3".to_string());
        assert_eq!(FirstUnvisitedSuccessor.select(&def, &def.steps[0], &exec), Some("s2"));
    }
}
