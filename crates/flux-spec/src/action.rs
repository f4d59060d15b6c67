use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single effect a rule fires when it matches.
///
/// Tagged the same way `durable::workflow::action`'s `WorkflowAction` enum
/// is (`#[serde(tag = ...)]` with a dispatch table downstream), generalized
/// from its fixed activity/timer/workflow vocabulary to the five actions a
/// workflow rule can take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Action {
    ExecuteOperation {
        operation: String,
        #[serde(default)]
        parameters: Value,
    },
    ExecuteStep {
        step: String,
        #[serde(default)]
        parameters: Value,
    },
    IgnoreStepFailure {},
    PromoteProducts {
        products: Value,
    },
    UpdateEnvironment {
        parameters: Value,
    },
}

impl Action {
    /// The step name referenced by an `execute-step` action, if any.
    pub fn step_reference(&self) -> Option<&str> {
        match self {
            Action::ExecuteStep { step, .. } => Some(step),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_step_round_trips_through_yaml() {
        let action = Action::ExecuteStep {
            step: "finish".to_string(),
            parameters: serde_json::json!({"x": 1}),
        };
        let text = serde_yaml::to_string(&action).unwrap();
        let back: Action = serde_yaml::from_str(&text).unwrap();
        assert_eq!(action, back);
        assert_eq!(back.step_reference(), Some("finish"));
    }

    #[test]
    fn ignore_step_failure_has_no_fields() {
        let text = "action: ignore-step-failure\n";
        let action: Action = serde_yaml::from_str(text).unwrap();
        assert_eq!(action, Action::IgnoreStepFailure {});
    }
}
