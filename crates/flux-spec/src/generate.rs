use serde_json::Value;
use std::collections::BTreeMap;

use crate::action::Action;
use crate::rule::{Rule, RuleList};
use crate::spec::{StepSpec, WorkflowSpec};

/// Describes one step of a linear chain passed to [`WorkflowSpec::generate`].
#[derive(Debug, Clone)]
pub struct GenerateStep {
    pub name: String,
    pub operation: String,
    /// Carried as this step's own declared `parameters`.
    pub run_params: Value,
    /// Carried as the `execute-step` action that launches this step from
    /// its predecessor's `postoperation`.
    pub step_params: Value,
}

impl WorkflowSpec {
    /// Builds a strictly linear workflow: each step's `postoperation` is a
    /// single terminal rule whose sole action advances to the next step.
    ///
    /// Grounded on `flux/controllers/workflow.py`'s `generate` verb,
    /// recovered here from the original source.
    pub fn generate(name: impl Into<String>, chain: &[GenerateStep]) -> WorkflowSpec {
        let mut steps = BTreeMap::new();
        for (index, item) in chain.iter().enumerate() {
            let postoperation = match chain.get(index + 1) {
                Some(next) => RuleList(vec![Rule {
                    description: None,
                    condition: None,
                    actions: vec![Action::ExecuteStep {
                        step: next.name.clone(),
                        parameters: next.step_params.clone(),
                    }],
                    terminal: true,
                }]),
                None => RuleList::default(),
            };
            steps.insert(
                item.name.clone(),
                StepSpec {
                    description: None,
                    operation: item.operation.clone(),
                    parameters: item.run_params.clone(),
                    preoperation: RuleList::default(),
                    postoperation,
                    timeout: None,
                },
            );
        }

        WorkflowSpec {
            name: name.into(),
            entry: chain.first().map(|s| s.name.clone()).unwrap_or_default(),
            schema: None,
            layout: None,
            parameters: Value::Null,
            products: BTreeMap::new(),
            prerun: RuleList::default(),
            postrun: RuleList::default(),
            preoperation: RuleList::default(),
            postoperation: RuleList::default(),
            steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn generates_a_verifiable_linear_chain() {
        let spec = WorkflowSpec::generate(
            "demo",
            &[
                GenerateStep {
                    name: "a".to_string(),
                    operation: "demo.a".to_string(),
                    run_params: json!({}),
                    step_params: json!({"from": "a"}),
                },
                GenerateStep {
                    name: "b".to_string(),
                    operation: "demo.b".to_string(),
                    run_params: json!({}),
                    step_params: Value::Null,
                },
            ],
        );
        spec.verify().unwrap();
        assert_eq!(spec.entry, "a");
        assert!(spec.steps["b"].postoperation.is_empty());
        let actions = &spec.steps["a"].postoperation.iter().next().unwrap().actions;
        assert_eq!(actions[0].step_reference(), Some("b"));
        match &actions[0] {
            Action::ExecuteStep { parameters, .. } => assert_eq!(parameters, &json!({"from": "a"})),
            other => panic!("expected execute-step action, got {other:?}"),
        }
    }
}
