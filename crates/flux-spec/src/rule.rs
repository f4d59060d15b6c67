use flux_core::{interpolate_value, Context};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::Action;

/// A single rule: an optional condition gating a list of actions.
///
/// Grounded on `flux/engine/rule.py`'s `Rule` schema. The original's
/// `Rule.evaluate` is a stub that always returns `True`; this rewrite gives
/// conditions real semantics (see [`Rule::matches`]) while keeping an
/// absent condition as always-true, which is what the original's callers
/// actually observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub condition: Option<Value>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub terminal: bool,
}

impl Rule {
    /// A condition matches when absent, or when every `${...}` reference it
    /// contains resolves against `ctx`.
    pub fn matches(&self, ctx: &Context) -> bool {
        match &self.condition {
            None => true,
            Some(condition) => interpolate_value(condition, ctx).is_ok(),
        }
    }
}

/// An ordered list of rules, evaluated top to bottom.
///
/// Grounded on `flux/engine/rule.py`'s `RuleList.evaluate`: every matching
/// rule's actions run, in order, and evaluation stops at the first matching
/// `terminal` rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleList(#[serde(default)] pub Vec<Rule>);

impl RuleList {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the actions fired by evaluating this rule list against
    /// `ctx`, in execution order.
    pub fn select_actions(&self, ctx: &Context) -> Vec<&Action> {
        let mut actions = Vec::new();
        for rule in &self.0 {
            if rule.matches(ctx) {
                actions.extend(rule.actions.iter());
                if rule.terminal {
                    break;
                }
            }
        }
        actions
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_condition_always_matches() {
        let rule = Rule {
            description: None,
            condition: None,
            actions: vec![],
            terminal: false,
        };
        assert!(rule.matches(&Context::new()));
    }

    #[test]
    fn condition_requires_every_reference_to_resolve() {
        let ctx = Context::from_value(json!({"step": {"out": {"status": "ok"}}}));
        let rule = Rule {
            description: None,
            condition: Some(json!({"status": "${step.out.status}"})),
            actions: vec![],
            terminal: false,
        };
        assert!(rule.matches(&ctx));

        let unmatched = Rule {
            condition: Some(json!({"status": "${step.out.missing}"})),
            ..rule
        };
        assert!(!unmatched.matches(&ctx));
    }

    #[test]
    fn rule_list_stops_at_first_terminal_match() {
        let ctx = Context::new();
        let list = RuleList(vec![
            Rule {
                description: None,
                condition: None,
                actions: vec![Action::IgnoreStepFailure {}],
                terminal: true,
            },
            Rule {
                description: None,
                condition: None,
                actions: vec![Action::ExecuteStep {
                    step: "never".to_string(),
                    parameters: Value::Null,
                }],
                terminal: false,
            },
        ]);
        let actions = list.select_actions(&ctx);
        assert_eq!(actions, vec![&Action::IgnoreStepFailure {}]);
    }
}
