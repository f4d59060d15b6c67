use std::collections::{BTreeMap, BTreeSet};

use flux_core::FieldKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SpecError, ValidationError};
use crate::rule::RuleList;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSpec {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub schema: Option<FieldKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutElement {
    pub field: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Layout(#[serde(default)] pub Vec<LayoutElement>);

/// A single named step: the operation it invokes and the rules that run
/// before and after it.
///
/// Grounded on `flux/engine/step.py`'s `Step` element: `parameters` are
/// merged with caller-supplied overrides at initiation time (see
/// `flux-engine`), not here — this type only carries the declared shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    #[serde(default)]
    pub description: Option<String>,
    pub operation: String,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default)]
    pub preoperation: RuleList,
    #[serde(default)]
    pub postoperation: RuleList,
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// A parsed, not-yet-verified workflow specification.
///
/// Grounded on `flux/models/workflow.py`'s `Workflow`/`WorkflowVersion`
/// pair, flattened to a single versionless document (the original's
/// separate version entity is not reproduced; `modified` plays the same
/// cache-invalidation role the original's `version.modified` did, see
/// `flux-engine`'s element cache).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSpec {
    pub name: String,
    pub entry: String,
    #[serde(default)]
    pub schema: Option<FieldKind>,
    #[serde(default)]
    pub layout: Option<Layout>,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default)]
    pub products: BTreeMap<String, ProductSpec>,
    #[serde(default)]
    pub prerun: RuleList,
    #[serde(default)]
    pub postrun: RuleList,
    #[serde(default)]
    pub preoperation: RuleList,
    #[serde(default)]
    pub postoperation: RuleList,
    pub steps: BTreeMap<String, StepSpec>,
}

impl WorkflowSpec {
    pub fn parse(text: &str) -> Result<Self, SpecError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn to_yaml(&self) -> Result<String, SpecError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Checks three structural invariants:
    ///
    /// 1. the entry step must exist.
    /// 2. layout and schema fields must be in exact bijection.
    /// 3. every `execute-step` action, wherever it appears, must name a
    ///    declared step.
    pub fn verify(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if !self.steps.contains_key(&self.entry) {
            errors.push(ValidationError::new("entry", "invalid-entry-step"));
        }

        self.verify_layout_schema_bijection(&mut errors);
        self.verify_step_references(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn verify_layout_schema_bijection(&self, errors: &mut Vec<ValidationError>) {
        let schema_fields: BTreeSet<&str> = self
            .schema
            .as_ref()
            .map(FieldKind::field_names)
            .unwrap_or_default()
            .into_iter()
            .collect();

        match &self.layout {
            None => {
                if !schema_fields.is_empty() {
                    errors.push(ValidationError::new("layout", "missing-layout"));
                }
            }
            Some(layout) => {
                let layout_fields: BTreeSet<&str> =
                    layout.0.iter().map(|e| e.field.as_str()).collect();
                if layout_fields != schema_fields {
                    errors.push(ValidationError::new("layout", "mismatch-form-layout-schema"));
                }
            }
        }
    }

    fn verify_step_references(&self, errors: &mut Vec<ValidationError>) {
        let mut rule_lists: Vec<(&str, &RuleList)> = vec![
            ("prerun", &self.prerun),
            ("postrun", &self.postrun),
            ("preoperation", &self.preoperation),
            ("postoperation", &self.postoperation),
        ];
        for (name, step) in &self.steps {
            rule_lists.push((name, &step.preoperation));
            rule_lists.push((name, &step.postoperation));
        }

        for (path, rules) in rule_lists {
            for rule in rules.iter() {
                for action in &rule.actions {
                    if let Some(step_name) = action.step_reference() {
                        if !self.steps.contains_key(step_name) {
                            errors.push(ValidationError::new(path, "invalid-execute-step"));
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use flux_core::FieldKind;
    use std::collections::BTreeMap as Map;

    fn minimal_yaml() -> &'static str {
        r#"
name: demo
entry: start
steps:
  start:
    operation: demo.op
"#
    }

    #[test]
    fn parse_and_verify_minimal_spec() {
        let spec = WorkflowSpec::parse(minimal_yaml()).unwrap();
        assert_eq!(spec.name, "demo");
        spec.verify().unwrap();
    }

    #[test]
    fn yaml_round_trips() {
        let spec = WorkflowSpec::parse(minimal_yaml()).unwrap();
        let text = spec.to_yaml().unwrap();
        let reparsed = WorkflowSpec::parse(&text).unwrap();
        assert_eq!(spec, reparsed);
    }

    #[test]
    fn verify_rejects_unknown_entry() {
        let mut spec = WorkflowSpec::parse(minimal_yaml()).unwrap();
        spec.entry = "missing".to_string();
        let errors = spec.verify().unwrap_err();
        assert!(errors.iter().any(|e| e.token == "invalid-entry-step"));
    }

    #[test]
    fn verify_rejects_dangling_execute_step() {
        let mut spec = WorkflowSpec::parse(minimal_yaml()).unwrap();
        spec.postrun = RuleList(vec![crate::rule::Rule {
            description: None,
            condition: None,
            actions: vec![Action::ExecuteStep {
                step: "ghost".to_string(),
                parameters: Value::Null,
            }],
            terminal: false,
        }]);
        let errors = spec.verify().unwrap_err();
        assert!(errors.iter().any(|e| e.token == "invalid-execute-step"));
    }

    #[test]
    fn verify_rejects_layout_schema_mismatch() {
        let mut spec = WorkflowSpec::parse(minimal_yaml()).unwrap();
        spec.schema = Some(FieldKind::Structure(Map::from([(
            "title".to_string(),
            FieldKind::Text,
        )])));
        spec.layout = Some(Layout(vec![LayoutElement {
            field: "subtitle".to_string(),
            label: None,
        }]));
        let errors = spec.verify().unwrap_err();
        assert!(errors.iter().any(|e| e.token == "mismatch-form-layout-schema"));
    }
}
