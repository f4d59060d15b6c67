use serde_json::{Map, Value};

/// A nested `{run: {...}, step: {...}}` tree resolved by dotted-path lookups.
///
/// Mirrors the original system's `Interpolator(dict)`: a plain mapping that
/// grows by recursive merge rather than by declared fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    root: Value,
}

impl Context {
    pub fn new() -> Self {
        Self {
            root: Value::Object(Map::new()),
        }
    }

    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    pub fn into_value(self) -> Value {
        self.root
    }

    /// Deep-merges `patch` into this context. Objects merge key by key;
    /// arrays and scalars replace the existing value outright.
    pub fn merge(&mut self, patch: Value) {
        recursive_merge(&mut self.root, patch);
    }

    /// Builds a context from several values, merged in order — later
    /// arguments win on key conflicts. Used to assemble the `{run: ...,
    /// step: ...}` context from independently-built fragments.
    pub fn assemble(parts: impl IntoIterator<Item = Value>) -> Self {
        let mut ctx = Self::new();
        for part in parts {
            ctx.merge(part);
        }
        ctx
    }

    /// Returns a clone with `patch` merged in, leaving `self` untouched.
    pub fn cloned_with(&self, patch: Value) -> Self {
        let mut next = self.clone();
        next.merge(patch);
        next
    }

    /// Resolves a dotted path (`"run.id"`) against the context.
    ///
    /// `Some(value)` is returned even when the resolved value is `Null`;
    /// `None` means some segment of the path does not exist at all, which
    /// callers must treat distinctly from a present-but-null value.
    pub fn resolve(&self, path: &str) -> Option<&Value> {
        let mut current = &self.root;
        for segment in path.split('.') {
            if segment.is_empty() {
                return None;
            }
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }
}

/// Deep-merges `patch` onto a clone of `base`, the same rule `Context::merge`
/// applies to its own root — used wherever a parameter layering order needs
/// the identical "objects merge, arrays/scalars replace" semantics outside
/// of a `Context` (step/operation parameter layering).
pub fn merge_values(base: &Value, patch: &Value) -> Value {
    let mut merged = base.clone();
    recursive_merge(&mut merged, patch.clone());
    merged
}

fn recursive_merge(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                match base_map.get_mut(&key) {
                    Some(existing) => recursive_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base_slot, patch_value) => {
            *base_slot = patch_value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_replaces_scalars_and_arrays() {
        let mut ctx = Context::from_value(json!({"run": {"id": 1, "tags": ["a"]}}));
        ctx.merge(json!({"run": {"id": 2, "tags": ["b", "c"]}}));
        assert_eq!(ctx.as_value(), &json!({"run": {"id": 2, "tags": ["b", "c"]}}));
    }

    #[test]
    fn merge_is_recursive_on_nested_objects() {
        let mut ctx = Context::from_value(json!({"run": {"id": 1, "name": "x"}}));
        ctx.merge(json!({"run": {"id": 2}}));
        assert_eq!(ctx.as_value(), &json!({"run": {"id": 2, "name": "x"}}));
    }

    #[test]
    fn resolve_distinguishes_missing_from_null() {
        let ctx = Context::from_value(json!({"run": {"id": null}}));
        assert_eq!(ctx.resolve("run.id"), Some(&Value::Null));
        assert_eq!(ctx.resolve("run.missing"), None);
        assert_eq!(ctx.resolve("missing.path"), None);
    }
}
