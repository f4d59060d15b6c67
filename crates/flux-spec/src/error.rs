use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpecError {
    #[error("malformed workflow specification: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// A validation failure keyed by a dotted path and a machine-readable
/// token, mirroring the `{path: ValidationError(token)}` shape the
/// original system's `scheme` validation layer produces.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{path}: {token}")]
pub struct ValidationError {
    pub path: String,
    pub token: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            token: token.into(),
        }
    }
}
