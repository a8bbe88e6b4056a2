use thiserror::Error;

/// Configuration-class errors (spec.md §7 "Configuration" row): aggregated
/// by the diff applier, never individually fatal on their own — the applier
/// decides disposition (fatal at first load, revert on reload).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("dangling reference: {kind} '{name}' referenced by {referrer} does not exist")]
    DanglingReference {
        kind: &'static str,
        name: String,
        referrer: String,
    },
    #[error("duplicate name: {kind} '{name}' is defined more than once")]
    DuplicateName { kind: &'static str, name: String },
    #[error("illegal character in {kind} name '{name}'")]
    IllegalName { kind: &'static str, name: String },
    #[error("circular {kind} dependency: {cycle}")]
    Cycle { kind: &'static str, cycle: String },
    #[error("invalid value for {field} on {entity}: {reason}")]
    InvalidValue {
        entity: String,
        field: &'static str,
        reason: String,
    },
}

/// Aggregated validation failure: the diff applier never stops at the first
/// error, it collects everything so a reload reports the whole problem set.
#[derive(Debug, Clone, Default)]
pub struct ValidationErrors(pub Vec<GraphError>);

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} configuration error(s): ", self.0.len())?;
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

#[derive(Error, Debug)]
pub enum ReloadError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error("first load has no prior generation to revert to")]
    NoPriorGeneration,
}

pub type Result<T> = std::result::Result<T, GraphError>;
