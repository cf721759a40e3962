//! Runtime error taxonomy. See spec.md §7: compile errors and runtime
//! errors are separate phases; this covers only the latter.

/// One runtime failure, already carrying its user-facing message. Variants
/// exist to let `loxide-cli` distinguish categories (e.g. for tracing) even
/// though every one renders via its own formatted string.
#[derive(Debug, thiserror::Error)]
pub enum VmError {
    #[error("{0}")]
    Type(String),
    #[error("{0}")]
    Lookup(String),
    #[error("{0}")]
    Arity(String),
    #[error("Stack overflow!")]
    StackOverflow,
    #[error("{0}")]
    Index(String),
    #[error("{0}")]
    Native(String),
}

pub type VmResult<T> = Result<T, VmError>;
