use thiserror::Error;

/// Errors raised by tree construction, surgery and clustering.
///
/// Every variant aborts the operation in progress; trees are never left
/// partially rebuilt.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TreeError {
    /// A structural invariant is violated (unary node, cycle, shared child).
    #[error("malformed tree: {0}")]
    MalformedTree(String),

    /// A looked-up label (outgroup, matrix row) does not exist.
    #[error("unknown label '{0}'")]
    UnknownLabel(String),

    /// The operation's structural precondition is unmet.
    #[error("invalid tree state: {0}")]
    InvalidTreeState(String),

    /// A matrix or label list does not have the expected size.
    #[error("dimension mismatch for {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: String,
        expected: usize,
        found: usize,
    },

    #[error("newick parse error at byte {position}: {message}")]
    NewickParse { position: usize, message: String },
}

pub type Result<T> = std::result::Result<T, TreeError>;

impl TreeError {
    pub(crate) fn dimension<S: Into<String>>(what: S, expected: usize, found: usize) -> Self {
        TreeError::DimensionMismatch {
            what: what.into(),
            expected,
            found,
        }
    }
}
