//! Error types for the disir context engine

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Closed set of error conditions a core operation may signal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Null pointer / out-of-range numeric / empty where forbidden
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Allocation failure
    #[error("no memory: {0}")]
    NoMemory(String),

    /// Queried element absent
    #[error("does not exist: {0}")]
    NotExist(String),

    /// Duplicate insert
    #[error("already exists: {0}")]
    Exists(String),

    /// Operation legal but applied to wrong variant, or variant mismatch with mold equivalent
    #[error("wrong context: {0}")]
    WrongContext(String),

    /// Value-typed op on incompatible value-type
    #[error("wrong value type: expected {expected}, got {actual}")]
    WrongValueType {
        /// The type the operation expected
        expected: String,
        /// The type actually found
        actual: String,
    },

    /// Constructing/Finalized/Invalid state violation
    #[error("context in wrong state: {0}")]
    ContextInWrongState(String),

    /// Soft verdict: node exists but failed validation, still attached to a constructing parent
    #[error("invalid context: {0}")]
    InvalidContext(String),

    /// Config node has no mold equivalent
    #[error("mold missing: {0}")]
    MoldMissing(String),

    /// Duplicate introduced_version within a Default queue
    #[error("conflicting semver: {0}")]
    ConflictingSemver(String),

    /// Cardinality or value restriction failed
    #[error("restriction violated: {0}")]
    RestrictionViolated(String),

    /// This node is Ok but at least one descendant is not
    #[error("elements invalid: {0}")]
    ElementsInvalid(String),

    /// Legal per API but unsupported for this variant combination
    #[error("no can do: {0}")]
    NoCanDo(String),

    /// Unreachable / contract broken
    #[error("internal error: {0}")]
    InternalError(String),
}

impl Error {
    /// Ranks errors by the validator's aggregation precedence (§4.8), strongest first.
    /// Returns `None` for error kinds the validator never produces (construction/query errors).
    pub fn validation_rank(&self) -> Option<u8> {
        match self {
            Error::InternalError(_) => Some(6),
            Error::RestrictionViolated(_) => Some(5),
            Error::WrongValueType { .. } => Some(4),
            Error::MoldMissing(_) => Some(3),
            Error::InvalidContext(_) => Some(2),
            Error::ElementsInvalid(_) => Some(1),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_rank_precedence() {
        assert!(Error::InternalError("x".into()).validation_rank()
            > Error::RestrictionViolated("x".into()).validation_rank());
        assert!(Error::RestrictionViolated("x".into()).validation_rank()
            > Error::WrongValueType { expected: "a".into(), actual: "b".into() }.validation_rank());
        assert!(Error::WrongValueType { expected: "a".into(), actual: "b".into() }.validation_rank()
            > Error::MoldMissing("x".into()).validation_rank());
        assert!(Error::MoldMissing("x".into()).validation_rank()
            > Error::InvalidContext("x".into()).validation_rank());
        assert!(Error::InvalidContext("x".into()).validation_rank()
            > Error::ElementsInvalid("x".into()).validation_rank());
    }

    #[test]
    fn test_wrong_value_type_message_names_types() {
        let err = Error::WrongValueType { expected: "Boolean".into(), actual: "Integer".into() };
        let msg = err.to_string();
        assert!(msg.contains("Boolean"));
        assert!(msg.contains("Integer"));
    }
}
