use std::fmt;
use frontend::ast::{ExprRef, Node};
use frontend::visitor::DanglingRef;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Property,
    Method,
    Constructor,
    Function,
    Bean,
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MemberKind::Property => "property",
            MemberKind::Method => "method",
            MemberKind::Constructor => "constructor",
            MemberKind::Function => "function",
            MemberKind::Bean => "bean",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AccessError {
    #[error("{kind} '{member_name}' cannot be found on type {target_type}")]
    NotFound { target_type: String, member_name: String, kind: MemberKind },
    #[error("cannot access '{member_name}' on null")]
    NullTarget { member_name: String },
    #[error("index {index} is out of bounds for {target_type} of size {size}")]
    IndexOutOfBounds { target_type: String, index: i64, size: usize },
    #[error("type {target_type} cannot be indexed")]
    NotIndexable { target_type: String },
    #[error("{operation} is not supported on type {target_type}")]
    NotIterable { target_type: String, operation: &'static str },
    #[error("property '{member_name}' on type {target_type} is not writable")]
    NotWritable { target_type: String, member_name: String },
    #[error("no bean resolver is registered to resolve '@{0}'")]
    NoBeanResolver(String),
    #[error("cannot assign to {0}")]
    NotAssignable(String),
    #[error("'{member_name}' failed: {message}")]
    InvocationFailed { member_name: String, message: String },
}

impl AccessError {
    pub fn not_found(target_type: impl Into<String>, member_name: impl Into<String>, kind: MemberKind) -> Self {
        AccessError::NotFound { target_type: target_type.into(), member_name: member_name.into(), kind }
    }

    pub fn invocation(member_name: impl Into<String>, message: impl Into<String>) -> Self {
        AccessError::InvocationFailed { member_name: member_name.into(), message: message.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    #[error("cannot convert from {from} to {to}")]
    Unsupported { from: String, to: String },
    #[error("cannot convert '{value}' to {to}: {reason}")]
    Failed { value: String, to: String, reason: String },
}

impl ConversionError {
    pub fn unsupported(from: impl Into<String>, to: impl Into<String>) -> Self {
        ConversionError::Unsupported { from: from.into(), to: to.into() }
    }

    pub fn failed(value: impl fmt::Display, to: impl Into<String>, reason: impl Into<String>) -> Self {
        ConversionError::Failed { value: value.to_string(), to: to.into(), reason: reason.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OverloadError {
    #[error("{kind} '{name}({arguments})' is ambiguous between {candidates}")]
    Ambiguous { kind: MemberKind, name: String, arguments: String, candidates: String },
    #[error("no {kind} '{name}' accepts arguments ({arguments})")]
    NoMatch { kind: MemberKind, name: String, arguments: String },
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("type '{name}' cannot be found")]
pub struct TypeNotFoundError {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot modify a constant {collection}")]
pub struct UnsupportedMutationError {
    pub collection: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OperatorError {
    #[error("operator '{operator}' is not supported between {left} and {right}")]
    UnsupportedOperands { operator: &'static str, left: String, right: String },
    #[error("operator '{operator}' is not supported for {operand}")]
    UnsupportedOperand { operator: &'static str, operand: String },
    #[error("division by zero")]
    DivisionByZero,
    #[error("invalid regular expression '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
    #[error("right operand of 'between' must be a list of two elements")]
    InvalidBetweenRange,
}

/// Every failure an evaluation can report.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationErrorKind {
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error(transparent)]
    Overload(#[from] OverloadError),
    #[error(transparent)]
    TypeNotFound(#[from] TypeNotFoundError),
    #[error(transparent)]
    UnsupportedMutation(#[from] UnsupportedMutationError),
    #[error(transparent)]
    Operator(#[from] OperatorError),
    #[error(transparent)]
    Malformed(#[from] DanglingRef),
}

impl EvaluationErrorKind {
    /// Category name, stable across execution paths.
    pub fn name(&self) -> &'static str {
        match self {
            EvaluationErrorKind::Access(_) => "AccessError",
            EvaluationErrorKind::Conversion(_) => "ConversionError",
            EvaluationErrorKind::Overload(OverloadError::Ambiguous { .. }) => "AmbiguousError",
            EvaluationErrorKind::Overload(OverloadError::NoMatch { .. }) => "NoMatchError",
            EvaluationErrorKind::TypeNotFound(_) => "TypeNotFoundError",
            EvaluationErrorKind::UnsupportedMutation(_) => "UnsupportedMutationError",
            EvaluationErrorKind::Operator(_) => "OperatorError",
            EvaluationErrorKind::Malformed(_) => "EvaluationError",
        }
    }

    pub fn at(self, node: ExprRef, span: Node) -> EvaluationError {
        EvaluationError { kind: self, node, span }
    }
}

/// An evaluation failure tied to the node that raised it.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind} (at position {})", .span.start)]
pub struct EvaluationError {
    #[source]
    pub kind: EvaluationErrorKind,
    pub node: ExprRef,
    pub span: Node,
}

impl EvaluationError {
    pub fn position(&self) -> usize {
        self.span.start
    }
}

pub type EvaluationResult<T> = Result<T, EvaluationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages() {
        let err = AccessError::not_found("Point", "z", MemberKind::Property);
        assert_eq!(err.to_string(), "property 'z' cannot be found on type Point");

        let err = EvaluationErrorKind::from(OperatorError::DivisionByZero).at(ExprRef(3), Node::new(4, 9));
        assert_eq!(err.to_string(), "division by zero (at position 4)");
        assert_eq!(err.kind.name(), "OperatorError");
    }

    #[test]
    fn overload_error_names() {
        let ambiguous = EvaluationErrorKind::from(OverloadError::Ambiguous {
            kind: MemberKind::Method,
            name: "f".to_string(),
            arguments: "String".to_string(),
            candidates: "f(int), f(long)".to_string(),
        });
        assert_eq!(ambiguous.name(), "AmbiguousError");
        let no_match = EvaluationErrorKind::from(OverloadError::NoMatch {
            kind: MemberKind::Method,
            name: "f".to_string(),
            arguments: "".to_string(),
        });
        assert_eq!(no_match.name(), "NoMatchError");
    }
}
