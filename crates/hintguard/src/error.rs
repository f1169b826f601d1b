use std::fmt::Display;

use crate::violation::Violation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HintErrorKind {
    /// The hint (or one of its children) has no sign or no generator branch.
    Unsupported,
    /// A root-only construct appeared nested inside another hint.
    Misplaced,
    /// A type variable was rebound to a different hint by a nested subscription.
    TypeVarConflict,
    /// A partially-defined alias names something that cannot be deferred.
    ForwardRefUnresolvable,
    /// A forward-reference proxy failed to resolve at check time.
    ForwardRefResolution,
    /// Invariant violated inside the engine itself.
    Internal,
}

impl HintErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            HintErrorKind::Unsupported => "unsupported",
            HintErrorKind::Misplaced => "misplaced",
            HintErrorKind::TypeVarConflict => "typevar_conflict",
            HintErrorKind::ForwardRefUnresolvable => "forward_ref_unresolvable",
            HintErrorKind::ForwardRefResolution => "forward_ref_resolution",
            HintErrorKind::Internal => "internal",
        }
    }
}

#[derive(Debug, Clone)]
pub struct HintError {
    pub kind: HintErrorKind,
    pub message: String,
}

impl HintError {
    pub fn new(kind: HintErrorKind, message: String) -> Self {
        Self { kind, message }
    }

    pub fn unsupported(message: String) -> Self {
        Self::new(HintErrorKind::Unsupported, message)
    }

    pub fn internal(message: String) -> Self {
        Self::new(HintErrorKind::Internal, message)
    }

    /// Prepend caller-facing context (which callable, which parameter).
    pub fn with_context(mut self, context: &str) -> Self {
        if !context.is_empty() {
            self.message = format!("{context}{}", self.message);
        }
        self
    }
}

impl std::error::Error for HintError {}

impl Display for HintError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.kind.as_str())
    }
}

/// Failure raised while checking a concrete value at call time.
#[derive(Debug, Clone)]
pub enum CheckError {
    Violation(Violation),
    Hint(HintError),
    /// Wrong number of positional arguments for the wrapped callable.
    Arity {
        callable: String,
        expected: usize,
        got: usize,
    },
}

impl CheckError {
    pub fn as_violation(&self) -> Option<&Violation> {
        match self {
            CheckError::Violation(v) => Some(v),
            _ => None,
        }
    }
}

impl From<HintError> for CheckError {
    fn from(err: HintError) -> Self {
        CheckError::Hint(err)
    }
}

impl std::error::Error for CheckError {}

impl Display for CheckError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckError::Violation(v) => write!(f, "{v}"),
            CheckError::Hint(e) => write!(f, "{e}"),
            CheckError::Arity {
                callable,
                expected,
                got,
            } => write!(
                f,
                "{callable}() takes {expected} positional argument(s) but {got} were given"
            ),
        }
    }
}
