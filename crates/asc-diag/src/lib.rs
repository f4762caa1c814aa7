//! Error taxonomy shared by the asc evaluator and analyzer.
//!
//! Both subsystems surface failures as a kind plus the identifier path
//! traversed to reach the failing node. This crate is standalone: paths are
//! rendered identifier segments, so it has no dependency on the graph model.

use std::fmt;

// ---------------------------------------------------------------------------
// Error kinds
// ---------------------------------------------------------------------------

/// What went wrong. Kinds are shared across analysis and evaluation; the
/// evaluation-only kinds never occur in analyzer reports and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Structurally malformed node.
    InvalidFormat,
    /// Identifier unresolved during analysis.
    NotInScope,
    /// `@`-name used where a definition is required.
    LeadingAtIdent,
    /// Definition tag is not one of the known tags.
    UnknownDefType,
    /// Type reduction yielded an error type.
    TypeError,
    /// Identifier unresolved at runtime.
    UndefinedIdentifier,
    /// A non-callable value was applied to arguments.
    NotCallable,
    /// Callable applied with the wrong argument count.
    ArityMismatch,
    /// The halt predicate requested termination.
    Aborted,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 9] = [
        ErrorKind::InvalidFormat,
        ErrorKind::NotInScope,
        ErrorKind::LeadingAtIdent,
        ErrorKind::UnknownDefType,
        ErrorKind::TypeError,
        ErrorKind::UndefinedIdentifier,
        ErrorKind::NotCallable,
        ErrorKind::ArityMismatch,
        ErrorKind::Aborted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidFormat => "invalid_format",
            ErrorKind::NotInScope => "not_in_scope",
            ErrorKind::LeadingAtIdent => "leading_at_ident",
            ErrorKind::UnknownDefType => "unknown_def_type",
            ErrorKind::TypeError => "type_error",
            ErrorKind::UndefinedIdentifier => "undefined_identifier",
            ErrorKind::NotCallable => "not_callable",
            ErrorKind::ArityMismatch => "arity_mismatch",
            ErrorKind::Aborted => "aborted",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::InvalidFormat => "E0001",
            ErrorKind::NotInScope => "E0002",
            ErrorKind::LeadingAtIdent => "E0003",
            ErrorKind::UnknownDefType => "E0004",
            ErrorKind::TypeError => "E0005",
            ErrorKind::UndefinedIdentifier => "E0101",
            ErrorKind::NotCallable => "E0102",
            ErrorKind::ArityMismatch => "E0103",
            ErrorKind::Aborted => "E0104",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ErrorKind::InvalidFormat => "A definition node is structurally malformed.",
            ErrorKind::NotInScope => "A referenced identifier is not defined in any layer.",
            ErrorKind::LeadingAtIdent => {
                "A `@`-prefixed name was used where a definition is required."
            }
            ErrorKind::UnknownDefType => "A definition carries an unknown tag.",
            ErrorKind::TypeError => "Type analysis produced an error type for this definition.",
            ErrorKind::UndefinedIdentifier => {
                "A referenced identifier could not be resolved at runtime."
            }
            ErrorKind::NotCallable => "A non-callable value was called with arguments.",
            ErrorKind::ArityMismatch => {
                "A callable was applied with the wrong number of arguments."
            }
            ErrorKind::Aborted => "Evaluation was halted by the host's halt predicate.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A failure surfaced by the evaluator or the analyzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    /// Identifier segments traversed to reach the failing node.
    pub path: Vec<String>,
    /// Optional human-oriented detail.
    pub detail: Option<String>,
}

impl Error {
    pub fn new(kind: ErrorKind, path: Vec<String>) -> Self {
        Self {
            kind,
            path,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn rendered_path(&self) -> String {
        self.path.join(".")
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error[{}]: {}", self.kind.code(), self.kind.description())?;
        if !self.path.is_empty() {
            write!(f, " (at `{}`)", self.rendered_path())?;
        }
        if let Some(detail) = &self.detail {
            write!(f, "\n  note: {detail}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

/// Error type wrapping one or more failures, for callers that aggregate
/// results across top-level ids.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}", .0.first().map(|e| e.to_string()).unwrap_or_default())]
pub struct ErrorSet(pub Vec<Error>);

impl ErrorSet {
    pub fn single(err: Error) -> Self {
        Self(vec![err])
    }

    pub fn errors(&self) -> &[Error] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
