//! Error kinds and accumulation: parsing and lowering are best-effort and
//! accumulate errors into an ordered list rather than aborting on the first
//! failure.

use thiserror::Error;

use crate::arch::MemoryValueError;
use crate::common::CodePositionInterval;

/// How badly an error affects the final representation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

impl Severity {
    /// Fatal and Error severities make the final representation unexecutable.
    pub fn blocks_execution(self) -> bool {
        matches!(self, Severity::Error | Severity::Fatal)
    }
}

/// The categories named in the error handling design.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileErrorKind {
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("invalid identifier: {0:?}")]
    BadIdentifier(String),
    #[error("unexpected token: {0:?}")]
    UnexpectedToken(String),
    #[error("duplicate label: {0:?}")]
    DuplicateLabel(String),
    #[error("duplicate symbol: {0:?}")]
    DuplicateSymbol(String),
    #[error("unknown directive: {0:?}")]
    UnknownDirective(String),
    #[error("macro {name:?} has no overload accepting {given} argument(s)")]
    MacroArityMismatch { name: String, given: usize },
    #[error("cyclic macro call involving {0:?}")]
    CyclicMacro(String),
    #[error("symbol replacement did not converge within {0} iterations")]
    SymbolReplacementDepthExceeded(usize),
    #[error(".endm without matching .macro")]
    DanglingEndm,
    #[error("unknown section: {0:?}")]
    UnknownSection(String),
    #[error("wrong number of operands: expected {expected}, got {got}")]
    WrongOperandCount { expected: usize, got: usize },
    #[error("wrong operand type at position {index}: {message}")]
    WrongOperandType { index: usize, message: String },
    #[error("immediate out of range: {value} does not fit in {bits} bits")]
    ImmediateOutOfRange { value: i64, bits: u32 },
    #[error("invalid register name: {0:?}")]
    InvalidRegister(String),
    #[error("unknown instruction mnemonic: {0:?}")]
    UnknownMnemonic(String),
}

/// One accumulated error, localized where possible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub severity: Severity,
    pub position: Option<CodePositionInterval>,
}

impl CompileError {
    pub fn new(kind: CompileErrorKind, severity: Severity) -> Self {
        CompileError {
            kind,
            severity,
            position: None,
        }
    }

    pub fn at(kind: CompileErrorKind, severity: Severity, position: CodePositionInterval) -> Self {
        CompileError {
            kind,
            severity,
            position: Some(position),
        }
    }
}

/// An ordered, growable collection of [`CompileError`]s accumulated across a
/// whole parse/lower run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileErrorList {
    errors: Vec<CompileError>,
}

impl CompileErrorList {
    pub fn new() -> Self {
        CompileErrorList::default()
    }

    pub fn push(&mut self, error: CompileError) {
        if error.severity.blocks_execution() {
            tracing::error!(%error, "compile error");
        } else {
            tracing::warn!(%error, "compile warning");
        }
        self.errors.push(error);
    }

    pub fn extend(&mut self, other: CompileErrorList) {
        for error in other.errors {
            self.push(error);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompileError> {
        self.errors.iter()
    }

    /// A single error of severity Fatal or Error makes the final
    /// representation unexecutable.
    pub fn blocks_execution(&self) -> bool {
        self.errors.iter().any(|e| e.severity.blocks_execution())
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.position {
            Some(pos) => write!(f, "[{:?} @ {}] {}", self.severity, pos, self.kind),
            None => write!(f, "[{:?}] {}", self.severity, self.kind),
        }
    }
}

impl std::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl IntoIterator for CompileErrorList {
    type Item = CompileError;
    type IntoIter = std::vec::IntoIter<CompileError>;
    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

/// Errors that can occur while stepping the simulated store at execution
/// time. A single step aborts on one of these; the store stays in the state
/// it had before the failing operation began.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("memory access out of range: address {address} + {length} exceeds memory size {memory_size}")]
    MemoryOutOfRange {
        address: u64,
        length: usize,
        memory_size: usize,
    },
    #[error("resulting program counter {0:#x} is out of range")]
    ProgramCounterOutOfRange(u64),
    #[error("unknown register: {0:?}")]
    UnknownRegister(String),
    #[error("register width mismatch for {name:?}: expected {expected} bits, got {got} bits")]
    RegisterWidthMismatch {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error(transparent)]
    Value(#[from] MemoryValueError),
}

/// Errors surfaced by an [`crate::arch::ExtensionProvider`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("extension {0:?} not found")]
    NotFound(String),
    #[error("malformed extension data for {name:?}: {message}")]
    Malformed { name: String, message: String },
    #[error("i/o error loading extension {name:?}: {message}")]
    Io { name: String, message: String },
}

/// Errors raised while assembling an architecture out of a formula.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArchitectureError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("architecture is incomplete: {0}")]
    Incomplete(String),
    #[error("unknown enclosing register {enclosing:?} referenced by {register:?}")]
    UnknownEnclosing { register: String, enclosing: String },
    #[error("constituent {child:?} of {enclosing:?} has bit offset {offset} outside the enclosing register's width {width}")]
    ConstituentOutOfRange {
        enclosing: String,
        child: String,
        offset: usize,
        width: usize,
    },
}
