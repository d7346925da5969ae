//! Error signalling for the interpreter.
//!
//! Every signalled condition names a destination continuation out of the
//! taxonomy bound in the ground environment. Host code raises a
//! `KernelError` through `Result`; the trampoline catches it, builds the
//! first-class `ErrorObject`, fills in the diagnostic slots, and performs
//! the abnormal pass to the destination.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::continuation::Continuation;
use super::environment::Environment;
use super::types::ValueRef;

/// Destination selector for a signalled error.
///
/// The taxonomy is a tree: guarding an ancestor continuation also catches
/// passes into any of its descendants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    System,
    User,
    FileNotFound,
    Parse,
    SymbolNotFound,
    UnboundDynamicKey,
    UnboundStaticKey,
    Value,
    Type,
    OperandMismatch,
    ArityMismatch,
    EncapsulationType,
    CombineWithNonListOperands,
    AddPositiveToNegativeInfinity,
    MultiplyInfinityByZero,
    DivideInfinity,
    DivideByZero,
}

impl ErrorKind {
    /// The ground-environment name of the destination continuation.
    pub fn continuation_name(self) -> &'static str {
        match self {
            ErrorKind::System => "system-error-continuation",
            ErrorKind::User => "user-error-continuation",
            ErrorKind::FileNotFound => "file-not-found-continuation",
            ErrorKind::Parse => "parse-error-continuation",
            ErrorKind::SymbolNotFound => "symbol-not-found-continuation",
            ErrorKind::UnboundDynamicKey => "unbound-dynamic-key-continuation",
            ErrorKind::UnboundStaticKey => "unbound-static-key-continuation",
            ErrorKind::Value => "value-error-continuation",
            ErrorKind::Type => "type-error-continuation",
            ErrorKind::OperandMismatch => "operand-mismatch-continuation",
            ErrorKind::ArityMismatch => "arity-mismatch-continuation",
            ErrorKind::EncapsulationType => "encapsulation-type-error-continuation",
            ErrorKind::CombineWithNonListOperands => "combine-with-non-list-operands-continuation",
            ErrorKind::AddPositiveToNegativeInfinity => {
                "add-positive-to-negative-infinity-continuation"
            }
            ErrorKind::MultiplyInfinityByZero => "multiply-infinity-by-zero-continuation",
            ErrorKind::DivideInfinity => "divide-infinity-continuation",
            ErrorKind::DivideByZero => "divide-by-zero-continuation",
        }
    }
}

/// Host-side error signal, raised by primitives and the evaluator core.
#[derive(Debug, Clone)]
pub struct KernelError {
    pub kind: ErrorKind,
    pub message: String,
    pub irritants: Vec<ValueRef>,
    /// Set when re-signalling an error object that already went through the
    /// trampoline once (e.g. out of an embedded evaluation).
    pub object: Option<Rc<ErrorObject>>,
}

impl KernelError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        KernelError {
            kind,
            message: message.into(),
            irritants: Vec::new(),
            object: None,
        }
    }

    pub fn with_irritants(
        kind: ErrorKind,
        message: impl Into<String>,
        irritants: Vec<ValueRef>,
    ) -> Self {
        KernelError {
            kind,
            message: message.into(),
            irritants,
            object: None,
        }
    }

    pub fn type_error(message: impl Into<String>, irritants: Vec<ValueRef>) -> Self {
        Self::with_irritants(ErrorKind::Type, message, irritants)
    }

    pub fn arity(combiner: &str, expected: &str, got: usize) -> Self {
        Self::new(
            ErrorKind::ArityMismatch,
            format!("{} expects {} arguments, got {}", combiner, expected, got),
        )
    }

    /// Re-signal an already-constructed error object, preserving its
    /// destination continuation.
    pub fn rethrow(object: Rc<ErrorObject>) -> Self {
        KernelError {
            kind: ErrorKind::User,
            message: object.message.clone(),
            irritants: Vec::new(),
            object: Some(object),
        }
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.continuation_name(), self.message)
    }
}

impl std::error::Error for KernelError {}

/// First-class error value.
///
/// The diagnostic slots are filled by the trampoline at catch time; user
/// code only ever sees them populated.
#[derive(Debug)]
pub struct ErrorObject {
    /// Destination continuation the abnormal pass targets.
    pub dest: Rc<Continuation>,
    pub message: String,
    /// Kernel list of irritant values.
    pub irritants: ValueRef,
    pub expr: RefCell<Option<ValueRef>>,
    pub env: RefCell<Option<Rc<Environment>>>,
    pub src_cont: RefCell<Option<Rc<Continuation>>>,
}

impl ErrorObject {
    pub fn new(dest: Rc<Continuation>, message: String, irritants: ValueRef) -> Self {
        ErrorObject {
            dest,
            message,
            irritants,
            expr: RefCell::new(None),
            env: RefCell::new(None),
            src_cont: RefCell::new(None),
        }
    }
}
