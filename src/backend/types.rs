//! Runtime value model.
//!
//! Every value the evaluator touches is one variant of the `Value` tagged
//! union, handled by reference-counted `ValueRef` handles. Pairs and atoms
//! are immutable after construction; the mutable exceptions are environment
//! bindings, promise cells, the transient continuation mark, and the
//! write-once name slot on compound operatives.

use num_bigint::BigInt;
use num_traits::ToPrimitive;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::continuation::Continuation;
use super::environment::Environment;
use super::error::{ErrorKind, ErrorObject, KernelError};
use super::eval::Step;
use super::symbol::Symbol;
use super::Interp;

pub type ValueRef = Rc<Value>;

/// Position of a datum in its source file, for diagnostics and stepping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePos {
    pub line: u32,
    pub column: u32,
    pub file: Option<Rc<str>>,
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}:{}:{}", file, self.line, self.column),
            None => write!(f, "{}:{}", self.line, self.column),
        }
    }
}

#[derive(Debug)]
pub enum Value {
    String(String),
    Symbol(Symbol),
    Fixnum(i64),
    Bignum(BigInt),
    PositiveInfinity,
    NegativeInfinity,
    Null,
    Ignore,
    Inert,
    Boolean(bool),
    Pair(Pair),
    Environment(Rc<Environment>),
    Compound(Rc<CompoundOperative>),
    Primitive(Primitive),
    Applicative(Applicative),
    /// Combiner face of a captured continuation; applying it triggers an
    /// abnormal pass to the captured destination.
    ContWrapper(Rc<Continuation>),
    Continuation(Rc<Continuation>),
    Error(Rc<ErrorObject>),
    EncapType(Rc<EncapsulationType>),
    Encapsulated(Encapsulated),
    Promise(Rc<Promise>),
}

#[derive(Debug)]
pub struct Pair {
    pub car: ValueRef,
    pub cdr: ValueRef,
    pub pos: Option<SourcePos>,
}

/// Operative closure created by `$vau`.
#[derive(Debug)]
pub struct CompoundOperative {
    pub formals: ValueRef,
    pub eformal: ValueRef,
    /// List of body expressions, evaluated as a sequence.
    pub body: ValueRef,
    pub static_env: Rc<Environment>,
    /// Filled in once by the first `$define!` that binds this operative
    /// under a plain symbol.
    pub name: RefCell<Option<Symbol>>,
}

pub type SimpleFn = fn(&Interp, &ValueRef) -> Result<ValueRef, KernelError>;
pub type FullFn =
    fn(&Interp, &ValueRef, &Rc<Environment>, &Rc<Continuation>) -> Result<Step, KernelError>;

/// Native combiners. `Simple` primitives compute a value from their operand
/// list; `Full` primitives take over the machine step. The remaining
/// variants carry the identity their behavior is keyed on.
#[derive(Clone)]
pub enum Primitive {
    Simple { name: &'static str, f: SimpleFn },
    Full { name: &'static str, f: FullFn },
    EncapConstructor(Rc<EncapsulationType>),
    EncapPredicate(Rc<EncapsulationType>),
    EncapAccessor(Rc<EncapsulationType>),
    DynamicBinder(Rc<DynamicKey>),
    DynamicAccessor(Rc<DynamicKey>),
    StaticBinder(Rc<StaticKey>),
    StaticAccessor(Rc<StaticKey>),
}

impl Primitive {
    pub fn name(&self) -> &'static str {
        match self {
            Primitive::Simple { name, .. } | Primitive::Full { name, .. } => name,
            Primitive::EncapConstructor(_) => "encapsulation-constructor",
            Primitive::EncapPredicate(_) => "encapsulation-predicate",
            Primitive::EncapAccessor(_) => "encapsulation-accessor",
            Primitive::DynamicBinder(_) => "keyed-dynamic-binder",
            Primitive::DynamicAccessor(_) => "keyed-dynamic-accessor",
            Primitive::StaticBinder(_) => "keyed-static-binder",
            Primitive::StaticAccessor(_) => "keyed-static-accessor",
        }
    }
}

impl fmt::Debug for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Primitive({})", self.name())
    }
}

/// The `wrap` relation: a combiner whose operands are evaluated first.
#[derive(Debug, Clone)]
pub struct Applicative {
    pub underlying: ValueRef,
}

/// Opaque identity allocated by `make-encapsulation-type`.
#[derive(Debug)]
pub struct EncapsulationType;

#[derive(Debug, Clone)]
pub struct Encapsulated {
    pub payload: ValueRef,
    pub ty: Rc<EncapsulationType>,
}

/// Identity shared by a keyed-dynamic binder/accessor pair.
#[derive(Debug)]
pub struct DynamicKey;

/// Identity shared by a keyed-static binder/accessor pair.
#[derive(Debug)]
pub struct StaticKey;

/// Memoized thunk cell. `Forwarded` links arise when forcing a promise
/// yields another promise; they keep evaluation at-most-once across chains.
#[derive(Debug)]
pub struct Promise {
    pub cell: RefCell<PromiseCell>,
}

#[derive(Debug, Clone)]
pub enum PromiseCell {
    Pending { expr: ValueRef, env: Rc<Environment> },
    Forwarded(Rc<Promise>),
    Resolved(ValueRef),
}

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

thread_local! {
    static NIL: ValueRef = Rc::new(Value::Null);
    static TRUE: ValueRef = Rc::new(Value::Boolean(true));
    static FALSE: ValueRef = Rc::new(Value::Boolean(false));
    static INERT: ValueRef = Rc::new(Value::Inert);
    static IGNORE: ValueRef = Rc::new(Value::Ignore);
    static POS_INF: ValueRef = Rc::new(Value::PositiveInfinity);
    static NEG_INF: ValueRef = Rc::new(Value::NegativeInfinity);
}

pub fn nil() -> ValueRef {
    NIL.with(Rc::clone)
}

pub fn inert() -> ValueRef {
    INERT.with(Rc::clone)
}

pub fn ignore() -> ValueRef {
    IGNORE.with(Rc::clone)
}

pub fn boolean(b: bool) -> ValueRef {
    if b {
        TRUE.with(Rc::clone)
    } else {
        FALSE.with(Rc::clone)
    }
}

pub fn positive_infinity() -> ValueRef {
    POS_INF.with(Rc::clone)
}

pub fn negative_infinity() -> ValueRef {
    NEG_INF.with(Rc::clone)
}

pub fn fixnum(n: i64) -> ValueRef {
    Rc::new(Value::Fixnum(n))
}

/// Normalizing bignum constructor: values that fit a fixnum become one.
pub fn integer(n: BigInt) -> ValueRef {
    match n.to_i64() {
        Some(small) => fixnum(small),
        None => Rc::new(Value::Bignum(n)),
    }
}

pub fn string(s: impl Into<String>) -> ValueRef {
    Rc::new(Value::String(s.into()))
}

pub fn symbol(s: Symbol) -> ValueRef {
    Rc::new(Value::Symbol(s))
}

pub fn cons(car: ValueRef, cdr: ValueRef) -> ValueRef {
    Rc::new(Value::Pair(Pair {
        car,
        cdr,
        pos: None,
    }))
}

pub fn cons_at(car: ValueRef, cdr: ValueRef, pos: Option<SourcePos>) -> ValueRef {
    Rc::new(Value::Pair(Pair { car, cdr, pos }))
}

pub fn applicative(underlying: ValueRef) -> ValueRef {
    Rc::new(Value::Applicative(Applicative { underlying }))
}

/// Build a proper list from the given values.
pub fn list_from(items: Vec<ValueRef>) -> ValueRef {
    let mut out = nil();
    for item in items.into_iter().rev() {
        out = cons(item, out);
    }
    out
}

// ---------------------------------------------------------------------------
// List plumbing
// ---------------------------------------------------------------------------

/// Iterator over the pair spine of a list; stops at the first non-pair cdr.
pub struct ListIter {
    cursor: ValueRef,
}

impl ListIter {
    /// The remaining tail (nil for a fully consumed proper list).
    pub fn rest(&self) -> ValueRef {
        self.cursor.clone()
    }
}

impl Iterator for ListIter {
    type Item = ValueRef;

    fn next(&mut self) -> Option<ValueRef> {
        let (car, cdr) = match &*self.cursor {
            Value::Pair(p) => (p.car.clone(), p.cdr.clone()),
            _ => return None,
        };
        self.cursor = cdr;
        Some(car)
    }
}

pub fn iter_list(v: &ValueRef) -> ListIter {
    ListIter { cursor: v.clone() }
}

/// Collect a proper list into a vector; signals a value error on an
/// improper tail.
pub fn list_elements(v: &ValueRef) -> Result<Vec<ValueRef>, KernelError> {
    let mut iter = iter_list(v);
    let mut out = Vec::new();
    for item in iter.by_ref() {
        out.push(item);
    }
    match &*iter.rest() {
        Value::Null => Ok(out),
        _ => Err(KernelError::with_irritants(
            ErrorKind::Value,
            "expected a proper list",
            vec![v.clone()],
        )),
    }
}

impl Value {
    /// Structural equality: value equality for atoms, recursive for pairs,
    /// identity for the remaining composites (modulo applicative layers).
    pub fn equal(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Fixnum(a), Value::Fixnum(b)) => a == b,
            (Value::Bignum(a), Value::Bignum(b)) => a == b,
            (Value::PositiveInfinity, Value::PositiveInfinity) => true,
            (Value::NegativeInfinity, Value::NegativeInfinity) => true,
            (Value::Null, Value::Null) => true,
            (Value::Ignore, Value::Ignore) => true,
            (Value::Inert, Value::Inert) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Pair(a), Value::Pair(b)) => {
                // Recurse on cars, iterate on cdrs so long lists do not
                // consume the native stack.
                if !a.car.equal(&b.car) {
                    return false;
                }
                let mut x = a.cdr.clone();
                let mut y = b.cdr.clone();
                loop {
                    match (&*x, &*y) {
                        (Value::Pair(p), Value::Pair(q)) => {
                            if !p.car.equal(&q.car) {
                                return false;
                            }
                            let (nx, ny) = (p.cdr.clone(), q.cdr.clone());
                            x = nx;
                            y = ny;
                        }
                        _ => return x.equal(&y),
                    }
                }
            }
            (Value::Environment(a), Value::Environment(b)) => Rc::ptr_eq(a, b),
            (Value::Compound(a), Value::Compound(b)) => Rc::ptr_eq(a, b),
            (Value::Primitive(a), Value::Primitive(b)) => primitive_eq(a, b),
            (Value::Applicative(a), Value::Applicative(b)) => a.underlying.equal(&b.underlying),
            (Value::ContWrapper(a), Value::ContWrapper(b)) => Rc::ptr_eq(a, b),
            (Value::Continuation(a), Value::Continuation(b)) => Rc::ptr_eq(a, b),
            (Value::Error(a), Value::Error(b)) => Rc::ptr_eq(a, b),
            (Value::EncapType(a), Value::EncapType(b)) => Rc::ptr_eq(a, b),
            (Value::Encapsulated(a), Value::Encapsulated(b)) => {
                Rc::ptr_eq(&a.ty, &b.ty) && a.payload.equal(&b.payload)
            }
            (Value::Promise(a), Value::Promise(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn is_combiner(&self) -> bool {
        matches!(
            self,
            Value::Compound(_) | Value::Primitive(_) | Value::Applicative(_) | Value::ContWrapper(_)
        )
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Fixnum(_) => "fixnum",
            Value::Bignum(_) => "bignum",
            Value::PositiveInfinity => "exact-positive-infinity",
            Value::NegativeInfinity => "exact-negative-infinity",
            Value::Null => "null",
            Value::Ignore => "ignore",
            Value::Inert => "inert",
            Value::Boolean(_) => "boolean",
            Value::Pair(_) => "pair",
            Value::Environment(_) => "environment",
            Value::Compound(_) => "compound-operative",
            Value::Primitive(_) => "primitive-operative",
            Value::Applicative(_) => "applicative",
            Value::ContWrapper(_) => "continuation-wrapper",
            Value::Continuation(_) => "continuation",
            Value::Error(_) => "error-object",
            Value::EncapType(_) => "encapsulation-type",
            Value::Encapsulated(_) => "encapsulated-object",
            Value::Promise(_) => "promise",
        }
    }

    pub fn as_environment(&self) -> Option<&Rc<Environment>> {
        match self {
            Value::Environment(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_continuation(&self) -> Option<&Rc<Continuation>> {
        match self {
            Value::Continuation(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<Symbol> {
        match self {
            Value::Symbol(s) => Some(*s),
            _ => None,
        }
    }
}

fn primitive_eq(a: &Primitive, b: &Primitive) -> bool {
    // Named primitives are registered once, so the name is the identity.
    match (a, b) {
        (Primitive::Simple { name: na, .. }, Primitive::Simple { name: nb, .. }) => na == nb,
        (Primitive::Full { name: na, .. }, Primitive::Full { name: nb, .. }) => na == nb,
        (Primitive::EncapConstructor(a), Primitive::EncapConstructor(b)) => Rc::ptr_eq(a, b),
        (Primitive::EncapPredicate(a), Primitive::EncapPredicate(b)) => Rc::ptr_eq(a, b),
        (Primitive::EncapAccessor(a), Primitive::EncapAccessor(b)) => Rc::ptr_eq(a, b),
        (Primitive::DynamicBinder(a), Primitive::DynamicBinder(b)) => Rc::ptr_eq(a, b),
        (Primitive::DynamicAccessor(a), Primitive::DynamicAccessor(b)) => Rc::ptr_eq(a, b),
        (Primitive::StaticBinder(a), Primitive::StaticBinder(b)) => Rc::ptr_eq(a, b),
        (Primitive::StaticAccessor(a), Primitive::StaticAccessor(b)) => Rc::ptr_eq(a, b),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => {
                write!(f, "\"")?;
                for ch in s.chars() {
                    match ch {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                write!(f, "\"")
            }
            Value::Symbol(s) => write!(f, "{}", s),
            Value::Fixnum(n) => write!(f, "{}", n),
            Value::Bignum(n) => write!(f, "{}", n),
            Value::PositiveInfinity => write!(f, "#e+infinity"),
            Value::NegativeInfinity => write!(f, "#e-infinity"),
            Value::Null => write!(f, "()"),
            Value::Ignore => write!(f, "#ignore"),
            Value::Inert => write!(f, "#inert"),
            Value::Boolean(true) => write!(f, "#t"),
            Value::Boolean(false) => write!(f, "#f"),
            Value::Pair(p) => {
                // List-aware printing: iterate the spine, dot an improper
                // tail.
                write!(f, "({}", p.car)?;
                let mut rest = p.cdr.clone();
                loop {
                    match &*rest.clone() {
                        Value::Pair(q) => {
                            write!(f, " {}", q.car)?;
                            rest = q.cdr.clone();
                        }
                        Value::Null => break,
                        other => {
                            write!(f, " . {}", other)?;
                            break;
                        }
                    }
                }
                write!(f, ")")
            }
            Value::Environment(_) => write!(f, "#[environment]"),
            Value::Compound(op) => match *op.name.borrow() {
                Some(name) => write!(f, "#[operative {}]", name),
                None => write!(f, "#[operative]"),
            },
            Value::Primitive(p) => write!(f, "#[primitive {}]", p.name()),
            Value::Applicative(a) => write!(f, "#[applicative {}]", a.underlying),
            Value::ContWrapper(_) => write!(f, "#[continuation-wrapper]"),
            Value::Continuation(c) => write!(f, "#[continuation {}]", c.describe()),
            Value::Error(e) => write!(f, "#[error {:?}]", e.message),
            Value::EncapType(_) => write!(f, "#[encapsulation-type]"),
            Value::Encapsulated(_) => write!(f, "#[encapsulated]"),
            Value::Promise(_) => write!(f, "#[promise]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::symbol::intern;

    #[test]
    fn test_list_roundtrip() {
        let ls = list_from(vec![fixnum(1), fixnum(2), fixnum(3)]);
        let items = list_elements(&ls).unwrap();
        assert_eq!(items.len(), 3);
        assert!(matches!(&*items[0], Value::Fixnum(1)));
        assert_eq!(format!("{}", ls), "(1 2 3)");
    }

    #[test]
    fn test_dotted_display() {
        let v = cons(fixnum(1), fixnum(2));
        assert_eq!(format!("{}", v), "(1 . 2)");
    }

    #[test]
    fn test_structural_equality() {
        let a = list_from(vec![symbol(intern("a")), string("x")]);
        let b = list_from(vec![symbol(intern("a")), string("x")]);
        assert!(a.equal(&b));
        let c = cons(fixnum(1), fixnum(2));
        assert!(!a.equal(&c));
    }

    #[test]
    fn test_pair_rebuild_is_equal() {
        let p = cons(fixnum(4), string("tail"));
        if let Value::Pair(inner) = &*p {
            let rebuilt = cons(inner.car.clone(), inner.cdr.clone());
            assert!(p.equal(&rebuilt));
        } else {
            unreachable!();
        }
    }

    #[test]
    fn test_integer_normalization() {
        use num_bigint::BigInt;
        let small = integer(BigInt::from(42));
        assert!(matches!(&*small, Value::Fixnum(42)));
        let big = integer(BigInt::from(i64::MAX) + 1);
        assert!(matches!(&*big, Value::Bignum(_)));
    }

    #[test]
    fn test_improper_list_elements_rejected() {
        let v = cons(fixnum(1), fixnum(2));
        assert!(list_elements(&v).is_err());
    }

    #[test]
    fn test_string_display_escapes() {
        let s = string("a\"b\\c");
        assert_eq!(format!("{}", s), "\"a\\\"b\\\\c\"");
    }
}
