//! Evaluator backend: value model, environments, continuations, the
//! trampoline, and the ground-environment primitives.
//!
//! `Interp` is the process-wide context: the root of the continuation
//! tree, the named error continuations, the ground environment, the
//! debugger state, and the source search path. It is constructed once and
//! passed by reference into the evaluator.

pub mod continuation;
pub mod debug;
pub mod environment;
pub mod error;
pub mod eval;
pub mod grounded;
pub mod number;
pub mod symbol;
pub mod types;

use std::path::{Path, PathBuf};
use std::rc::Rc;

use continuation::{ContKind, Continuation};
use debug::DebugState;
use environment::Environment;
use error::{ErrorKind, KernelError};
use symbol::intern;
use types::{Value, ValueRef};

pub struct Interp {
    pub root_cont: Rc<Continuation>,
    pub base_error_cont: Rc<Continuation>,
    error_conts: Vec<(ErrorKind, Rc<Continuation>)>,
    pub ground: Rc<Environment>,
    pub debug: DebugState,
    search_paths: Vec<PathBuf>,
}

impl Interp {
    /// Build the ground environment and load `kernel.k` into it.
    pub fn new() -> Result<Interp, KernelError> {
        let interp = Interp::bare();
        interp.load_into("kernel.k", &interp.ground)?;
        tracing::debug!("ground environment ready");
        Ok(interp)
    }

    /// Context with primitives installed but no bootstrap file loaded.
    fn bare() -> Interp {
        let root = Continuation::root();
        let base_error = Continuation::new(ContKind::BaseError, root.clone());
        let named = |kind: ErrorKind, prev: &Rc<Continuation>| {
            Continuation::new(ContKind::Named(kind.continuation_name()), prev.clone())
        };

        // The error taxonomy is a continuation tree: guarding an ancestor
        // also intercepts passes into its descendants.
        let error = Continuation::new(ContKind::Named("error-continuation"), base_error.clone());
        let system = named(ErrorKind::System, &error);
        let user = named(ErrorKind::User, &error);
        let file_not_found = named(ErrorKind::FileNotFound, &user);
        let parse = named(ErrorKind::Parse, &user);
        let symbol_not_found = named(ErrorKind::SymbolNotFound, &user);
        let unbound_dynamic = named(ErrorKind::UnboundDynamicKey, &user);
        let unbound_static = named(ErrorKind::UnboundStaticKey, &user);
        let value_error = named(ErrorKind::Value, &user);
        let type_error = named(ErrorKind::Type, &user);
        let operand_mismatch = named(ErrorKind::OperandMismatch, &type_error);
        let arity_mismatch = named(ErrorKind::ArityMismatch, &operand_mismatch);
        let encapsulation = named(ErrorKind::EncapsulationType, &type_error);
        let non_list = named(ErrorKind::CombineWithNonListOperands, &type_error);
        let add_infinities = named(ErrorKind::AddPositiveToNegativeInfinity, &error);
        let mul_inf_zero = named(ErrorKind::MultiplyInfinityByZero, &error);
        let div_infinity = named(ErrorKind::DivideInfinity, &error);
        let div_zero = named(ErrorKind::DivideByZero, &error);

        let error_conts = vec![
            (ErrorKind::System, system),
            (ErrorKind::User, user),
            (ErrorKind::FileNotFound, file_not_found),
            (ErrorKind::Parse, parse),
            (ErrorKind::SymbolNotFound, symbol_not_found),
            (ErrorKind::UnboundDynamicKey, unbound_dynamic),
            (ErrorKind::UnboundStaticKey, unbound_static),
            (ErrorKind::Value, value_error),
            (ErrorKind::Type, type_error),
            (ErrorKind::OperandMismatch, operand_mismatch),
            (ErrorKind::ArityMismatch, arity_mismatch),
            (ErrorKind::EncapsulationType, encapsulation),
            (ErrorKind::CombineWithNonListOperands, non_list),
            (ErrorKind::AddPositiveToNegativeInfinity, add_infinities),
            (ErrorKind::MultiplyInfinityByZero, mul_inf_zero),
            (ErrorKind::DivideInfinity, div_infinity),
            (ErrorKind::DivideByZero, div_zero),
        ];

        let ground = Environment::empty();
        grounded::install(&ground);

        ground.define(intern("root-continuation"), Rc::new(Value::Continuation(root.clone())));
        ground.define(
            intern("error-continuation"),
            Rc::new(Value::Continuation(error)),
        );
        for (kind, cont) in &error_conts {
            ground.define(
                intern(kind.continuation_name()),
                Rc::new(Value::Continuation(cont.clone())),
            );
        }

        Interp {
            root_cont: root,
            base_error_cont: base_error,
            error_conts,
            ground,
            debug: DebugState::default(),
            search_paths: search_paths(),
        }
    }

    /// Destination continuation for a signalled error kind.
    pub fn continuation_for(&self, kind: ErrorKind) -> Rc<Continuation> {
        self.error_conts
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, c)| c.clone())
            .unwrap_or_else(|| self.base_error_cont.clone())
    }

    /// A fresh environment chaining the ground environment.
    pub fn standard_environment(&self) -> Rc<Environment> {
        Environment::new([self.ground.clone()])
    }

    /// Standard environment with `extension.k` loaded into it.
    pub fn extended_environment(&self) -> Result<Rc<Environment>, KernelError> {
        let env = self.standard_environment();
        self.load_into("extension.k", &env)?;
        Ok(env)
    }

    /// Locate a source file on the search path.
    pub fn resolve_source(&self, name: &str) -> Option<PathBuf> {
        let direct = Path::new(name);
        if direct.is_file() {
            return Some(direct.to_path_buf());
        }
        self.search_paths
            .iter()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
    }

    /// Read and parse a source file into its top-level expressions.
    pub fn read_program(&self, name: &str) -> Result<Vec<ValueRef>, KernelError> {
        let path = self.resolve_source(name).ok_or_else(|| {
            KernelError::with_irritants(
                ErrorKind::FileNotFound,
                format!("cannot find {}", name),
                vec![types::string(name)],
            )
        })?;
        let text = std::fs::read_to_string(&path).map_err(|e| {
            KernelError::new(
                ErrorKind::FileNotFound,
                format!("cannot read {}: {}", path.display(), e),
            )
        })?;
        crate::sexpr::parse_str(&text, Some(&path.to_string_lossy()))
            .map_err(|e| KernelError::new(ErrorKind::Parse, e.to_string()))
    }

    fn load_into(&self, name: &str, env: &Rc<Environment>) -> Result<(), KernelError> {
        let exprs = self.read_program(name)?;
        tracing::debug!(file = name, forms = exprs.len(), "loading bootstrap file");
        for expr in exprs {
            eval::run_embedded(self, expr, env)?;
        }
        Ok(())
    }

    /// Evaluate top-level expressions one after another, each under its own
    /// terminal continuation. An unhandled error stops the program and
    /// becomes its result.
    pub fn run_program(&self, exprs: Vec<ValueRef>, env: &Rc<Environment>) -> ValueRef {
        let mut last = types::inert();
        for expr in exprs {
            last = eval::run_one_expr(self, expr, env);
            if matches!(&*last, Value::Error(_)) {
                return last;
            }
        }
        last
    }

    /// Parse and run a source string. The result may be an error value.
    pub fn run_str(&self, source: &str, env: &Rc<Environment>) -> Result<ValueRef, KernelError> {
        let exprs = crate::sexpr::parse_str(source, None)
            .map_err(|e| KernelError::new(ErrorKind::Parse, e.to_string()))?;
        Ok(self.run_program(exprs, env))
    }
}

/// `.` first, then `KERNELPATH` entries, then the directory holding the
/// running binary (where the bootstrap files are installed).
fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(".")];
    if let Ok(kernelpath) = std::env::var("KERNELPATH") {
        for entry in kernelpath.split(':').filter(|p| !p.is_empty()) {
            paths.push(PathBuf::from(entry));
        }
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            paths.push(dir.to_path_buf());
        }
    }
    paths
}
