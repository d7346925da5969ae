/// KernelTron - Kernel Language Interpreter Library
///
/// This library implements an interpreter for Kernel, a minimalist
/// Scheme-like language with first-class operatives (fexprs), first-class
/// environments, and first-class continuations with dynamic-extent guards.
///
/// # Architecture
///
/// The pipeline has two main stages:
///
/// 1. **Reading** (`sexpr` module)
///    - Tokenizes source text, tracking line/column positions
///    - Parses tokens directly into runtime values
///    - Handles `;` line comments and `#;` datum comments
///
/// 2. **Evaluation** (`backend` module)
///    - A trampolined CPS machine: the whole control state is the current
///      `(expr, env, cont)` triple, so tail calls run in constant space
///    - Continuations are first-class, with guard/interceptor machinery
///      for abnormal passes between dynamic extents
///    - Errors are first-class objects routed to named destination
///      continuations that user code can guard
///
/// # Example
///
/// ```no_run
/// use kerneltron::backend::Interp;
///
/// let interp = Interp::new().unwrap();
/// let env = interp.extended_environment().unwrap();
/// let result = interp
///     .run_str("($define! x 7) (+ x 3)", &env)
///     .unwrap();
/// println!("{}", result); // 10
/// ```
///
/// # Language Features
///
/// - **Operatives**: `($vau formals eformal . body)` receives operands
///   unevaluated together with the caller's environment
/// - **Applicatives**: `wrap`/`unwrap` convert between the two combiner
///   kinds; `$lambda` is the usual sugar
/// - **Continuations**: `call/cc`, `guard-continuation`,
///   `extend-continuation`, `continuation->applicative`
/// - **Promises**: `$lazy`, `memoize`, `force` with at-most-once
///   evaluation across promise chains
/// - **Encapsulation types** and **keyed dynamic/static variables**
/// - **Exact integer arithmetic** with bignum promotion and signed
///   infinities
pub mod backend;
pub mod repl;
pub mod sexpr;

pub use backend::types::{Value, ValueRef};
pub use backend::Interp;
pub use sexpr::{Lexer, ParseError, Parser, Token};

#[cfg(test)]
mod tests {
    use super::*;

    fn interp() -> Interp {
        std::env::set_var("KERNELPATH", env!("CARGO_MANIFEST_DIR"));
        Interp::new().expect("boot")
    }

    #[test]
    fn test_define_and_add() {
        let interp = interp();
        let env = interp.standard_environment();
        let result = interp.run_str("($define! x 7) (+ x 3)", &env).unwrap();
        assert!(matches!(&*result, Value::Fixnum(10)));
    }

    #[test]
    fn test_lambda_application() {
        let interp = interp();
        let env = interp.standard_environment();
        let result = interp
            .run_str("(($lambda (x y) (* x y)) 6 7)", &env)
            .unwrap();
        assert!(matches!(&*result, Value::Fixnum(42)));
    }

    #[test]
    fn test_vau_receives_operands_unevaluated() {
        let interp = interp();
        let env = interp.standard_environment();
        let result = interp
            .run_str("(($vau (x) #ignore (car x)) (undefined-symbol 1))", &env)
            .unwrap();
        assert_eq!(format!("{}", result), "undefined-symbol");
    }

    #[test]
    fn test_unbound_symbol_is_an_error() {
        let interp = interp();
        let env = interp.standard_environment();
        let result = interp.run_str("no-such-binding", &env).unwrap();
        assert!(matches!(&*result, Value::Error(_)));
    }

    #[test]
    fn test_parse_error_reported() {
        let interp = interp();
        let env = interp.standard_environment();
        assert!(interp.run_str("(+ 1", &env).is_err());
    }
}
