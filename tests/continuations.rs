//! First-class continuations: capture, re-entry, guards, extension, and
//! keyed variables.

use kerneltron::backend::types::Value;
use kerneltron::backend::Interp;

fn interp() -> Interp {
    std::env::set_var("KERNELPATH", env!("CARGO_MANIFEST_DIR"));
    Interp::new().expect("interpreter should boot")
}

fn eval_str(interp: &Interp, source: &str) -> String {
    let env = interp.standard_environment();
    let result = interp.run_str(source, &env).expect("source should parse");
    format!("{}", result)
}

#[test]
fn test_call_cc_normal_return() {
    let interp = interp();
    // If f returns normally with v, the whole form evaluates to v.
    assert_eq!(eval_str(&interp, "(call/cc ($lambda (k) 5))"), "5");
}

#[test]
fn test_call_cc_escape() {
    let interp = interp();
    // If f invokes its argument with v, the form also evaluates to v.
    assert_eq!(
        eval_str(&interp, "(+ 1 (call/cc ($lambda (k) (k 10) 99)))"),
        "11"
    );
}

#[test]
fn test_captured_continuation_reentry() {
    let interp = interp();
    let src = r#"
        ($define! c ())
        ($define! v (+ 1 (call/cc ($lambda (k) ($set! c k) 10))))
        v
    "#;
    assert_eq!(eval_str(&interp, src), "11");
    // Applying the saved continuation re-enters the old context and
    // re-runs the definition with the new value.
    let src = r#"
        ($define! c ())
        ($define! v (+ 1 (call/cc ($lambda (k) ($set! c k) 10))))
        (apply c (list 100))
        v
    "#;
    assert_eq!(eval_str(&interp, src), "101");
}

#[test]
fn test_continuation_to_applicative() {
    let interp = interp();
    let src = r#"
        (+ 2 (call/cc ($lambda (k)
                        ((continuation->applicative k) 40)
                        0)))
    "#;
    assert_eq!(eval_str(&interp, src), "42");
}

#[test]
fn test_extend_continuation_runs_receiver() {
    let interp = interp();
    // The receiver gets the passed value tree as its operand tree.
    let src = r#"
        ($define! target
          (extend-continuation root-continuation
                               ($lambda (a b) (+ a b))))
        (apply-continuation target (list 20 22))
    "#;
    assert_eq!(eval_str(&interp, src), "42");
}

#[test]
fn test_exit_guard_intercepts_and_diverts() {
    let interp = interp();
    let src = r#"
        ($define! guarded
          (guard-continuation
            ()
            root-continuation
            (list (list error-continuation
                        ($lambda (e divert) (apply divert "caught"))))))
        ($define! inside
          (extend-continuation guarded ($lambda #ignore (car 17))))
        (apply-continuation inside ())
    "#;
    assert_eq!(eval_str(&interp, src), "\"caught\"");
}

#[test]
fn test_entering_a_region_consults_entry_guards_only() {
    let interp = interp();
    // Passing into the region from outside leaves exit clauses idle.
    let src = r#"
        ($define! guarded
          (guard-continuation
            ()
            root-continuation
            (list (list root-continuation
                        ($lambda (e divert) "unreachable")))))
        ($define! inside
          (extend-continuation guarded ($lambda #ignore 42)))
        (apply-continuation inside ())
    "#;
    assert_eq!(eval_str(&interp, src), "42");
}

#[test]
fn test_entry_guard_fires_on_the_way_in() {
    let interp = interp();
    let src = r#"
        ($define! guarded
          (guard-continuation
            (list (list root-continuation ($lambda (v divert) (+ v 1))))
            root-continuation
            ()))
        (apply-continuation guarded (list 41))
    "#;
    assert_eq!(eval_str(&interp, src), "42");
}

#[test]
fn test_interceptor_may_return_normally() {
    let interp = interp();
    // When the interceptor returns instead of diverting, its result keeps
    // flowing toward the original destination.
    let src = r#"
        ($define! guarded
          (guard-continuation
            ()
            root-continuation
            (list (list error-continuation ($lambda (e divert) 42)))))
        ($define! inside
          (extend-continuation guarded ($lambda #ignore (car 17))))
        (apply-continuation inside ())
    "#;
    assert_eq!(eval_str(&interp, src), "42");
}

#[test]
fn test_guard_selection_is_repeatable() {
    let interp = interp();
    // Marks must be cleared after every pass, so a second pass over the
    // same guards selects the same interceptors again.
    let src = r#"
        ($define! guarded
          (guard-continuation
            ()
            root-continuation
            (list (list error-continuation
                        ($lambda (e divert) (apply divert "caught"))))))
        ($define! inside
          (extend-continuation guarded ($lambda #ignore (car 17))))
        (apply-continuation inside ())
        (apply-continuation inside ())
    "#;
    assert_eq!(eval_str(&interp, src), "\"caught\"");
}

#[test]
fn test_error_reaches_root_as_error_value() {
    let interp = interp();
    let env = interp.standard_environment();
    let result = interp.run_str("(car 1)", &env).expect("parse");
    assert!(matches!(&*result, Value::Error(_)));
    // And the program stops at the first unhandled error.
    let result = interp
        .run_str("(car 1) ($define! never-reached 1)", &env)
        .expect("parse");
    assert!(matches!(&*result, Value::Error(_)));
    let check = interp
        .run_str("($binds? (get-current-environment) never-reached)", &env)
        .expect("parse");
    assert_eq!(format!("{}", check), "#f");
}

#[test]
fn test_keyed_dynamic_variables() {
    let interp = interp();
    let src = r#"
        ($define! (bind get) (make-keyed-dynamic-variable))
        (bind 42 ($lambda () (+ (get) 0)))
    "#;
    assert_eq!(eval_str(&interp, src), "42");
    // Bindings nest; the innermost wins.
    let src = r#"
        ($define! (bind get) (make-keyed-dynamic-variable))
        (bind 1 ($lambda () (bind 2 ($lambda () (get)))))
    "#;
    assert_eq!(eval_str(&interp, src), "2");
    // Outside any binder extent the accessor signals.
    let src = r#"
        ($define! (bind get) (make-keyed-dynamic-variable))
        (get)
    "#;
    let result = eval_str(&interp, src);
    assert!(result.contains("error"), "got {}", result);
}

#[test]
fn test_keyed_dynamic_variables_are_independent() {
    let interp = interp();
    let src = r#"
        ($define! (bind-a get-a) (make-keyed-dynamic-variable))
        ($define! (bind-b get-b) (make-keyed-dynamic-variable))
        (bind-a 1 ($lambda () (bind-b 2 ($lambda () (list (get-a) (get-b))))))
    "#;
    assert_eq!(eval_str(&interp, src), "(1 2)");
}

#[test]
fn test_keyed_static_variables() {
    let interp = interp();
    let src = r#"
        ($define! (bind get) (make-keyed-static-variable))
        ($define! e (bind 7 (get-current-environment)))
        (eval (list get) e)
    "#;
    assert_eq!(eval_str(&interp, src), "7");
    let src = r#"
        ($define! (bind get) (make-keyed-static-variable))
        (get)
    "#;
    let result = eval_str(&interp, src);
    assert!(result.contains("error"), "got {}", result);
}
