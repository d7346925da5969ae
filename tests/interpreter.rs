//! End-to-end interpreter tests through the public API.

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
fn test_define_and_arithmetic() {
    let interp = interp();
    assert_eq!(eval_str(&interp, "($define! x 7) (+ x 3)"), "10");
}

#[test]
fn test_recursive_sum() {
    let interp = interp();
    let src = r#"
        ($define! sum
          ($lambda (n)
            ($if (=? n 0)
                 0
                 (+ n (sum (- n 1))))))
        (sum 100)
    "#;
    assert_eq!(eval_str(&interp, src), "5050");
}

#[test]
fn test_tail_recursion_runs_in_bounded_space() {
    let interp = interp();
    // A loop this deep only terminates if tail calls reuse the caller's
    // continuation instead of growing the chain.
    let src = r#"
        ($define! loop
          ($lambda (n)
            ($if (=? n 0)
                 done
                 (loop (- n 1)))))
        ($define! done 0)
        (loop 100000)
    "#;
    assert_eq!(eval_str(&interp, src), "0");
}

#[test]
fn test_bignum_promotion_in_programs() {
    let interp = interp();
    let src = r#"
        ($define! fact
          ($lambda (n)
            ($if (=? n 0)
                 1
                 (* n (fact (- n 1))))))
        (fact 25)
    "#;
    assert_eq!(eval_str(&interp, src), "15511210043330985984000000");
}

#[test]
fn test_arithmetic_with_infinities() {
    let interp = interp();
    assert_eq!(eval_str(&interp, "(+ 1 #e+infinity)"), "#e+infinity");
    assert_eq!(eval_str(&interp, "(<? #e-infinity 0 #e+infinity)"), "#t");
    let result = eval_str(&interp, "(+ #e+infinity #e-infinity)");
    assert!(result.contains("error"), "got {}", result);
}

#[test]
fn test_div_and_mod() {
    let interp = interp();
    assert_eq!(eval_str(&interp, "(div-and-mod -7 2)"), "(-4 1)");
    assert_eq!(eval_str(&interp, "(div 7 2)"), "3");
    assert_eq!(eval_str(&interp, "(mod 7 2)"), "1");
}

#[test]
fn test_list_primitives() {
    let interp = interp();
    assert_eq!(eval_str(&interp, "(list 1 2 3)"), "(1 2 3)");
    assert_eq!(eval_str(&interp, "(list* 1 2 (list 3 4))"), "(1 2 3 4)");
    assert_eq!(eval_str(&interp, "(length (list 1 2 3))"), "3");
    assert_eq!(eval_str(&interp, "(append (list 1 2) (list 3))"), "(1 2 3)");
    assert_eq!(eval_str(&interp, "(cadr (list 1 2 3))"), "2");
    assert_eq!(eval_str(&interp, "(caddar (list (list 1 2 3)))"), "3");
    assert_eq!(eval_str(&interp, "(list? (list 1 2) ())"), "#t");
    assert_eq!(eval_str(&interp, "(list? (cons 1 2))"), "#f");
}

#[test]
fn test_equality() {
    let interp = interp();
    assert_eq!(eval_str(&interp, "(equal? (list 1 2) (cons 1 (cons 2 ())))"), "#t");
    assert_eq!(eval_str(&interp, "(equal? \"abc\" \"abc\")"), "#t");
    assert_eq!(eval_str(&interp, "(equal? 1 2)"), "#f");
}

#[test]
fn test_wrap_unwrap_laws() {
    let interp = interp();
    // unwrap(wrap c) is c; wrap(unwrap a) is equal to a.
    assert_eq!(eval_str(&interp, "(equal? (unwrap (wrap car)) car)"), "#t");
    assert_eq!(
        eval_str(&interp, "(equal? (unwrap (wrap (unwrap car))) (unwrap car))"),
        "#t"
    );
    assert_eq!(eval_str(&interp, "(equal? (wrap (unwrap car)) car)"), "#t");
}

#[test]
fn test_operatives_see_operands_unevaluated() {
    let interp = interp();
    let src = r#"
        ($define! $quote ($vau (x) #ignore x))
        ($quote (no such thing))
    "#;
    assert_eq!(eval_str(&interp, src), "(no such thing)");
}

#[test]
fn test_eval_in_explicit_environment() {
    let interp = interp();
    assert_eq!(
        eval_str(
            &interp,
            "($define! e (get-current-environment)) ($define! x 5) (eval (list + x 1) e)"
        ),
        "6"
    );
    // A child environment shadows without touching the parent.
    let src = r#"
        ($define! $sym ($vau (s) #ignore s))
        ($define! x 1)
        ($define! e (make-environment (get-current-environment)))
        (eval (list $define! ($sym x) 2) e)
        (list x (eval ($sym x) e))
    "#;
    assert_eq!(eval_str(&interp, src), "(1 2)");
}

#[test]
fn test_sequence_and_cond() {
    let interp = interp();
    assert_eq!(eval_str(&interp, "($sequence 1 2 3)"), "3");
    assert_eq!(eval_str(&interp, "($sequence)"), "#inert");
    let src = r#"
        ($define! classify
          ($lambda (n)
            ($cond ((<? n 0) "negative")
                   ((=? n 0) "zero")
                   (#t "positive"))))
        (list (classify -5) (classify 0) (classify 3))
    "#;
    assert_eq!(eval_str(&interp, src), "(\"negative\" \"zero\" \"positive\")");
    assert_eq!(eval_str(&interp, "($cond)"), "#inert");
}

#[test]
fn test_if_requires_boolean() {
    let interp = interp();
    let result = eval_str(&interp, "($if 1 2 3)");
    assert!(result.contains("error"), "got {}", result);
}

#[test]
fn test_parameter_tree_destructuring() {
    let interp = interp();
    let src = r#"
        ($define! swap ($lambda ((a b)) (list b a)))
        (swap (list 1 2))
    "#;
    assert_eq!(eval_str(&interp, src), "(2 1)");
    let src = r#"
        ($define! (x y . rest) (list 1 2 3 4))
        (list x y rest)
    "#;
    assert_eq!(eval_str(&interp, src), "(1 2 (3 4))");
}

#[test]
fn test_operand_mismatch_is_recoverable_error() {
    let interp = interp();
    let result = eval_str(&interp, "(($lambda (a b) a) 1)");
    assert!(result.contains("error"), "got {}", result);
}

#[test]
fn test_set_rebinds_in_owner_environment() {
    let interp = interp();
    let src = r#"
        ($define! counter 0)
        ($define! bump ($lambda () ($set! counter (+ counter 1))))
        (bump)
        (bump)
        counter
    "#;
    assert_eq!(eval_str(&interp, src), "2");
}

#[test]
fn test_binds_predicate() {
    let interp = interp();
    let src = r#"
        ($define! x 1)
        (list ($binds? (get-current-environment) x)
              ($binds? (get-current-environment) no-such))
    "#;
    assert_eq!(eval_str(&interp, src), "(#t #f)");
}

#[test]
fn test_library_derived_forms() {
    let interp = interp();
    assert_eq!(eval_str(&interp, "($let ((x 2) (y 3)) (* x y))"), "6");
    assert_eq!(eval_str(&interp, "(map ($lambda (n) (* n n)) (list 1 2 3))"), "(1 4 9)");
    assert_eq!(eval_str(&interp, "($and? #t (=? 1 1))"), "#t");
    assert_eq!(eval_str(&interp, "($and? #f (car 1))"), "#f");
    assert_eq!(eval_str(&interp, "($or? #f #t)"), "#t");
    assert_eq!(eval_str(&interp, "(and? #t #t #f)"), "#f");
    assert_eq!(eval_str(&interp, "(or? #f #f)"), "#f");
    assert_eq!(eval_str(&interp, "(not? #f)"), "#t");
}

#[test]
fn test_extended_environment_library() {
    let interp = interp();
    let env = interp.extended_environment().expect("extension should load");
    let check = |src: &str, expected: &str| {
        let result = interp.run_str(src, &env).expect("parse");
        assert_eq!(format!("{}", result), expected, "source: {}", src);
    };
    check("($let* ((x 1) (y (+ x 1))) (list x y))", "(1 2)");
    check(
        "($letrec ((even? ($lambda (n) ($if (=? n 0) #t (odd? (- n 1)))))
                   (odd? ($lambda (n) ($if (=? n 0) #f (even? (- n 1))))))
           (list (even? 10) (odd? 7)))",
        "(#t #t)",
    );
    check("($when (=? 1 1) 1 2)", "2");
    check("($unless (=? 1 1) 1 2)", "#inert");
    check("(member? 2 (list 1 2 3))", "#t");
    check("(assoc 2 (list (list 1 10) (list 2 20)))", "(2 20)");
    check("(assoc 9 (list (list 1 10)))", "()");
    check("(filter positive? (list -1 2 -3 4))", "(2 4)");
    check("(reduce (list 1 2 3 4) + 0)", "10");
}

#[test]
fn test_load_primitive() {
    let interp = interp();
    // load evaluates the file in the dynamic environment and yields #inert.
    assert_eq!(eval_str(&interp, "(load \"extension.k\") ($when #t 42)"), "42");
    let missing = eval_str(&interp, "(load \"no-such-file.k\")");
    assert!(missing.contains("error"), "got {}", missing);
}

#[test]
fn test_encapsulation_isolation() {
    let interp = interp();
    let src = r#"
        ($define! (c p a) (make-encapsulation-type))
        ($define! (c2 p2 a2) (make-encapsulation-type))
        (list (p (c 1)) (p2 (c 1)) (a (c 1)))
    "#;
    assert_eq!(eval_str(&interp, src), "(#t #f 1)");
    let src = r#"
        ($define! (c p a) (make-encapsulation-type))
        ($define! (c2 p2 a2) (make-encapsulation-type))
        (a2 (c 1))
    "#;
    let result = eval_str(&interp, src);
    assert!(result.contains("error"), "got {}", result);
}

#[test]
fn test_promises() {
    let interp = interp();
    assert_eq!(eval_str(&interp, "(force (memoize 42))"), "42");
    assert_eq!(eval_str(&interp, "(force 42)"), "42");
    // Nested promise chains splice and force to the final value.
    assert_eq!(
        eval_str(&interp, "($define! p ($lazy ($lazy 42))) (list (force p) (force p))"),
        "(42 42)"
    );
    // Lazy expressions do not run until forced.
    assert_eq!(eval_str(&interp, "($define! p ($lazy (car 1))) 7"), "7");
    // Forcing is memoized: the side effect happens once.
    let src = r#"
        ($define! hits 0)
        ($define! p ($lazy ($sequence ($set! hits (+ hits 1)) hits)))
        (force p)
        (force p)
        hits
    "#;
    assert_eq!(eval_str(&interp, src), "1");
}

#[test]
fn test_strings_and_symbols() {
    let interp = interp();
    assert_eq!(eval_str(&interp, "(string-append \"foo\" \"bar\")"), "\"foobar\"");
    assert_eq!(eval_str(&interp, "(string-append)"), "\"\"");
    // symbol->string needs an actual symbol, so go through an operative.
    let src = r#"
        ($define! $name ($vau (s) #ignore (symbol->string s)))
        ($name hello)
    "#;
    assert_eq!(eval_str(&interp, src), "\"hello\"");
}

#[test]
fn test_type_predicates() {
    let interp = interp();
    assert_eq!(eval_str(&interp, "(pair? (cons 1 2))"), "#t");
    assert_eq!(eval_str(&interp, "(null? ())"), "#t");
    assert_eq!(eval_str(&interp, "(operative? $if)"), "#t");
    assert_eq!(eval_str(&interp, "(applicative? car)"), "#t");
    assert_eq!(eval_str(&interp, "(combiner? car $if)"), "#t");
    assert_eq!(eval_str(&interp, "(environment? (get-current-environment))"), "#t");
    assert_eq!(eval_str(&interp, "(integer? 5 #x10)"), "#t");
    assert_eq!(eval_str(&interp, "(number? #e+infinity)"), "#t");
    assert_eq!(eval_str(&interp, "(integer? #e+infinity)"), "#f");
    assert_eq!(eval_str(&interp, "(inert? #inert)"), "#t");
    assert_eq!(eval_str(&interp, "(ignore? #ignore)"), "#t");
    assert_eq!(eval_str(&interp, "(promise? ($lazy 1))"), "#t");
    assert_eq!(eval_str(&interp, "(continuation? root-continuation)"), "#t");
}

#[test]
fn test_guarding_ancestor_catches_descendant_error() {
    let interp = interp();
    // type-error is a descendant of error-continuation in the taxonomy, so
    // a guard selecting error-continuation intercepts the pass.
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
fn test_symbol_identity_is_name_equality() {
    let interp = interp();
    let src = r#"
        ($define! $sym ($vau (s) #ignore s))
        (equal? ($sym abc) ($sym abc))
    "#;
    assert_eq!(eval_str(&interp, src), "#t");
}
