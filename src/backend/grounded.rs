//! Ground-environment primitives.
//!
//! Everything the bootstrap files and user programs need before any Kernel
//! code has run. Simple primitives compute a value from their gathered
//! argument list; full primitives take over the machine step (operatives,
//! and applicatives that continue evaluation). Registration mirrors the
//! exported-binding table idea: each combiner is built, optionally wrapped
//! applicative, and defined under its surface name.

use itertools::Itertools;
use std::io::Write;
use std::rc::Rc;

use super::continuation::{ContKind, Continuation};
use super::environment::Environment;
use super::error::KernelError;
use super::eval::{args_0, args_n, combine, force_value, run_embedded, sequence, Step};
use super::number;
use super::symbol::intern;
use super::types::{
    self, applicative, boolean, fixnum, ignore, inert, list_elements, list_from, nil,
    CompoundOperative, DynamicKey, EncapsulationType, Primitive, Promise, PromiseCell, StaticKey,
    Value, ValueRef,
};
use super::Interp;

/// Install every primitive binding into `env` (normally the ground
/// environment).
pub fn install(env: &Rc<Environment>) {
    // Pairs and lists
    define(env, "cons", simple_app("cons", prim_cons));
    install_cxr_family(env);
    define(env, "list", simple_app("list", prim_list));
    define(env, "list*", simple_app("list*", prim_list_star));
    define(env, "length", simple_app("length", prim_length));
    define(env, "append", simple_app("append", prim_append));
    define(env, "list?", simple_app("list?", prim_list_p));

    // Identity and type tests
    define(env, "equal?", simple_app("equal?", prim_equal_p));
    install_predicates(env);

    // Environments
    define(
        env,
        "make-environment",
        simple_app("make-environment", prim_make_environment),
    );
    define(env, "$define!", operative("$define!", prim_define));
    define(env, "$set!", operative("$set!", prim_set));
    define(env, "$binds?", operative("$binds?", prim_binds_p));

    // Control
    define(env, "$sequence", operative("$sequence", prim_sequence));
    define(env, "$if", operative("$if", prim_if));
    define(env, "$cond", operative("$cond", prim_cond));
    define(env, "$vau", operative("$vau", prim_vau));
    define(env, "$lambda", operative("$lambda", prim_lambda));
    define(env, "wrap", simple_app("wrap", prim_wrap));
    define(env, "unwrap", simple_app("unwrap", prim_unwrap));
    define(env, "eval", full_app("eval", prim_eval));
    define(env, "apply", full_app("apply", prim_apply));
    define(env, "call/cc", full_app("call/cc", prim_call_cc));
    define(
        env,
        "continuation->applicative",
        simple_app("continuation->applicative", prim_continuation_to_applicative),
    );
    define(
        env,
        "guard-continuation",
        full_app("guard-continuation", prim_guard_continuation),
    );
    define(
        env,
        "extend-continuation",
        full_app("extend-continuation", prim_extend_continuation),
    );

    // Encapsulation
    define(
        env,
        "make-encapsulation-type",
        simple_app("make-encapsulation-type", prim_make_encapsulation_type),
    );

    // Promises
    define(env, "$lazy", operative("$lazy", prim_lazy));
    define(env, "memoize", simple_app("memoize", prim_memoize));
    define(env, "force", full_app("force", prim_force));

    // Keyed variables
    define(
        env,
        "make-keyed-dynamic-variable",
        simple_app("make-keyed-dynamic-variable", prim_make_keyed_dynamic),
    );
    define(
        env,
        "make-keyed-static-variable",
        simple_app("make-keyed-static-variable", prim_make_keyed_static),
    );

    // Strings and symbols
    define(env, "string-append", simple_app("string-append", prim_string_append));
    define(env, "symbol->string", simple_app("symbol->string", prim_symbol_to_string));

    // Arithmetic
    define(env, "+", simple_app("+", prim_add));
    define(env, "-", simple_app("-", prim_sub));
    define(env, "*", simple_app("*", prim_mul));
    define(env, "div", simple_app("div", prim_div));
    define(env, "mod", simple_app("mod", prim_mod));
    define(env, "div-and-mod", simple_app("div-and-mod", prim_div_and_mod));
    define(env, "=?", simple_app("=?", prim_num_eq));
    define(env, "<?", simple_app("<?", prim_num_lt));
    define(env, "<=?", simple_app("<=?", prim_num_le));
    define(env, ">?", simple_app(">?", prim_num_gt));
    define(env, ">=?", simple_app(">=?", prim_num_ge));
    define(env, "positive?", simple_app("positive?", prim_positive_p));
    define(env, "negative?", simple_app("negative?", prim_negative_p));
    define(env, "zero?", simple_app("zero?", prim_zero_p));

    // I/O and debugging
    define(env, "load", full_app("load", prim_load));
    define(env, "print", simple_app("print", prim_print));
    define(env, "println", simple_app("println", prim_println));
    define(env, "debug-on", simple_app("debug-on", prim_debug_on));
    define(env, "debug-off", simple_app("debug-off", prim_debug_off));
    define(env, "print-tb", full_app("print-tb", prim_print_tb));
}

fn define(env: &Rc<Environment>, name: &str, value: ValueRef) {
    env.define(intern(name), value);
}

fn simple_app(name: &'static str, f: types::SimpleFn) -> ValueRef {
    applicative(Rc::new(Value::Primitive(Primitive::Simple { name, f })))
}

fn full_app(name: &'static str, f: types::FullFn) -> ValueRef {
    applicative(Rc::new(Value::Primitive(Primitive::Full { name, f })))
}

fn operative(name: &'static str, f: types::FullFn) -> ValueRef {
    Rc::new(Value::Primitive(Primitive::Full { name, f }))
}

fn plug(value: ValueRef, cont: &Rc<Continuation>) -> Result<Step, KernelError> {
    Ok(Step::Plug {
        value,
        cont: cont.clone(),
    })
}

// ---------------------------------------------------------------------------
// Pairs and lists
// ---------------------------------------------------------------------------

fn prim_cons(_interp: &Interp, args: &ValueRef) -> Result<ValueRef, KernelError> {
    let [car, cdr] = args_n("cons", args)?;
    Ok(types::cons(car, cdr))
}

fn take_car(name: &str, v: &ValueRef) -> Result<ValueRef, KernelError> {
    match &**v {
        Value::Pair(p) => Ok(p.car.clone()),
        _ => Err(KernelError::type_error(
            format!("{} expects a pair", name),
            vec![v.clone()],
        )),
    }
}

fn take_cdr(name: &str, v: &ValueRef) -> Result<ValueRef, KernelError> {
    match &**v {
        Value::Pair(p) => Ok(p.cdr.clone()),
        _ => Err(KernelError::type_error(
            format!("{} expects a pair", name),
            vec![v.clone()],
        )),
    }
}

// The full car/cdr composition family up to depth four. Selectors are
// listed in application order, i.e. the name's letters reversed.
macro_rules! cxr_family {
    ($(($fname:ident, $lit:literal, [$($sel:ident),+])),+ $(,)?) => {
        $(
            fn $fname(_interp: &Interp, args: &ValueRef) -> Result<ValueRef, KernelError> {
                let [v] = args_n($lit, args)?;
                let mut cur = v;
                $( cur = $sel($lit, &cur)?; )+
                Ok(cur)
            }
        )+
        fn install_cxr_family(env: &Rc<Environment>) {
            $( define(env, $lit, simple_app($lit, $fname)); )+
        }
    };
}

cxr_family![
    (prim_car, "car", [take_car]),
    (prim_cdr, "cdr", [take_cdr]),
    (prim_caar, "caar", [take_car, take_car]),
    (prim_cadr, "cadr", [take_cdr, take_car]),
    (prim_cdar, "cdar", [take_car, take_cdr]),
    (prim_cddr, "cddr", [take_cdr, take_cdr]),
    (prim_caaar, "caaar", [take_car, take_car, take_car]),
    (prim_caadr, "caadr", [take_cdr, take_car, take_car]),
    (prim_cadar, "cadar", [take_car, take_cdr, take_car]),
    (prim_caddr, "caddr", [take_cdr, take_cdr, take_car]),
    (prim_cdaar, "cdaar", [take_car, take_car, take_cdr]),
    (prim_cdadr, "cdadr", [take_cdr, take_car, take_cdr]),
    (prim_cddar, "cddar", [take_car, take_cdr, take_cdr]),
    (prim_cdddr, "cdddr", [take_cdr, take_cdr, take_cdr]),
    (prim_caaaar, "caaaar", [take_car, take_car, take_car, take_car]),
    (prim_caaadr, "caaadr", [take_cdr, take_car, take_car, take_car]),
    (prim_caadar, "caadar", [take_car, take_cdr, take_car, take_car]),
    (prim_caaddr, "caaddr", [take_cdr, take_cdr, take_car, take_car]),
    (prim_cadaar, "cadaar", [take_car, take_car, take_cdr, take_car]),
    (prim_cadadr, "cadadr", [take_cdr, take_car, take_cdr, take_car]),
    (prim_caddar, "caddar", [take_car, take_cdr, take_cdr, take_car]),
    (prim_cadddr, "cadddr", [take_cdr, take_cdr, take_cdr, take_car]),
    (prim_cdaaar, "cdaaar", [take_car, take_car, take_car, take_cdr]),
    (prim_cdaadr, "cdaadr", [take_cdr, take_car, take_car, take_cdr]),
    (prim_cdadar, "cdadar", [take_car, take_cdr, take_car, take_cdr]),
    (prim_cdaddr, "cdaddr", [take_cdr, take_cdr, take_car, take_cdr]),
    (prim_cddaar, "cddaar", [take_car, take_car, take_cdr, take_cdr]),
    (prim_cddadr, "cddadr", [take_cdr, take_car, take_cdr, take_cdr]),
    (prim_cdddar, "cdddar", [take_car, take_cdr, take_cdr, take_cdr]),
    (prim_cddddr, "cddddr", [take_cdr, take_cdr, take_cdr, take_cdr]),
];

fn prim_list(_interp: &Interp, args: &ValueRef) -> Result<ValueRef, KernelError> {
    Ok(args.clone())
}

fn prim_list_star(_interp: &Interp, args: &ValueRef) -> Result<ValueRef, KernelError> {
    let items = list_elements(args)?;
    let Some((last, init)) = items.split_last() else {
        return Err(KernelError::arity("list*", "at least 1", 0));
    };
    let mut out = last.clone();
    for item in init.iter().rev() {
        out = types::cons(item.clone(), out);
    }
    Ok(out)
}

fn prim_length(_interp: &Interp, args: &ValueRef) -> Result<ValueRef, KernelError> {
    let [ls] = args_n("length", args)?;
    let mut iter = types::iter_list(&ls);
    let count = iter.by_ref().count();
    match &*iter.rest() {
        Value::Null => Ok(fixnum(count as i64)),
        _ => Err(KernelError::type_error(
            "length expects a proper list",
            vec![ls.clone()],
        )),
    }
}

fn prim_append(_interp: &Interp, args: &ValueRef) -> Result<ValueRef, KernelError> {
    let items = list_elements(args)?;
    let Some((last, init)) = items.split_last() else {
        return Ok(nil());
    };
    let mut out = last.clone();
    for ls in init.iter().rev() {
        for item in list_elements(ls)?.into_iter().rev() {
            out = types::cons(item, out);
        }
    }
    Ok(out)
}

fn prim_list_p(_interp: &Interp, args: &ValueRef) -> Result<ValueRef, KernelError> {
    let items = list_elements(args)?;
    Ok(boolean(items.iter().all(|v| {
        let mut iter = types::iter_list(v);
        iter.by_ref().for_each(drop);
        matches!(&*iter.rest(), Value::Null)
    })))
}

// ---------------------------------------------------------------------------
// Identity and type tests
// ---------------------------------------------------------------------------

fn prim_equal_p(_interp: &Interp, args: &ValueRef) -> Result<ValueRef, KernelError> {
    let [a, b] = args_n("equal?", args)?;
    Ok(boolean(a.equal(&b)))
}

// One predicate per value variant, in the usual n-ary all-of form.
macro_rules! type_predicates {
    ($(($fname:ident, $lit:literal, $pat:pat)),+ $(,)?) => {
        $(
            fn $fname(_interp: &Interp, args: &ValueRef) -> Result<ValueRef, KernelError> {
                let items = list_elements(args)?;
                if items.is_empty() {
                    return Err(KernelError::arity($lit, "at least 1", 0));
                }
                Ok(boolean(items.iter().all(|v| matches!(&**v, $pat))))
            }
        )+
        fn install_predicates(env: &Rc<Environment>) {
            $( define(env, $lit, simple_app($lit, $fname)); )+
        }
    };
}

type_predicates![
    (prim_string_p, "string?", Value::String(_)),
    (prim_symbol_p, "symbol?", Value::Symbol(_)),
    (prim_fixnum_p, "fixnum?", Value::Fixnum(_)),
    (prim_bignum_p, "bignum?", Value::Bignum(_)),
    (prim_integer_p, "integer?", Value::Fixnum(_) | Value::Bignum(_)),
    (
        prim_number_p,
        "number?",
        Value::Fixnum(_) | Value::Bignum(_) | Value::PositiveInfinity | Value::NegativeInfinity
    ),
    (
        prim_pos_inf_p,
        "exact-positive-infinity?",
        Value::PositiveInfinity
    ),
    (
        prim_neg_inf_p,
        "exact-negative-infinity?",
        Value::NegativeInfinity
    ),
    (prim_null_p, "null?", Value::Null),
    (prim_ignore_p, "ignore?", Value::Ignore),
    (prim_inert_p, "inert?", Value::Inert),
    (prim_boolean_p, "boolean?", Value::Boolean(_)),
    (prim_pair_p, "pair?", Value::Pair(_)),
    (prim_environment_p, "environment?", Value::Environment(_)),
    (
        prim_compound_operative_p,
        "compound-operative?",
        Value::Compound(_)
    ),
    (
        prim_primitive_operative_p,
        "primitive-operative?",
        Value::Primitive(_)
    ),
    (
        prim_operative_p,
        "operative?",
        Value::Compound(_) | Value::Primitive(_) | Value::ContWrapper(_)
    ),
    (prim_applicative_p, "applicative?", Value::Applicative(_)),
    (
        prim_combiner_p,
        "combiner?",
        Value::Compound(_) | Value::Primitive(_) | Value::Applicative(_) | Value::ContWrapper(_)
    ),
    (prim_continuation_p, "continuation?", Value::Continuation(_)),
    (prim_error_object_p, "error-object?", Value::Error(_)),
    (
        prim_encapsulation_type_p,
        "encapsulation-type?",
        Value::EncapType(_)
    ),
    (
        prim_encapsulated_object_p,
        "encapsulated-object?",
        Value::Encapsulated(_)
    ),
    (prim_promise_p, "promise?", Value::Promise(_)),
];

// ---------------------------------------------------------------------------
// Environments
// ---------------------------------------------------------------------------

fn prim_make_environment(_interp: &Interp, args: &ValueRef) -> Result<ValueRef, KernelError> {
    let items = list_elements(args)?;
    let mut parents = Vec::with_capacity(items.len());
    for item in &items {
        match item.as_environment() {
            Some(env) => parents.push(env.clone()),
            None => {
                return Err(KernelError::type_error(
                    "make-environment expects environments",
                    vec![item.clone()],
                ))
            }
        }
    }
    Ok(Rc::new(Value::Environment(Environment::new(parents))))
}

fn prim_define(
    _interp: &Interp,
    operands: &ValueRef,
    env: &Rc<Environment>,
    cont: &Rc<Continuation>,
) -> Result<Step, KernelError> {
    let [definiend, expr] = args_n("$define!", operands)?;
    let frame = Continuation::new(
        ContKind::Define {
            definiend,
            env: env.clone(),
        },
        cont.clone(),
    );
    Ok(Step::Continue {
        expr,
        env: env.clone(),
        cont: frame,
    })
}

fn prim_set(
    _interp: &Interp,
    operands: &ValueRef,
    env: &Rc<Environment>,
    cont: &Rc<Continuation>,
) -> Result<Step, KernelError> {
    let [definiend, expr] = args_n("$set!", operands)?;
    if definiend.as_symbol().is_none() {
        return Err(KernelError::type_error(
            "$set! needs a symbol to rebind",
            vec![definiend.clone()],
        ));
    }
    let frame = Continuation::new(
        ContKind::Set {
            definiend,
            env: env.clone(),
        },
        cont.clone(),
    );
    Ok(Step::Continue {
        expr,
        env: env.clone(),
        cont: frame,
    })
}

fn prim_binds_p(
    interp: &Interp,
    operands: &ValueRef,
    env: &Rc<Environment>,
    cont: &Rc<Continuation>,
) -> Result<Step, KernelError> {
    let items = list_elements(operands)?;
    let Some((env_expr, symbols)) = items.split_first() else {
        return Err(KernelError::arity("$binds?", "at least 1", 0));
    };
    let env_val = run_embedded(interp, env_expr.clone(), env)?;
    let Some(target) = env_val.as_environment() else {
        return Err(KernelError::type_error(
            "$binds? needs an environment",
            vec![env_val.clone()],
        ));
    };
    let mut all = true;
    for s in symbols {
        let Some(sym) = s.as_symbol() else {
            return Err(KernelError::type_error(
                "$binds? needs symbols",
                vec![s.clone()],
            ));
        };
        all = all && target.is_bound(sym);
    }
    plug(boolean(all), cont)
}

// ---------------------------------------------------------------------------
// Control
// ---------------------------------------------------------------------------

fn prim_sequence(
    _interp: &Interp,
    operands: &ValueRef,
    env: &Rc<Environment>,
    cont: &Rc<Continuation>,
) -> Result<Step, KernelError> {
    sequence(operands, env, cont)
}

fn prim_if(
    _interp: &Interp,
    operands: &ValueRef,
    env: &Rc<Environment>,
    cont: &Rc<Continuation>,
) -> Result<Step, KernelError> {
    let [test, consequent, alternative] = args_n("$if", operands)?;
    let frame = Continuation::new(
        ContKind::If {
            consequent,
            alternative,
            env: env.clone(),
        },
        cont.clone(),
    );
    Ok(Step::Continue {
        expr: test,
        env: env.clone(),
        cont: frame,
    })
}

fn prim_cond(
    _interp: &Interp,
    operands: &ValueRef,
    env: &Rc<Environment>,
    cont: &Rc<Continuation>,
) -> Result<Step, KernelError> {
    match &**operands {
        Value::Null => plug(inert(), cont),
        Value::Pair(p) => {
            let test = match &*p.car {
                Value::Pair(clause) => clause.car.clone(),
                _ => {
                    return Err(KernelError::type_error(
                        "$cond clause must be a (test . body) pair",
                        vec![p.car.clone()],
                    ))
                }
            };
            let frame = Continuation::new(
                ContKind::Cond {
                    clauses: operands.clone(),
                    env: env.clone(),
                },
                cont.clone(),
            );
            Ok(Step::Continue {
                expr: test,
                env: env.clone(),
                cont: frame,
            })
        }
        _ => Err(KernelError::type_error(
            "$cond clauses must form a list",
            vec![operands.clone()],
        )),
    }
}

fn prim_vau(
    _interp: &Interp,
    operands: &ValueRef,
    env: &Rc<Environment>,
    cont: &Rc<Continuation>,
) -> Result<Step, KernelError> {
    let (formals, eformal, body) = split_vau_operands("$vau", operands)?;
    plug(
        Rc::new(Value::Compound(Rc::new(CompoundOperative {
            formals,
            eformal,
            body,
            static_env: env.clone(),
            name: Default::default(),
        }))),
        cont,
    )
}

fn prim_lambda(
    _interp: &Interp,
    operands: &ValueRef,
    env: &Rc<Environment>,
    cont: &Rc<Continuation>,
) -> Result<Step, KernelError> {
    // ($lambda formals . body) is (wrap ($vau formals #ignore . body)).
    let Value::Pair(p) = &**operands else {
        return Err(KernelError::arity("$lambda", "at least 1", 0));
    };
    plug(
        applicative(Rc::new(Value::Compound(Rc::new(CompoundOperative {
            formals: p.car.clone(),
            eformal: ignore(),
            body: p.cdr.clone(),
            static_env: env.clone(),
            name: Default::default(),
        })))),
        cont,
    )
}

fn split_vau_operands(
    name: &str,
    operands: &ValueRef,
) -> Result<(ValueRef, ValueRef, ValueRef), KernelError> {
    let Value::Pair(first) = &**operands else {
        return Err(KernelError::arity(name, "at least 2", 0));
    };
    let Value::Pair(second) = &*first.cdr else {
        return Err(KernelError::arity(name, "at least 2", 1));
    };
    let eformal = second.car.clone();
    if !matches!(&*eformal, Value::Symbol(_) | Value::Ignore) {
        return Err(KernelError::type_error(
            format!("{} environment formal must be a symbol or #ignore", name),
            vec![eformal.clone()],
        ));
    }
    Ok((first.car.clone(), eformal, second.cdr.clone()))
}

fn prim_wrap(_interp: &Interp, args: &ValueRef) -> Result<ValueRef, KernelError> {
    let [combiner] = args_n("wrap", args)?;
    if !combiner.is_combiner() {
        return Err(KernelError::type_error(
            "wrap expects a combiner",
            vec![combiner.clone()],
        ));
    }
    Ok(applicative(combiner))
}

fn prim_unwrap(_interp: &Interp, args: &ValueRef) -> Result<ValueRef, KernelError> {
    let [value] = args_n("unwrap", args)?;
    match &*value {
        Value::Applicative(app) => Ok(app.underlying.clone()),
        _ => Err(KernelError::type_error(
            "unwrap expects an applicative",
            vec![value.clone()],
        )),
    }
}

fn prim_eval(
    _interp: &Interp,
    args: &ValueRef,
    _env: &Rc<Environment>,
    cont: &Rc<Continuation>,
) -> Result<Step, KernelError> {
    let [expr, env_val] = args_n("eval", args)?;
    let Some(env) = env_val.as_environment() else {
        return Err(KernelError::type_error(
            "eval expects an environment",
            vec![env_val.clone()],
        ));
    };
    Ok(Step::Continue {
        expr,
        env: env.clone(),
        cont: cont.clone(),
    })
}

fn prim_apply(
    interp: &Interp,
    args: &ValueRef,
    _env: &Rc<Environment>,
    cont: &Rc<Continuation>,
) -> Result<Step, KernelError> {
    let items = list_elements(args)?;
    if items.len() != 2 && items.len() != 3 {
        return Err(KernelError::arity("apply", "2 or 3", items.len()));
    }
    let Value::Applicative(app) = &*items[0] else {
        return Err(KernelError::type_error(
            "apply expects an applicative",
            vec![items[0].clone()],
        ));
    };
    let env = match items.get(2) {
        Some(env_val) => match env_val.as_environment() {
            Some(env) => env.clone(),
            None => {
                return Err(KernelError::type_error(
                    "apply expects an environment",
                    vec![env_val.clone()],
                ))
            }
        },
        None => Environment::empty(),
    };
    combine(interp, &app.underlying, &items[1], &env, cont)
}

fn prim_call_cc(
    interp: &Interp,
    args: &ValueRef,
    env: &Rc<Environment>,
    cont: &Rc<Continuation>,
) -> Result<Step, KernelError> {
    let [f] = args_n("call/cc", args)?;
    if !f.is_combiner() {
        return Err(KernelError::type_error(
            "call/cc expects a combiner",
            vec![f.clone()],
        ));
    }
    let cc = applicative(Rc::new(Value::ContWrapper(cont.clone())));
    let target = match &*f {
        Value::Applicative(app) => app.underlying.clone(),
        _ => f.clone(),
    };
    combine(interp, &target, &list_from(vec![cc]), env, cont)
}

fn prim_continuation_to_applicative(
    _interp: &Interp,
    args: &ValueRef,
) -> Result<ValueRef, KernelError> {
    let [c] = args_n("continuation->applicative", args)?;
    let Some(c) = c.as_continuation() else {
        return Err(KernelError::type_error(
            "continuation->applicative expects a continuation",
            vec![c.clone()],
        ));
    };
    Ok(applicative(Rc::new(Value::ContWrapper(c.clone()))))
}

fn prim_guard_continuation(
    _interp: &Interp,
    args: &ValueRef,
    env: &Rc<Environment>,
    cont: &Rc<Continuation>,
) -> Result<Step, KernelError> {
    let [entry, target, exit] = args_n("guard-continuation", args)?;
    check_guards(&entry)?;
    check_guards(&exit)?;
    let Some(target) = target.as_continuation() else {
        return Err(KernelError::type_error(
            "guard-continuation expects a continuation",
            vec![target.clone()],
        ));
    };
    let outer = Continuation::new(
        ContKind::OuterGuard {
            guards: entry,
            env: env.clone(),
        },
        target.clone(),
    );
    let inner = Continuation::new(
        ContKind::InnerGuard {
            guards: exit,
            env: env.clone(),
        },
        outer,
    );
    plug(Rc::new(Value::Continuation(inner)), cont)
}

fn check_guards(guards: &ValueRef) -> Result<(), KernelError> {
    for clause in list_elements(guards)? {
        let parts = list_elements(&clause)?;
        if parts.len() != 2 {
            return Err(KernelError::type_error(
                "guard clause must be a (selector interceptor) list",
                vec![clause.clone()],
            ));
        }
        if parts[0].as_continuation().is_none() {
            return Err(KernelError::type_error(
                "guard selector must be a continuation",
                vec![parts[0].clone()],
            ));
        }
        if !matches!(&*parts[1], Value::Applicative(_)) {
            return Err(KernelError::type_error(
                "guard interceptor must be an applicative",
                vec![parts[1].clone()],
            ));
        }
    }
    Ok(())
}

fn prim_extend_continuation(
    _interp: &Interp,
    args: &ValueRef,
    _env: &Rc<Environment>,
    cont: &Rc<Continuation>,
) -> Result<Step, KernelError> {
    let items = list_elements(args)?;
    if items.len() != 2 && items.len() != 3 {
        return Err(KernelError::arity("extend-continuation", "2 or 3", items.len()));
    }
    let Some(target) = items[0].as_continuation() else {
        return Err(KernelError::type_error(
            "extend-continuation expects a continuation",
            vec![items[0].clone()],
        ));
    };
    if !matches!(&*items[1], Value::Applicative(_)) {
        return Err(KernelError::type_error(
            "extend-continuation expects an applicative receiver",
            vec![items[1].clone()],
        ));
    }
    let env = match items.get(2) {
        Some(env_val) => match env_val.as_environment() {
            Some(env) => env.clone(),
            None => {
                return Err(KernelError::type_error(
                    "extend-continuation expects an environment",
                    vec![env_val.clone()],
                ))
            }
        },
        None => Environment::empty(),
    };
    let extended = Continuation::new(
        ContKind::Extend {
            receiver: items[1].clone(),
            env,
        },
        target.clone(),
    );
    plug(Rc::new(Value::Continuation(extended)), cont)
}

// ---------------------------------------------------------------------------
// Encapsulation
// ---------------------------------------------------------------------------

fn prim_make_encapsulation_type(
    _interp: &Interp,
    args: &ValueRef,
) -> Result<ValueRef, KernelError> {
    args_0("make-encapsulation-type", args)?;
    let ty = Rc::new(EncapsulationType);
    Ok(list_from(vec![
        applicative(Rc::new(Value::Primitive(Primitive::EncapConstructor(ty.clone())))),
        applicative(Rc::new(Value::Primitive(Primitive::EncapPredicate(ty.clone())))),
        applicative(Rc::new(Value::Primitive(Primitive::EncapAccessor(ty)))),
    ]))
}

// ---------------------------------------------------------------------------
// Promises
// ---------------------------------------------------------------------------

fn prim_lazy(
    _interp: &Interp,
    operands: &ValueRef,
    env: &Rc<Environment>,
    cont: &Rc<Continuation>,
) -> Result<Step, KernelError> {
    let [expr] = args_n("$lazy", operands)?;
    plug(
        Rc::new(Value::Promise(Rc::new(Promise {
            cell: std::cell::RefCell::new(PromiseCell::Pending {
                expr,
                env: env.clone(),
            }),
        }))),
        cont,
    )
}

fn prim_memoize(_interp: &Interp, args: &ValueRef) -> Result<ValueRef, KernelError> {
    let [value] = args_n("memoize", args)?;
    Ok(Rc::new(Value::Promise(Rc::new(Promise {
        cell: std::cell::RefCell::new(PromiseCell::Resolved(value)),
    }))))
}

fn prim_force(
    _interp: &Interp,
    args: &ValueRef,
    _env: &Rc<Environment>,
    cont: &Rc<Continuation>,
) -> Result<Step, KernelError> {
    let [value] = args_n("force", args)?;
    force_value(&value, cont)
}

// ---------------------------------------------------------------------------
// Keyed variables
// ---------------------------------------------------------------------------

fn prim_make_keyed_dynamic(_interp: &Interp, args: &ValueRef) -> Result<ValueRef, KernelError> {
    args_0("make-keyed-dynamic-variable", args)?;
    let key = Rc::new(DynamicKey);
    Ok(list_from(vec![
        applicative(Rc::new(Value::Primitive(Primitive::DynamicBinder(key.clone())))),
        applicative(Rc::new(Value::Primitive(Primitive::DynamicAccessor(key)))),
    ]))
}

fn prim_make_keyed_static(_interp: &Interp, args: &ValueRef) -> Result<ValueRef, KernelError> {
    args_0("make-keyed-static-variable", args)?;
    let key = Rc::new(StaticKey);
    Ok(list_from(vec![
        applicative(Rc::new(Value::Primitive(Primitive::StaticBinder(key.clone())))),
        applicative(Rc::new(Value::Primitive(Primitive::StaticAccessor(key)))),
    ]))
}

// ---------------------------------------------------------------------------
// Strings and symbols
// ---------------------------------------------------------------------------

fn prim_string_append(_interp: &Interp, args: &ValueRef) -> Result<ValueRef, KernelError> {
    let mut out = String::new();
    for item in list_elements(args)? {
        match &*item {
            Value::String(s) => out.push_str(s),
            _ => {
                return Err(KernelError::type_error(
                    "string-append expects strings",
                    vec![item.clone()],
                ))
            }
        }
    }
    Ok(types::string(out))
}

fn prim_symbol_to_string(_interp: &Interp, args: &ValueRef) -> Result<ValueRef, KernelError> {
    let [value] = args_n("symbol->string", args)?;
    match value.as_symbol() {
        Some(sym) => Ok(types::string(sym.as_str())),
        None => Err(KernelError::type_error(
            "symbol->string expects a symbol",
            vec![value.clone()],
        )),
    }
}

// ---------------------------------------------------------------------------
// Arithmetic
// ---------------------------------------------------------------------------

fn prim_add(_interp: &Interp, args: &ValueRef) -> Result<ValueRef, KernelError> {
    let mut acc = fixnum(0);
    for item in list_elements(args)? {
        acc = number::add(&acc, &item)?;
    }
    Ok(acc)
}

fn prim_sub(_interp: &Interp, args: &ValueRef) -> Result<ValueRef, KernelError> {
    let items = list_elements(args)?;
    let Some((first, rest)) = items.split_first() else {
        return Err(KernelError::arity("-", "at least 1", 0));
    };
    if rest.is_empty() {
        return number::sub(&fixnum(0), first);
    }
    let mut acc = first.clone();
    for item in rest {
        acc = number::sub(&acc, item)?;
    }
    Ok(acc)
}

fn prim_mul(_interp: &Interp, args: &ValueRef) -> Result<ValueRef, KernelError> {
    let mut acc = fixnum(1);
    for item in list_elements(args)? {
        acc = number::mul(&acc, &item)?;
    }
    Ok(acc)
}

fn prim_div(_interp: &Interp, args: &ValueRef) -> Result<ValueRef, KernelError> {
    let [a, b] = args_n("div", args)?;
    Ok(number::div_and_mod(&a, &b)?.0)
}

fn prim_mod(_interp: &Interp, args: &ValueRef) -> Result<ValueRef, KernelError> {
    let [a, b] = args_n("mod", args)?;
    Ok(number::div_and_mod(&a, &b)?.1)
}

fn prim_div_and_mod(_interp: &Interp, args: &ValueRef) -> Result<ValueRef, KernelError> {
    let [a, b] = args_n("div-and-mod", args)?;
    let (d, m) = number::div_and_mod(&a, &b)?;
    Ok(list_from(vec![d, m]))
}

fn compare_chain(
    name: &str,
    args: &ValueRef,
    accept: fn(std::cmp::Ordering) -> bool,
) -> Result<ValueRef, KernelError> {
    let items = list_elements(args)?;
    if items.len() < 2 {
        return Err(KernelError::arity(name, "at least 2", items.len()));
    }
    for window in items.windows(2) {
        if !accept(number::compare(&window[0], &window[1])?) {
            return Ok(boolean(false));
        }
    }
    Ok(boolean(true))
}

fn prim_num_eq(_interp: &Interp, args: &ValueRef) -> Result<ValueRef, KernelError> {
    compare_chain("=?", args, |o| o == std::cmp::Ordering::Equal)
}

fn prim_num_lt(_interp: &Interp, args: &ValueRef) -> Result<ValueRef, KernelError> {
    compare_chain("<?", args, |o| o == std::cmp::Ordering::Less)
}

fn prim_num_le(_interp: &Interp, args: &ValueRef) -> Result<ValueRef, KernelError> {
    compare_chain("<=?", args, |o| o != std::cmp::Ordering::Greater)
}

fn prim_num_gt(_interp: &Interp, args: &ValueRef) -> Result<ValueRef, KernelError> {
    compare_chain(">?", args, |o| o == std::cmp::Ordering::Greater)
}

fn prim_num_ge(_interp: &Interp, args: &ValueRef) -> Result<ValueRef, KernelError> {
    compare_chain(">=?", args, |o| o != std::cmp::Ordering::Less)
}

fn numeric_all(
    name: &str,
    args: &ValueRef,
    test: fn(&ValueRef) -> Result<bool, KernelError>,
) -> Result<ValueRef, KernelError> {
    let items = list_elements(args)?;
    if items.is_empty() {
        return Err(KernelError::arity(name, "at least 1", 0));
    }
    for item in &items {
        if !test(item)? {
            return Ok(boolean(false));
        }
    }
    Ok(boolean(true))
}

fn prim_positive_p(_interp: &Interp, args: &ValueRef) -> Result<ValueRef, KernelError> {
    numeric_all("positive?", args, number::is_positive)
}

fn prim_negative_p(_interp: &Interp, args: &ValueRef) -> Result<ValueRef, KernelError> {
    numeric_all("negative?", args, number::is_negative)
}

fn prim_zero_p(_interp: &Interp, args: &ValueRef) -> Result<ValueRef, KernelError> {
    numeric_all("zero?", args, number::is_zero)
}

// ---------------------------------------------------------------------------
// I/O and debugging
// ---------------------------------------------------------------------------

fn prim_load(
    interp: &Interp,
    args: &ValueRef,
    env: &Rc<Environment>,
    cont: &Rc<Continuation>,
) -> Result<Step, KernelError> {
    let [name] = args_n("load", args)?;
    let Value::String(path) = &*name else {
        return Err(KernelError::type_error(
            "load expects a file name string",
            vec![name.clone()],
        ));
    };
    let exprs = interp.read_program(path)?;
    tracing::debug!(file = %path, forms = exprs.len(), "load");
    // The loaded file runs as a sequence in the caller's dynamic
    // environment; whatever it computes, load itself yields #inert.
    let result = Continuation::new(
        ContKind::Constant { value: inert() },
        cont.clone(),
    );
    sequence(&list_from(exprs), env, &result)
}

fn prim_print(_interp: &Interp, args: &ValueRef) -> Result<ValueRef, KernelError> {
    let rendered = list_elements(args)?.iter().map(|v| v.to_string()).join(" ");
    print!("{}", rendered);
    std::io::stdout().flush().ok();
    Ok(inert())
}

fn prim_println(_interp: &Interp, args: &ValueRef) -> Result<ValueRef, KernelError> {
    let rendered = list_elements(args)?.iter().map(|v| v.to_string()).join(" ");
    println!("{}", rendered);
    Ok(inert())
}

fn prim_debug_on(interp: &Interp, args: &ValueRef) -> Result<ValueRef, KernelError> {
    args_0("debug-on", args)?;
    interp.debug.start_stepping();
    Ok(inert())
}

fn prim_debug_off(interp: &Interp, args: &ValueRef) -> Result<ValueRef, KernelError> {
    args_0("debug-off", args)?;
    interp.debug.stop_stepping();
    Ok(inert())
}

fn prim_print_tb(
    _interp: &Interp,
    args: &ValueRef,
    _env: &Rc<Environment>,
    cont: &Rc<Continuation>,
) -> Result<Step, KernelError> {
    args_0("print-tb", args)?;
    let mut cursor = Some(cont.clone());
    while let Some(frame) = cursor {
        match &frame.pos {
            Some(pos) => println!("  {} at {}", frame.describe(), pos),
            None => println!("  {}", frame.describe()),
        }
        cursor = frame.prev.clone();
    }
    plug(inert(), cont)
}
