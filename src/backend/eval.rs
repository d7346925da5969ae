//! The trampolined evaluator.
//!
//! Evaluation is a loop over machine steps. A step either continues with a
//! new `(expr, env, cont)` triple, plugs a value into a continuation, or
//! terminates with the final value. Tail positions always reuse the
//! caller's continuation, so iterative programs run in bounded control
//! state.

use std::rc::Rc;

use super::continuation::{abnormally_pass, plug_reduce, ContKind, Continuation};
use super::environment::Environment;
use super::error::{ErrorKind, ErrorObject, KernelError};
use super::types::{
    self, CompoundOperative, Primitive, Promise, PromiseCell, Value, ValueRef,
};
use super::Interp;

/// One step of the machine.
pub enum Step {
    Continue {
        expr: ValueRef,
        env: Rc<Environment>,
        cont: Rc<Continuation>,
    },
    Plug {
        value: ValueRef,
        cont: Rc<Continuation>,
    },
    Terminate(ValueRef),
}

/// Evaluate one expression to completion under a fresh terminal
/// continuation chained to the root.
pub fn run_one_expr(interp: &Interp, expr: ValueRef, env: &Rc<Environment>) -> ValueRef {
    let terminal = Continuation::new(ContKind::Terminal, interp.root_cont.clone());
    run(
        interp,
        Step::Continue {
            expr,
            env: env.clone(),
            cont: terminal,
        },
    )
}

/// Embedded evaluation for primitives that need a value mid-step. Errors
/// that would have escaped to the root are re-signalled to the caller.
pub fn run_embedded(
    interp: &Interp,
    expr: ValueRef,
    env: &Rc<Environment>,
) -> Result<ValueRef, KernelError> {
    let result = run_one_expr(interp, expr, env);
    match &*result {
        Value::Error(err) => Err(KernelError::rethrow(err.clone())),
        _ => Ok(result),
    }
}

/// The trampoline. Every signalled error is caught here, annotated with the
/// current triple, and turned into an abnormal pass toward its destination
/// continuation.
pub fn run(interp: &Interp, start: Step) -> ValueRef {
    let mut step = start;
    let mut current: Option<(ValueRef, Rc<Environment>, Rc<Continuation>)> = None;
    loop {
        step = match step {
            Step::Continue { expr, env, cont } => {
                let (expr, env, cont) = match interp.debug.on_eval(interp, &expr, &env, &cont) {
                    Some(rewritten) => rewritten,
                    None => (expr, env, cont),
                };
                current = Some((expr.clone(), env.clone(), cont.clone()));
                match interpret(interp, &expr, &env, &cont) {
                    Ok(next) => next,
                    Err(e) => match signal(interp, e, &current) {
                        Ok(next) => next,
                        Err(fatal) => return fatal,
                    },
                }
            }
            Step::Plug { value, cont } => match plug_reduce(interp, &cont, value) {
                Ok(next) => next,
                Err(e) => match signal(interp, e, &current) {
                    Ok(next) => next,
                    Err(fatal) => return fatal,
                },
            },
            Step::Terminate(value) => return value,
        };
    }
}

/// Convert a host error into a first-class error object and pass it to its
/// destination continuation. A failure while handling the error (an
/// interceptor signalling, for instance) is fatal; the error value itself
/// is returned as the final result.
fn signal(
    interp: &Interp,
    error: KernelError,
    current: &Option<(ValueRef, Rc<Environment>, Rc<Continuation>)>,
) -> Result<Step, ValueRef> {
    let object = match &error.object {
        Some(existing) => existing.clone(),
        None => {
            let dest = interp.continuation_for(error.kind);
            Rc::new(ErrorObject::new(
                dest,
                error.message.clone(),
                types::list_from(error.irritants.clone()),
            ))
        }
    };
    if let Some((expr, env, cont)) = current {
        object.expr.borrow_mut().get_or_insert_with(|| expr.clone());
        object.env.borrow_mut().get_or_insert_with(|| env.clone());
        object
            .src_cont
            .borrow_mut()
            .get_or_insert_with(|| cont.clone());
    }
    tracing::debug!(error = %object.message, "signalled error");
    let value = Rc::new(Value::Error(object.clone()));
    interp.debug.on_error(interp, &object);
    let src = match current {
        Some((_, _, cont)) => cont.clone(),
        None => interp.root_cont.clone(),
    };
    let dest = object.dest.clone();
    match abnormally_pass(interp, value.clone(), &src, &dest) {
        Ok(step) => Ok(step),
        Err(second) => {
            tracing::error!(error = %second.message, "error while handling error");
            Err(value)
        }
    }
}

/// Dispatch on the expression variant. Symbols resolve in the environment,
/// pairs install a combine frame and evaluate their operator, everything
/// else is self-evaluating.
pub fn interpret(
    _interp: &Interp,
    expr: &ValueRef,
    env: &Rc<Environment>,
    cont: &Rc<Continuation>,
) -> Result<Step, KernelError> {
    match &**expr {
        Value::Symbol(sym) => match env.lookup(*sym) {
            Some(value) => Ok(Step::Plug {
                value,
                cont: cont.clone(),
            }),
            None => Err(KernelError::new(
                ErrorKind::SymbolNotFound,
                format!("unbound symbol {}", sym),
            )),
        },
        Value::Pair(p) => {
            let combine_cont = Continuation::with_pos(
                ContKind::Combine {
                    operands: p.cdr.clone(),
                    env: env.clone(),
                },
                cont.clone(),
                p.pos.clone(),
            );
            Ok(Step::Continue {
                expr: p.car.clone(),
                env: env.clone(),
                cont: combine_cont,
            })
        }
        _ => Ok(Step::Plug {
            value: expr.clone(),
            cont: cont.clone(),
        }),
    }
}

/// Apply a combiner to an operand tree.
pub fn combine(
    interp: &Interp,
    combiner: &ValueRef,
    operands: &ValueRef,
    env: &Rc<Environment>,
    cont: &Rc<Continuation>,
) -> Result<Step, KernelError> {
    match &**combiner {
        Value::Applicative(app) => {
            let apply = Continuation::new(
                ContKind::Apply {
                    combiner: app.underlying.clone(),
                    env: env.clone(),
                },
                cont.clone(),
            );
            evaluate_arguments(operands, env, apply)
        }
        Value::Compound(op) => apply_compound(op, operands, env, cont),
        Value::Primitive(p) => apply_primitive(interp, p, operands, env, cont),
        Value::ContWrapper(dest) => {
            // A continuation takes one value: the sole element of a
            // singleton operand list, or the whole tree otherwise.
            let passed = match &**operands {
                Value::Pair(p) if matches!(&*p.cdr, Value::Null) => p.car.clone(),
                _ => operands.clone(),
            };
            abnormally_pass(interp, passed, cont, dest)
        }
        _ => Err(KernelError::type_error(
            format!("{} is not a combiner", combiner.type_name()),
            vec![combiner.clone()],
        )),
    }
}

/// Evaluate an operand list left to right, gathering the values into a
/// list delivered to `cont`. Evaluation of the (k+1)th operand starts only
/// after the kth has fully plugged its value.
pub fn evaluate_arguments(
    operands: &ValueRef,
    env: &Rc<Environment>,
    cont: Rc<Continuation>,
) -> Result<Step, KernelError> {
    match &**operands {
        Value::Pair(p) => {
            let next = Continuation::new(
                ContKind::EvalArgs {
                    rest: p.cdr.clone(),
                    env: env.clone(),
                },
                cont,
            );
            Ok(Step::Continue {
                expr: p.car.clone(),
                env: env.clone(),
                cont: next,
            })
        }
        Value::Null => Ok(Step::Plug {
            value: types::nil(),
            cont,
        }),
        _ => Err(KernelError::with_irritants(
            ErrorKind::CombineWithNonListOperands,
            "operand tree is not a list",
            vec![operands.clone()],
        )),
    }
}

fn apply_compound(
    op: &Rc<CompoundOperative>,
    operands: &ValueRef,
    env: &Rc<Environment>,
    cont: &Rc<Continuation>,
) -> Result<Step, KernelError> {
    let local = Environment::new([op.static_env.clone()]);
    match_parameter_tree(&op.formals, operands, &local)?;
    let dynamic = Rc::new(Value::Environment(env.clone()));
    match_parameter_tree(&op.eformal, &dynamic, &local)?;
    sequence(&op.body, &local, cont)
}

/// Evaluate a body list as a sequence in `env`, last form in tail position.
/// An empty body yields `#inert`.
pub fn sequence(
    body: &ValueRef,
    env: &Rc<Environment>,
    cont: &Rc<Continuation>,
) -> Result<Step, KernelError> {
    match &**body {
        Value::Null => Ok(Step::Plug {
            value: types::inert(),
            cont: cont.clone(),
        }),
        Value::Pair(p) => {
            if matches!(&*p.cdr, Value::Null) {
                Ok(Step::Continue {
                    expr: p.car.clone(),
                    env: env.clone(),
                    cont: cont.clone(),
                })
            } else {
                let rest = Continuation::new(
                    ContKind::Sequence {
                        rest: p.cdr.clone(),
                        env: env.clone(),
                    },
                    cont.clone(),
                );
                Ok(Step::Continue {
                    expr: p.car.clone(),
                    env: env.clone(),
                    cont: rest,
                })
            }
        }
        _ => Err(KernelError::type_error(
            "body must be a list of expressions",
            vec![body.clone()],
        )),
    }
}

/// Destructure an operand tree against a parameter tree, binding symbols in
/// `env`. `#ignore` discards, `()` insists on `()`, pairs recurse.
pub fn match_parameter_tree(
    ptree: &ValueRef,
    operands: &ValueRef,
    env: &Rc<Environment>,
) -> Result<(), KernelError> {
    match &**ptree {
        Value::Symbol(sym) => {
            env.define(*sym, operands.clone());
            Ok(())
        }
        Value::Ignore => Ok(()),
        Value::Null => match &**operands {
            Value::Null => Ok(()),
            _ => Err(operand_mismatch(ptree, operands)),
        },
        Value::Pair(p) => match &**operands {
            Value::Pair(o) => {
                match_parameter_tree(&p.car, &o.car, env)?;
                match_parameter_tree(&p.cdr, &o.cdr, env)
            }
            _ => Err(operand_mismatch(ptree, operands)),
        },
        _ => Err(operand_mismatch(ptree, operands)),
    }
}

fn operand_mismatch(ptree: &ValueRef, operands: &ValueRef) -> KernelError {
    KernelError::with_irritants(
        ErrorKind::OperandMismatch,
        format!("cannot match operands {} against {}", operands, ptree),
        vec![ptree.clone(), operands.clone()],
    )
}

/// Side effect of `$define!`: a plain-symbol definiend donates its name to
/// an unnamed compound operative (possibly under applicative layers).
pub fn record_operative_name(definiend: &ValueRef, value: &ValueRef) {
    let Some(sym) = definiend.as_symbol() else {
        return;
    };
    let mut cursor = value.clone();
    loop {
        match &*cursor.clone() {
            Value::Applicative(app) => cursor = app.underlying.clone(),
            Value::Compound(op) => {
                let mut name = op.name.borrow_mut();
                if name.is_none() {
                    *name = Some(sym);
                }
                return;
            }
            _ => return,
        }
    }
}

fn apply_primitive(
    interp: &Interp,
    prim: &Primitive,
    operands: &ValueRef,
    env: &Rc<Environment>,
    cont: &Rc<Continuation>,
) -> Result<Step, KernelError> {
    match prim {
        Primitive::Simple { f, .. } => {
            let value = f(interp, operands)?;
            Ok(Step::Plug {
                value,
                cont: cont.clone(),
            })
        }
        Primitive::Full { f, .. } => f(interp, operands, env, cont),
        Primitive::EncapConstructor(ty) => {
            let [payload] = args_n("an encapsulation constructor", operands)?;
            Ok(Step::Plug {
                value: Rc::new(Value::Encapsulated(types::Encapsulated {
                    payload,
                    ty: ty.clone(),
                })),
                cont: cont.clone(),
            })
        }
        Primitive::EncapPredicate(ty) => {
            let [v] = args_n("an encapsulation predicate", operands)?;
            let is_ours = matches!(&*v, Value::Encapsulated(e) if Rc::ptr_eq(&e.ty, ty));
            Ok(Step::Plug {
                value: types::boolean(is_ours),
                cont: cont.clone(),
            })
        }
        Primitive::EncapAccessor(ty) => {
            let [v] = args_n("an encapsulation accessor", operands)?;
            match &*v {
                Value::Encapsulated(e) if Rc::ptr_eq(&e.ty, ty) => Ok(Step::Plug {
                    value: e.payload.clone(),
                    cont: cont.clone(),
                }),
                _ => Err(KernelError::with_irritants(
                    ErrorKind::EncapsulationType,
                    "accessor applied to a value of another encapsulation type",
                    vec![v.clone()],
                )),
            }
        }
        Primitive::DynamicBinder(key) => {
            let [value, thunk] = args_n("a keyed-dynamic binder", operands)?;
            if !thunk.is_combiner() {
                return Err(KernelError::type_error(
                    "keyed-dynamic binder needs a combiner to call",
                    vec![thunk.clone()],
                ));
            }
            let marker = Continuation::new(
                ContKind::KeyedDynamic {
                    key: key.clone(),
                    value,
                },
                cont.clone(),
            );
            combine(interp, &thunk, &types::nil(), &Environment::empty(), &marker)
        }
        Primitive::DynamicAccessor(key) => {
            args_0("a keyed-dynamic accessor", operands)?;
            let mut cursor = Some(cont.clone());
            while let Some(frame) = cursor {
                if let ContKind::KeyedDynamic { key: k, value } = &frame.kind {
                    if Rc::ptr_eq(k, key) {
                        return Ok(Step::Plug {
                            value: value.clone(),
                            cont: cont.clone(),
                        });
                    }
                }
                cursor = frame.prev.clone();
            }
            Err(KernelError::new(
                ErrorKind::UnboundDynamicKey,
                "keyed dynamic variable has no binding in this dynamic extent",
            ))
        }
        Primitive::StaticBinder(key) => {
            let [value, env_val] = args_n("a keyed-static binder", operands)?;
            let Some(parent) = env_val.as_environment() else {
                return Err(KernelError::type_error(
                    "keyed-static binder needs an environment",
                    vec![env_val.clone()],
                ));
            };
            let child = Environment::with_keyed(parent.clone(), key.clone(), value);
            Ok(Step::Plug {
                value: Rc::new(Value::Environment(child)),
                cont: cont.clone(),
            })
        }
        Primitive::StaticAccessor(key) => {
            args_0("a keyed-static accessor", operands)?;
            match env.lookup_keyed(key) {
                Some(value) => Ok(Step::Plug {
                    value,
                    cont: cont.clone(),
                }),
                None => Err(KernelError::new(
                    ErrorKind::UnboundStaticKey,
                    "keyed static variable has no binding in this environment",
                )),
            }
        }
    }
}

/// Unpack an operand list of exactly N elements.
pub(crate) fn args_n<const N: usize>(
    name: &str,
    operands: &ValueRef,
) -> Result<[ValueRef; N], KernelError> {
    let args = types::list_elements(operands)?;
    let got = args.len();
    args.try_into()
        .map_err(|_| KernelError::arity(name, &N.to_string(), got))
}

pub(crate) fn args_0(name: &str, operands: &ValueRef) -> Result<(), KernelError> {
    let args = types::list_elements(operands)?;
    if !args.is_empty() {
        return Err(KernelError::arity(name, "0", args.len()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Promises
// ---------------------------------------------------------------------------

/// `force` on a non-promise is the identity.
pub fn force_value(value: &ValueRef, cont: &Rc<Continuation>) -> Result<Step, KernelError> {
    match &**value {
        Value::Promise(p) => force_promise(p.clone(), cont),
        _ => Ok(Step::Plug {
            value: value.clone(),
            cont: cont.clone(),
        }),
    }
}

fn force_promise(promise: Rc<Promise>, cont: &Rc<Continuation>) -> Result<Step, KernelError> {
    let target = collapse(promise);
    let state = target.cell.borrow().clone();
    match state {
        PromiseCell::Resolved(value) => Ok(Step::Plug {
            value,
            cont: cont.clone(),
        }),
        PromiseCell::Pending { expr, env } => {
            let handler = Continuation::new(
                ContKind::HandlePromise { promise: target },
                cont.clone(),
            );
            Ok(Step::Continue {
                expr,
                env,
                cont: handler,
            })
        }
        PromiseCell::Forwarded(_) => unreachable!("collapse resolves forwarding"),
    }
}

/// Plug behavior of the promise-handler frame: memoize the computed value,
/// or splice in a nested promise and keep forcing it.
pub fn handle_promise_result(
    promise: &Rc<Promise>,
    value: ValueRef,
    cont: &Rc<Continuation>,
) -> Result<Step, KernelError> {
    // The promise may have been resolved by a reentrant force during the
    // evaluation that just finished; that earlier result wins.
    let already = match &*promise.cell.borrow() {
        PromiseCell::Resolved(v) => Some(v.clone()),
        _ => None,
    };
    if let Some(value) = already {
        return Ok(Step::Plug {
            value,
            cont: cont.clone(),
        });
    }
    match &*value {
        Value::Promise(inner) => {
            *promise.cell.borrow_mut() = PromiseCell::Forwarded(inner.clone());
            force_promise(inner.clone(), cont)
        }
        _ => {
            *promise.cell.borrow_mut() = PromiseCell::Resolved(value.clone());
            Ok(Step::Plug {
                value,
                cont: cont.clone(),
            })
        }
    }
}

/// Follow forwarding links to the live cell, compressing the path.
fn collapse(promise: Rc<Promise>) -> Rc<Promise> {
    let mut cursor = promise.clone();
    loop {
        let next = match &*cursor.cell.borrow() {
            PromiseCell::Forwarded(next) => next.clone(),
            _ => break,
        };
        cursor = next;
    }
    if !Rc::ptr_eq(&promise, &cursor) {
        *promise.cell.borrow_mut() = PromiseCell::Forwarded(cursor.clone());
    }
    cursor
}
