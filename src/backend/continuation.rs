//! Continuation frames and abnormal transfer.
//!
//! The evaluator keeps no native call stack: the whole control state is the
//! current `(expr, env, cont)` triple, and a continuation is a linked chain
//! of frames ending at the root. Plugging a value into a frame consumes the
//! frame and either produces the next machine step or keeps reducing up the
//! chain.
//!
//! Abnormal transfer (applying a captured continuation, or an error pass)
//! walks the source and destination chains with a transient mark bit to
//! select guard interceptors, then plugs the value through the composed
//! interceptor pipeline. The mark bit is always clear again when the
//! machine resumes.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use super::environment::Environment;
use super::error::{ErrorKind, KernelError};
use super::eval::{self, Step};
use super::types::{
    self, applicative, DynamicKey, Promise, SourcePos, Value, ValueRef,
};
use super::Interp;

pub struct Continuation {
    pub kind: ContKind,
    pub prev: Option<Rc<Continuation>>,
    /// Transient flag used only while selecting interceptors for an
    /// abnormal pass.
    pub marked: Cell<bool>,
    pub pos: Option<SourcePos>,
}

#[derive(Clone)]
pub enum ContKind {
    /// Bottom of every chain; plugging it ends the program.
    Root,
    /// Bottom of an embedded evaluation; plugging it ends that evaluation.
    Terminal,
    /// Reports an unhandled error value, then forwards it.
    BaseError,
    /// Marker frames for the error taxonomy, named in the ground env.
    Named(&'static str),
    EvalArgs { rest: ValueRef, env: Rc<Environment> },
    NoMoreArgs,
    GatherArgs { head: ValueRef },
    Apply { combiner: ValueRef, env: Rc<Environment> },
    Combine { operands: ValueRef, env: Rc<Environment> },
    Sequence { rest: ValueRef, env: Rc<Environment> },
    If { consequent: ValueRef, alternative: ValueRef, env: Rc<Environment> },
    Cond { clauses: ValueRef, env: Rc<Environment> },
    Define { definiend: ValueRef, env: Rc<Environment> },
    /// `$set!`: rebind in the frame where the symbol is currently bound.
    Set { definiend: ValueRef, env: Rc<Environment> },
    InnerGuard { guards: ValueRef, env: Rc<Environment> },
    OuterGuard { guards: ValueRef, env: Rc<Environment> },
    Intercept { interceptor: ValueRef, env: Rc<Environment>, outer: Rc<Continuation> },
    Extend { receiver: ValueRef, env: Rc<Environment> },
    HandlePromise { promise: Rc<Promise> },
    KeyedDynamic { key: Rc<DynamicKey>, value: ValueRef },
    /// Discards the incoming value and forwards a fixed one.
    Constant { value: ValueRef },
}

impl Continuation {
    pub fn root() -> Rc<Continuation> {
        Rc::new(Continuation {
            kind: ContKind::Root,
            prev: None,
            marked: Cell::new(false),
            pos: None,
        })
    }

    pub fn new(kind: ContKind, prev: Rc<Continuation>) -> Rc<Continuation> {
        Rc::new(Continuation {
            kind,
            prev: Some(prev),
            marked: Cell::new(false),
            pos: None,
        })
    }

    pub fn with_pos(
        kind: ContKind,
        prev: Rc<Continuation>,
        pos: Option<SourcePos>,
    ) -> Rc<Continuation> {
        Rc::new(Continuation {
            kind,
            prev: Some(prev),
            marked: Cell::new(false),
            pos,
        })
    }

    /// Short human-readable tag, used by tracebacks and value display.
    pub fn describe(&self) -> &'static str {
        match &self.kind {
            ContKind::Root => "root",
            ContKind::Terminal => "terminal",
            ContKind::BaseError => "base-error",
            ContKind::Named(name) => name,
            ContKind::EvalArgs { .. } => "eval-args",
            ContKind::NoMoreArgs => "no-more-args",
            ContKind::GatherArgs { .. } => "gather-args",
            ContKind::Apply { .. } => "apply",
            ContKind::Combine { .. } => "combine",
            ContKind::Sequence { .. } => "sequence",
            ContKind::If { .. } => "if",
            ContKind::Cond { .. } => "cond",
            ContKind::Define { .. } => "define",
            ContKind::Set { .. } => "set",
            ContKind::InnerGuard { .. } => "inner-guard",
            ContKind::OuterGuard { .. } => "outer-guard",
            ContKind::Intercept { .. } => "intercept",
            ContKind::Extend { .. } => "extend",
            ContKind::HandlePromise { .. } => "promise-handler",
            ContKind::KeyedDynamic { .. } => "keyed-dynamic",
            ContKind::Constant { .. } => "constant",
        }
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation")
            .field("kind", &self.describe())
            .field("pos", &self.pos)
            .finish()
    }
}

/// Deliver `value` to `cont`, reducing passthrough frames in a loop so the
/// native stack stays flat no matter how deep the chain is.
pub fn plug_reduce(
    interp: &Interp,
    cont: &Rc<Continuation>,
    value: ValueRef,
) -> Result<Step, KernelError> {
    let mut cont = cont.clone();
    let mut value = value;
    loop {
        interp.debug.on_plug_reduce(interp, &value, &cont);
        let Some(prev) = cont.prev.clone() else {
            // Root: escape with the final value.
            return Ok(Step::Terminate(value));
        };
        // Cloning the kind keeps the frame itself free to be replaced
        // while its payload is consumed; everything inside is a handle.
        let kind = cont.kind.clone();
        let step = match kind {
            ContKind::Root => unreachable!("root has no prev link"),
            ContKind::Terminal => return Ok(Step::Terminate(value)),
            ContKind::BaseError => {
                if let Value::Error(err) = &*value {
                    super::debug::report_error(err);
                }
                cont = prev;
                continue;
            }
            ContKind::Named(_)
            | ContKind::InnerGuard { .. }
            | ContKind::OuterGuard { .. }
            | ContKind::KeyedDynamic { .. } => {
                // Marker frames forward untouched.
                cont = prev;
                continue;
            }
            ContKind::EvalArgs { rest, env } => match &*rest {
                Value::Pair(p) => {
                    let gather = Continuation::new(ContKind::GatherArgs { head: value }, prev);
                    let next = Continuation::new(
                        ContKind::EvalArgs {
                            rest: p.cdr.clone(),
                            env: env.clone(),
                        },
                        gather,
                    );
                    return Ok(Step::Continue {
                        expr: p.car.clone(),
                        env,
                        cont: next,
                    });
                }
                Value::Null => {
                    cont = Continuation::new(ContKind::NoMoreArgs, prev);
                    continue;
                }
                _ => {
                    return Err(KernelError::with_irritants(
                        ErrorKind::CombineWithNonListOperands,
                        "operand tree is not a list",
                        vec![rest.clone()],
                    ))
                }
            },
            ContKind::NoMoreArgs => {
                value = types::cons(value, types::nil());
                cont = prev;
                continue;
            }
            ContKind::GatherArgs { head } => {
                value = types::cons(head, value);
                cont = prev;
                continue;
            }
            ContKind::Apply { combiner, env } => {
                eval::combine(interp, &combiner, &value, &env, &prev)?
            }
            ContKind::Combine { operands, env } => {
                eval::combine(interp, &value, &operands, &env, &prev)?
            }
            // The just-computed value is discarded; the rest of the body
            // runs in the same environment, last form in tail position.
            ContKind::Sequence { rest, env } => eval::sequence(&rest, &env, &prev)?,
            ContKind::If {
                consequent,
                alternative,
                env,
            } => match &*value {
                Value::Boolean(true) => {
                    return Ok(Step::Continue {
                        expr: consequent,
                        env,
                        cont: prev,
                    })
                }
                Value::Boolean(false) => {
                    return Ok(Step::Continue {
                        expr: alternative,
                        env,
                        cont: prev,
                    })
                }
                _ => {
                    return Err(KernelError::type_error(
                        "$if test did not yield a boolean",
                        vec![value.clone()],
                    ))
                }
            },
            ContKind::Cond { clauses, env } => match &*value {
                Value::Boolean(true) => {
                    let body = clause_body(&clauses)?;
                    eval::sequence(&body, &env, &prev)?
                }
                Value::Boolean(false) => {
                    let rest = clause_rest(&clauses)?;
                    match &*rest {
                        Value::Null => {
                            value = types::inert();
                            cont = prev;
                            continue;
                        }
                        Value::Pair(_) => {
                            let test = clause_test(&rest)?;
                            let next = Continuation::new(
                                ContKind::Cond {
                                    clauses: rest.clone(),
                                    env: env.clone(),
                                },
                                prev,
                            );
                            return Ok(Step::Continue {
                                expr: test,
                                env,
                                cont: next,
                            });
                        }
                        _ => {
                            return Err(KernelError::type_error(
                                "$cond clauses must form a list",
                                vec![rest.clone()],
                            ))
                        }
                    }
                }
                _ => {
                    return Err(KernelError::type_error(
                        "$cond test did not yield a boolean",
                        vec![value.clone()],
                    ))
                }
            },
            ContKind::Define { definiend, env } => {
                eval::match_parameter_tree(&definiend, &value, &env)?;
                eval::record_operative_name(&definiend, &value);
                value = types::inert();
                cont = prev;
                continue;
            }
            ContKind::Set { definiend, env } => {
                let Some(sym) = definiend.as_symbol() else {
                    return Err(KernelError::type_error(
                        "$set! needs a symbol to rebind",
                        vec![definiend.clone()],
                    ));
                };
                if !env.rebind(sym, value) {
                    return Err(KernelError::new(
                        ErrorKind::SymbolNotFound,
                        format!("cannot set unbound symbol {}", sym),
                    ));
                }
                value = types::inert();
                cont = prev;
                continue;
            }
            ContKind::Intercept {
                interceptor,
                env,
                outer,
            } => {
                let divert = applicative(Rc::new(Value::ContWrapper(outer)));
                let operands = types::list_from(vec![value, divert]);
                let target = match &*interceptor {
                    Value::Applicative(app) => app.underlying.clone(),
                    _ => interceptor.clone(),
                };
                eval::combine(interp, &target, &operands, &env, &prev)?
            }
            ContKind::Extend { receiver, env } => {
                // The received value tree becomes the operand tree of the
                // receiver's underlying combiner.
                let target = match &*receiver {
                    Value::Applicative(app) => app.underlying.clone(),
                    _ => receiver.clone(),
                };
                eval::combine(interp, &target, &value, &env, &prev)?
            }
            ContKind::HandlePromise { promise } => {
                eval::handle_promise_result(&promise, value, &prev)?
            }
            ContKind::Constant { value: fixed } => {
                value = fixed;
                cont = prev;
                continue;
            }
        };
        match step {
            Step::Plug { value: v, cont: c } => {
                value = v;
                cont = c;
            }
            other => return Ok(other),
        }
    }
}

fn clause_pair(clauses: &ValueRef) -> Result<&types::Pair, KernelError> {
    match &**clauses {
        Value::Pair(p) => Ok(p),
        _ => Err(KernelError::type_error(
            "$cond clauses must form a list",
            vec![clauses.clone()],
        )),
    }
}

fn clause_test(clauses: &ValueRef) -> Result<ValueRef, KernelError> {
    let clause = clause_pair(clauses)?.car.clone();
    match &*clause {
        Value::Pair(p) => Ok(p.car.clone()),
        _ => Err(KernelError::type_error(
            "$cond clause must be a (test . body) pair",
            vec![clause.clone()],
        )),
    }
}

fn clause_body(clauses: &ValueRef) -> Result<ValueRef, KernelError> {
    let clause = clause_pair(clauses)?.car.clone();
    match &*clause {
        Value::Pair(p) => Ok(p.cdr.clone()),
        _ => Err(KernelError::type_error(
            "$cond clause must be a (test . body) pair",
            vec![clause.clone()],
        )),
    }
}

fn clause_rest(clauses: &ValueRef) -> Result<ValueRef, KernelError> {
    Ok(clause_pair(clauses)?.cdr.clone())
}

// ---------------------------------------------------------------------------
// Abnormal transfer
// ---------------------------------------------------------------------------

/// An interceptor selected for one leg of an abnormal pass.
pub struct SelectedGuard {
    pub interceptor: ValueRef,
    pub env: Rc<Environment>,
    /// The continuation the interceptor may divert to, exposed to it as an
    /// applicative second argument.
    pub outer: Rc<Continuation>,
}

enum GuardSide {
    Exit,
    Entry,
}

/// Pass `value` from `src` to `dst` across guard boundaries.
///
/// Exit interceptors are the inner-guard frames between `src` and the
/// common ancestor whose selector lies on the destination chain; entry
/// interceptors are the outer-guard frames between the common ancestor and
/// `dst` whose selector lies on the source chain. The composed pipeline
/// runs exits innermost-first, then entries outermost-first, then reaches
/// `dst`.
pub fn abnormally_pass(
    interp: &Interp,
    value: ValueRef,
    src: &Rc<Continuation>,
    dst: &Rc<Continuation>,
) -> Result<Step, KernelError> {
    mark_chain(dst, true);
    let exiting = select_interceptors(src, GuardSide::Exit);
    mark_chain(dst, false);
    mark_chain(src, true);
    let entering = select_interceptors(dst, GuardSide::Entry);
    mark_chain(src, false);

    interp
        .debug
        .on_abnormal_pass(interp, &value, src, dst, &exiting, &entering);
    tracing::trace!(
        exiting = exiting.len(),
        entering = entering.len(),
        "abnormal pass"
    );

    let mut head = dst.clone();
    for guard in entering {
        head = Continuation::new(
            ContKind::Intercept {
                interceptor: guard.interceptor,
                env: guard.env,
                outer: guard.outer,
            },
            head,
        );
    }
    for guard in exiting.into_iter().rev() {
        head = Continuation::new(
            ContKind::Intercept {
                interceptor: guard.interceptor,
                env: guard.env,
                outer: guard.outer,
            },
            head,
        );
    }
    plug_reduce(interp, &head, value)
}

fn mark_chain(start: &Rc<Continuation>, flag: bool) {
    let mut cursor = Some(start.clone());
    while let Some(cont) = cursor {
        if cont.marked.get() == flag {
            break;
        }
        cont.marked.set(flag);
        cursor = cont.prev.clone();
    }
}

/// Walk unmarked frames from `start` toward the root, selecting at most one
/// matching clause per guard frame of the requested side. The walk stops at
/// the first marked frame (the common ancestor region).
fn select_interceptors(start: &Rc<Continuation>, side: GuardSide) -> Vec<SelectedGuard> {
    let mut selected = Vec::new();
    let mut cursor = Some(start.clone());
    while let Some(cont) = cursor {
        if cont.marked.get() {
            break;
        }
        match (&cont.kind, &side) {
            (ContKind::InnerGuard { guards, env }, GuardSide::Exit) => {
                if let Some(interceptor) = first_matching_clause(guards) {
                    // The paired outer-guard frame sits directly below.
                    if let Some(outer) = cont.prev.clone() {
                        selected.push(SelectedGuard {
                            interceptor,
                            env: env.clone(),
                            outer,
                        });
                    }
                }
            }
            (ContKind::OuterGuard { guards, env }, GuardSide::Entry) => {
                if let Some(interceptor) = first_matching_clause(guards) {
                    selected.push(SelectedGuard {
                        interceptor,
                        env: env.clone(),
                        outer: cont.clone(),
                    });
                }
            }
            _ => {}
        }
        cursor = cont.prev.clone();
    }
    selected
}

/// A clause `(selector interceptor)` matches when its selector continuation
/// is on the opposite (marked) chain. The first match per frame wins.
fn first_matching_clause(guards: &ValueRef) -> Option<ValueRef> {
    for clause in types::iter_list(guards) {
        let mut parts = types::iter_list(&clause);
        let (Some(selector), Some(interceptor)) = (parts.next(), parts.next()) else {
            continue;
        };
        if let Value::Continuation(sel) = &*selector {
            if sel.marked.get() {
                return Some(interceptor);
            }
        }
    }
    None
}
