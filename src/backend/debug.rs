//! Observation hooks and the stepping debugger.
//!
//! The evaluator emits three observation points: `on_eval` before each
//! dispatch (which may rewrite the current triple), `on_plug_reduce` on
//! each frame reduction, and `on_abnormal_pass` on each abnormal transfer.
//! All default to no-ops; the stepping debugger is one implementation,
//! driven from a small command prompt:
//!
//! - `,c` continue, `,s` step, `,n` run to the current continuation
//! - `,e` / `,E` print bindings (current frame / with parents)
//! - `,q` quit
//! - anything else is parsed and evaluated in the paused environment

use std::cell::RefCell;
use std::rc::Rc;

use super::continuation::{Continuation, SelectedGuard};
use super::environment::Environment;
use super::error::ErrorObject;
use super::eval;
use super::types::{Value, ValueRef};
use super::Interp;

pub trait DebugHook {
    fn on_eval(
        &self,
        _interp: &Interp,
        _expr: &ValueRef,
        _env: &Rc<Environment>,
        _cont: &Rc<Continuation>,
    ) -> Option<(ValueRef, Rc<Environment>, Rc<Continuation>)> {
        None
    }

    fn on_plug_reduce(&self, _interp: &Interp, _value: &ValueRef, _cont: &Rc<Continuation>) {}

    fn on_abnormal_pass(
        &self,
        _interp: &Interp,
        _value: &ValueRef,
        _src: &Rc<Continuation>,
        _dst: &Rc<Continuation>,
        _exiting: &[SelectedGuard],
        _entering: &[SelectedGuard],
    ) {
    }
}

/// Swappable hook slot owned by the interpreter context.
pub struct DebugState {
    hook: RefCell<Option<Rc<dyn DebugHook>>>,
    latest_command: RefCell<Option<String>>,
}

impl Default for DebugState {
    fn default() -> Self {
        DebugState {
            hook: RefCell::new(None),
            latest_command: RefCell::new(None),
        }
    }
}

impl DebugState {
    pub fn start_stepping(&self) {
        *self.hook.borrow_mut() = Some(Rc::new(StepHook));
    }

    pub fn stop_stepping(&self) {
        *self.hook.borrow_mut() = None;
    }

    pub fn install(&self, hook: Rc<dyn DebugHook>) {
        *self.hook.borrow_mut() = Some(hook);
    }

    fn current(&self) -> Option<Rc<dyn DebugHook>> {
        self.hook.borrow().clone()
    }

    pub fn on_eval(
        &self,
        interp: &Interp,
        expr: &ValueRef,
        env: &Rc<Environment>,
        cont: &Rc<Continuation>,
    ) -> Option<(ValueRef, Rc<Environment>, Rc<Continuation>)> {
        self.current()?.on_eval(interp, expr, env, cont)
    }

    pub fn on_plug_reduce(&self, interp: &Interp, value: &ValueRef, cont: &Rc<Continuation>) {
        if let Some(hook) = self.current() {
            hook.on_plug_reduce(interp, value, cont);
        }
    }

    pub fn on_abnormal_pass(
        &self,
        interp: &Interp,
        value: &ValueRef,
        src: &Rc<Continuation>,
        dst: &Rc<Continuation>,
        exiting: &[SelectedGuard],
        entering: &[SelectedGuard],
    ) {
        if let Some(hook) = self.current() {
            hook.on_abnormal_pass(interp, value, src, dst, exiting, entering);
        }
    }

    /// Called by the trampoline when an error is signalled. Interactive
    /// only while a stepping session is active; reporting happens when the
    /// error value reaches the base error continuation.
    pub fn on_error(&self, interp: &Interp, error: &Rc<ErrorObject>) {
        if self.current().is_none() {
            return;
        }
        eprintln!("*** ERROR *** : {}", error.message);
        if let Some(expr) = error.expr.borrow().as_ref() {
            eprintln!("while evaluating {}", expr);
        }
        let env = error
            .env
            .borrow()
            .clone()
            .unwrap_or_else(Environment::empty);
        let cont = error
            .src_cont
            .borrow()
            .clone()
            .unwrap_or_else(|| interp.root_cont.clone());
        debug_interaction(interp, &env, &cont);
    }
}

/// Print an unhandled error; invoked by the base error continuation.
pub fn report_error(error: &Rc<ErrorObject>) {
    eprintln!("*** ERROR *** : {}", error.message);
    if !matches!(&*error.irritants, Value::Null) {
        eprintln!("    irritants: {}", error.irritants);
    }
    if let Some(expr) = error.expr.borrow().as_ref() {
        if let Value::Pair(p) = &**expr {
            if let Some(pos) = &p.pos {
                eprintln!("    at {}", pos);
            }
        }
        eprintln!("    while evaluating {}", expr);
    }
}

/// Pause before every datum that carries a source position.
struct StepHook;

impl DebugHook for StepHook {
    fn on_eval(
        &self,
        interp: &Interp,
        expr: &ValueRef,
        env: &Rc<Environment>,
        cont: &Rc<Continuation>,
    ) -> Option<(ValueRef, Rc<Environment>, Rc<Continuation>)> {
        if let Value::Pair(p) = &**expr {
            if let Some(pos) = &p.pos {
                println!("{}: {}", pos, expr);
                debug_interaction(interp, env, cont);
            }
        }
        None
    }

    fn on_abnormal_pass(
        &self,
        _interp: &Interp,
        value: &ValueRef,
        src: &Rc<Continuation>,
        dst: &Rc<Continuation>,
        _exiting: &[SelectedGuard],
        _entering: &[SelectedGuard],
    ) {
        println!(
            "*** ABNORMAL PASS of {} from {} to {}",
            value,
            src.describe(),
            dst.describe()
        );
    }
}

/// Run silently until a value is plugged into the remembered continuation,
/// then hand control back to the prompt.
struct ResumeHook {
    env: Rc<Environment>,
    cont: Rc<Continuation>,
}

impl DebugHook for ResumeHook {
    fn on_plug_reduce(&self, interp: &Interp, value: &ValueRef, cont: &Rc<Continuation>) {
        if Rc::ptr_eq(cont, &self.cont) {
            if let Some(pos) = &cont.pos {
                println!("{}", pos);
            }
            println!("<<< RETURN {}", value);
            debug_interaction(interp, &self.env, cont);
        }
    }

    fn on_abnormal_pass(
        &self,
        _interp: &Interp,
        value: &ValueRef,
        src: &Rc<Continuation>,
        dst: &Rc<Continuation>,
        exiting: &[SelectedGuard],
        entering: &[SelectedGuard],
    ) {
        for guard in exiting {
            if Rc::ptr_eq(&guard.outer, &self.cont) {
                println!(
                    "*** EXITED THROUGH ABNORMAL PASS of {} from {} to {}",
                    value,
                    src.describe(),
                    dst.describe()
                );
                return;
            }
        }
        for guard in entering {
            if Rc::ptr_eq(&guard.outer, &self.cont) {
                println!(
                    "*** ENTERED THROUGH ABNORMAL PASS of {} from {} to {}",
                    value,
                    src.describe(),
                    dst.describe()
                );
                return;
            }
        }
    }
}

fn read_command(interp: &Interp) -> Option<String> {
    let mut editor = rustyline::DefaultEditor::new().ok()?;
    match editor.readline("> ") {
        Ok(line) => {
            let line = line.trim().to_string();
            if line.is_empty() {
                interp.debug.latest_command.borrow().clone()
            } else {
                *interp.debug.latest_command.borrow_mut() = Some(line.clone());
                Some(line)
            }
        }
        Err(_) => None,
    }
}

pub fn debug_interaction(interp: &Interp, env: &Rc<Environment>, cont: &Rc<Continuation>) {
    loop {
        let Some(cmd) = read_command(interp) else {
            interp.debug.stop_stepping();
            return;
        };
        match cmd.as_str() {
            ",c" => {
                interp.debug.stop_stepping();
                return;
            }
            ",s" => {
                interp.debug.start_stepping();
                return;
            }
            ",n" => {
                interp.debug.install(Rc::new(ResumeHook {
                    env: env.clone(),
                    cont: cont.clone(),
                }));
                return;
            }
            ",r" => {
                // Resume at the nearest enclosing frame with a position.
                let mut target = cont.prev.clone();
                while let Some(frame) = target.take() {
                    if frame.pos.is_some() {
                        target = Some(frame);
                        break;
                    }
                    target = frame.prev.clone();
                }
                match target {
                    Some(frame) => {
                        interp.debug.install(Rc::new(ResumeHook {
                            env: env.clone(),
                            cont: frame,
                        }));
                    }
                    None => interp.debug.stop_stepping(),
                }
                return;
            }
            ",e" => print_bindings(env, false, 0),
            ",E" => print_bindings(env, true, 0),
            ",q" => std::process::exit(0),
            _ => match crate::sexpr::parse_str(&cmd, None) {
                Ok(exprs) => {
                    // Evaluate with stepping suspended so the prompt's own
                    // expressions do not re-enter the debugger.
                    let saved = interp.debug.hook.borrow().clone();
                    interp.debug.stop_stepping();
                    for expr in exprs {
                        let result = eval::run_one_expr(interp, expr, env);
                        println!("{}", result);
                    }
                    *interp.debug.hook.borrow_mut() = saved;
                }
                Err(e) => eprintln!("parse error: {}", e),
            },
        }
    }
}

pub fn print_bindings(env: &Rc<Environment>, recursive: bool, indent: usize) {
    env.for_each_binding(|name, value| {
        println!("{}{} : {}", "    ".repeat(indent), name, value);
    });
    if recursive {
        for parent in env.parents() {
            println!("{} ---", "    ".repeat(indent));
            print_bindings(parent, true, indent + 1);
        }
    }
}
