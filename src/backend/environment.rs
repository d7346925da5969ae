//! First-class environments.
//!
//! An environment is a mutable frame of bindings plus an ordered list of
//! parent environments. Lookup is depth-first, left to right across the
//! parents; `define` always installs into the current frame, shadowing any
//! parent binding.

use smallvec::SmallVec;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::symbol::Symbol;
use super::types::{StaticKey, ValueRef};

pub struct Environment {
    parents: SmallVec<[Rc<Environment>; 2]>,
    bindings: RefCell<HashMap<Symbol, ValueRef>>,
    /// Keyed-static slot, set only on frames created by a keyed-static
    /// binder.
    keyed: Option<(Rc<StaticKey>, ValueRef)>,
}

impl Environment {
    pub fn new(parents: impl IntoIterator<Item = Rc<Environment>>) -> Rc<Environment> {
        Rc::new(Environment {
            parents: parents.into_iter().collect(),
            bindings: RefCell::new(HashMap::new()),
            keyed: None,
        })
    }

    pub fn empty() -> Rc<Environment> {
        Self::new([])
    }

    /// Fresh child of `parent` carrying a keyed-static binding.
    pub fn with_keyed(
        parent: Rc<Environment>,
        key: Rc<StaticKey>,
        value: ValueRef,
    ) -> Rc<Environment> {
        Rc::new(Environment {
            parents: SmallVec::from_iter([parent]),
            bindings: RefCell::new(HashMap::new()),
            keyed: Some((key, value)),
        })
    }

    pub fn lookup(&self, symbol: Symbol) -> Option<ValueRef> {
        if let Some(v) = self.bindings.borrow().get(&symbol) {
            return Some(v.clone());
        }
        for parent in &self.parents {
            if let Some(v) = parent.lookup(symbol) {
                return Some(v);
            }
        }
        None
    }

    pub fn is_bound(&self, symbol: Symbol) -> bool {
        self.lookup(symbol).is_some()
    }

    /// Install a binding in this frame unconditionally.
    pub fn define(&self, symbol: Symbol, value: ValueRef) {
        self.bindings.borrow_mut().insert(symbol, value);
    }

    /// Rebind `symbol` in the frame where it is currently bound, searching
    /// depth-first left to right. Returns false if the symbol is unbound.
    pub fn rebind(&self, symbol: Symbol, value: ValueRef) -> bool {
        {
            let mut bindings = self.bindings.borrow_mut();
            if bindings.contains_key(&symbol) {
                bindings.insert(symbol, value);
                return true;
            }
        }
        for parent in &self.parents {
            if parent.rebind(symbol, value.clone()) {
                return true;
            }
        }
        false
    }

    /// Search this environment and its ancestors for a keyed-static slot.
    pub fn lookup_keyed(&self, key: &Rc<StaticKey>) -> Option<ValueRef> {
        if let Some((k, v)) = &self.keyed {
            if Rc::ptr_eq(k, key) {
                return Some(v.clone());
            }
        }
        for parent in &self.parents {
            if let Some(v) = parent.lookup_keyed(key) {
                return Some(v);
            }
        }
        None
    }

    pub fn parents(&self) -> &[Rc<Environment>] {
        &self.parents
    }

    /// Visit the bindings of this frame only. Used by the debugger.
    pub fn for_each_binding(&self, mut f: impl FnMut(Symbol, &ValueRef)) {
        for (k, v) in self.bindings.borrow().iter() {
            f(*k, v);
        }
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("bindings", &self.bindings.borrow().len())
            .field("parents", &self.parents.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::symbol::intern;
    use crate::backend::types::fixnum;

    #[test]
    fn test_define_and_lookup() {
        let env = Environment::empty();
        env.define(intern("x"), fixnum(1));
        assert!(env.lookup(intern("x")).is_some());
        assert!(env.lookup(intern("y")).is_none());
    }

    #[test]
    fn test_child_shadows_parent() {
        let parent = Environment::empty();
        parent.define(intern("x"), fixnum(1));
        let child = Environment::new([parent.clone()]);
        child.define(intern("x"), fixnum(2));
        let found = child.lookup(intern("x")).unwrap();
        assert!(matches!(&*found, crate::backend::types::Value::Fixnum(2)));
        let outer = parent.lookup(intern("x")).unwrap();
        assert!(matches!(&*outer, crate::backend::types::Value::Fixnum(1)));
    }

    #[test]
    fn test_lookup_is_left_to_right() {
        let left = Environment::empty();
        left.define(intern("x"), fixnum(1));
        let right = Environment::empty();
        right.define(intern("x"), fixnum(2));
        let env = Environment::new([left, right]);
        let found = env.lookup(intern("x")).unwrap();
        assert!(matches!(&*found, crate::backend::types::Value::Fixnum(1)));
    }

    #[test]
    fn test_rebind_updates_owner_frame() {
        let parent = Environment::empty();
        parent.define(intern("x"), fixnum(1));
        let child = Environment::new([parent.clone()]);
        assert!(child.rebind(intern("x"), fixnum(9)));
        let found = parent.lookup(intern("x")).unwrap();
        assert!(matches!(&*found, crate::backend::types::Value::Fixnum(9)));
        assert!(!child.rebind(intern("missing"), fixnum(0)));
    }
}
