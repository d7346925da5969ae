//! Symbol interning for the process-wide symbol table.
//!
//! Two symbols with the same name are the same symbol: `Symbol` is a small
//! copyable key into a global interner, so key equality coincides with name
//! equality. Environments hash symbols directly by key.

use lasso::{Spur, ThreadedRodeo};
use std::fmt;
use std::sync::OnceLock;

/// Global interner for symbols - lazily initialized
static INTERNER: OnceLock<ThreadedRodeo> = OnceLock::new();

#[inline]
fn interner() -> &'static ThreadedRodeo {
    INTERNER.get_or_init(ThreadedRodeo::new)
}

/// Interned symbol - 4 bytes, O(1) comparison
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Symbol(Spur);

impl Symbol {
    /// Create a new symbol from a string (interns if new)
    #[inline]
    pub fn new(s: &str) -> Self {
        Symbol(interner().get_or_intern(s))
    }

    /// Get the string representation of this symbol
    #[inline]
    pub fn as_str(&self) -> &'static str {
        interner().resolve(&self.0)
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", self.as_str())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for Symbol {
    #[inline]
    fn from(s: &str) -> Self {
        Symbol::new(s)
    }
}

impl AsRef<str> for Symbol {
    #[inline]
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl PartialEq<str> for Symbol {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for Symbol {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

/// Intern a string and return a Symbol
#[inline]
pub fn intern(s: &str) -> Symbol {
    Symbol::new(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interned_symbols_are_identical() {
        let s1 = intern("hello");
        let s2 = intern("hello");
        let s3 = intern("other");
        assert_eq!(s1, s2);
        assert_ne!(s1, s3);
        assert_eq!(s1.as_str(), "hello");
    }

    #[test]
    fn test_symbol_hash() {
        use std::collections::HashMap;
        let mut map: HashMap<Symbol, i32> = HashMap::new();
        map.insert(intern("key"), 42);
        assert_eq!(map.get(&intern("key")), Some(&42));
    }

    #[test]
    fn test_symbol_display() {
        let s = intern("$vau");
        assert_eq!(format!("{}", s), "$vau");
    }
}
