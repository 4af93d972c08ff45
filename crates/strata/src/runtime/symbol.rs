//! Name interning for types, fields and methods.
//!
//! Every name the runtime compares (type names, field names, method names)
//! is interned once into a process-wide table. A [`Symbol`] is a small
//! integer handle, so comparing and hashing names in method tables and
//! layouts is O(1).
//!
//! # Architecture
//!
//! Interned strings are leaked and live for the whole program, the same way
//! selectors and class names are never deallocated. The table is guarded by
//! an `RwLock`, so interning from the read path only takes the read lock.

use fxhash::FxHashMap;
use std::fmt;
use std::sync::{OnceLock, PoisonError, RwLock};

/// Interned name handle.
///
/// # Example
///
/// ```rust
/// use strata::Symbol;
///
/// let a = Symbol::intern("length");
/// let b = Symbol::intern("length");
///
/// assert_eq!(a, b);
/// assert_eq!(a.as_str(), "length");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

struct Interner {
    names: Vec<&'static str>,
    index: FxHashMap<&'static str, Symbol>,
}

static INTERNER: OnceLock<RwLock<Interner>> = OnceLock::new();

fn interner() -> &'static RwLock<Interner> {
    INTERNER.get_or_init(|| {
        RwLock::new(Interner {
            names: Vec::with_capacity(256),
            index: FxHashMap::default(),
        })
    })
}

impl Symbol {
    /// Returns the symbol for `name`, interning it on first use.
    ///
    /// # Panics
    ///
    /// Panics if more than `u32::MAX` distinct names are interned.
    #[must_use]
    pub fn intern(name: &str) -> Symbol {
        let table = interner();

        {
            let read = table.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(&sym) = read.index.get(name) {
                return sym;
            }
        }

        let mut write = table.write().unwrap_or_else(PoisonError::into_inner);
        // Another thread may have interned it between the two locks.
        if let Some(&sym) = write.index.get(name) {
            return sym;
        }

        let id = u32::try_from(write.names.len()).expect("symbol table exhausted");
        let leaked: &'static str = Box::leak(name.to_owned().into_boxed_str());
        let sym = Symbol(id);
        write.names.push(leaked);
        write.index.insert(leaked, sym);
        sym
    }

    /// Returns the symbol for `name` if it was ever interned.
    ///
    /// Read-only lookups use this so that asking about unknown names does not
    /// grow the table.
    #[must_use]
    pub fn lookup(name: &str) -> Option<Symbol> {
        let read = interner().read().unwrap_or_else(PoisonError::into_inner);
        read.index.get(name).copied()
    }

    /// Returns the interned string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        let read = interner().read().unwrap_or_else(PoisonError::into_inner);
        // Symbols are only minted by `intern`, so the index is always present.
        read.names[self.0 as usize]
    }

    /// Returns the raw table index.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Symbol::intern(name)
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", self.as_str())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
