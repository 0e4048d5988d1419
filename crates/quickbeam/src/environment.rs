//! Runtime environment: variable cells, namespaces and frames
//!
//! A [`Namespace`] is an ordered map from name to [`Cell`]. Functions are
//! stored as variables whose name ends in `~`, and nested namespaces
//! (modules) as variables whose name ends in `:`. Scoping is a chain of
//! namespaces searched innermost first; the chain lives in the [`Frame`].

mod frame;
mod prelude;

pub use frame::Frame;
pub(crate) use frame::split_qualified;
pub use prelude::builtin_namespace;

use indexmap::IndexMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

use crate::value::Value;

/// Suffix marking a variable that holds a function.
pub const FN_SUFFIX: &str = "~";

/// Suffix marking a variable that holds a namespace.
pub const NS_SUFFIX: &str = ":";

// ═══════════════════════════════════════════════════════════════════════
// Cells
// ═══════════════════════════════════════════════════════════════════════

/// A shareable storage location holding one value.
///
/// Cloning a cell clones the handle, not the storage: every clone reads
/// and writes the same slot.
#[derive(Clone)]
pub struct Cell(Arc<RwLock<Value>>);

impl Cell {
    /// Create a cell holding `value`.
    pub fn new(value: Value) -> Self {
        Cell(Arc::new(RwLock::new(value)))
    }

    /// Current contents.
    pub fn get(&self) -> Value {
        self.0.read().clone()
    }

    /// Replace the contents.
    pub fn set(&self, value: Value) {
        *self.0.write() = value;
    }

    /// Whether both handles refer to the same storage.
    pub fn same(&self, other: &Cell) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cell({:?})", self.0.read())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Namespaces
// ═══════════════════════════════════════════════════════════════════════

/// An ordered, shared mapping from name to [`Cell`].
///
/// `Namespace` is a handle: clones share the same map, which is what lets
/// a closure, a module cache entry and an `eval &ns` caller all observe
/// the same variables. Use [`Namespace::snapshot`] to get an independent
/// map that still shares the cells.
///
/// # Example
///
/// ```
/// use quickbeam::{Namespace, Value};
///
/// let ns = Namespace::new();
/// ns.add("x", Value::from("1"));
///
/// let copy = ns.snapshot();
/// copy.add("y", Value::from("2"));
///
/// // new names in the copy stay there...
/// assert!(!ns.contains("y"));
///
/// // ...but existing cells are shared
/// copy.cell("x").unwrap().set(Value::from("10"));
/// assert_eq!(ns.get("x"), Some(Value::from("10")));
/// ```
#[derive(Clone, Default)]
pub struct Namespace {
    vars: Arc<RwLock<IndexMap<String, Cell>>>,
}

impl Namespace {
    /// Create an empty namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a namespace from name/value pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        let ns = Self::new();
        for (name, value) in pairs {
            ns.add(name, value);
        }
        ns
    }

    /// Look up the cell bound to `name`.
    pub fn cell(&self, name: &str) -> Option<Cell> {
        self.vars.read().get(name).cloned()
    }

    /// Look up the current value of `name`.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.vars.read().get(name).map(Cell::get)
    }

    /// Declare `name` with a fresh cell, replacing any existing binding.
    ///
    /// Closures that captured the previous cell keep seeing it; code that
    /// looks the name up afterwards gets the new one.
    pub fn declare(&self, name: impl Into<String>, value: Value) -> Cell {
        let cell = Cell::new(value);
        self.vars.write().insert(name.into(), cell.clone());
        cell
    }

    /// Declare a variable; builder-friendly variant of [`Namespace::declare`].
    pub fn add(&self, name: impl Into<String>, value: Value) -> &Self {
        self.declare(name, value);
        self
    }

    /// Declare a function variable (`name~`).
    pub fn add_fn(&self, name: &str, value: impl Into<Value>) -> &Self {
        self.add(format!("{}{}", name, FN_SUFFIX), value.into())
    }

    /// Declare a namespace variable (`name:`).
    pub fn add_ns(&self, name: &str, ns: Namespace) -> &Self {
        self.add(format!("{}{}", name, NS_SUFFIX), Value::Ns(ns))
    }

    /// Bind an existing cell under `name`, aliasing it.
    pub fn insert_cell(&self, name: impl Into<String>, cell: Cell) {
        self.vars.write().insert(name.into(), cell);
    }

    /// Remove a binding. Returns whether it existed.
    pub fn remove(&self, name: &str) -> bool {
        self.vars.write().shift_remove(name).is_some()
    }

    /// Whether `name` is bound.
    pub fn contains(&self, name: &str) -> bool {
        self.vars.read().contains_key(name)
    }

    /// Bound names, in declaration order.
    pub fn names(&self) -> Vec<String> {
        self.vars.read().keys().cloned().collect()
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.vars.read().len()
    }

    /// Whether there are no bindings.
    pub fn is_empty(&self) -> bool {
        self.vars.read().is_empty()
    }

    /// A new namespace with the same names bound to the same cells.
    ///
    /// Declarations made in the snapshot do not show up here and vice
    /// versa; assignments to pre-existing names are seen by both.
    pub fn snapshot(&self) -> Namespace {
        Namespace {
            vars: Arc::new(RwLock::new(self.vars.read().clone())),
        }
    }

    /// Bind every cell of `other` here, overriding same-named bindings.
    pub fn absorb(&self, other: &Namespace) {
        if self.same(other) {
            return;
        }
        let theirs = other.vars.read().clone();
        self.vars.write().extend(theirs);
    }

    /// A read/write handle for callers holding this namespace.
    pub fn export(&self) -> Namespace {
        self.clone()
    }

    /// Whether both handles refer to the same namespace.
    pub fn same(&self, other: &Namespace) -> bool {
        Arc::ptr_eq(&self.vars, &other.vars)
    }

    /// Address of the shared map, stable for the namespace's lifetime.
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.vars) as *const () as usize
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("addr", &format_args!("{:#x}", self.addr()))
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_identity_and_contents() {
        let a = Cell::new(Value::from("1"));
        let b = a.clone();
        let c = Cell::new(Value::from("1"));
        b.set(Value::from("2"));
        assert_eq!(a.get(), Value::from("2"));
        assert!(a.same(&b));
        assert!(!a.same(&c));
    }

    #[test]
    fn test_declare_replaces_cell() {
        let ns = Namespace::new();
        let old = ns.declare("x", Value::from("old"));
        let new = ns.declare("x", Value::from("new"));
        assert!(!old.same(&new));
        assert_eq!(old.get(), Value::from("old"));
        assert_eq!(ns.get("x"), Some(Value::from("new")));
    }

    #[test]
    fn test_names_keep_order() {
        let ns = Namespace::new();
        ns.add("b", Value::Nil).add("a", Value::Nil).add_fn("f", Value::Nil);
        assert_eq!(ns.names(), vec!["b", "a", "f~"]);
    }

    #[test]
    fn test_remove() {
        let ns = Namespace::from_pairs([("x", Value::Nil)]);
        assert!(ns.remove("x"));
        assert!(!ns.remove("x"));
        assert!(ns.is_empty());
    }

    #[test]
    fn test_snapshot_shares_cells_not_names() {
        let ns = Namespace::from_pairs([("x", Value::from("1"))]);
        let snap = ns.snapshot();
        snap.add("y", Value::Nil);
        ns.add("z", Value::Nil);
        assert!(!ns.contains("y"));
        assert!(!snap.contains("z"));
        assert!(ns.cell("x").unwrap().same(&snap.cell("x").unwrap()));
    }

    #[test]
    fn test_export_is_same_namespace() {
        let ns = Namespace::new();
        let handle = ns.export();
        handle.add("x", Value::Nil);
        assert!(ns.contains("x"));
        assert!(ns.same(&handle));
        assert_eq!(ns.addr(), handle.addr());
    }

    #[test]
    fn test_absorb_overrides() {
        let a = Namespace::from_pairs([("x", Value::from("a")), ("y", Value::from("a"))]);
        let b = Namespace::from_pairs([("x", Value::from("b"))]);
        a.absorb(&b);
        assert_eq!(a.get("x"), Some(Value::from("b")));
        assert_eq!(a.get("y"), Some(Value::from("a")));
        a.absorb(&a.clone());
        assert_eq!(a.len(), 2);
    }
}
