use std::{collections::HashMap, fmt};

use crate::{
    compiler::{
        source::SourceRange,
        typing::{Constantness, IntKind, Type},
    },
    runtime::value::Value,
};

/// Globally unique id of an [`Entry`] in [`IdentStorage`].
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct IdentId(usize);

impl fmt::Display for IdentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What is known about the expression bound to an identifier.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum EntryData {
    #[default]
    None,
    Expression {
        constantness: Constantness,
        ty: Type,
    },
    /// The definition failed to resolve; usages are poisoned silently
    /// instead of suspending forever.
    Poisoned,
}

/// Everything known about one bound name.
///
/// Entries are created by the identifier resolver's scout pass (or seeded
/// for builtins) and filled in by the type resolver.
#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    pub id: IdentId,
    pub builtin: bool,
    pub name: String,
    /// The range of the defining identifier; the builtin sentinel range for
    /// seeded entries.
    pub range: SourceRange,
    /// Set while the entry's own definition is being resolved, to detect
    /// invalid recursive uses.
    pub is_being_defined: bool,
    pub data: EntryData,
    pub value: Value,
}

/// Global table of identifier entries, keyed by dense [`IdentId`].
///
/// Builtin entries are seeded before any user code: each builtin type name
/// is a constant of type `type` whose value is the type itself.
#[derive(Debug)]
pub struct IdentStorage {
    entries: Vec<Entry>,
    builtins: usize,
}

impl IdentStorage {
    pub fn new() -> Self {
        let mut storage = Self {
            entries: Vec::new(),
            builtins: 0,
        };
        for &kind in IntKind::ALL {
            storage.seed_builtin(kind.name(), Type::Integer(kind.integer_type()));
        }
        storage.seed_builtin("bool", Type::Boolean);
        storage.seed_builtin("type", Type::Meta);
        storage.builtins = storage.entries.len();
        storage
    }

    fn seed_builtin(&mut self, name: &str, ty: Type) {
        let id = IdentId(self.entries.len());
        self.entries.push(Entry {
            id,
            builtin: true,
            name: name.into(),
            range: SourceRange::builtin(),
            is_being_defined: false,
            data: EntryData::Expression {
                constantness: Constantness::Constant,
                ty: Type::Meta,
            },
            value: Value::Type(ty),
        });
    }

    /// Allocates a fresh entry for a user defined name.
    pub fn allocate(&mut self, name: impl Into<String>, range: SourceRange) -> IdentId {
        let id = IdentId(self.entries.len());
        self.entries.push(Entry {
            id,
            builtin: false,
            name: name.into(),
            range,
            is_being_defined: false,
            data: EntryData::None,
            value: Value::None,
        });
        id
    }

    pub fn entry(&self, id: IdentId) -> &Entry {
        &self.entries[id.0]
    }

    pub fn entry_mut(&mut self, id: IdentId) -> &mut Entry {
        &mut self.entries[id.0]
    }

    /// Iterates over the seeded builtin entries.
    pub fn builtins(&self) -> impl Iterator<Item = &Entry> {
        self.entries[..self.builtins].iter()
    }
}

impl Default for IdentStorage {
    fn default() -> Self {
        Self::new()
    }
}

/// Lexical scope stack mirroring the nesting of functions.
///
/// Lookup walks from the innermost scope outwards; mutation only ever
/// touches the innermost scope. The root scope holds the builtin bindings.
#[derive(Debug)]
pub struct ScopeStack {
    scopes: Vec<HashMap<String, IdentId>>,
}

impl ScopeStack {
    /// Creates a stack whose root scope binds every builtin entry.
    pub fn with_builtins(storage: &IdentStorage) -> Self {
        let root = storage
            .builtins()
            .map(|entry| (entry.name.clone(), entry.id))
            .collect();
        Self { scopes: vec![root] }
    }

    pub fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop(&mut self) {
        assert!(self.scopes.len() > 1, "the root scope should never be popped");
        self.scopes.pop();
    }

    /// Looks a name up, walking parent scopes.
    pub fn lookup(&self, name: &str) -> Option<IdentId> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    /// Binds a name in the innermost scope, returning the id it previously
    /// bound in that same scope, if any.
    pub fn bind(&mut self, name: impl Into<String>, id: IdentId) -> Option<IdentId> {
        self.scopes
            .last_mut()
            .expect("scope stack should never be empty")
            .insert(name.into(), id)
    }

    /// Whether a name is already bound in the innermost scope, ignoring
    /// parents.
    pub fn bound_in_innermost(&self, name: &str) -> Option<IdentId> {
        self.scopes
            .last()
            .expect("scope stack should never be empty")
            .get(name)
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_seeded() {
        let storage = IdentStorage::new();
        let names: Vec<_> = storage.builtins().map(|entry| entry.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "ct_int", "i1", "i2", "i4", "i8", "u1", "u2", "u4", "u8", "iptr", "uptr",
                "bool", "type",
            ]
        );
        for entry in storage.builtins() {
            assert!(entry.builtin);
            assert!(entry.range.is_builtin());
            assert!(matches!(
                entry.data,
                EntryData::Expression {
                    constantness: Constantness::Constant,
                    ty: Type::Meta,
                }
            ));
            assert!(matches!(entry.value, Value::Type(_)));
        }
    }

    #[test]
    fn allocation_is_dense() {
        let mut storage = IdentStorage::new();
        let a = storage.allocate("a", SourceRange::builtin());
        let b = storage.allocate("b", SourceRange::builtin());
        assert_ne!(a, b);
        assert_eq!(storage.entry(a).name, "a");
        assert_eq!(storage.entry(b).name, "b");
        assert!(!storage.entry(a).builtin);
        assert_eq!(storage.entry(a).data, EntryData::None);
    }

    #[test]
    fn scope_lookup_walks_parents() {
        let mut storage = IdentStorage::new();
        let outer = storage.allocate("x", SourceRange::builtin());
        let inner = storage.allocate("x", SourceRange::builtin());

        let mut scopes = ScopeStack::with_builtins(&storage);
        assert!(scopes.lookup("i4").is_some());
        assert_eq!(scopes.lookup("x"), None);

        scopes.bind("x", outer);
        scopes.push();
        assert_eq!(scopes.lookup("x"), Some(outer));
        assert_eq!(scopes.bound_in_innermost("x"), None);

        scopes.bind("x", inner);
        assert_eq!(scopes.lookup("x"), Some(inner));

        scopes.pop();
        assert_eq!(scopes.lookup("x"), Some(outer));
    }

    #[test]
    fn bind_reports_previous_binding_in_same_scope() {
        let mut storage = IdentStorage::new();
        let first = storage.allocate("a", SourceRange::builtin());
        let second = storage.allocate("a", SourceRange::builtin());

        let mut scopes = ScopeStack::with_builtins(&storage);
        assert_eq!(scopes.bind("a", first), None);
        assert_eq!(scopes.bind("a", second), Some(first));
    }
}
