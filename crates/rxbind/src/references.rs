#![forbid(unsafe_code)]

//! Declared property dependencies ("references") and their fan-out tables.
//!
//! A view-model type can declare that a computed property must be
//! re-announced whenever one of its source properties changes:
//!
//! ```
//! use rxbind::references;
//!
//! struct Person;
//!
//! let table = references::declare::<Person>(|b| {
//!     b.references("display_text", &["name", "age"]);
//! });
//! assert_eq!(table.dependents("name"), &["display_text"]);
//! ```
//!
//! # Design
//!
//! The registry is a process-wide, append-only cache keyed by `TypeId`.
//! First-population is guarded by a narrow lock; the first declaration for a
//! type wins and later declarations are cheap no-ops, so concurrent first use
//! from multiple threads is race-free and idempotent. Reads after the `Arc`
//! is fetched are lock-free.
//!
//! The transitive closure of every source property's dependents is computed
//! once, at declaration, depth-first with a visited set. Fan-out at
//! notification time is therefore a flat slice walk: each dependent is
//! announced exactly once per source mutation, and declared cycles cannot
//! loop. A cycle is reported with `tracing::warn!` and the repeat visit is
//! dropped.

use std::any::TypeId;
use std::sync::{Arc, Mutex, OnceLock};

use ahash::{HashMap, HashMapExt, HashSet, HashSetExt};

/// Immutable per-type fan-out table: source property name to the transitive,
/// deduplicated list of dependent property names.
#[derive(Debug, Default)]
pub struct ReferenceTable {
    fanout: HashMap<&'static str, Box<[&'static str]>>,
}

impl ReferenceTable {
    /// Dependent properties to re-announce when `property` changes. Empty for
    /// properties with no declared dependents.
    #[must_use]
    pub fn dependents(&self, property: &str) -> &[&'static str] {
        self.fanout.get(property).map_or(&[], |deps| &**deps)
    }

    /// True when no dependencies are declared at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fanout.is_empty()
    }
}

/// Collects `dependent references sources` edges for one type.
#[derive(Debug, Default)]
pub struct ReferencesBuilder {
    // source -> direct dependents, in declaration order
    direct: Vec<(&'static str, &'static str)>,
}

impl ReferencesBuilder {
    /// Declare that `dependent` must be re-announced whenever any of
    /// `sources` changes.
    pub fn references(&mut self, dependent: &'static str, sources: &[&'static str]) -> &mut Self {
        for source in sources {
            self.direct.push((source, dependent));
        }
        self
    }
}

fn registry() -> &'static Mutex<HashMap<TypeId, Arc<ReferenceTable>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<TypeId, Arc<ReferenceTable>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Declare the reference edges for type `T` and return its fan-out table.
///
/// Idempotent: the first declaration for a given type wins; subsequent calls
/// return the cached table without invoking `build`.
pub fn declare<T: 'static>(build: impl FnOnce(&mut ReferencesBuilder)) -> Arc<ReferenceTable> {
    let mut registry = registry()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner());

    if let Some(existing) = registry.get(&TypeId::of::<T>()) {
        return Arc::clone(existing);
    }

    let mut builder = ReferencesBuilder::default();
    build(&mut builder);
    let table = Arc::new(compile::<T>(&builder));
    registry.insert(TypeId::of::<T>(), Arc::clone(&table));
    table
}

/// Fan-out table previously declared for `T`, or a shared empty table.
#[must_use]
pub fn table_for<T: 'static>() -> Arc<ReferenceTable> {
    let registry = registry()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner());
    registry
        .get(&TypeId::of::<T>())
        .map_or_else(empty_table, Arc::clone)
}

/// Shared table with no declared edges.
#[must_use]
pub fn empty_table() -> Arc<ReferenceTable> {
    static EMPTY: OnceLock<Arc<ReferenceTable>> = OnceLock::new();
    Arc::clone(EMPTY.get_or_init(|| Arc::new(ReferenceTable::default())))
}

/// Precompute the transitive closure of every source property's dependents.
fn compile<T>(builder: &ReferencesBuilder) -> ReferenceTable {
    let mut edges: HashMap<&'static str, Vec<&'static str>> = HashMap::new();
    for &(source, dependent) in &builder.direct {
        let dependents = edges.entry(source).or_default();
        if !dependents.contains(&dependent) {
            dependents.push(dependent);
        }
    }

    let mut fanout = HashMap::new();
    for &source in edges.keys() {
        let mut visited = HashSet::new();
        visited.insert(source);
        let mut closure = Vec::new();
        let mut on_stack = HashSet::new();
        on_stack.insert(source);
        walk::<T>(source, &edges, &mut visited, &mut on_stack, &mut closure);
        fanout.insert(source, closure.into_boxed_slice());
    }

    ReferenceTable { fanout }
}

fn walk<T>(
    property: &'static str,
    edges: &HashMap<&'static str, Vec<&'static str>>,
    visited: &mut HashSet<&'static str>,
    on_stack: &mut HashSet<&'static str>,
    closure: &mut Vec<&'static str>,
) {
    let Some(dependents) = edges.get(property) else {
        return;
    };
    for &dependent in dependents {
        if on_stack.contains(dependent) {
            tracing::warn!(
                target_type = std::any::type_name::<T>(),
                property = dependent,
                "declared reference cycle; repeat visit dropped"
            );
            continue;
        }
        if !visited.insert(dependent) {
            // Diamond: already reachable through another edge.
            continue;
        }
        closure.push(dependent);
        on_stack.insert(dependent);
        walk::<T>(dependent, edges, visited, on_stack, closure);
        on_stack.remove(dependent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_fanout() {
        struct Simple;
        let table = declare::<Simple>(|b| {
            b.references("display_text", &["name", "age"]);
        });

        assert_eq!(table.dependents("name"), &["display_text"]);
        assert_eq!(table.dependents("age"), &["display_text"]);
        assert!(table.dependents("display_text").is_empty());
        assert!(table.dependents("unrelated").is_empty());
    }

    #[test]
    fn transitive_closure_is_flattened() {
        struct Chained;
        let table = declare::<Chained>(|b| {
            b.references("summary", &["display_text"]);
            b.references("display_text", &["name"]);
        });

        // A change of `name` announces both levels, depth-first.
        assert_eq!(table.dependents("name"), &["display_text", "summary"]);
        assert_eq!(table.dependents("display_text"), &["summary"]);
    }

    #[test]
    fn diamond_announces_once() {
        struct Diamond;
        let table = declare::<Diamond>(|b| {
            b.references("left", &["root"]);
            b.references("right", &["root"]);
            b.references("bottom", &["left", "right"]);
        });

        let deps = table.dependents("root");
        assert_eq!(deps.iter().filter(|d| **d == "bottom").count(), 1);
        assert_eq!(deps.len(), 3);
    }

    #[test]
    fn cycle_terminates() {
        struct Cyclic;
        let table = declare::<Cyclic>(|b| {
            b.references("a", &["b"]);
            b.references("b", &["a"]);
        });

        assert_eq!(table.dependents("a"), &["b"]);
        assert_eq!(table.dependents("b"), &["a"]);
    }

    #[test]
    fn first_declaration_wins() {
        struct Redeclared;
        let first = declare::<Redeclared>(|b| {
            b.references("x", &["a"]);
        });
        let second = declare::<Redeclared>(|b| {
            b.references("y", &["a"]);
        });

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.dependents("a"), &["x"]);
    }

    #[test]
    fn undeclared_type_gets_empty_table() {
        struct Undeclared;
        let table = table_for::<Undeclared>();
        assert!(table.is_empty());
    }
}
