#![forbid(unsafe_code)]

//! Observable node core: change tracking, init scopes, and child cascade.
//!
//! An [`ObservableObject`] is the reactive heart of a view-model. View-model
//! structs embed one and route property writes through
//! [`set_value`](ObservableObject::set_value), which announces the change,
//! swaps the slot, re-parents reactive children, fans out to declared
//! dependent properties, and marks the node dirty.
//!
//! # Design
//!
//! The handle is a cheap `Rc` clone; all clones address the same node.
//! Parent-to-child edges hold the child weakly, paired with the listener
//! subscription that aggregates the child's dirty flag upward; the owning
//! property slot or collection keeps the child alive, never the edge. Edges
//! whose child has been dropped are pruned on the next cascade. The listener
//! itself also captures only `Weak` back-references, so parent and child
//! never form an `Rc` cycle through the notification graph.
//!
//! # Invariants
//!
//! - No `RefCell` borrow of a property slot is held while subscribers run;
//!   callbacks may read any property of the node synchronously.
//! - Mutations inside an init scope never set the dirty flag and never fan
//!   out, on the node or any attached descendant.
//! - Detaching a child while a scope is open rebalances the child's own
//!   scope depth, so `end_init` stays paired on both sides.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::error::{BindError, Result};
use crate::notify::{Publisher, PropertyChange, Subscription};
use crate::prop;
use crate::references::{self, ReferenceTable};
use crate::value::PropertyValue;

struct NodeState {
    is_changed: Cell<bool>,
    init_depth: Cell<u32>,
    notifier: Publisher<PropertyChange>,
    changing: Publisher<PropertyChange>,
    children: RefCell<Vec<ChildEntry>>,
    references: Arc<ReferenceTable>,
}

struct ChildEntry {
    child: Weak<NodeState>,
    _listener: Subscription,
}

/// Shared handle to one reactive node.
#[derive(Clone)]
pub struct ObservableObject {
    state: Rc<NodeState>,
}

impl ObservableObject {
    /// Node with no declared property dependencies.
    #[must_use]
    pub fn new() -> Self {
        Self::with_references(references::empty_table())
    }

    /// Node using the fan-out table declared for `T` via
    /// [`references::declare`]. Undeclared types get an empty table.
    #[must_use]
    pub fn for_type<T: 'static>() -> Self {
        Self::with_references(references::table_for::<T>())
    }

    fn with_references(table: Arc<ReferenceTable>) -> Self {
        Self {
            state: Rc::new(NodeState {
                is_changed: Cell::new(false),
                init_depth: Cell::new(0),
                notifier: Publisher::new("property changed"),
                changing: Publisher::new("property changing"),
                children: RefCell::new(Vec::new()),
                references: table,
            }),
        }
    }

    fn from_state(state: Rc<NodeState>) -> Self {
        Self { state }
    }

    /// Stable identity for this node, usable as a map key.
    #[must_use]
    pub fn node_id(&self) -> usize {
        Rc::as_ptr(&self.state) as usize
    }

    /// True when both handles address the same node.
    #[must_use]
    pub fn same_node(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    /// Subscribe to property-changed announcements.
    pub fn subscribe(&self, callback: impl Fn(&PropertyChange) + 'static) -> Subscription {
        self.state.notifier.subscribe(callback)
    }

    /// Subscribe to property-changing announcements, delivered before the
    /// slot is rewritten.
    pub fn subscribe_changing(&self, callback: impl Fn(&PropertyChange) + 'static) -> Subscription {
        self.state.changing.subscribe(callback)
    }

    /// True when this node or any attached descendant has unaccepted
    /// mutations.
    #[must_use]
    pub fn is_changed(&self) -> bool {
        self.state.is_changed.get()
    }

    /// Set the dirty flag, unless an init scope is open. Announced as a
    /// change of [`prop::IS_CHANGED`] when the flag actually flips.
    pub fn mark_changed(&self) {
        if self.state.init_depth.get() == 0 {
            self.set_changed(true);
        }
    }

    fn set_changed(&self, changed: bool) {
        if self.state.is_changed.get() == changed {
            return;
        }
        self.state.is_changed.set(changed);
        self.raise_property_changed(prop::IS_CHANGED);
    }

    /// Clear the dirty flag here and on every attached descendant.
    /// Idempotent: a clean node announces nothing.
    pub fn accept_changes(&self) {
        if !self.state.is_changed.get() {
            return;
        }
        self.set_changed(false);
        for child in self.children_snapshot() {
            child.accept_changes();
        }
    }

    /// True while at least one init scope is open.
    #[must_use]
    pub fn is_initializing(&self) -> bool {
        self.state.init_depth.get() > 0
    }

    /// Open an init scope. While open, mutations do not dirty the node and
    /// declared fan-out still announces the written property itself but the
    /// node stays clean. Scopes nest; only the outermost transition is
    /// announced and cascaded into attached children.
    pub fn begin_init(&self) {
        let depth = self.state.init_depth.get();
        self.state.init_depth.set(depth + 1);
        if depth == 0 {
            tracing::trace!(node = self.node_id(), "init scope opened");
            self.raise_property_changed(prop::IS_INITIALIZING);
            for child in self.children_snapshot() {
                child.begin_init();
            }
        }
    }

    /// Close one init scope.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::UnbalancedInit`] when no scope is open.
    pub fn end_init(&self) -> Result<()> {
        let depth = self.state.init_depth.get();
        if depth == 0 {
            return Err(BindError::UnbalancedInit);
        }
        self.state.init_depth.set(depth - 1);
        if depth == 1 {
            tracing::trace!(node = self.node_id(), "init scope closed");
            for child in self.children_snapshot() {
                if let Err(err) = child.end_init() {
                    tracing::warn!(
                        node = child.node_id(),
                        %err,
                        "child init scope already closed"
                    );
                }
            }
            self.raise_property_changed(prop::IS_INITIALIZING);
        }
        Ok(())
    }

    /// RAII init scope: opens now, closes on drop.
    #[must_use]
    pub fn init_scope(&self) -> InitGuard {
        self.begin_init();
        InitGuard { node: self.clone() }
    }

    /// Attach `child` so its dirty flag aggregates into this node and init
    /// scopes cascade into it. The edge does not keep the child alive; the
    /// property slot or collection that holds the child does. Attaching a
    /// node to itself is ignored. If an init scope is currently open the
    /// child enters it immediately.
    pub fn attach(&self, child: &ObservableObject) {
        if self.same_node(child) {
            tracing::warn!(node = self.node_id(), "self-attach ignored");
            return;
        }
        let parent_weak = Rc::downgrade(&self.state);
        let child_weak = Rc::downgrade(&child.state);
        let listener = child.subscribe(move |change| {
            if change.property != prop::IS_CHANGED {
                return;
            }
            let (Some(parent), Some(child)) = (parent_weak.upgrade(), child_weak.upgrade()) else {
                return;
            };
            if !child.is_changed.get() {
                return;
            }
            if parent.init_depth.get() > 0 {
                return;
            }
            ObservableObject::from_state(parent).set_changed(true);
        });
        if self.is_initializing() {
            child.begin_init();
        }
        self.state.children.borrow_mut().push(ChildEntry {
            child: Rc::downgrade(&child.state),
            _listener: listener,
        });
        tracing::trace!(node = self.node_id(), child = child.node_id(), "child attached");
    }

    /// Detach one previously attached occurrence of `child`. If an init
    /// scope is open the child leaves it, keeping both depths balanced.
    pub fn detach(&self, child: &ObservableObject) {
        let removed = {
            let mut children = self.state.children.borrow_mut();
            children
                .iter()
                .position(|entry| entry.child.as_ptr() == Rc::as_ptr(&child.state))
                .map(|index| children.remove(index))
        };
        if removed.is_some() {
            tracing::trace!(node = self.node_id(), child = child.node_id(), "child detached");
            if self.is_initializing() {
                if let Err(err) = child.end_init() {
                    tracing::warn!(node = child.node_id(), %err, "detached child had no open scope");
                }
            }
        }
    }

    /// Write `value` into `slot` if it differs from the current value.
    ///
    /// The full sequence for an actual change: announce changing, rewrite the
    /// slot, detach the old value's node and attach the new one, announce
    /// changed with declared fan-out, and mark this node dirty. Returns
    /// whether the slot was rewritten.
    pub fn set_value<T>(&self, slot: &RefCell<T>, value: T, property: &'static str) -> bool
    where
        T: PropertyValue + PartialEq,
    {
        if *slot.borrow() == value {
            return false;
        }
        self.raise_property_changing(property);
        let old = slot.replace(value);
        if let Some(node) = old.as_observable() {
            self.detach(node);
        }
        let attached = slot.borrow().as_observable().cloned();
        if let Some(node) = attached {
            self.attach(&node);
        }
        self.raise_property_changed(property);
        self.mark_changed();
        true
    }

    /// Write `slot` without announcements or dirtying, re-parenting reactive
    /// values as [`set_value`](Self::set_value) does. Intended for
    /// constructors and deserialization.
    pub fn init_value<T: PropertyValue>(&self, slot: &RefCell<T>, value: T) {
        let old = slot.replace(value);
        if let Some(node) = old.as_observable() {
            self.detach(node);
        }
        let attached = slot.borrow().as_observable().cloned();
        if let Some(node) = attached {
            self.attach(&node);
        }
    }

    /// Announce that `property` changed, then each declared dependent, each
    /// exactly once.
    pub fn raise_property_changed(&self, property: &'static str) {
        self.state.notifier.publish(&PropertyChange::new(property));
        for &dependent in self.state.references.dependents(property) {
            self.state.notifier.publish(&PropertyChange::new(dependent));
        }
    }

    /// Announce that `property` is about to change, with the same fan-out as
    /// [`raise_property_changed`](Self::raise_property_changed).
    pub fn raise_property_changing(&self, property: &'static str) {
        self.state.changing.publish(&PropertyChange::new(property));
        for &dependent in self.state.references.dependents(property) {
            self.state.changing.publish(&PropertyChange::new(dependent));
        }
    }

    /// Live children, pruning edges whose child has been dropped.
    fn children_snapshot(&self) -> Vec<ObservableObject> {
        let mut snapshot = Vec::new();
        self.state
            .children
            .borrow_mut()
            .retain(|entry| match entry.child.upgrade() {
                Some(state) => {
                    snapshot.push(ObservableObject::from_state(state));
                    true
                }
                None => false,
            });
        snapshot
    }
}

/// Equality is node identity, matching [`same_node`](Self::same_node).
impl PartialEq for ObservableObject {
    fn eq(&self, other: &Self) -> bool {
        self.same_node(other)
    }
}

impl Eq for ObservableObject {}

impl Default for ObservableObject {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ObservableObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableObject")
            .field("node_id", &self.node_id())
            .field("is_changed", &self.state.is_changed.get())
            .field("init_depth", &self.state.init_depth.get())
            .field("children", &self.state.children.borrow().len())
            .finish()
    }
}

impl PropertyValue for ObservableObject {
    fn as_observable(&self) -> Option<&ObservableObject> {
        Some(self)
    }
}

/// Access to the reactive node embedded in a view-model type.
pub trait HasObservable {
    fn observable(&self) -> &ObservableObject;
}

impl HasObservable for ObservableObject {
    fn observable(&self) -> &ObservableObject {
        self
    }
}

/// Dirty-flag tracking, implemented for everything with a node.
pub trait ChangeTracking {
    fn is_changed(&self) -> bool;
    fn accept_changes(&self);
}

impl<T: HasObservable + ?Sized> ChangeTracking for T {
    fn is_changed(&self) -> bool {
        self.observable().is_changed()
    }

    fn accept_changes(&self) {
        self.observable().accept_changes();
    }
}

/// Init-scope control, implemented for everything with a node.
pub trait InitScope {
    fn begin_init(&self);
    fn end_init(&self) -> Result<()>;
    fn is_initializing(&self) -> bool;
}

impl<T: HasObservable + ?Sized> InitScope for T {
    fn begin_init(&self) {
        self.observable().begin_init();
    }

    fn end_init(&self) -> Result<()> {
        self.observable().end_init()
    }

    fn is_initializing(&self) -> bool {
        self.observable().is_initializing()
    }
}

/// Closes the init scope opened by [`ObservableObject::init_scope`] on drop.
#[must_use = "dropping the guard closes the scope immediately"]
pub struct InitGuard {
    node: ObservableObject,
}

impl Drop for InitGuard {
    fn drop(&mut self) {
        if let Err(err) = self.node.end_init() {
            tracing::warn!(node = self.node.node_id(), %err, "init guard found scope closed");
        }
    }
}

impl fmt::Debug for InitGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitGuard")
            .field("node", &self.node)
            .finish()
    }
}
