#![forbid(unsafe_code)]

//! Observable sequence with per-operation change events and item tracking.
//!
//! [`ObservableList`] wraps a `Vec` and announces every structural mutation
//! as a [`ListChange`]. Items whose type exposes a reactive node are attached
//! to the list's own node, so a dirty item dirties the list and the item's
//! property changes are republished through
//! [`subscribe_item_changes`](ObservableList::subscribe_item_changes).
//!
//! # Design
//!
//! Mutations take a short `RefCell` borrow, release it, then publish; change
//! subscribers can therefore read the list synchronously. Bulk operations
//! (`extend`, `reset`, `sort_by`, `clear`) publish a single
//! [`ListChange::Reset`] instead of per-element events.
//!
//! The pseudo-properties [`prop::LEN`], [`prop::FIRST`], [`prop::LAST`] and
//! [`prop::ITEMS`] are announced on the list's node after each mutation that
//! can affect them, so bindings can target them directly.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::notify::{Publisher, Subscription};
use crate::object::{HasObservable, ObservableObject};
use crate::prop;
use crate::value::PropertyValue;

/// Structural change to an [`ObservableList`].
#[derive(Debug, Clone, PartialEq)]
pub enum ListChange<T> {
    Insert { index: usize, item: T },
    Remove { index: usize, item: T },
    Replace { index: usize, old: T, new: T },
    Move { from: usize, to: usize, item: T },
    /// The sequence changed wholesale; re-read it.
    Reset,
}

/// Property change republished from a reactive item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemChange<T> {
    pub item: T,
    pub property: &'static str,
}

struct ListInner<T> {
    core: ObservableObject,
    items: RefCell<Vec<T>>,
    changes: Publisher<ListChange<T>>,
    item_changes: Publisher<ItemChange<T>>,
    item_listeners: RefCell<Vec<(usize, Subscription)>>,
}

/// Shared handle to one observable sequence.
pub struct ObservableList<T> {
    inner: Rc<ListInner<T>>,
}

impl<T> Clone for ObservableList<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// Equality is list identity, not element comparison.
impl<T> PartialEq for ObservableList<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Eq for ObservableList<T> {}

impl<T: PropertyValue + Clone + 'static> ObservableList<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ListInner {
                core: ObservableObject::new(),
                items: RefCell::new(Vec::new()),
                changes: Publisher::new("list changed"),
                item_changes: Publisher::new("list item changed"),
                item_listeners: RefCell::new(Vec::new()),
            }),
        }
    }

    /// List pre-populated without announcements or dirtying.
    pub fn from_items(items: impl IntoIterator<Item = T>) -> Self {
        let list = Self::new();
        {
            let mut slot = list.inner.items.borrow_mut();
            slot.extend(items);
        }
        for item in list.inner.items.borrow().iter() {
            list.attach_item(item);
        }
        list
    }

    /// Subscribe to structural changes.
    pub fn subscribe_changes(&self, callback: impl Fn(&ListChange<T>) + 'static) -> Subscription {
        self.inner.changes.subscribe(callback)
    }

    /// Subscribe to property changes republished from reactive items.
    pub fn subscribe_item_changes(
        &self,
        callback: impl Fn(&ItemChange<T>) + 'static,
    ) -> Subscription {
        self.inner.item_changes.subscribe(callback)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.items.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.items.borrow().is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<T> {
        self.inner.items.borrow().get(index).cloned()
    }

    #[must_use]
    pub fn first(&self) -> Option<T> {
        self.inner.items.borrow().first().cloned()
    }

    #[must_use]
    pub fn last(&self) -> Option<T> {
        self.inner.items.borrow().last().cloned()
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.inner.items.borrow().clone()
    }

    /// Visit each item in order. The callback must not mutate the list.
    pub fn for_each(&self, mut visit: impl FnMut(&T)) {
        for item in self.inner.items.borrow().iter() {
            visit(item);
        }
    }

    /// Append to the end.
    pub fn push(&self, item: T) {
        let index = {
            let mut items = self.inner.items.borrow_mut();
            items.push(item.clone());
            items.len() - 1
        };
        self.attach_item(&item);
        self.inner.changes.publish(&ListChange::Insert { index, item });
        if index == 0 {
            self.inner.core.raise_property_changed(prop::FIRST);
        }
        self.inner.core.raise_property_changed(prop::LAST);
        self.after_mutation();
    }

    /// Insert at `index`.
    ///
    /// # Panics
    ///
    /// Panics when `index > len`.
    pub fn insert(&self, index: usize, item: T) {
        let len = {
            let mut items = self.inner.items.borrow_mut();
            items.insert(index, item.clone());
            items.len()
        };
        self.attach_item(&item);
        self.inner.changes.publish(&ListChange::Insert { index, item });
        if index == 0 {
            self.inner.core.raise_property_changed(prop::FIRST);
        }
        if index == len - 1 {
            self.inner.core.raise_property_changed(prop::LAST);
        }
        self.after_mutation();
    }

    /// Remove and return the item at `index`.
    ///
    /// # Panics
    ///
    /// Panics when `index >= len`.
    pub fn remove_at(&self, index: usize) -> T {
        let (item, len) = {
            let mut items = self.inner.items.borrow_mut();
            let item = items.remove(index);
            (item, items.len())
        };
        self.detach_item(&item);
        self.inner.changes.publish(&ListChange::Remove {
            index,
            item: item.clone(),
        });
        if index == 0 {
            self.inner.core.raise_property_changed(prop::FIRST);
        }
        if index >= len {
            self.inner.core.raise_property_changed(prop::LAST);
        }
        self.after_mutation();
        item
    }

    /// Replace the item at `index`, returning the previous item. Equal
    /// replacements are a no-op.
    ///
    /// # Panics
    ///
    /// Panics when `index >= len`.
    pub fn replace(&self, index: usize, item: T) -> T
    where
        T: PartialEq,
    {
        let (old, len) = {
            let items = self.inner.items.borrow();
            (items[index].clone(), items.len())
        };
        if old == item {
            return old;
        }
        self.inner.items.borrow_mut()[index] = item.clone();
        self.detach_item(&old);
        self.attach_item(&item);
        self.inner.changes.publish(&ListChange::Replace {
            index,
            old: old.clone(),
            new: item,
        });
        if index == 0 {
            self.inner.core.raise_property_changed(prop::FIRST);
        }
        if index == len - 1 {
            self.inner.core.raise_property_changed(prop::LAST);
        }
        self.inner.core.raise_property_changed(prop::ITEMS);
        self.inner.core.mark_changed();
        old
    }

    /// Move the item at `from` to position `to`. Equal positions are a
    /// no-op.
    ///
    /// # Panics
    ///
    /// Panics when either position is out of bounds.
    pub fn move_item(&self, from: usize, to: usize) {
        if from == to {
            let len = self.len();
            assert!(from < len, "position {from} out of bounds for length {len}");
            return;
        }
        let (item, last) = {
            let mut items = self.inner.items.borrow_mut();
            let item = items.remove(from);
            items.insert(to, item.clone());
            (item, items.len() - 1)
        };
        self.inner.changes.publish(&ListChange::Move { from, to, item });
        if from == 0 || to == 0 {
            self.inner.core.raise_property_changed(prop::FIRST);
        }
        if from == last || to == last {
            self.inner.core.raise_property_changed(prop::LAST);
        }
        self.inner.core.raise_property_changed(prop::ITEMS);
        self.inner.core.mark_changed();
    }

    /// Remove the first item equal to `item`. Returns whether one was found.
    pub fn remove(&self, item: &T) -> bool
    where
        T: PartialEq,
    {
        let index = self.inner.items.borrow().iter().position(|x| x == item);
        match index {
            Some(index) => {
                self.remove_at(index);
                true
            }
            None => false,
        }
    }

    /// Remove every item matching `predicate`, scanning from the back so
    /// announced indices stay valid as items disappear. Returns the count
    /// removed. The predicate must not mutate the list.
    pub fn remove_all(&self, predicate: impl Fn(&T) -> bool) -> usize {
        let mut removed = 0;
        for index in (0..self.len()).rev() {
            let matched = {
                let items = self.inner.items.borrow();
                predicate(&items[index])
            };
            if matched {
                self.remove_at(index);
                removed += 1;
            }
        }
        removed
    }

    /// Remove everything, announcing a single [`ListChange::Reset`]. Empty
    /// lists are a no-op.
    pub fn clear(&self) {
        if self.is_empty() {
            return;
        }
        let old = self.inner.items.replace(Vec::new());
        for item in &old {
            self.detach_item(item);
        }
        self.inner.changes.publish(&ListChange::Reset);
        self.inner.core.raise_property_changed(prop::FIRST);
        self.inner.core.raise_property_changed(prop::LAST);
        self.after_mutation();
    }

    /// Replace the whole sequence, announcing a single
    /// [`ListChange::Reset`].
    pub fn reset(&self, items: impl IntoIterator<Item = T>) {
        let next: Vec<T> = items.into_iter().collect();
        let old = self.inner.items.replace(next);
        for item in &old {
            self.detach_item(item);
        }
        for item in self.inner.items.borrow().iter() {
            self.attach_item(item);
        }
        self.inner.changes.publish(&ListChange::Reset);
        self.inner.core.raise_property_changed(prop::FIRST);
        self.inner.core.raise_property_changed(prop::LAST);
        self.after_mutation();
    }

    /// Append many items with a single [`ListChange::Reset`]. Empty input is
    /// a no-op.
    pub fn extend(&self, items: impl IntoIterator<Item = T>) {
        let start = {
            let mut slot = self.inner.items.borrow_mut();
            let start = slot.len();
            slot.extend(items);
            start
        };
        let appended: Vec<T> = self.inner.items.borrow()[start..].to_vec();
        if appended.is_empty() {
            return;
        }
        for item in &appended {
            self.attach_item(item);
        }
        self.inner.changes.publish(&ListChange::Reset);
        if start == 0 {
            self.inner.core.raise_property_changed(prop::FIRST);
        }
        self.inner.core.raise_property_changed(prop::LAST);
        self.after_mutation();
    }

    /// Sort in place, announcing a single [`ListChange::Reset`]. The
    /// comparator must not reenter the list.
    pub fn sort_by(&self, compare: impl FnMut(&T, &T) -> std::cmp::Ordering) {
        self.inner.items.borrow_mut().sort_by(compare);
        self.inner.changes.publish(&ListChange::Reset);
        self.inner.core.raise_property_changed(prop::FIRST);
        self.inner.core.raise_property_changed(prop::LAST);
        self.inner.core.raise_property_changed(prop::ITEMS);
        self.inner.core.mark_changed();
    }

    #[must_use]
    pub fn index_of(&self, item: &T) -> Option<usize>
    where
        T: PartialEq,
    {
        self.inner.items.borrow().iter().position(|x| x == item)
    }

    #[must_use]
    pub fn contains(&self, item: &T) -> bool
    where
        T: PartialEq,
    {
        self.inner.items.borrow().contains(item)
    }

    fn after_mutation(&self) {
        self.inner.core.raise_property_changed(prop::LEN);
        self.inner.core.raise_property_changed(prop::ITEMS);
        self.inner.core.mark_changed();
    }

    fn attach_item(&self, item: &T) {
        let Some(node) = item.as_observable() else {
            return;
        };
        self.inner.core.attach(node);
        let republish = self.inner.item_changes.clone();
        let origin = item.clone();
        let listener = node.subscribe(move |change| {
            republish.publish(&ItemChange {
                item: origin.clone(),
                property: change.property,
            });
        });
        self.inner
            .item_listeners
            .borrow_mut()
            .push((node.node_id(), listener));
    }

    fn detach_item(&self, item: &T) {
        let Some(node) = item.as_observable() else {
            return;
        };
        self.inner.core.detach(node);
        let mut listeners = self.inner.item_listeners.borrow_mut();
        if let Some(position) = listeners.iter().position(|(id, _)| *id == node.node_id()) {
            listeners.remove(position);
        }
    }
}

impl<T: PropertyValue + Clone + 'static> Default for ObservableList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ObservableList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableList")
            .field("len", &self.inner.items.borrow().len())
            .field("node", &self.inner.core)
            .finish()
    }
}

impl<T> HasObservable for ObservableList<T> {
    fn observable(&self) -> &ObservableObject {
        &self.inner.core
    }
}

impl<T> PropertyValue for ObservableList<T> {
    fn as_observable(&self) -> Option<&ObservableObject> {
        Some(&self.inner.core)
    }
}
