#![forbid(unsafe_code)]

//! Observable unordered collection of unique values.
//!
//! [`ObservableSet`] wraps a hash set and announces every effective mutation
//! as a [`SetChange`]. Operations that would not change membership (inserting
//! a present value, removing an absent one, clearing an empty set) publish
//! nothing and do not dirty the set.
//!
//! # Design
//!
//! Mutations take a short `RefCell` borrow, release it, then publish; change
//! subscribers can therefore read the set synchronously. The set-algebra
//! operations (`union_with`, `except_with`, `intersect_with`,
//! `symmetric_difference_with`) announce one event per membership change, so
//! subscribers never have to diff snapshots.
//!
//! Elements are plain values. Unlike [`ObservableList`](crate::ObservableList)
//! there is no per-element attachment: a hash set cannot tolerate elements
//! mutating under it.

use std::cell::RefCell;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use ahash::{HashSet, HashSetExt};

use crate::notify::{Publisher, Subscription};
use crate::object::{HasObservable, ObservableObject};
use crate::prop;
use crate::value::PropertyValue;

/// Membership change in an [`ObservableSet`].
#[derive(Debug, Clone, PartialEq)]
pub enum SetChange<T> {
    Insert { item: T },
    Remove { item: T },
    /// The membership changed wholesale; re-read it.
    Reset,
}

struct SetInner<T> {
    core: ObservableObject,
    items: RefCell<HashSet<T>>,
    changes: Publisher<SetChange<T>>,
}

/// Shared handle to one observable set.
pub struct ObservableSet<T> {
    inner: Rc<SetInner<T>>,
}

impl<T> Clone for ObservableSet<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// Equality is set identity, not element comparison.
impl<T> PartialEq for ObservableSet<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Eq for ObservableSet<T> {}

impl<T: Eq + Hash + Clone + 'static> ObservableSet<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(SetInner {
                core: ObservableObject::new(),
                items: RefCell::new(HashSet::new()),
                changes: Publisher::new("set changed"),
            }),
        }
    }

    /// Set pre-populated without announcements or dirtying.
    pub fn from_items(items: impl IntoIterator<Item = T>) -> Self {
        let set = Self::new();
        set.inner.items.borrow_mut().extend(items);
        set
    }

    /// Subscribe to membership changes.
    pub fn subscribe_changes(&self, callback: impl Fn(&SetChange<T>) + 'static) -> Subscription {
        self.inner.changes.subscribe(callback)
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
    pub fn contains(&self, item: &T) -> bool {
        self.inner.items.borrow().contains(item)
    }

    /// Members in arbitrary order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.inner.items.borrow().iter().cloned().collect()
    }

    /// Visit each member in arbitrary order. The callback must not mutate
    /// the set.
    pub fn for_each(&self, mut visit: impl FnMut(&T)) {
        for item in self.inner.items.borrow().iter() {
            visit(item);
        }
    }

    /// Add `item`. Returns whether it was newly inserted; inserting a
    /// present value announces nothing.
    pub fn insert(&self, item: T) -> bool {
        let inserted = self.inner.items.borrow_mut().insert(item.clone());
        if inserted {
            self.inner.changes.publish(&SetChange::Insert { item });
            self.after_mutation();
        }
        inserted
    }

    /// Remove `item`. Returns whether it was present; removing an absent
    /// value announces nothing.
    pub fn remove(&self, item: &T) -> bool {
        let taken = self.inner.items.borrow_mut().take(item);
        match taken {
            Some(item) => {
                self.inner.changes.publish(&SetChange::Remove { item });
                self.after_mutation();
                true
            }
            None => false,
        }
    }

    /// Remove everything, announcing a single [`SetChange::Reset`]. Empty
    /// sets are a no-op.
    pub fn clear(&self) {
        if self.is_empty() {
            return;
        }
        self.inner.items.borrow_mut().clear();
        self.inner.changes.publish(&SetChange::Reset);
        self.after_mutation();
    }

    /// Add every item from `other`, announcing one insert per value that was
    /// actually absent.
    pub fn union_with(&self, other: impl IntoIterator<Item = T>) {
        for item in other {
            self.insert(item);
        }
    }

    /// Remove every item found in `other`, announcing one remove per value
    /// that was actually present.
    pub fn except_with(&self, other: impl IntoIterator<Item = T>) {
        if self.is_empty() {
            return;
        }
        for item in other {
            self.remove(&item);
        }
    }

    /// Keep only items also found in `other`, announcing one remove per
    /// value dropped.
    pub fn intersect_with(&self, other: impl IntoIterator<Item = T>) {
        let keep: HashSet<T> = other.into_iter().collect();
        let dropped: Vec<T> = self
            .inner
            .items
            .borrow()
            .iter()
            .filter(|item| !keep.contains(item))
            .cloned()
            .collect();
        for item in &dropped {
            self.remove(item);
        }
    }

    /// Toggle membership of every item in `other`: present values are
    /// removed, absent ones inserted, each announced individually.
    pub fn symmetric_difference_with(&self, other: impl IntoIterator<Item = T>) {
        let incoming: HashSet<T> = other.into_iter().collect();
        for item in incoming {
            if !self.remove(&item) {
                self.insert(item);
            }
        }
    }

    #[must_use]
    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.inner.items.borrow().is_subset(&other.inner.items.borrow())
    }

    #[must_use]
    pub fn is_superset_of(&self, other: &Self) -> bool {
        self.inner.items.borrow().is_superset(&other.inner.items.borrow())
    }

    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        !self.inner.items.borrow().is_disjoint(&other.inner.items.borrow())
    }

    #[must_use]
    pub fn set_equals(&self, other: &Self) -> bool {
        *self.inner.items.borrow() == *other.inner.items.borrow()
    }

    fn after_mutation(&self) {
        self.inner.core.raise_property_changed(prop::LEN);
        self.inner.core.raise_property_changed(prop::ITEMS);
        self.inner.core.mark_changed();
    }
}

impl<T: Eq + Hash + Clone + 'static> Default for ObservableSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ObservableSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableSet")
            .field("len", &self.inner.items.borrow().len())
            .field("node", &self.inner.core)
            .finish()
    }
}

impl<T> HasObservable for ObservableSet<T> {
    fn observable(&self) -> &ObservableObject {
        &self.inner.core
    }
}

impl<T> PropertyValue for ObservableSet<T> {
    fn as_observable(&self) -> Option<&ObservableObject> {
        Some(&self.inner.core)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ChangeTracking;

    fn record_changes<T: Eq + Hash + Clone + 'static>(
        set: &ObservableSet<T>,
    ) -> (Rc<RefCell<Vec<SetChange<T>>>>, Subscription) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let sub = set.subscribe_changes(move |change| {
            sink.borrow_mut().push(change.clone());
        });
        (log, sub)
    }

    #[test]
    fn insert_dedups_and_announces_once() {
        let set = ObservableSet::new();
        let (log, _sub) = record_changes(&set);

        assert!(set.insert(7));
        assert!(!set.insert(7));

        assert_eq!(set.len(), 1);
        assert_eq!(*log.borrow(), vec![SetChange::Insert { item: 7 }]);
        assert!(set.observable().is_changed());
    }

    #[test]
    fn remove_missing_is_silent() {
        let set = ObservableSet::from_items([1, 2]);
        let (log, _sub) = record_changes(&set);

        assert!(set.remove(&1));
        assert!(!set.remove(&9));

        assert_eq!(*log.borrow(), vec![SetChange::Remove { item: 1 }]);
    }

    #[test]
    fn clear_resets_once_and_skips_empty() {
        let set = ObservableSet::from_items(["a", "b"]);
        let (log, _sub) = record_changes(&set);

        set.clear();
        set.clear();

        assert!(set.is_empty());
        assert_eq!(*log.borrow(), vec![SetChange::Reset]);
    }

    #[test]
    fn union_announces_only_new_members() {
        let set = ObservableSet::from_items([1, 2]);
        let (log, _sub) = record_changes(&set);

        set.union_with([2, 3]);

        assert_eq!(set.len(), 3);
        assert_eq!(*log.borrow(), vec![SetChange::Insert { item: 3 }]);
    }

    #[test]
    fn except_announces_only_dropped_members() {
        let set = ObservableSet::from_items([1, 2, 3]);
        let (log, _sub) = record_changes(&set);

        set.except_with([2, 9]);

        assert_eq!(set.len(), 2);
        assert_eq!(*log.borrow(), vec![SetChange::Remove { item: 2 }]);
    }

    #[test]
    fn intersect_keeps_common_members() {
        let set = ObservableSet::from_items([1, 2, 3]);
        let (log, _sub) = record_changes(&set);

        set.intersect_with([2, 3, 9]);

        let mut members = set.to_vec();
        members.sort_unstable();
        assert_eq!(members, vec![2, 3]);
        assert_eq!(*log.borrow(), vec![SetChange::Remove { item: 1 }]);
    }

    #[test]
    fn symmetric_difference_toggles_membership() {
        let set = ObservableSet::from_items([1, 2]);
        let (log, _sub) = record_changes(&set);

        set.symmetric_difference_with([2, 3]);

        let mut members = set.to_vec();
        members.sort_unstable();
        assert_eq!(members, vec![1, 3]);
        assert_eq!(log.borrow().len(), 2);
        assert!(log.borrow().contains(&SetChange::Remove { item: 2 }));
        assert!(log.borrow().contains(&SetChange::Insert { item: 3 }));
    }

    #[test]
    fn membership_predicates() {
        let small = ObservableSet::from_items([1, 2]);
        let big = ObservableSet::from_items([1, 2, 3]);
        let other = ObservableSet::from_items([9]);

        assert!(small.is_subset_of(&big));
        assert!(big.is_superset_of(&small));
        assert!(small.overlaps(&big));
        assert!(!small.overlaps(&other));
        assert!(small.set_equals(&ObservableSet::from_items([2, 1])));
        assert!(!small.set_equals(&big));
    }

    #[test]
    fn from_items_is_silent_and_clean() {
        let set = ObservableSet::from_items([1, 2, 2, 3]);

        assert_eq!(set.len(), 3);
        assert!(!set.observable().is_changed());
    }

    #[test]
    fn len_property_announced_after_mutation() {
        let set = ObservableSet::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = set.observable().subscribe(move |change| {
            sink.borrow_mut().push(change.property);
        });

        set.insert("x");

        assert!(seen.borrow().contains(&prop::LEN));
        assert!(seen.borrow().contains(&prop::ITEMS));
    }
}
