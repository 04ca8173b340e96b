#![forbid(unsafe_code)]

//! Ordered, observable key-value collection.
//!
//! [`ObservableDictionary`] is an [`ObservableList`] of
//! [`ObservableKeyValuePair`] entries plus a key-to-position index kept
//! eagerly in sync. Lookups by key are constant time, every list-level
//! change event still fires, and ordering is under caller control (`insert`
//! at a position, `move_item`, `sort_by`).
//!
//! # Invariants
//!
//! - `index[key] == i` exactly when `list[i].key() == key`.
//! - Keys are unique; [`add`](ObservableDictionary::add) refuses duplicates
//!   without mutating anything.

use std::cell::RefCell;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use ahash::{HashMap, HashMapExt};

use crate::error::{BindError, Result};
use crate::list::{ItemChange, ListChange, ObservableList};
use crate::notify::Subscription;
use crate::object::{HasObservable, ObservableObject};
use crate::prop;
use crate::value::PropertyValue;

/// One dictionary entry: an immutable key and an observable value slot.
pub struct ObservableKeyValuePair<K, V> {
    core: ObservableObject,
    key: K,
    value: RefCell<V>,
}

impl<K, V: PropertyValue + Clone> ObservableKeyValuePair<K, V> {
    #[must_use]
    pub fn new(key: K, value: V) -> Self {
        let core = ObservableObject::new();
        if let Some(node) = value.as_observable() {
            core.attach(node);
        }
        Self {
            core,
            key,
            value: RefCell::new(value),
        }
    }

    #[must_use]
    pub fn key(&self) -> &K {
        &self.key
    }

    #[must_use]
    pub fn value(&self) -> V {
        self.value.borrow().clone()
    }

    /// Read the value without cloning.
    pub fn with_value<R>(&self, read: impl FnOnce(&V) -> R) -> R {
        read(&self.value.borrow())
    }

    /// Rewrite the value, announcing [`prop::VALUE`]. Returns whether the
    /// slot changed.
    pub fn set_value(&self, value: V) -> bool
    where
        V: PartialEq,
    {
        self.core.set_value(&self.value, value, prop::VALUE)
    }
}

/// Equality is entry identity.
impl<K, V> PartialEq for ObservableKeyValuePair<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.core.same_node(&other.core)
    }
}

impl<K, V> Eq for ObservableKeyValuePair<K, V> {}

impl<K: fmt::Debug, V> fmt::Debug for ObservableKeyValuePair<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableKeyValuePair")
            .field("key", &self.key)
            .field("node", &self.core)
            .finish()
    }
}

impl<K, V> HasObservable for ObservableKeyValuePair<K, V> {
    fn observable(&self) -> &ObservableObject {
        &self.core
    }
}

impl<K, V> PropertyValue for ObservableKeyValuePair<K, V> {
    fn as_observable(&self) -> Option<&ObservableObject> {
        Some(&self.core)
    }
}

type Pair<K, V> = Rc<ObservableKeyValuePair<K, V>>;

struct DictInner<K, V> {
    list: ObservableList<Pair<K, V>>,
    index: RefCell<HashMap<K, usize>>,
}

/// Shared handle to one observable dictionary.
pub struct ObservableDictionary<K, V> {
    inner: Rc<DictInner<K, V>>,
}

impl<K, V> Clone for ObservableDictionary<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<K, V> ObservableDictionary<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + 'static,
    V: PropertyValue + Clone + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(DictInner {
                list: ObservableList::new(),
                index: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// Dictionary pre-populated without announcements, keyed by `key_of`.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::DuplicateKey`] when `key_of` maps two values to
    /// the same key.
    pub fn from_values(
        values: impl IntoIterator<Item = V>,
        key_of: impl Fn(&V) -> K,
    ) -> Result<Self> {
        let mut index = HashMap::new();
        let mut pairs = Vec::new();
        for value in values {
            let key = key_of(&value);
            if index.contains_key(&key) {
                return Err(BindError::duplicate_key(&key));
            }
            index.insert(key.clone(), pairs.len());
            pairs.push(Rc::new(ObservableKeyValuePair::new(key, value)));
        }
        Ok(Self {
            inner: Rc::new(DictInner {
                list: ObservableList::from_items(pairs),
                index: RefCell::new(index),
            }),
        })
    }

    /// Append a new entry.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::DuplicateKey`] when the key is already present;
    /// nothing is mutated.
    pub fn add(&self, key: K, value: V) -> Result<()> {
        if self.contains_key(&key) {
            return Err(BindError::duplicate_key(&key));
        }
        let position = self.inner.list.len();
        self.inner.index.borrow_mut().insert(key.clone(), position);
        self.inner
            .list
            .push(Rc::new(ObservableKeyValuePair::new(key, value)));
        Ok(())
    }

    /// Insert a new entry at `position`, shifting later entries.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::DuplicateKey`] when the key is already present;
    /// nothing is mutated. Positions past the end panic, like `Vec::insert`.
    pub fn insert(&self, position: usize, key: K, value: V) -> Result<()> {
        let len = self.inner.list.len();
        assert!(
            position <= len,
            "position {position} out of bounds for length {len}"
        );
        if self.contains_key(&key) {
            return Err(BindError::duplicate_key(&key));
        }
        {
            let mut index = self.inner.index.borrow_mut();
            for slot in index.values_mut() {
                if *slot >= position {
                    *slot += 1;
                }
            }
            index.insert(key.clone(), position);
        }
        self.inner
            .list
            .insert(position, Rc::new(ObservableKeyValuePair::new(key, value)));
        Ok(())
    }

    /// Rewrite the value for `key` in place, or append a new entry when the
    /// key is absent.
    pub fn add_or_update(&self, key: K, value: V)
    where
        V: PartialEq,
    {
        let existing = self.pair_for(&key);
        match existing {
            Some(pair) => {
                pair.set_value(value);
            }
            None => {
                let position = self.inner.list.len();
                self.inner.index.borrow_mut().insert(key.clone(), position);
                self.inner
                    .list
                    .push(Rc::new(ObservableKeyValuePair::new(key, value)));
            }
        }
    }

    /// Remove the entry for `key`. Returns whether one was present.
    pub fn remove(&self, key: &K) -> bool {
        let Some(position) = self.index_of(key) else {
            return false;
        };
        self.remove_at(position);
        true
    }

    /// Remove and return the entry at `position`.
    ///
    /// # Panics
    ///
    /// Panics when `position >= len`.
    pub fn remove_at(&self, position: usize) -> Pair<K, V> {
        let len = self.len();
        assert!(
            position < len,
            "position {position} out of bounds for length {len}"
        );
        let Some(pair) = self.inner.list.get(position) else {
            unreachable!("length checked above")
        };
        // Index first, so change subscribers observe consistent positions.
        {
            let mut index = self.inner.index.borrow_mut();
            index.remove(pair.key());
            for slot in index.values_mut() {
                if *slot > position {
                    *slot -= 1;
                }
            }
        }
        self.inner.list.remove_at(position);
        pair
    }

    /// Move the entry at `from` to `to`, rewriting positions in between.
    ///
    /// # Panics
    ///
    /// Panics when either position is out of bounds.
    pub fn move_item(&self, from: usize, to: usize) {
        let len = self.len();
        assert!(from < len, "position {from} out of bounds for length {len}");
        assert!(to < len, "position {to} out of bounds for length {len}");
        if from == to {
            return;
        }
        // Index first, so change subscribers observe consistent positions.
        {
            let mut index = self.inner.index.borrow_mut();
            for slot in index.values_mut() {
                if *slot == from {
                    *slot = to;
                } else if from < to && *slot > from && *slot <= to {
                    *slot -= 1;
                } else if to < from && *slot >= to && *slot < from {
                    *slot += 1;
                }
            }
        }
        self.inner.list.move_item(from, to);
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.inner.index.borrow_mut().clear();
        self.inner.list.clear();
    }

    /// Reorder entries. The final positions are computed on a snapshot and
    /// written to the index before the list reorders, so change subscribers
    /// observe consistent positions.
    pub fn sort_by(&self, compare: impl FnMut(&Pair<K, V>, &Pair<K, V>) -> std::cmp::Ordering) {
        let mut snapshot = self.inner.list.to_vec();
        snapshot.sort_by(compare);
        let rank: HashMap<K, usize> = snapshot
            .iter()
            .enumerate()
            .map(|(position, pair)| (pair.key().clone(), position))
            .collect();
        self.inner.index.borrow_mut().clone_from(&rank);
        self.inner
            .list
            .sort_by(move |a, b| rank[a.key()].cmp(&rank[b.key()]));
    }

    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.index.borrow().contains_key(key)
    }

    /// Position of `key`, or `None` when absent.
    #[must_use]
    pub fn index_of(&self, key: &K) -> Option<usize> {
        self.inner.index.borrow().get(key).copied()
    }

    /// Value for `key`, or `None` when absent.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.pair_for(key).map(|pair| pair.value())
    }

    /// Value for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::KeyNotFound`] when absent.
    pub fn value(&self, key: &K) -> Result<V> {
        self.get(key).ok_or_else(|| BindError::key_not_found(key))
    }

    #[must_use]
    pub fn pair_at(&self, position: usize) -> Option<Pair<K, V>> {
        self.inner.list.get(position)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.list.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.list.is_empty()
    }

    /// Keys in positional order.
    #[must_use]
    pub fn keys(&self) -> Vec<K> {
        let mut keys = Vec::with_capacity(self.len());
        self.inner.list.for_each(|pair| keys.push(pair.key().clone()));
        keys
    }

    /// Entries in positional order.
    #[must_use]
    pub fn pairs(&self) -> Vec<Pair<K, V>> {
        self.inner.list.to_vec()
    }

    /// Subscribe to structural changes of the underlying sequence.
    pub fn subscribe_changes(
        &self,
        callback: impl Fn(&ListChange<Pair<K, V>>) + 'static,
    ) -> Subscription {
        self.inner.list.subscribe_changes(callback)
    }

    /// Subscribe to property changes republished from entries, including
    /// [`prop::VALUE`] rewrites.
    pub fn subscribe_item_changes(
        &self,
        callback: impl Fn(&ItemChange<Pair<K, V>>) + 'static,
    ) -> Subscription {
        self.inner.list.subscribe_item_changes(callback)
    }

    fn pair_for(&self, key: &K) -> Option<Pair<K, V>> {
        self.index_of(key).and_then(|position| self.inner.list.get(position))
    }
}

impl<K, V> Default for ObservableDictionary<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + 'static,
    V: PropertyValue + Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K: fmt::Debug, V> fmt::Debug for ObservableDictionary<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableDictionary")
            .field("len", &self.inner.index.borrow().len())
            .finish()
    }
}

impl<K, V> HasObservable for ObservableDictionary<K, V> {
    fn observable(&self) -> &ObservableObject {
        self.inner.list.observable()
    }
}

impl<K, V> PropertyValue for ObservableDictionary<K, V> {
    fn as_observable(&self) -> Option<&ObservableObject> {
        Some(self.inner.list.observable())
    }
}
