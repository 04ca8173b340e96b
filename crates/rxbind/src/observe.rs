#![forbid(unsafe_code)]

//! Expression-style observation of property paths.
//!
//! An [`Observed`] value watches a set of property paths rooted at a
//! [`ReactiveSource`] and recomputes a derived value whenever a watched
//! property changes. Paths can descend through reactive children
//! (`["child", "name"]`); when an intermediate property is reassigned the
//! subtree re-resolves against the new source and stale listeners are
//! dropped.
//!
//! # Design
//!
//! The paths compile into a binding tree with one node per distinct path
//! segment. Each node that resolves to a live source holds exactly one
//! listener subscription on that source. A change of [`prop::ALL`]
//! re-resolves every subtree below the announcing node.
//!
//! Listeners attach lazily on the first subscriber and fully detach when the
//! last subscriber goes away; the last computed value is retained across the
//! detached period. Recomputed values equal to the previous one are not
//! republished.
//!
//! # Failure modes
//!
//! A panicking compute closure or subscriber is caught, reported through
//! [`crate::errors`], and the previous value is kept. The compute closure
//! must not mutate watched sources.

use std::cell::RefCell;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::{Rc, Weak};

use ahash::HashMap;

use crate::error::BindError;
use crate::errors;
use crate::notify::Subscription;
use crate::object::{HasObservable, ObservableObject};
use crate::prop;

/// Root or intermediate node of an observed path.
///
/// [`child`](Self::child) resolves a property name to the reactive source it
/// currently holds, letting paths descend through reassignable properties.
/// Leaf properties return `None`.
pub trait ReactiveSource: HasObservable {
    fn child(&self, property: &'static str) -> Option<Rc<dyn ReactiveSource>> {
        let _ = property;
        None
    }
}

impl ReactiveSource for ObservableObject {}

#[derive(Default)]
struct BindingNode {
    source: Option<Rc<dyn ReactiveSource>>,
    listener: Option<Subscription>,
    children: HashMap<&'static str, BindingNode>,
}

struct ObservedState<V> {
    root: Rc<dyn ReactiveSource>,
    compute: Rc<dyn Fn() -> V>,
    binding: BindingNode,
    value: Option<V>,
    subscribers: Vec<(u64, Rc<dyn Fn(&V)>)>,
    next_id: u64,
    attached: bool,
}

/// Derived value recomputed when any watched property path changes.
pub struct Observed<V> {
    state: Rc<RefCell<ObservedState<V>>>,
}

impl<V> Clone for Observed<V> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<V: Clone + PartialEq + 'static> Observed<V> {
    /// Watch `paths` below `root` and recompute with `compute` on change.
    ///
    /// Nothing attaches until the first [`subscribe`](Self::subscribe).
    #[must_use]
    pub fn new(
        root: Rc<dyn ReactiveSource>,
        paths: &[&[&'static str]],
        compute: impl Fn() -> V + 'static,
    ) -> Self {
        let mut binding = BindingNode::default();
        for path in paths {
            let mut node = &mut binding;
            for &segment in *path {
                node = node.children.entry(segment).or_default();
            }
        }
        Self {
            state: Rc::new(RefCell::new(ObservedState {
                root,
                compute: Rc::new(compute),
                binding,
                value: None,
                subscribers: Vec::new(),
                next_id: 0,
                attached: false,
            })),
        }
    }

    /// Last computed value, if any compute has succeeded.
    #[must_use]
    pub fn get(&self) -> Option<V> {
        self.state.borrow().value.clone()
    }

    /// Subscribe to recomputed values.
    ///
    /// The first subscriber attaches the binding tree. Every new subscriber
    /// receives the current value synchronously, provided a compute has
    /// succeeded.
    pub fn subscribe(&self, callback: impl Fn(&V) + 'static) -> Subscription {
        let callback: Rc<dyn Fn(&V)> = Rc::new(callback);
        let weak = Rc::downgrade(&self.state);
        let (id, attached_now) = {
            let mut state = self.state.borrow_mut();
            let id = state.next_id;
            state.next_id += 1;
            let state = &mut *state;
            let attached_now = !state.attached;
            if attached_now {
                let root = Rc::clone(&state.root);
                update_source::<V>(&mut state.binding, Some(root), &[], &weak);
                state.attached = true;
            }
            state.subscribers.push((id, Rc::clone(&callback)));
            (id, attached_now)
        };

        // A value retained across a detached period may be stale, so an
        // attach always recomputes.
        if attached_now || self.state.borrow().value.is_none() {
            compute_into(&self.state);
        }
        if let Some(value) = self.state.borrow().value.clone() {
            deliver(&callback, &value);
        }

        Subscription::from_cancel(Box::new(move || {
            let Some(state_rc) = weak.upgrade() else {
                return;
            };
            let mut state = state_rc.borrow_mut();
            state.subscribers.retain(|(sid, _)| *sid != id);
            if state.subscribers.is_empty() && state.attached {
                let weak = Rc::downgrade(&state_rc);
                let state = &mut *state;
                update_source::<V>(&mut state.binding, None, &[], &weak);
                state.attached = false;
            }
        }))
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.state.borrow().subscribers.len()
    }
}

impl<V: fmt::Debug> fmt::Debug for Observed<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Observed")
            .field("value", &state.value)
            .field("subscribers", &state.subscribers.len())
            .field("attached", &state.attached)
            .finish()
    }
}

/// Rebind `node` to `source`, re-resolving the subtree below it.
///
/// An unchanged source keeps its listener, but children are always pushed
/// down so reassignments deeper in the path are picked up.
fn update_source<V: Clone + PartialEq + 'static>(
    node: &mut BindingNode,
    source: Option<Rc<dyn ReactiveSource>>,
    path: &[&'static str],
    weak: &Weak<RefCell<ObservedState<V>>>,
) {
    let same = match (&node.source, &source) {
        (Some(old), Some(new)) => old.observable().same_node(new.observable()),
        (None, None) => true,
        _ => false,
    };
    if !same {
        node.listener = None;
        node.source = source;
        if let Some(src) = &node.source {
            let weak = weak.clone();
            let path: Vec<&'static str> = path.to_vec();
            node.listener = Some(src.observable().subscribe(move |change| {
                on_source_change::<V>(&weak, &path, change.property);
            }));
        }
    }
    let current = node.source.clone();
    for (&name, child) in &mut node.children {
        let next = current.as_ref().and_then(|src| src.child(name));
        let mut child_path = path.to_vec();
        child_path.push(name);
        update_source::<V>(child, next, &child_path, weak);
    }
}

/// React to a property change announced by the source bound at `path`.
fn on_source_change<V: Clone + PartialEq + 'static>(
    weak: &Weak<RefCell<ObservedState<V>>>,
    path: &[&'static str],
    property: &'static str,
) {
    let Some(state_rc) = weak.upgrade() else {
        return;
    };
    {
        let mut state = state_rc.borrow_mut();
        let state = &mut *state;
        let Some(node) = node_at_mut(&mut state.binding, path) else {
            return;
        };
        if property == prop::ALL {
            let source = node.source.clone();
            let names: Vec<&'static str> = node.children.keys().copied().collect();
            for name in names {
                let next = source.as_ref().and_then(|src| src.child(name));
                let mut child_path = path.to_vec();
                child_path.push(name);
                if let Some(child) = node.children.get_mut(name) {
                    update_source::<V>(child, next, &child_path, weak);
                }
            }
        } else if node.children.contains_key(property) {
            let next = node.source.as_ref().and_then(|src| src.child(property));
            let mut child_path = path.to_vec();
            child_path.push(property);
            if let Some(child) = node.children.get_mut(property) {
                update_source::<V>(child, next, &child_path, weak);
            }
        } else {
            // Not a watched property at this level.
            return;
        }
    }
    recompute_and_publish(&state_rc);
}

fn node_at_mut<'a>(
    mut node: &'a mut BindingNode,
    path: &[&'static str],
) -> Option<&'a mut BindingNode> {
    for segment in path {
        node = node.children.get_mut(segment)?;
    }
    Some(node)
}

/// Compute and store a value without publishing. Used for the initial value.
fn compute_into<V: Clone + PartialEq>(state_rc: &Rc<RefCell<ObservedState<V>>>) {
    let compute = Rc::clone(&state_rc.borrow().compute);
    match catch_unwind(AssertUnwindSafe(|| compute())) {
        Ok(value) => state_rc.borrow_mut().value = Some(value),
        Err(payload) => {
            let err = BindError::callback("derived computation", payload);
            tracing::warn!(%err, "derived computation panicked");
            errors::publish(&err);
        }
    }
}

/// Recompute, and publish to all subscribers when the value changed.
fn recompute_and_publish<V: Clone + PartialEq>(state_rc: &Rc<RefCell<ObservedState<V>>>) {
    let compute = {
        let state = state_rc.borrow();
        if state.subscribers.is_empty() {
            return;
        }
        Rc::clone(&state.compute)
    };
    let next = match catch_unwind(AssertUnwindSafe(|| compute())) {
        Ok(value) => value,
        Err(payload) => {
            let err = BindError::callback("derived computation", payload);
            tracing::warn!(%err, "derived computation panicked; previous value kept");
            errors::publish(&err);
            return;
        }
    };
    let subscribers = {
        let mut state = state_rc.borrow_mut();
        if state.value.as_ref() == Some(&next) {
            return;
        }
        state.value = Some(next.clone());
        state
            .subscribers
            .iter()
            .map(|(_, callback)| Rc::clone(callback))
            .collect::<Vec<_>>()
    };
    for callback in subscribers {
        deliver(&callback, &next);
    }
}

fn deliver<V>(callback: &Rc<dyn Fn(&V)>, value: &V) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| (**callback)(value))) {
        let err = BindError::callback("derived value subscriber", payload);
        tracing::warn!(%err, "derived value subscriber panicked");
        errors::publish(&err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::PropertyValue;

    struct Badge {
        node: ObservableObject,
        label: RefCell<String>,
    }

    impl Badge {
        fn new(label: &str) -> Rc<Self> {
            Rc::new(Self {
                node: ObservableObject::new(),
                label: RefCell::new(label.to_string()),
            })
        }

        fn set_label(&self, label: &str) {
            self.node.set_value(&self.label, label.to_string(), "label");
        }
    }

    impl PartialEq for Badge {
        fn eq(&self, other: &Self) -> bool {
            self.node.same_node(&other.node)
        }
    }

    impl HasObservable for Badge {
        fn observable(&self) -> &ObservableObject {
            &self.node
        }
    }

    impl PropertyValue for Badge {
        fn as_observable(&self) -> Option<&ObservableObject> {
            Some(&self.node)
        }
    }

    impl ReactiveSource for Badge {}

    struct Profile {
        node: ObservableObject,
        title: RefCell<String>,
        badge: RefCell<Option<Rc<Badge>>>,
    }

    impl Profile {
        fn new(title: &str) -> Rc<Self> {
            Rc::new(Self {
                node: ObservableObject::new(),
                title: RefCell::new(title.to_string()),
                badge: RefCell::new(None),
            })
        }

        fn set_title(&self, title: &str) {
            self.node.set_value(&self.title, title.to_string(), "title");
        }

        fn set_badge(&self, badge: Option<Rc<Badge>>) {
            self.node.set_value(&self.badge, badge, "badge");
        }
    }

    impl HasObservable for Profile {
        fn observable(&self) -> &ObservableObject {
            &self.node
        }
    }

    impl ReactiveSource for Profile {
        fn child(&self, property: &'static str) -> Option<Rc<dyn ReactiveSource>> {
            if property == "badge" {
                self.badge
                    .borrow()
                    .clone()
                    .map(|badge| badge as Rc<dyn ReactiveSource>)
            } else {
                None
            }
        }
    }

    fn headline(profile: &Rc<Profile>) -> Observed<String> {
        let source = Rc::clone(profile);
        Observed::new(
            Rc::clone(profile) as Rc<dyn ReactiveSource>,
            &[&["title"], &["badge", "label"]],
            move || {
                let badge = source
                    .badge
                    .borrow()
                    .as_ref()
                    .map_or_else(String::new, |b| format!(" [{}]", b.label.borrow()));
                format!("{}{}", source.title.borrow(), badge)
            },
        )
    }

    fn record(observed: &Observed<String>) -> (Rc<RefCell<Vec<String>>>, Subscription) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let sub = observed.subscribe(move |value: &String| sink.borrow_mut().push(value.clone()));
        (log, sub)
    }

    #[test]
    fn initial_value_delivered_once() {
        let profile = Profile::new("hello");
        let observed = headline(&profile);
        let (log, _sub) = record(&observed);

        assert_eq!(*log.borrow(), vec!["hello".to_string()]);
        assert_eq!(observed.get(), Some("hello".to_string()));
    }

    #[test]
    fn watched_change_recomputes_once() {
        let profile = Profile::new("a");
        let observed = headline(&profile);
        let (log, _sub) = record(&observed);

        profile.set_title("b");

        assert_eq!(*log.borrow(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn unwatched_change_is_ignored() {
        let profile = Profile::new("a");
        let observed = headline(&profile);
        let (log, _sub) = record(&observed);

        profile.node.raise_property_changed("unrelated");
        profile.node.mark_changed();

        assert_eq!(*log.borrow(), vec!["a".to_string()]);
    }

    #[test]
    fn equal_recompute_is_deduplicated() {
        let profile = Profile::new("a");
        let source = Rc::clone(&profile);
        let observed = Observed::new(
            Rc::clone(&profile) as Rc<dyn ReactiveSource>,
            &[&["title"]],
            move || source.title.borrow().len(),
        );
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let _sub = observed.subscribe(move |len: &usize| sink.borrow_mut().push(*len));

        profile.set_title("b");

        assert_eq!(*log.borrow(), vec![1]);
    }

    #[test]
    fn nested_path_follows_reassignment() {
        let profile = Profile::new("p");
        let first = Badge::new("gold");
        profile.set_badge(Some(Rc::clone(&first)));

        let observed = headline(&profile);
        let (log, _sub) = record(&observed);
        assert_eq!(*log.borrow(), vec!["p [gold]".to_string()]);

        first.set_label("silver");
        assert_eq!(log.borrow().last(), Some(&"p [silver]".to_string()));

        let second = Badge::new("bronze");
        profile.set_badge(Some(Rc::clone(&second)));
        assert_eq!(log.borrow().last(), Some(&"p [bronze]".to_string()));

        // The old badge is unbound.
        let before = log.borrow().len();
        first.set_label("stale");
        assert_eq!(log.borrow().len(), before);

        second.set_label("final");
        assert_eq!(log.borrow().last(), Some(&"p [bronze]".to_string().replace("bronze", "final")));
    }

    #[test]
    fn all_change_re_resolves_everything() {
        let profile = Profile::new("p");
        let observed = headline(&profile);
        let (log, _sub) = record(&observed);

        {
            let mut badge = profile.badge.borrow_mut();
            *badge = Some(Badge::new("quiet"));
        }
        profile.node.raise_property_changed(prop::ALL);

        assert_eq!(log.borrow().last(), Some(&"p [quiet]".to_string()));
    }

    #[test]
    fn last_unsubscribe_detaches_listeners() {
        let profile = Profile::new("p");
        let observed = headline(&profile);

        let sub = observed.subscribe(|_: &String| {});
        assert_eq!(observed.subscriber_count(), 1);
        drop(sub);
        assert_eq!(observed.subscriber_count(), 0);

        // Value survives detachment and source changes go unnoticed.
        profile.set_title("changed");
        assert_eq!(observed.get(), Some("p".to_string()));
    }

    #[test]
    fn resubscribe_reattaches_and_recomputes() {
        let profile = Profile::new("p");
        let observed = headline(&profile);

        drop(observed.subscribe(|_: &String| {}));
        // Changed while fully detached; re-attaching must not serve the
        // retained value.
        profile.set_title("q");

        let (log, _sub) = record(&observed);
        assert_eq!(*log.borrow(), vec!["q".to_string()]);
        profile.set_title("r");
        assert_eq!(log.borrow().last(), Some(&"r".to_string()));
    }

    #[test]
    fn panicking_compute_keeps_previous_value() {
        let profile = Profile::new("ok");
        let source = Rc::clone(&profile);
        let observed = Observed::new(
            Rc::clone(&profile) as Rc<dyn ReactiveSource>,
            &[&["title"]],
            move || {
                let title = source.title.borrow().clone();
                assert!(title != "boom", "refusing to format");
                title
            },
        );
        let (log, _sub) = record(&observed);

        profile.set_title("boom");
        assert_eq!(observed.get(), Some("ok".to_string()));
        assert_eq!(*log.borrow(), vec!["ok".to_string()]);

        profile.set_title("fine");
        assert_eq!(log.borrow().last(), Some(&"fine".to_string()));
    }
}
