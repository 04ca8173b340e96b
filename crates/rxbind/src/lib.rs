#![forbid(unsafe_code)]

//! Observable objects, collections, and dependency-tracked derived values
//! for desktop view-models.
//!
//! The crate is built around a handful of cooperating pieces:
//!
//! - [`ObservableObject`]: the reactive node a view-model embeds. It tracks
//!   a dirty flag, announces property changes, fans changes out to declared
//!   dependent properties, and aggregates attached children.
//! - [`ObservableList`], [`ObservableDictionary`], and [`ObservableSet`]:
//!   collections that announce per-operation changes; list and dictionary
//!   also track their reactive items.
//! - [`Observed`]: a derived value recomputed whenever one of its watched
//!   property paths changes, including paths through reassignable children.
//! - [`errors`]: a process-wide channel reporting panics caught inside
//!   subscriber callbacks and compute closures.
//!
//! Notification graphs are single-threaded (`Rc`-based); build and use each
//! graph on one thread. The declared-reference registry and the error
//! channel are process-wide and thread-safe.
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use rxbind::{ChangeTracking, HasObservable, ObservableObject};
//!
//! struct Person {
//!     node: ObservableObject,
//!     name: RefCell<String>,
//! }
//!
//! impl HasObservable for Person {
//!     fn observable(&self) -> &ObservableObject {
//!         &self.node
//!     }
//! }
//!
//! let person = Person {
//!     node: ObservableObject::new(),
//!     name: RefCell::new(String::new()),
//! };
//! person.node.set_value(&person.name, "Ada".to_string(), "name");
//! assert!(person.is_changed());
//! person.accept_changes();
//! assert!(!person.is_changed());
//! ```

pub mod dictionary;
pub mod error;
pub mod errors;
pub mod list;
pub mod notify;
pub mod object;
pub mod observe;
pub mod prop;
pub mod references;
pub mod set;
pub mod value;

pub use dictionary::{ObservableDictionary, ObservableKeyValuePair};
pub use error::{BindError, Result};
pub use errors::ErrorSubscription;
pub use list::{ItemChange, ListChange, ObservableList};
pub use notify::{PropertyChange, Publisher, Subscription};
pub use object::{
    ChangeTracking, HasObservable, InitGuard, InitScope, ObservableObject,
};
pub use observe::{Observed, ReactiveSource};
pub use references::{ReferenceTable, ReferencesBuilder};
pub use set::{ObservableSet, SetChange};
pub use value::PropertyValue;
