#![forbid(unsafe_code)]

//! Capability probing for values stored in observable properties.
//!
//! When a property slot is assigned, the owner needs to know whether the new
//! value participates in change tracking so it can attach it as a child.
//! [`PropertyValue::as_observable`] answers that statically: reactive values
//! return their node handle, plain data returns `None`, and wrappers such as
//! `Option` and `Rc` delegate to their contents.

use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use crate::object::ObservableObject;

/// A value that can live in an observable property slot.
///
/// The default implementation describes plain data. Reactive types override
/// [`as_observable`](Self::as_observable) to expose their node so the owning
/// object can cascade attach, detach, and init scopes into them.
pub trait PropertyValue {
    /// Node handle when this value participates in change tracking.
    fn as_observable(&self) -> Option<&ObservableObject> {
        None
    }
}

/// Implements [`PropertyValue`] for plain data types with no reactive
/// interior.
#[macro_export]
macro_rules! plain_value {
    ($($ty:ty),+ $(,)?) => {
        $(impl $crate::value::PropertyValue for $ty {})+
    };
}

plain_value!(
    (),
    bool,
    char,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    f32,
    f64,
    String,
    &str,
    PathBuf,
    Duration,
);

impl<T: PropertyValue> PropertyValue for Vec<T> {}

impl<T: PropertyValue> PropertyValue for Option<T> {
    fn as_observable(&self) -> Option<&ObservableObject> {
        self.as_ref().and_then(PropertyValue::as_observable)
    }
}

impl<T: PropertyValue + ?Sized> PropertyValue for Rc<T> {
    fn as_observable(&self) -> Option<&ObservableObject> {
        (**self).as_observable()
    }
}

impl<T: PropertyValue + ?Sized> PropertyValue for Arc<T> {
    fn as_observable(&self) -> Option<&ObservableObject> {
        (**self).as_observable()
    }
}
