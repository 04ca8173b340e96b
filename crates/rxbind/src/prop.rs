#![forbid(unsafe_code)]

//! Well-known property names used in change notifications.
//!
//! Property-changed events identify properties by `&'static str` name. The
//! names below are reserved by the core types; everything else belongs to the
//! embedding view-model.

/// Wholesale-invalidation marker: "every property changed".
///
/// Publishing a change with this name tells observers (most notably
/// [`Observed`](crate::observe::Observed) binding trees) to re-resolve every
/// dependent path instead of matching a single property.
pub const ALL: &str = "";

/// The dirty flag of a trackable node. Published on every transition of
/// `is_changed`, in both directions.
pub const IS_CHANGED: &str = "is_changed";

/// The init-scope flag of a trackable node. Published on the outermost
/// `begin_init` and the matching outermost `end_init`.
pub const IS_INITIALIZING: &str = "is_initializing";

/// Element count of an observable collection.
pub const LEN: &str = "len";

/// First element of an observable collection.
pub const FIRST: &str = "first";

/// Last element of an observable collection.
pub const LAST: &str = "last";

/// Positional contents of an observable collection (any index may have
/// changed).
pub const ITEMS: &str = "items";

/// The value slot of an [`ObservableKeyValuePair`](crate::dictionary::ObservableKeyValuePair).
pub const VALUE: &str = "value";
