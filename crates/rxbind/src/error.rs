#![forbid(unsafe_code)]

//! Error taxonomy for the binding core.
//!
//! Two families live here:
//!
//! - **Contract violations** (`UnbalancedInit`, `DuplicateKey`, `KeyNotFound`):
//!   returned synchronously from the violating call. The target object or
//!   collection is left in its pre-call state; no partial mutation is ever
//!   observable.
//! - **Isolated callback failures** (`Callback`): a subscriber or derived
//!   computation panicked. These are never propagated into the mutating call;
//!   they are reported on the process-wide [`errors`](crate::errors) channel.

use std::any::Any;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BindError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BindError {
    #[error("unbalanced init scope: end_init called with no matching begin_init")]
    UnbalancedInit,

    #[error("duplicate key: an element with key {key} already exists")]
    DuplicateKey { key: String },

    #[error("key not found: {key}")]
    KeyNotFound { key: String },

    #[error("{context} panicked: {message}")]
    Callback {
        context: &'static str,
        message: String,
    },
}

impl BindError {
    #[must_use]
    pub fn duplicate_key(key: impl std::fmt::Debug) -> Self {
        Self::DuplicateKey {
            key: format!("{key:?}"),
        }
    }

    #[must_use]
    pub fn key_not_found(key: impl std::fmt::Debug) -> Self {
        Self::KeyNotFound {
            key: format!("{key:?}"),
        }
    }

    /// Build a `Callback` error from a caught panic payload.
    pub(crate) fn callback(context: &'static str, payload: Box<dyn Any + Send>) -> Self {
        Self::Callback {
            context,
            message: panic_message(&payload),
        }
    }
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
