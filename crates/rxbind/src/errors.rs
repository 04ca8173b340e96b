#![forbid(unsafe_code)]

//! Process-wide error channel for isolated callback failures.
//!
//! When a subscriber callback or a derived computation panics, the failure
//! must not propagate into the mutating call that triggered delivery: the
//! mutation still completes and every other observer still runs. The caught
//! failure is reported here instead, as an out-of-band [`BindError`] stream.
//!
//! The channel is a process-lifetime static. It must tolerate concurrent
//! subscribe/publish from multiple threads because independent reactive
//! graphs may live on different threads even though each graph itself is
//! single-threaded.

use std::sync::{Arc, Mutex, OnceLock};

use crate::error::BindError;

type Handler = Arc<dyn Fn(&BindError) + Send + Sync>;

struct Channel {
    next_id: u64,
    handlers: Vec<(u64, Handler)>,
}

fn channel() -> &'static Mutex<Channel> {
    static CHANNEL: OnceLock<Mutex<Channel>> = OnceLock::new();
    CHANNEL.get_or_init(|| {
        Mutex::new(Channel {
            next_id: 1,
            handlers: Vec::new(),
        })
    })
}

/// RAII guard for an error-channel subscription. Dropping it removes the
/// handler before the next publish.
#[must_use = "dropping the guard unsubscribes immediately"]
pub struct ErrorSubscription {
    id: u64,
}

impl Drop for ErrorSubscription {
    fn drop(&mut self) {
        let mut ch = channel().lock().unwrap_or_else(|poison| poison.into_inner());
        ch.handlers.retain(|(id, _)| *id != self.id);
    }
}

impl std::fmt::Debug for ErrorSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorSubscription")
            .field("id", &self.id)
            .finish()
    }
}

/// Subscribe to isolated failure reports. Handlers run synchronously on the
/// thread that caught the failure, in registration order.
pub fn subscribe(handler: impl Fn(&BindError) + Send + Sync + 'static) -> ErrorSubscription {
    let mut ch = channel().lock().unwrap_or_else(|poison| poison.into_inner());
    let id = ch.next_id;
    ch.next_id += 1;
    ch.handlers.push((id, Arc::new(handler)));
    ErrorSubscription { id }
}

/// Report an isolated failure to every subscribed handler.
///
/// Handlers are invoked outside the channel lock so they may subscribe or
/// unsubscribe re-entrantly. A panicking handler is swallowed with a warning;
/// there is nowhere further out of band to report it.
pub(crate) fn publish(error: &BindError) {
    let snapshot: Vec<Handler> = {
        let ch = channel().lock().unwrap_or_else(|poison| poison.into_inner());
        ch.handlers.iter().map(|(_, h)| Arc::clone(h)).collect()
    };

    for handler in snapshot {
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| (*handler)(error)));
        if outcome.is_err() {
            tracing::warn!(%error, "error-channel handler panicked; report dropped");
        }
    }
}
