// src/engine/listeners.rs

//! "Paused state changed" listener registry.
//!
//! Listeners are invoked synchronously on whichever thread drove the
//! transition. A failing or panicking listener is logged and skipped; it
//! never aborts the driver loop or starves the remaining listeners.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

use crate::engine::state::PausedStateChanged;

/// Handle returned when subscribing, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&PausedStateChanged) -> anyhow::Result<()> + Send + Sync>;

#[derive(Default)]
pub(crate) struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<Vec<(ListenerId, Listener)>>,
}

impl Listeners {
    pub(crate) fn add<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&PausedStateChanged) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Deliver `event` to every listener registered at call time.
    pub(crate) fn notify(&self, event: &PausedStateChanged) {
        // Snapshot first so listeners may (un)subscribe from inside the callback.
        let snapshot: Vec<(ListenerId, Listener)> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for (id, listener) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(
                        task = %event.task,
                        listener = id.0,
                        error = %err,
                        "paused-state listener failed; ignoring"
                    );
                }
                Err(_) => {
                    warn!(
                        task = %event.task,
                        listener = id.0,
                        "paused-state listener panicked; ignoring"
                    );
                }
            }
        }
    }
}
