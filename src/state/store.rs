// SPDX-License-Identifier: MPL-2.0

//! Shared handle to the application state

use super::{Action, AppState, ResourceHistory, reduce};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

/// Owns the current [`AppState`] and publishes every accepted change.
///
/// Cloning the store hands out another handle to the same state. Actions
/// are applied one at a time inside the watch channel's lock.
#[derive(Clone)]
pub struct Store {
    tx: Arc<watch::Sender<AppState>>,
    seq: Arc<AtomicU64>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new(AppState::default())
    }
}

impl Store {
    pub fn new(initial: AppState) -> Self {
        Self {
            tx: Arc::new(watch::Sender::new(initial)),
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Sequence number for a request about to be issued.
    ///
    /// Shared by every poller of this store, so results for one slice are
    /// ordered by issue time even when several jobs feed it.
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn with_history(history: ResourceHistory) -> Self {
        Self::new(AppState::with_history(history))
    }

    /// Apply an action. Returns whether the state changed.
    pub fn dispatch(&self, action: Action) -> bool {
        self.tx.send_if_modified(|state| {
            let before = state.revision();
            let next = reduce(std::mem::take(state), action);
            let changed = next.revision() != before;
            *state = next;
            changed
        })
    }

    /// Run `f` against the current state without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&AppState) -> R) -> R {
        f(&*self.tx.borrow())
    }

    pub fn snapshot(&self) -> AppState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.tx.subscribe()
    }

    /// Watch one projection of the state.
    ///
    /// The returned [`Selector`] only wakes when the projected value
    /// differs from the last one it yielded, so a logs update does not
    /// wake a stats card.
    pub fn select<T, F>(&self, project: F) -> Selector<T, F>
    where
        T: PartialEq + Clone,
        F: Fn(&AppState) -> T,
    {
        let rx = self.tx.subscribe();
        let last = project(&*rx.borrow());
        Selector { rx, project, last }
    }
}

pub struct Selector<T, F> {
    rx: watch::Receiver<AppState>,
    project: F,
    last: T,
}

impl<T, F> Selector<T, F>
where
    T: PartialEq + Clone,
    F: Fn(&AppState) -> T,
{
    pub fn current(&self) -> &T {
        &self.last
    }

    /// Wait for the projection to change. `None` once the store is gone.
    pub async fn changed(&mut self) -> Option<T> {
        loop {
            self.rx.changed().await.ok()?;
            let next = (self.project)(&*self.rx.borrow_and_update());
            if next != self.last {
                self.last = next.clone();
                return Some(next);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::{LogEntry, Stats};
    use crate::state::{Payload, Slice};
    use chrono::Utc;
    use std::time::Duration;

    fn loaded(payload: Payload, seq: u64) -> Action {
        Action::Loaded {
            payload,
            seq,
            at: Utc::now(),
        }
    }

    #[test]
    fn test_dispatch_reports_change() {
        let store = Store::default();
        assert!(store.dispatch(loaded(Payload::Logs(vec![]), 1)));
        assert!(!store.dispatch(loaded(Payload::Logs(vec![]), 1)));
        assert!(!store.dispatch(Action::ClearError(Slice::Logs)));
    }

    #[test]
    fn test_sequence_is_shared_between_clones() {
        let store = Store::default();
        let other = store.clone();
        assert_eq!(store.next_seq(), 1);
        assert_eq!(other.next_seq(), 2);
        assert_eq!(store.next_seq(), 3);
    }

    #[tokio::test]
    async fn test_selector_ignores_unrelated_updates() {
        let store = Store::default();
        let mut names = store.select(|s| s.stats.as_ref().map(|st| st.node_name.clone()));
        assert_eq!(names.current(), &None);

        store.dispatch(loaded(
            Payload::Logs(vec![LogEntry {
                message: "boot".into(),
                ..Default::default()
            }]),
            1,
        ));
        let waited = tokio::time::timeout(Duration::from_millis(50), names.changed()).await;
        assert!(waited.is_err(), "selector woke for a logs update");

        store.dispatch(loaded(
            Payload::Stats(Stats {
                node_name: "ridge".into(),
                ..Default::default()
            }),
            1,
        ));
        let next = names.changed().await.unwrap();
        assert_eq!(next.as_deref(), Some("ridge"));
    }
}
