//! Change notification for session state.
//!
//! Listeners are called synchronously with the new snapshot after every
//! state change, outside the state lock, so a listener may read the manager.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::state::SessionSnapshot;

/// Callback type for session change notifications.
pub type SessionListener = Arc<dyn Fn(&SessionSnapshot) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub(crate) struct Observers {
    listeners: Mutex<Vec<(SubscriptionId, SessionListener)>>,
    next_id: AtomicU64,
}

impl Observers {
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&SessionSnapshot) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.lock().push((id, Arc::new(listener)));
        id
    }

    /// Returns `false` if the id was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() != before
    }

    pub fn notify(&self, snapshot: &SessionSnapshot) {
        // Clone the list so listeners can (un)subscribe re-entrantly.
        let listeners: Vec<SessionListener> =
            self.lock().iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in listeners {
            listener(snapshot);
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(SubscriptionId, SessionListener)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SessionState;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn subscribe_notify_unsubscribe() {
        let observers = Observers::default();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = hits.clone();
        let id = observers.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        let snapshot = SessionState::default().snapshot();
        observers.notify(&snapshot);
        observers.notify(&snapshot);
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        assert!(observers.unsubscribe(id));
        assert!(!observers.unsubscribe(id));
        observers.notify(&snapshot);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn ids_are_unique() {
        let observers = Observers::default();
        let a = observers.subscribe(|_| {});
        let b = observers.subscribe(|_| {});
        assert_ne!(a, b);
        assert_eq!(observers.len(), 2);

        observers.clear();
        assert_eq!(observers.len(), 0);
    }
}
