use std::sync::{
    Arc, Mutex, Weak,
    atomic::{AtomicU64, Ordering},
};

use crate::types::DetectionResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Idle,
    Loading,
    RequestDone,
    Error,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AppSnapshot {
    pub status: Status,
    pub result: Option<DetectionResult>,
    pub error_message: Option<String>,
}

impl AppSnapshot {
    fn initial() -> Self {
        Self {
            status: Status::Idle,
            result: None,
            error_message: None,
        }
    }
}

type Listener = Arc<dyn Fn(&AppSnapshot) + Send + Sync + 'static>;

struct Inner {
    snapshot: Mutex<AppSnapshot>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener_id: AtomicU64,
}

/// Shared store for the current capture status and last classification
/// result. Cloning shares the underlying state; the upload worker and the
/// UI both hold handles. Change notification goes through an explicit
/// listener list rather than any global event mechanism.
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<Inner>,
}

/// Keeps a listener registered; dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    inner: Weak<Inner>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            if let Ok(mut listeners) = inner.listeners.lock() {
                listeners.retain(|(id, _)| *id != self.id);
            }
        }
    }
}

impl StateStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                snapshot: Mutex::new(AppSnapshot::initial()),
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn get(&self) -> AppSnapshot {
        self.inner
            .snapshot
            .lock()
            .expect("state store lock poisoned")
            .clone()
    }

    #[must_use = "dropping the subscription unregisters the listener"]
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&AppSnapshot) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .lock()
            .expect("state store lock poisoned")
            .push((id, Arc::new(listener)));
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// No-op when the status already matches; repeated calls with the same
    /// value fire a single notification.
    pub fn set_status(&self, status: Status) {
        let snapshot = {
            let mut guard = self
                .inner
                .snapshot
                .lock()
                .expect("state store lock poisoned");
            if guard.status == status {
                return;
            }
            guard.status = status;
            guard.clone()
        };
        self.notify(&snapshot);
    }

    /// Marks the start of a classification request and returns the status
    /// to restore if it fails. Returns `None` while a request is already in
    /// flight, so a second capture cannot record `Loading` as the value to
    /// restore and wedge the store there.
    pub fn begin_loading(&self) -> Option<Status> {
        let (prior, snapshot) = {
            let mut guard = self
                .inner
                .snapshot
                .lock()
                .expect("state store lock poisoned");
            if guard.status == Status::Loading {
                return None;
            }
            let prior = guard.status;
            guard.status = Status::Loading;
            (prior, guard.clone())
        };
        self.notify(&snapshot);
        Some(prior)
    }

    pub fn set_result(&self, result: DetectionResult) {
        let snapshot = {
            let mut guard = self
                .inner
                .snapshot
                .lock()
                .expect("state store lock poisoned");
            guard.result = Some(result);
            guard.status = Status::RequestDone;
            guard.clone()
        };
        self.notify(&snapshot);
    }

    /// Stores the message and forces `Status::Error` regardless of its
    /// value; `set_error(None)` still yields an error status with no
    /// message attached.
    pub fn set_error(&self, message: Option<String>) {
        let snapshot = {
            let mut guard = self
                .inner
                .snapshot
                .lock()
                .expect("state store lock poisoned");
            guard.error_message = message;
            guard.status = Status::Error;
            guard.clone()
        };
        self.notify(&snapshot);
    }

    pub fn reset(&self) {
        let snapshot = {
            let mut guard = self
                .inner
                .snapshot
                .lock()
                .expect("state store lock poisoned");
            *guard = AppSnapshot::initial();
            guard.clone()
        };
        self.notify(&snapshot);
    }

    // Listeners run outside the lock so they may subscribe, unsubscribe or
    // mutate the store from inside a notification. A listener removed while
    // a notification is in flight can still see that one last snapshot.
    fn notify(&self, snapshot: &AppSnapshot) {
        let listeners: Vec<Listener> = {
            let guard = self
                .inner
                .listeners
                .lock()
                .expect("state store lock poisoned");
            guard.iter().map(|(_, listener)| listener.clone()).collect()
        };
        for listener in listeners {
            listener(snapshot);
        }
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_store() -> (StateStore, Arc<AtomicUsize>, Subscription) {
        let store = StateStore::new();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let sub = store.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (store, count, sub)
    }

    #[test]
    fn repeated_status_fires_once() {
        let (store, count, _sub) = counting_store();
        store.set_status(Status::Loading);
        store.set_status(Status::Loading);
        store.set_status(Status::Loading);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(store.get().status, Status::Loading);
    }

    #[test]
    fn initial_status_is_a_noop() {
        let (store, count, _sub) = counting_store();
        store.set_status(Status::Idle);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn set_error_always_forces_error_status() {
        let store = StateStore::new();
        store.set_error(Some("camera exploded".to_string()));
        assert_eq!(store.get().status, Status::Error);

        store.reset();
        store.set_error(None);
        let snapshot = store.get();
        assert_eq!(snapshot.status, Status::Error);
        assert_eq!(snapshot.error_message, None);
    }

    #[test]
    fn set_result_forces_request_done() {
        let store = StateStore::new();
        store.set_result(DetectionResult {
            detected_letter: "A".to_string(),
            confidence: 0.9,
            hand_detected: "Right".to_string(),
        });
        let snapshot = store.get();
        assert_eq!(snapshot.status, Status::RequestDone);
        assert_eq!(snapshot.result.unwrap().detected_letter, "A");
    }

    #[test]
    fn reset_restores_initial_triple() {
        let store = StateStore::new();
        store.set_result(DetectionResult {
            detected_letter: "B".to_string(),
            confidence: 0.5,
            hand_detected: "Left".to_string(),
        });
        store.set_error(Some("late failure".to_string()));
        store.reset();
        assert_eq!(store.get(), AppSnapshot::initial());
    }

    #[test]
    fn begin_loading_returns_prior_status_once() {
        let store = StateStore::new();
        assert_eq!(store.begin_loading(), Some(Status::Idle));
        assert_eq!(store.get().status, Status::Loading);

        // Second capture while one is in flight is refused.
        assert_eq!(store.begin_loading(), None);

        // Restoring after a failed request makes the next capture possible.
        store.set_status(Status::Idle);
        assert_eq!(store.begin_loading(), Some(Status::Idle));
    }

    #[test]
    fn begin_loading_after_a_result_restores_request_done() {
        let store = StateStore::new();
        store.set_result(DetectionResult {
            detected_letter: "C".to_string(),
            confidence: 0.7,
            hand_detected: "Left".to_string(),
        });
        assert_eq!(store.begin_loading(), Some(Status::RequestDone));
    }

    #[test]
    fn listener_can_subscribe_during_notification() {
        let store = StateStore::new();
        let count = Arc::new(AtomicUsize::new(0));

        let inner_sub = Arc::new(Mutex::new(None));
        let (inner_store, inner_count, slot) = (store.clone(), count.clone(), inner_sub.clone());
        let _sub = store.subscribe(move |_| {
            let mut slot = slot.lock().unwrap();
            if slot.is_none() {
                let seen = inner_count.clone();
                *slot = Some(inner_store.subscribe(move |_| {
                    seen.fetch_add(1, Ordering::SeqCst);
                }));
            }
        });

        store.set_status(Status::Loading);
        store.set_status(Status::RequestDone);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_can_mutate_the_store_during_notification() {
        let store = StateStore::new();
        let inner_store = store.clone();
        let _sub = store.subscribe(move |snapshot| {
            if snapshot.status == Status::Loading {
                inner_store.set_error(Some("rejected mid-flight".to_string()));
            }
        });

        store.set_status(Status::Loading);
        let snapshot = store.get();
        assert_eq!(snapshot.status, Status::Error);
        assert_eq!(
            snapshot.error_message.as_deref(),
            Some("rejected mid-flight")
        );
    }

    #[test]
    fn listener_can_drop_its_own_subscription_during_notification() {
        let store = StateStore::new();
        let count = Arc::new(AtomicUsize::new(0));

        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let (seen, inner_slot) = (count.clone(), slot.clone());
        let sub = store.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            inner_slot.lock().unwrap().take();
        });
        *slot.lock().unwrap() = Some(sub);

        store.set_status(Status::Loading);
        store.set_status(Status::RequestDone);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropped_subscription_stops_notifications() {
        let (store, count, sub) = counting_store();
        store.set_status(Status::Loading);
        drop(sub);
        store.set_status(Status::RequestDone);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
