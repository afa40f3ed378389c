use parking_lot::Mutex;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};
use tracing::warn;

type Listener = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct ListenerState {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

/// Process-wide set of prefetch-completion listeners
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    state: Arc<Mutex<ListenerState>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F>(&self, listener: F) -> ListenerGuard
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.listeners.push((id, Arc::new(listener)));

        ListenerGuard {
            id,
            state: Arc::downgrade(&self.state),
            attached: true,
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every listener once, returning how many of them panicked.
    ///
    /// Listeners run outside the lock, so they may add or remove listeners.
    pub fn notify(&self) -> usize {
        let snapshot: Vec<(u64, Listener)> = self.state.lock().listeners.clone();

        let mut panicked = 0;
        for (id, listener) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener())).is_err() {
                warn!("Prefetch listener {} panicked", id);
                panicked += 1;
            }
        }
        panicked
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

/// Subscription handle; dropping it unsubscribes the listener
#[must_use = "dropping the guard immediately unsubscribes the listener"]
pub struct ListenerGuard {
    id: u64,
    state: Weak<Mutex<ListenerState>>,
    attached: bool,
}

impl ListenerGuard {
    pub fn unsubscribe(mut self) {
        self.remove();
    }

    /// Keep the listener registered for the lifetime of the registry
    pub fn detach(mut self) {
        self.attached = false;
    }

    fn remove(&mut self) {
        if !self.attached {
            return;
        }
        self.attached = false;
        if let Some(state) = self.state.upgrade() {
            state.lock().listeners.retain(|(id, _)| *id != self.id);
        }
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.remove();
    }
}
