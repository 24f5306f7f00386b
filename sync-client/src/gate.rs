//! Holds merged datasets back from the screen while the user is busy with it.

use std::sync::Arc;
use std::time::Duration;

use reconcile::Dataset;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::focus::{self, Surface};

#[derive(Debug, Clone, Copy, Default)]
struct Activity {
    last: Option<Instant>,
    /// How many interactions (drags, open pickers, ...) are in progress.
    interacting: usize,
}

/// Tracks when the user last did something. Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct ActivityMonitor {
    state: Arc<watch::Sender<Activity>>,
}

impl Default for ActivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityMonitor {
    pub fn new() -> Self {
        Self {
            state: Arc::new(watch::Sender::new(Activity::default())),
        }
    }

    /// A keystroke, click, scroll, ...
    pub fn record(&self) {
        self.state.send_modify(|activity| activity.last = Some(Instant::now()));
    }

    /// Mark the start of an interaction that lasts until the guard is dropped.
    pub fn begin(&self) -> InteractionGuard {
        self.state.send_modify(|activity| {
            activity.interacting += 1;
            activity.last = Some(Instant::now());
        });
        InteractionGuard {
            monitor: self.clone(),
        }
    }

    fn end(&self) {
        self.state.send_modify(|activity| {
            activity.interacting = activity.interacting.saturating_sub(1);
            activity.last = Some(Instant::now());
        });
    }

    pub fn is_interacting(&self) -> bool {
        self.state.borrow().interacting > 0
    }

    /// Resolves once nothing is in progress and nothing has happened for `delay`.
    pub async fn wait_idle(&self, delay: Duration) {
        let mut changes = self.state.subscribe();
        loop {
            let activity = *changes.borrow_and_update();
            if activity.interacting == 0 {
                let Some(last) = activity.last else {
                    return;
                };
                let deadline = last + delay;
                if Instant::now() >= deadline {
                    return;
                }
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {}
                    changed = changes.changed() => if changed.is_err() { return },
                }
            } else if changes.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Ends its interaction when dropped.
#[must_use = "the interaction ends when the guard is dropped"]
#[derive(Debug)]
pub struct InteractionGuard {
    monitor: ActivityMonitor,
}

impl Drop for InteractionGuard {
    fn drop(&mut self) {
        self.monitor.end();
    }
}

type Slot = watch::Sender<Option<Arc<Dataset>>>;

struct GateInner {
    slot: Arc<Slot>,
    task: JoinHandle<()>,
}

impl Drop for GateInner {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Puts datasets on a [`Surface`] once the user is idle. Only the newest submitted dataset is ever
/// applied; anything it superseded is dropped.
#[derive(Clone)]
pub struct ApplyGate {
    inner: Arc<GateInner>,
}

impl ApplyGate {
    /// Must be called from within a tokio runtime. The gate task stops when the last clone of the
    /// gate is dropped.
    pub fn spawn<S: Surface>(surface: S, activity: ActivityMonitor, idle_delay: Duration) -> Self {
        let slot: Arc<Slot> = Arc::new(watch::Sender::new(None));
        let task = tokio::spawn(apply_when_idle(surface, slot.clone(), activity, idle_delay));
        Self {
            inner: Arc::new(GateInner { slot, task }),
        }
    }

    /// Queue `dataset` for the screen, replacing whatever was waiting.
    pub fn submit(&self, dataset: Dataset) {
        if self.inner.slot.send_replace(Some(Arc::new(dataset))).is_some() {
            log::debug!("Superseded a dataset waiting for the screen");
        }
    }

    /// Swap in `dataset` only if something is already waiting. Returns whether it did.
    pub fn refresh_pending(&self, dataset: Dataset) -> bool {
        let mut dataset = Some(dataset);
        self.inner.slot.send_if_modified(|pending| match pending {
            Some(_) => {
                *pending = dataset.take().map(Arc::new);
                true
            }
            None => false,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.inner.slot.borrow().is_some()
    }
}

async fn apply_when_idle<S: Surface>(
    mut surface: S,
    slot: Arc<Slot>,
    activity: ActivityMonitor,
    idle_delay: Duration,
) {
    let mut pending = slot.subscribe();
    loop {
        if pending.wait_for(Option::is_some).await.is_err() {
            return;
        }
        activity.wait_idle(idle_delay).await;

        if let Some(dataset) = slot.send_replace(None) {
            focus::refresh(&mut surface, &dataset);
        }
    }
}
