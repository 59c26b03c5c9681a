//! # Visibility Controller
//!
//! Polling is pointless while nobody is looking at the data. The host (a browser
//! page, a desktop window, an operator signal on a server) reports whether its
//! consumer is [`Visibility::Visible`] or [`Visibility::Hidden`], and every poll
//! loop reacts:
//!
//! - **Hidden**: loops waiting on a timer drop it and pause. A loop that is in
//!   the middle of a fetch finishes it but does not schedule another one.
//! - **Visible**: paused loops restart after a short fixed delay instead of
//!   waiting out their full interval.
//!
//! The state lives in a `tokio::sync::watch` channel. A single `send` updates the
//! value for every observer at once, so all loops see the same transition
//! before any of them re-evaluates its timer. Each loop holds exactly one
//! [`VisibilityObserver`] for its lifetime; dropping it deregisters the loop.
//!
//! A process-wide instance is available through [`VisibilityController::global`].
//! Hosts without a notion of visibility (servers, CLIs) simply never call
//! [`VisibilityController::set`], which leaves everything visible.

use std::sync::Arc;

use static_init::dynamic;
use tokio::sync::watch;

/// Whether the consumer of the feeds is currently active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    /// Consumer is active; polling proceeds.
    Visible,
    /// Consumer is inactive; no fetch may start.
    Hidden,
}

#[dynamic]
static GLOBAL_VISIBILITY: Arc<VisibilityController> = Arc::new(VisibilityController::new());

/// Broadcasts visibility transitions to all registered poll loops.
#[derive(Debug)]
pub struct VisibilityController {
    state: watch::Sender<Visibility>,
}

impl VisibilityController {
    /// A controller that starts out visible.
    pub fn new() -> Self {
        Self::with_state(Visibility::Visible)
    }

    /// A controller with an explicit initial state.
    pub fn with_state(initial: Visibility) -> Self {
        let (state, _) = watch::channel(initial);
        Self { state }
    }

    /// The process-wide controller shared by every registry that does not inject
    /// its own.
    pub fn global() -> Arc<VisibilityController> {
        Arc::clone(&*GLOBAL_VISIBILITY)
    }

    /// Records a host visibility event. Repeating the current state is ignored.
    pub fn set(&self, visibility: Visibility) {
        let changed = self.state.send_if_modified(|current| {
            if *current == visibility {
                false
            } else {
                *current = visibility;
                true
            }
        });
        if changed {
            log::info!(
                "Visibility changed to {:?}; notifying {} poll loop(s).",
                visibility,
                self.state.receiver_count()
            );
        }
    }

    /// Current state.
    pub fn current(&self) -> Visibility {
        *self.state.borrow()
    }

    /// Shorthand for `current() == Visibility::Hidden`.
    pub fn is_hidden(&self) -> bool {
        self.current() == Visibility::Hidden
    }

    /// Registers a new observer. The observer deregisters itself when dropped.
    pub fn observe(&self) -> VisibilityObserver {
        VisibilityObserver {
            rx: self.state.subscribe(),
            closed: false,
        }
    }

    /// Number of live observers, i.e. poll loops that have not been disposed.
    pub fn observer_count(&self) -> usize {
        self.state.receiver_count()
    }
}

impl Default for VisibilityController {
    fn default() -> Self {
        Self::new()
    }
}

/// One poll loop's registration with a [`VisibilityController`].
#[derive(Debug)]
pub struct VisibilityObserver {
    rx: watch::Receiver<Visibility>,
    closed: bool,
}

impl VisibilityObserver {
    /// Current state, marking it as seen.
    pub fn current(&mut self) -> Visibility {
        *self.rx.borrow_and_update()
    }

    /// `true` while the host is hidden.
    pub fn is_hidden(&mut self) -> bool {
        self.current() == Visibility::Hidden
    }

    /// Waits for the next transition and returns the new state.
    ///
    /// If the controller has been dropped no transition can ever arrive; the
    /// last known state is kept and this future never resolves.
    pub async fn changed(&mut self) -> Visibility {
        if !self.closed && self.rx.changed().await.is_ok() {
            return self.current();
        }
        self.closed = true;
        std::future::pending().await
    }
}
