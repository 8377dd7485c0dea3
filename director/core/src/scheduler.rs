//! Debounced Apply Scheduler
//!
//! Turns a burst of change signals into as few device applies as possible,
//! with at most one apply in flight.
//!
//! # State machine
//!
//! ```text
//!            signal                 apply starts
//!   ┌──────┐ ──────► ┌─────────┐ ─────────────► ┌──────────────────────┐
//!   │ Idle │         │ Pending │                │ InFlight { rerun }   │
//!   └──────┘ ◄────── └─────────┘ ◄───────────── └──────────────────────┘
//!      ▲   finished, rerun = false   finished,       │ signal: rerun = true
//!      └─────────────────────────────rerun = true────┘
//! ```
//!
//! Signals raised in the same scheduler tick are coalesced: before applying,
//! the task yields once and drains every queued signal. Signals arriving
//! while an apply is in flight set `rerun`, so exactly one more apply follows
//! and sees the latest snapshot.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::device::{DeviceClient, DeviceExecutor, DeviceOutcome};
use crate::events::Snapshot;
use crate::relay::SnapshotRelay;
use crate::rules::{Action, RuleEngine};
use crate::store::{ChangeListener, EventStore};

// ============================================================================
// State
// ============================================================================

/// Scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerState {
    /// Nothing to do
    #[default]
    Idle,
    /// An apply will start shortly
    Pending,
    /// An apply is running
    InFlight {
        /// A signal arrived during the apply; run once more afterwards
        rerun: bool,
    },
}

impl SchedulerState {
    /// Transition for an incoming change signal
    #[must_use]
    pub fn on_schedule(self) -> Self {
        match self {
            Self::Idle | Self::Pending => Self::Pending,
            Self::InFlight { .. } => Self::InFlight { rerun: true },
        }
    }

    /// Transition when an apply begins
    #[must_use]
    pub fn on_apply_started(self) -> Self {
        Self::InFlight { rerun: false }
    }

    /// Transition when an apply completes, successfully or not
    #[must_use]
    pub fn on_apply_finished(self) -> Self {
        match self {
            Self::InFlight { rerun: true } => Self::Pending,
            _ => Self::Idle,
        }
    }
}

// ============================================================================
// Signals
// ============================================================================

/// Fire-and-forget trigger for the scheduler
///
/// Cloneable and callable from any task.
#[derive(Debug, Clone)]
pub struct ScheduleHandle {
    tx: mpsc::UnboundedSender<()>,
}

/// Receiving side of [`ScheduleHandle`], owned by the scheduler task
#[derive(Debug)]
pub struct ScheduleSignals {
    rx: mpsc::UnboundedReceiver<()>,
}

impl ScheduleHandle {
    /// Create a connected handle/receiver pair
    #[must_use]
    pub fn channel() -> (Self, ScheduleSignals) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, ScheduleSignals { rx })
    }

    /// Request an apply cycle
    pub fn schedule_update(&self) {
        // The scheduler being gone only happens at shutdown.
        let _ = self.tx.send(());
    }
}

impl ChangeListener for ScheduleHandle {
    fn changed(&self) {
        self.schedule_update();
    }
}

impl ScheduleSignals {
    /// Wait for the next signal; `None` once every handle is dropped
    pub async fn recv(&mut self) -> Option<()> {
        self.rx.recv().await
    }

    /// Take one queued signal without waiting
    pub fn try_recv(&mut self) -> Option<()> {
        self.rx.try_recv().ok()
    }

    /// Discard all queued signals, returning how many there were
    pub fn drain(&mut self) -> usize {
        let mut count = 0;
        while self.try_recv().is_some() {
            count += 1;
        }
        count
    }
}

/// Signal `handle` every `every`
///
/// The first tick fires after one full period.
pub fn spawn_nudge(handle: ScheduleHandle, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + every;
        let mut ticker = tokio::time::interval_at(start, every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            debug!("Periodic nudge");
            handle.schedule_update();
        }
    })
}

// ============================================================================
// Apply cycle
// ============================================================================

/// How one apply step ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// No rule matched; the device was left alone
    NoAction,
    /// The action was executed
    Applied,
    /// The action was already in effect
    Unchanged,
    /// The device is disconnected
    Deferred,
    /// The device reported an error
    Failed(String),
}

/// Summary of one apply step, sent to the observer channel
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyReport {
    /// Snapshot the rules were evaluated against
    pub snapshot: Snapshot,
    /// Selected action, if any
    pub action: Option<Action>,
    /// Result of the step
    pub outcome: StepOutcome,
}

/// Scheduler task state
pub struct ApplyScheduler<E> {
    signals: ScheduleSignals,
    signals_open: bool,
    store: EventStore,
    rules: Arc<RuleEngine>,
    device: DeviceClient<E>,
    relay: Option<SnapshotRelay>,
    observer: Option<mpsc::UnboundedSender<ApplyReport>>,
    state: SchedulerState,
}

impl<E: DeviceExecutor> ApplyScheduler<E> {
    /// Create a scheduler; nothing runs until [`spawn`](Self::spawn)
    pub fn new(
        signals: ScheduleSignals,
        store: EventStore,
        rules: Arc<RuleEngine>,
        device: DeviceClient<E>,
    ) -> Self {
        Self {
            signals,
            signals_open: true,
            store,
            rules,
            device,
            relay: None,
            observer: None,
            state: SchedulerState::Idle,
        }
    }

    /// Publish every evaluated snapshot through `relay`
    #[must_use]
    pub fn with_relay(mut self, relay: SnapshotRelay) -> Self {
        self.relay = Some(relay);
        self
    }

    /// Send an [`ApplyReport`] after every step
    #[must_use]
    pub fn with_observer(mut self, observer: mpsc::UnboundedSender<ApplyReport>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Run on a new task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run until every [`ScheduleHandle`] is dropped
    pub async fn run(mut self) {
        info!(rules = self.rules.rules().len(), "Scheduler started");
        loop {
            if self.state == SchedulerState::Idle {
                if self.signals.recv().await.is_none() {
                    break;
                }
                self.state = self.state.on_schedule();
            }

            // Let same-tick mutations land, then fold their signals into
            // this cycle.
            tokio::task::yield_now().await;
            let coalesced = self.signals.drain();
            if coalesced > 0 {
                debug!(coalesced, "Coalesced change signals");
            }

            self.state = self.state.on_apply_started();
            self.apply_step().await;
            self.state = self.state.on_apply_finished();

            if !self.signals_open && self.state == SchedulerState::Idle {
                break;
            }
        }
        debug!("Scheduler stopped");
    }

    async fn apply_step(&mut self) {
        let snapshot = self.store.snapshot();
        if let Some(relay) = &self.relay {
            relay.publish(&snapshot);
        }

        let action = self.rules.evaluate(&snapshot);
        let outcome = match &action {
            None => {
                debug!(events = snapshot.len(), "No rule matched, leaving device unchanged");
                StepOutcome::NoAction
            }
            Some(action) => {
                let apply = self.device.apply(action);
                tokio::pin!(apply);
                let result = loop {
                    tokio::select! {
                        result = &mut apply => break result,
                        signal = self.signals.recv(), if self.signals_open => match signal {
                            Some(()) => self.state = self.state.on_schedule(),
                            None => self.signals_open = false,
                        },
                    }
                };
                match result {
                    Ok(DeviceOutcome::Applied) => StepOutcome::Applied,
                    Ok(DeviceOutcome::Unchanged) => StepOutcome::Unchanged,
                    Ok(DeviceOutcome::Deferred) => {
                        debug!(action = %action, "Device not connected, deferring");
                        StepOutcome::Deferred
                    }
                    Err(e) => {
                        warn!(action = %action, error = %e, "Apply failed");
                        StepOutcome::Failed(e.to_string())
                    }
                }
            }
        };

        if let Some(observer) = &self.observer {
            let _ = observer.send(ApplyReport {
                snapshot,
                action,
                outcome,
            });
        }
    }
}
