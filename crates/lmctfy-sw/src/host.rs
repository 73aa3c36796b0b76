//! Host-side lifecycle driver for the worker.
//!
//! The browser half of the contract: delivers the four signals, awaits each
//! handler's pending work before finishing the phase, and walks the worker
//! through install → waiting → activate. A worker whose install fails is
//! marked redundant and never receives fetch events.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::{
    CacheWorker, EventOutcome, FetchRequest, FetchResponse, NetworkFetch, SwError, WorkerEvent,
};

// ==================== State ====================

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WorkerState {
    /// Initial state, script loaded but not installed.
    #[default]
    Parsed,
    /// Install handler running.
    Installing,
    /// Installed, waiting to activate.
    Installed,
    /// Activate handler running.
    Activating,
    /// Active and receiving fetch events.
    Activated,
    /// Install failed; this version will never activate.
    Redundant,
}

// ==================== Events ====================

/// Events the host reports to its embedder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// The worker changed lifecycle state.
    StateChange { state: WorkerState },
    /// A client asked the waiting worker to activate immediately.
    SkipWaitingRequested,
}

// ==================== Host ====================

/// Drives one worker instance through its lifecycle.
pub struct WorkerHost<N: NetworkFetch> {
    worker: CacheWorker<N>,
    state: WorkerState,
    skip_waiting_requested: bool,
    event_tx: mpsc::UnboundedSender<HostEvent>,
}

impl<N: NetworkFetch> WorkerHost<N> {
    /// Create a host for a worker, plus a receiver for host events.
    pub fn new(worker: CacheWorker<N>) -> (Self, mpsc::UnboundedReceiver<HostEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        (
            Self {
                worker,
                state: WorkerState::Parsed,
                skip_waiting_requested: false,
                event_tx,
            },
            event_rx,
        )
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// The hosted worker.
    pub fn worker(&self) -> &CacheWorker<N> {
        &self.worker
    }

    fn set_state(&mut self, state: WorkerState) {
        trace!(?state, "worker state change");
        self.state = state;
        let _ = self.event_tx.send(HostEvent::StateChange { state });
    }

    /// Run the install phase, held pending until precaching completes.
    ///
    /// Failure makes this worker version redundant. If skip-waiting was
    /// requested while installing, activation follows immediately.
    pub async fn install(&mut self) -> Result<(), SwError> {
        if self.state != WorkerState::Parsed {
            return Err(SwError::StateError(format!(
                "cannot install from {:?}",
                self.state
            )));
        }

        self.set_state(WorkerState::Installing);
        match self.worker.dispatch(WorkerEvent::Install).await {
            Ok(_) => {
                self.set_state(WorkerState::Installed);
                if self.skip_waiting_requested {
                    self.activate().await?;
                }
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "install failed, worker is redundant");
                self.set_state(WorkerState::Redundant);
                Err(e)
            }
        }
    }

    /// Run the activate phase, held pending until stale-cache cleanup
    /// completes. Install always finishes (or fails) first.
    pub async fn activate(&mut self) -> Result<(), SwError> {
        if self.state != WorkerState::Installed {
            return Err(SwError::StateError(format!(
                "cannot activate from {:?}",
                self.state
            )));
        }

        self.set_state(WorkerState::Activating);
        self.worker.dispatch(WorkerEvent::Activate).await?;
        self.set_state(WorkerState::Activated);
        Ok(())
    }

    /// Deliver a control message from a client.
    ///
    /// A skip-waiting directive activates a waiting worker immediately, or
    /// is remembered if the worker is still installing. Everything else is
    /// a no-op.
    pub async fn post_message(&mut self, data: JsonValue) -> Result<(), SwError> {
        if let EventOutcome::SkipWaiting = self.worker.dispatch(WorkerEvent::Message(data)).await?
        {
            let _ = self.event_tx.send(HostEvent::SkipWaitingRequested);
            match self.state {
                WorkerState::Installed => self.activate().await?,
                WorkerState::Parsed | WorkerState::Installing => {
                    debug!("skip waiting requested before install completed");
                    self.skip_waiting_requested = true;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Deliver an intercepted request to the active worker.
    ///
    /// Fetch events interleave freely; the shared storage serializes access
    /// internally and no ordering holds between distinct fetches.
    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, SwError> {
        if self.state != WorkerState::Activated {
            return Err(SwError::StateError(format!(
                "no active worker (state {:?})",
                self.state
            )));
        }

        match self.worker.dispatch(WorkerEvent::Fetch(request)).await? {
            EventOutcome::Response(response) => Ok(response),
            _ => Err(SwError::StateError(
                "fetch event produced no response".to_string(),
            )),
        }
    }
}
