//! Periodic background actors.
//!
//! Each actor is an independent tokio task with its own child cancellation
//! token. Actors re-read their period from live configuration on every
//! tick, so adaptation of intervals takes effect without a restart:
//! - Measurement (MeasurementActor)
//! - Coherence maintenance (CoherenceActor)
//! - Adaptation (AdaptationActor)
//!
//! A slow cycle in one actor never delays the others.

pub mod adaptation;
pub mod coherence;
pub mod measurement;

use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

pub use adaptation::AdaptationActor;
pub use coherence::CoherenceActor;
pub use measurement::MeasurementActor;

/// Handle to a running actor, used for graceful shutdown.
pub struct ActorHandle {
    name: &'static str,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl ActorHandle {
    pub fn new(name: &'static str, cancel: CancellationToken, join: JoinHandle<()>) -> Self {
        Self { name, cancel, join }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the actor to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Check if shutdown has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.join.abort_handle()
    }

    /// Wait for the actor task to exit.
    pub async fn join(self) -> Result<()> {
        self.join.await.map_err(|e| Error::TaskJoin(e.to_string()))
    }
}

impl std::fmt::Debug for ActorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorHandle")
            .field("name", &self.name)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
