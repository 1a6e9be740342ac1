//! Coherence actor: decays and repairs states four times per coherence time.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::orchestration::coherence;
use crate::orchestration::context::SchedulerContext;
use crate::{qlog_debug, qlog_trace};

use super::ActorHandle;

pub struct CoherenceActor {
    ctx: Arc<SchedulerContext>,
}

impl CoherenceActor {
    pub fn new(ctx: Arc<SchedulerContext>) -> Self {
        Self { ctx }
    }

    pub fn spawn(self, parent: &CancellationToken) -> ActorHandle {
        let cancel = parent.child_token();
        let cancel_clone = cancel.clone();

        qlog_debug!("CoherenceActor::spawn");

        let join = tokio::spawn(async move {
            loop {
                let period = self.ctx.config.read().await.coherence_interval();
                tokio::select! {
                    _ = cancel_clone.cancelled() => {
                        qlog_debug!("CoherenceActor cancelled");
                        break;
                    }
                    _ = tokio::time::sleep(period) => {
                        let report = coherence::run_cycle(&self.ctx).await;
                        qlog_trace!("CoherenceActor: {:?}", report);
                    }
                }
            }
        });

        ActorHandle::new("coherence", cancel, join)
    }
}
