//! Adaptation actor: compares telemetry snapshots every adaptation interval
//! while adaptive learning is enabled.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::orchestration::context::SchedulerContext;
use crate::qlog_debug;

use super::ActorHandle;

pub struct AdaptationActor {
    ctx: Arc<SchedulerContext>,
}

impl AdaptationActor {
    pub fn new(ctx: Arc<SchedulerContext>) -> Self {
        Self { ctx }
    }

    pub fn spawn(self, parent: &CancellationToken) -> ActorHandle {
        let cancel = parent.child_token();
        let cancel_clone = cancel.clone();

        qlog_debug!("AdaptationActor::spawn");

        let join = tokio::spawn(async move {
            loop {
                let (period, enabled) = {
                    let config = self.ctx.config.read().await;
                    (config.adaptation_interval(), config.adaptive_learning)
                };
                tokio::select! {
                    _ = cancel_clone.cancelled() => {
                        qlog_debug!("AdaptationActor cancelled");
                        break;
                    }
                    _ = tokio::time::sleep(period) => {
                        if !enabled {
                            continue;
                        }
                        let changes = self.ctx.adapt().await;
                        if !changes.is_empty() {
                            qlog_debug!("AdaptationActor: applied {} changes", changes.len());
                        }
                    }
                }
            }
        });

        ActorHandle::new("adaptation", cancel, join)
    }
}
