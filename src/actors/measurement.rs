//! Measurement actor: runs a measurement cycle every measurement interval.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::orchestration::context::SchedulerContext;
use crate::orchestration::measurement;
use crate::{qlog_debug, qlog_trace};

use super::ActorHandle;

pub struct MeasurementActor {
    ctx: Arc<SchedulerContext>,
}

impl MeasurementActor {
    pub fn new(ctx: Arc<SchedulerContext>) -> Self {
        Self { ctx }
    }

    pub fn spawn(self, parent: &CancellationToken) -> ActorHandle {
        let cancel = parent.child_token();
        let cancel_clone = cancel.clone();

        qlog_debug!("MeasurementActor::spawn");

        let join = tokio::spawn(async move {
            loop {
                let period = self.ctx.config.read().await.measurement_interval();
                tokio::select! {
                    _ = cancel_clone.cancelled() => {
                        qlog_debug!("MeasurementActor cancelled");
                        break;
                    }
                    _ = tokio::time::sleep(period) => {
                        let report = measurement::run_cycle(&self.ctx).await;
                        qlog_trace!(
                            "MeasurementActor: {} measured, {} failed in {:.1}ms",
                            report.measured,
                            report.failures,
                            report.duration_ms
                        );
                    }
                }
            }
        });

        ActorHandle::new("measurement", cancel, join)
    }
}
