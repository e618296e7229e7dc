use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::playlist::{MasterPlaylist, TagTransition};

/// Periodic wall-clock poller that keeps the master's active tag in
/// sync with the time of day.
pub struct Scheduler {
    master: Arc<RwLock<MasterPlaylist>>,
    period: Duration,
    force_check: Arc<Notify>,
    on_transition: Box<dyn Fn(TagTransition) + Send + Sync>,
}

/// Cheap, cloneable handle for administrative callers to nudge the
/// scheduler into an immediate re-check.
#[derive(Clone)]
pub struct SchedulerHandle {
    force_check: Arc<Notify>,
}

impl SchedulerHandle {
    pub fn force_check(&self) {
        self.force_check.notify_one();
    }
}

impl Scheduler {
    pub fn new(
        master: Arc<RwLock<MasterPlaylist>>,
        period: Duration,
        on_transition: impl Fn(TagTransition) + Send + Sync + 'static,
    ) -> (Self, SchedulerHandle) {
        let force_check = Arc::new(Notify::new());
        let handle = SchedulerHandle { force_check: Arc::clone(&force_check) };
        let scheduler = Scheduler {
            master,
            period,
            force_check,
            on_transition: Box::new(on_transition),
        };
        (scheduler, handle)
    }

    async fn check_once(&self) {
        let transition = self.master.write().await.resolve_active_tag();
        if let Some(transition) = transition {
            (self.on_transition)(transition);
        }
    }

    /// Runs until `shutdown` is cancelled. Wakes either on the period
    /// ticker or on a forced check, whichever comes first.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(period_secs = self.period.as_secs(), "scheduler started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("scheduler shutting down");
                    return;
                }
                _ = ticker.tick() => self.check_once().await,
                _ = self.force_check.notified() => self.check_once().await,
            }
        }
    }
}
