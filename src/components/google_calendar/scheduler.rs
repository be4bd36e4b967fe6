use super::sync::{SyncEngine, SyncRequest};
use crate::error::SyncResult;
use chrono::Utc;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Result of an on-demand trigger
#[derive(Debug)]
pub enum TriggerOutcome {
    /// A background pass was started
    Started(JoinHandle<()>),
    /// A trigger fired too recently, nothing started
    Debounced,
    /// A pass is already running, nothing started
    InProgress,
}

impl TriggerOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, TriggerOutcome::Started(_))
    }
}

struct Timer {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Runs sync passes on a fixed interval and on demand
pub struct SyncScheduler {
    engine: Arc<SyncEngine>,
    debounce: Duration,
    timer: Mutex<Option<Timer>>,
    last_trigger: StdMutex<Option<Instant>>,
}

impl SyncScheduler {
    pub fn new(engine: Arc<SyncEngine>, debounce: Duration) -> Self {
        Self {
            engine,
            debounce,
            timer: Mutex::new(None),
            last_trigger: StdMutex::new(None),
        }
    }

    /// Start the interval timer; the first pass runs immediately
    pub async fn start(&self) {
        let mut timer = self.timer.lock().await;
        if timer.is_some() {
            warn!("Calendar sync scheduler is already running, skipping start");
            return;
        }
        *timer = Some(self.spawn_timer(true));
    }

    /// Cancel the timer, waiting for an in-flight pass to finish
    pub async fn stop(&self) {
        let timer = self.timer.lock().await.take();
        if let Some(timer) = timer {
            timer.cancel.cancel();
            if let Err(e) = timer.task.await {
                error!("Calendar sync timer task failed: {}", e);
            }
            info!("Calendar sync scheduler stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.timer.lock().await.is_some()
    }

    /// Change the interval, restarting the timer when it is running
    pub async fn set_interval_minutes(&self, minutes: u64) -> SyncResult<()> {
        self.engine.set_interval_minutes(minutes)?;
        info!("Calendar sync interval set to {} minute(s)", minutes);

        let mut timer = self.timer.lock().await;
        if let Some(old) = timer.take() {
            old.cancel.cancel();
            if let Err(e) = old.task.await {
                error!("Calendar sync timer task failed: {}", e);
            }
            // Full new period before the next pass
            *timer = Some(self.spawn_timer(false));
        }
        Ok(())
    }

    /// Whether the last complete pass is older than the interval
    pub async fn is_stale(&self) -> bool {
        match self.engine.global_marker().await {
            Some(marker) => {
                let age = Utc::now()
                    .signed_duration_since(marker)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                age >= self.engine.interval()
            }
            None => true,
        }
    }

    /// Start a background pass unless one is running or a trigger fired within
    /// the debounce window.
    ///
    /// Fresh triggers are explicit recovery requests and skip the debounce.
    pub fn trigger(&self, request: SyncRequest) -> TriggerOutcome {
        if self.engine.is_syncing() {
            debug!("Sync trigger ignored, a pass is already running");
            return TriggerOutcome::InProgress;
        }

        let now = Instant::now();
        if let Ok(mut last_trigger) = self.last_trigger.lock() {
            if !request.fresh {
                if let Some(previous) = *last_trigger {
                    if now.duration_since(previous) < self.debounce {
                        debug!("Sync trigger ignored, previous trigger was too recent");
                        return TriggerOutcome::Debounced;
                    }
                }
            }
            *last_trigger = Some(now);
        }

        let engine = Arc::clone(&self.engine);
        TriggerOutcome::Started(tokio::spawn(async move {
            if let Err(e) = engine.run_pass(request).await {
                warn!("Triggered calendar sync failed: {}", e);
            }
        }))
    }

    fn spawn_timer(&self, immediate: bool) -> Timer {
        let period = self.engine.interval().max(Duration::from_secs(1));
        let now = Instant::now();
        let first_tick = if immediate {
            now
        } else {
            now.checked_add(period).unwrap_or(now)
        };
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_timer(
            Arc::clone(&self.engine),
            first_tick,
            period,
            cancel.clone(),
        ));
        info!("Calendar sync scheduled every {} second(s)", period.as_secs());
        Timer { cancel, task }
    }
}

/// Timer loop; a running pass is never interrupted
async fn run_timer(
    engine: Arc<SyncEngine>,
    first_tick: Instant,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval_at(first_tick, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = engine.run_pass(SyncRequest::scheduled()).await {
                    error!("Scheduled calendar sync failed: {}", e);
                }
            }
        }
    }
}
