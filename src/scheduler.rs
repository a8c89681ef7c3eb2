use crate::{
    engine::{Engine, FetchSummary},
    error::EngineError,
    schedule::{self, ScheduleError},
};
use cron::Schedule;
use std::sync::Arc;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::Instant,
};
use tracing::{error, info, instrument, warn};

/// Refresh the engine snapshot on a cron schedule.
///
/// The schedule accepts standard 5-field expressions and 6-field expressions with a leading
/// seconds field. Fire times are computed from the engine clock.
pub struct RefreshScheduler {
    engine: Arc<Engine>,
    expression: String,
    schedule: Schedule,
    shutdown_tx: broadcast::Sender<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshScheduler {
    pub fn new(engine: Arc<Engine>, expression: &str) -> Result<Self, ScheduleError> {
        let schedule = schedule::parse_refresh(expression)?;
        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            engine,
            expression: expression.to_owned(),
            schedule,
            shutdown_tx,
            handle: Mutex::new(None),
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Refresh the snapshot now.
    #[inline]
    pub async fn tick(&self) -> Result<FetchSummary, EngineError> {
        self.engine.fetch().await
    }

    /// Spawn the refresh loop on the current Tokio runtime.
    #[instrument(skip(self), fields(expression = %self.expression))]
    pub async fn start(&self) {
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            warn!("refresh scheduler is already started");
            return;
        }

        let engine = Arc::clone(&self.engine);
        let schedule = self.schedule.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        *handle = Some(tokio::spawn(run(engine, schedule, shutdown_rx)));

        info!("refresh scheduler started");
    }

    /// Stop the refresh loop and wait for it to finish.
    #[instrument(skip(self), fields(expression = %self.expression))]
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(error) = handle.await {
                error!(%error, "refresh loop ended abnormally");
            }
        }

        info!("refresh scheduler shut down");
    }
}

async fn run(engine: Arc<Engine>, schedule: Schedule, mut shutdown_rx: broadcast::Receiver<()>) {
    let clock = engine.clock();
    let origin = clock.now();
    let started = Instant::now();

    loop {
        let elapsed = chrono::Duration::from_std(started.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        let now = origin + elapsed;
        let Some(next) = schedule::next_after(&schedule, &now) else {
            warn!("refresh schedule has no upcoming run");
            break;
        };
        let delay = (next - now).to_std().unwrap_or_default();

        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                if let Err(error) = engine.fetch().await {
                    error!(%error, "failed to refresh the flags in period");
                }
            }
            _ = shutdown_rx.recv() => break,
        }
    }
}
