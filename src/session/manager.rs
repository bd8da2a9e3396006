use super::*;

/// Returned by [`SessionPool::stop`].
const STOPPED_MESSAGE: &str = "Scheduler stopped \nConnection closed by foreign host.";

struct PoolInner {
    /// Shared by operations that add or remove sessions, exclusive for
    /// `stop` and `clear`.
    lifecycle: RwLock<()>,
    registry: Arc<SessionRegistry>,
    establisher: Establisher,
    scheduler: Scheduler,
    settings: PoolSettings,
}

/// Owns the live sessions, the establishment workers and the schedule.
///
/// Cloneable; all clones share the same pool. Every operation that adds or
/// removes sessions rebuilds the scheduler's tick task.
#[derive(Clone)]
pub struct SessionPool {
    inner: Arc<PoolInner>,
}

impl SessionPool {
    /// Creates a pool over `provider` with default settings.
    pub fn new(provider: Arc<dyn TransportProvider>) -> Self {
        Self::with_settings(provider, PoolSettings::default())
    }

    pub fn with_settings(provider: Arc<dyn TransportProvider>, settings: PoolSettings) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let establisher = Establisher::new(provider, registry.clone(), &settings);
        Self {
            inner: Arc::new(PoolInner {
                lifecycle: RwLock::new(()),
                registry,
                establisher,
                scheduler: Scheduler::new(),
                settings,
            }),
        }
    }

    /// Creates a pool dialing jump hosts over SSH.
    pub fn over_ssh(security_options: ConnectionSecurityOptions, settings: PoolSettings) -> Self {
        Self::with_settings(Arc::new(SshTransport::new(security_options)), settings)
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.inner.settings
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.inner.registry
    }

    /// Establishes every entry concurrently and arms the tick task.
    ///
    /// Returns one summary per entry, in completion order.
    pub async fn connect(&self, batch: SessionBatch) -> Result<Vec<ConnectionSummary>, ConnectError> {
        let specs = batch.into_specs()?;
        let _lifecycle = self.inner.lifecycle.read().await;
        debug!("Connecting {} sessions", specs.len());
        let summaries = self.inner.establisher.establish_all(specs).await;
        self.rearm().await;
        Ok(summaries)
    }

    /// Establishes entries one by one, last entry first, and re-arms.
    pub async fn add(&self, batch: SessionBatch) -> Result<Vec<ConnectionSummary>, ConnectError> {
        let specs = batch.into_specs()?;
        let _lifecycle = self.inner.lifecycle.read().await;
        debug!("Adding {} sessions", specs.len());
        let summaries = self.inner.establisher.establish_each(specs).await;
        self.rearm().await;
        Ok(summaries)
    }

    /// Starts (or restarts) the recurring tick.
    pub async fn configure_schedule(&self, config: ScheduleConfig) -> Result<String, ConnectError> {
        self.inner.scheduler.configure(&config).await.inspect_err(|e| {
            warn!("Rejected schedule {config:?}: {e}");
        })
    }

    /// Live sessions with their current transport state.
    pub async fn list(&self) -> Vec<SessionStatus> {
        self.inner.registry.list().await
    }

    /// Tears down and forgets the sessions named by `ids`.
    pub async fn remove(&self, ids: &[String]) -> String {
        let _lifecycle = self.inner.lifecycle.read().await;
        let message = self
            .inner
            .registry
            .remove(ids, &self.inner.settings.timings)
            .await;
        self.rearm().await;
        message
    }

    /// Tears down every session, halts the schedule and clears the pool.
    ///
    /// Waits for in-flight `connect`, `add` and `remove` calls to finish
    /// first. The first teardown failure aborts the stop; sessions closed
    /// before it stay closed.
    pub async fn stop(&self) -> Result<String, ConnectError> {
        let _lifecycle = self.inner.lifecycle.write().await;
        let closed = self
            .inner
            .registry
            .shutdown_all(&self.inner.settings.timings)
            .await?;
        self.inner.scheduler.halt().await;
        self.inner.establisher.shutdown().await;
        self.clear_halted().await?;
        info!("Pool stopped, {closed} sessions closed");
        Ok(STOPPED_MESSAGE.to_string())
    }

    /// Forgets the tick task, the request backlog and all sessions.
    ///
    /// Only permitted once the schedule has been halted.
    pub async fn clear(&self) -> Result<String, ConnectError> {
        let _lifecycle = self.inner.lifecycle.write().await;
        self.clear_halted().await
    }

    async fn clear_halted(&self) -> Result<String, ConnectError> {
        if self.inner.scheduler.state().await != SchedulerState::Halted {
            return Err(ConnectError::ScheduleRunning);
        }
        self.inner.scheduler.reset_task();
        self.inner.establisher.reset_backlog().await;
        self.inner.registry.clear().await;
        Ok("OK".to_string())
    }

    pub async fn scheduler_state(&self) -> SchedulerState {
        self.inner.scheduler.state().await
    }

    /// Number of requests received since the last clear.
    pub async fn backlog_len(&self) -> usize {
        self.inner.establisher.backlog_len().await
    }

    pub async fn len(&self) -> usize {
        self.inner.registry.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.registry.is_empty().await
    }

    /// Runs one tick immediately, outside the timer.
    ///
    /// Returns `None` when no tick task has been armed.
    pub async fn tick_now(&self) -> Option<usize> {
        let task = self.inner.scheduler.current_task()?;
        Some(task.run().await)
    }

    async fn rearm(&self) {
        if self.inner.registry.is_empty().await {
            return;
        }
        self.inner
            .scheduler
            .arm(
                self.inner.registry.clone(),
                self.inner.settings.timings.clone(),
            )
            .await;
    }
}
