//! Recurring command execution over the live pool.
//!
//! The timer loop reads the current [`TickTask`] from a watch channel on every
//! firing, so re-arming after sessions are added or removed takes effect on
//! the next tick without restarting the timer.

use super::*;

/// Lifecycle of the recurring schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// No tick task has been built yet.
    Unarmed,
    /// A tick task exists but no timer is firing it.
    Armed,
    /// The timer is firing the tick task.
    Running,
    /// Stopped explicitly; future firings are cancelled.
    Halted,
}

/// One pass over the live pool: run every session's command.
pub struct TickTask {
    registry: Arc<SessionRegistry>,
    timings: ProtocolTimings,
    generation: u64,
}

impl TickTask {
    pub fn new(registry: Arc<SessionRegistry>, timings: ProtocolTimings, generation: u64) -> Self {
        Self {
            registry,
            timings,
            generation,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Runs the pass and returns how many commands were executed.
    ///
    /// The first session found disconnected is dropped from the pool and the
    /// rest of the pass is abandoned.
    pub async fn run(&self) -> usize {
        let mut executed = 0;
        for session in self.registry.snapshot().await {
            match session.execute(&self.timings).await {
                Some(output) => {
                    info!(
                        "Executed command '{}' on {}. Response: {}",
                        session.command(),
                        session.addr(),
                        output.trim()
                    );
                    executed += 1;
                }
                None => {
                    warn!(
                        "{} connection not open, dropping it and ending this tick",
                        session.addr()
                    );
                    self.registry.evict(&session.id()).await;
                    return executed;
                }
            }
        }
        executed
    }
}

struct SchedulerInner {
    state: SchedulerState,
    timer: Option<JoinHandle<()>>,
    generation: u64,
}

/// Drives [`TickTask`] on a fixed-delay cadence.
pub struct Scheduler {
    inner: Mutex<SchedulerInner>,
    task: watch::Sender<Option<Arc<TickTask>>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let (task, _) = watch::channel(None);
        Self {
            inner: Mutex::new(SchedulerInner {
                state: SchedulerState::Unarmed,
                timer: None,
                generation: 0,
            }),
            task,
        }
    }

    pub async fn state(&self) -> SchedulerState {
        self.inner.lock().await.state
    }

    /// The tick task the timer will run next, if any.
    pub fn current_task(&self) -> Option<Arc<TickTask>> {
        self.task.borrow().clone()
    }

    /// Rebuilds the tick task over `registry`.
    ///
    /// A halted scheduler becomes armed again; a running one keeps its timer.
    pub async fn arm(&self, registry: Arc<SessionRegistry>, timings: ProtocolTimings) {
        let mut inner = self.inner.lock().await;
        inner.generation += 1;
        self.task.send_replace(Some(Arc::new(TickTask::new(
            registry,
            timings,
            inner.generation,
        ))));
        if matches!(
            inner.state,
            SchedulerState::Unarmed | SchedulerState::Halted
        ) {
            inner.state = SchedulerState::Armed;
        }
        debug!("Tick task rebuilt, generation {}", inner.generation);
    }

    /// Starts firing the tick task after `initial_delay`, then every `period`.
    ///
    /// Replaces a timer that is already running.
    pub async fn configure(&self, config: &ScheduleConfig) -> Result<String, ConnectError> {
        if config.period < config::MIN_SCHEDULE_PERIOD {
            return Err(ConnectError::PeriodTooLow {
                period: config.period,
                minimum: config::MIN_SCHEDULE_PERIOD,
            });
        }
        let mut inner = self.inner.lock().await;
        if inner.state == SchedulerState::Halted {
            return Err(ConnectError::SchedulerHalted);
        }
        if let Some(timer) = inner.timer.take() {
            debug!("Replacing running schedule");
            timer.abort();
        }

        let initial_delay = config.time_unit.duration(config.initial_delay);
        let period = config.time_unit.duration(config.period);
        let mut current = self.task.subscribe();
        inner.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(initial_delay).await;
            loop {
                let task = current.borrow_and_update().clone();
                if let Some(task) = task {
                    let firing = tokio::spawn(async move { task.run().await });
                    match firing.await {
                        Ok(executed) => trace!("Tick executed {executed} commands"),
                        Err(e) => error!("Scheduled tick failed: {e}"),
                    }
                }
                tokio::time::sleep(period).await;
            }
        }));
        inner.state = SchedulerState::Running;
        info!(
            "Schedule configured: initial delay {:?}, period {:?}",
            initial_delay, period
        );
        Ok("Scheduler is up and running...".to_string())
    }

    /// Cancels future firings. A tick already in progress finishes.
    pub async fn halt(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
        if inner.state != SchedulerState::Halted {
            debug!("Scheduler halted");
        }
        inner.state = SchedulerState::Halted;
    }

    /// Forgets the tick task.
    pub fn reset_task(&self) {
        self.task.send_replace(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(period: u64) -> ScheduleConfig {
        ScheduleConfig {
            initial_delay: 0,
            period,
            time_unit: TimeUnit::Seconds,
        }
    }

    #[tokio::test]
    async fn period_below_minimum_is_rejected_in_any_unit() {
        let scheduler = Scheduler::new();
        for unit in [TimeUnit::Milliseconds, TimeUnit::Seconds, TimeUnit::Hours] {
            let err = scheduler
                .configure(&ScheduleConfig {
                    initial_delay: 0,
                    period: 19,
                    time_unit: unit,
                })
                .await
                .expect_err("period 19 is too low");
            assert!(err.to_string().contains("too low"));
        }
        assert_eq!(scheduler.state().await, SchedulerState::Unarmed);
    }

    #[tokio::test]
    async fn period_at_minimum_starts_the_timer() {
        let scheduler = Scheduler::new();
        let status = scheduler.configure(&schedule(20)).await.expect("configure");
        assert_eq!(status, "Scheduler is up and running...");
        assert_eq!(scheduler.state().await, SchedulerState::Running);
        scheduler.halt().await;
    }

    #[tokio::test]
    async fn halt_is_idempotent_and_blocks_reconfiguration() {
        let scheduler = Scheduler::new();
        scheduler.configure(&schedule(20)).await.expect("configure");
        scheduler.halt().await;
        scheduler.halt().await;
        assert_eq!(scheduler.state().await, SchedulerState::Halted);
        assert!(matches!(
            scheduler.configure(&schedule(20)).await,
            Err(ConnectError::SchedulerHalted)
        ));
    }

    #[tokio::test]
    async fn arming_rebuilds_the_task_and_revives_a_halted_scheduler() {
        let scheduler = Scheduler::new();
        let registry = Arc::new(SessionRegistry::new());
        scheduler
            .arm(registry.clone(), ProtocolTimings::default())
            .await;
        assert_eq!(scheduler.state().await, SchedulerState::Armed);
        let first = scheduler.current_task().expect("task").generation();

        scheduler.halt().await;
        scheduler.arm(registry, ProtocolTimings::default()).await;
        assert_eq!(scheduler.state().await, SchedulerState::Armed);
        assert!(scheduler.current_task().expect("task").generation() > first);

        scheduler.reset_task();
        assert!(scheduler.current_task().is_none());
    }

    #[tokio::test]
    async fn tick_over_empty_pool_does_nothing() {
        let task = TickTask::new(Arc::new(SessionRegistry::new()), ProtocolTimings::default(), 1);
        assert_eq!(task.run().await, 0);
    }
}
