//! Concurrent session establishment.
//!
//! Every entry runs on a worker bounded by a semaphore. Establishing a
//! session also registers it; the two steps are not separable.

use super::*;

/// Establishes one entry: transport, terminal channel, telnet negotiation.
#[derive(Clone)]
struct EstablishTask {
    provider: Arc<dyn TransportProvider>,
    registry: Arc<SessionRegistry>,
    timings: ProtocolTimings,
    policy: IdleNegotiationPolicy,
}

impl EstablishTask {
    async fn run(self, spec: SessionSpec) -> Result<Arc<Session>, ConnectError> {
        let device_addr = spec.credentials.addr();
        let transport = self
            .provider
            .connect(&spec.credentials, self.timings.connect_timeout())
            .await
            .map_err(|e| {
                error!("Failed to establish connection to {device_addr}: {e}");
                match e {
                    ConnectError::TransportError(_) => e,
                    other => ConnectError::TransportError(other.to_string()),
                }
            })?;
        info!("Connection established: {device_addr}");

        let (tunnel, tunnel_connected) = match transport.open_terminal_channel().await {
            Ok(channel) => {
                let mut tunnel = Tunnel::new(channel);
                let outcome = connect_tunnel(
                    &mut tunnel,
                    &spec.credentials.host,
                    spec.telnet_port,
                    &self.timings,
                )
                .await;
                debug!(
                    "{device_addr} telnet {}:{} negotiation: {outcome:?}",
                    spec.credentials.host, spec.telnet_port
                );
                (Some(tunnel), outcome.is_connected(self.policy))
            }
            Err(e) => {
                error!("{device_addr} failed to open terminal channel: {e}");
                (None, false)
            }
        };

        let session = Arc::new(Session::new(
            Uuid::new_v4(),
            &spec,
            transport,
            tunnel,
            tunnel_connected,
        ));
        self.registry.insert(session.clone()).await;
        Ok(session)
    }

    /// Runs on a worker slot; failures collapse into a disconnected summary.
    async fn summarize(self, workers: Arc<Semaphore>, spec: SessionSpec) -> ConnectionSummary {
        let failed = ConnectionSummary {
            host: spec.credentials.host.clone(),
            port: spec.telnet_port,
            connected: false,
        };
        let Ok(_permit) = workers.acquire_owned().await else {
            warn!("Worker pool closed before {} could run", spec.credentials.addr());
            return failed;
        };
        match self.run(spec).await {
            Ok(session) => session.summary(),
            Err(_) => failed,
        }
    }
}

/// Submits session requests to the worker pool.
pub(super) struct Establisher {
    task: EstablishTask,
    pool_size: usize,
    workers: Mutex<Arc<Semaphore>>,
    /// Every entry ever requested since the last clear, in request order.
    backlog: Mutex<Vec<SessionSpec>>,
}

impl Establisher {
    pub(super) fn new(
        provider: Arc<dyn TransportProvider>,
        registry: Arc<SessionRegistry>,
        settings: &PoolSettings,
    ) -> Self {
        let pool_size = settings.worker_threads.max(1);
        Self {
            task: EstablishTask {
                provider,
                registry,
                timings: settings.timings.clone(),
                policy: settings.idle_negotiation_policy,
            },
            pool_size,
            workers: Mutex::new(Arc::new(Semaphore::new(pool_size))),
            backlog: Mutex::new(Vec::new()),
        }
    }

    /// The worker pool, recreated if it was shut down.
    async fn workers(&self) -> Arc<Semaphore> {
        let mut workers = self.workers.lock().await;
        if workers.is_closed() {
            debug!("Recreating worker pool with {} workers", self.pool_size);
            *workers = Arc::new(Semaphore::new(self.pool_size));
        }
        workers.clone()
    }

    pub(super) async fn shutdown(&self) {
        self.workers.lock().await.close();
    }

    pub(super) async fn backlog_len(&self) -> usize {
        self.backlog.lock().await.len()
    }

    pub(super) async fn reset_backlog(&self) {
        self.backlog.lock().await.clear();
    }

    /// Runs every entry concurrently and waits for all of them.
    ///
    /// Summaries come back in completion order, one per entry.
    pub(super) async fn establish_all(&self, specs: Vec<SessionSpec>) -> Vec<ConnectionSummary> {
        let workers = self.workers().await;
        self.backlog.lock().await.extend(specs.iter().cloned());

        let mut fallbacks = Vec::with_capacity(specs.len());
        let mut set = JoinSet::new();
        for (idx, spec) in specs.into_iter().enumerate() {
            fallbacks.push(ConnectionSummary {
                host: spec.credentials.host.clone(),
                port: spec.telnet_port,
                connected: false,
            });
            let task = self.task.clone();
            let workers = workers.clone();
            set.spawn(async move { (idx, task.summarize(workers, spec).await) });
        }

        let mut seen = vec![false; fallbacks.len()];
        let mut summaries = Vec::with_capacity(fallbacks.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, summary)) => {
                    seen[idx] = true;
                    summaries.push(summary);
                }
                Err(e) => error!("Session establishment task aborted: {e}"),
            }
        }
        // Entries whose task panicked still get a summary.
        summaries.extend(
            fallbacks
                .into_iter()
                .zip(seen)
                .filter(|(_, seen)| !seen)
                .map(|(fallback, _)| fallback),
        );
        summaries
    }

    /// Runs entries one at a time, most recently appended first.
    ///
    /// Stops after the first entry whose transport could not be established.
    pub(super) async fn establish_each(&self, specs: Vec<SessionSpec>) -> Vec<ConnectionSummary> {
        let workers = self.workers().await;
        self.backlog.lock().await.extend(specs.iter().cloned());

        let mut summaries = Vec::with_capacity(specs.len());
        for spec in specs.into_iter().rev() {
            let device_addr = spec.credentials.addr();
            let failed = ConnectionSummary {
                host: spec.credentials.host.clone(),
                port: spec.telnet_port,
                connected: false,
            };
            let task = self.task.clone();
            let workers = workers.clone();
            let handle = tokio::spawn(async move {
                let Ok(_permit) = workers.acquire_owned().await else {
                    return Err(ConnectError::TransportError("worker pool closed".to_string()));
                };
                task.run(spec).await
            });
            match handle.await {
                Ok(Ok(session)) => summaries.push(session.summary()),
                Ok(Err(e)) => {
                    warn!("Stopping incremental add at {device_addr}: {e}");
                    summaries.push(failed);
                    break;
                }
                Err(e) => {
                    error!("Session establishment task for {device_addr} aborted: {e}");
                    summaries.push(failed);
                    break;
                }
            }
        }
        summaries
    }
}
