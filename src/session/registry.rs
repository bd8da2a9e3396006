//! The live session pool.
//!
//! Sessions are keyed by identifier. Anything that tears sessions down first
//! copies the matching entries out of the map, works on the copies without
//! holding the map lock, and only then deletes by key.

use super::*;

/// Live sessions, shared by the establisher, the scheduler and the caller.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, (u64, Arc<Session>)>>,
    next_seq: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: Arc<Session>) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Registering session {} ({} via jump host port {})",
            session.id(),
            session.addr(),
            session.port()
        );
        self.sessions
            .write()
            .await
            .insert(session.id(), (seq, session));
    }

    /// A stable copy of the pool in registration order.
    pub async fn snapshot(&self) -> Vec<Arc<Session>> {
        let mut entries: Vec<(u64, Arc<Session>)> =
            self.sessions.read().await.values().cloned().collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, session)| session).collect()
    }

    /// Current sessions with their live transport state.
    pub async fn list(&self) -> Vec<SessionStatus> {
        self.snapshot()
            .await
            .iter()
            .map(|session| session.status())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drops a session from the pool without tearing it down.
    pub async fn evict(&self, id: &Uuid) -> Option<Arc<Session>> {
        self.sessions
            .write()
            .await
            .remove(id)
            .map(|(_, session)| session)
    }

    /// Tears down and removes the sessions whose identifiers are in `ids`.
    ///
    /// Returns one `removed : <host> : <port>` line per removed session;
    /// unknown identifiers are ignored.
    pub async fn remove(&self, ids: &[String], timings: &ProtocolTimings) -> String {
        let wanted: HashSet<Uuid> = ids
            .iter()
            .filter_map(|id| match Uuid::parse_str(id.trim()) {
                Ok(id) => Some(id),
                Err(e) => {
                    debug!("Ignoring malformed session id '{id}': {e}");
                    None
                }
            })
            .collect();

        let targets: Vec<Arc<Session>> = self
            .snapshot()
            .await
            .into_iter()
            .filter(|session| wanted.contains(&session.id()))
            .collect();

        let mut message = String::new();
        for session in targets {
            if let Err(e) = session.shutdown(timings).await {
                error!("{e}");
            }
            if self.evict(&session.id()).await.is_some() {
                message.push_str(&format!(
                    "removed : {} : {}\n",
                    session.host(),
                    session.telnet_port()
                ));
                info!(
                    "Removed session with IP {} and Telnet port {}",
                    session.host(),
                    session.telnet_port()
                );
            }
            if self.is_empty().await {
                break;
            }
        }
        message
    }

    /// Tears down every session, stopping at the first failure.
    ///
    /// Sessions stay in the pool; sessions already closed stay closed.
    pub async fn shutdown_all(&self, timings: &ProtocolTimings) -> Result<usize, ConnectError> {
        let sessions = self.snapshot().await;
        for session in &sessions {
            if let Err(e) = session.shutdown(timings).await {
                error!("Error while disconnecting {}: {e}", session.addr());
                return Err(e);
            }
        }
        Ok(sessions.len())
    }

    pub async fn clear(&self) {
        self.sessions.write().await.clear();
    }
}
