//! Jump-host session pool with tunneled telnet and scheduled commands.
//!
//! Each session is an SSH connection to a jump host plus a shell channel on
//! which `telnet <device> <port>` has been issued. The pool detects command
//! completion by matching expected output fragments and can re-run every
//! session's command on a fixed cadence.
//!
//! # Main Components
//!
//! - [`SessionPool`] - Orchestrator owning the registry, establisher and scheduler
//! - [`SessionRegistry`] - Live sessions keyed by identifier
//! - [`Scheduler`] - Recurring tick over the live pool
//! - [`TransportProvider`] - Seam for the secure transport ([`SshTransport`] in production)
//! - [`connect_tunnel`] / [`run_command`] - Polling read/match protocol over a [`Tunnel`]

use async_ssh2_tokio::client::{AuthMethod, Client};
use async_ssh2_tokio::{Config, ServerCheckMethod};
use async_trait::async_trait;
use log::{debug, error, info, trace, warn};
use russh::{ChannelMsg, Preferred};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::sync::{Mutex, RwLock, Semaphore, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use uuid::Uuid;

use crate::config::{self, IdleNegotiationPolicy, PoolSettings, ProtocolTimings};
use crate::error::ConnectError;

use establish::Establisher;

pub use client::SshTransport;
pub use manager::SessionPool;
pub use protocol::{
    CONNECTION_REFUSED, ESCAPE_CHARACTER, FOREIGN_HOST_CLOSED, LOGIN_PROMPT, NegotiationOutcome,
    QUIT_COMMAND, connect_tunnel, run_command,
};
pub use registry::SessionRegistry;
pub use scheduler::{Scheduler, SchedulerState, TickTask};
pub use security::{ConnectionSecurityOptions, SecurityLevel};
pub use transport::{ChannelControl, TerminalChannel, TransportHandle, TransportProvider, Tunnel};

/// Login and endpoint of a jump host.
#[derive(Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
}

impl Credentials {
    /// `user@host:port`, used as log context.
    pub fn addr(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.port)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"***")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

/// One row of a session request.
#[derive(Debug, Clone)]
pub struct SessionSpec {
    pub credentials: Credentials,
    /// Port handed to `telnet` on the jump host.
    pub telnet_port: u16,
    /// Command issued on every scheduled tick.
    pub command: String,
    /// Sentinel that marks the command's output as complete.
    pub wait_for: Option<String>,
}

/// A columnar batch of session requests, as received at the boundary.
///
/// Every list is indexed by position. `port` and `wait_fors` are optional;
/// a missing `port` list means port 22 for every entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionBatch {
    pub user_name: Vec<String>,
    pub password: Vec<String>,
    pub host: Vec<String>,
    #[serde(default)]
    pub port: Option<Vec<u16>>,
    pub telnet_port: Vec<u16>,
    pub commands: Vec<String>,
    #[serde(default)]
    pub wait_fors: Option<Vec<String>>,
}

impl SessionBatch {
    /// Builds a batch from already-paired rows.
    pub fn from_specs(specs: impl IntoIterator<Item = SessionSpec>) -> Self {
        let mut batch = SessionBatch {
            port: Some(Vec::new()),
            wait_fors: Some(Vec::new()),
            ..Default::default()
        };
        for spec in specs {
            batch.user_name.push(spec.credentials.user);
            batch.password.push(spec.credentials.password);
            batch.host.push(spec.credentials.host);
            batch.telnet_port.push(spec.telnet_port);
            batch.commands.push(spec.command);
            if let Some(ports) = batch.port.as_mut() {
                ports.push(spec.credentials.port);
            }
            if let Some(wait_fors) = batch.wait_fors.as_mut() {
                wait_fors.push(spec.wait_for.unwrap_or_default());
            }
        }
        batch
    }

    /// Number of entries, taken from the host column.
    pub fn len(&self) -> usize {
        self.host.len()
    }

    pub fn is_empty(&self) -> bool {
        self.host.is_empty()
    }

    /// Validates column lengths and pairs the columns into rows.
    pub fn into_specs(self) -> Result<Vec<SessionSpec>, ConnectError> {
        let len = self.len();
        let check = |name: &str, actual: usize| {
            if actual == len {
                Ok(())
            } else {
                Err(ConnectError::InvalidRequest(format!(
                    "{name} has {actual} entries, expected {len}"
                )))
            }
        };
        check("userName", self.user_name.len())?;
        check("password", self.password.len())?;
        check("telnetPort", self.telnet_port.len())?;
        check("commands", self.commands.len())?;
        if let Some(ports) = self.port.as_ref() {
            check("port", ports.len())?;
        }
        if let Some(wait_fors) = self.wait_fors.as_ref() {
            check("waitFors", wait_fors.len())?;
        }

        let mut ports = self.port.map(Vec::into_iter);
        let mut wait_fors = self.wait_fors.map(Vec::into_iter);
        let rows = self
            .user_name
            .into_iter()
            .zip(self.password)
            .zip(self.host)
            .zip(self.telnet_port)
            .zip(self.commands)
            .map(|((((user, password), host), telnet_port), command)| {
                let port = ports
                    .as_mut()
                    .and_then(Iterator::next)
                    .unwrap_or(config::DEFAULT_SSH_PORT);
                let wait_for = wait_fors
                    .as_mut()
                    .and_then(Iterator::next)
                    .filter(|w| !w.is_empty());
                SessionSpec {
                    credentials: Credentials {
                        user,
                        password,
                        host,
                        port,
                    },
                    telnet_port,
                    command,
                    wait_for,
                }
            })
            .collect();
        Ok(rows)
    }
}

/// Per-entry result of establishing a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ConnectionSummary {
    pub host: String,
    /// The tunnel (telnet) port of the entry.
    pub port: u16,
    pub connected: bool,
}

/// A live session as reported by [`SessionPool::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SessionStatus {
    pub host: String,
    pub tunnel_port: u16,
    pub id: Uuid,
    /// Live state of the secure transport at the time of the call.
    pub connected: bool,
}

/// Time unit of a [`ScheduleConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Converts `amount` of this unit into a [`Duration`].
    pub fn duration(self, amount: u64) -> Duration {
        match self {
            TimeUnit::Nanoseconds => Duration::from_nanos(amount),
            TimeUnit::Microseconds => Duration::from_micros(amount),
            TimeUnit::Milliseconds => Duration::from_millis(amount),
            TimeUnit::Seconds => Duration::from_secs(amount),
            TimeUnit::Minutes => Duration::from_secs(amount.saturating_mul(60)),
            TimeUnit::Hours => Duration::from_secs(amount.saturating_mul(60 * 60)),
            TimeUnit::Days => Duration::from_secs(amount.saturating_mul(24 * 60 * 60)),
        }
    }
}

/// Cadence of the recurring command tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleConfig {
    pub initial_delay: u64,
    /// Delay between the end of one tick and the start of the next.
    pub period: u64,
    pub time_unit: TimeUnit,
}

/// One established jump-host connection plus its telnet tunnel.
///
/// The tunnel sits behind an async mutex so that a scheduled command and a
/// teardown on the same session never interleave.
pub struct Session {
    id: Uuid,
    host: String,
    port: u16,
    telnet_port: u16,
    command: String,
    wait_for: Option<String>,
    transport: Box<dyn TransportHandle>,
    tunnel: Mutex<Option<Tunnel>>,
    tunnel_connected: AtomicBool,
}

mod client;
mod establish;
mod lifecycle;
mod manager;
mod protocol;
mod registry;
mod scheduler;
mod security;
mod transport;
