//! An in-process jump host that answers `telnet` like a real one.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rhopper::config::{IdleNegotiationPolicy, PoolSettings, ProtocolTimings};
use rhopper::error::ConnectError;
use rhopper::session::{
    ChannelControl, Credentials, SessionBatch, SessionPool, SessionSpec, TerminalChannel,
    TransportHandle, TransportProvider,
};
use tokio::sync::mpsc;

#[derive(Default)]
pub struct MockJumpHost {
    /// Hosts whose SSH connect fails.
    pub unreachable: HashSet<String>,
    /// Hosts whose telnet port is closed.
    pub refusing: HashSet<String>,
    /// Hosts that never answer the telnet command.
    pub silent: HashSet<String>,
    /// Hosts whose shell channel cannot be opened.
    pub no_channel: HashSet<String>,
    /// Hosts whose channel fails to close.
    pub sticky_close: HashSet<String>,
    /// Hosts whose SSH handshake breaks inside the library.
    pub handshake_broken: HashSet<String>,
    /// Hosts that take this long to answer device commands.
    pub slow: HashMap<String, Duration>,
    /// `host: line` for every line written to any tunnel.
    pub written: Arc<Mutex<Vec<String>>>,
    links: Mutex<HashMap<String, Arc<AtomicBool>>>,
}

impl MockJumpHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unreachable(mut self, host: &str) -> Self {
        self.unreachable.insert(host.to_string());
        self
    }

    pub fn refusing(mut self, host: &str) -> Self {
        self.refusing.insert(host.to_string());
        self
    }

    pub fn silent(mut self, host: &str) -> Self {
        self.silent.insert(host.to_string());
        self
    }

    pub fn no_channel(mut self, host: &str) -> Self {
        self.no_channel.insert(host.to_string());
        self
    }

    pub fn sticky_close(mut self, host: &str) -> Self {
        self.sticky_close.insert(host.to_string());
        self
    }

    pub fn handshake_broken(mut self, host: &str) -> Self {
        self.handshake_broken.insert(host.to_string());
        self
    }

    pub fn slow(mut self, host: &str, delay: Duration) -> Self {
        self.slow.insert(host.to_string(), delay);
        self
    }

    /// Simulates the jump host dropping the SSH connection out-of-band.
    pub fn drop_link(&self, host: &str) {
        if let Some(link) = self.links.lock().unwrap().get(host) {
            link.store(false, Ordering::SeqCst);
        }
    }

    pub fn link_up(&self, host: &str) -> bool {
        self.links
            .lock()
            .unwrap()
            .get(host)
            .map(|link| link.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    pub fn lines_for(&self, host: &str) -> Vec<String> {
        let prefix = format!("{host}: ");
        self.written
            .lock()
            .unwrap()
            .iter()
            .filter_map(|line| line.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl TransportProvider for MockJumpHost {
    async fn connect(
        &self,
        credentials: &Credentials,
        _timeout: Duration,
    ) -> Result<Box<dyn TransportHandle>, ConnectError> {
        if self.unreachable.contains(&credentials.host) {
            return Err(ConnectError::TransportError(format!(
                "{}: Auth fail",
                credentials.addr()
            )));
        }
        if self.handshake_broken.contains(&credentials.host) {
            return Err(russh::Error::Disconnect.into());
        }
        let link = Arc::new(AtomicBool::new(true));
        self.links
            .lock()
            .unwrap()
            .insert(credentials.host.clone(), link.clone());
        Ok(Box::new(MockHandle {
            host: credentials.host.clone(),
            link,
            refusing: self.refusing.contains(&credentials.host),
            silent: self.silent.contains(&credentials.host),
            no_channel: self.no_channel.contains(&credentials.host),
            sticky_close: self.sticky_close.contains(&credentials.host),
            delay: self.slow.get(&credentials.host).copied(),
            written: self.written.clone(),
        }))
    }
}

struct MockHandle {
    host: String,
    link: Arc<AtomicBool>,
    refusing: bool,
    silent: bool,
    no_channel: bool,
    sticky_close: bool,
    delay: Option<Duration>,
    written: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl TransportHandle for MockHandle {
    fn is_connected(&self) -> bool {
        self.link.load(Ordering::SeqCst)
    }

    async fn open_terminal_channel(&self) -> Result<TerminalChannel, ConnectError> {
        if self.no_channel {
            return Err(ConnectError::ChannelError("channel is not opened".into()));
        }
        let (output, mut from_pool) = mpsc::channel::<Vec<u8>>(16);
        let (to_pool, input) = mpsc::channel::<Vec<u8>>(16);
        let host = self.host.clone();
        let refusing = self.refusing;
        let silent = self.silent;
        let delay = self.delay;
        let written = self.written.clone();

        tokio::spawn(async move {
            while let Some(bytes) = from_pool.recv().await {
                let line = String::from_utf8_lossy(&bytes).trim_end().to_string();
                written.lock().unwrap().push(format!("{host}: {line}"));
                let reply = if let Some(target) = line.strip_prefix("telnet ") {
                    if silent {
                        continue;
                    }
                    let ip = target.split_whitespace().next().unwrap_or_default();
                    if refusing {
                        format!(
                            "Trying {ip}...\r\ntelnet: Unable to connect to remote host: Connection refused\r\n"
                        )
                    } else {
                        format!("Trying {ip}...\r\nConnected to {ip}.\r\nEscape character is '^]'.\r\n")
                    }
                } else if line == "q" {
                    "q\r\nConnection closed by foreign host.\r\n".to_string()
                } else {
                    if let Some(delay) = delay {
                        tokio::time::sleep(delay).await;
                    }
                    format!("{line}\r\nCisco IOS Software, Version 15.2\r\nrouter#")
                };
                if to_pool.send(reply.into_bytes()).await.is_err() {
                    break;
                }
            }
        });

        Ok(TerminalChannel {
            output,
            input,
            control: Box::new(MockControl {
                sticky: self.sticky_close,
            }),
        })
    }

    async fn disconnect(&self) -> Result<(), ConnectError> {
        self.link.store(false, Ordering::SeqCst);
        Ok(())
    }
}

struct MockControl {
    sticky: bool,
}

#[async_trait]
impl ChannelControl for MockControl {
    async fn close(&mut self) -> Result<(), ConnectError> {
        if self.sticky {
            Err(ConnectError::ChannelError("channel close refused".into()))
        } else {
            Ok(())
        }
    }
}

pub fn fast_settings() -> PoolSettings {
    PoolSettings {
        worker_threads: 4,
        timings: ProtocolTimings {
            negotiation_poll_ms: 1,
            command_poll_ms: 1,
            max_idle_reads: 20,
            ..ProtocolTimings::default()
        },
        idle_negotiation_policy: IdleNegotiationPolicy::AssumeConnected,
    }
}

pub fn pool(jump_host: Arc<MockJumpHost>) -> SessionPool {
    SessionPool::with_settings(jump_host, fast_settings())
}

pub fn spec(host: &str, telnet_port: u16) -> SessionSpec {
    SessionSpec {
        credentials: Credentials {
            user: "a".to_string(),
            password: "p".to_string(),
            host: host.to_string(),
            port: 22,
        },
        telnet_port,
        command: "show version".to_string(),
        wait_for: Some("#".to_string()),
    }
}

pub fn batch(hosts: &[&str]) -> SessionBatch {
    SessionBatch::from_specs(hosts.iter().map(|host| spec(host, 23)))
}
