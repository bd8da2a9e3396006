use super::*;

impl Session {
    pub(super) fn new(
        id: Uuid,
        spec: &SessionSpec,
        transport: Box<dyn TransportHandle>,
        tunnel: Option<Tunnel>,
        tunnel_connected: bool,
    ) -> Self {
        Self {
            id,
            host: spec.credentials.host.clone(),
            port: spec.credentials.port,
            telnet_port: spec.telnet_port,
            command: spec.command.clone(),
            wait_for: spec.wait_for.clone(),
            transport,
            tunnel: Mutex::new(tunnel),
            tunnel_connected: AtomicBool::new(tunnel_connected),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Transport port dialed on the jump host.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn telnet_port(&self) -> u16 {
        self.telnet_port
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn wait_for(&self) -> Option<&str> {
        self.wait_for.as_deref()
    }

    /// `host:telnet_port`, used as log context.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.telnet_port)
    }

    pub fn transport_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn tunnel_connected(&self) -> bool {
        self.tunnel_connected.load(Ordering::Acquire)
    }

    /// Both the transport and the tunnel are up.
    pub fn is_connected(&self) -> bool {
        self.transport_connected() && self.tunnel_connected()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            host: self.host.clone(),
            tunnel_port: self.telnet_port,
            id: self.id,
            connected: self.transport_connected(),
        }
    }

    pub fn summary(&self) -> ConnectionSummary {
        ConnectionSummary {
            host: self.host.clone(),
            port: self.telnet_port,
            connected: self.is_connected(),
        }
    }

    /// Runs the session's command under the session lock.
    ///
    /// Returns `None` without touching the tunnel when the session is no
    /// longer connected.
    pub async fn execute(&self, timings: &ProtocolTimings) -> Option<String> {
        let mut guard = self.tunnel.lock().await;
        if !self.is_connected() {
            return None;
        }
        let tunnel = guard.as_mut()?;
        Some(run_command(tunnel, &self.command, self.wait_for.as_deref(), timings).await)
    }

    /// Gracefully closes the tunnel and the transport.
    ///
    /// Sends the telnet quit command, closes output then input, closes the
    /// channel and finally disconnects the transport if it is still up.
    /// A session whose transport is already gone only drops its tunnel.
    pub async fn shutdown(&self, timings: &ProtocolTimings) -> Result<(), ConnectError> {
        let mut guard = self.tunnel.lock().await;
        let tunnel = guard.take();
        self.tunnel_connected.store(false, Ordering::Release);

        if !self.transport.is_connected() {
            debug!("{} transport already closed, skipping teardown", self.addr());
            return Ok(());
        }

        let teardown_error = |e: ConnectError| ConnectError::TeardownError {
            addr: self.addr(),
            reason: e.to_string(),
        };

        if let Some(mut tunnel) = tunnel {
            let farewell =
                run_command(&mut tunnel, QUIT_COMMAND, Some(FOREIGN_HOST_CLOSED), timings).await;
            trace!("{} quit output: {:?}", self.addr(), farewell);
            tunnel.close_output();
            tunnel.close_input();
            tunnel.close_channel().await.map_err(teardown_error)?;
        }

        if self.transport.is_connected() {
            self.transport.disconnect().await.map_err(teardown_error)?;
        }
        debug!("{} session closed", self.addr());
        Ok(())
    }
}
