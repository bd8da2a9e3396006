//! Telnet negotiation and command/response matching over a [`Tunnel`].
//!
//! There is no terminal emulator on this side: both loops poll the tunnel
//! without blocking, sleep a fixed interval between polls and classify the
//! accumulated text by substring matching. A loop that sees more than
//! `max_idle_reads` consecutive empty polls gives up.

use super::*;

/// Printed by telnet when the device port is closed.
pub const CONNECTION_REFUSED: &str = "Connection refused";
/// Printed by telnet once the TCP connection to the device is up.
pub const ESCAPE_CHARACTER: &str = "Escape character is ";
/// Prompt of devices that skip the telnet banner.
pub const LOGIN_PROMPT: &str = "NES-SIP>";
/// Printed by telnet after the device hangs up.
pub const FOREIGN_HOST_CLOSED: &str = "closed by foreign host.";
/// Device command that ends the telnet session.
pub const QUIT_COMMAND: &str = "q";

/// How a tunnel negotiation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationOutcome {
    /// The escape-character banner or a device prompt was seen.
    Connected,
    /// Telnet reported the device port as refused.
    Refused,
    /// Nothing decisive arrived before the idle threshold.
    IdleTimeout,
    /// The tunnel failed underneath the negotiation.
    Failed,
}

impl NegotiationOutcome {
    /// Whether the tunnel counts as connected under `policy`.
    pub fn is_connected(self, policy: IdleNegotiationPolicy) -> bool {
        match self {
            NegotiationOutcome::Connected => true,
            NegotiationOutcome::IdleTimeout => policy == IdleNegotiationPolicy::AssumeConnected,
            NegotiationOutcome::Refused | NegotiationOutcome::Failed => false,
        }
    }
}

/// Polls `tunnel` into `text` until `classify` returns a verdict.
///
/// Fails with [`ConnectError::ProtocolTimeout`] naming `context` once the idle
/// threshold is exceeded.
async fn poll_until<T>(
    tunnel: &mut Tunnel,
    interval: Duration,
    timings: &ProtocolTimings,
    context: &str,
    text: &mut String,
    mut classify: impl FnMut(&str) -> Option<T>,
) -> Result<T, ConnectError> {
    let mut idle_reads: u32 = 0;
    loop {
        let chunk = tunnel.read_available(timings.read_buffer_size)?;
        tokio::time::sleep(interval).await;
        if !chunk.is_empty() {
            trace!("{:?}", chunk);
            text.push_str(&chunk);
            idle_reads = 0;
            if let Some(verdict) = classify(text.as_str()) {
                return Ok(verdict);
            }
            continue;
        }
        if idle_reads > timings.max_idle_reads {
            return Err(ConnectError::ProtocolTimeout(format!(
                "{context}: no match after {} idle reads",
                timings.max_idle_reads
            )));
        }
        idle_reads += 1;
    }
}

/// Issues `telnet <ip> <port>` on the tunnel and waits for the outcome.
pub async fn connect_tunnel(
    tunnel: &mut Tunnel,
    ip: &str,
    port: u16,
    timings: &ProtocolTimings,
) -> NegotiationOutcome {
    if let Err(e) = tunnel.write_line(&format!("telnet {ip} {port}")).await {
        error!("Failed to connect to telnet server at {ip}:{port}: {e}");
        return NegotiationOutcome::Failed;
    }

    let mut text = String::new();
    let context = format!("telnet {ip}:{port}");
    let verdict = poll_until(
        tunnel,
        timings.negotiation_poll(),
        timings,
        &context,
        &mut text,
        |text| {
            if text.contains(CONNECTION_REFUSED) {
                Some(NegotiationOutcome::Refused)
            } else if text.contains(ESCAPE_CHARACTER) || text.contains(LOGIN_PROMPT) {
                Some(NegotiationOutcome::Connected)
            } else {
                None
            }
        },
    )
    .await;
    info!("Telnet connection output for {ip}:{port}: {}", text.trim());

    match verdict {
        Ok(outcome) => outcome,
        Err(e @ ConnectError::ProtocolTimeout(_)) => {
            warn!("{e}");
            NegotiationOutcome::IdleTimeout
        }
        Err(e) => {
            error!("Failed to connect to telnet server at {ip}:{port}: {e}");
            NegotiationOutcome::Failed
        }
    }
}

/// Runs `command` and returns the output gathered until `wait_for` shows up.
///
/// A blank command returns immediately without I/O. Without a sentinel the
/// loop waits for [`CONNECTION_REFUSED`], which in practice means it runs
/// until the idle threshold. Failures are logged and whatever was read so far
/// is returned.
pub async fn run_command(
    tunnel: &mut Tunnel,
    command: &str,
    wait_for: Option<&str>,
    timings: &ProtocolTimings,
) -> String {
    if command.trim().is_empty() {
        return String::new();
    }
    let wait_for = wait_for
        .filter(|w| !w.is_empty())
        .unwrap_or(CONNECTION_REFUSED);

    let mut text = String::new();
    if let Err(e) = tunnel.write_line(command).await {
        error!("Failed to execute command '{command}': {e}");
        return text;
    }

    let verdict = poll_until(
        tunnel,
        timings.command_poll(),
        timings,
        command,
        &mut text,
        |text| text.contains(wait_for).then_some(()),
    )
    .await;
    match verdict {
        Ok(()) => debug!("Command '{command}' matched '{wait_for}'"),
        Err(ConnectError::ProtocolTimeout(_)) => {
            debug!("Command '{command}' went idle before '{wait_for}'")
        }
        Err(e) => error!("Failed to execute command '{command}': {e}"),
    }
    info!("Command output: {}", text.trim());
    text
}
