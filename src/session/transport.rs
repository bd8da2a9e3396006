use super::*;

/// Dials the secure transport to a jump host.
///
/// [`SshTransport`] is the production implementation. Tests plug in an
/// in-process provider that emulates a jump host.
#[async_trait]
pub trait TransportProvider: Send + Sync {
    /// Connects and authenticates, giving up after `timeout`.
    async fn connect(
        &self,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<Box<dyn TransportHandle>, ConnectError>;
}

/// A live secure-transport connection, exclusively owned by one [`Session`].
#[async_trait]
pub trait TransportHandle: Send + Sync {
    /// Live connection state; transports can fail out-of-band.
    fn is_connected(&self) -> bool;

    /// Opens a terminal channel exposing a byte stream pair.
    async fn open_terminal_channel(&self) -> Result<TerminalChannel, ConnectError>;

    async fn disconnect(&self) -> Result<(), ConnectError>;
}

/// Teardown hook for the channel underneath a [`TerminalChannel`].
#[async_trait]
pub trait ChannelControl: Send + Sync {
    async fn close(&mut self) -> Result<(), ConnectError>;
}

/// The raw pieces of an opened terminal channel.
pub struct TerminalChannel {
    /// Bytes written here reach the remote shell.
    pub output: mpsc::Sender<Vec<u8>>,
    /// Bytes produced by the remote shell arrive here.
    pub input: mpsc::Receiver<Vec<u8>>,
    pub control: Box<dyn ChannelControl>,
}

/// A terminal channel in use as a telnet tunnel.
pub struct Tunnel {
    output: Option<mpsc::Sender<Vec<u8>>>,
    input: mpsc::Receiver<Vec<u8>>,
    /// Bytes received but not yet handed out by [`Tunnel::read_available`].
    pending: Vec<u8>,
    control: Box<dyn ChannelControl>,
}

impl Tunnel {
    pub fn new(channel: TerminalChannel) -> Self {
        Self {
            output: Some(channel.output),
            input: channel.input,
            pending: Vec::new(),
            control: channel.control,
        }
    }

    /// Returns whatever is readable right now, at most `limit` bytes.
    ///
    /// Never waits: an empty string means nothing has arrived since the last
    /// call. Fails only once the input is closed and fully drained.
    pub fn read_available(&mut self, limit: usize) -> Result<String, ConnectError> {
        let limit = limit.max(1);
        let mut closed = false;
        while self.pending.len() < limit {
            match self.input.try_recv() {
                Ok(chunk) => self.pending.extend_from_slice(&chunk),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    closed = true;
                    break;
                }
            }
        }
        if self.pending.is_empty() {
            return if closed {
                Err(ConnectError::ChannelDisconnectError)
            } else {
                Ok(String::new())
            };
        }

        let mut take = self.pending.len().min(limit);
        // Keep a multi-byte character that straddles the cut for the next read.
        if let Err(e) = std::str::from_utf8(&self.pending[..take])
            && e.error_len().is_none()
            && e.valid_up_to() > 0
        {
            take = e.valid_up_to();
        }
        let bytes: Vec<u8> = self.pending.drain(..take).collect();
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Writes `line` followed by CRLF.
    pub async fn write_line(&mut self, line: &str) -> Result<(), ConnectError> {
        let output = self
            .output
            .as_ref()
            .ok_or(ConnectError::ChannelDisconnectError)?;
        output
            .send(format!("{line}\r\n").into_bytes())
            .await
            .map_err(|_| ConnectError::ChannelDisconnectError)
    }

    pub fn close_output(&mut self) {
        self.output = None;
    }

    /// Stops accepting input; already buffered bytes can still be read.
    pub fn close_input(&mut self) {
        self.input.close();
    }

    pub async fn close_channel(&mut self) -> Result<(), ConnectError> {
        self.control.close().await
    }
}
