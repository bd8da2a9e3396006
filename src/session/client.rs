use super::*;

/// [`TransportProvider`] that dials jump hosts over SSH with password auth.
#[derive(Debug, Clone, Default)]
pub struct SshTransport {
    security_options: ConnectionSecurityOptions,
}

impl SshTransport {
    pub fn new(security_options: ConnectionSecurityOptions) -> Self {
        Self { security_options }
    }

    pub fn security_options(&self) -> &ConnectionSecurityOptions {
        &self.security_options
    }
}

#[async_trait]
impl TransportProvider for SshTransport {
    async fn connect(
        &self,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<Box<dyn TransportHandle>, ConnectError> {
        let device_addr = credentials.addr();

        let connecting = Client::connect_with_config(
            (credentials.host.clone(), credentials.port),
            &credentials.user,
            AuthMethod::with_password(&credentials.password),
            self.security_options.server_check.clone(),
            self.security_options.ssh_config(),
        );
        let client = match tokio::time::timeout(timeout, connecting).await {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(ConnectError::TransportError(format!(
                    "{device_addr}: connect timed out after {timeout:?}"
                )));
            }
        };
        debug!("{} TCP connection successful", device_addr);

        Ok(Box::new(SshHandle {
            client,
            device_addr,
        }))
    }
}

/// An authenticated SSH client to one jump host.
struct SshHandle {
    client: Client,
    device_addr: String,
}

#[async_trait]
impl TransportHandle for SshHandle {
    fn is_connected(&self) -> bool {
        !self.client.is_closed()
    }

    async fn open_terminal_channel(&self) -> Result<TerminalChannel, ConnectError> {
        let mut channel = self.client.get_channel().await?;
        channel
            .request_pty(false, "xterm", 800, 600, 0, 0, &[])
            .await?;
        channel.request_shell(false).await?;
        debug!("{} Shell request successful", self.device_addr);

        let (output, receiver_from_user) = mpsc::channel::<Vec<u8>>(256);
        let (sender_to_user, input) = mpsc::channel::<Vec<u8>>(256);
        let (shutdown, shutdown_rx) = oneshot::channel();

        tokio::spawn(pump(
            channel,
            receiver_from_user,
            sender_to_user,
            shutdown_rx,
            self.device_addr.clone(),
        ));

        Ok(TerminalChannel {
            output,
            input,
            control: Box::new(SshChannelControl {
                shutdown: Some(shutdown),
            }),
        })
    }

    async fn disconnect(&self) -> Result<(), ConnectError> {
        self.client.disconnect().await?;
        debug!("{} SSH connection closed", self.device_addr);
        Ok(())
    }
}

/// Moves bytes between the russh channel and the tunnel's stream pair.
async fn pump(
    mut channel: russh::Channel<russh::client::Msg>,
    mut receiver_from_user: mpsc::Receiver<Vec<u8>>,
    sender_to_user: mpsc::Sender<Vec<u8>>,
    mut shutdown: oneshot::Receiver<()>,
    device_addr: String,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                if let Err(e) = channel.close().await {
                    debug!("{} Failed to close channel: {:?}", device_addr, e);
                }
                break;
            }
            data = receiver_from_user.recv() => match data {
                Some(data) => {
                    if let Err(e) = channel.data(&data[..]).await {
                        debug!("{} Failed to send data to shell: {:?}", device_addr, e);
                        break;
                    }
                }
                None => {
                    // Output closed by teardown; wait for the close request.
                    let _ = channel.eof().await;
                    let _ = (&mut shutdown).await;
                    let _ = channel.close().await;
                    break;
                }
            },
            msg = channel.wait() => match msg {
                Some(ChannelMsg::Data { ref data }) | Some(ChannelMsg::ExtendedData { ref data, .. }) => {
                    if sender_to_user.send(data.to_vec()).await.is_err() {
                        debug!("{} Tunnel input dropped. Closing task.", device_addr);
                        break;
                    }
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    debug!("{} Shell exited with status code: {}", device_addr, exit_status);
                    let _ = channel.eof().await;
                    break;
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                    debug!("{} Shell sent EOF.", device_addr);
                    break;
                }
                Some(_) => {}
            }
        }
    }
    debug!("{} SSH I/O task ended.", device_addr);
}

struct SshChannelControl {
    shutdown: Option<oneshot::Sender<()>>,
}

#[async_trait]
impl ChannelControl for SshChannelControl {
    async fn close(&mut self) -> Result<(), ConnectError> {
        if let Some(shutdown) = self.shutdown.take() {
            // The pump may already be gone if the remote closed first.
            let _ = shutdown.send(());
        }
        Ok(())
    }
}
