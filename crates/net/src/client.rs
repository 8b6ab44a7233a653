//! TCP client for a draftden server.
//!
//! A thin, typed connection handle: it frames outgoing `ClientToServer`
//! messages and surfaces every inbound `ServerToClient` message as an
//! event. Protocol sequencing (greeting, login, joining rooms) is the
//! caller's business - this is the client the integration tests drive, and
//! the seam a GUI would sit on.

use std::net::SocketAddr;

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::{ClientToServer, ServerToClient, PROTOCOL_VERSION_MAJOR,
    PROTOCOL_VERSION_MINOR};

/// Something that happened on the connection.
#[derive(Debug)]
pub enum ClientEvent {
    /// A message arrived from the server.
    Message(ServerToClient),
    /// The connection ended (server close, protocol error, or local
    /// disconnect).
    Disconnected,
}

enum ClientCommand {
    Send(ClientToServer),
    Disconnect,
}

/// Client handle. Dropping it tears the connection down.
pub struct Client {
    event_rx: mpsc::Receiver<ClientEvent>,
    cmd_tx: mpsc::Sender<ClientCommand>,
}

impl Client {
    /// Connect to a server. The server's `GreetingInd` arrives as the
    /// first event.
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        info!(addr = %addr, "connecting");
        let stream = TcpStream::connect(addr).await?;

        let (event_tx, event_rx) = mpsc::channel(64);
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        tokio::spawn(connection_task(stream, event_tx, cmd_rx));

        Ok(Client { event_rx, cmd_tx })
    }

    /// Queue a message for the server.
    pub async fn send(&self, msg: ClientToServer) -> Result<()> {
        self.cmd_tx
            .send(ClientCommand::Send(msg))
            .await
            .map_err(|_| Error::NotConnected)
    }

    /// Send a login request with this build's protocol version.
    pub async fn login(&self, name: impl Into<String>) -> Result<()> {
        self.send(ClientToServer::LoginReq {
            name: name.into(),
            protocol_version_major: PROTOCOL_VERSION_MAJOR,
            protocol_version_minor: PROTOCOL_VERSION_MINOR,
            client_version: env!("CARGO_PKG_VERSION").into(),
        })
        .await
    }

    /// Next connection event; `None` after disconnection is delivered.
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        self.event_rx.recv().await
    }

    /// Next server message, skipping nothing. `None` once disconnected.
    pub async fn next_message(&mut self) -> Option<ServerToClient> {
        match self.next_event().await {
            Some(ClientEvent::Message(msg)) => Some(msg),
            _ => None,
        }
    }

    pub async fn disconnect(&self) {
        let _ = self.cmd_tx.send(ClientCommand::Disconnect).await;
    }
}

async fn connection_task(
    stream: TcpStream,
    event_tx: mpsc::Sender<ClientEvent>,
    mut cmd_rx: mpsc::Receiver<ClientCommand>,
) {
    let (mut reader, mut writer) = tokio::io::split(stream);

    loop {
        tokio::select! {
            result = read_frame::<_, ServerToClient>(&mut reader) => {
                match result {
                    Ok(msg) => {
                        if event_tx.send(ClientEvent::Message(msg)).await.is_err() {
                            break;
                        }
                    }
                    Err(Error::ConnectionClosed) => {
                        debug!("server closed connection");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "read error");
                        break;
                    }
                }
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ClientCommand::Send(msg)) => {
                        if let Err(e) = write_frame(&mut writer, &msg).await {
                            warn!(error = %e, "write error");
                            break;
                        }
                    }
                    Some(ClientCommand::Disconnect) | None => {
                        debug!("disconnect requested");
                        break;
                    }
                }
            }
        }
    }

    let _ = event_tx.send(ClientEvent::Disconnected).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn receives_greeting_and_sends_login() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (mut reader, mut writer) = tokio::io::split(stream);
            write_frame(
                &mut writer,
                &ServerToClient::GreetingInd {
                    protocol_version_major: PROTOCOL_VERSION_MAJOR,
                    protocol_version_minor: PROTOCOL_VERSION_MINOR,
                    server_name: "test".into(),
                    server_version: "0.0.0".into(),
                },
            )
            .await
            .unwrap();
            read_frame::<_, ClientToServer>(&mut reader).await.unwrap()
        });

        let mut client = Client::connect(addr).await.unwrap();
        match client.next_message().await {
            Some(ServerToClient::GreetingInd { server_name, .. }) => {
                assert_eq!(server_name, "test");
            }
            other => panic!("expected GreetingInd, got {other:?}"),
        }

        client.login("alice").await.unwrap();
        match server.await.unwrap() {
            ClientToServer::LoginReq { name, .. } => assert_eq!(name, "alice"),
            other => panic!("expected LoginReq, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_close_surfaces_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let mut client = Client::connect(addr).await.unwrap();
        match client.next_event().await {
            Some(ClientEvent::Disconnected) => {}
            other => panic!("expected Disconnected, got {other:?}"),
        }
    }
}
