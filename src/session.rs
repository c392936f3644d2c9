use std::{net::SocketAddr, sync::Arc};

use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::{TcpStream, tcp::OwnedWriteHalf},
    sync::mpsc::{self, UnboundedReceiver},
};
use tracing::{debug, info, warn};

use crate::{
    directory::{Directory, Outbox, PeerId, RegisterError},
    frame::{Frame, FrameKind, read_frame, write_frame},
    router,
};

/// Lifecycle of one connection. The transition out of `Unclassified`
/// happens at most once, on the first registration frame.
enum Role {
    Unclassified,
    Peer(PeerId),
    Client(String),
}

/// Per-connection handler: owns the read loop, dispatches decoded frames,
/// and is the only place this connection's directory entries are inserted
/// or removed.
struct Session {
    directory: Arc<Directory>,
    identity: PeerId,
    remote: SocketAddr,
    role: Role,
    outbox: Outbox,
}

/// Spawns a session for a freshly-accepted connection of unknown role.
pub fn spawn_inbound(
    stream: TcpStream,
    remote: SocketAddr,
    directory: Arc<Directory>,
    identity: PeerId,
) {
    let (outbox, outbox_rx) = mpsc::unbounded_channel();
    let session = Session {
        directory,
        identity,
        remote,
        role: Role::Unclassified,
        outbox,
    };
    tokio::spawn(async move {
        session.directory.track_unclassified(remote).await;
        session.run(stream, outbox_rx).await;
    });
}

/// Spawns a session for an outbound bootstrap connection that is already
/// registered in the peer directory under `id` with `outbox`.
pub fn spawn_outbound(
    stream: TcpStream,
    id: PeerId,
    outbox: Outbox,
    outbox_rx: UnboundedReceiver<Frame>,
    directory: Arc<Directory>,
    identity: PeerId,
) {
    let remote = stream.peer_addr().unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)));
    let session = Session {
        directory,
        identity,
        remote,
        role: Role::Peer(id),
        outbox,
    };
    tokio::spawn(async move {
        session.run(stream, outbox_rx).await;
    });
}

impl Session {
    async fn run(mut self, stream: TcpStream, outbox_rx: UnboundedReceiver<Frame>) {
        let (reader, writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        // Outbound frames are written by a dedicated task so an inbound
        // read is never cancelled mid-frame. The task ends once every
        // outbox handle is gone, which cleanup guarantees.
        tokio::spawn(drain_outbox(outbox_rx, writer, self.remote));

        loop {
            match read_frame(&mut reader).await {
                Ok(Some(frame)) => {
                    if !self.dispatch(frame).await {
                        break;
                    }
                }
                Ok(None) => {
                    info!(peer = %self.remote, "connection closed");
                    break;
                }
                Err(err) => {
                    warn!(peer = %self.remote, error = ?err, "read failed, closing connection");
                    break;
                }
            }
        }

        self.cleanup().await;
    }

    /// Returns `false` when the connection must be closed (the duplicate
    /// username policy); every other outcome keeps the loop running.
    async fn dispatch(&mut self, frame: Frame) -> bool {
        match frame.kind() {
            Some(FrameKind::PeerListRequest) => {
                debug!(peer = %self.remote, "peer list requested");
                router::send_peer_list(&self.directory, self.identity, &self.outbox).await;
            }
            Some(FrameKind::ClientListRequest) => {
                debug!(peer = %self.remote, "client list requested");
                router::send_client_list(&self.directory, &self.outbox).await;
            }
            Some(FrameKind::PeerList | FrameKind::ClientList) => {
                info!(peer = %self.remote, "unsolicited directory answer, ignoring");
            }
            Some(FrameKind::RegisterPeer) => self.register_peer(&frame).await,
            Some(FrameKind::RegisterClient) => return self.register_client(&frame).await,
            Some(FrameKind::Message) => {
                let origin_is_peer = matches!(self.role, Role::Peer(_));
                router::deliver_or_broadcast(&self.directory, frame, origin_is_peer).await;
            }
            None => {
                warn!(peer = %self.remote, tag = ?frame.wire_tag(), "unknown frame kind, discarding");
            }
        }
        true
    }

    async fn register_peer(&mut self, frame: &Frame) {
        if !matches!(self.role, Role::Unclassified) {
            warn!(peer = %self.remote, "connection attempted to re-register, ignoring");
            return;
        }
        let Some(port) = frame.text().and_then(|text| text.parse::<u16>().ok()) else {
            warn!(peer = %self.remote, "malformed peer registration payload, discarding");
            return;
        };

        let id = PeerId::new(self.remote.ip(), port);
        self.directory.register_peer(id, self.outbox.clone()).await;
        self.directory.forget_unclassified(self.remote).await;
        self.role = Role::Peer(id);
        info!(peer = %id, "registered peer server");
    }

    async fn register_client(&mut self, frame: &Frame) -> bool {
        if !matches!(self.role, Role::Unclassified) {
            warn!(peer = %self.remote, "connection attempted to re-register, ignoring");
            return true;
        }
        let Some(username) = frame.text().filter(|name| !name.is_empty()) else {
            warn!(peer = %self.remote, "malformed client registration payload, discarding");
            return true;
        };

        match self
            .directory
            .register_client(username, self.outbox.clone())
            .await
        {
            Ok(()) => {
                self.directory.forget_unclassified(self.remote).await;
                self.role = Role::Client(username.to_string());
                info!(peer = %self.remote, username, "registered client");
                true
            }
            Err(RegisterError::UsernameTaken) => {
                warn!(peer = %self.remote, username, "username already taken, closing connection");
                false
            }
        }
    }

    async fn cleanup(&self) {
        match &self.role {
            Role::Unclassified => self.directory.forget_unclassified(self.remote).await,
            Role::Peer(id) => {
                self.directory.remove_peer(*id, &self.outbox).await;
                info!(peer = %id, "peer server deregistered");
            }
            Role::Client(username) => {
                self.directory.remove_client(username, &self.outbox).await;
                info!(peer = %self.remote, username, "client deregistered");
            }
        }
    }
}

async fn drain_outbox(
    mut outbox_rx: UnboundedReceiver<Frame>,
    mut writer: OwnedWriteHalf,
    remote: SocketAddr,
) {
    while let Some(frame) = outbox_rx.recv().await {
        if let Err(err) = write_frame(&mut writer, &frame).await {
            debug!(peer = %remote, error = ?err, "failed to deliver frame");
            break;
        }
    }
    let _ = writer.shutdown().await;
}
