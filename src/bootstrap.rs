use std::{io, sync::Arc};

use tokio::{
    net::TcpStream,
    sync::mpsc::{self, UnboundedReceiver},
};
use tracing::{info, warn};

use crate::{
    directory::{Directory, Outbox, PeerId},
    frame::{Frame, FrameKind, read_frame, write_frame},
    session,
};

/// One established outbound connection, registered but not yet running its
/// session. Sessions are spawned only after the whole dial phase so the
/// exchange below owns its stream exclusively.
struct OutboundPeer {
    id: PeerId,
    stream: TcpStream,
    outbox: Outbox,
    outbox_rx: UnboundedReceiver<Frame>,
}

/// Runs the one-shot federation bootstrap and returns how many outbound
/// peer connections were established.
///
/// Each seed port on the identity's host is dialed once (self skipped,
/// failures logged, never retried). The first seed whose directory exchange
/// succeeds supplies one level of transitive discovery: its peer list is
/// dialed too, skipping ourselves and anyone already connected. No seed
/// reachable means the relay simply runs standalone.
pub async fn run(directory: &Arc<Directory>, identity: PeerId, seed_ports: &[u16]) -> usize {
    let mut outbound: Vec<OutboundPeer> = Vec::new();
    let mut exchanged = false;

    for &port in seed_ports {
        if port == identity.port {
            continue;
        }
        let id = PeerId::new(identity.host, port);
        if directory.contains_peer(id).await {
            continue;
        }
        let Some(mut peer) = connect_peer(directory, identity, id).await else {
            continue;
        };

        if !exchanged {
            info!(peer = %id, "requesting peer list");
            match request_peer_list(&mut peer.stream).await {
                Ok(discovered) => {
                    exchanged = true;
                    for addr in discovered {
                        if addr == identity || directory.contains_peer(addr).await {
                            continue;
                        }
                        if let Some(extra) = connect_peer(directory, identity, addr).await {
                            outbound.push(extra);
                        }
                    }
                }
                // The announce went through, so keep the connection as a
                // peer; the next reachable seed gets asked instead.
                Err(err) => warn!(peer = %id, error = ?err, "peer list exchange failed"),
            }
        }

        outbound.push(peer);
    }

    let established = outbound.len();
    for peer in outbound {
        session::spawn_outbound(
            peer.stream,
            peer.id,
            peer.outbox,
            peer.outbox_rx,
            Arc::clone(directory),
            identity,
        );
    }
    established
}

/// Dials a peer, registers it, and announces our own listening port.
async fn connect_peer(
    directory: &Directory,
    identity: PeerId,
    id: PeerId,
) -> Option<OutboundPeer> {
    let mut stream = match TcpStream::connect((id.host, id.port)).await {
        Ok(stream) => {
            info!(peer = %id, "connection established");
            stream
        }
        Err(err) => {
            warn!(peer = %id, error = ?err, "connection failed");
            return None;
        }
    };

    let (outbox, outbox_rx) = mpsc::unbounded_channel();
    directory.register_peer(id, outbox.clone()).await;

    if let Err(err) = write_frame(&mut stream, &Frame::register_peer(identity.port)).await {
        warn!(peer = %id, error = ?err, "failed to announce ourselves");
        directory.remove_peer(id, &outbox).await;
        return None;
    }

    Some(OutboundPeer {
        id,
        stream,
        outbox,
        outbox_rx,
    })
}

/// Sends a peer-list request and blocks on the connection's normal receive
/// path for the answer. No extra timeout is layered on top.
async fn request_peer_list(stream: &mut TcpStream) -> io::Result<Vec<PeerId>> {
    write_frame(stream, &Frame::peer_list_request()).await?;

    match read_frame(stream).await? {
        Some(frame) if frame.kind() == Some(FrameKind::PeerList) => {
            let mut discovered = Vec::new();
            for entry in frame.entries() {
                match PeerId::parse(entry) {
                    Some(addr) => discovered.push(addr),
                    None => warn!(entry, "skipping unparseable peer address"),
                }
            }
            Ok(discovered)
        }
        Some(frame) => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unexpected reply to peer list request: {:?}", frame.wire_tag()),
        )),
        None => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "peer closed the connection during the exchange",
        )),
    }
}
