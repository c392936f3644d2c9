use tracing::{info, warn};

use crate::{
    directory::{Directory, Outbox, PeerId},
    frame::Frame,
};

/// Routes one message frame.
///
/// Direct delivery when the recipient is registered locally; otherwise a
/// single-hop broadcast to every peer, unless the frame itself arrived from
/// a peer, in which case it is dropped. That drop is the network's sole
/// loop-prevention mechanism: no TTL, no message IDs.
pub async fn deliver_or_broadcast(directory: &Directory, frame: Frame, origin_is_peer: bool) {
    let (sender, recipient) = match frame.message_parts() {
        Some((sender, recipient, _)) => (sender.to_string(), recipient.to_string()),
        None => {
            warn!("malformed message payload, discarding");
            return;
        }
    };

    if let Some(outbox) = directory.client_outbox(&recipient).await {
        info!(%sender, %recipient, "forwarding message");
        if outbox.send(frame).is_err() {
            warn!(%recipient, "recipient connection gone, message dropped");
        }
        return;
    }

    if origin_is_peer {
        info!(%sender, %recipient, "undeliverable peer broadcast, dropping");
        return;
    }

    let peers = directory.peer_outboxes().await;
    if peers.is_empty() {
        info!(%sender, %recipient, "recipient unknown and no peers connected, dropping");
        return;
    }

    info!(%sender, %recipient, peers = peers.len(), "broadcasting message");
    for (id, outbox) in peers {
        // The forwarded frame is the inbound frame unmodified; a dead peer
        // only costs that one leg of the fan-out.
        if outbox.send(frame.clone()).is_err() {
            warn!(peer = %id, "peer connection gone, skipping");
        }
    }
}

/// Answers a peer-list request: every known peer plus our own identity.
/// The requester is responsible for skipping itself.
pub async fn send_peer_list(directory: &Directory, identity: PeerId, requester: &Outbox) {
    let mut entries: Vec<String> = directory
        .peer_ids()
        .await
        .iter()
        .map(PeerId::to_string)
        .collect();
    entries.push(identity.to_string());
    if requester.send(Frame::peer_list(&entries)).is_err() {
        warn!("requester gone before peer list reply");
    }
}

/// Answers a client-list request with the locally-registered usernames only;
/// remote clients are reachable by broadcast, not discoverable.
pub async fn send_client_list(directory: &Directory, requester: &Outbox) {
    let names = directory.client_names().await;
    if requester.send(Frame::client_list(&names)).is_err() {
        warn!("requester gone before client list reply");
    }
}
