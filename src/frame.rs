use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Fixed header size: type, subtype, payload length, auxiliary length.
pub const HEADER_LEN: usize = 6;

/// Payload length travels in a u16, so frames cap out at 65535 bytes.
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// The closed set of (type, subtype) pairs the protocol defines.
///
/// A header is self-describing regardless of the sender's role, so decoding
/// never depends on who sent the frame; the pair only selects how the payload
/// is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// 0/0: ask for the peer-server directory. Empty payload.
    PeerListRequest,
    /// 0/1: ask for the local client directory. Empty payload.
    ClientListRequest,
    /// 1/0: answer: NUL-joined `host:port` entries.
    PeerList,
    /// 1/1: answer: NUL-joined usernames.
    ClientList,
    /// 2/0: register the connection as a peer server; payload is the
    /// announced listening port as decimal text.
    RegisterPeer,
    /// 2/1: register the connection as a client; payload is the username.
    RegisterClient,
    /// 3/0: relay a message; payload is `sender\0recipient\0body`.
    Message,
}

impl FrameKind {
    pub fn from_wire(frame_type: u8, subtype: u8) -> Option<Self> {
        match (frame_type, subtype) {
            (0, 0) => Some(FrameKind::PeerListRequest),
            (0, 1) => Some(FrameKind::ClientListRequest),
            (1, 0) => Some(FrameKind::PeerList),
            (1, 1) => Some(FrameKind::ClientList),
            (2, 0) => Some(FrameKind::RegisterPeer),
            (2, 1) => Some(FrameKind::RegisterClient),
            (3, 0) => Some(FrameKind::Message),
            _ => None,
        }
    }

    pub fn to_wire(self) -> (u8, u8) {
        match self {
            FrameKind::PeerListRequest => (0, 0),
            FrameKind::ClientListRequest => (0, 1),
            FrameKind::PeerList => (1, 0),
            FrameKind::ClientList => (1, 1),
            FrameKind::RegisterPeer => (2, 0),
            FrameKind::RegisterClient => (2, 1),
            FrameKind::Message => (3, 0),
        }
    }
}

/// One protocol frame: header fields plus the raw payload.
///
/// The raw (type, subtype) tag is kept even when it maps to no [`FrameKind`]
/// so an unknown frame can be logged and skipped without losing stream
/// alignment, and so a forwarded frame re-encodes byte-identically
/// (`aux_len` included).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    frame_type: u8,
    subtype: u8,
    aux_len: u16,
    payload: Vec<u8>,
}

impl Frame {
    fn tagged(kind: FrameKind, payload: Vec<u8>) -> Self {
        let (frame_type, subtype) = kind.to_wire();
        Self {
            frame_type,
            subtype,
            aux_len: 0,
            payload,
        }
    }

    pub fn peer_list_request() -> Self {
        Self::tagged(FrameKind::PeerListRequest, Vec::new())
    }

    pub fn client_list_request() -> Self {
        Self::tagged(FrameKind::ClientListRequest, Vec::new())
    }

    pub fn peer_list<S: AsRef<str>>(entries: &[S]) -> Self {
        Self::tagged(FrameKind::PeerList, join_entries(entries))
    }

    pub fn client_list<S: AsRef<str>>(entries: &[S]) -> Self {
        Self::tagged(FrameKind::ClientList, join_entries(entries))
    }

    pub fn register_peer(port: u16) -> Self {
        Self::tagged(FrameKind::RegisterPeer, port.to_string().into_bytes())
    }

    pub fn register_client(username: &str) -> Self {
        Self::tagged(FrameKind::RegisterClient, username.as_bytes().to_vec())
    }

    /// Builds a message frame. The auxiliary length records the recipient
    /// byte-length; receivers treat the field as advisory.
    pub fn message(sender: &str, recipient: &str, body: &str) -> Self {
        let payload = format!("{sender}\0{recipient}\0{body}").into_bytes();
        Self {
            frame_type: 3,
            subtype: 0,
            aux_len: u16::try_from(recipient.len()).unwrap_or(u16::MAX),
            payload,
        }
    }

    /// `None` means the (type, subtype) pair is outside the protocol.
    pub fn kind(&self) -> Option<FrameKind> {
        FrameKind::from_wire(self.frame_type, self.subtype)
    }

    pub fn wire_tag(&self) -> (u8, u8) {
        (self.frame_type, self.subtype)
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload as UTF-8 text, if it is valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// NUL-separated payload entries; empty for non-text or empty payloads.
    pub fn entries(&self) -> Vec<&str> {
        self.text()
            .map(|text| text.split('\0').filter(|entry| !entry.is_empty()).collect())
            .unwrap_or_default()
    }

    /// Splits a message payload into (sender, recipient, body).
    pub fn message_parts(&self) -> Option<(&str, &str, &str)> {
        let text = self.text()?;
        let mut parts = text.splitn(3, '\0');
        Some((parts.next()?, parts.next()?, parts.next()?))
    }

    /// Serializes header + payload. Fails if the payload exceeds the
    /// 16-bit length field.
    pub fn encode(&self) -> io::Result<Vec<u8>> {
        if self.payload.len() > MAX_PAYLOAD {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("payload of {} bytes exceeds frame limit", self.payload.len()),
            ));
        }
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buf.push(self.frame_type);
        buf.push(self.subtype);
        buf.extend_from_slice(&(self.payload.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.aux_len.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }
}

fn join_entries<S: AsRef<str>>(entries: &[S]) -> Vec<u8> {
    entries
        .iter()
        .map(|entry| entry.as_ref())
        .collect::<Vec<_>>()
        .join("\0")
        .into_bytes()
}

/// Reads one frame. Returns `Ok(None)` if the stream ends cleanly where a
/// header was expected; EOF mid-frame is an error. A zero-length payload
/// performs no further read.
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream closed mid-header",
            ));
        }
        filled += n;
    }

    let frame_type = header[0];
    let subtype = header[1];
    let len = u16::from_be_bytes([header[2], header[3]]) as usize;
    let aux_len = u16::from_be_bytes([header[4], header[5]]);

    let mut payload = vec![0u8; len];
    if len > 0 {
        reader.read_exact(&mut payload).await?;
    }

    Ok(Some(Frame {
        frame_type,
        subtype,
        aux_len,
        payload,
    }))
}

/// Writes header then payload and flushes. A failure here is terminal for
/// the connection; callers never retry.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let encoded = frame.encode()?;
    writer.write_all(&encoded).await?;
    writer.flush().await?;
    Ok(())
}
