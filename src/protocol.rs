//! Wire format: a fixed 12-byte header followed by an optional payload.
//!
//! ```text
//! offset size field
//!   0    1   type
//!   1    1   id
//!   2    1   role
//!   3    2   size            (payload length, big-endian)
//!   5    4   timestamp_sec   (big-endian)
//!   9    4   timestamp_nsec  (big-endian)
//! ```
//!
//! All multi-byte fields are big-endian on the wire. `tokio`'s
//! `AsyncReadExt::read_u16`/`read_u32` (and the `write_*` counterparts)
//! already operate in network byte order, so no separate byte-order crate
//! is needed here.

use std::time::{SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ProtoError, ProtoResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Login = 0x10,
    Users = 0x11,
    Invite = 0x12,
    Revoke = 0x13,
    Decline = 0x14,
    Accept = 0x15,
    Move = 0x16,
    Resign = 0x17,
    Ack = 0x20,
    Nack = 0x21,
    Invited = 0x22,
    Revoked = 0x23,
    Declined = 0x24,
    Accepted = 0x25,
    Moved = 0x26,
    Resigned = 0x27,
    Ended = 0x28,
}

impl PacketType {
    pub fn from_u8(b: u8) -> Option<Self> {
        use PacketType::*;
        Some(match b {
            0x10 => Login,
            0x11 => Users,
            0x12 => Invite,
            0x13 => Revoke,
            0x14 => Decline,
            0x15 => Accept,
            0x16 => Move,
            0x17 => Resign,
            0x20 => Ack,
            0x21 => Nack,
            0x22 => Invited,
            0x23 => Revoked,
            0x24 => Declined,
            0x25 => Accepted,
            0x26 => Moved,
            0x27 => Resigned,
            0x28 => Ended,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PacketHeader {
    pub kind: u8,
    pub id: u8,
    pub role: u8,
    pub size: u16,
    pub timestamp_sec: u32,
    pub timestamp_nsec: u32,
}

impl PacketHeader {
    pub fn new(kind: PacketType, id: u8, role: u8, size: u16) -> Self {
        Self {
            kind: kind as u8,
            id,
            role,
            size,
            timestamp_sec: 0,
            timestamp_nsec: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(kind: PacketType, id: u8, role: u8, payload: Vec<u8>) -> Self {
        let size = payload.len() as u16;
        Self {
            header: PacketHeader::new(kind, id, role, size),
            payload,
        }
    }

    pub fn empty(kind: PacketType, id: u8, role: u8) -> Self {
        Self::new(kind, id, role, Vec::new())
    }

    pub fn kind(&self) -> Option<PacketType> {
        PacketType::from_u8(self.header.kind)
    }

    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Write `pkt` to `w`, stamping the header with the current wall-clock
/// time. The caller's serialization (e.g. a session's writer task) is what
/// makes concurrent sends to the same connection atomic; this function
/// itself is stateless.
pub async fn encode_into<W: AsyncWrite + Unpin>(w: &mut W, pkt: &Packet) -> ProtoResult<()> {
    let (secs, nanos) = now_parts();
    w.write_u8(pkt.header.kind).await?;
    w.write_u8(pkt.header.id).await?;
    w.write_u8(pkt.header.role).await?;
    w.write_u16(pkt.payload.len() as u16).await?;
    w.write_u32(secs).await?;
    w.write_u32(nanos).await?;
    if !pkt.payload.is_empty() {
        w.write_all(&pkt.payload).await?;
    }
    w.flush().await?;
    Ok(())
}

/// Read exactly one packet from `r`, blocking (asynchronously) until the
/// full header and payload have arrived. EOF or a short read on the header
/// is reported as `ProtoError::Disconnected`.
pub async fn decode_from<R: AsyncRead + Unpin>(r: &mut R) -> ProtoResult<Packet> {
    let kind = r.read_u8().await.map_err(|_| ProtoError::Disconnected)?;
    let id = r.read_u8().await.map_err(|_| ProtoError::Disconnected)?;
    let role = r.read_u8().await.map_err(|_| ProtoError::Disconnected)?;
    let size = r.read_u16().await.map_err(|_| ProtoError::Disconnected)?;
    let timestamp_sec = r.read_u32().await.map_err(|_| ProtoError::Disconnected)?;
    let timestamp_nsec = r.read_u32().await.map_err(|_| ProtoError::Disconnected)?;

    let mut payload = vec![0u8; size as usize];
    if size > 0 {
        r.read_exact(&mut payload)
            .await
            .map_err(|_| ProtoError::Disconnected)?;
    }

    Ok(Packet {
        header: PacketHeader {
            kind,
            id,
            role,
            size,
            timestamp_sec,
            timestamp_nsec,
        },
        payload,
    })
}

fn now_parts() -> (u32, u32) {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => (d.as_secs() as u32, d.subsec_nanos()),
        Err(_) => (0, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn header_round_trips_over_duplex_stream() {
        let (mut a, mut b) = tokio::io::duplex(256);
        let pkt = Packet::new(PacketType::Invited, 7, 1, b"alice".to_vec());
        encode_into(&mut a, &pkt).await.unwrap();
        let decoded = decode_from(&mut b).await.unwrap();
        assert_eq!(decoded.header.kind, PacketType::Invited as u8);
        assert_eq!(decoded.header.id, 7);
        assert_eq!(decoded.header.role, 1);
        assert_eq!(decoded.payload, b"alice");
    }

    #[tokio::test]
    async fn empty_payload_round_trips() {
        let (mut a, mut b) = tokio::io::duplex(64);
        let pkt = Packet::empty(PacketType::Ack, 0, 0);
        encode_into(&mut a, &pkt).await.unwrap();
        let decoded = decode_from(&mut b).await.unwrap();
        assert_eq!(decoded.header.size, 0);
        assert!(decoded.payload.is_empty());
    }

    #[tokio::test]
    async fn eof_on_short_read_is_disconnected() {
        let (a, mut b) = tokio::io::duplex(64);
        drop(a);
        let err = decode_from(&mut b).await.unwrap_err();
        assert!(matches!(err, ProtoError::Disconnected));
    }

    #[test]
    fn packet_type_round_trips_known_values() {
        for b in [
            0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x20, 0x21, 0x22, 0x23, 0x24, 0x25,
            0x26, 0x27, 0x28,
        ] {
            assert_eq!(PacketType::from_u8(b).unwrap() as u8, b);
        }
        assert!(PacketType::from_u8(0x99).is_none());
    }
}
