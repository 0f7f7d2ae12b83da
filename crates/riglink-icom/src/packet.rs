//! Network packet encoder/decoder.
//!
//! Every datagram exchanged with the radio on any channel starts with the
//! same fixed header, followed by a type-specific payload. This module does
//! framing and type discrimination only; it never encrypts or compresses.
//!
//! # Frame format
//!
//! ```text
//! offset  size  field
//! 0       4     total length (header + payload), little-endian
//! 4       2     type code, little-endian
//! 6       2     sequence number, little-endian
//! 8       4     sender identifier, little-endian
//! 12      4     receiver identifier, little-endian
//! 16      n     payload
//! ```
//!
//! Unknown type codes decode successfully as [`PacketType::Unrecognized`];
//! the state machine ignores them.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use riglink_core::audio::PcmBlock;
use riglink_core::types::Credentials;

/// Size of the fixed header in bytes.
pub const HEADER_LEN: usize = 16;

/// Size of each NUL-padded field in a login request.
pub const LOGIN_FIELD_LEN: usize = 16;

/// Login response status for a successful authentication.
pub const LOGIN_OK: u32 = 0;

/// Packet type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Discovery probe from the client.
    AreYouThere,
    /// Discovery reply from the radio, carrying its identifier.
    IAmHere,
    /// Client asks whether the radio is ready.
    AreYouReady,
    /// Radio reports ready.
    IAmReady,
    /// Credentials from the client.
    LoginRequest,
    /// Authentication result from the radio.
    LoginResponse,
    /// Liveness ping (either direction).
    PingRequest,
    /// Reply to a liveness ping.
    PingResponse,
    /// Session teardown (either direction).
    Disconnect,
    /// PCM audio frame.
    AudioData,
    /// Any type code this codec does not know.
    Unrecognized(u16),
}

impl PacketType {
    /// The wire type code.
    pub fn code(&self) -> u16 {
        match self {
            PacketType::AreYouThere => 0x03,
            PacketType::IAmHere => 0x04,
            PacketType::Disconnect => 0x05,
            PacketType::AreYouReady => 0x06,
            PacketType::PingRequest => 0x07,
            PacketType::PingResponse => 0x08,
            PacketType::IAmReady => 0x09,
            PacketType::LoginRequest => 0x0A,
            PacketType::LoginResponse => 0x0B,
            PacketType::AudioData => 0x0C,
            PacketType::Unrecognized(code) => *code,
        }
    }

    /// Classify a wire type code.
    pub fn from_code(code: u16) -> PacketType {
        match code {
            0x03 => PacketType::AreYouThere,
            0x04 => PacketType::IAmHere,
            0x05 => PacketType::Disconnect,
            0x06 => PacketType::AreYouReady,
            0x07 => PacketType::PingRequest,
            0x08 => PacketType::PingResponse,
            0x09 => PacketType::IAmReady,
            0x0A => PacketType::LoginRequest,
            0x0B => PacketType::LoginResponse,
            0x0C => PacketType::AudioData,
            other => PacketType::Unrecognized(other),
        }
    }
}

/// Why a datagram could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Fewer bytes than a header.
    #[error("truncated packet: {len} bytes, header needs 16")]
    Truncated { len: usize },

    /// The length field disagrees with the datagram size.
    #[error("length field {declared} does not match datagram size {actual}")]
    LengthMismatch { declared: usize, actual: usize },
}

/// A decoded packet. Immutable once built; re-encode by building a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcomPacket {
    packet_type: PacketType,
    sequence: u16,
    sender_id: u32,
    receiver_id: u32,
    payload: Bytes,
}

impl IcomPacket {
    /// Build a packet from its parts.
    pub fn new(
        packet_type: PacketType,
        sequence: u16,
        sender_id: u32,
        receiver_id: u32,
        payload: impl Into<Bytes>,
    ) -> IcomPacket {
        IcomPacket {
            packet_type,
            sequence,
            sender_id,
            receiver_id,
            payload: payload.into(),
        }
    }

    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    pub fn sender_id(&self) -> u32 {
        self.sender_id
    }

    pub fn receiver_id(&self) -> u32 {
        self.receiver_id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        encode(
            self.packet_type,
            self.sequence,
            self.sender_id,
            self.receiver_id,
            &self.payload,
        )
    }

    // -- Client-side constructors -------------------------------------------

    /// Discovery probe. The radio's identifier is not known yet.
    pub fn are_you_there(our_id: u32) -> IcomPacket {
        IcomPacket::new(PacketType::AreYouThere, 0, our_id, 0, Bytes::new())
    }

    /// Readiness probe carrying both identifiers.
    pub fn are_you_ready(our_id: u32, their_id: u32) -> IcomPacket {
        IcomPacket::new(PacketType::AreYouReady, 0, our_id, their_id, Bytes::new())
    }

    /// Login request with NUL-padded credential fields.
    ///
    /// Fields longer than [`LOGIN_FIELD_LEN`] are truncated; the session
    /// builder rejects such credentials before they get here.
    pub fn login_request(
        sequence: u16,
        our_id: u32,
        their_id: u32,
        credentials: &Credentials,
        client_name: &str,
    ) -> IcomPacket {
        let mut payload = BytesMut::with_capacity(LOGIN_FIELD_LEN * 3);
        put_padded(&mut payload, &credentials.username);
        put_padded(&mut payload, &credentials.password);
        put_padded(&mut payload, client_name);
        IcomPacket::new(
            PacketType::LoginRequest,
            sequence,
            our_id,
            their_id,
            payload.freeze(),
        )
    }

    /// Liveness ping carrying a millisecond timestamp.
    pub fn ping_request(sequence: u16, our_id: u32, their_id: u32, timestamp_ms: u32) -> IcomPacket {
        IcomPacket::new(
            PacketType::PingRequest,
            sequence,
            our_id,
            their_id,
            Bytes::copy_from_slice(&timestamp_ms.to_le_bytes()),
        )
    }

    /// Reply to a ping, echoing its sequence number and payload.
    pub fn ping_response(request: &IcomPacket, our_id: u32, their_id: u32) -> IcomPacket {
        IcomPacket::new(
            PacketType::PingResponse,
            request.sequence,
            our_id,
            their_id,
            request.payload.clone(),
        )
    }

    /// Session teardown.
    pub fn disconnect(our_id: u32, their_id: u32) -> IcomPacket {
        IcomPacket::new(PacketType::Disconnect, 0, our_id, their_id, Bytes::new())
    }

    /// One frame of PCM audio.
    pub fn audio_data(sequence: u16, our_id: u32, their_id: u32, block: &PcmBlock) -> IcomPacket {
        IcomPacket::new(
            PacketType::AudioData,
            sequence,
            our_id,
            their_id,
            block.to_le_bytes(),
        )
    }

    // -- Radio-side constructors (used by tests and simulators) --------------

    /// Discovery reply announcing `device_id`.
    pub fn i_am_here(sender_id: u32, receiver_id: u32, device_id: u32) -> IcomPacket {
        IcomPacket::new(
            PacketType::IAmHere,
            0,
            sender_id,
            receiver_id,
            Bytes::copy_from_slice(&device_id.to_le_bytes()),
        )
    }

    /// Readiness reply.
    pub fn i_am_ready(sender_id: u32, receiver_id: u32) -> IcomPacket {
        IcomPacket::new(PacketType::IAmReady, 0, sender_id, receiver_id, Bytes::new())
    }

    /// Authentication result correlated with the login's sequence number.
    pub fn login_response(
        sequence: u16,
        sender_id: u32,
        receiver_id: u32,
        status: u32,
        token: u32,
    ) -> IcomPacket {
        let mut payload = BytesMut::with_capacity(8);
        payload.put_u32_le(status);
        payload.put_u32_le(token);
        IcomPacket::new(
            PacketType::LoginResponse,
            sequence,
            sender_id,
            receiver_id,
            payload.freeze(),
        )
    }

    // -- Payload accessors ----------------------------------------------------

    /// The device identifier announced in an IAmHere, falling back to the
    /// header sender id when the payload is absent.
    pub fn device_identifier(&self) -> u32 {
        if self.payload.len() >= 4 {
            let mut p = &self.payload[..4];
            p.get_u32_le()
        } else {
            self.sender_id
        }
    }

    /// Parse a LoginResponse payload.
    pub fn login_reply(&self) -> Option<LoginReply> {
        if self.packet_type != PacketType::LoginResponse || self.payload.len() < 4 {
            return None;
        }
        let mut p = &self.payload[..];
        let status = p.get_u32_le();
        let token = if p.remaining() >= 4 { p.get_u32_le() } else { 0 };
        Some(LoginReply { status, token })
    }

    /// The PCM samples of an AudioData packet.
    pub fn pcm(&self) -> PcmBlock {
        PcmBlock::from_le_bytes(&self.payload)
    }
}

/// Decoded LoginResponse payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginReply {
    /// [`LOGIN_OK`] on success; anything else is a rejection.
    pub status: u32,
    /// Session token assigned by the radio.
    pub token: u32,
}

impl LoginReply {
    pub fn is_success(&self) -> bool {
        self.status == LOGIN_OK
    }
}

fn put_padded(buf: &mut BytesMut, field: &str) {
    let bytes = field.as_bytes();
    let n = bytes.len().min(LOGIN_FIELD_LEN);
    buf.put_slice(&bytes[..n]);
    buf.put_bytes(0, LOGIN_FIELD_LEN - n);
}

/// Encode a packet into raw bytes ready for transmission.
///
/// # Example
///
/// ```
/// use riglink_icom::packet::{encode, PacketType};
///
/// let bytes = encode(PacketType::AreYouThere, 0, 0x1122_3344, 0, &[]);
/// assert_eq!(bytes.len(), 16);
/// assert_eq!(&bytes[0..4], &[0x10, 0x00, 0x00, 0x00]);
/// assert_eq!(&bytes[4..6], &[0x03, 0x00]);
/// ```
pub fn encode(
    packet_type: PacketType,
    sequence: u16,
    sender_id: u32,
    receiver_id: u32,
    payload: &[u8],
) -> Vec<u8> {
    let total = HEADER_LEN + payload.len();
    let mut buf = BytesMut::with_capacity(total);
    buf.put_u32_le(total as u32);
    buf.put_u16_le(packet_type.code());
    buf.put_u16_le(sequence);
    buf.put_u32_le(sender_id);
    buf.put_u32_le(receiver_id);
    buf.put_slice(payload);
    buf.to_vec()
}

/// Decode one datagram.
///
/// # Example
///
/// ```
/// use riglink_icom::packet::{decode, encode, PacketType};
///
/// let wire = encode(PacketType::IAmReady, 0, 0x1234, 0x5678, &[]);
/// let packet = decode(&wire).unwrap();
/// assert_eq!(packet.packet_type(), PacketType::IAmReady);
/// assert_eq!(packet.receiver_id(), 0x5678);
/// ```
pub fn decode(datagram: &[u8]) -> Result<IcomPacket, DecodeError> {
    if datagram.len() < HEADER_LEN {
        return Err(DecodeError::Truncated {
            len: datagram.len(),
        });
    }

    let mut header = &datagram[..HEADER_LEN];
    let declared = header.get_u32_le() as usize;
    if declared != datagram.len() {
        return Err(DecodeError::LengthMismatch {
            declared,
            actual: datagram.len(),
        });
    }

    let packet_type = PacketType::from_code(header.get_u16_le());
    let sequence = header.get_u16_le();
    let sender_id = header.get_u32_le();
    let receiver_id = header.get_u32_le();

    Ok(IcomPacket {
        packet_type,
        sequence,
        sender_id,
        receiver_id,
        payload: Bytes::copy_from_slice(&datagram[HEADER_LEN..]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        let bytes = encode(PacketType::PingRequest, 0x0102, 0xAABBCCDD, 0x11223344, &[0xEE]);
        assert_eq!(
            bytes,
            vec![
                0x11, 0x00, 0x00, 0x00, // length 17
                0x07, 0x00, // type
                0x02, 0x01, // seq
                0xDD, 0xCC, 0xBB, 0xAA, // sender
                0x44, 0x33, 0x22, 0x11, // receiver
                0xEE,
            ]
        );
    }

    #[test]
    fn decode_preserves_every_field() {
        let cases = [
            (PacketType::AreYouThere, 0u16, 1u32, 0u32, vec![]),
            (PacketType::LoginRequest, 0xFFFF, 0xDEADBEEF, 0x1234, vec![1, 2, 3]),
            (PacketType::AudioData, 42, 7, 8, vec![0u8; 320]),
            (PacketType::Unrecognized(0x77), 9, 1, 2, vec![0x55]),
        ];
        for (ty, seq, snd, rcv, payload) in cases {
            let packet = decode(&encode(ty, seq, snd, rcv, &payload)).unwrap();
            assert_eq!(packet.packet_type(), ty);
            assert_eq!(packet.sequence(), seq);
            assert_eq!(packet.sender_id(), snd);
            assert_eq!(packet.receiver_id(), rcv);
            assert_eq!(packet.payload(), &payload[..]);
        }
    }

    #[test]
    fn every_known_code_classifies_back() {
        let known = [
            PacketType::AreYouThere,
            PacketType::IAmHere,
            PacketType::AreYouReady,
            PacketType::IAmReady,
            PacketType::LoginRequest,
            PacketType::LoginResponse,
            PacketType::PingRequest,
            PacketType::PingResponse,
            PacketType::Disconnect,
            PacketType::AudioData,
        ];
        for ty in known {
            assert_eq!(PacketType::from_code(ty.code()), ty);
        }
        assert_eq!(PacketType::from_code(0x00), PacketType::Unrecognized(0x00));
    }

    #[test]
    fn truncated_header() {
        assert_eq!(
            decode(&[0x10, 0x00, 0x00]),
            Err(DecodeError::Truncated { len: 3 })
        );
        assert_eq!(decode(&[]), Err(DecodeError::Truncated { len: 0 }));
    }

    #[test]
    fn length_field_mismatch() {
        let mut bytes = encode(PacketType::IAmHere, 0, 1, 2, &[0, 0, 0, 0]);
        bytes.pop();
        assert_eq!(
            decode(&bytes),
            Err(DecodeError::LengthMismatch {
                declared: 20,
                actual: 19
            })
        );
    }

    #[test]
    fn i_am_here_device_identifier() {
        let packet = decode(&IcomPacket::i_am_here(0x99, 0x42, 0x1234).encode()).unwrap();
        assert_eq!(packet.device_identifier(), 0x1234);

        let bare = IcomPacket::new(PacketType::IAmHere, 0, 0x5555, 0x42, Bytes::new());
        assert_eq!(bare.device_identifier(), 0x5555);
    }

    #[test]
    fn login_request_fields_are_padded() {
        let creds = Credentials::new("w1aw", "secret");
        let packet = IcomPacket::login_request(0, 1, 2, &creds, "riglink");
        let p = packet.payload();
        assert_eq!(p.len(), LOGIN_FIELD_LEN * 3);
        assert_eq!(&p[..4], b"w1aw");
        assert!(p[4..16].iter().all(|&b| b == 0));
        assert_eq!(&p[16..22], b"secret");
        assert_eq!(&p[32..39], b"riglink");
    }

    #[test]
    fn login_request_truncates_long_fields() {
        let creds = Credentials::new("a".repeat(20), "");
        let packet = IcomPacket::login_request(0, 1, 2, &creds, "");
        assert_eq!(&packet.payload()[..16], "a".repeat(16).as_bytes());
    }

    #[test]
    fn login_reply_parsing() {
        let ok = IcomPacket::login_response(3, 1, 2, LOGIN_OK, 0xCAFE);
        let reply = ok.login_reply().unwrap();
        assert!(reply.is_success());
        assert_eq!(reply.token, 0xCAFE);

        let rejected = IcomPacket::login_response(3, 1, 2, 0xFEFF_FFFF, 0);
        assert!(!rejected.login_reply().unwrap().is_success());

        let short = IcomPacket::new(PacketType::LoginResponse, 3, 1, 2, vec![0u8, 0]);
        assert!(short.login_reply().is_none());

        let wrong_type = IcomPacket::i_am_ready(1, 2);
        assert!(wrong_type.login_reply().is_none());
    }

    #[test]
    fn ping_response_echoes_request() {
        let request = IcomPacket::ping_request(77, 0xA, 0xB, 123_456);
        let response = IcomPacket::ping_response(&request, 0xB, 0xA);
        assert_eq!(response.packet_type(), PacketType::PingResponse);
        assert_eq!(response.sequence(), 77);
        assert_eq!(response.payload(), request.payload());
        assert_eq!(response.sender_id(), 0xB);
    }

    #[test]
    fn audio_payload_is_le_pcm() {
        let block = PcmBlock::new(vec![-2, 1000]);
        let packet = decode(&IcomPacket::audio_data(5, 1, 2, &block).encode()).unwrap();
        assert_eq!(packet.payload(), &[0xFE, 0xFF, 0xE8, 0x03]);
        assert_eq!(packet.pcm(), block);
    }
}
