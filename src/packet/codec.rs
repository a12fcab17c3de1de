//! Wire format of the frame, frame address and protocol headers.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{Header, Message, MessageType, Payload};
use crate::errors::Error;
use crate::types::Source;

type Result<T> = std::result::Result<T, Error>;

/// Length of the combined headers preceding every payload.
pub const HEADER_SIZE: usize = 36;
pub const PROTOCOL_NUMBER: u16 = 1024;
pub const LABEL_SIZE: usize = 32;
pub(crate) const ECHO_SIZE: usize = 64;

const PROTOCOL_MASK: u16 = 0x0fff;
const ADDRESSABLE: u16 = 1 << 12;
const TAGGED: u16 = 1 << 13;
const RES_REQUIRED: u8 = 1 << 0;
const ACK_REQUIRED: u8 = 1 << 1;
const TARGET_ID_BYTES: usize = 6;

/// Serialize a message into a datagram.
///
/// A message without a target is sent tagged, which makes every device on the
/// segment process it.
///
/// # Examples
///
/// ```
/// use lifx_lan_client::{Message, Payload, encode, HEADER_SIZE};
///
/// let bytes = encode(&Message::new(Payload::GetService)).unwrap();
/// assert_eq!(bytes.len(), HEADER_SIZE);
/// ```
pub fn encode(message: &Message) -> Result<Bytes> {
    let mut body = BytesMut::new();
    message.payload.encode(&mut body);

    let size = HEADER_SIZE + body.len();
    let mut buf = BytesMut::with_capacity(size);

    // frame
    buf.put_u16_le(size as u16);
    let mut protocol = PROTOCOL_NUMBER | ADDRESSABLE;
    if message.header.target.is_none() {
        protocol |= TAGGED;
    }
    buf.put_u16_le(protocol);
    buf.put_slice(&message.header.source.value().to_be_bytes());

    // frame address
    buf.put_slice(&target_to_bytes(message.header.target.as_deref())?);
    buf.put_bytes(0, 6);
    let mut flags = 0u8;
    if message.header.res_required {
        flags |= RES_REQUIRED;
    }
    if message.header.ack_required {
        flags |= ACK_REQUIRED;
    }
    buf.put_u8(flags);
    buf.put_u8(message.header.sequence);

    // protocol header
    buf.put_u64_le(0);
    buf.put_u16_le(message.message_type().id());
    buf.put_u16_le(0);

    buf.put_slice(&body);
    Ok(buf.freeze())
}

/// Parse a datagram into a message.
///
/// Fails with [`Error::Malformed`] for truncated or inconsistent frames and
/// [`Error::Range`] for message types this client does not know.
pub fn decode(bytes: &[u8]) -> Result<Message> {
    if bytes.len() < HEADER_SIZE {
        return Err(Error::Malformed(format!(
            "datagram of {} bytes is shorter than the header",
            bytes.len()
        )));
    }

    let mut buf = bytes;
    let size = buf.get_u16_le() as usize;
    if size != bytes.len() {
        return Err(Error::Malformed(format!(
            "size field {size} does not match datagram length {}",
            bytes.len()
        )));
    }
    let protocol = buf.get_u16_le();
    if protocol & PROTOCOL_MASK != PROTOCOL_NUMBER {
        return Err(Error::Malformed(format!(
            "unsupported protocol {}",
            protocol & PROTOCOL_MASK
        )));
    }

    let mut source = [0u8; 4];
    buf.copy_to_slice(&mut source);
    let mut target = [0u8; 8];
    buf.copy_to_slice(&mut target);
    buf.advance(6);
    let flags = buf.get_u8();
    let sequence = buf.get_u8();
    buf.advance(8);
    let type_id = buf.get_u16_le();
    buf.advance(2);

    let kind = MessageType::from_repr(type_id)
        .ok_or_else(|| Error::range(format!("unknown packet type {type_id}")))?;

    Ok(Message {
        header: Header {
            source: Source::new(u32::from_be_bytes(source)),
            target: target_from_bytes(&target),
            ack_required: flags & ACK_REQUIRED != 0,
            res_required: flags & RES_REQUIRED != 0,
            sequence,
        },
        payload: Payload::decode(kind, buf)?,
    })
}

fn target_to_bytes(target: Option<&str>) -> Result<[u8; 8]> {
    let mut bytes = [0u8; 8];
    let Some(target) = target else {
        return Ok(bytes);
    };

    if target.len() != TARGET_ID_BYTES * 2 || !target.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::invalid(format!(
            "target must be 12 hex characters, got {target:?}"
        )));
    }
    for (i, byte) in bytes.iter_mut().take(TARGET_ID_BYTES).enumerate() {
        *byte = u8::from_str_radix(&target[i * 2..i * 2 + 2], 16)
            .map_err(|e| Error::invalid(e.to_string()))?;
    }
    Ok(bytes)
}

fn target_from_bytes(bytes: &[u8; 8]) -> Option<String> {
    let id = &bytes[..TARGET_ID_BYTES];
    if id.iter().all(|b| *b == 0) {
        return None;
    }
    Some(id.iter().map(|b| format!("{b:02x}")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_service() -> Message {
        Message {
            header: Header {
                source: "0c583dd9".parse().unwrap(),
                target: Some("d073d5006d72".into()),
                ack_required: false,
                res_required: false,
                sequence: 0,
            },
            payload: Payload::StateService {
                service: Payload::SERVICE_UDP,
                port: 56700,
            },
        }
    }

    #[test]
    fn test_header_layout() {
        let mut msg = Message::new(Payload::GetLabel).with_target("d073d5006d72");
        msg.header.source = "12345678".parse().unwrap();
        msg.header.sequence = 7;
        msg.header.res_required = true;

        let bytes = encode(&msg).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(&bytes[0..2], &[36, 0]);
        // protocol 1024, addressable, not tagged
        assert_eq!(u16::from_le_bytes([bytes[2], bytes[3]]), 0x1400);
        assert_eq!(&bytes[4..8], &[0x12, 0x34, 0x56, 0x78]);
        assert_eq!(&bytes[8..14], &[0xd0, 0x73, 0xd5, 0x00, 0x6d, 0x72]);
        assert_eq!(bytes[22], RES_REQUIRED);
        assert_eq!(bytes[23], 7);
        assert_eq!(u16::from_le_bytes([bytes[32], bytes[33]]), 23);
    }

    #[test]
    fn test_untargeted_messages_are_tagged() {
        let bytes = encode(&Message::new(Payload::GetService)).unwrap();
        let protocol = u16::from_le_bytes([bytes[2], bytes[3]]);
        assert_ne!(protocol & TAGGED, 0);
        assert!(bytes[8..16].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_decode_state_service() {
        let original = state_service();
        let decoded = decode(&encode(&original).unwrap()).unwrap();
        assert_eq!(decoded, original);
        assert_eq!(decoded.message_type(), MessageType::StateService);
        assert_eq!(decoded.source().to_string(), "0c583dd9");
    }

    #[test]
    fn test_rejects_bad_targets() {
        for bad in ["d073d5006d7", "d073d5006d72ff", "zz73d5006d72"] {
            let msg = Message::new(Payload::GetPower).with_target(bad);
            assert!(matches!(encode(&msg), Err(Error::InvalidArgument(_))), "{bad}");
        }
    }

    #[test]
    fn test_rejects_truncated_datagrams() {
        assert!(matches!(decode(&[0u8; 10]), Err(Error::Malformed(_))));

        let bytes = encode(&state_service()).unwrap();
        assert!(matches!(
            decode(&bytes[..bytes.len() - 1]),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn test_unknown_type_is_a_range_error() {
        let mut bytes = encode(&Message::new(Payload::GetService)).unwrap().to_vec();
        bytes[32..34].copy_from_slice(&999u16.to_le_bytes());
        assert!(matches!(decode(&bytes), Err(Error::Range(_))));
    }

    #[test]
    fn test_wrong_protocol_is_malformed() {
        let mut bytes = encode(&Message::new(Payload::GetService)).unwrap().to_vec();
        bytes[2..4].copy_from_slice(&(ADDRESSABLE | 1).to_le_bytes());
        assert!(matches!(decode(&bytes), Err(Error::Malformed(_))));
    }
}
