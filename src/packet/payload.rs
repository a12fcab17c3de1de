//! Message payloads.

use bytes::{Buf, BufMut, BytesMut};

use super::MessageType;
use super::codec::{ECHO_SIZE, LABEL_SIZE};
use crate::errors::Error;
use crate::types::Hsbk;

type Result<T> = std::result::Result<T, Error>;

/// The body of a packet. Each variant corresponds to one [`MessageType`].
///
/// # Examples
///
/// ```
/// use lifx_lan_client::{MessageType, Payload};
///
/// let payload = Payload::SetPower { level: 65535 };
/// assert_eq!(payload.message_type(), MessageType::SetPower);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    GetService,
    StateService { service: u8, port: u32 },
    GetPower,
    SetPower { level: u16 },
    StatePower { level: u16 },
    GetLabel,
    SetLabel { label: String },
    StateLabel { label: String },
    GetVersion,
    StateVersion { vendor: u32, product: u32, version: u32 },
    Acknowledgement,
    EchoRequest { payload: Vec<u8> },
    EchoResponse { payload: Vec<u8> },
    GetLight,
    SetColor { color: Hsbk, duration: u32 },
    StateLight { color: Hsbk, power: u16, label: String },
    GetLightPower,
    SetLightPower { level: u16, duration: u32 },
    StateLightPower { level: u16 },
}

impl Payload {
    /// Service id advertised by devices reachable over UDP.
    pub const SERVICE_UDP: u8 = 1;

    pub fn message_type(&self) -> MessageType {
        match self {
            Payload::GetService => MessageType::GetService,
            Payload::StateService { .. } => MessageType::StateService,
            Payload::GetPower => MessageType::GetPower,
            Payload::SetPower { .. } => MessageType::SetPower,
            Payload::StatePower { .. } => MessageType::StatePower,
            Payload::GetLabel => MessageType::GetLabel,
            Payload::SetLabel { .. } => MessageType::SetLabel,
            Payload::StateLabel { .. } => MessageType::StateLabel,
            Payload::GetVersion => MessageType::GetVersion,
            Payload::StateVersion { .. } => MessageType::StateVersion,
            Payload::Acknowledgement => MessageType::Acknowledgement,
            Payload::EchoRequest { .. } => MessageType::EchoRequest,
            Payload::EchoResponse { .. } => MessageType::EchoResponse,
            Payload::GetLight => MessageType::GetLight,
            Payload::SetColor { .. } => MessageType::SetColor,
            Payload::StateLight { .. } => MessageType::StateLight,
            Payload::GetLightPower => MessageType::GetLightPower,
            Payload::SetLightPower { .. } => MessageType::SetLightPower,
            Payload::StateLightPower { .. } => MessageType::StateLightPower,
        }
    }

    /// The label carried by this payload, if any.
    pub fn label(&self) -> Option<&str> {
        match self {
            Payload::StateLabel { label }
            | Payload::SetLabel { label }
            | Payload::StateLight { label, .. } => Some(label),
            _ => None,
        }
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        match self {
            Payload::StateService { service, port } => {
                buf.put_u8(*service);
                buf.put_u32_le(*port);
            }
            Payload::SetPower { level }
            | Payload::StatePower { level }
            | Payload::StateLightPower { level } => buf.put_u16_le(*level),
            Payload::SetLabel { label } | Payload::StateLabel { label } => put_label(buf, label),
            Payload::StateVersion {
                vendor,
                product,
                version,
            } => {
                buf.put_u32_le(*vendor);
                buf.put_u32_le(*product);
                buf.put_u32_le(*version);
            }
            Payload::EchoRequest { payload } | Payload::EchoResponse { payload } => {
                let len = payload.len().min(ECHO_SIZE);
                buf.put_slice(&payload[..len]);
                buf.put_bytes(0, ECHO_SIZE - len);
            }
            Payload::SetColor { color, duration } => {
                buf.put_u8(0);
                put_hsbk(buf, color);
                buf.put_u32_le(*duration);
            }
            Payload::StateLight {
                color,
                power,
                label,
            } => {
                put_hsbk(buf, color);
                buf.put_i16_le(0);
                buf.put_u16_le(*power);
                put_label(buf, label);
                buf.put_u64_le(0);
            }
            Payload::SetLightPower { level, duration } => {
                buf.put_u16_le(*level);
                buf.put_u32_le(*duration);
            }
            Payload::GetService
            | Payload::GetPower
            | Payload::GetLabel
            | Payload::GetVersion
            | Payload::Acknowledgement
            | Payload::GetLight
            | Payload::GetLightPower => {}
        }
    }

    pub(crate) fn decode(kind: MessageType, mut buf: &[u8]) -> Result<Self> {
        let needed = body_size(kind);
        if buf.remaining() < needed {
            return Err(Error::Malformed(format!(
                "{kind} payload needs {needed} bytes, got {}",
                buf.remaining()
            )));
        }

        let payload = match kind {
            MessageType::GetService => Payload::GetService,
            MessageType::StateService => Payload::StateService {
                service: buf.get_u8(),
                port: buf.get_u32_le(),
            },
            MessageType::GetPower => Payload::GetPower,
            MessageType::SetPower => Payload::SetPower {
                level: buf.get_u16_le(),
            },
            MessageType::StatePower => Payload::StatePower {
                level: buf.get_u16_le(),
            },
            MessageType::GetLabel => Payload::GetLabel,
            MessageType::SetLabel => Payload::SetLabel {
                label: get_label(&mut buf),
            },
            MessageType::StateLabel => Payload::StateLabel {
                label: get_label(&mut buf),
            },
            MessageType::GetVersion => Payload::GetVersion,
            MessageType::StateVersion => Payload::StateVersion {
                vendor: buf.get_u32_le(),
                product: buf.get_u32_le(),
                version: buf.get_u32_le(),
            },
            MessageType::Acknowledgement => Payload::Acknowledgement,
            MessageType::EchoRequest => Payload::EchoRequest {
                payload: buf[..ECHO_SIZE].to_vec(),
            },
            MessageType::EchoResponse => Payload::EchoResponse {
                payload: buf[..ECHO_SIZE].to_vec(),
            },
            MessageType::GetLight => Payload::GetLight,
            MessageType::SetColor => {
                buf.advance(1);
                Payload::SetColor {
                    color: get_hsbk(&mut buf),
                    duration: buf.get_u32_le(),
                }
            }
            MessageType::StateLight => {
                let color = get_hsbk(&mut buf);
                buf.advance(2);
                let power = buf.get_u16_le();
                let label = get_label(&mut buf);
                Payload::StateLight {
                    color,
                    power,
                    label,
                }
            }
            MessageType::GetLightPower => Payload::GetLightPower,
            MessageType::SetLightPower => Payload::SetLightPower {
                level: buf.get_u16_le(),
                duration: buf.get_u32_le(),
            },
            MessageType::StateLightPower => Payload::StateLightPower {
                level: buf.get_u16_le(),
            },
        };
        Ok(payload)
    }
}

/// Fixed payload length for each message type.
fn body_size(kind: MessageType) -> usize {
    match kind {
        MessageType::StateService => 5,
        MessageType::SetPower | MessageType::StatePower | MessageType::StateLightPower => 2,
        MessageType::SetLabel | MessageType::StateLabel => LABEL_SIZE,
        MessageType::StateVersion => 12,
        MessageType::EchoRequest | MessageType::EchoResponse => ECHO_SIZE,
        MessageType::SetColor => 13,
        MessageType::StateLight => 52,
        MessageType::SetLightPower => 6,
        _ => 0,
    }
}

fn put_hsbk(buf: &mut BytesMut, color: &Hsbk) {
    buf.put_u16_le(color.hue);
    buf.put_u16_le(color.saturation);
    buf.put_u16_le(color.brightness);
    buf.put_u16_le(color.kelvin);
}

fn get_hsbk(buf: &mut &[u8]) -> Hsbk {
    Hsbk {
        hue: buf.get_u16_le(),
        saturation: buf.get_u16_le(),
        brightness: buf.get_u16_le(),
        kelvin: buf.get_u16_le(),
    }
}

/// Writes a label NUL-padded to [`LABEL_SIZE`], never splitting a UTF-8 character.
fn put_label(buf: &mut BytesMut, label: &str) {
    let mut end = label.len().min(LABEL_SIZE);
    while !label.is_char_boundary(end) {
        end -= 1;
    }
    buf.put_slice(&label.as_bytes()[..end]);
    buf.put_bytes(0, LABEL_SIZE - end);
}

fn get_label(buf: &mut &[u8]) -> String {
    let raw = &buf[..LABEL_SIZE];
    let end = raw.iter().position(|b| *b == 0).unwrap_or(LABEL_SIZE);
    let label = String::from_utf8_lossy(&raw[..end]).into_owned();
    buf.advance(LABEL_SIZE);
    label
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_is_nul_padded() {
        let mut buf = BytesMut::new();
        Payload::StateLabel {
            label: "Kitchen".into(),
        }
        .encode(&mut buf);
        assert_eq!(buf.len(), LABEL_SIZE);
        assert_eq!(&buf[..7], b"Kitchen");
        assert!(buf[7..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_long_label_is_cut_on_a_char_boundary() {
        // 31 ASCII bytes followed by a 4-byte emoji
        let label = format!("{}🚪", "a".repeat(31));
        let mut buf = BytesMut::new();
        put_label(&mut buf, &label);
        assert_eq!(buf.len(), LABEL_SIZE);

        let mut slice: &[u8] = &buf;
        assert_eq!(get_label(&mut slice), "a".repeat(31));
    }

    #[test]
    fn test_decode_state_light() {
        let mut buf = BytesMut::new();
        let payload = Payload::StateLight {
            color: Hsbk {
                hue: 1,
                saturation: 2,
                brightness: 3,
                kelvin: 3500,
            },
            power: 65535,
            label: "Front: 🚪Door".into(),
        };
        payload.encode(&mut buf);
        assert_eq!(buf.len(), body_size(MessageType::StateLight));

        let decoded = Payload::decode(MessageType::StateLight, &buf).unwrap();
        assert_eq!(decoded, payload);
        assert_eq!(decoded.label(), Some("Front: 🚪Door"));
    }

    #[test]
    fn test_short_body_is_malformed() {
        let err = Payload::decode(MessageType::StateService, &[1, 2]).unwrap_err();
        assert!(matches!(err, Error::Malformed(_)));
    }
}
