//! LIFX LAN packets: message types, headers and payloads.
//!
//! Every datagram carries a 36-byte header followed by a payload whose layout
//! depends on the [`MessageType`]. See [`encode`] and [`decode`] for the wire
//! format.

mod codec;
mod payload;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString, FromRepr};

use crate::errors::Error;
use crate::types::Source;

pub use codec::{HEADER_SIZE, LABEL_SIZE, PROTOCOL_NUMBER, decode, encode};
pub use payload::Payload;

type Result<T> = std::result::Result<T, Error>;

/// The protocol message types this client understands.
///
/// Names follow the protocol's camelCase spelling (`"getService"`,
/// `"stateLabel"`, ...) and the discriminant is the wire id.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    AsRefStr,
    FromRepr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
#[repr(u16)]
pub enum MessageType {
    GetService = 2,
    StateService = 3,
    GetPower = 20,
    SetPower = 21,
    StatePower = 22,
    GetLabel = 23,
    SetLabel = 24,
    StateLabel = 25,
    GetVersion = 32,
    StateVersion = 33,
    Acknowledgement = 45,
    EchoRequest = 58,
    EchoResponse = 59,
    GetLight = 101,
    SetColor = 102,
    StateLight = 107,
    GetLightPower = 116,
    SetLightPower = 117,
    StateLightPower = 118,
}

impl MessageType {
    /// Look up a message type by its protocol name.
    ///
    /// # Examples
    ///
    /// ```
    /// use lifx_lan_client::MessageType;
    ///
    /// assert_eq!(MessageType::from_name("stateLight").unwrap(), MessageType::StateLight);
    /// assert!(MessageType::from_name("unknownPacket").is_err());
    /// ```
    pub fn from_name(name: &str) -> Result<Self> {
        name.parse()
            .map_err(|_| Error::range(format!("unknown packet type {name:?}")))
    }

    /// The wire id of this type.
    pub fn id(self) -> u16 {
        self as u16
    }

    /// The message a device sends back when this one asks for a reply.
    ///
    /// Queries are answered with their state message; setters and
    /// everything else with an acknowledgement.
    pub fn reply_type(self) -> MessageType {
        use MessageType::*;
        match self {
            GetService => StateService,
            GetPower => StatePower,
            GetLabel => StateLabel,
            GetVersion => StateVersion,
            EchoRequest => EchoResponse,
            GetLight => StateLight,
            GetLightPower => StateLightPower,
            _ => Acknowledgement,
        }
    }
}

/// Header fields a caller can influence. Size, protocol and the tagged bit
/// are derived while encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub source: Source,
    /// Device id as 12 hex characters; `None` addresses every device.
    pub target: Option<String>,
    pub ack_required: bool,
    pub res_required: bool,
    pub sequence: u8,
}

impl Default for Header {
    fn default() -> Self {
        Header {
            source: Source::new(0),
            target: None,
            ack_required: false,
            res_required: false,
            sequence: 0,
        }
    }
}

/// A decoded datagram, or one about to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub header: Header,
    pub payload: Payload,
}

impl Message {
    /// Create an untargeted message. The client fills in source and sequence
    /// when it is sent.
    pub fn new(payload: Payload) -> Self {
        Message {
            header: Header::default(),
            payload,
        }
    }

    /// Address the message to a single device.
    ///
    /// # Examples
    ///
    /// ```
    /// use lifx_lan_client::{Message, Payload};
    ///
    /// let msg = Message::new(Payload::GetLabel).with_target("d073d5006d72");
    /// assert_eq!(msg.target(), Some("d073d5006d72"));
    /// ```
    pub fn with_target(mut self, target: &str) -> Self {
        self.header.target = Some(target.to_string());
        self
    }

    pub fn message_type(&self) -> MessageType {
        self.payload.message_type()
    }

    pub fn target(&self) -> Option<&str> {
        self.header.target.as_deref()
    }

    pub fn sequence(&self) -> u8 {
        self.header.sequence
    }

    pub fn source(&self) -> Source {
        self.header.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip_through_strum() {
        assert_eq!(MessageType::StateService.to_string(), "stateService");
        assert_eq!(MessageType::Acknowledgement.as_ref(), "acknowledgement");
        assert_eq!(
            MessageType::from_name("getLightPower").unwrap(),
            MessageType::GetLightPower
        );
    }

    #[test]
    fn test_unknown_name_is_a_range_error() {
        assert!(matches!(
            MessageType::from_name("unknownPacket"),
            Err(Error::Range(_))
        ));
    }

    #[test]
    fn test_wire_ids() {
        assert_eq!(MessageType::GetService.id(), 2);
        assert_eq!(MessageType::from_repr(107), Some(MessageType::StateLight));
        assert_eq!(MessageType::from_repr(9999), None);
    }

    #[test]
    fn test_reply_types() {
        assert_eq!(MessageType::GetLabel.reply_type(), MessageType::StateLabel);
        assert_eq!(MessageType::GetLight.reply_type(), MessageType::StateLight);
        assert_eq!(MessageType::SetPower.reply_type(), MessageType::Acknowledgement);
        assert_eq!(MessageType::SetColor.reply_type(), MessageType::Acknowledgement);
    }
}
