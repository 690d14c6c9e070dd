//! Inbound message dispatch.
//!
//! Routes an opaque transport payload plus its message-kind tag to the right
//! envelope decoder and stamps the result with the sender identity and the
//! caller-supplied receipt time. Messages are decoded strictly in arrival
//! order; nothing here reorders.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::call_id::CallId;
use crate::envelope::{
    AnswerMessage, DecodeError, HangupMessage, IceCandidatesMessage, OfferMessage, RingingMessage,
    SignalingMessage,
};

/// Transport-level message kinds and their type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Offer,
    Answer,
    IceCandidates,
    Hangup,
    Ringing,
}

impl MessageKind {
    /// The transport's type byte for this kind.
    pub fn wire_type(self) -> u8 {
        match self {
            MessageKind::Offer => 0x60,
            MessageKind::Answer => 0x61,
            MessageKind::IceCandidates => 0x62,
            MessageKind::Hangup => 0x63,
            MessageKind::Ringing => 0x64,
        }
    }

    pub fn from_wire_type(value: u8) -> Option<MessageKind> {
        match value {
            0x60 => Some(MessageKind::Offer),
            0x61 => Some(MessageKind::Answer),
            0x62 => Some(MessageKind::IceCandidates),
            0x63 => Some(MessageKind::Hangup),
            0x64 => Some(MessageKind::Ringing),
            _ => None,
        }
    }
}

impl SignalingMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            SignalingMessage::Offer(_) => MessageKind::Offer,
            SignalingMessage::Answer(_) => MessageKind::Answer,
            SignalingMessage::IceCandidates(_) => MessageKind::IceCandidates,
            SignalingMessage::Hangup(_) => MessageKind::Hangup,
            SignalingMessage::Ringing(_) => MessageKind::Ringing,
        }
    }
}

/// A decoded message stamped with its sender and receipt time.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub message: SignalingMessage,
    /// Identity of the sending peer, as reported by the transport.
    pub peer: String,
    /// When the transport delivered the payload; supplied by the caller,
    /// never read from a clock in here.
    pub received_at: DateTime<Utc>,
}

/// Decode an incoming transport payload.
///
/// A structurally invalid payload yields `TransportPayloadInvalid` and the
/// caller drops the message; it is never replaced by a synthetic one. The
/// single exception: legacy peers send ringing/hangup without any body, which
/// decodes to the wildcard identifier.
pub fn decode_inbound(
    kind: MessageKind,
    payload: &[u8],
    peer: &str,
    received_at: DateTime<Utc>,
) -> Result<InboundMessage, DecodeError> {
    let message = decode_payload(kind, payload)?;
    Ok(InboundMessage {
        message,
        peer: peer.to_string(),
        received_at,
    })
}

fn decode_payload(kind: MessageKind, payload: &[u8]) -> Result<SignalingMessage, DecodeError> {
    if payload.is_empty() {
        return match kind {
            MessageKind::Ringing => Ok(SignalingMessage::Ringing(RingingMessage {
                call_id: CallId::WILDCARD,
            })),
            MessageKind::Hangup => Ok(SignalingMessage::Hangup(HangupMessage {
                call_id: CallId::WILDCARD,
            })),
            _ => Err(DecodeError::TransportPayloadInvalid),
        };
    }

    let body: Value = serde_json::from_slice(payload).map_err(|err| {
        tracing::debug!("discarding unparseable {kind:?} payload: {err}");
        DecodeError::TransportPayloadInvalid
    })?;

    match kind {
        MessageKind::Offer => OfferMessage::from_wire(&body).map(SignalingMessage::Offer),
        MessageKind::Answer => AnswerMessage::from_wire(&body).map(SignalingMessage::Answer),
        MessageKind::IceCandidates => {
            IceCandidatesMessage::from_wire(&body).map(SignalingMessage::IceCandidates)
        }
        MessageKind::Hangup => HangupMessage::from_wire(&body).map(SignalingMessage::Hangup),
        MessageKind::Ringing => RingingMessage::from_wire(&body).map(SignalingMessage::Ringing),
    }
}
