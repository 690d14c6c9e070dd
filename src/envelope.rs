//! Signaling message envelopes.
//!
//! Every message kind maps to a flat JSON object. The SDP bodies inside
//! offers and answers are already patched when they reach this module;
//! encoding never touches them. Decoding treats the payload as
//! attacker-controlled: every field access is a checked lookup.

use std::fmt;

use serde_json::{json, Value};
use thiserror::Error;

use crate::call_id::CallId;

/// Errors encoding an outgoing envelope. Fatal to the send attempt; a
/// half-formed signaling message must never go out.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to serialize signaling message")]
    EncodingFailed(#[source] serde_json::Error),
}

/// Errors decoding an incoming envelope. The affected message is dropped;
/// the call itself continues (peers resend ICE candidates routinely).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// A mandatory field is missing or has the wrong shape.
    #[error("missing or malformed field `{0}`")]
    MalformedMessage(&'static str),
    /// The payload is not a structured signaling body at all.
    #[error("payload is not a structured signaling body")]
    TransportPayloadInvalid,
}

/// The role string carried alongside a session description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionDescriptionType {
    Offer,
    PrAnswer,
    Answer,
}

impl SessionDescriptionType {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionDescriptionType::Offer => "offer",
            SessionDescriptionType::PrAnswer => "pranswer",
            SessionDescriptionType::Answer => "answer",
        }
    }

    fn from_wire(value: &str) -> Option<SessionDescriptionType> {
        match value {
            "offer" => Some(SessionDescriptionType::Offer),
            "pranswer" => Some(SessionDescriptionType::PrAnswer),
            "answer" => Some(SessionDescriptionType::Answer),
            _ => None,
        }
    }
}

/// A (patched) session description plus its role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub kind: SessionDescriptionType,
    pub sdp: String,
}

/// Why a callee declined an incoming call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RejectReason {
    #[default]
    Unknown,
    Busy,
    Timeout,
    Rejected,
    Disabled,
    OffHours,
}

impl RejectReason {
    pub fn to_wire(self) -> i64 {
        match self {
            RejectReason::Unknown => 0,
            RejectReason::Busy => 1,
            RejectReason::Timeout => 2,
            RejectReason::Rejected => 3,
            RejectReason::Disabled => 4,
            RejectReason::OffHours => 5,
        }
    }

    /// Unknown wire values map to `Unknown` so newer peers stay compatible.
    pub fn from_wire(value: i64) -> RejectReason {
        match value {
            1 => RejectReason::Busy,
            2 => RejectReason::Timeout,
            3 => RejectReason::Rejected,
            4 => RejectReason::Disabled,
            5 => RejectReason::OffHours,
            _ => RejectReason::Unknown,
        }
    }
}

/// A proposed network path for the peer connection. Opaque here; only this
/// codec touches its shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate {
    pub sdp: String,
    pub sdp_mid: String,
    pub sdp_m_line_index: i32,
}

impl IceCandidate {
    fn to_wire(&self) -> Value {
        json!({
            "candidate": self.sdp,
            "sdpMid": self.sdp_mid,
            "sdpMLineIndex": self.sdp_m_line_index,
        })
    }

    fn from_wire(value: &Value) -> Result<IceCandidate, DecodeError> {
        let sdp = value
            .get("candidate")
            .and_then(Value::as_str)
            .ok_or(DecodeError::MalformedMessage("candidate"))?;
        let sdp_mid = value
            .get("sdpMid")
            .and_then(Value::as_str)
            .ok_or(DecodeError::MalformedMessage("sdpMid"))?;
        let sdp_m_line_index = value
            .get("sdpMLineIndex")
            .and_then(Value::as_i64)
            .and_then(|index| i32::try_from(index).ok())
            .ok_or(DecodeError::MalformedMessage("sdpMLineIndex"))?;
        Ok(IceCandidate {
            sdp: sdp.to_string(),
            sdp_mid: sdp_mid.to_string(),
            sdp_m_line_index,
        })
    }
}

/// Call offer sent by the initiator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferMessage {
    pub call_id: CallId,
    pub offer: SessionDescription,
    pub video_available: bool,
}

impl OfferMessage {
    pub fn to_wire(&self) -> Value {
        let mut body = json!({
            "callId": self.call_id.0,
            "offer": {
                "sdpType": self.offer.kind.as_str(),
                "sdp": self.offer.sdp,
            },
        });
        if self.video_available {
            body["features"] = json!({ "video": null });
        }
        body
    }

    pub fn from_wire(body: &Value) -> Result<OfferMessage, DecodeError> {
        let call_id = required_call_id(body)?;
        let offer = body
            .get("offer")
            .ok_or(DecodeError::MalformedMessage("offer"))?;
        Ok(OfferMessage {
            call_id,
            offer: decode_session_description(offer)?,
            video_available: has_video_feature(body),
        })
    }
}

/// Answer sent by the callee: either an accepted session description or a
/// plain reject carrying a reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerMessage {
    pub call_id: CallId,
    pub answer: Option<SessionDescription>,
    pub reject_reason: Option<RejectReason>,
    pub video_available: bool,
}

impl AnswerMessage {
    pub fn accept(call_id: CallId, answer: SessionDescription, video_available: bool) -> Self {
        AnswerMessage {
            call_id,
            answer: Some(answer),
            reject_reason: None,
            video_available,
        }
    }

    pub fn reject(call_id: CallId, reason: RejectReason) -> Self {
        AnswerMessage {
            call_id,
            answer: None,
            reject_reason: Some(reason),
            video_available: false,
        }
    }

    pub fn is_reject(&self) -> bool {
        self.answer.is_none()
    }

    pub fn to_wire(&self) -> Value {
        let mut body = json!({ "callId": self.call_id.0 });
        match &self.answer {
            Some(answer) => {
                body["answer"] = json!({
                    "sdpType": answer.kind.as_str(),
                    "sdp": answer.sdp,
                });
                if let Some(reason) = self.reject_reason {
                    body["rejectReason"] = json!(reason.to_wire());
                }
            }
            None => {
                // Pure reject: the description key is omitted entirely and a
                // reason is always written.
                body["rejectReason"] =
                    json!(self.reject_reason.unwrap_or_default().to_wire());
            }
        }
        if self.video_available {
            body["features"] = json!({ "video": null });
        }
        body
    }

    pub fn from_wire(body: &Value) -> Result<AnswerMessage, DecodeError> {
        let call_id = required_call_id(body)?;
        let answer = body
            .get("answer")
            .map(decode_session_description)
            .transpose()?;
        let reject_reason = match body.get("rejectReason") {
            Some(value) => {
                let raw = value
                    .as_i64()
                    .ok_or(DecodeError::MalformedMessage("rejectReason"))?;
                Some(RejectReason::from_wire(raw))
            }
            // A reject without a reason is legal on the wire and means
            // "unknown"; an accepted answer has no reason at all.
            None if answer.is_none() => Some(RejectReason::Unknown),
            None => None,
        };
        Ok(AnswerMessage {
            call_id,
            answer,
            reject_reason,
            video_available: has_video_feature(body),
        })
    }
}

/// Trickled ICE candidates, or a removal notice for candidates sent earlier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCandidatesMessage {
    pub call_id: CallId,
    pub removed: bool,
    pub candidates: Vec<IceCandidate>,
}

impl IceCandidatesMessage {
    pub fn to_wire(&self) -> Value {
        json!({
            "callId": self.call_id.0,
            "removed": self.removed,
            "candidates": self
                .candidates
                .iter()
                .map(IceCandidate::to_wire)
                .collect::<Vec<_>>(),
        })
    }

    pub fn from_wire(body: &Value) -> Result<IceCandidatesMessage, DecodeError> {
        let call_id = required_call_id(body)?;
        // An empty array is a valid "no candidates" signal; a missing key is
        // not.
        let candidates = body
            .get("candidates")
            .and_then(Value::as_array)
            .ok_or(DecodeError::MalformedMessage("candidates"))?
            .iter()
            .map(IceCandidate::from_wire)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(IceCandidatesMessage {
            call_id,
            // The removal flag is non-standard; old peers omit it.
            removed: body
                .get("removed")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            candidates,
        })
    }
}

/// The callee's device is ringing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingingMessage {
    pub call_id: CallId,
}

impl RingingMessage {
    pub fn to_wire(&self) -> Value {
        json!({ "callId": self.call_id.0 })
    }

    pub fn from_wire(body: &Value) -> Result<RingingMessage, DecodeError> {
        Ok(RingingMessage {
            call_id: lenient_call_id(body)?,
        })
    }
}

/// Either side ended the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HangupMessage {
    pub call_id: CallId,
}

impl HangupMessage {
    pub fn to_wire(&self) -> Value {
        json!({ "callId": self.call_id.0 })
    }

    pub fn from_wire(body: &Value) -> Result<HangupMessage, DecodeError> {
        Ok(HangupMessage {
            call_id: lenient_call_id(body)?,
        })
    }
}

/// A signaling message of any kind.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingMessage {
    Offer(OfferMessage),
    Answer(AnswerMessage),
    IceCandidates(IceCandidatesMessage),
    Ringing(RingingMessage),
    Hangup(HangupMessage),
}

impl SignalingMessage {
    pub fn call_id(&self) -> CallId {
        match self {
            SignalingMessage::Offer(message) => message.call_id,
            SignalingMessage::Answer(message) => message.call_id,
            SignalingMessage::IceCandidates(message) => message.call_id,
            SignalingMessage::Ringing(message) => message.call_id,
            SignalingMessage::Hangup(message) => message.call_id,
        }
    }

    pub fn to_wire(&self) -> Value {
        match self {
            SignalingMessage::Offer(message) => message.to_wire(),
            SignalingMessage::Answer(message) => message.to_wire(),
            SignalingMessage::IceCandidates(message) => message.to_wire(),
            SignalingMessage::Ringing(message) => message.to_wire(),
            SignalingMessage::Hangup(message) => message.to_wire(),
        }
    }

    /// Serialize for the transport. The whole map is built first and written
    /// atomically; there is no partial output on failure.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        serde_json::to_vec(&self.to_wire()).map_err(EncodeError::EncodingFailed)
    }
}

/// Fire-once acknowledgement the transport invokes once a message has been
/// handed over (or definitely failed).
pub type CompletionHandler = Box<dyn FnOnce(bool) + Send + 'static>;

/// An outgoing message paired with its optional send acknowledgement. The
/// core only carries the handler; the transport consumes it.
pub struct OutboundMessage {
    pub message: SignalingMessage,
    pub completion: Option<CompletionHandler>,
}

impl OutboundMessage {
    pub fn new(message: SignalingMessage) -> Self {
        OutboundMessage {
            message,
            completion: None,
        }
    }

    pub fn with_completion(message: SignalingMessage, completion: CompletionHandler) -> Self {
        OutboundMessage {
            message,
            completion: Some(completion),
        }
    }
}

impl fmt::Debug for OutboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundMessage")
            .field("message", &self.message)
            .field("completion", &self.completion.as_ref().map(|_| "..."))
            .finish()
    }
}

/// `callId` lookup for kinds where the identifier is mandatory.
fn required_call_id(body: &Value) -> Result<CallId, DecodeError> {
    body.get("callId")
        .and_then(Value::as_u64)
        .and_then(|raw| u32::try_from(raw).ok())
        .map(CallId)
        .ok_or(DecodeError::MalformedMessage("callId"))
}

/// `callId` lookup for ringing/hangup, where legacy peers may omit the key;
/// a present-but-malformed value is still an error.
fn lenient_call_id(body: &Value) -> Result<CallId, DecodeError> {
    match body.get("callId") {
        None => Ok(CallId::WILDCARD),
        Some(value) => value
            .as_u64()
            .and_then(|raw| u32::try_from(raw).ok())
            .map(CallId)
            .ok_or(DecodeError::MalformedMessage("callId")),
    }
}

fn decode_session_description(value: &Value) -> Result<SessionDescription, DecodeError> {
    let kind = value
        .get("sdpType")
        .and_then(Value::as_str)
        .and_then(SessionDescriptionType::from_wire)
        .ok_or(DecodeError::MalformedMessage("sdpType"))?;
    let sdp = value
        .get("sdp")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MalformedMessage("sdp"))?;
    Ok(SessionDescription {
        kind,
        sdp: sdp.to_string(),
    })
}

/// The video feature is flagged by key presence; its value carries nothing.
fn has_video_feature(body: &Value) -> bool {
    body.get("features")
        .map(|features| features.get("video").is_some())
        .unwrap_or(false)
}
