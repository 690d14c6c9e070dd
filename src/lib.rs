//! Signaling core for end-to-end encrypted audio/video calls.
//!
//! This crate owns the protocol layer of call setup and teardown: it hardens
//! the SDP exchanged with a peer (Opus-only audio, forced CBR, encrypted RTP
//! header extensions), negotiates the video quality both links can sustain,
//! and encodes/decodes the JSON signaling envelopes (offer, answer, ICE
//! candidates, ringing, hangup) plus the in-call control channel.
//!
//! Transport, media capture, and the encryption of the payloads themselves
//! live elsewhere; everything here is pure and synchronous over inputs the
//! caller passes in.

pub mod call_id;
pub mod control;
pub mod dispatch;
pub mod envelope;
pub mod quality;
pub mod sdp;

pub use call_id::CallId;
pub use control::{
    decode_control, encode_camera_state, encode_capture_state, encode_microphone_state,
    encode_quality_profile, CaptureDevice, CaptureState, CaptureStateChange, ControlMessage,
};
pub use dispatch::{decode_inbound, InboundMessage, MessageKind};
pub use envelope::{
    AnswerMessage, CompletionHandler, DecodeError, EncodeError, HangupMessage, IceCandidate,
    IceCandidatesMessage, OfferMessage, OutboundMessage, RejectReason, RingingMessage,
    SessionDescription, SessionDescriptionType, SignalingMessage,
};
pub use quality::{
    common_profile, local_capture_profile, local_peer_profile, negotiation_summary, QualityPreset,
    QualityProfile, QualitySetting, Resolution,
};
pub use sdp::{RtpHeaderExtensionConfig, SdpError, SdpPatcher, SdpType};
