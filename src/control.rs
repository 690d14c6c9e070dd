//! In-call control messages.
//!
//! Once a call is up, the peers keep a control channel over the encrypted
//! data channel: capture-state changes (camera or microphone toggled) and
//! announcements of the video quality profile a side wants to operate at.
//! Frames are one-of envelopes; a frame with content this version does not
//! know decodes to an empty message rather than an error.

use serde::{Deserialize, Serialize};

use crate::envelope::{DecodeError, EncodeError};
use crate::quality::{QualityPreset, QualityProfile, Resolution};

/// Capture device referenced by a capture-state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureDevice {
    Camera,
    ScreenSharing,
    Microphone,
}

impl CaptureDevice {
    fn to_wire(self) -> u8 {
        match self {
            CaptureDevice::Camera => 0,
            CaptureDevice::ScreenSharing => 1,
            CaptureDevice::Microphone => 2,
        }
    }

    fn from_wire(value: u8) -> Option<CaptureDevice> {
        match value {
            0 => Some(CaptureDevice::Camera),
            1 => Some(CaptureDevice::ScreenSharing),
            2 => Some(CaptureDevice::Microphone),
            _ => None,
        }
    }
}

/// Whether a capture device is producing media.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Off,
    On,
}

impl CaptureState {
    fn to_wire(self) -> u8 {
        match self {
            CaptureState::Off => 0,
            CaptureState::On => 1,
        }
    }

    fn from_wire(value: u8) -> Option<CaptureState> {
        match value {
            0 => Some(CaptureState::Off),
            1 => Some(CaptureState::On),
            _ => None,
        }
    }
}

/// A device was switched on or off on the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureStateChange {
    pub device: CaptureDevice,
    pub state: CaptureState,
}

/// A decoded control frame. At most one field is populated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlMessage {
    pub quality_profile: Option<QualityProfile>,
    pub capture_state: Option<CaptureStateChange>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct WireCaptureState {
    device: u8,
    state: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct WireResolution {
    width: u32,
    height: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct WireQualityProfile {
    profile: u8,
    #[serde(rename = "maxBitrateKbps")]
    max_bitrate_kbps: u32,
    #[serde(rename = "maxFps")]
    max_fps: u32,
    #[serde(rename = "maxResolution")]
    max_resolution: WireResolution,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct WireControlEnvelope {
    #[serde(
        rename = "captureStateChange",
        skip_serializing_if = "Option::is_none",
        default
    )]
    capture_state_change: Option<WireCaptureState>,
    #[serde(
        rename = "videoQualityProfile",
        skip_serializing_if = "Option::is_none",
        default
    )]
    video_quality_profile: Option<WireQualityProfile>,
}

fn encode_envelope(envelope: &WireControlEnvelope) -> Result<Vec<u8>, EncodeError> {
    serde_json::to_vec(envelope).map_err(EncodeError::EncodingFailed)
}

/// Announce the microphone capture state; a muted microphone is reported as
/// capture off.
pub fn encode_microphone_state(muted: bool) -> Result<Vec<u8>, EncodeError> {
    encode_capture_state(
        CaptureDevice::Microphone,
        if muted { CaptureState::Off } else { CaptureState::On },
    )
}

/// Announce whether the camera is capturing.
pub fn encode_camera_state(active: bool) -> Result<Vec<u8>, EncodeError> {
    encode_capture_state(
        CaptureDevice::Camera,
        if active { CaptureState::On } else { CaptureState::Off },
    )
}

pub fn encode_capture_state(
    device: CaptureDevice,
    state: CaptureState,
) -> Result<Vec<u8>, EncodeError> {
    encode_envelope(&WireControlEnvelope {
        capture_state_change: Some(WireCaptureState {
            device: device.to_wire(),
            state: state.to_wire(),
        }),
        ..Default::default()
    })
}

/// Announce the quality preset this side wants to operate at.
pub fn encode_quality_profile(preset: QualityPreset) -> Result<Vec<u8>, EncodeError> {
    let profile = preset.profile();
    encode_envelope(&WireControlEnvelope {
        video_quality_profile: Some(WireQualityProfile {
            profile: preset.to_wire(),
            max_bitrate_kbps: profile.bitrate_kbps,
            max_fps: profile.max_fps,
            max_resolution: WireResolution {
                width: profile.max_resolution.width,
                height: profile.max_resolution.height,
            },
        }),
        ..Default::default()
    })
}

/// Decode a control frame received from the peer.
///
/// Unknown device/state/profile values are treated as content this version
/// does not understand and yield an empty message.
pub fn decode_control(payload: &[u8]) -> Result<ControlMessage, DecodeError> {
    let envelope: WireControlEnvelope = serde_json::from_slice(payload).map_err(|err| {
        tracing::debug!("discarding unparseable control frame: {err}");
        DecodeError::TransportPayloadInvalid
    })?;

    let capture_state = envelope.capture_state_change.and_then(|change| {
        Some(CaptureStateChange {
            device: CaptureDevice::from_wire(change.device)?,
            state: CaptureState::from_wire(change.state)?,
        })
    });

    let quality_profile = envelope.video_quality_profile.map(|wire| QualityProfile {
        bitrate_kbps: wire.max_bitrate_kbps,
        max_resolution: Resolution {
            width: wire.max_resolution.width,
            height: wire.max_resolution.height,
        },
        max_fps: wire.max_fps,
        preset: QualityPreset::from_wire(wire.profile),
    });

    Ok(ControlMessage {
        quality_profile,
        capture_state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_microphone_state_round_trip() {
        let frame = encode_microphone_state(true).unwrap();
        let decoded = decode_control(&frame).unwrap();
        assert_eq!(
            decoded.capture_state,
            Some(CaptureStateChange {
                device: CaptureDevice::Microphone,
                state: CaptureState::Off,
            })
        );
        assert!(decoded.quality_profile.is_none());
    }

    #[test]
    fn test_camera_state_round_trip() {
        let frame = encode_camera_state(true).unwrap();
        let decoded = decode_control(&frame).unwrap();
        assert_eq!(
            decoded.capture_state,
            Some(CaptureStateChange {
                device: CaptureDevice::Camera,
                state: CaptureState::On,
            })
        );
    }

    #[test]
    fn test_quality_profile_round_trip() {
        let frame = encode_quality_profile(QualityPreset::Low).unwrap();
        let decoded = decode_control(&frame).unwrap();
        assert_eq!(decoded.quality_profile, Some(QualityPreset::Low.profile()));
        assert!(decoded.capture_state.is_none());
    }

    #[test]
    fn test_unknown_content_decodes_to_empty_message() {
        let decoded = decode_control(br#"{"somethingNew":{"x":1}}"#).unwrap();
        assert_eq!(decoded, ControlMessage::default());
    }

    #[test]
    fn test_unknown_device_value_is_dropped() {
        let decoded =
            decode_control(br#"{"captureStateChange":{"device":9,"state":1}}"#).unwrap();
        assert!(decoded.capture_state.is_none());
    }

    #[test]
    fn test_unknown_profile_value_decodes_as_derived() {
        let frame = br#"{"videoQualityProfile":{"profile":9,"maxBitrateKbps":900,"maxFps":24,"maxResolution":{"width":640,"height":480}}}"#;
        let decoded = decode_control(frame).unwrap();
        let profile = decoded.quality_profile.unwrap();
        assert_eq!(profile.preset, None);
        assert_eq!(profile.bitrate_kbps, 900);
    }

    #[test]
    fn test_invalid_frame_is_rejected() {
        assert_eq!(
            decode_control(b"not json"),
            Err(DecodeError::TransportPayloadInvalid)
        );
    }
}
