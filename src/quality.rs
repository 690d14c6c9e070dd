//! Video quality profiles and negotiation.
//!
//! Both peers announce the profile they are willing to operate at; the call
//! runs at the common profile neither link can be overloaded by. Policy and
//! network hints are passed in by the caller, never read from global state.

use std::fmt;

/// Hard floors applied when intersecting two derived profiles.
const MIN_BITRATE_KBPS: u32 = 200;
const MIN_RESOLUTION_WIDTH: u32 = 320;
const MIN_RESOLUTION_HEIGHT: u32 = 240;
const MIN_FPS: u32 = 15;

/// The locally configured video quality preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualitySetting {
    /// Pick based on the current network type.
    Auto,
    /// Always request maximum quality.
    Maximum,
    /// Conserve bandwidth.
    LowData,
}

/// Canonical quality presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityPreset {
    Max,
    High,
    Low,
}

impl QualityPreset {
    /// The fixed parameter set for this preset.
    pub fn profile(self) -> QualityProfile {
        match self {
            QualityPreset::Max => QualityProfile {
                bitrate_kbps: 4000,
                max_resolution: Resolution {
                    width: 1920,
                    height: 1080,
                },
                max_fps: 25,
                preset: Some(QualityPreset::Max),
            },
            QualityPreset::High => QualityProfile {
                bitrate_kbps: 2000,
                max_resolution: Resolution {
                    width: 1280,
                    height: 720,
                },
                max_fps: 25,
                preset: Some(QualityPreset::High),
            },
            QualityPreset::Low => QualityProfile {
                bitrate_kbps: 400,
                max_resolution: Resolution {
                    width: 960,
                    height: 540,
                },
                max_fps: 20,
                preset: Some(QualityPreset::Low),
            },
        }
    }

    pub(crate) fn to_wire(self) -> u8 {
        match self {
            QualityPreset::Max => 0,
            QualityPreset::High => 1,
            QualityPreset::Low => 2,
        }
    }

    pub(crate) fn from_wire(value: u8) -> Option<QualityPreset> {
        match value {
            0 => Some(QualityPreset::Max),
            1 => Some(QualityPreset::High),
            2 => Some(QualityPreset::Low),
            _ => None,
        }
    }
}

impl fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityPreset::Max => write!(f, "MAX"),
            QualityPreset::High => write!(f, "HIGH"),
            QualityPreset::Low => write!(f, "LOW"),
        }
    }
}

/// Pixel dimensions of a video frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// A video quality operating point.
///
/// Either one of the canonical presets, or a derived profile produced by
/// intersecting two peers' announcements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityProfile {
    pub bitrate_kbps: u32,
    pub max_resolution: Resolution,
    pub max_fps: u32,
    pub preset: Option<QualityPreset>,
}

impl fmt::Display for QualityProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.preset {
            Some(preset) => write!(f, "profile={preset}, ")?,
            None => write!(f, "profile=n/a, ")?,
        }
        write!(
            f,
            "{}kbps, {}fps, {}x{}",
            self.bitrate_kbps, self.max_fps, self.max_resolution.width, self.max_resolution.height
        )
    }
}

/// Profile used for the local capture pipeline.
///
/// Capture always runs at least at `High` so a mid-call upgrade does not
/// require reconfiguring the camera.
pub fn local_capture_profile(setting: QualitySetting) -> QualityProfile {
    if setting == QualitySetting::Maximum {
        QualityPreset::Max.profile()
    } else {
        QualityPreset::High.profile()
    }
}

/// Profile announced to the remote peer.
pub fn local_peer_profile(setting: QualitySetting, network_is_wifi: bool) -> QualityProfile {
    match setting {
        QualitySetting::Auto => {
            if network_is_wifi {
                QualityPreset::High.profile()
            } else {
                QualityPreset::Low.profile()
            }
        }
        QualitySetting::Maximum => QualityPreset::Max.profile(),
        QualitySetting::LowData => QualityPreset::Low.profile(),
    }
}

/// Compute the profile both sides can sustain.
///
/// Preset precedence is Low, then High, then Max; Max is demoted to High over
/// a relayed path. Two derived profiles intersect elementwise, floored so a
/// hostile or broken peer cannot negotiate the call below a usable minimum.
pub fn common_profile(
    remote: Option<&QualityProfile>,
    network_is_relayed: bool,
    local: &QualityProfile,
) -> QualityProfile {
    let Some(remote) = remote else {
        return *local;
    };

    let either = |preset| local.preset == Some(preset) || remote.preset == Some(preset);
    if either(QualityPreset::Low) {
        return QualityPreset::Low.profile();
    }
    if either(QualityPreset::High) {
        return QualityPreset::High.profile();
    }
    if either(QualityPreset::Max) {
        return if network_is_relayed {
            QualityPreset::High.profile()
        } else {
            QualityPreset::Max.profile()
        };
    }

    QualityProfile {
        bitrate_kbps: local
            .bitrate_kbps
            .min(remote.bitrate_kbps)
            .max(MIN_BITRATE_KBPS),
        max_resolution: Resolution {
            width: local
                .max_resolution
                .width
                .min(remote.max_resolution.width)
                .max(MIN_RESOLUTION_WIDTH),
            height: local
                .max_resolution
                .height
                .min(remote.max_resolution.height)
                .max(MIN_RESOLUTION_HEIGHT),
        },
        max_fps: local.max_fps.min(remote.max_fps).max(MIN_FPS),
        preset: remote.preset,
    }
}

/// Render the local/remote/common profile triple for call diagnostics.
pub fn negotiation_summary(
    local: &QualityProfile,
    remote: Option<&QualityProfile>,
    network_is_relayed: bool,
) -> String {
    let common = common_profile(remote, network_is_relayed, local);
    let remote_line = match remote {
        Some(remote) => format!("R=VideoParams{{{remote}}}"),
        None => "R=VideoParams{n/a}".to_string(),
    };
    format!("L=VideoParams{{{local}}}\n{remote_line}\nC=VideoParams{{{common}}}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn derived(bitrate_kbps: u32, width: u32, height: u32, fps: u32) -> QualityProfile {
        QualityProfile {
            bitrate_kbps,
            max_resolution: Resolution { width, height },
            max_fps: fps,
            preset: None,
        }
    }

    #[test]
    fn test_capture_profile() {
        assert_eq!(
            local_capture_profile(QualitySetting::Maximum),
            QualityPreset::Max.profile()
        );
        assert_eq!(
            local_capture_profile(QualitySetting::Auto),
            QualityPreset::High.profile()
        );
        assert_eq!(
            local_capture_profile(QualitySetting::LowData),
            QualityPreset::High.profile()
        );
    }

    #[test]
    fn test_peer_profile_auto_follows_network() {
        assert_eq!(
            local_peer_profile(QualitySetting::Auto, true),
            QualityPreset::High.profile()
        );
        assert_eq!(
            local_peer_profile(QualitySetting::Auto, false),
            QualityPreset::Low.profile()
        );
    }

    #[test]
    fn test_peer_profile_explicit_settings() {
        assert_eq!(
            local_peer_profile(QualitySetting::Maximum, false),
            QualityPreset::Max.profile()
        );
        assert_eq!(
            local_peer_profile(QualitySetting::LowData, true),
            QualityPreset::Low.profile()
        );
    }

    #[test]
    fn test_common_profile_without_remote_is_local() {
        let local = QualityPreset::High.profile();
        assert_eq!(common_profile(None, false, &local), local);
    }

    #[test]
    fn test_common_profile_low_dominates() {
        let low = QualityPreset::Low.profile();
        let max = QualityPreset::Max.profile();
        assert_eq!(common_profile(Some(&low), false, &max), low);
        assert_eq!(common_profile(Some(&max), false, &low), low);
    }

    #[test]
    fn test_common_profile_high_before_max() {
        let high = QualityPreset::High.profile();
        let max = QualityPreset::Max.profile();
        assert_eq!(common_profile(Some(&high), false, &max), high);
    }

    #[test]
    fn test_common_profile_max_demoted_when_relayed() {
        let max = QualityPreset::Max.profile();
        assert_eq!(common_profile(Some(&max), true, &max), QualityPreset::High.profile());
        assert_eq!(common_profile(Some(&max), false, &max), max);
    }

    #[test]
    fn test_common_profile_derived_intersection() {
        let local = derived(1500, 1280, 720, 30);
        let remote = derived(900, 640, 480, 24);
        let common = common_profile(Some(&remote), false, &local);
        assert_eq!(common, derived(900, 640, 480, 24));
    }

    #[test]
    fn test_common_profile_intersection_respects_floors() {
        let local = derived(1500, 1280, 720, 30);
        let remote = derived(50, 160, 120, 5);
        let common = common_profile(Some(&remote), false, &local);
        assert_eq!(common, derived(200, 320, 240, 15));
    }

    #[test]
    fn test_display_shapes() {
        assert_eq!(
            QualityPreset::High.profile().to_string(),
            "profile=HIGH, 2000kbps, 25fps, 1280x720"
        );
        assert_eq!(
            derived(900, 640, 480, 24).to_string(),
            "profile=n/a, 900kbps, 24fps, 640x480"
        );
    }

    #[test]
    fn test_negotiation_summary_without_remote() {
        let local = QualityPreset::High.profile();
        let summary = negotiation_summary(&local, None, false);
        assert!(summary.contains("L=VideoParams{profile=HIGH"));
        assert!(summary.contains("R=VideoParams{n/a}"));
        assert!(summary.contains("C=VideoParams{profile=HIGH"));
    }
}
