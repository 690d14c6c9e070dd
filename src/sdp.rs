//! SDP patching for end-to-end encrypted calls.
//!
//! Rewrites the session description a call exchanges with its peer before it
//! reaches the wire or the media engine: audio is restricted to Opus with
//! forced mono/CBR (RFC 6562), only encrypted RTP header extensions survive,
//! and extension ids are remapped on outgoing offers so bundled media
//! sections agree on them. Unrecognized media sections are dropped whole.

use std::collections::HashMap;

use thiserror::Error;

/// URN prefix of encrypted RTP header extensions (RFC 6904).
const ENCRYPTED_EXTENSION_URN: &str = "urn:ietf:params:rtp-hdrext:encrypt";

/// Extensions that only matter behind an SFU; on a direct connection they are
/// dead weight and leak call metadata, so they are rejected even in encrypted
/// form.
const SFU_ONLY_EXTENSION_URIS: [&str; 3] = [
    "urn:ietf:params:rtp-hdrext:ssrc-audio-level",
    "urn:ietf:params:rtp-hdrext:csrc-audio-level",
    "http://tools.ietf.org/html/draft-ietf-avtext-framemarking-07",
];

/// Whether the document being patched is a locally created offer, or a local
/// answer / remote description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpType {
    LocalOffer,
    LocalAnswerOrRemoteSdp,
}

/// RTP header extension handling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RtpHeaderExtensionConfig {
    /// Strip all RTP header extensions.
    #[default]
    Disable,
    /// One-byte extension headers only, ids 1-14 (legacy peers).
    LegacyOneByteHeader,
    /// Mixed one- and two-byte extension headers, ids 1-14 and 16-255.
    OneAndTwoByteHeader,
}

/// Fatal patch errors. Per-line rejections are not errors; they are logged
/// and the line is dropped.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SdpError {
    /// The document carries no usable Opus codec mapping, or its audio
    /// section does not list the discovered Opus payload type.
    #[error("Opus payload type not found in session description")]
    OpusPayloadTypeMissing,
    /// More distinct RTP header extensions than the configured id space.
    #[error("RTP extension ids exhausted")]
    ExtensionIdsExhausted,
    /// The input has no SDP lines at all.
    #[error("input does not parse as SDP")]
    MalformedInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Global,
    Audio,
    Video,
    DataChannel,
    Unknown,
}

/// Decision for a single line.
#[derive(Debug, PartialEq, Eq)]
enum LineAction {
    Accept,
    Reject,
    Rewrite(String),
}

/// Assigns stable ids to RTP header extensions during one patch pass.
///
/// The same URI and attributes must receive the same id across all media
/// sections, otherwise transport bundling fails. Ids are handed out in
/// first-seen order starting at 1; id 15 is reserved in the one-byte header
/// format and never assigned.
#[derive(Debug)]
struct RtpExtensionIdRemapper {
    next_id: u16,
    max_id: u16,
    assigned: HashMap<String, u16>,
}

impl RtpExtensionIdRemapper {
    fn new(config: RtpHeaderExtensionConfig) -> Self {
        RtpExtensionIdRemapper {
            next_id: 0,
            max_id: match config {
                RtpHeaderExtensionConfig::Disable => 0,
                RtpHeaderExtensionConfig::LegacyOneByteHeader => 14,
                RtpHeaderExtensionConfig::OneAndTwoByteHeader => 255,
            },
            assigned: HashMap::new(),
        }
    }

    fn assign(&mut self, uri_and_attributes: &str) -> Result<u16, SdpError> {
        if let Some(&id) = self.assigned.get(uri_and_attributes) {
            return Ok(id);
        }
        self.next_id += 1;
        if self.next_id > self.max_id {
            return Err(SdpError::ExtensionIdsExhausted);
        }
        if self.next_id == 15 {
            self.next_id += 1;
        }
        self.assigned
            .insert(uri_and_attributes.to_string(), self.next_id);
        Ok(self.next_id)
    }
}

struct PatchContext {
    kind: SdpType,
    config: RtpHeaderExtensionConfig,
    opus_payload_type: String,
    remapper: RtpExtensionIdRemapper,
    section: Section,
}

/// SDP patcher enforcing the call security profile.
#[derive(Debug, Clone, Copy, Default)]
pub struct SdpPatcher {
    config: RtpHeaderExtensionConfig,
}

impl SdpPatcher {
    pub fn new(config: RtpHeaderExtensionConfig) -> Self {
        SdpPatcher { config }
    }

    /// Patch an SDP offer or answer.
    ///
    /// For all media sections: non-encrypted and SFU-only header extensions
    /// are removed, and extension ids are remapped when producing an offer.
    /// For audio: every codec except Opus is stripped and constant bit rate
    /// is forced, which also suppresses voice activity detection (the
    /// bandwidth pattern of VBR leaks speech activity; see RFC 6562).
    ///
    /// Accepts CRLF or LF input, emits CRLF. Returns no partial output on
    /// error.
    pub fn patch(&self, kind: SdpType, sdp: &str) -> Result<String, SdpError> {
        let lines: Vec<&str> = sdp.lines().collect();
        if lines.iter().all(|line| line.trim().is_empty()) {
            return Err(SdpError::MalformedInput);
        }

        let opus_payload_type =
            find_opus_payload_type(&lines).ok_or(SdpError::OpusPayloadTypeMissing)?;

        let mut ctx = PatchContext {
            kind,
            config: self.config,
            opus_payload_type,
            remapper: RtpExtensionIdRemapper::new(self.config),
            section: Section::Global,
        };

        let mut out = String::with_capacity(sdp.len());
        let mut dropped: Vec<&str> = Vec::new();

        for &line in &lines {
            // An unknown section is absorbing: every line up to the next
            // media line is dropped without individual inspection.
            if ctx.section == Section::Unknown && !line.starts_with("m=") {
                dropped.push(line);
                continue;
            }
            flush_dropped_section(&mut dropped);

            match handle_line(&mut ctx, line)? {
                LineAction::Accept => {
                    out.push_str(line);
                    out.push_str("\r\n");
                }
                LineAction::Rewrite(rewritten) => {
                    out.push_str(&rewritten);
                    out.push_str("\r\n");
                }
                LineAction::Reject => {
                    tracing::debug!("rejected line: {line}");
                }
            }
        }
        flush_dropped_section(&mut dropped);

        Ok(out)
    }
}

fn flush_dropped_section(dropped: &mut Vec<&str>) {
    if !dropped.is_empty() {
        tracing::debug!(
            lines = dropped.len(),
            "rejected section: {}",
            dropped.join(" | ")
        );
        dropped.clear();
    }
}

/// Find the payload type of the first Opus codec mapping in the document.
fn find_opus_payload_type(lines: &[&str]) -> Option<String> {
    lines.iter().find_map(|line| {
        let rest = line.strip_prefix("a=rtpmap:")?;
        let (payload_type, codec) = rest.split_once(' ')?;
        (!payload_type.is_empty() && codec.starts_with("opus"))
            .then(|| payload_type.to_string())
    })
}

fn handle_line(ctx: &mut PatchContext, line: &str) -> Result<LineAction, SdpError> {
    if line.starts_with("m=") {
        return handle_section_line(ctx, line);
    }
    match ctx.section {
        Section::Global => Ok(handle_rtp_attributes(ctx, line)),
        Section::Audio => handle_audio_line(ctx, line),
        Section::Video => handle_video_line(ctx, line),
        Section::DataChannel => Ok(LineAction::Accept),
        Section::Unknown => Ok(LineAction::Reject),
    }
}

/// Handle a media description (`m=`) line and switch sections.
fn handle_section_line(ctx: &mut PatchContext, line: &str) -> Result<LineAction, SdpError> {
    // m=audio <port> <proto> <payload types...>
    if let Some(rest) = line.strip_prefix("m=audio ") {
        let mut fields = rest.splitn(3, ' ');
        if let (Some(port), Some(proto), Some(payload_types)) =
            (fields.next(), fields.next(), fields.next())
        {
            if !port.is_empty() && !proto.is_empty() && !payload_types.is_empty() {
                ctx.section = Section::Audio;
                // The call is unusable without Opus, so this is fatal rather
                // than a line rejection.
                if !payload_types
                    .split(' ')
                    .any(|payload_type| payload_type == ctx.opus_payload_type)
                {
                    return Err(SdpError::OpusPayloadTypeMissing);
                }
                return Ok(LineAction::Rewrite(format!(
                    "m=audio {port} {proto} {}",
                    ctx.opus_payload_type
                )));
            }
        }
    }

    if line.starts_with("m=video") {
        ctx.section = Section::Video;
        return Ok(LineAction::Accept);
    }

    if line.starts_with("m=application") && line.contains("DTLS/SCTP") {
        ctx.section = Section::DataChannel;
        return Ok(LineAction::Accept);
    }

    ctx.section = Section::Unknown;
    Ok(LineAction::Reject)
}

/// Attributes shared by the global and media sections.
fn handle_rtp_attributes(ctx: &PatchContext, line: &str) -> LineAction {
    // Mixed one-/two-byte extension headers may only be announced when the
    // peer supports them.
    if ctx.config != RtpHeaderExtensionConfig::OneAndTwoByteHeader
        && line.starts_with("a=extmap-allow-mixed")
    {
        return LineAction::Reject;
    }
    LineAction::Accept
}

fn handle_audio_line(ctx: &mut PatchContext, line: &str) -> Result<LineAction, SdpError> {
    // Codec mappings: keep Opus, strip everything else.
    if let Some(rest) = line.strip_prefix("a=rtpmap:") {
        if let Some((payload_type, _)) = rest.split_once(' ') {
            if !payload_type.is_empty() {
                return Ok(if payload_type == ctx.opus_payload_type {
                    LineAction::Accept
                } else {
                    LineAction::Reject
                });
            }
        }
    }

    // Format parameters: drop non-Opus ones, force mono and CBR on Opus.
    if let Some(rest) = line.strip_prefix("a=fmtp:") {
        if let Some((payload_type, after)) = rest.split_once(' ') {
            let params = after.split(' ').next().unwrap_or("");
            if !payload_type.is_empty() && !params.is_empty() {
                if payload_type != ctx.opus_payload_type {
                    return Ok(LineAction::Reject);
                }
                return Ok(LineAction::Rewrite(rewrite_opus_fmtp(
                    &ctx.opus_payload_type,
                    params,
                )));
            }
        }
    }

    if let Some(action) = handle_extension_attribute(ctx, line)? {
        return Ok(action);
    }

    Ok(handle_rtp_attributes(ctx, line))
}

fn handle_video_line(ctx: &mut PatchContext, line: &str) -> Result<LineAction, SdpError> {
    if let Some(action) = handle_extension_attribute(ctx, line)? {
        return Ok(action);
    }
    Ok(handle_rtp_attributes(ctx, line))
}

/// Rewrite an Opus `a=fmtp:` line: keep every parameter except the ones being
/// forced, then pin mono and constant bit rate.
fn rewrite_opus_fmtp(opus_payload_type: &str, params: &str) -> String {
    let mut rewritten = format!("a=fmtp:{opus_payload_type} ");
    for param in params.split(';') {
        // A parameter without '=' is kept as-is unless its whole text is one
        // of the forced keys.
        let key = param.split('=').next().unwrap_or(param);
        if !param.is_empty() && !matches!(key, "stereo" | "sprop-stereo" | "cbr") {
            rewritten.push_str(param);
            rewritten.push(';');
        }
    }
    rewritten.push_str("stereo=0;sprop-stereo=0;cbr=1");
    rewritten
}

/// Apply the header-extension rule if the line is an `a=extmap:` attribute.
///
/// Returns `None` when the line is not an extension mapping and the caller
/// should fall through to the shared attribute handling.
fn handle_extension_attribute(
    ctx: &mut PatchContext,
    line: &str,
) -> Result<Option<LineAction>, SdpError> {
    let Some(rest) = line.strip_prefix("a=extmap:") else {
        return Ok(None);
    };
    let Some((id, uri_and_attributes)) = rest.split_once(' ') else {
        return Ok(None);
    };
    if id.is_empty() {
        return Ok(None);
    }

    if ctx.config == RtpHeaderExtensionConfig::Disable {
        return Ok(Some(LineAction::Reject));
    }

    // SFU-only extensions go first: they are stripped even when wrapped in
    // the encrypted URN.
    if SFU_ONLY_EXTENSION_URIS
        .iter()
        .any(|uri| uri_and_attributes.contains(uri))
    {
        return Ok(Some(LineAction::Reject));
    }

    // Everything else must be encrypted; plaintext header extensions leak
    // per-packet metadata.
    if !uri_and_attributes.starts_with(ENCRYPTED_EXTENSION_URN) {
        return Ok(Some(LineAction::Reject));
    }

    // Remap ids when producing an offer so all media sections agree; accept
    // answers and remote descriptions unchanged.
    if ctx.kind == SdpType::LocalOffer {
        let id = ctx.remapper.assign(uri_and_attributes)?;
        return Ok(Some(LineAction::Rewrite(format!(
            "a=extmap:{id} {uri_and_attributes}"
        ))));
    }
    Ok(Some(LineAction::Accept))
}
