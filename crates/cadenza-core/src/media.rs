//! Media-domain snapshot types consumed by transcode resolution.
//!
//! These are immutable, per-request snapshots owned by the caller: the
//! persistence of media/player records lives behind the collaborator
//! interfaces in the application crate, never here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::ids::{MediaId, PlayerId, RuleId};

// ---------------------------------------------------------------------------
// MediaKind
// ---------------------------------------------------------------------------

/// Broad media classification; drives rule applicability and dimension
/// selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
        }
    }
}

// ---------------------------------------------------------------------------
// MediaRef
// ---------------------------------------------------------------------------

/// Immutable snapshot of one media file, used for a single request.
///
/// An *indexed track* is a virtual sub-range of a larger physical file
/// (e.g. one CUE-sheet track), addressed by a start offset and duration
/// rather than its own file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaRef {
    pub id: MediaId,
    /// Path of the physical file on disk.
    pub path: PathBuf,
    /// Folder the file lives in (access policy boundary in the outer system).
    pub folder: PathBuf,
    /// Container/format suffix, lowercase (e.g. "mp3", "flac", "mkv").
    pub format: String,
    pub kind: MediaKind,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    /// Duration in seconds; `None` when the scanner could not determine it.
    pub duration_secs: Option<u32>,
    /// Source bit rate in kbps; `None` when unknown.
    pub bit_rate_kbps: Option<u32>,
    /// Video width in pixels; audio files carry `None`.
    pub width: Option<u32>,
    /// Video height in pixels; audio files carry `None`.
    pub height: Option<u32>,
    /// Size of the physical file in bytes.
    pub file_size: u64,
    /// Whether this is a virtual sub-range of a larger file.
    pub indexed_track: bool,
    /// Start offset within the physical file, for indexed tracks.
    pub start_offset_secs: Option<u32>,
}

impl MediaRef {
    /// Whether this media has a video stream.
    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }

    /// Source dimensions, when both are known.
    pub fn dimensions(&self) -> Option<Dimensions> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some(Dimensions::new(w, h)),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// TranscodeScheme
// ---------------------------------------------------------------------------

/// Bitrate ceiling for transcoded output.
///
/// `Off` disables bitrate capping entirely. The effective ceiling for a
/// request is the *stricter* of the player's and the user's scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscodeScheme {
    #[default]
    Off,
    Max32,
    Max48,
    Max64,
    Max96,
    Max128,
    Max160,
    Max192,
    Max224,
    Max256,
    Max320,
}

impl TranscodeScheme {
    /// The ceiling in kbps, or `None` when capping is off.
    pub fn kbps(&self) -> Option<u32> {
        match self {
            Self::Off => None,
            Self::Max32 => Some(32),
            Self::Max48 => Some(48),
            Self::Max64 => Some(64),
            Self::Max96 => Some(96),
            Self::Max128 => Some(128),
            Self::Max160 => Some(160),
            Self::Max192 => Some(192),
            Self::Max224 => Some(224),
            Self::Max256 => Some(256),
            Self::Max320 => Some(320),
        }
    }

    /// The stricter (lower-ceiling) of two schemes. `Off` never wins against
    /// an actual cap.
    pub fn strictest(self, other: TranscodeScheme) -> TranscodeScheme {
        match (self.kbps(), other.kbps()) {
            (None, _) => other,
            (_, None) => self,
            (Some(a), Some(b)) => {
                if a <= b {
                    self
                } else {
                    other
                }
            }
        }
    }
}

impl fmt::Display for TranscodeScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kbps() {
            Some(kbps) => write!(f, "max {kbps} kbps"),
            None => write!(f, "off"),
        }
    }
}

// ---------------------------------------------------------------------------
// TranscodingRule
// ---------------------------------------------------------------------------

/// A configured conversion from one or more source formats to one target
/// format via 1–3 chained external command templates.
///
/// Rules are created and edited by an external admin surface; this system
/// consumes them read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodingRule {
    pub id: RuleId,
    pub name: String,
    /// Accepted source formats, lowercase, space-separated in config but
    /// stored split here.
    pub source_formats: Vec<String>,
    /// Target format, lowercase (e.g. "mp3", "ts").
    pub target_format: String,
    /// First command template; always present.
    pub step1: String,
    pub step2: Option<String>,
    pub step3: Option<String>,
    /// Whether newly created players get this rule enabled.
    pub default_active: bool,
}

impl TranscodingRule {
    /// Whether this rule accepts the given source format (case-insensitive).
    pub fn accepts_source(&self, format: &str) -> bool {
        self.source_formats
            .iter()
            .any(|f| f.eq_ignore_ascii_case(format))
    }

    /// Whether this rule produces the given target format (case-insensitive).
    pub fn targets(&self, format: &str) -> bool {
        self.target_format.eq_ignore_ascii_case(format)
    }

    /// The command templates in execution order.
    pub fn steps(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.step1.as_str())
            .chain(self.step2.as_deref())
            .chain(self.step3.as_deref())
    }

    /// The last non-empty command template; its contents decide whether the
    /// output length is bitrate-bounded (and thus range-seekable).
    pub fn last_step(&self) -> &str {
        self.step3
            .as_deref()
            .or(self.step2.as_deref())
            .unwrap_or(&self.step1)
    }
}

// ---------------------------------------------------------------------------
// PlayerProfile
// ---------------------------------------------------------------------------

/// Read-only per-player capability and preference snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub id: PlayerId,
    pub username: String,
    /// The player's own bitrate ceiling.
    pub transcode_scheme: TranscodeScheme,
    /// The owning user's ceiling; the stricter of the two applies.
    pub user_transcode_scheme: TranscodeScheme,
    /// Transcoding rules enabled for this player, in configured order.
    pub active_rules: Vec<TranscodingRule>,
}

impl PlayerProfile {
    /// The stricter of the player's and the user's scheme.
    pub fn effective_scheme(&self) -> TranscodeScheme {
        self.transcode_scheme
            .strictest(self.user_transcode_scheme)
    }
}

// ---------------------------------------------------------------------------
// Dimensions
// ---------------------------------------------------------------------------

/// A width × height pair in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Dimensions {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (w, h) = s
            .split_once('x')
            .ok_or_else(|| format!("invalid size spec: {s}"))?;
        let width = w
            .parse::<u32>()
            .map_err(|_| format!("invalid width: {w}"))?;
        let height = h
            .parse::<u32>()
            .map_err(|_| format!("invalid height: {h}"))?;
        Ok(Self { width, height })
    }
}

// ---------------------------------------------------------------------------
// VideoSettings
// ---------------------------------------------------------------------------

/// Per-request video conversion parameters; built by the resolver or the
/// segment endpoint, never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoSettings {
    pub width: u32,
    pub height: u32,
    pub time_offset_secs: u32,
    pub duration_secs: u32,
    pub audio_track_index: Option<u32>,
    pub hls_segment_index: Option<u64>,
    pub hls_segment_filename: Option<String>,
    pub output_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(step1: &str, step2: Option<&str>) -> TranscodingRule {
        TranscodingRule {
            id: RuleId::new(),
            name: "test".into(),
            source_formats: vec!["flac".into(), "ogg".into()],
            target_format: "mp3".into(),
            step1: step1.into(),
            step2: step2.map(Into::into),
            step3: None,
            default_active: true,
        }
    }

    #[test]
    fn scheme_strictest_prefers_lower_cap() {
        assert_eq!(
            TranscodeScheme::Max128.strictest(TranscodeScheme::Max320),
            TranscodeScheme::Max128
        );
        assert_eq!(
            TranscodeScheme::Max320.strictest(TranscodeScheme::Max128),
            TranscodeScheme::Max128
        );
    }

    #[test]
    fn scheme_off_never_wins_against_cap() {
        assert_eq!(
            TranscodeScheme::Off.strictest(TranscodeScheme::Max64),
            TranscodeScheme::Max64
        );
        assert_eq!(
            TranscodeScheme::Max64.strictest(TranscodeScheme::Off),
            TranscodeScheme::Max64
        );
        assert_eq!(
            TranscodeScheme::Off.strictest(TranscodeScheme::Off),
            TranscodeScheme::Off
        );
    }

    #[test]
    fn rule_accepts_source_case_insensitive() {
        let r = rule("ffmpeg -i %s -f mp3 -", None);
        assert!(r.accepts_source("FLAC"));
        assert!(r.accepts_source("ogg"));
        assert!(!r.accepts_source("wav"));
    }

    #[test]
    fn rule_last_step() {
        let r = rule("ffmpeg -i %s -f wav -", Some("lame -b %b - -"));
        assert_eq!(r.last_step(), "lame -b %b - -");
        assert_eq!(r.steps().count(), 2);

        let single = rule("ffmpeg -i %s -f mp3 -", None);
        assert_eq!(single.last_step(), "ffmpeg -i %s -f mp3 -");
    }

    #[test]
    fn dimensions_parse_and_display() {
        let d: Dimensions = "640x360".parse().unwrap();
        assert_eq!(d, Dimensions::new(640, 360));
        assert_eq!(d.to_string(), "640x360");

        assert!("640".parse::<Dimensions>().is_err());
        assert!("640xabc".parse::<Dimensions>().is_err());
    }

    #[test]
    fn effective_scheme_combines_player_and_user() {
        let profile = PlayerProfile {
            id: PlayerId::new(),
            username: "anna".into(),
            transcode_scheme: TranscodeScheme::Max192,
            user_transcode_scheme: TranscodeScheme::Max128,
            active_rules: Vec::new(),
        };
        assert_eq!(profile.effective_scheme(), TranscodeScheme::Max128);
    }
}
