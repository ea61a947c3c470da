//! Playlist input types.

use std::fmt;
use std::str::FromStr;

use cadenza_core::{Dimensions, MediaId, PlayerId};

/// Appends a bounded-lifetime access token to a URL.
///
/// Narrow collaborator interface: the playlist generator signs every URL it
/// emits, the serving endpoints verify. Implementations must be
/// deterministic for a fixed URL and key epoch so playlist output stays
/// byte-identical.
pub trait UrlSigner: Send + Sync {
    fn sign(&self, url: &str) -> String;
}

/// One candidate rendition: a peak bitrate, optionally pinned to output
/// dimensions.
///
/// Wire form is `<kbps>` or `<kbps>@<width>x<height>` (the `maxBitRate`
/// request parameter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitrateSpec {
    pub kbps: u32,
    pub dimensions: Option<Dimensions>,
}

impl BitrateSpec {
    pub fn new(kbps: u32) -> Self {
        Self {
            kbps,
            dimensions: None,
        }
    }

    pub fn with_dimensions(kbps: u32, dimensions: Dimensions) -> Self {
        Self {
            kbps,
            dimensions: Some(dimensions),
        }
    }
}

impl fmt::Display for BitrateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.dimensions {
            Some(dim) => write!(f, "{}@{}", self.kbps, dim),
            None => write!(f, "{}", self.kbps),
        }
    }
}

impl FromStr for BitrateSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kbps, dim) = match s.split_once('@') {
            Some((k, d)) => (k, Some(d)),
            None => (s, None),
        };
        let kbps = kbps
            .parse::<u32>()
            .map_err(|_| format!("invalid bitrate spec: {s}"))?;
        let dimensions = dim
            .map(|d| d.parse::<Dimensions>().map_err(|_| format!("invalid bitrate spec: {s}")))
            .transpose()?;
        Ok(Self { kbps, dimensions })
    }
}

/// Everything a segment URL must carry for the segment endpoint to
/// reconstruct its session key.
#[derive(Debug, Clone)]
pub struct SegmentUrlParams {
    pub media_id: MediaId,
    pub player_id: PlayerId,
    pub spec: BitrateSpec,
    /// Total duration of the rendition in seconds.
    pub total_duration_secs: u32,
    pub audio_track: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitrate_spec_parses_bare_kbps() {
        let spec: BitrateSpec = "1200".parse().unwrap();
        assert_eq!(spec.kbps, 1200);
        assert!(spec.dimensions.is_none());
        assert_eq!(spec.to_string(), "1200");
    }

    #[test]
    fn bitrate_spec_parses_with_dimensions() {
        let spec: BitrateSpec = "2200@1280x720".parse().unwrap();
        assert_eq!(spec.kbps, 2200);
        assert_eq!(spec.dimensions, Some(Dimensions::new(1280, 720)));
        assert_eq!(spec.to_string(), "2200@1280x720");
    }

    #[test]
    fn bitrate_spec_rejects_malformed_input() {
        assert!("".parse::<BitrateSpec>().is_err());
        assert!("abc".parse::<BitrateSpec>().is_err());
        assert!("1200@".parse::<BitrateSpec>().is_err());
        assert!("1200@1280".parse::<BitrateSpec>().is_err());
        assert!("1200@1280xtall".parse::<BitrateSpec>().is_err());
        assert!("-5".parse::<BitrateSpec>().is_err());
    }
}
