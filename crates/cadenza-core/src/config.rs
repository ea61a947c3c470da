//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from TOML and carries the
//! server and transcoding sub-configs. Every section defaults sensibly so a
//! completely empty file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::media::TranscodeScheme;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub transcode: TranscodeConfig,
    pub signing: SigningConfig,
}

impl Config {
    /// Deserialize a `Config` from a TOML string.
    ///
    /// This is intentionally string-based so the caller can read the file
    /// however it sees fit (async, embedded, etc.).
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_toml(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4533,
        }
    }
}

// ---------------------------------------------------------------------------
// TranscodeConfig
// ---------------------------------------------------------------------------

/// Settings consumed by transcode resolution and segmenting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    /// Directory searched first when resolving transcoder executables;
    /// `PATH` is the fallback.
    pub transcoder_dir: PathBuf,

    /// Command template synthesized for segmented (HLS) delivery.
    pub hls_command: String,

    /// Command template synthesized for audio downsampling without a
    /// configured rule.
    pub downsample_command: String,

    /// Command template synthesized for indexed (CUE) tracks when no rule
    /// applies: re-segments the sub-range without re-encoding.
    pub split_command: String,

    /// Seconds added to the duration when predicting transcoded output size.
    pub time_padding_secs: u32,

    /// Bytes added to the bitrate product when predicting output size.
    pub byte_padding: u64,

    /// Server-wide default ceiling applied to players without one.
    pub default_scheme: TranscodeScheme,

    /// How long a segment request waits for its file before reporting
    /// not-ready.
    pub segment_wait_timeout_secs: u64,

    /// Interval at which a session's watcher scans its output directory.
    pub segment_poll_interval_ms: u64,

    /// Root under which session-private output directories are created.
    /// Defaults to the system temp directory when empty.
    pub session_dir: Option<PathBuf>,

    /// Configured transcoding rules, in priority order.
    pub rules: Vec<RuleConfig>,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            transcoder_dir: PathBuf::from("transcode"),
            hls_command: "ffmpeg -ss %o -i %s -async 1 -b:v %vk -s %wx%h -ar 44100 \
                          -ac 2 -map 0:0 -map 0:%i -b:a %rk -v 0 -f hls -hls_time 10 \
                          -start_number %j -hls_segment_filename %n %p"
                .to_string(),
            downsample_command: "ffmpeg -i %s -map 0:0 -b:a %bk -v 0 -f mp3 -".to_string(),
            split_command: "ffmpeg -ss %o -t %d -i %s -c copy -v 0 -f %f -".to_string(),
            time_padding_secs: 2,
            byte_padding: 30_000,
            default_scheme: TranscodeScheme::Off,
            segment_wait_timeout_secs: 20,
            segment_poll_interval_ms: 150,
            session_dir: None,
            rules: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// RuleConfig
// ---------------------------------------------------------------------------

/// One configured transcoding rule as written in the config file.
///
/// Source formats are space-separated, matching how admins write them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    pub name: String,
    pub source_formats: String,
    pub target_format: String,
    pub step1: String,
    #[serde(default)]
    pub step2: Option<String>,
    #[serde(default)]
    pub step3: Option<String>,
    #[serde(default = "default_true")]
    pub default_active: bool,
}

fn default_true() -> bool {
    true
}

impl From<&RuleConfig> for crate::media::TranscodingRule {
    fn from(config: &RuleConfig) -> Self {
        Self {
            id: crate::ids::RuleId::new(),
            name: config.name.clone(),
            source_formats: config
                .source_formats
                .split_whitespace()
                .map(|s| s.to_ascii_lowercase())
                .collect(),
            target_format: config.target_format.to_ascii_lowercase(),
            step1: config.step1.clone(),
            step2: config.step2.clone(),
            step3: config.step3.clone(),
            default_active: config.default_active,
        }
    }
}

// ---------------------------------------------------------------------------
// SigningConfig
// ---------------------------------------------------------------------------

/// URL access-token signing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Shared HMAC secret. When absent a random per-process secret is used,
    /// which invalidates outstanding URLs on restart.
    pub secret: Option<String>,

    /// Lifetime of issued tokens in seconds.
    pub token_ttl_secs: u64,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            secret: None,
            token_ttl_secs: 3600,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_valid() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.server.port, 4533);
        assert_eq!(config.transcode.time_padding_secs, 2);
        assert_eq!(config.transcode.byte_padding, 30_000);
    }

    #[test]
    fn partial_toml_overrides() {
        let config = Config::from_toml(
            r#"
            [server]
            port = 9090

            [transcode]
            transcoder_dir = "/opt/transcode"
            segment_wait_timeout_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(
            config.transcode.transcoder_dir,
            PathBuf::from("/opt/transcode")
        );
        assert_eq!(config.transcode.segment_wait_timeout_secs, 5);
    }

    #[test]
    fn invalid_toml_is_a_validation_error() {
        let err = Config::from_toml("server = 3").unwrap_err();
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn load_missing_file_falls_back_to_default() {
        let config = Config::load_or_default(Some(Path::new("/nonexistent/cadenza.toml")));
        assert_eq!(config.server.port, 4533);
    }

    #[test]
    fn rule_config_splits_source_formats() {
        let config = Config::from_toml(
            r#"
            [[transcode.rules]]
            name = "audio to mp3"
            source_formats = "FLAC ogg ape"
            target_format = "mp3"
            step1 = "ffmpeg -i %s -b:a %bk -v 0 -f mp3 -"
            "#,
        )
        .unwrap();

        let rule: crate::media::TranscodingRule = (&config.transcode.rules[0]).into();
        assert_eq!(rule.source_formats, vec!["flac", "ogg", "ape"]);
        assert_eq!(rule.target_format, "mp3");
        assert!(rule.default_active);
        assert!(rule.step2.is_none());
    }

    #[test]
    fn default_hls_command_carries_segment_placeholders() {
        let config = TranscodeConfig::default();
        for token in ["%s", "%o", "%j", "%n", "%p"] {
            assert!(config.hls_command.contains(token), "missing {token}");
        }
    }
}
