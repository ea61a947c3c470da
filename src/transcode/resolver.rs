//! Transcode resolution algorithm.

use cadenza_av::chain::{portable_input, ProcessChain};
use cadenza_av::template::{build_command, TemplateVars};
use cadenza_av::tools::ToolResolver;
use cadenza_core::config::TranscodeConfig;
use cadenza_core::{
    Error, MediaRef, PlayerProfile, Result, RuleId, TranscodingRule, VideoSettings,
};
use cadenza_media::hls::average_bandwidth_kbps;

use super::dimensions::suitable_audio_bitrate;

/// Inputs to one resolution.
#[derive(Debug, Clone, Copy)]
pub struct ResolveRequest<'a> {
    pub media: &'a MediaRef,
    pub player: &'a PlayerProfile,
    /// Requested target format; `"raw"` forces passthrough.
    pub preferred_format: Option<&'a str>,
    /// Explicit bitrate cap from the request, taking precedence over the
    /// player/user schemes.
    pub max_bitrate_override: Option<u32>,
    /// Segmented (HLS) delivery; always synthesizes a segmenting rule and is
    /// never combined with passthrough.
    pub wants_segmented: bool,
}

/// Outcome of a resolution. Derived, never persisted.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ResolvedTranscode {
    /// Selected or synthesized rule; `None` means passthrough.
    pub rule: Option<TranscodingRule>,
    /// Effective bitrate ceiling in kbps, if any.
    pub max_bitrate_kbps: Option<u32>,
    /// Predicted output size in bytes. `None` means the length cannot be
    /// known: no range requests, no progress bar.
    pub estimated_length: Option<u64>,
    /// Whether byte-range seeking is safe against the predicted length.
    pub range_seekable: bool,
}

impl ResolvedTranscode {
    pub fn is_passthrough(&self) -> bool {
        self.rule.is_none()
    }
}

/// Decides whether/how a media file is converted for a player.
pub struct TranscodeResolver {
    config: TranscodeConfig,
    tools: ToolResolver,
}

impl TranscodeResolver {
    pub fn new(config: TranscodeConfig) -> Self {
        let tools = ToolResolver::new(&config.transcoder_dir);
        Self { config, tools }
    }

    pub fn tools(&self) -> &ToolResolver {
        &self.tools
    }

    pub fn config(&self) -> &TranscodeConfig {
        &self.config
    }

    /// Resolve the conversion for one request.
    ///
    /// Never returns a rule whose executables cannot be located: synthesized
    /// rules are checked too, and fall back to passthrough when their
    /// command is not runnable.
    pub fn resolve(&self, req: ResolveRequest<'_>) -> ResolvedTranscode {
        let media = req.media;
        let scheme_cap = req.player.effective_scheme().kbps();
        let max_bitrate = req.max_bitrate_override.or(scheme_cap);

        let rule = self.select_rule(&req, max_bitrate);

        let estimated_length = match &rule {
            None => Some(media.file_size),
            Some(_) => match (media.duration_secs, max_bitrate) {
                (Some(duration), Some(kbps)) => Some(
                    u64::from(duration + self.config.time_padding_secs)
                        * u64::from(kbps)
                        * 1000
                        / 8
                        + self.config.byte_padding,
                ),
                _ => None,
            },
        };

        let range_seekable = match &rule {
            None => true,
            Some(rule) => estimated_length.is_some() && rule.last_step().contains("%b"),
        };

        if let Some(r) = &rule {
            tracing::debug!(
                media = %media.id,
                rule = %r.name,
                target = %r.target_format,
                max_bitrate = ?max_bitrate,
                "Selected transcoding"
            );
        }

        ResolvedTranscode {
            rule,
            max_bitrate_kbps: max_bitrate,
            estimated_length,
            range_seekable,
        }
    }

    /// Resolve segmented delivery from a session key alone: the segmenting
    /// rule is always synthesized and the bitrate is already pinned, so no
    /// player profile is involved.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tool`] when the configured segmenting command is not
    /// runnable; segmented delivery has no passthrough fallback.
    pub fn resolve_segmented(
        &self,
        media: &MediaRef,
        max_bitrate_kbps: u32,
    ) -> Result<ResolvedTranscode> {
        let rule = self
            .synthesize("hls", &media.format, "ts", self.config.hls_command.clone())
            .ok_or_else(|| Error::tool("hls", "segmenting command is not runnable"))?;

        let estimated_length = media.duration_secs.map(|duration| {
            u64::from(duration + self.config.time_padding_secs)
                * u64::from(max_bitrate_kbps)
                * 1000
                / 8
                + self.config.byte_padding
        });
        let range_seekable = estimated_length.is_some() && rule.last_step().contains("%b");

        Ok(ResolvedTranscode {
            rule: Some(rule),
            max_bitrate_kbps: Some(max_bitrate_kbps),
            estimated_length,
            range_seekable,
        })
    }

    fn select_rule(
        &self,
        req: &ResolveRequest<'_>,
        max_bitrate: Option<u32>,
    ) -> Option<TranscodingRule> {
        let media = req.media;

        // Segmented delivery can never be combined with an unmodified
        // passthrough; the segmenting rule always wins.
        if req.wants_segmented {
            return self.synthesize(
                "hls",
                &media.format,
                "ts",
                self.config.hls_command.clone(),
            );
        }

        if req.preferred_format == Some("raw") {
            return None;
        }

        if let Some(rule) = self.select_configured_rule(req) {
            return Some(rule);
        }

        // Downsample-only synthesis: an explicit cap, a source that exceeds
        // it, and a format we can downsample without a configured rule.
        if let (Some(cap), Some(source_kbps)) = (max_bitrate, media.bit_rate_kbps) {
            if source_kbps > cap && supports_downsample(media) {
                return self.synthesize(
                    "downsample",
                    &media.format,
                    &media.format,
                    self.config.downsample_command.clone(),
                );
            }
        }

        // Split-only synthesis keeps sub-range playback of indexed (CUE)
        // tracks working without re-encoding.
        if media.indexed_track {
            return self.synthesize(
                "split",
                &media.format,
                &media.format,
                self.config.split_command.clone(),
            );
        }

        None
    }

    /// Enumerate the player's enabled rules in configured order, keeping
    /// only runnable ones. A rule whose target matches the preferred format
    /// wins over the first otherwise-applicable rule.
    fn select_configured_rule(&self, req: &ResolveRequest<'_>) -> Option<TranscodingRule> {
        let media = req.media;
        let preferred = req.preferred_format;

        let mut first_applicable: Option<&TranscodingRule> = None;
        for rule in &req.player.active_rules {
            if !rule.steps().all(|step| self.tools.is_runnable(step)) {
                continue;
            }

            let target_match =
                media.is_video() && preferred.is_some_and(|f| rule.targets(f));
            if !target_match && !rule.accepts_source(&media.format) {
                continue;
            }

            if preferred.is_some_and(|f| rule.targets(f)) {
                return Some(rule.clone());
            }
            first_applicable.get_or_insert(rule);
        }

        first_applicable.cloned()
    }

    /// Build a synthesized single-step rule, or `None` when its command is
    /// not runnable (missing executables must never surface in a result).
    fn synthesize(
        &self,
        name: &str,
        source_format: &str,
        target_format: &str,
        step1: String,
    ) -> Option<TranscodingRule> {
        if !self.tools.is_runnable(&step1) {
            tracing::warn!(
                rule = name,
                "Synthesized transcoding is not runnable; falling back"
            );
            return None;
        }
        Some(TranscodingRule {
            id: RuleId::new(),
            name: name.to_string(),
            source_formats: vec![source_format.to_ascii_lowercase()],
            target_format: target_format.to_ascii_lowercase(),
            step1,
            step2: None,
            step3: None,
            default_active: false,
        })
    }

    /// Build the runnable process chain for a resolved transcoding.
    ///
    /// Renders every command step with the request's variables and wires
    /// them into a [`ProcessChain`]. Non-portable input paths are copied to
    /// a scratch file owned by the chain.
    pub fn build_chain(
        &self,
        media: &MediaRef,
        resolved: &ResolvedTranscode,
        video: Option<&VideoSettings>,
    ) -> Result<ProcessChain> {
        let rule = resolved
            .rule
            .as_ref()
            .ok_or_else(|| Error::Internal("no transcoding to run".into()))?;

        let (input_path, scratch) = portable_input(&media.path)?;

        let mut vars = TemplateVars::new()
            .with_format(&media.format)
            .with_input(&input_path);
        if let Some(title) = &media.title {
            vars = vars.with_title(title);
        }
        if let Some(artist) = &media.artist {
            vars = vars.with_artist(artist);
        }
        if let Some(album) = &media.album {
            vars = vars.with_album(album);
        }
        if let Some(kbps) = resolved.max_bitrate_kbps {
            vars = vars
                .with_max_bitrate(kbps)
                .with_average_video_bitrate(average_bandwidth_kbps(kbps))
                .with_audio_bitrate(suitable_audio_bitrate(kbps));
        }

        match video {
            Some(v) => {
                vars = vars
                    .with_time_offset(v.time_offset_secs)
                    .with_duration(v.duration_secs)
                    .with_dimensions(cadenza_core::Dimensions::new(v.width, v.height));
                if let Some(track) = v.audio_track_index {
                    vars = vars.with_audio_track(track);
                }
                if let Some(index) = v.hls_segment_index {
                    vars = vars.with_segment_index(index);
                }
                if let Some(pattern) = &v.hls_segment_filename {
                    vars = vars.with_segment_filename(pattern);
                }
                if let Some(output) = &v.output_path {
                    vars = vars.with_output(output);
                }
            }
            None => {
                // Audio: indexed tracks still carry an offset and duration.
                if let Some(offset) = media.start_offset_secs {
                    vars = vars.with_time_offset(offset);
                }
                if let Some(duration) = media.duration_secs {
                    vars = vars.with_duration(duration);
                }
            }
        }

        let steps = rule
            .steps()
            .map(|step| build_command(step, &vars, &self.tools))
            .collect::<Result<Vec<_>>>()?;

        let mut chain = ProcessChain::new(steps);
        if let Some(scratch) = scratch {
            chain = chain.with_scratch(scratch);
        }
        Ok(chain)
    }
}

/// Downsampling without a configured rule is supported for mp3 audio only.
fn supports_downsample(media: &MediaRef) -> bool {
    !media.is_video() && media.format.eq_ignore_ascii_case("mp3")
}
