//! Segment production seam.
//!
//! Sessions start their encoder through [`SegmentProducer`] so that the
//! session manager's admission-control and fan-out logic can be exercised
//! without spawning real processes.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use cadenza_av::chain::ChainHandle;
use cadenza_core::{MediaRef, Result, VideoSettings};
use cadenza_media::hls::SEGMENT_DURATION_SECS;

use crate::transcode::{select_dimensions, TranscodeResolver};

use super::sessions::SessionKey;

/// Handle to a running segment producer.
///
/// [`ChainHandle`] is the real implementation; tests substitute fakes.
pub trait ProducerHandle: Send {
    /// Whether the producer has exited (normally or otherwise).
    fn finished(&mut self) -> bool;
    /// Terminate the producer. Idempotent.
    fn kill(&mut self);
}

impl ProducerHandle for ChainHandle {
    fn finished(&mut self) -> bool {
        ChainHandle::finished(self)
    }

    fn kill(&mut self) {
        ChainHandle::kill(self)
    }
}

/// Starts the encoder that writes `<index>.ts` files into a session's
/// private directory.
#[async_trait]
pub trait SegmentProducer: Send + Sync {
    async fn start(
        &self,
        media: &MediaRef,
        key: &SessionKey,
        dir: &Path,
        start_index: u64,
    ) -> Result<Box<dyn ProducerHandle>>;
}

/// Real producer: resolves the segmenting rule and spawns its process chain
/// detached, writing segment files named `<index>.ts` plus the encoder's
/// own playlist into the session directory.
pub struct ChainSegmentProducer {
    resolver: Arc<TranscodeResolver>,
}

impl ChainSegmentProducer {
    pub fn new(resolver: Arc<TranscodeResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl SegmentProducer for ChainSegmentProducer {
    async fn start(
        &self,
        media: &MediaRef,
        key: &SessionKey,
        dir: &Path,
        start_index: u64,
    ) -> Result<Box<dyn ProducerHandle>> {
        let resolved = self.resolver.resolve_segmented(media, key.max_bitrate_kbps)?;

        let dimensions = key
            .dimensions
            .unwrap_or_else(|| select_dimensions(key.max_bitrate_kbps, media.dimensions()));

        // Encoders cannot seek arbitrarily, so a session always starts at
        // the first requested segment's offset and runs forward from there.
        let time_offset = (start_index as u32) * SEGMENT_DURATION_SECS
            + media.start_offset_secs.unwrap_or(0);

        let settings = VideoSettings {
            width: dimensions.width,
            height: dimensions.height,
            time_offset_secs: time_offset,
            duration_secs: key.duration_secs,
            audio_track_index: key.audio_track,
            hls_segment_index: Some(start_index),
            hls_segment_filename: Some(format!("{}/%d.ts", dir.display())),
            output_path: Some(dir.join("index.m3u8")),
        };

        let chain = self.resolver.build_chain(media, &resolved, Some(&settings))?;
        let handle = chain.spawn_detached()?;

        tracing::info!(
            media = %media.id,
            player = %key.player_id,
            bitrate = key.max_bitrate_kbps,
            start_index,
            dir = %dir.display(),
            "Started segmenting chain"
        );

        Ok(Box::new(handle))
    }
}
