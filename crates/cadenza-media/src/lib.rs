//! cadenza-media: HLS playlist rendering.
//!
//! Pure text generation: given resolved bitrate/dimension candidates and a
//! URL signer, renders variant and single-rendition M3U8 playlists. Output
//! is byte-deterministic for fixed inputs.

pub mod hls;

pub use hls::{
    average_bandwidth_kbps, render_single, render_variant, segment_url, BitrateSpec,
    SegmentUrlParams, UrlSigner, SEGMENT_DURATION_SECS,
};
