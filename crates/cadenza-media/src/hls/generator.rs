//! HLS playlist rendering functions.

use std::fmt::Write;

use cadenza_core::{MediaId, PlayerId};

use super::types::{BitrateSpec, SegmentUrlParams, UrlSigner};
use super::average_bandwidth_kbps;

/// Fixed segment duration. Every segment covers a whole 10-second window
/// except the final remainder.
pub const SEGMENT_DURATION_SECS: u32 = 10;

/// Render a variant playlist: one `EXT-X-STREAM-INF` entry per candidate
/// bitrate, each pointing back at the playlist endpoint with that single
/// bitrate pinned.
///
/// `BANDWIDTH` is the peak in bits per second; `AVERAGE-BANDWIDTH` comes
/// from [`average_bandwidth_kbps`].
pub fn render_variant(
    media_id: MediaId,
    player_id: PlayerId,
    specs: &[BitrateSpec],
    signer: &dyn UrlSigner,
) -> String {
    let mut out = String::new();

    writeln!(out, "#EXTM3U").unwrap();
    writeln!(out, "#EXT-X-VERSION:1").unwrap();

    for spec in specs {
        write!(
            out,
            "#EXT-X-STREAM-INF:BANDWIDTH={},AVERAGE-BANDWIDTH={}",
            u64::from(spec.kbps) * 1000,
            u64::from(average_bandwidth_kbps(spec.kbps)) * 1000,
        )
        .unwrap();
        if let Some(dim) = spec.dimensions {
            write!(out, ",RESOLUTION={}", dim).unwrap();
        }
        writeln!(out).unwrap();

        let url = format!("hls.m3u8?id={media_id}&player={player_id}&maxBitRate={spec}");
        writeln!(out, "{}", signer.sign(&url)).unwrap();
    }

    out
}

/// Render a single-rendition playlist with fixed 10-second segments.
///
/// One `EXTINF` per whole window, a final shorter `EXTINF` for a remainder
/// greater than zero, then `#EXT-X-ENDLIST`. Each segment URL carries the
/// full parameter tuple of its session key and is individually signed.
pub fn render_single(
    params: &SegmentUrlParams,
    signer: &dyn UrlSigner,
) -> String {
    let mut out = String::new();

    writeln!(out, "#EXTM3U").unwrap();
    writeln!(out, "#EXT-X-VERSION:1").unwrap();
    writeln!(out, "#EXT-X-TARGETDURATION:{SEGMENT_DURATION_SECS}").unwrap();

    let whole = params.total_duration_secs / SEGMENT_DURATION_SECS;
    let remainder = params.total_duration_secs % SEGMENT_DURATION_SECS;

    for index in 0..u64::from(whole) {
        push_segment(&mut out, params, index, SEGMENT_DURATION_SECS, signer);
    }
    if remainder > 0 {
        push_segment(&mut out, params, u64::from(whole), remainder, signer);
    }

    writeln!(out, "#EXT-X-ENDLIST").unwrap();
    out
}

/// Canonical unsigned segment URL.
///
/// The segment endpoint rebuilds this exact string from its query
/// parameters to verify the signature, so parameter order is part of the
/// contract.
pub fn segment_url(params: &SegmentUrlParams, index: u64, duration_secs: u32) -> String {
    let mut url = format!(
        "segment/{index}.ts?id={}&player={}&maxBitRate={}",
        params.media_id, params.player_id, params.spec.kbps,
    );
    if let Some(dim) = params.spec.dimensions {
        write!(url, "&size={dim}").unwrap();
    }
    write!(url, "&duration={duration_secs}").unwrap();
    if let Some(track) = params.audio_track {
        write!(url, "&audioTrack={track}").unwrap();
    }
    url
}

fn push_segment(
    out: &mut String,
    params: &SegmentUrlParams,
    index: u64,
    duration_secs: u32,
    signer: &dyn UrlSigner,
) {
    writeln!(out, "#EXTINF:{duration_secs},").unwrap();
    writeln!(out, "{}", signer.sign(&segment_url(params, index, duration_secs))).unwrap();
}
