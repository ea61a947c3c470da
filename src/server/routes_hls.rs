//! HLS endpoints: playlist and segment delivery.

use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use tokio_util::io::ReaderStream;

use cadenza_core::{Dimensions, Error, MediaId, MediaRef, PlayerId, Result};
use cadenza_media::hls::{
    render_single, render_variant, segment_url, BitrateSpec, SegmentUrlParams,
};

use crate::state::AppContext;
use crate::streaming::SessionKey;
use crate::transcode::select_dimensions;

use super::error::AppError;
use super::QueryMap;

/// GET /hls.m3u8?id=&player=&maxBitRate=<kbps[@WxH]>*
///
/// Two or more `maxBitRate` values produce a variant playlist; one (or
/// none, defaulting from the source bitrate) produces a single-rendition
/// segment list.
pub async fn hls_playlist(
    State(ctx): State<AppContext>,
    Query(params): Query<Vec<(String, String)>>,
) -> std::result::Result<Response, AppError> {
    let q = QueryMap::new(params);

    let media_id: MediaId = q.require_parsed("id")?;
    let player_id = q.parse_opt::<PlayerId>("player")?;
    let audio_track = q.parse_opt::<u32>("audioTrack")?;

    let media = find_media(&ctx, media_id).await?;
    let player = ctx.players.resolve_player(player_id).await?;

    let duration = media
        .duration_secs
        .ok_or_else(|| Error::Internal(format!("media {media_id} has no known duration")))?;

    let mut specs: Vec<BitrateSpec> = q
        .get_all("maxBitRate")
        .map(|raw| raw.parse::<BitrateSpec>().map_err(Error::Validation))
        .collect::<Result<_>>()?;
    if specs.is_empty() {
        specs.push(BitrateSpec::new(media.bit_rate_kbps.unwrap_or(1200)));
    }

    // Segmenting command must be runnable before any segment URL is issued.
    ctx.resolver.resolve_segmented(&media, specs[0].kbps)?;

    // Pin dimensions for video renditions that did not request any.
    for spec in &mut specs {
        if spec.dimensions.is_none() && media.is_video() {
            spec.dimensions = Some(select_dimensions(spec.kbps, media.dimensions()));
        }
    }

    let playlist = if specs.len() > 1 {
        render_variant(media.id, player.id, &specs, ctx.signer.as_ref())
    } else {
        let params = SegmentUrlParams {
            media_id: media.id,
            player_id: player.id,
            spec: specs[0],
            total_duration_secs: duration,
            audio_track,
        };
        render_single(&params, ctx.signer.as_ref())
    };

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-mpegurl")
        .body(Body::from(playlist))
        .unwrap())
}

/// GET /segment/{index}.ts?id=&player=&maxBitRate=&size=&duration=&audioTrack=&expires=&auth=
///
/// Finds or creates the session for the exact parameter tuple, waits up to
/// the configured bound for the segment file, then streams it. Timeouts
/// surface as 503 so players retry.
pub async fn hls_segment(
    State(ctx): State<AppContext>,
    Path(file): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> std::result::Result<Response, AppError> {
    let index: u64 = file
        .strip_suffix(".ts")
        .and_then(|stem| stem.parse().ok())
        .ok_or_else(|| Error::Validation(format!("invalid segment name: {file}")))?;

    let q = QueryMap::new(params);
    let media_id: MediaId = q.require_parsed("id")?;
    let player_id: PlayerId = q.require_parsed("player")?;
    let max_bitrate_kbps: u32 = q.require_parsed("maxBitRate")?;
    let dimensions = q.parse_opt::<Dimensions>("size")?;
    let duration_secs: u32 = q.require_parsed("duration")?;
    let audio_track = q.parse_opt::<u32>("audioTrack")?;

    let expires: u64 = q.require_parsed("expires")?;
    let token = q.require("auth")?;
    let canonical = segment_url(
        &SegmentUrlParams {
            media_id,
            player_id,
            spec: BitrateSpec {
                kbps: max_bitrate_kbps,
                dimensions,
            },
            total_duration_secs: duration_secs,
            audio_track,
        },
        index,
        duration_secs,
    );
    ctx.signer.verify(&canonical, expires, token)?;

    let media = find_media(&ctx, media_id).await?;

    let key = SessionKey {
        media_id,
        player_id,
        max_bitrate_kbps,
        dimensions,
        duration_secs,
        audio_track,
    };
    let session = ctx.sessions.get_or_create(&key, &media, index).await?;

    let timeout = Duration::from_secs(ctx.config.transcode.segment_wait_timeout_secs);
    let path = ctx.sessions.wait_for_segment(&session, index, timeout).await?;

    // The file can vanish between readiness and open if the session was
    // superseded at exactly the wrong moment; that is a retry, not a fault.
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| Error::Unavailable(format!("segment {index} was discarded")))?;
    let length = file.metadata().await.map(|m| m.len()).ok();

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/MP2T")
        .header(header::CONTENT_DISPOSITION, "inline");
    if let Some(length) = length {
        response = response.header(header::CONTENT_LENGTH, length.to_string());
    }
    Ok(response
        .body(Body::from_stream(ReaderStream::new(file)))
        .unwrap())
}

async fn find_media(ctx: &AppContext, id: MediaId) -> Result<MediaRef> {
    ctx.media
        .find_media(id)
        .await?
        .ok_or_else(|| Error::not_found("media", id))
}
