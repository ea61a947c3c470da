//! Progressive (non-segmented) streaming endpoint.
//!
//! Drives the same resolver as HLS: passthrough serves the source file with
//! range support; a selected rule streams the process chain's stdout. A
//! chain that cannot start falls back to the untouched source rather than
//! failing the request.

use std::io::SeekFrom;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use cadenza_core::{Error, MediaId, MediaRef, PlayerId};

use crate::state::AppContext;
use crate::transcode::ResolveRequest;

use super::error::AppError;
use super::QueryMap;

/// GET /stream?id=&player=&maxBitRate=&format=
pub async fn stream(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Query(params): Query<Vec<(String, String)>>,
) -> std::result::Result<Response, AppError> {
    let q = QueryMap::new(params);

    let media_id: MediaId = q.require_parsed("id")?;
    let player_id = q.parse_opt::<PlayerId>("player")?;
    let max_bitrate_override = q.parse_opt::<u32>("maxBitRate")?;
    let preferred_format = q.get("format");

    let media = ctx
        .media
        .find_media(media_id)
        .await?
        .ok_or_else(|| Error::not_found("media", media_id))?;
    let player = ctx.players.resolve_player(player_id).await?;

    let resolved = ctx.resolver.resolve(ResolveRequest {
        media: &media,
        player: &player,
        preferred_format,
        max_bitrate_override,
        wants_segmented: false,
    });

    if resolved.is_passthrough() {
        let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
        return Ok(serve_source(&media, range).await?);
    }

    match ctx
        .resolver
        .build_chain(&media, &resolved, None)
        .and_then(|chain| chain.spawn())
    {
        Ok(output) => {
            let rule = resolved.rule.as_ref().expect("non-passthrough has a rule");
            let mut response = Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, format_mime(&rule.target_format));
            if let Some(length) = resolved.estimated_length {
                response = response.header(header::CONTENT_LENGTH, length.to_string());
            }
            if resolved.range_seekable {
                response = response.header(header::ACCEPT_RANGES, "bytes");
            }
            Ok(response.body(Body::from_stream(output)).unwrap())
        }
        Err(e) => {
            // Transcoder unavailable or chain failed to start: the client
            // still gets the untouched source.
            tracing::warn!(
                media = %media.id,
                error = %e,
                "Transcode chain failed to start; serving source"
            );
            Ok(serve_source(&media, None).await?)
        }
    }
}

/// Serve the source file, honoring a single `bytes=start-end` range.
async fn serve_source(
    media: &MediaRef,
    range: Option<&str>,
) -> cadenza_core::Result<Response> {
    let mut file = tokio::fs::File::open(&media.path)
        .await
        .map_err(|_| Error::not_found("media file", media.path.display()))?;
    let total = file.metadata().await?.len();

    let content_type = format_mime(&media.format);

    if let Some((start, end)) = range.and_then(|r| parse_range(r, total)) {
        file.seek(SeekFrom::Start(start)).await?;
        let reader = file.take(end - start + 1);
        return Ok(Response::builder()
            .status(StatusCode::PARTIAL_CONTENT)
            .header(header::CONTENT_TYPE, content_type)
            .header(header::CONTENT_LENGTH, (end - start + 1).to_string())
            .header(
                header::CONTENT_RANGE,
                format!("bytes {start}-{end}/{total}"),
            )
            .header(header::ACCEPT_RANGES, "bytes")
            .body(Body::from_stream(ReaderStream::new(reader)))
            .unwrap());
    }

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, total.to_string())
        .header(header::ACCEPT_RANGES, "bytes")
        .body(Body::from_stream(ReaderStream::new(file)))
        .unwrap())
}

/// Parse `bytes=start-end` (or `bytes=start-`) into an inclusive range.
fn parse_range(raw: &str, total: u64) -> Option<(u64, u64)> {
    if total == 0 {
        return None;
    }
    let spec = raw.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let start: u64 = start.parse().ok()?;
    let end: u64 = match end {
        "" => total - 1,
        e => e.parse().ok()?,
    };
    if start > end || end >= total {
        return None;
    }
    Some((start, end))
}

/// Content type for a container/format suffix.
fn format_mime(format: &str) -> &'static str {
    match format.to_ascii_lowercase().as_str() {
        "mp3" => "audio/mpeg",
        "ogg" | "oga" | "opus" => "audio/ogg",
        "flac" => "audio/flac",
        "m4a" | "aac" => "audio/mp4",
        "wav" => "audio/x-wav",
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        "ts" => "video/MP2T",
        _ => "application/octet-stream",
    }
}
