//! Axum server: router construction and startup.

pub mod error;
mod routes_hls;
mod routes_stream;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use cadenza_core::{Error, Result};

use crate::state::AppContext;

/// Build the complete application router.
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/hls.m3u8", get(routes_hls::hls_playlist))
        .route("/segment/{file}", get(routes_hls::hls_segment))
        .route("/stream", get(routes_stream::stream))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(ctx)
}

/// Bind and serve until ctrl-c; destroys all segment sessions on the way
/// out so no encoder outlives the server.
pub async fn start_server(ctx: AppContext) -> anyhow::Result<()> {
    let addr = format!("{}:{}", ctx.config.server.host, ctx.config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {addr}");

    let sessions = ctx.sessions.clone();
    let app = build_router(ctx);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    sessions.shutdown();
    Ok(())
}

async fn health(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "sessions": ctx.sessions.len(),
    }))
}

/// Ordered multimap view over raw query parameters.
///
/// `serde`-based extraction cannot express repeated keys like
/// `maxBitRate=800&maxBitRate=2200`, so handlers work on the raw pair list.
pub(crate) struct QueryMap {
    params: Vec<(String, String)>,
}

impl QueryMap {
    pub(crate) fn new(params: Vec<(String, String)>) -> Self {
        Self { params }
    }

    pub(crate) fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub(crate) fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.params
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub(crate) fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| Error::Validation(format!("missing parameter: {key}")))
    }

    /// Required parameter parsed via `FromStr`; parse failure is a 400.
    pub(crate) fn require_parsed<T: std::str::FromStr>(&self, key: &str) -> Result<T> {
        self.require(key)?
            .parse::<T>()
            .map_err(|_| Error::Validation(format!("invalid parameter: {key}")))
    }

    /// Optional parameter parsed via `FromStr`; present-but-invalid is a 400.
    pub(crate) fn parse_opt<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>> {
        self.get(key)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|_| Error::Validation(format!("invalid parameter: {key}")))
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> QueryMap {
        QueryMap::new(vec![
            ("id".into(), "abc".into()),
            ("maxBitRate".into(), "800".into()),
            ("maxBitRate".into(), "2200@1280x720".into()),
        ])
    }

    #[test]
    fn get_returns_first_match() {
        let q = map();
        assert_eq!(q.get("maxBitRate"), Some("800"));
        assert_eq!(q.get("missing"), None);
    }

    #[test]
    fn get_all_preserves_order() {
        let q = map();
        let all: Vec<&str> = q.get_all("maxBitRate").collect();
        assert_eq!(all, vec!["800", "2200@1280x720"]);
    }

    #[test]
    fn require_parsed_maps_to_validation_error() {
        let q = map();
        let err = q.require_parsed::<u32>("id").unwrap_err();
        assert_eq!(err.http_status(), 400);
        let missing = q.require_parsed::<u32>("nope").unwrap_err();
        assert_eq!(missing.http_status(), 400);
        assert_eq!(q.require_parsed::<u32>("maxBitRate").unwrap(), 800);
    }

    #[test]
    fn parse_opt_distinguishes_absent_from_invalid() {
        let q = map();
        assert_eq!(q.parse_opt::<u32>("nope").unwrap(), None);
        assert!(q.parse_opt::<u32>("id").is_err());
    }
}
