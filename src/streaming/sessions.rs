//! Segment session registry and lifecycle.
//!
//! State machine per [`SessionKey`]: absent → active → superseded/destroyed.
//! The registry is keyed by the *full* parameter tuple so racing creators of
//! the same tuple converge on one session, while only one live session is
//! allowed per (media, player) pair: a new bitrate or size request evicts
//! the old session, otherwise stale bitrate switches would pile up encoder
//! processes.
//!
//! Segment readiness is signaled through a `watch` channel fed by a single
//! per-session watcher task, so any number of waiters block on a condition
//! rather than each polling the filesystem. A segment counts as complete
//! when its successor file exists or the encoder has exited; encoders
//! write segments strictly in order.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::watch;

use cadenza_core::config::TranscodeConfig;
use cadenza_core::{Dimensions, Error, MediaId, MediaRef, PlayerId, Result};

use super::producer::{ProducerHandle, SegmentProducer};

// ---------------------------------------------------------------------------
// SessionKey
// ---------------------------------------------------------------------------

/// Full identity of one segmenting session. Two requests with an identical
/// key must observe the same session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub media_id: MediaId,
    pub player_id: PlayerId,
    pub max_bitrate_kbps: u32,
    pub dimensions: Option<Dimensions>,
    pub duration_secs: u32,
    pub audio_track: Option<u32>,
}

impl SessionKey {
    /// Whether another key addresses the same (media, player) pair, the
    /// granularity at which sessions supersede each other.
    pub fn is_sibling_of(&self, other: &SessionKey) -> bool {
        self.media_id == other.media_id && self.player_id == other.player_id
    }
}

// ---------------------------------------------------------------------------
// SegmentSession
// ---------------------------------------------------------------------------

/// Readiness snapshot published by a session's watcher task.
#[derive(Debug, Clone, Default, PartialEq)]
struct SessionStatus {
    /// Highest segment index seen on disk, if any.
    max_seen: Option<u64>,
    /// Whether the encoder has exited.
    finished: bool,
    destroyed: bool,
}

/// One in-flight segmenting session: the encoder process, its private
/// output directory, and the readiness signal.
pub struct SegmentSession {
    key: SessionKey,
    dir: PathBuf,
    start_index: u64,
    handle: parking_lot::Mutex<Option<Box<dyn ProducerHandle>>>,
    status_tx: watch::Sender<SessionStatus>,
    watcher: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
    destroyed: AtomicBool,
}

impl SegmentSession {
    async fn start(
        key: SessionKey,
        media: &MediaRef,
        producer: &dyn SegmentProducer,
        root: &Path,
        start_index: u64,
        poll_interval: Duration,
    ) -> Result<Arc<Self>> {
        let dir = root.join(format!("cadenza-hls-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir)?;

        let handle = match producer.start(media, &key, &dir, start_index).await {
            Ok(handle) => handle,
            Err(e) => {
                let _ = std::fs::remove_dir_all(&dir);
                return Err(e);
            }
        };

        let (status_tx, _) = watch::channel(SessionStatus::default());
        let session = Arc::new(Self {
            key,
            dir,
            start_index,
            handle: parking_lot::Mutex::new(Some(handle)),
            status_tx,
            watcher: parking_lot::Mutex::new(None),
            destroyed: AtomicBool::new(false),
        });

        let watcher = tokio::spawn(watch_directory(Arc::downgrade(&session), poll_interval));
        *session.watcher.lock() = Some(watcher);

        Ok(session)
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Index of the first segment this session produces; earlier indices
    /// can never become ready here.
    pub fn start_index(&self) -> u64 {
        self.start_index
    }

    pub fn segment_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("{index}.ts"))
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Kill the encoder, stop the watcher, delete the working directory,
    /// and release all waiters with a destroyed status. Idempotent.
    fn destroy_now(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(mut handle) = self.handle.lock().take() {
            handle.kill();
        }
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.abort();
        }
        self.status_tx.send_modify(|s| s.destroyed = true);

        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    dir = %self.dir.display(),
                    "Failed to remove session directory: {e}"
                );
            }
        }

        tracing::info!(
            media = %self.key.media_id,
            player = %self.key.player_id,
            bitrate = self.key.max_bitrate_kbps,
            "Destroyed segment session"
        );
    }
}

impl Drop for SegmentSession {
    fn drop(&mut self) {
        self.destroy_now();
    }
}

/// Watcher task: scans the session directory on a bounded interval and
/// publishes readiness. Ends when the encoder exits, the session is
/// destroyed, or the session is dropped.
async fn watch_directory(session: Weak<SegmentSession>, poll_interval: Duration) {
    loop {
        tokio::time::sleep(poll_interval).await;

        let Some(session) = session.upgrade() else {
            return;
        };
        if session.is_destroyed() {
            return;
        }

        // Read the exit state before scanning: files seen after a finished
        // encoder are final.
        let finished = session
            .handle
            .lock()
            .as_mut()
            .map(|h| h.finished())
            .unwrap_or(true);
        let max_seen = scan_segments(&session.dir);

        session.status_tx.send_if_modified(|status| {
            let changed = status.max_seen != max_seen || status.finished != finished;
            status.max_seen = max_seen;
            status.finished = finished;
            changed
        });

        if finished {
            return;
        }
    }
}

/// Highest `<index>.ts` present in a session directory.
fn scan_segments(dir: &Path) -> Option<u64> {
    let entries = std::fs::read_dir(dir).ok()?;
    entries
        .filter_map(|entry| {
            let name = entry.ok()?.file_name();
            let name = name.to_str()?;
            name.strip_suffix(".ts")?.parse::<u64>().ok()
        })
        .max()
}

// ---------------------------------------------------------------------------
// SegmentSessionManager
// ---------------------------------------------------------------------------

/// Keyed registry of in-flight segmenting sessions.
///
/// The only shared mutable structure in the server; safe under arbitrary
/// concurrent access. Creation and sibling eviction run under a single
/// creation lock so racing requests for the same key spawn exactly one
/// encoder, while lookups and waits stay lock-free.
pub struct SegmentSessionManager {
    sessions: DashMap<SessionKey, Arc<SegmentSession>>,
    producer: Arc<dyn SegmentProducer>,
    create_lock: tokio::sync::Mutex<()>,
    session_root: PathBuf,
    poll_interval: Duration,
}

impl SegmentSessionManager {
    pub fn new(producer: Arc<dyn SegmentProducer>, config: &TranscodeConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            producer,
            create_lock: tokio::sync::Mutex::new(()),
            session_root: config
                .session_dir
                .clone()
                .unwrap_or_else(std::env::temp_dir),
            poll_interval: Duration::from_millis(config.segment_poll_interval_ms.max(10)),
        }
    }

    /// Find the live session for a key, or evict siblings and start a new
    /// one beginning at `first_index`.
    pub async fn get_or_create(
        &self,
        key: &SessionKey,
        media: &MediaRef,
        first_index: u64,
    ) -> Result<Arc<SegmentSession>> {
        if let Some(session) = self.lookup(key) {
            return Ok(session);
        }

        let _guard = self.create_lock.lock().await;

        // Re-check: a racing creator may have won while we waited.
        if let Some(session) = self.lookup(key) {
            return Ok(session);
        }

        let siblings: Vec<Arc<SegmentSession>> = self
            .sessions
            .iter()
            .filter(|entry| entry.key().is_sibling_of(key) && entry.key() != key)
            .map(|entry| entry.value().clone())
            .collect();
        for sibling in siblings {
            tracing::info!(
                media = %key.media_id,
                player = %key.player_id,
                old_bitrate = sibling.key().max_bitrate_kbps,
                new_bitrate = key.max_bitrate_kbps,
                "Evicting superseded segment session"
            );
            self.destroy(&sibling);
        }

        let session = SegmentSession::start(
            key.clone(),
            media,
            self.producer.as_ref(),
            &self.session_root,
            first_index,
            self.poll_interval,
        )
        .await?;
        self.sessions.insert(key.clone(), session.clone());
        Ok(session)
    }

    fn lookup(&self, key: &SessionKey) -> Option<Arc<SegmentSession>> {
        let session = self.sessions.get(key).map(|entry| entry.value().clone())?;
        if session.is_destroyed() {
            self.sessions
                .remove_if(key, |_, value| value.is_destroyed());
            return None;
        }
        Some(session)
    }

    /// Block until the segment file for `index` is complete, or the timeout
    /// elapses.
    ///
    /// All failure modes map to [`Error::Unavailable`]: the caller reports
    /// a retryable not-ready (HTTP 503) and the client tries again, by then
    /// against a fresh session if this one was superseded or its encoder
    /// died.
    pub async fn wait_for_segment(
        &self,
        session: &Arc<SegmentSession>,
        index: u64,
        timeout: Duration,
    ) -> Result<PathBuf> {
        if index < session.start_index() {
            return Err(Error::Unavailable(format!(
                "segment {index} predates this session"
            )));
        }

        let mut rx = session.status_tx.subscribe();
        let waited = tokio::time::timeout(
            timeout,
            rx.wait_for(|s| {
                s.destroyed || s.finished || s.max_seen.is_some_and(|max| max > index)
            }),
        )
        .await;

        let status = match waited {
            Err(_elapsed) => {
                return Err(Error::Unavailable(format!("segment {index} not ready")));
            }
            Ok(Err(_closed)) => {
                return Err(Error::Unavailable("session closed".into()));
            }
            Ok(Ok(status)) => SessionStatus::clone(&status),
        };

        if status.destroyed {
            return Err(Error::Unavailable(format!(
                "segment {index} session superseded"
            )));
        }

        let complete = status.max_seen.is_some_and(|max| max > index)
            || (status.finished && status.max_seen.is_some_and(|max| max >= index));
        if complete {
            return Ok(session.segment_path(index));
        }

        // The encoder exited without producing this segment: discard the
        // partial session so the next request starts fresh.
        tracing::warn!(
            media = %session.key().media_id,
            index,
            "Encoder ended before segment was produced; destroying session"
        );
        self.destroy(session);
        Err(Error::Unavailable(format!(
            "segment {index} was not produced"
        )))
    }

    /// Destroy a session and unregister it. Idempotent; never touches a
    /// different session that has since taken the same key.
    pub fn destroy(&self, session: &Arc<SegmentSession>) {
        self.sessions
            .remove_if(session.key(), |_, value| Arc::ptr_eq(value, session));
        session.destroy_now();
    }

    /// Destroy every session; used on server shutdown.
    pub fn shutdown(&self) {
        let all: Vec<Arc<SegmentSession>> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for session in all {
            self.destroy(&session);
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
