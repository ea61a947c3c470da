//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which wires an in-memory media library and
//! player registry into a full [`AppContext`], with a fake segment producer
//! so no real encoder is needed. The [`with_server`] constructor starts
//! Axum on a random port for HTTP-level testing.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use cadenza::library::{InMemoryMediaLibrary, InMemoryPlayerRegistry};
use cadenza::server::build_router;
use cadenza::state::AppContext;
use cadenza::streaming::{ProducerHandle, SegmentProducer, SessionKey};
use cadenza_core::config::Config;
use cadenza_core::{MediaId, MediaKind, MediaRef, Result, RuleId, TranscodingRule};

/// Producer that writes fake segment files instead of spawning an encoder.
pub struct FakeProducer {
    spawns: Arc<AtomicUsize>,
    segments: u64,
    finish: bool,
}

impl FakeProducer {
    /// Writes `segments` files immediately; `finish` controls whether the
    /// fake encoder reports itself exited.
    pub fn new(segments: u64, finish: bool) -> Self {
        Self {
            spawns: Arc::new(AtomicUsize::new(0)),
            segments,
            finish,
        }
    }

    pub fn spawn_counter(&self) -> Arc<AtomicUsize> {
        self.spawns.clone()
    }
}

struct FakeHandle {
    finished: Arc<AtomicBool>,
}

impl ProducerHandle for FakeHandle {
    fn finished(&mut self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    fn kill(&mut self) {
        self.finished.store(true, Ordering::Release);
    }
}

#[async_trait::async_trait]
impl SegmentProducer for FakeProducer {
    async fn start(
        &self,
        _media: &MediaRef,
        _key: &SessionKey,
        dir: &Path,
        start_index: u64,
    ) -> Result<Box<dyn ProducerHandle>> {
        self.spawns.fetch_add(1, Ordering::SeqCst);
        for i in start_index..start_index + self.segments {
            std::fs::write(dir.join(format!("{i}.ts")), b"segmentdata")?;
        }
        Ok(Box::new(FakeHandle {
            finished: Arc::new(AtomicBool::new(self.finish)),
        }))
    }
}

/// Test harness wrapping a fully-constructed [`AppContext`].
pub struct TestHarness {
    pub ctx: AppContext,
    pub library: Arc<InMemoryMediaLibrary>,
    pub players: Arc<InMemoryPlayerRegistry>,
}

impl TestHarness {
    /// Default config tuned for tests: fast polls, short waits, and command
    /// templates whose executables (`cat`) exist everywhere.
    pub fn test_config() -> Config {
        let mut config = Config::default();
        config.transcode.hls_command = "cat %s".into();
        config.transcode.downsample_command = "cat %s".into();
        config.transcode.split_command = "cat %s".into();
        config.transcode.segment_wait_timeout_secs = 1;
        config.transcode.segment_poll_interval_ms = 20;
        config.signing.secret = Some("integration-test-secret".into());
        config
    }

    pub fn with_producer(config: Config, producer: Arc<dyn SegmentProducer>) -> Self {
        let library = Arc::new(InMemoryMediaLibrary::new());
        let players = Arc::new(InMemoryPlayerRegistry::new(
            config.transcode.default_scheme,
            default_rules(),
        ));
        let ctx =
            AppContext::with_producer(config, library.clone(), players.clone(), producer);
        Self {
            ctx,
            library,
            players,
        }
    }

    pub fn new() -> Self {
        Self::with_producer(Self::test_config(), Arc::new(FakeProducer::new(3, true)))
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn with_server() -> (Self, SocketAddr) {
        Self::serve(Self::new()).await
    }

    pub async fn with_server_producer(producer: Arc<dyn SegmentProducer>) -> (Self, SocketAddr) {
        Self::serve(Self::with_producer(Self::test_config(), producer)).await
    }

    async fn serve(harness: Self) -> (Self, SocketAddr) {
        let app = build_router(harness.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (harness, addr)
    }

    /// Register a media file backed by a real on-disk file and return its id.
    pub fn add_media(&self, path: &Path, format: &str, duration_secs: Option<u32>) -> MediaId {
        let kind = match format {
            "mkv" | "mp4" | "webm" | "avi" => MediaKind::Video,
            _ => MediaKind::Audio,
        };
        let file_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        let media = MediaRef {
            id: MediaId::new(),
            path: path.to_path_buf(),
            folder: path.parent().unwrap_or(Path::new("/")).to_path_buf(),
            format: format.into(),
            kind,
            title: Some("Test Media".into()),
            artist: None,
            album: None,
            duration_secs,
            bit_rate_kbps: Some(320),
            width: if kind == MediaKind::Video {
                Some(1920)
            } else {
                None
            },
            height: if kind == MediaKind::Video {
                Some(1080)
            } else {
                None
            },
            file_size,
            indexed_track: false,
            start_offset_secs: None,
        };
        let id = media.id;
        self.library.insert(media);
        id
    }

    /// Write a scratch media file and register it.
    pub fn add_media_file(
        &self,
        dir: &Path,
        name: &str,
        format: &str,
        contents: &[u8],
        duration_secs: Option<u32>,
    ) -> (MediaId, PathBuf) {
        let path = dir.join(name);
        std::fs::write(&path, contents).expect("failed to write media file");
        (self.add_media(&path, format, duration_secs), path)
    }
}

/// Default rules for the guest profile: `cat` stands in for the encoder so
/// chain output equals file contents.
fn default_rules() -> Vec<TranscodingRule> {
    vec![TranscodingRule {
        id: RuleId::new(),
        name: "flac to mp3".into(),
        source_formats: vec!["flac".into()],
        target_format: "mp3".into(),
        step1: "cat %s".into(),
        step2: None,
        step3: None,
        default_active: true,
    }]
}

