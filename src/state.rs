//! Shared application context.

use std::sync::Arc;

use cadenza_core::config::Config;

use crate::library::{MediaLibrary, PlayerRegistry};
use crate::sign::HmacSigner;
use crate::streaming::{ChainSegmentProducer, SegmentProducer, SegmentSessionManager};
use crate::transcode::TranscodeResolver;

/// Everything a request handler needs; cheap to clone.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub media: Arc<dyn MediaLibrary>,
    pub players: Arc<dyn PlayerRegistry>,
    pub resolver: Arc<TranscodeResolver>,
    pub sessions: Arc<SegmentSessionManager>,
    pub signer: Arc<HmacSigner>,
}

impl AppContext {
    /// Build a context with the real process-chain segment producer.
    pub fn new(
        config: Config,
        media: Arc<dyn MediaLibrary>,
        players: Arc<dyn PlayerRegistry>,
    ) -> Self {
        let resolver = Arc::new(TranscodeResolver::new(config.transcode.clone()));
        let producer: Arc<dyn SegmentProducer> =
            Arc::new(ChainSegmentProducer::new(resolver.clone()));
        Self::assemble(config, media, players, resolver, producer)
    }

    /// Build a context with an injected segment producer (test harnesses).
    pub fn with_producer(
        config: Config,
        media: Arc<dyn MediaLibrary>,
        players: Arc<dyn PlayerRegistry>,
        producer: Arc<dyn SegmentProducer>,
    ) -> Self {
        let resolver = Arc::new(TranscodeResolver::new(config.transcode.clone()));
        Self::assemble(config, media, players, resolver, producer)
    }

    fn assemble(
        config: Config,
        media: Arc<dyn MediaLibrary>,
        players: Arc<dyn PlayerRegistry>,
        resolver: Arc<TranscodeResolver>,
        producer: Arc<dyn SegmentProducer>,
    ) -> Self {
        let sessions = Arc::new(SegmentSessionManager::new(producer, &config.transcode));
        let signer = Arc::new(HmacSigner::from_config(&config.signing));
        Self {
            config: Arc::new(config),
            media,
            players,
            resolver,
            sessions,
            signer,
        }
    }
}
