//! Narrow collaborator interfaces.
//!
//! Persistence of media and player records lives in an external system;
//! this server consumes it through two lookup traits. The in-memory
//! implementations back the CLI demo mode and the test harness.

use async_trait::async_trait;
use dashmap::DashMap;

use cadenza_core::{
    MediaId, MediaRef, PlayerId, PlayerProfile, Result, TranscodeScheme, TranscodingRule,
};

/// Media metadata lookup.
#[async_trait]
pub trait MediaLibrary: Send + Sync {
    async fn find_media(&self, id: MediaId) -> Result<Option<MediaRef>>;
}

/// Player capability/preference lookup.
///
/// Always yields a profile: an unknown or absent player id falls back to a
/// guest profile carrying the default-active rules.
#[async_trait]
pub trait PlayerRegistry: Send + Sync {
    async fn resolve_player(&self, id: Option<PlayerId>) -> Result<PlayerProfile>;
}

/// In-memory media lookup.
#[derive(Default)]
pub struct InMemoryMediaLibrary {
    items: DashMap<MediaId, MediaRef>,
}

impl InMemoryMediaLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, media: MediaRef) {
        self.items.insert(media.id, media);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
impl MediaLibrary for InMemoryMediaLibrary {
    async fn find_media(&self, id: MediaId) -> Result<Option<MediaRef>> {
        Ok(self.items.get(&id).map(|entry| entry.value().clone()))
    }
}

/// In-memory player lookup with guest fallback.
pub struct InMemoryPlayerRegistry {
    players: DashMap<PlayerId, PlayerProfile>,
    default_scheme: TranscodeScheme,
    default_rules: Vec<TranscodingRule>,
}

impl InMemoryPlayerRegistry {
    pub fn new(default_scheme: TranscodeScheme, rules: Vec<TranscodingRule>) -> Self {
        Self {
            players: DashMap::new(),
            default_scheme,
            default_rules: rules.into_iter().filter(|r| r.default_active).collect(),
        }
    }

    pub fn insert(&self, profile: PlayerProfile) {
        self.players.insert(profile.id, profile);
    }

    fn guest_profile(&self, id: PlayerId) -> PlayerProfile {
        PlayerProfile {
            id,
            username: "guest".into(),
            transcode_scheme: self.default_scheme,
            user_transcode_scheme: TranscodeScheme::Off,
            active_rules: self.default_rules.clone(),
        }
    }
}

#[async_trait]
impl PlayerRegistry for InMemoryPlayerRegistry {
    async fn resolve_player(&self, id: Option<PlayerId>) -> Result<PlayerProfile> {
        let id = id.unwrap_or_default();
        Ok(self
            .players
            .get(&id)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| self.guest_profile(id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadenza_core::{MediaKind, RuleId};
    use std::path::PathBuf;

    fn media() -> MediaRef {
        MediaRef {
            id: MediaId::new(),
            path: PathBuf::from("/music/a.mp3"),
            folder: PathBuf::from("/music"),
            format: "mp3".into(),
            kind: MediaKind::Audio,
            title: None,
            artist: None,
            album: None,
            duration_secs: Some(60),
            bit_rate_kbps: Some(192),
            width: None,
            height: None,
            file_size: 1_440_000,
            indexed_track: false,
            start_offset_secs: None,
        }
    }

    #[tokio::test]
    async fn media_lookup_roundtrip() {
        let library = InMemoryMediaLibrary::new();
        let m = media();
        let id = m.id;
        library.insert(m);

        assert!(library.find_media(id).await.unwrap().is_some());
        assert!(library.find_media(MediaId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_player_gets_guest_profile_with_default_rules() {
        let rules = vec![
            TranscodingRule {
                id: RuleId::new(),
                name: "active".into(),
                source_formats: vec!["flac".into()],
                target_format: "mp3".into(),
                step1: "enc -i %s -".into(),
                step2: None,
                step3: None,
                default_active: true,
            },
            TranscodingRule {
                id: RuleId::new(),
                name: "inactive".into(),
                source_formats: vec!["ape".into()],
                target_format: "mp3".into(),
                step1: "enc -i %s -".into(),
                step2: None,
                step3: None,
                default_active: false,
            },
        ];
        let registry = InMemoryPlayerRegistry::new(TranscodeScheme::Max192, rules);

        let profile = registry.resolve_player(None).await.unwrap();
        assert_eq!(profile.username, "guest");
        assert_eq!(profile.transcode_scheme, TranscodeScheme::Max192);
        assert_eq!(profile.active_rules.len(), 1);
        assert_eq!(profile.active_rules[0].name, "active");
    }

    #[tokio::test]
    async fn registered_player_profile_wins() {
        let registry = InMemoryPlayerRegistry::new(TranscodeScheme::Off, vec![]);
        let profile = PlayerProfile {
            id: PlayerId::new(),
            username: "anna".into(),
            transcode_scheme: TranscodeScheme::Max128,
            user_transcode_scheme: TranscodeScheme::Off,
            active_rules: vec![],
        };
        let id = profile.id;
        registry.insert(profile);

        let found = registry.resolve_player(Some(id)).await.unwrap();
        assert_eq!(found.username, "anna");
    }
}
