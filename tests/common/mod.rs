//! Common test utilities and fakes shared by the integration suites

#![allow(dead_code)]

pub mod mocks;

use discmusic::{
    audio::{MusicManager, QueueEvent, SearchResult, Song, VoiceTarget},
    config::PlayerOptions,
};
use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::sync::{broadcast, mpsc};

use mocks::{FakeResolver, FakeTransport, PlayRecord};

pub const GUILD: GuildId = GuildId::new(1);
pub const VOICE: ChannelId = ChannelId::new(10);
pub const TEXT: ChannelId = ChannelId::new(20);

const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(100);

pub struct Harness {
    pub manager: MusicManager,
    pub transport: Arc<FakeTransport>,
    pub resolver: Arc<FakeResolver>,
    pub plays: mpsc::UnboundedReceiver<PlayRecord>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(PlayerOptions::default())
    }

    pub fn with_options(options: PlayerOptions) -> Self {
        let (transport, plays) = FakeTransport::new();
        let resolver = Arc::new(FakeResolver::default());
        let manager = MusicManager::new(resolver.clone(), transport.clone(), options);

        Self {
            manager,
            transport,
            resolver,
            plays,
        }
    }

    /// Next stream started by the queue
    pub async fn next_play(&mut self) -> PlayRecord {
        tokio::time::timeout(WAIT, self.plays.recv())
            .await
            .expect("timed out waiting for a stream")
            .expect("transport dropped")
    }

    /// Asserts that no stream starts for a short while
    pub async fn assert_no_play(&mut self) {
        if let Ok(Some(record)) = tokio::time::timeout(QUIET, self.plays.recv()).await {
            panic!("unexpected stream started: {}", record.locator);
        }
    }
}

pub fn target() -> VoiceTarget {
    VoiceTarget {
        guild_id: GUILD,
        channel_id: VOICE,
    }
}

pub fn song(id: &str) -> Song {
    Song::new(id, format!("Song {}", id), url(id))
}

pub fn url(id: &str) -> String {
    format!("https://example.com/{}", id)
}

pub fn locator(id: &str) -> String {
    format!("stream:{}", url(id))
}

pub fn result(id: &str) -> SearchResult {
    SearchResult {
        id: id.to_string(),
        url: url(id),
        thumbnail: None,
        title: format!("Result {}", id),
        duration: None,
        views: None,
        channel_name: None,
        requested_by: None,
    }
}

pub fn ids(songs: &[Song]) -> Vec<&str> {
    songs.iter().map(Song::id).collect()
}

/// Waits for the first event matching `pred`, skipping the rest
pub async fn wait_for(
    events: &mut broadcast::Receiver<QueueEvent>,
    pred: impl Fn(&QueueEvent) -> bool,
) -> QueueEvent {
    tokio::time::timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for an event")
}
