//! In-memory voice transport and resolver

use async_trait::async_trait;
use discmusic::{
    audio::{CompletionSignal, SearchResult, Song},
    sources::Resolver,
    voice::{ActiveStream, JoinOptions, StreamRequest, VoiceTransport},
    MusicError, MusicResult,
};
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::{mpsc, Notify};

/// Observable state of one fake stream
#[derive(Debug, Default)]
pub struct StreamState {
    pub paused: AtomicBool,
    pub stopped: AtomicBool,
    pub volume: Mutex<f32>,
    pub seeked_to: Mutex<Option<Duration>>,
}

/// One call to `VoiceTransport::play`
#[derive(Debug)]
pub struct PlayRecord {
    pub guild_id: GuildId,
    pub locator: String,
    pub volume: f32,
    pub signal: CompletionSignal,
    pub state: Arc<StreamState>,
}

#[derive(Default)]
pub struct FakeTransport {
    connected: Mutex<HashSet<GuildId>>,
    last_channel: Mutex<Option<ChannelId>>,
    pub joins: AtomicUsize,
    pub leaves: AtomicUsize,
    fail_join: AtomicBool,
    seekable: AtomicBool,
    plays: Mutex<Option<mpsc::UnboundedSender<PlayRecord>>>,
}

impl FakeTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<PlayRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Self {
            plays: Mutex::new(Some(tx)),
            ..Self::default()
        };
        (Arc::new(transport), rx)
    }

    pub fn fail_join(&self, fail: bool) {
        self.fail_join.store(fail, Ordering::SeqCst);
    }

    pub fn set_seekable(&self, seekable: bool) {
        self.seekable.store(seekable, Ordering::SeqCst);
    }

    /// Simulates the gateway dropping the voice connection
    pub fn drop_connection(&self, guild_id: GuildId) {
        self.connected.lock().remove(&guild_id);
    }

    pub fn last_channel(&self) -> Option<ChannelId> {
        *self.last_channel.lock()
    }

    pub fn joins(&self) -> usize {
        self.joins.load(Ordering::SeqCst)
    }

    pub fn leaves(&self) -> usize {
        self.leaves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId, _options: JoinOptions) -> MusicResult<()> {
        if self.fail_join.load(Ordering::SeqCst) {
            return Err(MusicError::VoiceConnect("timeout".to_string()));
        }

        self.joins.fetch_add(1, Ordering::SeqCst);
        self.connected.lock().insert(guild_id);
        *self.last_channel.lock() = Some(channel_id);
        Ok(())
    }

    async fn leave(&self, guild_id: GuildId) -> MusicResult<()> {
        self.leaves.fetch_add(1, Ordering::SeqCst);
        self.connected.lock().remove(&guild_id);
        Ok(())
    }

    fn is_connected(&self, guild_id: GuildId) -> bool {
        self.connected.lock().contains(&guild_id)
    }

    async fn play(
        &self,
        guild_id: GuildId,
        request: StreamRequest,
        signal: CompletionSignal,
    ) -> MusicResult<Box<dyn ActiveStream>> {
        if !self.is_connected(guild_id) {
            return Err(MusicError::Playback("not connected".to_string()));
        }

        let state = Arc::new(StreamState {
            volume: Mutex::new(request.volume),
            ..StreamState::default()
        });

        if let Some(plays) = self.plays.lock().as_ref() {
            let _ = plays.send(PlayRecord {
                guild_id,
                locator: request.locator,
                volume: request.volume,
                signal,
                state: state.clone(),
            });
        }

        Ok(Box::new(FakeStream {
            state,
            seekable: self.seekable.load(Ordering::SeqCst),
        }))
    }
}

struct FakeStream {
    state: Arc<StreamState>,
    seekable: bool,
}

#[async_trait]
impl ActiveStream for FakeStream {
    async fn pause(&self) -> MusicResult<()> {
        self.state.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn resume(&self) -> MusicResult<()> {
        self.state.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> MusicResult<()> {
        self.state.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> MusicResult<()> {
        *self.state.volume.lock() = volume;
        Ok(())
    }

    async fn seek(&self, position: Duration) -> MusicResult<()> {
        if !self.seekable {
            return Err(MusicError::UnsupportedOperation("seek".to_string()));
        }
        *self.state.seeked_to.lock() = Some(position);
        Ok(())
    }
}

/// Resolves every URL to a song and every song to `stream:<url>`
#[derive(Default)]
pub struct FakeResolver {
    holds: Mutex<HashMap<String, Arc<Notify>>>,
    failures: Mutex<HashSet<String>>,
    results: Mutex<Vec<SearchResult>>,
    pub lookups: AtomicUsize,
    pub searches: AtomicUsize,
}

impl FakeResolver {
    /// Blocks `stream_url(url)` until `release(url)`
    pub fn hold(&self, url: &str) {
        self.holds
            .lock()
            .insert(url.to_string(), Arc::new(Notify::new()));
    }

    pub fn release(&self, url: &str) {
        if let Some(notify) = self.holds.lock().get(url) {
            notify.notify_one();
        }
    }

    /// Makes `stream_url(url)` fail
    pub fn fail(&self, url: &str) {
        self.failures.lock().insert(url.to_string());
    }

    pub fn set_results(&self, results: Vec<SearchResult>) {
        *self.results.lock() = results;
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Resolver for FakeResolver {
    async fn resolve(&self, url: &str, requested_by: Option<UserId>) -> MusicResult<Song> {
        let id = url.rsplit('/').next().unwrap_or(url);
        let mut song = Song::new(id, format!("Song {}", id), url);
        if let Some(user_id) = requested_by {
            song = song.with_requested_by(user_id);
        }
        Ok(song)
    }

    async fn search(
        &self,
        _query: &str,
        limit: usize,
        _requested_by: Option<UserId>,
    ) -> MusicResult<Vec<SearchResult>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        Ok(self.results.lock().iter().take(limit).cloned().collect())
    }

    async fn stream_url(&self, url: &str) -> MusicResult<String> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        let hold = self.holds.lock().get(url).cloned();
        if let Some(notify) = hold {
            notify.notified().await;
        }

        if self.failures.lock().contains(url) {
            return Err(MusicError::Resolution(format!("no stream for {}", url)));
        }

        Ok(format!("stream:{}", url))
    }
}
