use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info};

use crate::{
    audio::{
        scheduler::{QueueHandle, QueueSnapshot},
        session::VoiceSession,
        song::{SearchResult, Song},
    },
    config::PlayerOptions,
    error::{MusicError, MusicResult},
    sources::{is_url, Resolver},
    voice::{JoinOptions, VoiceTransport},
};

/// Servidor y canal de voz de quien pide la canción
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceTarget {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
}

/// Lo que se puede pasar a [`MusicManager::play`]
#[derive(Debug, Clone, PartialEq)]
pub enum PlaySource {
    Song(Song),
    Search(SearchResult),
    /// Solo URLs; el texto libre pasa por [`MusicManager::search`]
    Url(String),
}

impl From<Song> for PlaySource {
    fn from(song: Song) -> Self {
        Self::Song(song)
    }
}

impl From<SearchResult> for PlaySource {
    fn from(result: SearchResult) -> Self {
        Self::Search(result)
    }
}

impl From<String> for PlaySource {
    fn from(url: String) -> Self {
        Self::Url(url)
    }
}

impl From<&str> for PlaySource {
    fn from(url: &str) -> Self {
        Self::Url(url.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// La consulta era una URL
    Song(Song),
    Results(Vec<SearchResult>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Enqueued {
    pub song: Song,
    /// Pendientes después de encolar
    pub pending: Vec<Song>,
}

/// Registro de colas por servidor.
///
/// Crea la cola de un servidor en su primer `play` y la mantiene registrada aunque
/// quede inactiva.
pub struct MusicManager {
    resolver: Arc<dyn Resolver>,
    transport: Arc<dyn VoiceTransport>,
    options: Arc<PlayerOptions>,
    queues: DashMap<GuildId, QueueHandle>,
}

impl MusicManager {
    pub fn new(resolver: Arc<dyn Resolver>, transport: Arc<dyn VoiceTransport>, options: PlayerOptions) -> Self {
        Self {
            resolver,
            transport,
            options: Arc::new(options),
            queues: DashMap::new(),
        }
    }

    pub fn options(&self) -> &PlayerOptions {
        &self.options
    }

    /// Una URL se resuelve directo a una canción; el texto libre devuelve hasta `limit`
    /// resultados en el orden del backend
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        requested_by: Option<UserId>,
    ) -> MusicResult<SearchOutcome> {
        let query = query.trim();

        if is_url(query) {
            let song = self.resolver.resolve(query, requested_by).await?;
            return Ok(SearchOutcome::Song(song));
        }

        let mut results = self.resolver.search(query, limit, requested_by).await?;
        results.truncate(limit);
        debug!("🔍 {} resultados para '{}'", results.len(), query);
        Ok(SearchOutcome::Results(results))
    }

    /// Resuelve la fuente, crea la cola si no existe y encola
    pub async fn play(
        &self,
        target: VoiceTarget,
        source: impl Into<PlaySource>,
        text_channel: Option<ChannelId>,
        position: Option<usize>,
        requested_by: Option<UserId>,
    ) -> MusicResult<Enqueued> {
        let song = self.upgrade(source.into(), requested_by).await?;
        let queue = self.get_or_create(target);

        let pending = queue
            .enqueue(song.clone(), position, Some(target.channel_id), text_channel)
            .await?;

        Ok(Enqueued { song, pending })
    }

    pub fn get_queue(&self, guild_id: GuildId) -> Option<QueueHandle> {
        self.queues.get(&guild_id).map(|entry| entry.value().clone())
    }

    /// Solo para colas registradas en este manager
    pub async fn set_volume(&self, queue: &QueueHandle, volume: f32) -> MusicResult<()> {
        let registered = self
            .queues
            .get(&queue.guild_id())
            .is_some_and(|entry| entry.value().same_queue(queue));

        if !registered {
            return Err(MusicError::NotFound(queue.guild_id()));
        }

        queue.set_volume(volume).await
    }

    pub fn guilds(&self) -> Vec<GuildId> {
        self.queues.iter().map(|entry| *entry.key()).collect()
    }

    // Atajos por servidor

    pub async fn pause(&self, guild_id: GuildId) -> MusicResult<()> {
        self.queue(guild_id)?.pause().await
    }

    pub async fn resume(&self, guild_id: GuildId) -> MusicResult<()> {
        self.queue(guild_id)?.resume().await
    }

    pub async fn skip(&self, guild_id: GuildId) -> MusicResult<Song> {
        self.queue(guild_id)?.skip().await
    }

    pub async fn stop(&self, guild_id: GuildId) -> MusicResult<()> {
        self.queue(guild_id)?.stop().await
    }

    pub async fn jump(&self, guild_id: GuildId, index: usize) -> MusicResult<Song> {
        self.queue(guild_id)?.jump(index).await
    }

    pub async fn seek(&self, guild_id: GuildId, position: Duration) -> MusicResult<()> {
        self.queue(guild_id)?.seek(position).await
    }

    pub async fn remove(&self, guild_id: GuildId, index: usize) -> MusicResult<Song> {
        self.queue(guild_id)?.remove(index).await
    }

    pub async fn move_song(&self, guild_id: GuildId, from: usize, to: usize) -> MusicResult<()> {
        self.queue(guild_id)?.move_song(from, to).await
    }

    pub async fn snapshot(&self, guild_id: GuildId) -> MusicResult<QueueSnapshot> {
        self.queue(guild_id)?.snapshot().await
    }

    fn queue(&self, guild_id: GuildId) -> MusicResult<QueueHandle> {
        self.get_queue(guild_id).ok_or(MusicError::NotFound(guild_id))
    }

    fn get_or_create(&self, target: VoiceTarget) -> QueueHandle {
        self.queues
            .entry(target.guild_id)
            .or_insert_with(|| {
                info!("🆕 Nueva cola para {}", target.guild_id);
                let session = VoiceSession::new(
                    target.guild_id,
                    target.channel_id,
                    self.transport.clone(),
                    JoinOptions {
                        self_deaf: self.options.self_deaf,
                        self_mute: self.options.self_mute,
                    },
                );
                QueueHandle::spawn(session, self.resolver.clone(), self.options.clone())
            })
            .value()
            .clone()
    }

    async fn upgrade(&self, source: PlaySource, requested_by: Option<UserId>) -> MusicResult<Song> {
        match source {
            PlaySource::Song(song) => Ok(song),
            PlaySource::Search(result) => {
                let requested_by = result.requested_by.or(requested_by);
                self.resolver.resolve(&result.url, requested_by).await
            }
            PlaySource::Url(url) => {
                let url = url.trim();
                if !is_url(url) {
                    return Err(MusicError::Resolution(format!("'{}' no es una URL", url)));
                }
                self.resolver.resolve(url, requested_by).await
            }
        }
    }
}
