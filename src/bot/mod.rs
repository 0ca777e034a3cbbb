//! # Bot Module
//!
//! Prefix-command glue between Discord and the [`MusicManager`].
//!
//! ## Architecture
//!
//! [`MusicBot`] implements Serenity's [`EventHandler`]. It:
//!
//! - Parses prefix commands ([`commands`]) and replies in the same channel
//! - Resolves the author's voice channel from the cache
//! - Runs one announcer task per guild that posts [`QueueEvent`]s to the
//!   queue's text channel

pub mod commands;

use anyhow::Result;
use dashmap::DashMap;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Message, Ready, UserId},
    async_trait,
    http::Http,
};
use std::sync::Arc;
use tokio::{sync::broadcast::error::RecvError, task::JoinHandle};
use tracing::{debug, error, info, warn};

use crate::audio::{MusicManager, QueueEvent, SearchResult};

pub struct MusicBot {
    manager: Arc<MusicManager>,
    prefix: String,
    search_limit: usize,
    /// Última búsqueda de cada usuario, para `play <número>`
    searches: DashMap<(GuildId, UserId), Vec<SearchResult>>,
    announcers: DashMap<GuildId, JoinHandle<()>>,
}

impl MusicBot {
    pub fn new(manager: Arc<MusicManager>, prefix: impl Into<String>) -> Self {
        let search_limit = manager.options().search_limit;
        Self {
            manager,
            prefix: prefix.into(),
            search_limit,
            searches: DashMap::new(),
            announcers: DashMap::new(),
        }
    }

    /// Canal de voz en el que está el usuario
    fn user_voice_channel(&self, ctx: &Context, guild_id: GuildId, user_id: UserId) -> Result<ChannelId> {
        let guild = guild_id
            .to_guild_cached(&ctx.cache)
            .ok_or_else(|| anyhow::anyhow!("No se pudo encontrar el servidor"))?;

        let voice_state = guild
            .voice_states
            .get(&user_id)
            .ok_or_else(|| anyhow::anyhow!("Debes estar en un canal de voz para usar este comando"))?;

        voice_state
            .channel_id
            .ok_or_else(|| anyhow::anyhow!("No se pudo detectar tu canal de voz"))
    }

    /// Lanza el anunciador del servidor si no existe o terminó
    fn ensure_announcer(&self, ctx: &Context, guild_id: GuildId) {
        let Some(queue) = self.manager.get_queue(guild_id) else {
            return;
        };

        let mut entry = self.announcers.entry(guild_id).or_insert_with(|| {
            spawn_announcer(ctx.http.clone(), self.manager.clone(), guild_id, queue.subscribe())
        });

        if entry.is_finished() {
            *entry = spawn_announcer(ctx.http.clone(), self.manager.clone(), guild_id, queue.subscribe());
        }
    }
}

fn spawn_announcer(
    http: Arc<Http>,
    manager: Arc<MusicManager>,
    guild_id: GuildId,
    mut events: tokio::sync::broadcast::Receiver<QueueEvent>,
) -> JoinHandle<()> {
    debug!("📣 Anunciador iniciado para {}", guild_id);

    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("⚠️ Anunciador de {} perdió {} eventos", guild_id, skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let Some(text) = describe(&event) else {
                continue;
            };

            let channel = match manager.snapshot(guild_id).await {
                Ok(snapshot) => snapshot.text_channel,
                Err(_) => break,
            };

            if let Some(channel) = channel {
                if let Err(e) = channel.say(&http, text).await {
                    warn!("⚠️ No se pudo anunciar en {}: {}", channel, e);
                }
            }
        }
    })
}

/// Mensaje para el canal de texto, si el evento lo amerita
pub fn describe(event: &QueueEvent) -> Option<String> {
    match event {
        QueueEvent::TrackStarted { song, .. } => Some(if song.duration_text().is_empty() {
            format!("🎵 Reproduciendo: **{}**", song.title())
        } else {
            format!("🎵 Reproduciendo: **{}** [{}]", song.title(), song.duration_text())
        }),
        QueueEvent::TrackFailed { song, error, .. } => Some(format!(
            "❌ No se pudo reproducir **{}**: {}",
            song.as_ref().map(|s| s.title()).unwrap_or("Unknown"),
            error
        )),
        QueueEvent::VoiceLost { error, .. } => Some(format!("🔇 Se perdió la conexión de voz: {}", error)),
        QueueEvent::Finished { .. } => Some("📭 Cola terminada".to_string()),
        QueueEvent::Stopped { .. } => None,
    }
}

#[async_trait]
impl EventHandler for MusicBot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        let Some(command) = commands::parse(&self.prefix, &msg.content) else {
            return;
        };

        let reply = match command {
            Ok(command) => match commands::execute(self, &ctx, &msg, command).await {
                Ok(reply) => reply,
                Err(e) => {
                    debug!("Comando falló: {:?}", e);
                    format!("❌ {}", e)
                }
            },
            Err(e) => format!("❌ {}", e),
        };

        if let Err(e) = msg.channel_id.say(&ctx.http, reply).await {
            error!("Error al responder: {:?}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{audio::Song, error::MusicError};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_describe_events() {
        let guild_id = GuildId::new(1);
        let song = Song::new("a", "Song A", "https://e.com/a");

        assert_eq!(
            describe(&QueueEvent::TrackStarted { guild_id, song: song.clone() }),
            Some("🎵 Reproduciendo: **Song A**".to_string())
        );
        assert_eq!(
            describe(&QueueEvent::TrackFailed {
                guild_id,
                song: Some(song),
                error: MusicError::Resolution("404".to_string()),
            }),
            Some("❌ No se pudo reproducir **Song A**: No se pudo resolver la fuente de audio: 404".to_string())
        );
        assert_eq!(describe(&QueueEvent::Stopped { guild_id }), None);
    }
}
