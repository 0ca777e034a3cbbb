use async_trait::async_trait;
use dashmap::DashSet;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    error::JoinError,
    input::{ChildContainer, Input},
    tracks::TrackHandle,
    CoreEvent, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{
    process::{Command, Stdio},
    sync::Arc,
    time::Duration,
};
use tracing::{debug, error, info, warn};

use super::{ActiveStream, JoinOptions, StreamRequest, VoiceTransport};
use crate::{
    audio::scheduler::CompletionSignal,
    error::{MusicError, MusicResult},
};

/// Transporte de voz sobre songbird, con ffmpeg como fuente de audio
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    // songbird conserva el `Call` aunque el driver pierda la conexión (kick, caída del gateway)
    connected: Arc<DashSet<GuildId>>,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self {
            manager,
            connected: Arc::new(DashSet::new()),
        }
    }

    /// Lanza `ffmpeg <before> -i <locator> <options>` entregando WAV por stdout
    fn spawn_ffmpeg(request: &StreamRequest) -> MusicResult<Input> {
        let mut command = Command::new("ffmpeg");
        command
            .args(request.before_options.split_whitespace())
            .arg("-i")
            .arg(&request.locator)
            .args(request.options.split_whitespace())
            .args(["-f", "wav", "-ac", "2", "-ar", "48000", "-loglevel", "error", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let child = command
            .spawn()
            .map_err(|e| MusicError::Playback(format!("no se pudo iniciar ffmpeg: {}", e)))?;

        Ok(ChildContainer::from(child).into())
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId, options: JoinOptions) -> MusicResult<()> {
        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| MusicError::VoiceConnect(e.to_string()))?;

        let mut call = call.lock().await;

        // Un solo handler por llamada aunque se reconecte varias veces
        call.remove_all_global_events();
        call.add_global_event(
            Event::Core(CoreEvent::DriverDisconnect),
            DisconnectNotifier {
                guild_id,
                connected: self.connected.clone(),
            },
        );
        self.connected.insert(guild_id);

        if let Err(e) = call.deafen(options.self_deaf).await {
            warn!("⚠️ No se pudo cambiar deafen en {}: {}", guild_id, e);
        }
        if let Err(e) = call.mute(options.self_mute).await {
            warn!("⚠️ No se pudo cambiar mute en {}: {}", guild_id, e);
        }

        info!("🔊 Conectado al canal de voz {} en {}", channel_id, guild_id);
        Ok(())
    }

    async fn leave(&self, guild_id: GuildId) -> MusicResult<()> {
        self.connected.remove(&guild_id);

        match self.manager.remove(guild_id).await {
            Ok(()) => {
                info!("👋 Desconectado del canal de voz en {}", guild_id);
                Ok(())
            }
            Err(JoinError::NoCall) => Ok(()),
            Err(e) => Err(MusicError::VoiceConnect(e.to_string())),
        }
    }

    fn is_connected(&self, guild_id: GuildId) -> bool {
        self.connected.contains(&guild_id) && self.manager.get(guild_id).is_some()
    }

    async fn play(
        &self,
        guild_id: GuildId,
        request: StreamRequest,
        signal: CompletionSignal,
    ) -> MusicResult<Box<dyn ActiveStream>> {
        let call = self
            .manager
            .get(guild_id)
            .ok_or_else(|| MusicError::Playback("no hay conexión de voz".to_string()))?;

        let input = Self::spawn_ffmpeg(&request)?;

        let handle = {
            let mut call = call.lock().await;
            call.play_only_input(input)
        };

        if let Err(e) = handle.set_volume(request.volume) {
            warn!("⚠️ No se pudo aplicar volumen inicial: {}", e);
        }

        // End y Error comparten la misma señal; solo el primero la usa
        let notifier = TrackEndNotifier {
            signal: Arc::new(Mutex::new(Some(signal))),
        };
        for event in [TrackEvent::End, TrackEvent::Error] {
            handle
                .add_event(Event::Track(event), notifier.clone())
                .map_err(|e| MusicError::Playback(format!("no se pudo registrar el handler: {}", e)))?;
        }

        debug!("🎵 Stream iniciado en {}", guild_id);
        Ok(Box::new(SongbirdStream { handle }))
    }
}

/// Marca el servidor como desconectado cuando el driver pierde la conexión
struct DisconnectNotifier {
    guild_id: GuildId,
    connected: Arc<DashSet<GuildId>>,
}

#[async_trait]
impl VoiceEventHandler for DisconnectNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::DriverDisconnect(data) = ctx {
            warn!("🔌 Conexión de voz perdida en {}: {:?}", self.guild_id, data.reason);
        }

        self.connected.remove(&self.guild_id);
        None
    }
}

#[derive(Clone)]
struct TrackEndNotifier {
    signal: Arc<Mutex<Option<CompletionSignal>>>,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(tracks) = ctx {
            for (state, _) in tracks.iter() {
                if let songbird::tracks::PlayMode::Errored(e) = &state.playing {
                    error!("❌ Error en el stream: {:?}", e);
                }
            }
        }

        if let Some(signal) = self.signal.lock().take() {
            signal.finish();
        }

        Some(Event::Cancel)
    }
}

struct SongbirdStream {
    handle: TrackHandle,
}

#[async_trait]
impl ActiveStream for SongbirdStream {
    async fn pause(&self) -> MusicResult<()> {
        self.handle
            .pause()
            .map_err(|e| MusicError::Playback(e.to_string()))
    }

    async fn resume(&self) -> MusicResult<()> {
        self.handle
            .play()
            .map_err(|e| MusicError::Playback(e.to_string()))
    }

    async fn stop(&self) -> MusicResult<()> {
        self.handle
            .stop()
            .map_err(|e| MusicError::Playback(e.to_string()))
    }

    async fn set_volume(&self, volume: f32) -> MusicResult<()> {
        self.handle
            .set_volume(volume)
            .map_err(|e| MusicError::Playback(e.to_string()))
    }

    async fn seek(&self, position: Duration) -> MusicResult<()> {
        // Se intenta igual; si el input no lo permite queda como no soportado
        self.handle
            .seek_async(position)
            .await
            .map(|_| ())
            .map_err(|e| MusicError::UnsupportedOperation(format!("seek: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_not_connected_without_live_driver() {
        let transport = SongbirdTransport::new(Songbird::serenity());
        let guild_id = GuildId::new(1);

        assert!(!transport.is_connected(guild_id));

        // Marcado como conectado pero sin `Call` en songbird
        transport.connected.insert(guild_id);
        assert!(!transport.is_connected(guild_id));

        transport.leave(guild_id).await.unwrap();
        assert!(!transport.connected.contains(&guild_id));
    }

    #[tokio::test]
    async fn test_driver_disconnect_clears_connection() {
        let connected = Arc::new(DashSet::new());
        let guild_id = GuildId::new(1);
        connected.insert(guild_id);

        let notifier = DisconnectNotifier {
            guild_id,
            connected: connected.clone(),
        };
        notifier.act(&EventContext::Track(&[])).await;

        assert!(!connected.contains(&guild_id));
    }
}
