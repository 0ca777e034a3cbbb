use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    audio::scheduler::CompletionSignal,
    error::MusicResult,
    voice::{ActiveStream, JoinOptions, StreamRequest, VoiceTransport},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected { channel_id: ChannelId },
}

/// Ciclo de vida de la conexión de voz de un servidor.
///
/// `Disconnected -> Connecting -> Connected -> Disconnected`, reutilizable.
/// Los fallos de conexión no se reintentan.
pub struct VoiceSession {
    guild_id: GuildId,
    channel_id: ChannelId,
    transport: Arc<dyn VoiceTransport>,
    options: JoinOptions,
    state: ConnectionState,
}

impl VoiceSession {
    pub fn new(
        guild_id: GuildId,
        channel_id: ChannelId,
        transport: Arc<dyn VoiceTransport>,
        options: JoinOptions,
    ) -> Self {
        Self {
            guild_id,
            channel_id,
            transport,
            options,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Canal de voz objetivo
    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Cambia el canal objetivo. Se aplica en el próximo `join`.
    pub fn set_channel(&mut self, channel_id: ChannelId) {
        if self.channel_id != channel_id {
            debug!("🔀 Canal objetivo de {} cambiado a {}", self.guild_id, channel_id);
            self.channel_id = channel_id;
        }
    }

    /// Conecta al canal objetivo. No hace nada si ya está conectado a ese canal.
    pub async fn join(&mut self) -> MusicResult<()> {
        if self.is_connected() && self.state == (ConnectionState::Connected { channel_id: self.channel_id }) {
            return Ok(());
        }

        self.state = ConnectionState::Connecting;
        match self
            .transport
            .join(self.guild_id, self.channel_id, self.options)
            .await
        {
            Ok(()) => {
                self.state = ConnectionState::Connected {
                    channel_id: self.channel_id,
                };
                Ok(())
            }
            Err(e) => {
                warn!("❌ No se pudo conectar al canal de voz en {}: {}", self.guild_id, e);
                self.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Desconecta aunque haya algo sonando. Idempotente.
    pub async fn leave(&mut self) -> MusicResult<()> {
        let was_connected = self.state != ConnectionState::Disconnected;
        self.state = ConnectionState::Disconnected;

        if was_connected || self.transport.is_connected(self.guild_id) {
            self.transport.leave(self.guild_id).await?;
            info!("👋 Sesión de voz cerrada en {}", self.guild_id);
        }

        Ok(())
    }

    /// Conectado según el estado propio y el transporte
    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnectionState::Connected { .. }) && self.transport.is_connected(self.guild_id)
    }

    pub async fn play(
        &self,
        request: StreamRequest,
        signal: CompletionSignal,
    ) -> MusicResult<Box<dyn ActiveStream>> {
        self.transport.play(self.guild_id, request, signal).await
    }
}
