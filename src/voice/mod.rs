pub mod driver;

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::time::Duration;

use crate::{
    audio::scheduler::CompletionSignal,
    error::{MusicError, MusicResult},
};

pub use driver::SongbirdTransport;

/// Flags de la conexión de voz
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinOptions {
    pub self_deaf: bool,
    pub self_mute: bool,
}

/// Lo que necesita el transporte para iniciar un stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    /// URL de audio obtenida del resolver
    pub locator: String,
    pub before_options: String,
    pub options: String,
    pub volume: f32,
}

/// Servicio de conexión de voz.
///
/// Una conexión por servidor. La implementación de producción es [`SongbirdTransport`].
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId, options: JoinOptions) -> MusicResult<()>;

    /// Desconecta. No falla si no había conexión.
    async fn leave(&self, guild_id: GuildId) -> MusicResult<()>;

    fn is_connected(&self, guild_id: GuildId) -> bool;

    /// Inicia un stream en la conexión del servidor. `signal` se dispara una sola vez
    /// cuando el stream termina o falla.
    async fn play(
        &self,
        guild_id: GuildId,
        request: StreamRequest,
        signal: CompletionSignal,
    ) -> MusicResult<Box<dyn ActiveStream>>;
}

/// Control de un stream en curso
#[async_trait]
pub trait ActiveStream: Send + Sync {
    async fn pause(&self) -> MusicResult<()>;

    async fn resume(&self) -> MusicResult<()>;

    /// Detiene el stream. Su señal puede llegar igual y queda obsoleta.
    async fn stop(&self) -> MusicResult<()>;

    async fn set_volume(&self, _volume: f32) -> MusicResult<()> {
        Err(MusicError::UnsupportedOperation("cambio de volumen en vivo".to_string()))
    }

    async fn seek(&self, _position: Duration) -> MusicResult<()> {
        Err(MusicError::UnsupportedOperation("seek".to_string()))
    }
}
