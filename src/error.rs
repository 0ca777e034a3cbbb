use serenity::model::id::GuildId;
use thiserror::Error;

/// Errores de la cola, la sesión de voz y el resolver
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MusicError {
    /// yt-dlp falló o devolvió metadata inválida
    #[error("No se pudo resolver la fuente de audio: {0}")]
    Resolution(String),

    /// Falló la conexión al canal de voz (timeout, permisos, gateway)
    #[error("No se pudo conectar al canal de voz: {0}")]
    VoiceConnect(String),

    #[error("Operación no soportada: {0}")]
    UnsupportedOperation(String),

    /// No hay cola registrada para el servidor
    #[error("No hay cola registrada para el servidor {0}")]
    NotFound(GuildId),

    #[error("No hay nada reproduciéndose")]
    NothingPlaying,

    #[error("La posición {index} está fuera de rango (la cola tiene {len} canciones)")]
    OutOfRange { index: usize, len: usize },

    #[error("El volumen debe estar entre 0.0 y {max}, recibido: {value}")]
    InvalidVolume { value: f32, max: f32 },

    /// El transporte no pudo iniciar o controlar el stream
    #[error("Error de reproducción: {0}")]
    Playback(String),

    #[error("La cola del servidor {0} ya no está activa")]
    QueueClosed(GuildId),
}

/// Tipo Result para operaciones de música
pub type MusicResult<T> = Result<T, MusicError>;
