use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{str::FromStr, time::Duration};

/// Selector de formato para yt-dlp al extraer la URL de stream
pub const YTDL_FORMAT_DEFAULT: &str = "bestaudio/best";
/// Argumentos de ffmpeg después de `-i`
pub const FFMPEG_OPTIONS_DEFAULT: &str = "-vn";
/// Argumentos de ffmpeg antes de `-i` (reconexión para streams largos)
pub const FFMPEG_BEFORE_OPTIONS_DEFAULT: &str =
    "-reconnect 1 -reconnect_streamed 1 -reconnect_delay_max 5";

/// Tiempo máximo de una invocación de yt-dlp
pub const LOOKUP_TIMEOUT_DEFAULT: Duration = Duration::from_secs(25);

/// Volumen máximo aceptado
pub const MAX_VOLUME: f32 = 2.0;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,

    // Reproducción
    pub player: PlayerOptions,
}

/// Políticas de reproducción y opciones del backend.
///
/// Se entregan una vez a [`MusicManager::new`](crate::audio::MusicManager::new) y luego
/// se comparten, sin cambios, con todas las colas.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PlayerOptions {
    /// Selector `-f` de yt-dlp
    pub ytdl_format: String,
    /// Argumentos extra para cada invocación de yt-dlp
    pub ytdl_args: Vec<String>,
    pub ffmpeg_options: String,
    pub ffmpeg_before_options: String,
    /// Salir del canal de voz cuando la cola se vacía sola
    pub leave_on_finish: bool,
    /// Salir del canal de voz al detener manualmente
    pub leave_on_stop: bool,
    /// Guardar las canciones reproducidas en el historial
    pub retain_history: bool,
    pub max_history: usize,
    pub default_volume: f32,
    pub self_deaf: bool,
    pub self_mute: bool,
    pub search_limit: usize,
    /// Procesos yt-dlp concurrentes entre todos los servidores
    pub max_concurrent_lookups: usize,
    /// Tiempo máximo de cada búsqueda; al vencer la canción se da por fallida
    pub lookup_timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            discord_token: std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN no está configurado")?,
            command_prefix: env_or("COMMAND_PREFIX", "!".to_string())?,
            player: PlayerOptions::from_env()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Valida que los valores de configuración sean correctos
    pub fn validate(&self) -> Result<()> {
        if self.command_prefix.trim().is_empty() {
            anyhow::bail!("El prefijo de comandos no puede estar vacío");
        }

        self.player.validate()
    }

    /// Obtiene un resumen de la configuración para logging.
    ///
    /// Nunca incluye el token de Discord.
    pub fn summary(&self) -> String {
        let player = &self.player;
        format!(
            "Config Summary:\n  \
            Prefix: {}\n  \
            Audio: {}% vol, format '{}'\n  \
            Voice: deaf={}, mute={}\n  \
            Policies: leave_on_finish={}, leave_on_stop={}, history={} (max {})\n  \
            Lookups: {} concurrent, {}s timeout, {} search results",
            self.command_prefix,
            (player.default_volume * 100.0) as u32,
            player.ytdl_format,
            player.self_deaf,
            player.self_mute,
            player.leave_on_finish,
            player.leave_on_stop,
            player.retain_history,
            player.max_history,
            player.max_concurrent_lookups,
            player.lookup_timeout.as_secs(),
            player.search_limit,
        )
    }
}

impl PlayerOptions {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let options = Self {
            ytdl_format: env_or("YTDL_FORMAT", defaults.ytdl_format)?,
            ytdl_args: std::env::var("YTDL_ARGS")
                .map(|args| args.split_whitespace().map(str::to_string).collect())
                .unwrap_or(defaults.ytdl_args),
            ffmpeg_options: env_or("FFMPEG_OPTIONS", defaults.ffmpeg_options)?,
            ffmpeg_before_options: env_or("FFMPEG_BEFORE_OPTIONS", defaults.ffmpeg_before_options)?,
            leave_on_finish: env_or("LEAVE_ON_FINISH", defaults.leave_on_finish)?,
            leave_on_stop: env_or("LEAVE_ON_STOP", defaults.leave_on_stop)?,
            retain_history: env_or("RETAIN_HISTORY", defaults.retain_history)?,
            max_history: env_or("MAX_HISTORY", defaults.max_history)?,
            default_volume: env_or("DEFAULT_VOLUME", defaults.default_volume)?,
            self_deaf: env_or("SELF_DEAF", defaults.self_deaf)?,
            self_mute: env_or("SELF_MUTE", defaults.self_mute)?,
            search_limit: env_or("SEARCH_LIMIT", defaults.search_limit)?,
            max_concurrent_lookups: env_or("MAX_CONCURRENT_LOOKUPS", defaults.max_concurrent_lookups)?,
            lookup_timeout: Duration::from_secs(env_or(
                "LOOKUP_TIMEOUT_SECS",
                defaults.lookup_timeout.as_secs(),
            )?),
        };

        options.validate()?;
        Ok(options)
    }

    /// # Reglas de validación
    ///
    /// - El volumen debe estar entre 0.0 y [`MAX_VOLUME`]
    /// - El selector de formato no puede estar vacío
    /// - El límite de búsqueda y la concurrencia deben ser mayores que 0
    /// - El timeout de búsqueda no puede ser cero
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=MAX_VOLUME).contains(&self.default_volume) {
            anyhow::bail!(
                "El volumen por defecto debe estar entre 0.0 y {}, recibido: {}",
                MAX_VOLUME,
                self.default_volume
            );
        }

        if self.ytdl_format.trim().is_empty() {
            anyhow::bail!("El selector de formato de yt-dlp no puede estar vacío");
        }

        if self.search_limit == 0 {
            anyhow::bail!("El límite de búsqueda debe ser mayor que 0");
        }

        if self.max_concurrent_lookups == 0 {
            anyhow::bail!("Las búsquedas concurrentes deben ser mayores que 0");
        }

        if self.lookup_timeout.is_zero() {
            anyhow::bail!("El timeout de búsqueda debe ser mayor que 0");
        }

        Ok(())
    }
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            ytdl_format: YTDL_FORMAT_DEFAULT.to_string(),
            ytdl_args: Vec::new(),
            ffmpeg_options: FFMPEG_OPTIONS_DEFAULT.to_string(),
            ffmpeg_before_options: FFMPEG_BEFORE_OPTIONS_DEFAULT.to_string(),
            leave_on_finish: true,
            leave_on_stop: true,
            retain_history: true,
            max_history: 50,
            default_volume: 0.5,
            self_deaf: false,
            self_mute: false,
            search_limit: 5,
            max_concurrent_lookups: 8,
            lookup_timeout: LOOKUP_TIMEOUT_DEFAULT,
        }
    }
}

/// Lee `key` del entorno, usando `default` si no existe o está vacía
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(val) if !val.trim().is_empty() => val
            .trim()
            .parse()
            .with_context(|| format!("Valor inválido para {}: {}", key, val)),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let options = PlayerOptions::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.default_volume, 0.5);
        assert!(options.leave_on_finish);
        assert!(options.retain_history);
    }

    #[test]
    fn test_rejects_out_of_range_volume() {
        let options = PlayerOptions {
            default_volume: 2.5,
            ..PlayerOptions::default()
        };
        assert!(options.validate().is_err());

        let options = PlayerOptions {
            default_volume: -0.1,
            ..PlayerOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_lookup_timeout() {
        let options = PlayerOptions {
            lookup_timeout: Duration::ZERO,
            ..PlayerOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_summary_hides_token() {
        let config = Config {
            discord_token: "super-secret".to_string(),
            command_prefix: "!".to_string(),
            player: PlayerOptions::default(),
        };
        let summary = config.summary();
        assert!(!summary.contains("super-secret"));
        assert!(summary.contains("50% vol"));
    }

    #[test]
    fn test_env_or_falls_back_for_missing_keys() {
        let value: usize = env_or("DISCMUSIC_TEST_SURELY_UNSET", 7).unwrap();
        assert_eq!(value, 7);
    }
}
