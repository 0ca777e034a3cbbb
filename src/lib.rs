//! # discmusic
//!
//! Colas de música por servidor para bots de voz de Discord.
//!
//! Un [`MusicManager`](audio::MusicManager) asigna a cada servidor una tarea de cola que es
//! dueña de las canciones pendientes, la canción actual y el historial, y controla una única
//! conexión de voz a través del transporte de [`voice`]. La metadata y las URLs de stream
//! vienen de un [`Resolver`](sources::Resolver) (`yt-dlp` en producción).
//!
//! - [`audio`]: canciones, máquina de estados de la cola, sesión de voz, manager
//! - [`sources`]: detección de URLs y backend de resolución
//! - [`voice`]: trait de transporte e implementación con songbird
//! - [`bot`]: comandos con prefijo para serenity
//! - [`config`]: configuración desde el entorno

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod sources;
pub mod voice;

pub use error::{MusicError, MusicResult};
