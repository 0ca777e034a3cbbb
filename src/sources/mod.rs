pub mod youtube;

use async_trait::async_trait;
use regex::Regex;
use serenity::model::id::UserId;
use std::sync::LazyLock;

use crate::{
    audio::song::{SearchResult, Song},
    error::MusicResult,
};

pub use youtube::YtDlpResolver;

/// URLs con esquema, `www.` o dominio desnudo con ruta (`example.com/x`)
static URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)^((?:https?://|www\d{0,3}[.]|[a-z0-9.\-]+[.][a-z]{2,4}/)(?:[^\s()<>]+|\(([^\s()<>]+|(\([^\s()<>]+\)))*\))+(?:\(([^\s()<>]+|(\([^\s()<>]+\)))*\)|[^\s`!()\[\]{};:'".,<>?«»“”‘’]))"#,
    )
    .expect("URL_REGEX es válida")
});

/// Verifica si la consulta empieza con una URL
pub fn is_url(query: &str) -> bool {
    URL_REGEX.is_match(query.trim())
}

/// Backend de metadata y audio.
///
/// Todas las fallas son [`MusicError::Resolution`](crate::MusicError::Resolution).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Metadata de una URL
    async fn resolve(&self, url: &str, requested_by: Option<UserId>) -> MusicResult<Song>;

    /// Búsqueda por texto, hasta `limit` resultados en el orden del backend
    async fn search(
        &self,
        query: &str,
        limit: usize,
        requested_by: Option<UserId>,
    ) -> MusicResult<Vec<SearchResult>>;

    /// URL de audio reproducible para la canción (se pide al empezar a reproducir)
    async fn stream_url(&self, url: &str) -> MusicResult<String>;
}
