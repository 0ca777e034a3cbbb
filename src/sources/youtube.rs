use async_process::Command;
use async_trait::async_trait;
use num_format::{Locale, ToFormattedString};
use serde::Deserialize;
use serenity::model::id::UserId;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::Url;

use super::Resolver;
use crate::{
    audio::song::{format_duration, SearchResult, SourceKind, Song},
    config::PlayerOptions,
    error::{MusicError, MusicResult},
};

/// Resolver sobre la línea de comandos de yt-dlp
pub struct YtDlpResolver {
    format: String,
    extra_args: Vec<String>,
    // Limitar procesos concurrentes para evitar rate limiting.
    // Las URLs de stream tienen su propio cupo: una reproducción no espera a búsquedas ajenas.
    metadata_limiter: Semaphore,
    stream_limiter: Semaphore,
    timeout: Duration,
}

/// Información extraída de yt-dlp (`--dump-json`)
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: String,
    title: String,
    uploader: Option<String>,
    webpage_url: Option<String>,
    duration: Option<f64>,
    duration_string: Option<String>,
    is_live: Option<bool>,
    view_count: Option<u64>,
    age_limit: Option<u32>,
    like_count: Option<u64>,
    thumbnail: Option<String>,
    extractor_key: Option<String>,
}

/// Entrada de búsqueda (`--flat-playlist --dump-json`)
#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    id: String,
    title: String,
    url: Option<String>,
    duration: Option<f64>,
    view_count: Option<u64>,
    channel: Option<String>,
    uploader: Option<String>,
    #[serde(default)]
    thumbnails: Vec<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

impl YtDlpResolver {
    pub fn new(options: &PlayerOptions) -> Self {
        Self {
            format: options.ytdl_format.clone(),
            extra_args: options.ytdl_args.clone(),
            metadata_limiter: Semaphore::new(options.max_concurrent_lookups),
            stream_limiter: Semaphore::new(options.max_concurrent_lookups),
            timeout: options.lookup_timeout,
        }
    }

    /// Ejecuta yt-dlp y devuelve su stdout.
    ///
    /// La espera por el cupo y el proceso comparten el mismo timeout. Al vencer, o si se
    /// cancela la búsqueda, el proceso muere y el cupo se libera.
    async fn run(&self, limiter: &Semaphore, args: &[&str]) -> MusicResult<String> {
        let invocation = async {
            let _permit = limiter
                .acquire()
                .await
                .map_err(|e| MusicError::Resolution(e.to_string()))?;

            Command::new("yt-dlp")
                .args(args)
                .args(&self.extra_args)
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|e| MusicError::Resolution(format!("Error al ejecutar yt-dlp: {}", e)))
        };

        let output = match timeout(self.timeout, invocation).await {
            Ok(output) => output?,
            Err(_) => {
                warn!("⏰ Timeout de yt-dlp tras {}s", self.timeout.as_secs());
                return Err(MusicError::Resolution(format!(
                    "yt-dlp no respondió en {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(MusicError::Resolution(format!("yt-dlp error: {}", error.trim())));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl Resolver for YtDlpResolver {
    async fn resolve(&self, url: &str, requested_by: Option<UserId>) -> MusicResult<Song> {
        debug!("📊 Obteniendo info de: {}", url);

        let stdout = self
            .run(&self.metadata_limiter, &["--no-playlist", "--dump-json", "--no-warnings", url])
            .await?;

        let song = parse_song(&stdout, url, requested_by)?;
        info!("✅ Resuelto: {}", song.title());
        Ok(song)
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
        requested_by: Option<UserId>,
    ) -> MusicResult<Vec<SearchResult>> {
        info!("🔍 Buscando en YouTube: {}", query);

        let search_query = format!("ytsearch{}:{}", limit, query);
        let stdout = self
            .run(
                &self.metadata_limiter,
                &[
                    "--flat-playlist",
                    "--dump-json",
                    "--skip-download",
                    "--no-warnings",
                    &search_query,
                ],
            )
            .await?;

        parse_search(&stdout, limit, requested_by)
    }

    async fn stream_url(&self, url: &str) -> MusicResult<String> {
        debug!("🎵 Obteniendo URL de stream para: {}", url);

        let stdout = self
            .run(
                &self.stream_limiter,
                &["--no-playlist", "-f", &self.format, "--get-url", "--no-warnings", url],
            )
            .await?;

        // Con formatos combinados yt-dlp imprime una URL por pista; la primera es el audio
        stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| MusicError::Resolution("No se pudo obtener URL de stream".to_string()))
    }
}

/// Convierte la salida de `--dump-json` en una [`Song`]
fn parse_song(stdout: &str, requested_url: &str, requested_by: Option<UserId>) -> MusicResult<Song> {
    let info: YtDlpInfo = serde_json::from_str(stdout.trim())
        .map_err(|e| MusicError::Resolution(format!("Error al parsear respuesta de yt-dlp: {}", e)))?;

    let url = info.webpage_url.unwrap_or_else(|| requested_url.to_string());
    let source = info
        .extractor_key
        .as_deref()
        .map(SourceKind::from_extractor)
        .unwrap_or(SourceKind::Direct);

    let mut song = Song::new(info.id, info.title, url)
        .with_source(source)
        .with_live(info.is_live.unwrap_or(false))
        .with_age_limit(info.age_limit.unwrap_or(0));

    if let Some(uploader) = info.uploader {
        song = song.with_uploader(uploader);
    }

    if let Some(duration) = info.duration.filter(|d| d.is_finite() && *d >= 0.0) {
        song = song.with_duration(Duration::from_secs_f64(duration));
    }

    if let Some(text) = info.duration_string {
        song = song.with_duration_text(text);
    }

    if let Some(views) = info.view_count {
        song = song.with_views(views);
    }

    if let Some(likes) = info.like_count {
        song = song.with_likes(likes);
    }

    if let Some(thumbnail) = info.thumbnail {
        song = song.with_thumbnail(thumbnail);
    }

    if let Some(user_id) = requested_by {
        song = song.with_requested_by(user_id);
    }

    Ok(song)
}

/// Convierte la salida de una búsqueda (un JSON por línea) en resultados
fn parse_search(stdout: &str, limit: usize, requested_by: Option<UserId>) -> MusicResult<Vec<SearchResult>> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(limit)
        .map(|line| {
            let entry: YtDlpEntry = serde_json::from_str(line).map_err(|e| {
                MusicError::Resolution(format!("Error al parsear resultado de búsqueda: {}", e))
            })?;
            Ok(entry_to_result(entry, requested_by))
        })
        .collect()
}

fn entry_to_result(entry: YtDlpEntry, requested_by: Option<UserId>) -> SearchResult {
    let url = entry
        .url
        .filter(|url| url.starts_with("http"))
        .unwrap_or_else(|| watch_url(&entry.id));

    SearchResult {
        url,
        thumbnail: entry.thumbnails.into_iter().next().map(|t| t.url),
        duration: entry
            .duration
            .filter(|d| d.is_finite() && *d >= 0.0)
            .map(|d| format_duration(Duration::from_secs_f64(d))),
        views: entry
            .view_count
            .map(|count| format!("{} views", count.to_formatted_string(&Locale::en))),
        channel_name: entry.channel.or(entry.uploader),
        title: entry.title,
        id: entry.id,
        requested_by,
    }
}

fn watch_url(id: &str) -> String {
    Url::parse_with_params("https://www.youtube.com/watch", &[("v", id)])
        .map(String::from)
        .unwrap_or_else(|_| format!("https://www.youtube.com/watch?v={}", id))
}
