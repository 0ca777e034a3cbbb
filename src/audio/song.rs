use serde::{Deserialize, Serialize};
use serenity::model::id::UserId;
use std::time::Duration;

/// Origen de una canción según el extractor de yt-dlp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    YouTube,
    /// Cualquier otro sitio soportado por yt-dlp, o una URL directa
    Direct,
}

impl SourceKind {
    /// Clasifica el `extractor_key` que reporta yt-dlp
    pub fn from_extractor(key: &str) -> Self {
        if key.to_ascii_lowercase().starts_with("youtube") {
            Self::YouTube
        } else {
            Self::Direct
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::YouTube => "YouTube",
            Self::Direct => "Directo",
        }
    }
}

/// Canción resuelta, lista para encolar.
///
/// Es una foto inmutable de la metadata: se construye con [`Song::new`] y los `with_*`,
/// y después solo se lee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    id: String,
    title: String,
    source: SourceKind,
    uploader: Option<String>,
    url: String,
    duration: Option<Duration>,
    duration_text: String,
    is_live: bool,
    views: Option<u64>,
    age_limit: u32,
    likes: Option<u64>,
    thumbnail: Option<String>,
    requested_by: Option<UserId>,
}

impl Song {
    pub fn new(id: impl Into<String>, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            source: SourceKind::Direct,
            uploader: None,
            url: url.into(),
            duration: None,
            duration_text: String::new(),
            is_live: false,
            views: None,
            age_limit: 0,
            likes: None,
            thumbnail: None,
            requested_by: None,
        }
    }

    // Getters
    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn source(&self) -> SourceKind {
        self.source
    }
    pub fn uploader(&self) -> Option<&str> {
        self.uploader.as_deref()
    }
    pub fn url(&self) -> &str {
        &self.url
    }
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
    /// Duración en texto (`m:ss` o `h:mm:ss`), vacío si se desconoce
    pub fn duration_text(&self) -> &str {
        &self.duration_text
    }
    pub fn is_live(&self) -> bool {
        self.is_live
    }
    pub fn views(&self) -> Option<u64> {
        self.views
    }
    pub fn age_limit(&self) -> u32 {
        self.age_limit
    }
    pub fn likes(&self) -> Option<u64> {
        self.likes
    }
    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail.as_deref()
    }
    pub fn requested_by(&self) -> Option<UserId> {
        self.requested_by
    }

    // Builders
    pub fn with_source(mut self, source: SourceKind) -> Self {
        self.source = source;
        self
    }

    pub fn with_uploader(mut self, uploader: impl Into<String>) -> Self {
        self.uploader = Some(uploader.into());
        self
    }

    /// También fija el texto de duración
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self.duration_text = format_duration(duration);
        self
    }

    /// Sobrescribe el texto calculado por [`Song::with_duration`]
    pub fn with_duration_text(mut self, text: impl Into<String>) -> Self {
        self.duration_text = text.into();
        self
    }

    pub fn with_live(mut self, is_live: bool) -> Self {
        self.is_live = is_live;
        self
    }

    pub fn with_views(mut self, views: u64) -> Self {
        self.views = Some(views);
        self
    }

    pub fn with_age_limit(mut self, age_limit: u32) -> Self {
        self.age_limit = age_limit;
        self
    }

    pub fn with_likes(mut self, likes: u64) -> Self {
        self.likes = Some(likes);
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    pub fn with_requested_by(mut self, user_id: UserId) -> Self {
        self.requested_by = Some(user_id);
        self
    }
}

/// Resultado de búsqueda por texto. Se convierte en [`Song`] resolviendo su URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub url: String,
    pub thumbnail: Option<String>,
    pub title: String,
    pub duration: Option<String>,
    /// Ej: "1,234,567 views"
    pub views: Option<String>,
    pub channel_name: Option<String>,
    pub requested_by: Option<UserId>,
}

/// Formatea una duración como `m:ss` o `h:mm:ss`
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
