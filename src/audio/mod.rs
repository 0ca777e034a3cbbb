//! # Audio Module
//!
//! Per-guild playback queues.
//!
//! ## Architecture
//!
//! ### [`manager`] - Registry
//! - One queue per guild, created on the first `play` and kept while idle
//! - Upgrades search results and URLs to songs before touching the queue
//!
//! ### [`scheduler`] - Queue task
//! - One tokio task per guild owns the queue state; [`QueueHandle`] sends it messages
//! - Stream URLs are looked up off the task and tagged with a generation
//! - Completion signals and lookups from an older generation are dropped
//!
//! ### [`queue`] - Song sequence
//! - Pending songs, current song and bounded history
//!
//! ### [`session`] - Voice session
//! - `Disconnected -> Connecting -> Connected` against the voice transport
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let manager = MusicManager::new(resolver, transport, PlayerOptions::default());
//! let target = VoiceTarget { guild_id, channel_id };
//!
//! manager.play(target, "https://youtu.be/dQw4w9WgXcQ", Some(text_channel), None, None).await?;
//! manager.pause(guild_id).await?;
//! manager.skip(guild_id).await?;
//! ```

pub mod manager;
pub mod queue;
pub mod scheduler;
pub mod session;
pub mod song;

pub use manager::{Enqueued, MusicManager, PlaySource, SearchOutcome, VoiceTarget};
pub use scheduler::{CompletionSignal, PlaybackState, QueueEvent, QueueHandle, QueueSnapshot};
pub use session::{ConnectionState, VoiceSession};
pub use song::{format_duration, SearchResult, SourceKind, Song};
