use std::{collections::VecDeque, time::Duration};
use tracing::{debug, info};

use crate::{
    audio::song::Song,
    error::{MusicError, MusicResult},
};

/// Secuencia de canciones de un servidor: pendientes, actual e historial.
///
/// No conoce la voz ni los streams; el scheduler decide cuándo avanzar.
/// Una canción pasa de pendiente a actual y de actual a historial, nunca al revés,
/// salvo con [`SongQueue::insert`] en una posición o [`SongQueue::move_song`].
#[derive(Debug, Clone)]
pub struct SongQueue {
    pending: VecDeque<Song>,
    now_playing: Option<Song>,
    history: Vec<Song>,
    retain_history: bool,
    max_history: usize,
}

impl SongQueue {
    pub fn new(retain_history: bool, max_history: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            now_playing: None,
            history: Vec::new(),
            retain_history,
            max_history,
        }
    }

    /// Inserta antes de `position` (al final si es `None`). Posiciones mayores al largo
    /// se ajustan al final. Devuelve el índice final.
    pub fn insert(&mut self, song: Song, position: Option<usize>) -> usize {
        let index = position
            .map(|p| p.min(self.pending.len()))
            .unwrap_or(self.pending.len());

        info!("➕ Agregado a la cola en posición {}: {}", index, song.title());
        self.pending.insert(index, song);
        index
    }

    /// Retira la canción actual al historial y toma la siguiente (FIFO)
    pub fn advance(&mut self) -> Option<&Song> {
        self.retire_current();

        self.now_playing = self.pending.pop_front();
        match &self.now_playing {
            Some(song) => info!("➡️ Siguiente en cola: {}", song.title()),
            None => info!("📭 Cola vacía, no hay siguiente canción"),
        }
        self.now_playing.as_ref()
    }

    /// Retira la actual y las pendientes `[0, index)` al historial y toma `pending[index]`
    pub fn jump(&mut self, index: usize) -> MusicResult<&Song> {
        if index >= self.pending.len() {
            return Err(MusicError::OutOfRange {
                index,
                len: self.pending.len(),
            });
        }

        self.retire_current();
        let skipped: Vec<Song> = self.pending.drain(..index).collect();
        for song in skipped {
            self.add_to_history(song);
        }

        self.now_playing = self.pending.pop_front();
        debug!("⏭️ Salto a la posición {}", index);
        self.now_playing.as_ref().ok_or(MusicError::OutOfRange { index, len: 0 })
    }

    /// Retira la canción actual al historial
    pub fn retire_current(&mut self) -> Option<Song> {
        let current = self.now_playing.take()?;
        self.add_to_history(current.clone());
        Some(current)
    }

    /// Descarta la canción actual sin pasar por el historial
    pub fn discard_current(&mut self) -> Option<Song> {
        self.now_playing.take()
    }

    /// Devuelve la canción actual al frente de las pendientes
    pub fn requeue_current(&mut self) {
        if let Some(current) = self.now_playing.take() {
            self.pending.push_front(current);
        }
    }

    /// Limpia las pendientes
    pub fn clear_pending(&mut self) {
        self.pending.clear();
        info!("🗑️ Cola limpiada");
    }

    /// Elimina una canción pendiente
    pub fn remove(&mut self, index: usize) -> MusicResult<Song> {
        let len = self.pending.len();
        let song = self
            .pending
            .remove(index)
            .ok_or(MusicError::OutOfRange { index, len })?;

        debug!("❌ Canción eliminada en posición {}", index);
        Ok(song)
    }

    /// Mueve una canción pendiente a una nueva posición
    pub fn move_song(&mut self, from: usize, to: usize) -> MusicResult<()> {
        let len = self.pending.len();
        if from >= len {
            return Err(MusicError::OutOfRange { index: from, len });
        }
        if to >= len {
            return Err(MusicError::OutOfRange { index: to, len });
        }

        if from != to {
            if let Some(song) = self.pending.remove(from) {
                self.pending.insert(to, song);
                debug!("📍 Canción movida de posición {} a {}", from, to);
            }
        }

        Ok(())
    }

    pub fn now_playing(&self) -> Option<&Song> {
        self.now_playing.as_ref()
    }

    pub fn pending(&self) -> Vec<Song> {
        self.pending.iter().cloned().collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn history(&self) -> &[Song] {
        &self.history
    }

    /// Duración de las pendientes más la actual (las de duración desconocida no suman)
    pub fn total_duration(&self) -> Duration {
        let queue_duration: Duration = self.pending.iter().filter_map(Song::duration).sum();

        let current_duration = self
            .now_playing
            .as_ref()
            .and_then(Song::duration)
            .unwrap_or_default();

        queue_duration + current_duration
    }

    // Funciones privadas

    fn add_to_history(&mut self, song: Song) {
        if !self.retain_history || self.max_history == 0 {
            return;
        }

        self.history.push(song);

        // Mantener solo los últimos N
        if self.history.len() > self.max_history {
            self.history.remove(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn song(id: &str) -> Song {
        Song::new(id, format!("Song {}", id), format!("https://example.com/{}", id))
    }

    fn ids(songs: &[Song]) -> Vec<&str> {
        songs.iter().map(Song::id).collect()
    }

    #[test]
    fn test_insert_defaults_to_fifo() {
        let mut queue = SongQueue::new(true, 50);
        queue.insert(song("a"), None);
        queue.insert(song("b"), None);
        queue.insert(song("c"), None);

        assert_eq!(queue.advance().map(Song::id), Some("a"));
        assert_eq!(queue.advance().map(Song::id), Some("b"));
        assert_eq!(queue.advance().map(Song::id), Some("c"));
        assert_eq!(queue.advance(), None);
        assert_eq!(ids(queue.history()), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_insert_clamps_position() {
        let mut queue = SongQueue::new(true, 50);
        queue.insert(song("a"), None);
        assert_eq!(queue.insert(song("b"), Some(0)), 0);
        assert_eq!(queue.insert(song("c"), Some(99)), 2);

        assert_eq!(ids(&queue.pending()), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_jump_retires_skipped_songs() {
        let mut queue = SongQueue::new(true, 50);
        for id in ["a", "b", "c", "d"] {
            queue.insert(song(id), None);
        }
        queue.advance();

        assert_eq!(queue.jump(2).map(Song::id), Ok("d"));
        assert_eq!(ids(queue.history()), vec!["a", "b", "c"]);
        assert!(queue.pending().is_empty());
    }

    #[test]
    fn test_jump_out_of_range_keeps_state() {
        let mut queue = SongQueue::new(true, 50);
        queue.insert(song("a"), None);
        queue.advance();

        assert_eq!(
            queue.jump(0).map(Song::id),
            Err(MusicError::OutOfRange { index: 0, len: 0 })
        );
        assert_eq!(queue.now_playing().map(Song::id), Some("a"));
        assert!(queue.history().is_empty());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut queue = SongQueue::new(true, 2);
        for id in ["a", "b", "c"] {
            queue.insert(song(id), None);
        }
        queue.advance();
        queue.advance();
        queue.advance();
        queue.advance();

        assert_eq!(ids(queue.history()), vec!["b", "c"]);
    }

    #[test]
    fn test_history_disabled() {
        let mut queue = SongQueue::new(false, 50);
        queue.insert(song("a"), None);
        queue.advance();
        queue.advance();

        assert!(queue.history().is_empty());
    }

    #[test]
    fn test_discard_and_requeue() {
        let mut queue = SongQueue::new(true, 50);
        queue.insert(song("a"), None);
        queue.insert(song("b"), None);

        queue.advance();
        queue.requeue_current();
        assert_eq!(ids(&queue.pending()), vec!["a", "b"]);

        queue.advance();
        assert_eq!(queue.discard_current().map(|s| s.id().to_string()), Some("a".to_string()));
        assert!(queue.history().is_empty());
    }

    #[test]
    fn test_remove_and_move() {
        let mut queue = SongQueue::new(true, 50);
        for id in ["a", "b", "c"] {
            queue.insert(song(id), None);
        }

        queue.move_song(2, 0).unwrap();
        assert_eq!(ids(&queue.pending()), vec!["c", "a", "b"]);

        let removed = queue.remove(1).unwrap();
        assert_eq!(removed.id(), "a");
        assert_eq!(
            queue.remove(5).map(|s| s.id().to_string()),
            Err(MusicError::OutOfRange { index: 5, len: 2 })
        );
        assert!(queue.move_song(0, 2).is_err());
    }

    #[test]
    fn test_total_duration_skips_unknown() {
        let mut queue = SongQueue::new(true, 50);
        queue.insert(song("a").with_duration(Duration::from_secs(60)), None);
        queue.insert(song("b"), None);
        queue.insert(song("c").with_duration(Duration::from_secs(30)), None);
        queue.advance();

        assert_eq!(queue.total_duration(), Duration::from_secs(90));
    }
}
