use serde::Serialize;
use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    audio::{queue::SongQueue, session::VoiceSession, song::Song},
    config::{PlayerOptions, MAX_VOLUME},
    error::{MusicError, MusicResult},
    sources::Resolver,
    voice::{ActiveStream, StreamRequest},
};

const EVENT_CAPACITY: usize = 32;

/// Aviso de fin de stream que el transporte devuelve a la cola.
///
/// Lleva la generación para la que se creó; si la cola ya avanzó, se descarta.
#[derive(Debug)]
pub struct CompletionSignal {
    generation: u64,
    signals: mpsc::UnboundedSender<Signal>,
}

impl CompletionSignal {
    /// Avisa que el stream terminó (normalmente o por error)
    pub fn finish(self) {
        // Si la cola ya no existe no hay nadie a quien avisar
        let _ = self.signals.send(Signal::StreamEnded {
            generation: self.generation,
        });
    }
}

#[derive(Debug)]
enum Signal {
    StreamReady {
        generation: u64,
        result: MusicResult<String>,
    },
    StreamEnded {
        generation: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
    Stopped,
}

/// Eventos de la cola, para anunciarlos en el canal de texto
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    TrackStarted { guild_id: GuildId, song: Song },
    TrackFailed { guild_id: GuildId, song: Option<Song>, error: MusicError },
    /// Se perdió la voz al pasar a la siguiente; la canción volvió al frente
    VoiceLost { guild_id: GuildId, error: MusicError },
    Finished { guild_id: GuildId },
    Stopped { guild_id: GuildId },
}

/// Foto del estado de una cola
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueSnapshot {
    pub guild_id: GuildId,
    pub now_playing: Option<Song>,
    pub pending: Vec<Song>,
    pub history: Vec<Song>,
    pub paused: bool,
    pub stopped: bool,
    pub volume: f32,
    pub voice_channel: ChannelId,
    pub text_channel: Option<ChannelId>,
    pub connected: bool,
    pub total_duration: Duration,
}

impl QueueSnapshot {
    pub fn is_playing(&self) -> bool {
        self.now_playing.is_some()
    }

    pub fn state(&self) -> PlaybackState {
        match (&self.now_playing, self.paused, self.stopped) {
            (Some(_), true, _) => PlaybackState::Paused,
            (Some(_), false, _) => PlaybackState::Playing,
            (None, _, true) => PlaybackState::Stopped,
            (None, _, false) => PlaybackState::Idle,
        }
    }
}

type Reply<T> = oneshot::Sender<MusicResult<T>>;

enum Command {
    Enqueue {
        song: Song,
        position: Option<usize>,
        voice_channel: Option<ChannelId>,
        text_channel: Option<ChannelId>,
        reply: Reply<Vec<Song>>,
    },
    Pause(Reply<()>),
    Resume(Reply<()>),
    Skip(Reply<Song>),
    Stop(Reply<()>),
    Jump(usize, Reply<Song>),
    Seek(Duration, Reply<()>),
    SetVolume(f32, Reply<()>),
    Remove(usize, Reply<Song>),
    Move(usize, usize, Reply<()>),
    Snapshot(Reply<QueueSnapshot>),
}

impl Command {
    fn label(&self) -> &'static str {
        match self {
            Self::Enqueue { .. } => "enqueue",
            Self::Pause(_) => "pause",
            Self::Resume(_) => "resume",
            Self::Skip(_) => "skip",
            Self::Stop(_) => "stop",
            Self::Jump(..) => "jump",
            Self::Seek(..) => "seek",
            Self::SetVolume(..) => "set_volume",
            Self::Remove(..) => "remove",
            Self::Move(..) => "move",
            Self::Snapshot(_) => "snapshot",
        }
    }
}

/// Acceso a la cola de un servidor.
///
/// Cada operación es un mensaje a la tarea de la cola, que procesa uno a la vez.
/// Cuando se sueltan todos los handles la tarea detiene el stream y sale del canal de voz.
#[derive(Clone)]
pub struct QueueHandle {
    guild_id: GuildId,
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<QueueEvent>,
}

impl std::fmt::Debug for QueueHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueHandle")
            .field("guild_id", &self.guild_id)
            .finish()
    }
}

impl QueueHandle {
    /// Lanza la tarea de la cola y devuelve su handle
    pub fn spawn(session: VoiceSession, resolver: Arc<dyn Resolver>, options: Arc<PlayerOptions>) -> Self {
        let guild_id = session.guild_id();
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (signals, signals_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let actor = QueueActor {
            guild_id,
            songs: SongQueue::new(options.retain_history, options.max_history),
            session,
            resolver,
            volume: options.default_volume,
            options,
            paused: false,
            stopped: false,
            text_channel: None,
            generation: 0,
            loading: None,
            stream: None,
            signals,
            events: events.clone(),
        };

        tokio::spawn(actor.run(commands_rx, signals_rx));
        info!("🎶 Cola creada para {}", guild_id);

        Self {
            guild_id,
            commands,
            events,
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Misma cola (no solo mismo servidor)
    pub fn same_queue(&self, other: &QueueHandle) -> bool {
        self.commands.same_channel(&other.commands)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// Agrega una canción (al final si `position` es `None`). Si la cola estaba inactiva
    /// conecta a `voice_channel` y empieza a reproducir. Devuelve las pendientes.
    pub async fn enqueue(
        &self,
        song: Song,
        position: Option<usize>,
        voice_channel: Option<ChannelId>,
        text_channel: Option<ChannelId>,
    ) -> MusicResult<Vec<Song>> {
        self.request(|reply| Command::Enqueue {
            song,
            position,
            voice_channel,
            text_channel,
            reply,
        })
        .await
    }

    pub async fn pause(&self) -> MusicResult<()> {
        self.request(Command::Pause).await
    }

    pub async fn resume(&self) -> MusicResult<()> {
        self.request(Command::Resume).await
    }

    /// Termina la canción actual y devuelve la que se saltó
    pub async fn skip(&self) -> MusicResult<Song> {
        self.request(Command::Skip).await
    }

    pub async fn stop(&self) -> MusicResult<()> {
        self.request(Command::Stop).await
    }

    /// Salta a la pendiente `index`; las anteriores pasan al historial
    pub async fn jump(&self, index: usize) -> MusicResult<Song> {
        self.request(|reply| Command::Jump(index, reply)).await
    }

    pub async fn seek(&self, position: Duration) -> MusicResult<()> {
        self.request(|reply| Command::Seek(position, reply)).await
    }

    /// Volumen entre 0.0 y 2.0. Se aplica al stream actual si el transporte lo permite,
    /// y siempre al siguiente.
    pub async fn set_volume(&self, volume: f32) -> MusicResult<()> {
        self.request(|reply| Command::SetVolume(volume, reply)).await
    }

    pub async fn remove(&self, index: usize) -> MusicResult<Song> {
        self.request(|reply| Command::Remove(index, reply)).await
    }

    pub async fn move_song(&self, from: usize, to: usize) -> MusicResult<()> {
        self.request(|reply| Command::Move(from, to, reply)).await
    }

    pub async fn snapshot(&self) -> MusicResult<QueueSnapshot> {
        self.request(Command::Snapshot).await
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> MusicResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| MusicError::QueueClosed(self.guild_id))?;

        response
            .await
            .map_err(|_| MusicError::QueueClosed(self.guild_id))?
    }
}

/// Estado de la cola, propiedad exclusiva de su tarea
struct QueueActor {
    guild_id: GuildId,
    songs: SongQueue,
    session: VoiceSession,
    resolver: Arc<dyn Resolver>,
    options: Arc<PlayerOptions>,
    volume: f32,
    paused: bool,
    stopped: bool,
    text_channel: Option<ChannelId>,
    /// Se incrementa cada vez que se abandona el stream actual
    generation: u64,
    /// Búsqueda de la URL de stream en curso
    loading: Option<JoinHandle<()>>,
    stream: Option<Box<dyn ActiveStream>>,
    signals: mpsc::UnboundedSender<Signal>,
    events: broadcast::Sender<QueueEvent>,
}

impl QueueActor {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut signals: mpsc::UnboundedReceiver<Signal>,
    ) {
        loop {
            tokio::select! {
                // Señales primero: un fin de stream ya enviado se procesa antes que el siguiente comando
                biased;
                Some(signal) = signals.recv() => self.handle_signal(signal).await,
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
            }
        }

        debug!("🔚 Todos los handles de {} fueron liberados", self.guild_id);
        self.shutdown().await;
    }

    async fn handle_command(&mut self, command: Command) {
        debug!("📨 Comando {} en {}", command.label(), self.guild_id);

        // El que pidió puede haberse ido; la respuesta se descarta
        match command {
            Command::Enqueue {
                song,
                position,
                voice_channel,
                text_channel,
                reply,
            } => {
                let result = self.enqueue(song, position, voice_channel, text_channel).await;
                let _ = reply.send(result);
            }
            Command::Pause(reply) => {
                let _ = reply.send(self.pause().await);
            }
            Command::Resume(reply) => {
                let _ = reply.send(self.resume().await);
            }
            Command::Skip(reply) => {
                let _ = reply.send(self.skip().await);
            }
            Command::Stop(reply) => {
                self.stop().await;
                let _ = reply.send(Ok(()));
            }
            Command::Jump(index, reply) => {
                let _ = reply.send(self.jump(index).await);
            }
            Command::Seek(position, reply) => {
                let _ = reply.send(self.seek(position).await);
            }
            Command::SetVolume(volume, reply) => {
                let _ = reply.send(self.set_volume(volume).await);
            }
            Command::Remove(index, reply) => {
                let _ = reply.send(self.songs.remove(index));
            }
            Command::Move(from, to, reply) => {
                let _ = reply.send(self.songs.move_song(from, to));
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(Ok(self.snapshot()));
            }
        }
    }

    async fn handle_signal(&mut self, signal: Signal) {
        match signal {
            Signal::StreamReady { generation, result } => {
                if generation != self.generation {
                    debug!("🗑️ URL de stream obsoleta descartada (gen {} != {})", generation, self.generation);
                    return;
                }

                self.loading = None;
                match result {
                    Ok(locator) => self.start_stream(locator).await,
                    Err(e) => self.skip_failed(e).await,
                }
            }
            Signal::StreamEnded { generation } => {
                if generation != self.generation {
                    debug!("🗑️ Fin de stream obsoleto descartado (gen {} != {})", generation, self.generation);
                    return;
                }

                debug!("Stream terminado en {}, reproduciendo siguiente...", self.guild_id);
                self.advance().await;
            }
        }
    }

    async fn enqueue(
        &mut self,
        song: Song,
        position: Option<usize>,
        voice_channel: Option<ChannelId>,
        text_channel: Option<ChannelId>,
    ) -> MusicResult<Vec<Song>> {
        if self.songs.now_playing().is_some() {
            self.songs.insert(song, position);
        } else {
            if let Some(channel_id) = voice_channel {
                self.session.set_channel(channel_id);
            }
            self.session.join().await?;

            self.songs.insert(song, position);
            self.stopped = false;
            self.advance().await;
        }

        if text_channel.is_some() {
            self.text_channel = text_channel;
        }

        Ok(self.songs.pending())
    }

    /// Termina la canción actual (si hay) y pasa a la siguiente, o queda inactiva
    async fn advance(&mut self) {
        self.invalidate();
        self.halt().await;
        self.paused = false;

        match self.songs.advance().cloned() {
            Some(next) => self.begin(next).await,
            None => self.finish().await,
        }
    }

    /// Conecta si hace falta y busca la URL de stream fuera de la tarea
    async fn begin(&mut self, song: Song) {
        if let Err(e) = self.session.join().await {
            error!("❌ Se perdió la voz antes de reproducir {}: {}", song.title(), e);
            self.songs.requeue_current();
            self.emit(QueueEvent::VoiceLost {
                guild_id: self.guild_id,
                error: e,
            });
            return;
        }

        info!("🎵 Preparando: {}", song.title());

        let generation = self.generation;
        let resolver = self.resolver.clone();
        let signals = self.signals.clone();
        let url = song.url().to_string();
        let limit = self.options.lookup_timeout;

        // Una búsqueda colgada no puede dejar la canción atascada
        self.loading = Some(tokio::spawn(async move {
            let result = match tokio::time::timeout(limit, resolver.stream_url(&url)).await {
                Ok(result) => result,
                Err(_) => Err(MusicError::Resolution(format!(
                    "la URL de stream no llegó en {}s",
                    limit.as_secs_f32()
                ))),
            };
            let _ = signals.send(Signal::StreamReady { generation, result });
        }));
    }

    async fn start_stream(&mut self, locator: String) {
        let Some(song) = self.songs.now_playing().cloned() else {
            return;
        };

        let request = StreamRequest {
            locator,
            before_options: self.options.ffmpeg_before_options.clone(),
            options: self.options.ffmpeg_options.clone(),
            volume: self.volume,
        };
        let signal = CompletionSignal {
            generation: self.generation,
            signals: self.signals.clone(),
        };

        match self.session.play(request, signal).await {
            Ok(stream) => {
                if self.paused {
                    if let Err(e) = stream.pause().await {
                        warn!("⚠️ No se pudo pausar el stream nuevo: {}", e);
                    }
                }
                self.stream = Some(stream);

                info!("🎵 Reproduciendo: {}", song.title());
                self.emit(QueueEvent::TrackStarted {
                    guild_id: self.guild_id,
                    song,
                });
            }
            Err(e) => self.skip_failed(e).await,
        }
    }

    /// Descarta la canción que no se pudo reproducir y sigue con la próxima
    async fn skip_failed(&mut self, error: MusicError) {
        let song = self.songs.discard_current();
        warn!(
            "❌ No se pudo reproducir {}: {}",
            song.as_ref().map(Song::title).unwrap_or("Unknown"),
            error
        );

        self.emit(QueueEvent::TrackFailed {
            guild_id: self.guild_id,
            song,
            error,
        });
        self.advance().await;
    }

    /// Cola vacía
    async fn finish(&mut self) {
        info!("📭 Cola terminada en {}", self.guild_id);

        if self.options.leave_on_finish {
            if let Err(e) = self.session.leave().await {
                warn!("⚠️ Error al salir del canal de voz: {}", e);
            }
        }

        self.emit(QueueEvent::Finished {
            guild_id: self.guild_id,
        });
    }

    async fn pause(&mut self) -> MusicResult<()> {
        if self.songs.now_playing().is_none() {
            return Err(MusicError::NothingPlaying);
        }

        if let Some(stream) = &self.stream {
            stream.pause().await?;
        }
        self.paused = true;
        info!("⏸️ Reproducción pausada");
        Ok(())
    }

    async fn resume(&mut self) -> MusicResult<()> {
        if self.songs.now_playing().is_none() {
            return Err(MusicError::NothingPlaying);
        }

        if let Some(stream) = &self.stream {
            stream.resume().await?;
        }
        self.paused = false;
        info!("▶️ Reproducción reanudada");
        Ok(())
    }

    async fn skip(&mut self) -> MusicResult<Song> {
        let current = self
            .songs
            .now_playing()
            .cloned()
            .ok_or(MusicError::NothingPlaying)?;

        info!("⏭️ Saltando: {}", current.title());
        self.advance().await;
        Ok(current)
    }

    async fn stop(&mut self) {
        self.invalidate();
        self.halt().await;
        self.songs.clear_pending();
        self.songs.retire_current();
        self.paused = false;
        self.stopped = true;

        if self.options.leave_on_stop {
            if let Err(e) = self.session.leave().await {
                warn!("⚠️ Error al salir del canal de voz: {}", e);
            }
        }

        info!("⏹️ Reproducción detenida en {}", self.guild_id);
        self.emit(QueueEvent::Stopped {
            guild_id: self.guild_id,
        });
    }

    async fn jump(&mut self, index: usize) -> MusicResult<Song> {
        let len = self.songs.pending_len();
        if index >= len {
            return Err(MusicError::OutOfRange { index, len });
        }

        // Sin voz no se toca la cola
        self.session.join().await?;

        self.invalidate();
        self.halt().await;
        self.paused = false;
        self.stopped = false;

        let song = self.songs.jump(index)?.clone();
        self.begin(song.clone()).await;
        Ok(song)
    }

    async fn seek(&mut self, position: Duration) -> MusicResult<()> {
        if self.songs.now_playing().is_none() {
            return Err(MusicError::NothingPlaying);
        }

        match &self.stream {
            Some(stream) => stream.seek(position).await,
            None => Err(MusicError::UnsupportedOperation(
                "la canción todavía está cargando".to_string(),
            )),
        }
    }

    async fn set_volume(&mut self, volume: f32) -> MusicResult<()> {
        if !volume.is_finite() || !(0.0..=MAX_VOLUME).contains(&volume) {
            return Err(MusicError::InvalidVolume {
                value: volume,
                max: MAX_VOLUME,
            });
        }

        self.volume = volume;
        if let Some(stream) = &self.stream {
            match stream.set_volume(volume).await {
                Ok(()) => {}
                Err(MusicError::UnsupportedOperation(_)) => {
                    debug!("Volumen {} se aplicará en la próxima canción", volume);
                }
                Err(e) => warn!("⚠️ No se pudo aplicar el volumen en vivo: {}", e),
            }
        }

        info!("🔊 Volumen ajustado a {}%", (volume * 100.0) as u32);
        Ok(())
    }

    fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            guild_id: self.guild_id,
            now_playing: self.songs.now_playing().cloned(),
            pending: self.songs.pending(),
            history: self.songs.history().to_vec(),
            paused: self.paused,
            stopped: self.stopped,
            volume: self.volume,
            voice_channel: self.session.channel_id(),
            text_channel: self.text_channel,
            connected: self.session.is_connected(),
            total_duration: self.songs.total_duration(),
        }
    }

    /// Invalida señales pendientes y cancela la búsqueda en curso
    fn invalidate(&mut self) {
        self.generation += 1;
        if let Some(task) = self.loading.take() {
            task.abort();
        }
    }

    async fn halt(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.stop().await {
                warn!("⚠️ Error al detener el stream: {}", e);
            }
        }
    }

    async fn shutdown(&mut self) {
        self.invalidate();
        self.halt().await;
        if let Err(e) = self.session.leave().await {
            warn!("⚠️ Error al salir del canal de voz: {}", e);
        }
    }

    fn emit(&self, event: QueueEvent) {
        // Sin suscriptores no es un error
        let _ = self.events.send(event);
    }
}
