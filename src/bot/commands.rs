use anyhow::{Context as _, Result};
use serenity::{model::channel::Message, prelude::Context};
use std::time::Duration;
use tracing::info;

use super::MusicBot;
use crate::{
    audio::{format_duration, PlaySource, QueueSnapshot, SearchOutcome, Song, VoiceTarget},
    error::MusicError,
    sources::is_url,
};

/// Máximo de canciones listadas en `queue` y `history`
const LIST_LIMIT: usize = 10;

/// Comandos con prefijo. Las posiciones que escribe el usuario empiezan en 1.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// URL, texto libre o número de un resultado de `search`
    Play(String),
    Search(String),
    Skip,
    Stop,
    Pause,
    Resume,
    /// Porcentaje, 0 a 200
    Volume(u32),
    Queue,
    History,
    Jump(usize),
    Seek(Duration),
    Remove(usize),
    Move(usize, usize),
    Help,
}

/// `None` si el mensaje no es un comando conocido
pub fn parse(prefix: &str, content: &str) -> Option<Result<Command>> {
    let body = content.trim().strip_prefix(prefix)?;
    let (name, args) = match body.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (body, ""),
    };

    let command = match name.to_lowercase().as_str() {
        "play" | "p" => required(args, "play <url o búsqueda>").map(|q| Command::Play(q.to_string())),
        "search" => required(args, "search <búsqueda>").map(|q| Command::Search(q.to_string())),
        "skip" | "s" => Ok(Command::Skip),
        "stop" => Ok(Command::Stop),
        "pause" => Ok(Command::Pause),
        "resume" => Ok(Command::Resume),
        "volume" | "vol" => args
            .parse()
            .context("Uso: volume <0-200>")
            .map(Command::Volume),
        "queue" | "q" => Ok(Command::Queue),
        "history" => Ok(Command::History),
        "jump" => position(args, "jump <posición>").map(Command::Jump),
        "seek" => parse_position(args)
            .context("Uso: seek <segundos | m:ss>")
            .map(Command::Seek),
        "remove" => position(args, "remove <posición>").map(Command::Remove),
        "move" => {
            let mut parts = args.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(from), Some(to)) => position(from, "move <desde> <hasta>")
                    .and_then(|from| Ok((from, position(to, "move <desde> <hasta>")?)))
                    .map(|(from, to)| Command::Move(from, to)),
                _ => Err(anyhow::anyhow!("Uso: move <desde> <hasta>")),
            }
        }
        "help" => Ok(Command::Help),
        _ => return None,
    };

    Some(command)
}

/// Acepta segundos (`90`), `m:ss` o `h:mm:ss`
pub fn parse_position(text: &str) -> Option<Duration> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let mut seconds = 0u64;
    for part in text.split(':') {
        let value: u64 = part.parse().ok()?;
        seconds = seconds.checked_mul(60)?.checked_add(value)?;
    }
    Some(Duration::from_secs(seconds))
}

fn required<'a>(args: &'a str, usage: &str) -> Result<&'a str> {
    if args.is_empty() {
        anyhow::bail!("Uso: {}", usage);
    }
    Ok(args)
}

/// Posición de usuario (desde 1) a índice (desde 0)
fn position(args: &str, usage: &str) -> Result<usize> {
    match args.trim().parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n - 1),
        _ => anyhow::bail!("Uso: {}", usage),
    }
}

/// Ejecuta el comando y devuelve la respuesta para el canal
pub async fn execute(bot: &MusicBot, ctx: &Context, msg: &Message, command: Command) -> Result<String> {
    let guild_id = msg
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;
    let manager = &bot.manager;

    info!("🎮 {:?} de {} en {}", command, msg.author.name, guild_id);

    let reply = match command {
        Command::Play(query) => {
            let channel_id = bot.user_voice_channel(ctx, guild_id, msg.author.id)?;
            let target = VoiceTarget { guild_id, channel_id };
            let source = select_source(bot, msg, &query).await?;

            let enqueued = manager
                .play(target, source, Some(msg.channel_id), None, Some(msg.author.id))
                .await?;
            bot.ensure_announcer(ctx, guild_id);

            if enqueued.pending.is_empty() {
                format!("🎵 Preparando **{}**", enqueued.song.title())
            } else {
                format!(
                    "➕ Agregado a la cola: **{}** (posición {})",
                    enqueued.song.title(),
                    enqueued.pending.len()
                )
            }
        }
        Command::Search(query) => match manager
            .search(&query, bot.search_limit, Some(msg.author.id))
            .await?
        {
            SearchOutcome::Song(song) => format!(
                "🔗 **{}** [{}]. Usa `{}play {}` para reproducirla",
                song.title(),
                song.duration_text(),
                bot.prefix,
                song.url()
            ),
            SearchOutcome::Results(results) if results.is_empty() => {
                format!("🔍 No se encontraron resultados para: {}", query)
            }
            SearchOutcome::Results(results) => {
                let lines: Vec<String> = results
                    .iter()
                    .enumerate()
                    .map(|(i, r)| {
                        format!(
                            "`{}.` **{}** [{}] {}",
                            i + 1,
                            r.title,
                            r.duration.as_deref().unwrap_or("?"),
                            r.channel_name.as_deref().unwrap_or("")
                        )
                    })
                    .collect();
                bot.searches.insert((guild_id, msg.author.id), results);

                format!(
                    "🔍 Resultados para **{}**:\n{}\nUsa `{}play <número>` para elegir",
                    query,
                    lines.join("\n"),
                    bot.prefix
                )
            }
        },
        Command::Skip => {
            let song = manager.skip(guild_id).await?;
            format!("⏭️ Saltada: **{}**", song.title())
        }
        Command::Stop => {
            manager.stop(guild_id).await?;
            "⏹️ Reproducción detenida".to_string()
        }
        Command::Pause => {
            manager.pause(guild_id).await?;
            "⏸️ Pausado".to_string()
        }
        Command::Resume => {
            manager.resume(guild_id).await?;
            "▶️ Reanudado".to_string()
        }
        Command::Volume(percent) => {
            let queue = manager
                .get_queue(guild_id)
                .ok_or(MusicError::NotFound(guild_id))?;
            manager.set_volume(&queue, percent as f32 / 100.0).await?;
            format!("🔊 Volumen: {}%", percent)
        }
        Command::Queue => format_queue(&manager.snapshot(guild_id).await?),
        Command::History => format_history(&manager.snapshot(guild_id).await?),
        Command::Jump(index) => {
            let song = manager.jump(guild_id, index).await?;
            format!("⏭️ Saltando a **{}**", song.title())
        }
        Command::Seek(position) => {
            manager.seek(guild_id, position).await?;
            format!("⏩ Posición: {}", format_duration(position))
        }
        Command::Remove(index) => {
            let song = manager.remove(guild_id, index).await?;
            format!("❌ Eliminada: **{}**", song.title())
        }
        Command::Move(from, to) => {
            manager.move_song(guild_id, from, to).await?;
            format!("📍 Movida de {} a {}", from + 1, to + 1)
        }
        Command::Help => help(&bot.prefix),
    };

    Ok(reply)
}

/// Un número elige un resultado de la última búsqueda del usuario
async fn select_source(bot: &MusicBot, msg: &Message, query: &str) -> Result<PlaySource> {
    let guild_id = msg
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    if let Ok(choice) = query.parse::<usize>() {
        let picked = bot
            .searches
            .get(&(guild_id, msg.author.id))
            .and_then(|results| results.get(choice.wrapping_sub(1)).cloned());
        if let Some(result) = picked {
            return Ok(result.into());
        }
    }

    if is_url(query) {
        return Ok(query.into());
    }

    match bot
        .manager
        .search(query, 1, Some(msg.author.id))
        .await?
    {
        SearchOutcome::Song(song) => Ok(song.into()),
        SearchOutcome::Results(results) => results
            .into_iter()
            .next()
            .map(PlaySource::from)
            .ok_or_else(|| anyhow::anyhow!("No se encontraron resultados para: {}", query)),
    }
}

fn song_line(song: &Song) -> String {
    if song.duration_text().is_empty() {
        format!("**{}**", song.title())
    } else {
        format!("**{}** [{}]", song.title(), song.duration_text())
    }
}

pub fn format_queue(snapshot: &QueueSnapshot) -> String {
    let mut lines = Vec::new();

    match &snapshot.now_playing {
        Some(song) if snapshot.paused => lines.push(format!("⏸️ Pausado: {}", song_line(song))),
        Some(song) => lines.push(format!("🎵 Reproduciendo: {}", song_line(song))),
        None => lines.push("📭 No hay nada reproduciéndose".to_string()),
    }

    for (i, song) in snapshot.pending.iter().take(LIST_LIMIT).enumerate() {
        lines.push(format!("`{}.` {}", i + 1, song_line(song)));
    }
    if snapshot.pending.len() > LIST_LIMIT {
        lines.push(format!("... y {} más", snapshot.pending.len() - LIST_LIMIT));
    }

    lines.push(format!(
        "⏱️ Total: {} | 🔊 {}%",
        format_duration(snapshot.total_duration),
        (snapshot.volume * 100.0).round() as u32
    ));

    lines.join("\n")
}

pub fn format_history(snapshot: &QueueSnapshot) -> String {
    if snapshot.history.is_empty() {
        return "📜 El historial está vacío".to_string();
    }

    let mut lines = vec!["📜 Últimas reproducidas:".to_string()];
    lines.extend(
        snapshot
            .history
            .iter()
            .rev()
            .take(LIST_LIMIT)
            .enumerate()
            .map(|(i, song)| format!("`{}.` {}", i + 1, song_line(song))),
    );
    lines.join("\n")
}

fn help(prefix: &str) -> String {
    [
        "play <url | búsqueda | número>",
        "search <búsqueda>",
        "skip",
        "stop",
        "pause",
        "resume",
        "volume <0-200>",
        "queue",
        "history",
        "jump <posición>",
        "seek <segundos | m:ss>",
        "remove <posición>",
        "move <desde> <hasta>",
    ]
    .iter()
    .map(|usage| format!("`{}{}`", prefix, usage))
    .collect::<Vec<_>>()
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serenity::model::id::{ChannelId, GuildId};

    fn parse_ok(content: &str) -> Command {
        parse("!", content).unwrap().unwrap()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_ok("!play never gonna"), Command::Play("never gonna".to_string()));
        assert_eq!(parse_ok("!P https://youtu.be/x"), Command::Play("https://youtu.be/x".to_string()));
        assert_eq!(parse_ok("!skip"), Command::Skip);
        assert_eq!(parse_ok("!volume 80"), Command::Volume(80));
        assert_eq!(parse_ok("!jump 3"), Command::Jump(2));
        assert_eq!(parse_ok("!move 1 3"), Command::Move(0, 2));
        assert_eq!(parse_ok("!seek 1:30"), Command::Seek(Duration::from_secs(90)));
    }

    #[test]
    fn test_parse_ignores_other_messages() {
        assert!(parse("!", "hola").is_none());
        assert!(parse("!", "!dance").is_none());
    }

    #[test]
    fn test_parse_rejects_bad_arguments() {
        assert!(parse("!", "!play").unwrap().is_err());
        assert!(parse("!", "!jump 0").unwrap().is_err());
        assert!(parse("!", "!volume mucho").unwrap().is_err());
        assert!(parse("!", "!move 2").unwrap().is_err());
    }

    #[test]
    fn test_parse_position() {
        assert_eq!(parse_position("45"), Some(Duration::from_secs(45)));
        assert_eq!(parse_position("2:05"), Some(Duration::from_secs(125)));
        assert_eq!(parse_position("1:00:01"), Some(Duration::from_secs(3601)));
        assert_eq!(parse_position("1:xx"), None);
        assert_eq!(parse_position(""), None);
    }

    #[test]
    fn test_format_queue() {
        let snapshot = QueueSnapshot {
            guild_id: GuildId::new(1),
            now_playing: Some(Song::new("a", "Song A", "https://e.com/a").with_duration(Duration::from_secs(60))),
            pending: vec![Song::new("b", "Song B", "https://e.com/b")],
            history: Vec::new(),
            paused: false,
            stopped: false,
            volume: 0.5,
            voice_channel: ChannelId::new(2),
            text_channel: None,
            connected: true,
            total_duration: Duration::from_secs(60),
        };

        assert_eq!(
            format_queue(&snapshot),
            "🎵 Reproduciendo: **Song A** [1:00]\n`1.` **Song B**\n⏱️ Total: 1:00 | 🔊 50%"
        );
        assert_eq!(format_history(&snapshot), "📜 El historial está vacío");
    }
}
