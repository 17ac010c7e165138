//! Line-oriented console: reads commands from stdin, prints notices.
//!
//! Songs and playlists are addressed by their 1-based position in the last
//! listing, resolved against the current snapshot.

use std::fmt::Write as _;
use std::sync::Arc;

use groove_core::context::ActiveView;
use groove_core::discover::GENRES;
use groove_core::protocol::{Command, Notice, Snapshot};
use groove_core::song::{Song, TrackId};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, info};

use crate::core::AppEvent;

const SEEK_STEP_SECS: f64 = 10.0;

pub const HELP: &str = "\
search <term> | / <term>   search the catalog
more | retry | surprise     load more, retry last search, random term
genres | genre <name>       list or browse genres
ls                          list songs in the current view
play <n> | p | n | b        play song n, pause/resume, next, previous
shuffle | repeat            toggle shuffle, cycle repeat (off/all/one)
seek <secs> | ff | rw       jump to position, skip +/-10s
vol <0-100> | mute          volume, mute toggle
fav <n>                     toggle favorite
stage <n>                   pick song n for a playlist
newlist <name>              create playlist (gets the picked song)
addto <list> [n]            add song n (or the picked song) to playlist
unlist <n>                  remove song n from the viewed playlist
rmlist <list> yes           delete playlist
view discover|favorites|list <list>
playlists | recent | history | clearhistory
sleep <minutes>|off         sleep timer
share [n] | download [n]    current song when n is omitted
status | help | quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listing {
    Songs,
    Playlists,
    Recent,
    History,
    Genres,
    Status,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Send(Command),
    Show(Listing),
    Help,
    Quit,
    Nothing,
}

/// Turn one input line into an action. Errors are user-facing messages.
pub fn parse_line(line: &str, snap: &Snapshot) -> Result<Action, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Action::Nothing);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim()),
        None => (line, ""),
    };

    let cmd = match word.to_lowercase().as_str() {
        "help" | "?" => return Ok(Action::Help),
        "quit" | "exit" | "q" => return Ok(Action::Quit),
        "ls" => return Ok(Action::Show(Listing::Songs)),
        "playlists" => return Ok(Action::Show(Listing::Playlists)),
        "recent" => return Ok(Action::Show(Listing::Recent)),
        "history" => return Ok(Action::Show(Listing::History)),
        "genres" => return Ok(Action::Show(Listing::Genres)),
        "status" => return Ok(Action::Show(Listing::Status)),

        "search" | "/" => {
            if rest.is_empty() {
                return Err("usage: search <term>".into());
            }
            Command::Search { term: rest.into() }
        }
        "more" => Command::LoadMore,
        "retry" => Command::Retry,
        "surprise" => Command::Surprise,
        "genre" => {
            let name = GENRES
                .iter()
                .find(|g| g.eq_ignore_ascii_case(rest))
                .ok_or_else(|| format!("unknown genre {:?}", rest))?;
            Command::Genre {
                name: name.to_string(),
            }
        }
        "play" => Command::Play {
            track_id: song_at(snap, rest)?,
        },
        "p" | "pause" => Command::TogglePause,
        "n" | "next" => Command::Next,
        "b" | "prev" => Command::Prev,
        "shuffle" => Command::ToggleShuffle,
        "repeat" => Command::CycleRepeat,
        "seek" => Command::SeekTo {
            seconds: rest.parse().map_err(|_| "usage: seek <seconds>")?,
        },
        "ff" => Command::SeekRelative {
            seconds: SEEK_STEP_SECS,
        },
        "rw" => Command::SeekRelative {
            seconds: -SEEK_STEP_SECS,
        },
        "vol" => {
            let pct: u8 = rest.parse().map_err(|_| "usage: vol <0-100>")?;
            Command::Volume {
                value: (pct.min(100) as f32) / 100.0,
            }
        }
        "mute" => Command::ToggleMute,
        "fav" => Command::ToggleFavorite {
            track_id: song_at(snap, rest)?,
        },
        "stage" => Command::StageForPlaylist {
            track_id: song_at(snap, rest)?,
        },
        "newlist" => {
            if rest.is_empty() {
                return Err("playlist name cannot be empty".into());
            }
            Command::CreatePlaylist { name: rest.into() }
        }
        "addto" => {
            let (list, song) = match rest.split_once(char::is_whitespace) {
                Some((l, s)) => (l, Some(s.trim())),
                None => (rest, None),
            };
            let playlist_id = playlist_at(snap, list)?;
            let track_id = match song {
                Some(s) => song_at(snap, s)?,
                None => snap
                    .pending_add
                    .as_ref()
                    .map(|s| s.track_id)
                    .ok_or("no song picked; use stage <n> or addto <list> <n>")?,
            };
            Command::AddToPlaylist {
                playlist_id,
                track_id,
            }
        }
        "unlist" => {
            let ActiveView::Playlist(playlist_id) = &snap.view else {
                return Err("not viewing a playlist".into());
            };
            Command::RemoveFromPlaylist {
                playlist_id: playlist_id.clone(),
                track_id: song_at(snap, rest)?,
            }
        }
        "rmlist" => {
            let (list, confirm) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            let playlist_id = playlist_at(snap, list)?;
            if !confirm.trim().eq_ignore_ascii_case("yes") {
                return Err(format!("really delete? type: rmlist {} yes", list));
            }
            Command::DeletePlaylist { playlist_id }
        }
        "view" => {
            let (which, arg) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            let view = match which {
                "discover" | "d" => ActiveView::Discover,
                "favorites" | "favs" | "f" => ActiveView::Favorites,
                "list" | "l" => ActiveView::Playlist(playlist_at(snap, arg.trim())?),
                _ => return Err("usage: view discover|favorites|list <n>".into()),
            };
            Command::SetView { view }
        }
        "sleep" => match rest {
            "off" | "0" => Command::SleepTimer { minutes: None },
            m => Command::SleepTimer {
                minutes: Some(m.parse().map_err(|_| "usage: sleep <minutes>|off")?),
            },
        },
        "share" => Command::Share {
            track_id: optional_song_at(snap, rest)?,
        },
        "download" | "dl" => Command::Download {
            track_id: optional_song_at(snap, rest)?,
        },
        "clearhistory" => Command::ClearSearchHistory,
        other => return Err(format!("unknown command {:?}, try help", other)),
    };
    Ok(Action::Send(cmd))
}

fn index(arg: &str, len: usize, what: &str) -> Result<usize, String> {
    let n: usize = arg
        .parse()
        .map_err(|_| format!("expected a {} number", what))?;
    if n == 0 || n > len {
        return Err(format!("no {} {} (1-{})", what, n, len));
    }
    Ok(n - 1)
}

fn song_at(snap: &Snapshot, arg: &str) -> Result<TrackId, String> {
    let songs = snap.visible();
    let i = index(arg, songs.len(), "song")?;
    Ok(songs[i].track_id)
}

fn optional_song_at(snap: &Snapshot, arg: &str) -> Result<Option<TrackId>, String> {
    if arg.is_empty() {
        return Ok(None);
    }
    song_at(snap, arg).map(Some)
}

fn playlist_at(snap: &Snapshot, arg: &str) -> Result<String, String> {
    let i = index(arg, snap.playlists.len(), "playlist")?;
    Ok(snap.playlists[i].id.clone())
}

/// `m:ss`, clamping negatives and NaN to zero.
pub fn format_time(secs: f64) -> String {
    let total = if secs.is_finite() && secs > 0.0 {
        secs.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}

fn song_line(out: &mut String, n: usize, song: &Song, snap: &Snapshot) {
    let current = snap.playback.current.as_ref().map(|c| c.track_id) == Some(song.track_id);
    let fav = snap.favorites.iter().any(|f| f.track_id == song.track_id);
    let year = song
        .release_year()
        .map(|y| format!(" ({})", y))
        .unwrap_or_default();
    let _ = writeln!(
        out,
        "{} {:>3}. {}{}{}",
        if current { ">" } else { " " },
        n,
        if fav { "* " } else { "" },
        song.display(),
        year
    );
}

pub fn render(listing: Listing, snap: &Snapshot) -> String {
    let mut out = String::new();
    match listing {
        Listing::Songs => {
            let title = match &snap.view {
                ActiveView::Discover => format!("Discover: {:?}", snap.term),
                ActiveView::Favorites => "Favorites".to_string(),
                ActiveView::Playlist(id) => snap
                    .playlists
                    .iter()
                    .find(|p| &p.id == id)
                    .map(|p| format!("Playlist: {}", p.name))
                    .unwrap_or_else(|| "Playlist".to_string()),
            };
            let _ = writeln!(out, "{}", title);
            for (i, song) in snap.visible().iter().enumerate() {
                song_line(&mut out, i + 1, song, snap);
            }
            if snap.visible().is_empty() {
                let _ = writeln!(out, "  (empty)");
            }
            if snap.view == ActiveView::Discover {
                if snap.loading {
                    let _ = writeln!(out, "  loading...");
                } else if let Some(err) = &snap.error {
                    let _ = writeln!(out, "  {}", err);
                } else if !snap.exhausted && !snap.results.is_empty() {
                    let _ = writeln!(out, "  (more: load more)");
                }
            }
        }
        Listing::Playlists => {
            for (i, p) in snap.playlists.iter().enumerate() {
                let _ = writeln!(out, "{:>3}. {} ({} songs)", i + 1, p.name, p.songs.len());
            }
            if snap.playlists.is_empty() {
                let _ = writeln!(out, "no playlists yet");
            }
        }
        Listing::Recent => {
            for (i, song) in snap.recent.iter().enumerate() {
                let _ = writeln!(out, "{:>3}. {}", i + 1, song.display());
            }
        }
        Listing::History => {
            for term in &snap.search_history {
                let _ = writeln!(out, "  {}", term);
            }
        }
        Listing::Genres => {
            let _ = writeln!(out, "{}", GENRES.join(" | "));
        }
        Listing::Status => {
            let pb = &snap.playback;
            match &pb.current {
                Some(song) => {
                    let _ = writeln!(
                        out,
                        "{} {}  {} / {}",
                        if pb.playing { "playing" } else { "paused" },
                        song.display(),
                        format_time(snap.position_secs.unwrap_or(0.0)),
                        format_time(snap.duration_secs.unwrap_or(0.0)),
                    );
                }
                None => {
                    let _ = writeln!(out, "idle");
                }
            }
            let _ = writeln!(
                out,
                "shuffle {}  repeat {}  volume {}%{}",
                if pb.shuffle { "on" } else { "off" },
                pb.repeat.label(),
                (snap.volume * 100.0).round() as u32,
                if snap.muted { " (muted)" } else { "" },
            );
            if let Some(deadline) = snap.sleep_deadline {
                let _ = writeln!(out, "sleep at {}", deadline.format("%H:%M:%S UTC"));
            }
            if let Some(song) = &snap.pending_add {
                let _ = writeln!(out, "picked for playlist: {}", song.display());
            }
        }
    }
    out
}

/// Read stdin until `quit` or EOF.
pub async fn run_input(snapshot: Arc<RwLock<Snapshot>>, event_tx: mpsc::Sender<AppEvent>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                debug!("[console] stdin error: {}", e);
                break;
            }
        };
        let snap = snapshot.read().await.clone();
        match parse_line(&line, &snap) {
            Ok(Action::Send(cmd)) => {
                if event_tx.send(AppEvent::Command(cmd)).await.is_err() {
                    break;
                }
            }
            Ok(Action::Show(listing)) => print!("{}", render(listing, &snap)),
            Ok(Action::Help) => println!("{}", HELP),
            Ok(Action::Quit) => break,
            Ok(Action::Nothing) => {}
            Err(msg) => println!("! {}", msg),
        }
    }
    info!("[console] input closed");
    let _ = event_tx.send(AppEvent::Shutdown).await;
}

/// Print notices, and the song whenever a new one starts.
pub async fn run_output(snapshot: Arc<RwLock<Snapshot>>, mut notices: broadcast::Receiver<Notice>) {
    let mut last_track = None;
    let mut last_results = 0;
    loop {
        match notices.recv().await {
            Ok(Notice::State { .. }) => {
                let snap = snapshot.read().await;
                let track = snap.playback.current.as_ref().map(|s| s.track_id);
                if track != last_track {
                    if let Some(song) = &snap.playback.current {
                        println!("> {}", song.display());
                    }
                    last_track = track;
                }
                if snap.view == ActiveView::Discover
                    && !snap.loading
                    && snap.results.len() != last_results
                {
                    last_results = snap.results.len();
                    print!("{}", render(Listing::Songs, &snap));
                }
            }
            Ok(Notice::Info { message }) => println!("{}", message),
            Ok(Notice::Error { message }) => println!("! {}", message),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                debug!("[console] skipped {} notices", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use groove_core::song::Playlist;

    fn song(id: i64) -> Song {
        Song {
            track_id: id,
            track_name: format!("Song {id}"),
            artist_name: "Band".into(),
            collection_name: String::new(),
            artwork_url100: String::new(),
            preview_url: format!("https://audio.example/{id}.m4a"),
            release_date: "2011-03-01T08:00:00Z".into(),
            primary_genre_name: String::new(),
        }
    }

    fn snap() -> Snapshot {
        Snapshot {
            results: vec![song(10), song(20), song(30)],
            playlists: vec![Playlist {
                id: "1700000000000".into(),
                name: "Road Trip".into(),
                songs: vec![song(20)],
                created_at: 1_700_000_000_000,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0.0), "0:00");
        assert_eq!(format_time(29.9), "0:29");
        assert_eq!(format_time(61.0), "1:01");
        assert_eq!(format_time(-3.0), "0:00");
        assert_eq!(format_time(f64::NAN), "0:00");
    }

    #[test]
    fn test_songs_addressed_by_position() {
        let s = snap();
        assert_eq!(
            parse_line("play 2", &s),
            Ok(Action::Send(Command::Play { track_id: 20 }))
        );
        assert!(parse_line("play 4", &s).is_err());
        assert!(parse_line("play 0", &s).is_err());
        assert_eq!(
            parse_line("share", &s),
            Ok(Action::Send(Command::Share { track_id: None }))
        );
    }

    #[test]
    fn test_search_keeps_full_term() {
        assert_eq!(
            parse_line("/  lo-fi  beats ", &snap()),
            Ok(Action::Send(Command::Search {
                term: "lo-fi  beats".into()
            }))
        );
        assert!(parse_line("search", &snap()).is_err());
    }

    #[test]
    fn test_delete_playlist_needs_confirmation() {
        let s = snap();
        assert!(parse_line("rmlist 1", &s).is_err());
        assert_eq!(
            parse_line("rmlist 1 yes", &s),
            Ok(Action::Send(Command::DeletePlaylist {
                playlist_id: "1700000000000".into()
            }))
        );
    }

    #[test]
    fn test_addto_uses_picked_song() {
        let mut s = snap();
        assert!(parse_line("addto 1", &s).is_err());
        s.pending_add = Some(song(30));
        assert_eq!(
            parse_line("addto 1", &s),
            Ok(Action::Send(Command::AddToPlaylist {
                playlist_id: "1700000000000".into(),
                track_id: 30
            }))
        );
    }

    #[test]
    fn test_playlist_view_indexes_its_songs() {
        let mut s = snap();
        s.view = ActiveView::Playlist("1700000000000".into());
        assert_eq!(
            parse_line("unlist 1", &s),
            Ok(Action::Send(Command::RemoveFromPlaylist {
                playlist_id: "1700000000000".into(),
                track_id: 20
            }))
        );
        let listing = render(Listing::Songs, &s);
        assert!(listing.contains("Playlist: Road Trip"));
        assert!(listing.contains("Band \u{2013} Song 20 (2011)"));
    }

    #[test]
    fn test_genre_and_misc() {
        let s = snap();
        assert_eq!(
            parse_line("genre k-pop", &s),
            Ok(Action::Send(Command::Genre {
                name: "K-Pop".into()
            }))
        );
        assert_eq!(
            parse_line("vol 150", &s),
            Ok(Action::Send(Command::Volume { value: 1.0 }))
        );
        assert_eq!(
            parse_line("sleep off", &s),
            Ok(Action::Send(Command::SleepTimer { minutes: None }))
        );
        assert_eq!(parse_line("  ", &s), Ok(Action::Nothing));
        assert!(parse_line("dance", &s).is_err());
    }
}
