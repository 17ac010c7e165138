use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::{ActiveView, SessionContext};
use crate::session::PlaybackState;
use crate::song::{Playlist, Song, TrackId};

/// Every user intent the application understands. Console input and the
/// HTTP API both produce these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum Command {
    Search { term: String },
    LoadMore,
    Retry,
    Surprise,
    Genre { name: String },
    Play { track_id: TrackId },
    TogglePause,
    Next,
    Prev,
    ToggleShuffle,
    CycleRepeat,
    SeekTo { seconds: f64 },
    SeekRelative { seconds: f64 },
    Volume { value: f32 },
    ToggleMute,
    ToggleFavorite { track_id: TrackId },
    /// Mark a song for the next playlist create/add.
    StageForPlaylist { track_id: TrackId },
    CreatePlaylist { name: String },
    AddToPlaylist { playlist_id: String, track_id: TrackId },
    RemoveFromPlaylist { playlist_id: String, track_id: TrackId },
    /// Callers must have confirmed with the user before sending this.
    DeletePlaylist { playlist_id: String },
    SetView { view: ActiveView },
    /// `None` cancels a running timer.
    SleepTimer { minutes: Option<u64> },
    /// Defaults to the current song.
    Share { track_id: Option<TrackId> },
    Download { track_id: Option<TrackId> },
    ClearSearchHistory,
    GetState,
}

/// Pushed to listeners after events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "notice")]
pub enum Notice {
    State { rev: u64 },
    Info { message: String },
    Error { message: String },
}

/// Full application state.  `rev` increments on every change so clients can
/// tell whether they missed something.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub rev: u64,
    pub view: ActiveView,
    pub term: String,
    pub offset: usize,
    pub results: Vec<Song>,
    pub loading: bool,
    pub loading_more: bool,
    pub exhausted: bool,
    pub error: Option<String>,
    pub playback: PlaybackState,
    pub position_secs: Option<f64>,
    pub duration_secs: Option<f64>,
    pub volume: f32,
    pub muted: bool,
    pub favorites: Vec<Song>,
    pub playlists: Vec<Playlist>,
    pub recent: Vec<Song>,
    pub search_history: Vec<String>,
    pub pending_add: Option<Song>,
    pub sleep_deadline: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// Copy the session state. Timeline, timer and `rev` are left for the
    /// caller, which owns them.
    pub fn capture(ctx: &SessionContext, view: &ActiveView) -> Self {
        Self {
            rev: 0,
            view: view.clone(),
            term: ctx.discover.term().to_string(),
            offset: ctx.discover.offset(),
            results: ctx.discover.results().to_vec(),
            loading: ctx.discover.is_loading(),
            loading_more: ctx.discover.is_loading_more(),
            exhausted: ctx.discover.is_exhausted(),
            error: ctx.discover.last_error().map(String::from),
            playback: ctx.playback.state(),
            position_secs: None,
            duration_secs: None,
            volume: ctx.volume(),
            muted: ctx.is_muted(),
            favorites: ctx.library.favorites().to_vec(),
            playlists: ctx.library.playlists().to_vec(),
            recent: ctx.playback.recent().entries().to_vec(),
            search_history: ctx.history.terms().to_vec(),
            pending_add: ctx.pending_add().cloned(),
            sleep_deadline: None,
        }
    }

    /// Songs visible in the snapshot's view.
    pub fn visible(&self) -> &[Song] {
        match &self.view {
            ActiveView::Discover => &self.results,
            ActiveView::Favorites => &self.favorites,
            ActiveView::Playlist(id) => self
                .playlists
                .iter()
                .find(|p| &p.id == id)
                .map(|p| p.songs.as_slice())
                .unwrap_or(&[]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire_format() {
        let json = serde_json::to_string(&Command::Play { track_id: 5 }).unwrap();
        assert_eq!(json, r#"{"cmd":"Play","track_id":5}"#);

        let cmd: Command = serde_json::from_str(r#"{"cmd":"Search","term":"Jazz"}"#).unwrap();
        assert_eq!(cmd, Command::Search { term: "Jazz".into() });

        let cmd: Command = serde_json::from_str(
            r#"{"cmd":"SetView","view":{"view":"playlist","id":"1700000000000"}}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            Command::SetView {
                view: ActiveView::Playlist("1700000000000".into())
            }
        );
    }

    #[test]
    fn test_snapshot_visible_follows_view() {
        let snap = Snapshot {
            view: ActiveView::Playlist("gone".into()),
            ..Default::default()
        };
        assert!(snap.visible().is_empty());

        let json = serde_json::to_string(&snap).unwrap();
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.view, snap.view);
    }
}
