//! SessionContext: every piece of mutable session state, owned in one place
//! by the composition root and handed to whoever handles the next intent.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::discover::SearchController;
use crate::history::{RecentlyPlayed, SearchHistory};
use crate::library::LibraryStore;
use crate::persist::Persistence;
use crate::session::PlaybackSession;
use crate::song::{Playlist, Song, TrackId};

/// The browsing context navigation runs against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "view", content = "id", rename_all = "lowercase")]
pub enum ActiveView {
    #[default]
    Discover,
    Favorites,
    Playlist(String),
}

pub struct SessionContext {
    pub library: LibraryStore,
    pub playback: PlaybackSession,
    pub history: SearchHistory,
    pub discover: SearchController,
    persistence: Persistence,
    volume: f32,
    muted: bool,
    pending_add: Option<Song>,
}

impl SessionContext {
    pub fn load(persistence: Persistence) -> Self {
        let recent = RecentlyPlayed::load(persistence.clone());
        Self::with_playback(persistence.clone(), PlaybackSession::new(recent))
    }

    /// Build around an existing session, e.g. one with a seeded shuffle.
    pub fn with_playback(persistence: Persistence, playback: PlaybackSession) -> Self {
        let library = LibraryStore::load(persistence.clone());
        let history = SearchHistory::load(persistence.clone());
        let volume = persistence.load_volume();
        info!(
            "[context] loaded {} favorites, {} playlists, {} recent, volume {:.2}",
            library.favorites().len(),
            library.playlists().len(),
            playback.recent().len(),
            volume
        );
        Self {
            library,
            playback,
            history,
            discover: SearchController::new(),
            persistence,
            volume,
            muted: false,
            pending_add: None,
        }
    }

    /// Songs that next/previous operate on for `view`. A playlist that no
    /// longer exists resolves to nothing.
    pub fn active_list(&self, view: &ActiveView) -> &[Song] {
        match view {
            ActiveView::Discover => self.discover.results(),
            ActiveView::Favorites => self.library.favorites(),
            ActiveView::Playlist(id) => self
                .library
                .playlist(id)
                .map(|p| p.songs.as_slice())
                .unwrap_or(&[]),
        }
    }

    /// Resolve a track id to a song the session already holds, looking in the
    /// active list first.
    pub fn find_song(&self, view: &ActiveView, track_id: TrackId) -> Option<Song> {
        let by_id = |s: &&Song| s.track_id == track_id;
        self.active_list(view)
            .iter()
            .find(by_id)
            .or_else(|| self.discover.results().iter().find(by_id))
            .or_else(|| self.library.favorites().iter().find(by_id))
            .or_else(|| {
                self.library
                    .playlists()
                    .iter()
                    .flat_map(|p| p.songs.iter())
                    .find(by_id)
            })
            .or_else(|| self.playback.recent().entries().iter().find(by_id))
            .cloned()
    }

    /// Remember a song to be added to whichever playlist is picked or created next.
    pub fn stage_for_playlist(&mut self, song: Song) {
        debug!("[context] staged {} for playlist add", song.track_id);
        self.pending_add = Some(song);
    }

    pub fn pending_add(&self) -> Option<&Song> {
        self.pending_add.as_ref()
    }

    pub fn clear_pending_add(&mut self) -> Option<Song> {
        self.pending_add.take()
    }

    /// Create a playlist; a staged song becomes its first member.
    /// `None` if the name is blank.
    pub fn create_playlist(&mut self, name: &str) -> Option<Playlist> {
        if name.trim().is_empty() {
            return None;
        }
        let playlist = self.library.create_playlist(name);
        if let Some(song) = self.pending_add.take() {
            self.library.add_song_to_playlist(&playlist.id, &song);
        }
        self.library.playlist(&playlist.id).cloned()
    }

    /// Add the staged song to an existing playlist. False if nothing was
    /// staged or the playlist is gone.
    pub fn add_pending_to(&mut self, playlist_id: &str) -> bool {
        let Some(song) = self.pending_add.take() else {
            return false;
        };
        self.library.add_song_to_playlist(playlist_id, &song)
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// What the device should actually output.
    pub fn effective_volume(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.volume
        }
    }

    pub fn set_volume(&mut self, volume: f32) -> f32 {
        self.volume = if volume.is_finite() {
            volume.clamp(0.0, 1.0)
        } else {
            self.volume
        };
        self.persistence.save_volume(self.volume);
        self.volume
    }

    pub fn toggle_mute(&mut self) -> bool {
        self.muted = !self.muted;
        self.muted
    }
}
