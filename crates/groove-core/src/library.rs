//! Favorites and playlists.
//!
//! Every mutation is followed by a write of the affected collection.
//! Operations naming a playlist that no longer exists are no-ops: a UI action
//! may have been queued against a playlist deleted in the meantime.

use tracing::{debug, info};

use crate::persist::Persistence;
use crate::song::{Playlist, Song, TrackId};

pub struct LibraryStore {
    favorites: Vec<Song>,
    playlists: Vec<Playlist>,
    persistence: Persistence,
}

impl LibraryStore {
    pub fn load(persistence: Persistence) -> Self {
        let favorites = persistence.load_favorites();
        let playlists = persistence.load_playlists();
        debug!(
            "[library] loaded {} favorites, {} playlists",
            favorites.len(),
            playlists.len()
        );
        Self {
            favorites,
            playlists,
            persistence,
        }
    }

    pub fn favorites(&self) -> &[Song] {
        &self.favorites
    }

    pub fn playlists(&self) -> &[Playlist] {
        &self.playlists
    }

    pub fn playlist(&self, id: &str) -> Option<&Playlist> {
        self.playlists.iter().find(|p| p.id == id)
    }

    pub fn is_favorite(&self, track_id: TrackId) -> bool {
        self.favorites.iter().any(|s| s.track_id == track_id)
    }

    /// Flip membership. Returns `true` if the song is a favorite afterwards.
    pub fn toggle_favorite(&mut self, song: &Song) -> bool {
        let now_favorite = if self.is_favorite(song.track_id) {
            self.favorites.retain(|s| s.track_id != song.track_id);
            false
        } else {
            self.favorites.push(song.clone());
            true
        };
        self.persistence.save_favorites(&self.favorites);
        now_favorite
    }

    pub fn create_playlist(&mut self, name: &str) -> Playlist {
        let now = chrono::Utc::now().timestamp_millis();
        let playlist = Playlist {
            id: self.fresh_id(now),
            name: name.trim().to_string(),
            songs: Vec::new(),
            created_at: now,
        };
        info!("[library] created playlist {:?} id={}", playlist.name, playlist.id);
        self.playlists.push(playlist.clone());
        self.persistence.save_playlists(&self.playlists);
        playlist
    }

    /// Returns `true` if the song was appended.
    pub fn add_song_to_playlist(&mut self, playlist_id: &str, song: &Song) -> bool {
        let Some(playlist) = self.playlists.iter_mut().find(|p| p.id == playlist_id) else {
            debug!("[library] add to unknown playlist {}", playlist_id);
            return false;
        };
        if playlist.contains(song.track_id) {
            return false;
        }
        playlist.songs.push(song.clone());
        self.persistence.save_playlists(&self.playlists);
        true
    }

    /// Returns `true` if a song was removed.
    pub fn remove_song_from_playlist(&mut self, playlist_id: &str, track_id: TrackId) -> bool {
        let Some(playlist) = self.playlists.iter_mut().find(|p| p.id == playlist_id) else {
            debug!("[library] remove from unknown playlist {}", playlist_id);
            return false;
        };
        let before = playlist.songs.len();
        playlist.songs.retain(|s| s.track_id != track_id);
        let removed = playlist.songs.len() != before;
        self.persistence.save_playlists(&self.playlists);
        removed
    }

    /// Confirmation is the caller's job; once called the playlist is gone.
    pub fn delete_playlist(&mut self, playlist_id: &str) -> Option<Playlist> {
        let idx = self.playlists.iter().position(|p| p.id == playlist_id)?;
        let removed = self.playlists.remove(idx);
        info!("[library] deleted playlist {:?} id={}", removed.name, removed.id);
        self.persistence.save_playlists(&self.playlists);
        Some(removed)
    }

    // Millisecond timestamps, bumped past any id already taken.
    fn fresh_id(&self, now_ms: i64) -> String {
        let mut candidate = now_ms;
        while self.playlists.iter().any(|p| p.id == candidate.to_string()) {
            candidate += 1;
        }
        candidate.to_string()
    }
}
