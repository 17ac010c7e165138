//! Bounded most-recent-first histories: recently played songs and search terms.

use tracing::debug;

use crate::persist::Persistence;
use crate::song::{Song, TrackId};

pub const RECENT_CAPACITY: usize = 10;
pub const SEARCH_HISTORY_CAPACITY: usize = 10;

/// Ring of recently played songs, newest first. Re-playing a song moves it
/// to the front instead of duplicating it.
pub struct RecentlyPlayed {
    entries: Vec<Song>,
    persistence: Persistence,
}

impl RecentlyPlayed {
    pub fn load(persistence: Persistence) -> Self {
        let mut entries = persistence.load_recent();
        debug!("[history] loaded {} recent songs", entries.len());
        // Older builds or hand edits may have left duplicates behind.
        let mut seen = std::collections::HashSet::new();
        entries.retain(|s| seen.insert(s.track_id));
        entries.truncate(RECENT_CAPACITY);
        Self {
            entries,
            persistence,
        }
    }

    pub fn push(&mut self, song: &Song) {
        self.entries.retain(|s| s.track_id != song.track_id);
        self.entries.insert(0, song.clone());
        self.entries.truncate(RECENT_CAPACITY);
        self.persistence.save_recent(&self.entries);
    }

    pub fn entries(&self) -> &[Song] {
        &self.entries
    }

    pub fn contains(&self, track_id: TrackId) -> bool {
        self.entries.iter().any(|s| s.track_id == track_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Previously submitted search terms, newest first, unique by exact match.
pub struct SearchHistory {
    terms: Vec<String>,
    persistence: Persistence,
}

impl SearchHistory {
    pub fn load(persistence: Persistence) -> Self {
        let mut terms = persistence.load_search_history();
        let mut seen = std::collections::HashSet::new();
        terms.retain(|t| seen.insert(t.clone()));
        terms.truncate(SEARCH_HISTORY_CAPACITY);
        Self { terms, persistence }
    }

    /// Blank terms are ignored.
    pub fn record(&mut self, term: &str) {
        let term = term.trim();
        if term.is_empty() {
            return;
        }
        self.terms.retain(|t| t != term);
        self.terms.insert(0, term.to_string());
        self.terms.truncate(SEARCH_HISTORY_CAPACITY);
        self.persistence.save_search_history(&self.terms);
    }

    pub fn clear(&mut self) {
        debug!("[history] clearing {} search terms", self.terms.len());
        self.terms.clear();
        self.persistence.clear_search_history();
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }
}
