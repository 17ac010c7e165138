//! Shared data model: songs, playlists, repeat policy.
//!
//! Field names on the wire follow the upstream search service so the same
//! JSON shape is used for search responses and for the persisted collections.

use chrono::{DateTime, Datelike};
use serde::{Deserialize, Serialize};

/// Upstream catalog track identifier. Identity of a `Song` is this value only.
pub type TrackId = i64;

/// A playable track. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub track_id: TrackId,
    pub track_name: String,
    pub artist_name: String,
    #[serde(default)]
    pub collection_name: String,
    #[serde(default)]
    pub artwork_url100: String,
    pub preview_url: String,
    #[serde(default)]
    pub release_date: String,
    #[serde(default)]
    pub primary_genre_name: String,
}

impl Song {
    /// Case-insensitive `artist-title` key. The catalog sometimes assigns
    /// distinct ids to the same recording; this key catches those.
    pub fn dedup_key(&self) -> String {
        format!(
            "{}-{}",
            self.artist_name.trim().to_lowercase(),
            self.track_name.trim().to_lowercase()
        )
    }

    /// "Artist – Title" for listings.
    pub fn display(&self) -> String {
        format!("{} \u{2013} {}", self.artist_name, self.track_name)
    }

    pub fn release_year(&self) -> Option<i32> {
        DateTime::parse_from_rfc3339(self.release_date.trim())
            .ok()
            .map(|dt| dt.year())
            .or_else(|| {
                // Some records carry a bare date.
                chrono::NaiveDate::parse_from_str(self.release_date.trim(), "%Y-%m-%d")
                    .ok()
                    .map(|d| d.year())
            })
    }

    pub fn share_text(&self) -> String {
        format!(
            "Check out \"{}\" by {} on GrooveWave!",
            self.track_name, self.artist_name
        )
    }

    /// File name used when saving the preview clip locally.
    pub fn download_file_name(&self) -> String {
        let base = format!("{} - {}", self.track_name, self.artist_name);
        let safe: String = base
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                c if c.is_control() => '_',
                c => c,
            })
            .collect();
        format!("{}.m4a", safe.trim())
    }
}

/// Repeat policy. Cycles off → all → one → off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    Off,
    All,
    One,
}

impl RepeatMode {
    pub fn cycle(self) -> Self {
        match self {
            Self::Off => Self::All,
            Self::All => Self::One,
            Self::One => Self::Off,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::All => "all",
            Self::One => "one",
        }
    }
}

/// A user-created, named, insertion-ordered collection of songs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub songs: Vec<Song>,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub created_at: i64,
}

impl Playlist {
    pub fn contains(&self, track_id: TrackId) -> bool {
        self.songs.iter().any(|s| s.track_id == track_id)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::Song;

    pub fn song(id: i64, artist: &str, title: &str) -> Song {
        Song {
            track_id: id,
            track_name: title.to_string(),
            artist_name: artist.to_string(),
            collection_name: "Album".to_string(),
            artwork_url100: format!("https://art.example/{id}.jpg"),
            preview_url: format!("https://audio.example/{id}.m4a"),
            release_date: "2019-06-14T07:00:00Z".to_string(),
            primary_genre_name: "Pop".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::song;
    use super::*;

    #[test]
    fn test_dedup_key_ignores_case_and_padding() {
        let a = song(1, "Daft Punk", "One More Time");
        let b = song(2, "  daft punk", "ONE MORE TIME ");
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn test_repeat_cycle() {
        let mut mode = RepeatMode::Off;
        let mut seen = Vec::new();
        for _ in 0..4 {
            mode = mode.cycle();
            seen.push(mode);
        }
        assert_eq!(
            seen,
            vec![RepeatMode::All, RepeatMode::One, RepeatMode::Off, RepeatMode::All]
        );
    }

    #[test]
    fn test_song_uses_upstream_field_names() {
        let json = serde_json::to_value(song(7, "A", "B")).unwrap();
        assert_eq!(json["trackId"], 7);
        assert_eq!(json["artworkUrl100"], "https://art.example/7.jpg");
        assert_eq!(json["primaryGenreName"], "Pop");
    }

    #[test]
    fn test_release_year() {
        assert_eq!(song(1, "A", "B").release_year(), Some(2019));
        let mut s = song(1, "A", "B");
        s.release_date = "garbage".into();
        assert_eq!(s.release_year(), None);
    }

    #[test]
    fn test_download_file_name_strips_separators() {
        let s = song(1, "AC/DC", "T.N.T.");
        assert_eq!(s.download_file_name(), "T.N.T. - AC_DC.m4a");
    }

    #[test]
    fn test_playlist_camel_case() {
        let pl = Playlist {
            id: "1".into(),
            name: "Road Trip".into(),
            songs: vec![],
            created_at: 42,
        };
        let json = serde_json::to_value(&pl).unwrap();
        assert_eq!(json["createdAt"], 42);
    }
}
