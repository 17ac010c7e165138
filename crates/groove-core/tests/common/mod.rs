#![allow(dead_code)]

use async_trait::async_trait;
use groove_core::search::{FetchError, SearchRecord, SearchService};
use std::collections::HashMap;
use std::sync::Mutex;

pub fn record(id: i64, artist: &str, title: &str) -> SearchRecord {
    SearchRecord {
        track_id: Some(id),
        track_name: Some(title.to_string()),
        artist_name: Some(artist.to_string()),
        collection_name: Some("Compilation".to_string()),
        preview_url: Some(format!("https://audio.example/{id}.m4a")),
        release_date: Some("2020-02-02T08:00:00Z".to_string()),
        primary_genre_name: Some("Pop".to_string()),
        ..Default::default()
    }
}

/// `count` records with ids starting at `first`, all by distinct artists.
pub fn records(first: i64, count: usize) -> Vec<SearchRecord> {
    (0..count as i64)
        .map(|i| record(first + i, &format!("Artist {}", first + i), "Track"))
        .collect()
}

/// Replays canned pages keyed by offset. Offsets without a page get
/// `fallback`, or an empty page if none is set.
#[derive(Default)]
pub struct ScriptedService {
    pages: HashMap<usize, Vec<SearchRecord>>,
    fallback: Option<Vec<SearchRecord>>,
    fail_with: Mutex<Option<u16>>,
    calls: Mutex<Vec<(String, usize)>>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, offset: usize, records: Vec<SearchRecord>) -> Self {
        self.pages.insert(offset, records);
        self
    }

    pub fn otherwise(mut self, records: Vec<SearchRecord>) -> Self {
        self.fallback = Some(records);
        self
    }

    /// Make the next call fail with the given HTTP status.
    pub fn fail_next(&self, status: u16) {
        *self.fail_with.lock().unwrap() = Some(status);
    }

    pub fn calls(&self) -> Vec<(String, usize)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn offsets(&self) -> Vec<usize> {
        self.calls().into_iter().map(|(_, o)| o).collect()
    }
}

#[async_trait]
impl SearchService for ScriptedService {
    async fn search(
        &self,
        term: &str,
        offset: usize,
        _limit: usize,
    ) -> Result<Vec<SearchRecord>, FetchError> {
        self.calls.lock().unwrap().push((term.to_string(), offset));
        if let Some(status) = self.fail_with.lock().unwrap().take() {
            return Err(FetchError::Status(status));
        }
        Ok(self
            .pages
            .get(&offset)
            .or(self.fallback.as_ref())
            .cloned()
            .unwrap_or_default())
    }
}
