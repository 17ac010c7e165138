//! Search service client and the duplicate-skipping page fetcher.
//!
//! The upstream catalog returns overlapping pages for the same term, so a
//! "load more" can come back with nothing new. `SearchFetcher` walks forward
//! a bounded number of pages until it finds something the caller does not
//! already have.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::SearchConfig;
use crate::song::{Song, TrackId};

/// Recoverable failure of a single fetch. Nothing the caller holds is
/// modified when one of these is returned, so retrying is always safe.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("search service returned status {0}")]
    Status(u16),
    #[error("could not parse search response: {0}")]
    Parse(String),
}

/// One record as returned by the search service. Anything may be missing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRecord {
    pub track_id: Option<TrackId>,
    pub track_name: Option<String>,
    pub artist_name: Option<String>,
    pub collection_name: Option<String>,
    pub artwork_url100: Option<String>,
    pub preview_url: Option<String>,
    pub release_date: Option<String>,
    pub primary_genre_name: Option<String>,
}

impl SearchRecord {
    /// `None` unless the record has an id, a title, an artist and a playable preview.
    pub fn into_song(self) -> Option<Song> {
        let preview_url = self.preview_url.filter(|u| !u.trim().is_empty())?;
        Some(Song {
            track_id: self.track_id?,
            track_name: self.track_name?,
            artist_name: self.artist_name?,
            collection_name: self.collection_name.unwrap_or_default(),
            artwork_url100: self.artwork_url100.unwrap_or_default(),
            preview_url,
            release_date: self.release_date.unwrap_or_default(),
            primary_genre_name: self.primary_genre_name.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchRecord>,
}

/// The search service contract: term + zero-based offset + page size in,
/// an ordered page of records out.
#[async_trait]
pub trait SearchService: Send + Sync {
    async fn search(
        &self,
        term: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<SearchRecord>, FetchError>;
}

/// iTunes Search API client.
pub struct ItunesClient {
    client: reqwest::Client,
    base_url: String,
    country: String,
}

impl ItunesClient {
    pub fn new(config: &SearchConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("groovewave/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            country: config.country.clone(),
        })
    }
}

#[async_trait]
impl SearchService for ItunesClient {
    async fn search(
        &self,
        term: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<SearchRecord>, FetchError> {
        debug!("[search] GET term={:?} offset={} limit={}", term, offset, limit);
        let limit = limit.to_string();
        let offset = offset.to_string();
        let response = self
            .client
            .get(&self.base_url)
            .header("Accept", "application/json")
            .query(&[
                ("term", term),
                ("media", "music"),
                ("entity", "song"),
                ("limit", limit.as_str()),
                ("offset", offset.as_str()),
                ("country", self.country.as_str()),
            ])
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        // The service sometimes labels JSON as text/javascript; decode by hand.
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let parsed: SearchResponse =
            serde_json::from_str(&body).map_err(|e| FetchError::Parse(e.to_string()))?;
        Ok(parsed.results)
    }
}

/// Drop unplayable records and collapse duplicates inside one page, by track
/// id and by case-insensitive artist/title.
pub fn sanitize_page(records: Vec<SearchRecord>) -> Vec<Song> {
    let mut seen_ids = HashSet::new();
    let mut seen_keys = HashSet::new();
    records
        .into_iter()
        .filter_map(SearchRecord::into_song)
        .filter(|song| seen_ids.insert(song.track_id) && seen_keys.insert(song.dedup_key()))
        .collect()
}

/// Fresh searches take one attempt; load-more keeps walking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    Fresh,
    LoadMore,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchPage {
    /// New songs only, in upstream order. Empty if nothing new was found.
    pub songs: Vec<Song>,
    pub next_cursor: usize,
    /// The service returned an empty page: there is nothing past `next_cursor`.
    pub exhausted: bool,
    pub attempts: usize,
}

#[derive(Debug, Clone)]
pub struct SearchFetcher {
    page_size: usize,
    max_attempts: usize,
}

impl SearchFetcher {
    pub fn new(page_size: usize, max_attempts: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(config.page_size, config.max_attempts)
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Stops on the first of: new items found, upstream exhausted, attempts used up.
    /// The cursor advances by one page per attempt that returned anything.
    pub async fn fetch<S: SearchService + ?Sized>(
        &self,
        service: &S,
        term: &str,
        cursor: usize,
        known_ids: &HashSet<TrackId>,
        mode: FetchMode,
    ) -> Result<FetchPage, FetchError> {
        let max_attempts = match mode {
            FetchMode::Fresh => 1,
            FetchMode::LoadMore => self.max_attempts,
        };

        let mut cursor = cursor;
        let mut attempts = 0;
        let mut exhausted = false;
        let mut songs = Vec::new();

        while attempts < max_attempts {
            attempts += 1;
            let records = service.search(term, cursor, self.page_size).await?;
            if records.is_empty() {
                exhausted = true;
                break;
            }

            let fresh: Vec<Song> = sanitize_page(records)
                .into_iter()
                .filter(|s| !known_ids.contains(&s.track_id))
                .collect();
            cursor += self.page_size;

            if !fresh.is_empty() {
                songs = fresh;
                break;
            }
            debug!(
                "[search] attempt {}/{} for {:?} yielded nothing new, cursor now {}",
                attempts, max_attempts, term, cursor
            );
        }

        info!(
            "[search] {:?} {:?}: {} new after {} attempt(s), cursor={} exhausted={}",
            mode,
            term,
            songs.len(),
            attempts,
            cursor,
            exhausted
        );
        Ok(FetchPage {
            songs,
            next_cursor: cursor,
            exhausted,
            attempts,
        })
    }
}
