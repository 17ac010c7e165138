//! Discover results: the current search term, its cursor, and the songs
//! accumulated so far.
//!
//! Fetches run outside this type (they await the network). The controller
//! hands out a `FetchRequest` describing what to fetch and later takes the
//! result back through `apply`, which decides whether it still matters.
//!
//! Two slots exist, `Fresh` and `LoadMore`, each with at most one request in
//! flight. Every fresh search bumps a generation counter; a result carrying
//! an older generation is dropped, so a slow "load more" for a previous term
//! can never land on top of a newer search.

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::search::{FetchError, FetchMode, FetchPage, SearchFetcher, SearchService};
use crate::song::{Song, TrackId};

pub const GENRES: &[&str] = &[
    "Top 100",
    "Pop",
    "Hip-Hop",
    "Rock",
    "Electronic",
    "R&B",
    "Indie",
    "K-Pop",
    "Classical",
    "Jazz",
];

pub const SURPRISE_TERMS: &[&str] = &[
    "Summer Vibes",
    "Lo-Fi Study",
    "Workout Hype",
    "Acoustic Chill",
    "90s Hits",
    "Cyberpunk",
    "Road Trip",
    "Piano Ballads",
    "Synthwave",
    "Coffee Shop",
];

/// Pick a "surprise me" term uniformly at random.
pub fn surprise_term<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    SURPRISE_TERMS.choose(rng).copied().unwrap_or(GENRES[0])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchSlot {
    Fresh,
    LoadMore,
}

impl SearchSlot {
    pub fn mode(self) -> FetchMode {
        match self {
            Self::Fresh => FetchMode::Fresh,
            Self::LoadMore => FetchMode::LoadMore,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchSession {
    pub term: String,
    pub offset: usize,
    pub results: Vec<Song>,
}

impl SearchSession {
    pub fn known_ids(&self) -> HashSet<TrackId> {
        self.results.iter().map(|s| s.track_id).collect()
    }
}

/// Everything needed to run one fetch, captured when it was issued.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub ticket: u64,
    pub generation: u64,
    pub slot: SearchSlot,
    pub term: String,
    pub cursor: usize,
    pub known_ids: HashSet<TrackId>,
}

impl FetchRequest {
    pub async fn run<S: SearchService + ?Sized>(
        &self,
        fetcher: &SearchFetcher,
        service: &S,
    ) -> Result<FetchPage, FetchError> {
        fetcher
            .fetch(service, &self.term, self.cursor, &self.known_ids, self.slot.mode())
            .await
    }
}

/// What `apply` did with a fetch result.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchUpdate {
    Replaced { term: String, count: usize },
    Appended { count: usize },
    NoResults { term: String },
    /// Load-more found nothing new. Not an error.
    Exhausted,
    Failed { term: String, message: String },
    /// Result belonged to a superseded search and was ignored.
    Stale,
}

#[derive(Debug, Default)]
pub struct SearchController {
    session: SearchSession,
    generation: u64,
    next_ticket: u64,
    fresh_in_flight: Option<u64>,
    more_in_flight: Option<u64>,
    last_error: Option<String>,
    exhausted: bool,
}

impl SearchController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> &SearchSession {
        &self.session
    }

    pub fn results(&self) -> &[Song] {
        &self.session.results
    }

    pub fn term(&self) -> &str {
        &self.session.term
    }

    pub fn offset(&self) -> usize {
        self.session.offset
    }

    pub fn is_loading(&self) -> bool {
        self.fresh_in_flight.is_some()
    }

    pub fn is_loading_more(&self) -> bool {
        self.more_in_flight.is_some()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// The last load-more came back empty.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Start a fresh search. `None` if the term is blank or a fresh search
    /// is already in flight.
    pub fn begin_search(&mut self, term: &str) -> Option<FetchRequest> {
        let term = term.trim();
        if term.is_empty() {
            return None;
        }
        if let Some(ticket) = self.fresh_in_flight {
            debug!("[discover] fresh search rejected, ticket {} in flight", ticket);
            return None;
        }

        self.generation += 1;
        self.session.term = term.to_string();
        self.session.offset = 0;
        self.last_error = None;
        self.exhausted = false;

        let ticket = self.issue_ticket();
        self.fresh_in_flight = Some(ticket);
        info!(
            "[discover] search {:?} (generation {})",
            term, self.generation
        );
        Some(FetchRequest {
            ticket,
            generation: self.generation,
            slot: SearchSlot::Fresh,
            term: term.to_string(),
            cursor: 0,
            known_ids: HashSet::new(),
        })
    }

    /// Continue the current term. `None` while anything is in flight or
    /// before the first search.
    pub fn begin_load_more(&mut self) -> Option<FetchRequest> {
        if self.session.term.is_empty() {
            return None;
        }
        if self.fresh_in_flight.is_some() || self.more_in_flight.is_some() {
            debug!("[discover] load-more rejected, fetch in flight");
            return None;
        }

        let ticket = self.issue_ticket();
        self.more_in_flight = Some(ticket);
        Some(FetchRequest {
            ticket,
            generation: self.generation,
            slot: SearchSlot::LoadMore,
            term: self.session.term.clone(),
            cursor: self.session.offset,
            known_ids: self.session.known_ids(),
        })
    }

    /// Re-issue the fresh search for the current term.
    pub fn retry(&mut self) -> Option<FetchRequest> {
        let term = self.session.term.clone();
        self.begin_search(&term)
    }

    pub fn apply(
        &mut self,
        request: &FetchRequest,
        result: Result<FetchPage, FetchError>,
    ) -> SearchUpdate {
        let slot = match request.slot {
            SearchSlot::Fresh => &mut self.fresh_in_flight,
            SearchSlot::LoadMore => &mut self.more_in_flight,
        };
        if *slot == Some(request.ticket) {
            *slot = None;
        }

        if request.generation != self.generation {
            debug!(
                "[discover] dropping {:?} result for {:?} (generation {} < {})",
                request.slot, request.term, request.generation, self.generation
            );
            return SearchUpdate::Stale;
        }

        match (request.slot, result) {
            (SearchSlot::Fresh, Ok(page)) => {
                self.session.offset = page.next_cursor;
                self.session.results = page.songs;
                self.exhausted = page.exhausted;
                if self.session.results.is_empty() {
                    self.last_error = Some(format!("No songs found for \"{}\"", request.term));
                    SearchUpdate::NoResults {
                        term: request.term.clone(),
                    }
                } else {
                    SearchUpdate::Replaced {
                        term: request.term.clone(),
                        count: self.session.results.len(),
                    }
                }
            }
            (SearchSlot::LoadMore, Ok(page)) => {
                self.session.offset = page.next_cursor;
                let known = self.session.known_ids();
                let added: Vec<Song> = page
                    .songs
                    .into_iter()
                    .filter(|s| !known.contains(&s.track_id))
                    .collect();
                if added.is_empty() {
                    self.exhausted = true;
                    return SearchUpdate::Exhausted;
                }
                let count = added.len();
                self.session.results.extend(added);
                self.exhausted = page.exhausted;
                SearchUpdate::Appended { count }
            }
            (slot, Err(e)) => {
                warn!("[discover] {:?} fetch for {:?} failed: {}", slot, request.term, e);
                if slot == SearchSlot::Fresh {
                    self.session.results.clear();
                    self.session.offset = 0;
                }
                let message = e.to_string();
                self.last_error = Some(message.clone());
                SearchUpdate::Failed {
                    term: request.term.clone(),
                    message,
                }
            }
        }
    }

    fn issue_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::fixtures::song;

    fn page(ids: &[i64], next_cursor: usize) -> FetchPage {
        FetchPage {
            songs: ids.iter().map(|&id| song(id, "A", &format!("T{id}"))).collect(),
            next_cursor,
            exhausted: false,
            attempts: 1,
        }
    }

    #[test]
    fn test_fresh_search_replaces_results() {
        let mut c = SearchController::new();
        let req = c.begin_search("Pop").unwrap();
        assert!(c.is_loading());
        let update = c.apply(&req, Ok(page(&[1, 2, 3], 50)));
        assert_eq!(
            update,
            SearchUpdate::Replaced {
                term: "Pop".into(),
                count: 3
            }
        );
        assert!(!c.is_loading());
        assert_eq!(c.offset(), 50);

        let req = c.begin_search("Rock").unwrap();
        c.apply(&req, Ok(page(&[9], 50)));
        assert_eq!(c.results().len(), 1);
        assert_eq!(c.term(), "Rock");
    }

    #[test]
    fn test_same_slot_rejected_while_in_flight() {
        let mut c = SearchController::new();
        let first = c.begin_search("Pop").unwrap();
        assert!(c.begin_search("Rock").is_none());
        assert!(c.begin_load_more().is_none());
        c.apply(&first, Ok(page(&[1], 50)));

        let more = c.begin_load_more().unwrap();
        assert!(c.begin_load_more().is_none());
        c.apply(&more, Ok(page(&[2], 100)));
        assert!(c.begin_load_more().is_some());
    }

    #[test]
    fn test_slow_load_more_does_not_overwrite_newer_search() {
        let mut c = SearchController::new();
        let first = c.begin_search("Pop").unwrap();
        c.apply(&first, Ok(page(&[1, 2], 50)));

        let more = c.begin_load_more().unwrap();
        let fresh = c.begin_search("Jazz").unwrap();
        c.apply(&fresh, Ok(page(&[100, 101], 50)));

        assert_eq!(c.apply(&more, Ok(page(&[3, 4], 100))), SearchUpdate::Stale);
        let ids: Vec<_> = c.results().iter().map(|s| s.track_id).collect();
        assert_eq!(ids, vec![100, 101]);
        assert_eq!(c.offset(), 50);
        assert!(!c.is_loading_more());
    }

    #[test]
    fn test_fresh_with_nothing_new_reports_no_results() {
        let mut c = SearchController::new();
        let req = c.begin_search("zzzz").unwrap();
        let update = c.apply(&req, Ok(page(&[], 0)));
        assert_eq!(update, SearchUpdate::NoResults { term: "zzzz".into() });
        assert_eq!(c.last_error(), Some("No songs found for \"zzzz\""));
    }

    #[test]
    fn test_load_more_with_nothing_new_is_silent() {
        let mut c = SearchController::new();
        let req = c.begin_search("Pop").unwrap();
        c.apply(&req, Ok(page(&[1], 50)));
        let more = c.begin_load_more().unwrap();
        assert_eq!(c.apply(&more, Ok(page(&[], 300))), SearchUpdate::Exhausted);
        assert!(c.last_error().is_none());
        assert!(c.is_exhausted());
        assert_eq!(c.results().len(), 1);
        assert_eq!(c.offset(), 300);
    }

    #[test]
    fn test_failure_keeps_term_for_retry() {
        let mut c = SearchController::new();
        let req = c.begin_search("Indie").unwrap();
        let update = c.apply(&req, Err(FetchError::Status(503)));
        assert!(matches!(update, SearchUpdate::Failed { ref term, .. } if term == "Indie"));
        assert!(c.last_error().is_some());

        let retry = c.retry().unwrap();
        assert_eq!(retry.term, "Indie");
        assert_eq!(retry.cursor, 0);
        assert!(c.last_error().is_none());
    }

    #[test]
    fn test_load_more_failure_keeps_results() {
        let mut c = SearchController::new();
        let req = c.begin_search("Pop").unwrap();
        c.apply(&req, Ok(page(&[1, 2], 50)));
        let more = c.begin_load_more().unwrap();
        assert_eq!(more.known_ids.len(), 2);
        c.apply(&more, Err(FetchError::Transport("reset".into())));
        assert_eq!(c.results().len(), 2);
        assert_eq!(c.offset(), 50);
    }

    #[test]
    fn test_blank_term_ignored() {
        let mut c = SearchController::new();
        assert!(c.begin_search("   ").is_none());
        assert!(c.begin_load_more().is_none());
    }

    #[test]
    fn test_surprise_term_is_from_list() {
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            assert!(SURPRISE_TERMS.contains(&surprise_term(&mut rng)));
        }
    }
}
