//! PlaybackSession: what is audible, and where "next" goes.
//!
//! There is exactly one session per process. Navigation is always resolved
//! against an active list passed in by the caller; the session never infers
//! which view is on screen.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::history::RecentlyPlayed;
use crate::song::{RepeatMode, Song};

/// Serializable view of the session for snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub current: Option<Song>,
    pub playing: bool,
    pub shuffle: bool,
    pub repeat: RepeatMode,
}

/// Result of `play`.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayOutcome {
    /// A different song became current and started playing.
    Started(Song),
    /// The song was already current; the playing flag flipped.
    Toggled { playing: bool },
}

pub struct PlaybackSession {
    current: Option<Song>,
    playing: bool,
    shuffle: bool,
    repeat: RepeatMode,
    recent: RecentlyPlayed,
    rng: StdRng,
}

impl PlaybackSession {
    pub fn new(recent: RecentlyPlayed) -> Self {
        Self::with_rng(recent, StdRng::from_entropy())
    }

    /// Deterministic shuffle for tests and reproducible sessions.
    pub fn with_seed(recent: RecentlyPlayed, seed: u64) -> Self {
        Self::with_rng(recent, StdRng::seed_from_u64(seed))
    }

    fn with_rng(recent: RecentlyPlayed, rng: StdRng) -> Self {
        Self {
            current: None,
            playing: false,
            shuffle: false,
            repeat: RepeatMode::Off,
            recent,
            rng,
        }
    }

    pub fn current(&self) -> Option<&Song> {
        self.current.as_ref()
    }

    pub fn is_idle(&self) -> bool {
        self.current.is_none()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    pub fn repeat(&self) -> RepeatMode {
        self.repeat
    }

    pub fn recent(&self) -> &RecentlyPlayed {
        &self.recent
    }

    pub fn state(&self) -> PlaybackState {
        PlaybackState {
            current: self.current.clone(),
            playing: self.playing,
            shuffle: self.shuffle,
            repeat: self.repeat,
        }
    }

    pub fn play(&mut self, song: &Song) -> PlayOutcome {
        if self.current.as_ref().map(|c| c.track_id) == Some(song.track_id) {
            self.playing = !self.playing;
            return PlayOutcome::Toggled {
                playing: self.playing,
            };
        }
        self.start(song.clone());
        PlayOutcome::Started(song.clone())
    }

    /// Flip the playing flag of the current song. No-op when idle.
    pub fn toggle_playing(&mut self) -> Option<bool> {
        self.current.as_ref()?;
        self.playing = !self.playing;
        Some(self.playing)
    }

    /// Force the playing flag, e.g. when a sleep timer pauses playback.
    pub fn set_playing(&mut self, playing: bool) {
        if self.current.is_some() {
            self.playing = playing;
        }
    }

    pub fn next(&mut self, active: &[Song]) -> Option<Song> {
        self.step(active, Direction::Forward)
    }

    pub fn previous(&mut self, active: &[Song]) -> Option<Song> {
        self.step(active, Direction::Backward)
    }

    /// With repeat-one the device loops the track itself, so nothing changes here.
    pub fn on_track_ended(&mut self, active: &[Song]) -> Option<Song> {
        if self.repeat == RepeatMode::One {
            return None;
        }
        self.next(active)
    }

    pub fn toggle_shuffle(&mut self) -> bool {
        self.shuffle = !self.shuffle;
        self.shuffle
    }

    pub fn cycle_repeat(&mut self) -> RepeatMode {
        self.repeat = self.repeat.cycle();
        self.repeat
    }

    fn step(&mut self, active: &[Song], direction: Direction) -> Option<Song> {
        let current_id = self.current.as_ref()?.track_id;
        if active.is_empty() {
            return None;
        }

        // Uniform over the whole list, direction ignored. Landing on the
        // current song again is allowed.
        let target = if self.shuffle {
            let idx = self.rng.gen_range(0..active.len());
            debug!("[session] shuffle picked {}/{}", idx, active.len());
            active[idx].clone()
        } else {
            let Some(pos) = active.iter().position(|s| s.track_id == current_id) else {
                debug!("[session] current track {} not in active list", current_id);
                return None;
            };
            let len = active.len();
            let idx = match direction {
                Direction::Forward => (pos + 1) % len,
                Direction::Backward => (pos + len - 1) % len,
            };
            active[idx].clone()
        };

        self.start(target.clone());
        Some(target)
    }

    fn start(&mut self, song: Song) {
        self.recent.push(&song);
        self.current = Some(song);
        self.playing = true;
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Forward,
    Backward,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::Persistence;
    use crate::song::fixtures::song;

    fn session() -> PlaybackSession {
        PlaybackSession::with_seed(RecentlyPlayed::load(Persistence::in_memory()), 7)
    }

    fn abc() -> Vec<Song> {
        vec![song(1, "X", "A"), song(2, "X", "B"), song(3, "X", "C")]
    }

    #[test]
    fn test_play_new_song_starts_and_records() {
        let mut s = session();
        let list = abc();
        assert_eq!(s.play(&list[0]), PlayOutcome::Started(list[0].clone()));
        assert!(s.is_playing());
        assert_eq!(s.recent().entries()[0].track_id, 1);
    }

    #[test]
    fn test_play_current_song_toggles() {
        let mut s = session();
        let list = abc();
        s.play(&list[0]);
        assert_eq!(s.play(&list[0]), PlayOutcome::Toggled { playing: false });
        assert_eq!(s.play(&list[0]), PlayOutcome::Toggled { playing: true });
        assert_eq!(s.recent().len(), 1);
    }

    #[test]
    fn test_sequential_neighbours_wrap() {
        let list = abc();

        let mut s = session();
        s.play(&list[1]);
        assert_eq!(s.next(&list).map(|x| x.track_id), Some(3));

        let mut s = session();
        s.play(&list[1]);
        assert_eq!(s.previous(&list).map(|x| x.track_id), Some(1));

        let mut s = session();
        s.play(&list[2]);
        assert_eq!(s.next(&list).map(|x| x.track_id), Some(1));
        assert_eq!(s.previous(&list).map(|x| x.track_id), Some(3));
    }

    #[test]
    fn test_navigation_forces_playing() {
        let list = abc();
        let mut s = session();
        s.play(&list[0]);
        s.toggle_playing();
        assert!(!s.is_playing());
        s.next(&list);
        assert!(s.is_playing());
    }

    #[test]
    fn test_next_is_noop_when_current_not_in_list() {
        let list = abc();
        let mut s = session();
        s.play(&song(42, "Y", "Elsewhere"));
        assert!(s.next(&list).is_none());
        assert_eq!(s.current().map(|c| c.track_id), Some(42));
    }

    #[test]
    fn test_next_is_noop_when_idle_or_empty() {
        let mut s = session();
        assert!(s.next(&abc()).is_none());
        s.play(&song(1, "X", "A"));
        assert!(s.next(&[]).is_none());
    }

    #[test]
    fn test_shuffle_picks_from_active_list() {
        let list = abc();
        let mut s = session();
        s.play(&song(42, "Y", "Elsewhere"));
        s.toggle_shuffle();
        for _ in 0..50 {
            let picked = s.next(&list).unwrap();
            assert!(list.iter().any(|x| x.track_id == picked.track_id));
            let picked = s.previous(&list).unwrap();
            assert!(list.iter().any(|x| x.track_id == picked.track_id));
        }
        assert!(s.recent().len() <= 10);
    }

    #[test]
    fn test_shuffle_landing_on_current_still_plays() {
        let only = song(1, "X", "A");
        let mut s = session();
        s.play(&only);
        s.toggle_shuffle();
        s.toggle_playing();
        assert!(!s.is_playing());

        let picked = s.next(std::slice::from_ref(&only)).unwrap();
        assert_eq!(picked.track_id, 1);
        assert!(s.is_playing());
        assert_eq!(s.recent().len(), 1);
        assert_eq!(s.recent().entries()[0].track_id, 1);
    }

    #[test]
    fn test_shuffle_pick_is_recorded_in_recent() {
        let list = vec![song(1, "X", "A")];
        let mut s = session();
        s.play(&song(2, "X", "B"));
        s.toggle_shuffle();

        s.previous(&list);
        let ids: Vec<_> = s.recent().entries().iter().map(|x| x.track_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_track_end_honours_repeat_one() {
        let list = abc();
        let mut s = session();
        s.play(&list[0]);
        s.cycle_repeat();
        s.cycle_repeat();
        assert_eq!(s.repeat(), RepeatMode::One);
        assert!(s.on_track_ended(&list).is_none());
        assert_eq!(s.current().map(|c| c.track_id), Some(1));

        s.cycle_repeat();
        assert_eq!(s.on_track_ended(&list).map(|x| x.track_id), Some(2));
    }

    #[test]
    fn test_flags_do_not_touch_current() {
        let list = abc();
        let mut s = session();
        s.play(&list[1]);
        let before = s.state();
        s.toggle_shuffle();
        s.cycle_repeat();
        s.cycle_repeat();
        s.cycle_repeat();
        s.toggle_shuffle();
        assert_eq!(s.state(), before);
    }
}
