mod common;

use std::sync::Arc;

use common::{records, ScriptedService};
use groove_core::context::{ActiveView, SessionContext};
use groove_core::history::RecentlyPlayed;
use groove_core::persist::{JsonFileStore, Persistence, FAVORITES_KEY, PLAYLISTS_KEY};
use groove_core::search::SearchFetcher;
use groove_core::session::PlaybackSession;
use groove_core::song::RepeatMode;

fn file_persistence(dir: &std::path::Path) -> Persistence {
    Persistence::new(Arc::new(JsonFileStore::new(dir.to_path_buf())))
}

async fn searched(ctx: &mut SessionContext, term: &str) {
    let service = ScriptedService::new().page(0, records(100, 5));
    let fetcher = SearchFetcher::new(50, 5);
    let req = ctx.discover.begin_search(term).unwrap();
    let result = req.run(&fetcher, &service).await;
    ctx.discover.apply(&req, result);
    ctx.history.record(term);
}

#[tokio::test]
async fn road_trip_playlist_gets_pending_song_and_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut ctx = SessionContext::load(file_persistence(dir.path()));
        searched(&mut ctx, "Road songs").await;
        let song = ctx.discover.results()[2].clone();

        ctx.stage_for_playlist(song.clone());
        let playlist = ctx.create_playlist("Road Trip").unwrap();
        assert_eq!(playlist.songs.len(), 1);
        assert_eq!(playlist.songs[0].track_id, song.track_id);

        ctx.library.toggle_favorite(&song);
        ctx.playback.play(&song);
        ctx.set_volume(0.35);
    }

    let ctx = SessionContext::load(file_persistence(dir.path()));
    assert_eq!(ctx.library.playlists().len(), 1);
    assert_eq!(ctx.library.playlists()[0].name, "Road Trip");
    assert_eq!(ctx.library.favorites().len(), 1);
    assert_eq!(ctx.playback.recent().len(), 1);
    assert_eq!(ctx.history.terms().to_vec(), vec!["Road songs".to_string()]);
    assert!((ctx.volume() - 0.35).abs() < 1e-6);
    assert!(ctx.playback.is_idle());
}

#[tokio::test]
async fn corrupt_store_files_load_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(format!("{FAVORITES_KEY}.json")), "{not json").unwrap();
    std::fs::write(dir.path().join(format!("{PLAYLISTS_KEY}.json")), "[{\"id\":1}]").unwrap();
    std::fs::write(dir.path().join("groovewave_volume.json"), "loud").unwrap();

    let ctx = SessionContext::load(file_persistence(dir.path()));
    assert!(ctx.library.favorites().is_empty());
    assert!(ctx.library.playlists().is_empty());
    assert_eq!(ctx.volume(), 1.0);
}

#[tokio::test]
async fn navigation_follows_the_view_it_is_given() {
    let persistence = Persistence::in_memory();
    let recent = RecentlyPlayed::load(persistence.clone());
    let mut ctx = SessionContext::with_playback(persistence, PlaybackSession::with_seed(recent, 3));
    searched(&mut ctx, "Pop").await;

    let results = ctx.discover.results().to_vec();
    ctx.library.toggle_favorite(&results[4]);
    ctx.library.toggle_favorite(&results[0]);

    ctx.playback.play(&results[0]);
    let view = ActiveView::Favorites;
    let list = ctx.active_list(&view).to_vec();
    let next = ctx.playback.next(&list).unwrap();
    assert_eq!(next.track_id, results[4].track_id);

    let list = ctx.active_list(&ActiveView::Discover).to_vec();
    let prev = ctx.playback.previous(&list).unwrap();
    assert_eq!(prev.track_id, results[3].track_id);

    ctx.playback.cycle_repeat();
    assert_eq!(ctx.playback.repeat(), RepeatMode::All);
    let wrapped = ctx.playback.on_track_ended(&list).unwrap();
    assert_eq!(wrapped.track_id, results[4].track_id);
    let wrapped = ctx.playback.on_track_ended(&list).unwrap();
    assert_eq!(wrapped.track_id, results[0].track_id);

    assert!(ctx.playback.recent().len() <= 10);
    assert_eq!(ctx.playback.recent().entries()[0].track_id, results[0].track_id);
}

#[tokio::test]
async fn deleting_active_playlist_leaves_empty_list() {
    let mut ctx = SessionContext::load(Persistence::in_memory());
    searched(&mut ctx, "Indie").await;
    let song = ctx.discover.results()[0].clone();
    let playlist = ctx.create_playlist("Gone soon").unwrap();
    assert!(ctx.library.add_song_to_playlist(&playlist.id, &song));
    assert!(!ctx.library.add_song_to_playlist(&playlist.id, &song));

    let view = ActiveView::Playlist(playlist.id.clone());
    assert_eq!(ctx.active_list(&view).len(), 1);
    ctx.library.delete_playlist(&playlist.id);
    assert!(ctx.active_list(&view).is_empty());
    assert!(!ctx.library.remove_song_from_playlist(&playlist.id, song.track_id));
}
