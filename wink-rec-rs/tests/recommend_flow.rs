use std::collections::HashSet;
use std::path::PathBuf;

use wink_rec::corpus::{self, Track};
use wink_rec::session::{RecommendedTrack, Turn};
use wink_rec::{
    AudioFeatureRanker, Config, EmbeddingMode, HashingBackend, HistoryEmbedder, InMemorySongIndex,
    JsonSessionStore, KeywordSet, Recommender, SessionHistory, SongIndex, Strategy, TaggedSong,
};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn fixture_config() -> Config {
    let mut cfg = Config::default();
    cfg.paths.tagged_corpus = fixture("tagged_songs.json");
    cfg.paths.audio_corpus = fixture("audio_features.csv");
    cfg
}

fn history(sets: &[&str]) -> SessionHistory {
    sets.iter().map(|s| KeywordSet::parse(s)).collect()
}

fn mood_only(id: &str, album: &str, mood: &str) -> TaggedSong {
    TaggedSong {
        track_id: id.into(),
        track_name: id.into(),
        artist_name: "Artist".into(),
        album_name: album.into(),
        genre_tags: None,
        mood_tags: Some(mood.into()),
        duration: None,
        url: None,
    }
}

#[test]
fn weighted_history_prefers_latest_turn() {
    let backend = HashingBackend::default();
    let index = InMemorySongIndex::build(
        &backend,
        vec![
            mood_only("B", "Album B", "rain calm"),
            mood_only("A", "Album A", "night jazzy dreamy"),
        ],
    )
    .expect("index");
    let h = history(&["rain calm", "night jazzy dreamy"]);
    let user = HistoryEmbedder::new(&backend)
        .embed(&h, EmbeddingMode::Weighted)
        .expect("embed");

    let hits = index.search_by_vector(&user, 2).expect("search");
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].0.track_id, "A");
    assert_eq!(hits[1].0.track_id, "B");
    // 1.0 vs 0.5 weight on orthogonal turns
    let sim_a = 1.0 - hits[0].1;
    let sim_b = 1.0 - hits[1].1;
    assert!((sim_a / sim_b - 2.0).abs() < 1e-3, "{sim_a} vs {sim_b}");
}

#[test]
fn tag_search_on_fixture_corpus() {
    let r = Recommender::new(HashingBackend::default(), fixture_config());
    assert_eq!(r.index().expect("index").len(), 8);

    let rec = r
        .recommend(&history(&["night jazzy dreamy"]), &HashSet::new(), Strategy::TagSearch)
        .expect("recommend");
    assert_eq!(rec.songs.len(), 3);
    assert_eq!(rec.songs[0].id(), "track_0003");
    let albums: HashSet<&str> = rec.songs.iter().map(|c| c.album()).collect();
    assert_eq!(albums.len(), rec.songs.len());
    for w in rec.songs.windows(2) {
        assert!(w[0].score >= w[1].score);
    }
}

#[test]
fn session_turns_exclude_seen_tracks() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = JsonSessionStore::new(dir.path());
    let session = store.create().expect("create");
    let r = Recommender::new(HashingBackend::default(), fixture_config());

    let mut seen_so_far = HashSet::new();
    for _ in 0..2 {
        let record = store.record(&session.session_id).expect("record");
        let seen = record.seen_track_ids();
        let kw = KeywordSet::parse("calm rain");
        let mut h = record.history();
        h.push(kw.clone());

        let rec = r.recommend(&h, &seen, Strategy::TagSearch).expect("recommend");
        assert!(!rec.songs.is_empty());
        for c in &rec.songs {
            assert!(!seen.contains(c.id()), "{} was already recommended", c.id());
            seen_so_far.insert(c.id().to_string());
        }

        let mut turn = Turn::new(kw);
        turn.recommended = rec
            .songs
            .iter()
            .map(|c| RecommendedTrack {
                id: c.id().to_string(),
                title: c.title().to_string(),
                artist: c.artist().to_string(),
                score: c.score,
            })
            .collect();
        store.record_turn(&session.session_id, turn).expect("turn");
    }

    assert_eq!(store.seen_track_ids(&session.session_id).expect("seen"), seen_so_far);
    assert_eq!(store.record(&session.session_id).expect("record").turns.len(), 2);
}

#[test]
fn album_blocklist_applies_to_fixture() {
    let mut cfg = fixture_config();
    cfg.postprocess.excluded_album_substrings = vec!["fly".into()];
    let r = Recommender::new(HashingBackend::default(), cfg);
    let rec = r
        .recommend(&history(&["calm"]), &HashSet::new(), Strategy::TagSearch)
        .expect("recommend");
    assert!(rec.songs.iter().all(|c| c.id() != "track_0006"));
    assert_eq!(rec.songs[0].id(), "track_0001");
}

#[test]
fn audio_strategy_on_fixture_corpus() {
    let cfg = fixture_config();
    let songs = corpus::load_audio(&cfg.paths.audio_corpus).expect("load");
    assert_eq!(songs.len(), 7);
    let usable = AudioFeatureRanker::new(&cfg.audio).usable_rows(&songs);
    let usable_ids: Vec<&str> = usable.iter().map(|s| s.id.as_str()).collect();
    // a5 lacks energy, a6 repeats a2's artist and title
    assert_eq!(usable_ids, ["a1", "a2", "a3", "a4", "a7"]);

    let r = Recommender::new(HashingBackend::default(), cfg);
    let rec = r
        .recommend(
            &history(&["rain calm", "night jazzy dreamy"]),
            &HashSet::new(),
            Strategy::AudioFeature,
        )
        .expect("recommend");
    let sims = rec.feature_similarities.as_ref().expect("similarities");
    assert_eq!(sims.len(), 11);
    assert_eq!(rec.songs.len(), 3);
    assert!(rec.songs.iter().all(|c| c.id() != "a5" && c.id() != "a6"));
}
