use chrono::{DateTime, TimeZone, Utc};
use playlist_melt::melt::summary::rules;
use playlist_melt::melt::{dedup_by_natural_key, TrackExtractor};
use playlist_melt::{Cell, EntityKind, FatalInputError, MeltConfig, PlaylistMelter, Table, ViolationKind};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::HashSet;

fn clock() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 6, 1, 0, 0).unwrap()
}

fn melter() -> PlaylistMelter {
    PlaylistMelter::new(MeltConfig::default()).with_clock(clock)
}

fn entry(song_id: &str, album_id: &str, artist_ids: &[&str], popularity: Value) -> Value {
    let artists: Vec<Value> = artist_ids
        .iter()
        .map(|id| {
            json!({
                "id": id,
                "name": format!("Artist {}", id),
                "external_urls": {"spotify": format!("https://open.spotify.com/artist/{}", id)}
            })
        })
        .collect();

    json!({
        "added_at": "2024-01-05T10:00:00Z",
        "track": {
            "id": song_id,
            "name": format!("Song {}", song_id),
            "duration_ms": 215000,
            "popularity": popularity,
            "external_urls": {"spotify": format!("https://open.spotify.com/track/{}", song_id)},
            "album": {
                "id": album_id,
                "name": "Shared Album",
                "release_date": "2023-09-01",
                "total_tracks": 12,
                "album_type": "album",
                "label": "Indie",
                "external_urls": {"spotify": format!("https://open.spotify.com/album/{}", album_id)}
            },
            "artists": artists
        }
    })
}

fn document(entries: Vec<Value>) -> Value {
    json!({
        "playlist_id": "37i9dQZF1DXcBWIGoYBM5M",
        "extracted_at": "2024-01-06T00:00:00",
        "tracks": entries
    })
}

fn text_column(table: &Table, name: &str) -> Vec<String> {
    table
        .column(name)
        .unwrap()
        .into_iter()
        .map(|cell| cell.as_text().unwrap_or_default().to_string())
        .collect()
}

#[test]
fn test_end_to_end_scenario() {
    let doc = document(vec![
        entry("s1", "al1", &["ar1"], json!(60)),
        entry("s2", "al1", &["ar1"], json!(40)),
        entry("s1", "al1", &["ar1"], json!(95)),
    ]);

    let output = melter().transform(&doc).unwrap();

    assert_eq!(output.albums.len(), 1);
    assert_eq!(output.artists.len(), 1);
    assert_eq!(output.songs.len(), 2);

    assert_eq!(text_column(&output.songs, "song_id"), vec!["s1", "s2"]);
    assert_eq!(output.songs.cell(0, "popularity"), Some(&Cell::Int(60)));

    let summary = &output.summary;
    assert_eq!(summary.entries_seen, 3);
    assert_eq!(summary.duplicates_removed.songs, 1);
    assert_eq!(summary.duplicates_removed.albums, 2);
    assert_eq!(summary.conflicting_duplicates.songs, 1);
    assert_eq!(summary.output.total(), 4);
    assert_eq!(summary.rows_dropped(), 0);
}

#[test]
fn test_shared_album_collapses_to_one_row() {
    let doc = document(vec![
        entry("s1", "al1", &["ar1"], json!(10)),
        entry("s2", "al1", &["ar2"], json!(20)),
    ]);

    let output = melter().transform(&doc).unwrap();

    assert_eq!(text_column(&output.albums, "album_id"), vec!["al1"]);
    assert_eq!(output.summary.conflicting_duplicates.albums, 0);
}

#[test]
fn test_missing_popularity_drops_song() {
    let mut e = entry("s1", "al1", &["ar1"], json!(10));
    e["track"].as_object_mut().unwrap().remove("popularity");

    let output = melter().transform(&document(vec![e])).unwrap();

    assert!(output.songs.is_empty());
    assert_eq!(output.albums.len(), 1);
    assert_eq!(
        output
            .summary
            .violation_count(ViolationKind::MissingRequiredField, EntityKind::Song),
        1
    );
    assert_eq!(output.summary.rule_count(rules::MISSING_POPULARITY), 1);
}

#[test]
fn test_invalid_release_date_is_nulled_not_dropped() {
    let mut e = entry("s1", "al1", &["ar1"], json!(10));
    e["track"]["album"]["release_date"] = json!("invalid-date");

    let output = melter().transform(&document(vec![e])).unwrap();

    assert_eq!(output.albums.len(), 1);
    assert_eq!(output.albums.cell(0, "release_date"), Some(&Cell::Null));
    assert_eq!(
        output.albums.cell(0, "album_name"),
        Some(&Cell::Text("Shared Album".to_string()))
    );
    assert_eq!(output.songs.len(), 1);
    assert_eq!(
        output
            .summary
            .violation_count(ViolationKind::UnparseableDate, EntityKind::Album),
        1
    );
}

#[test]
fn test_featured_artists_kept_in_dimension() {
    let doc = document(vec![entry("s1", "al1", &["main", "featured"], json!(10))]);

    let output = melter().transform(&doc).unwrap();

    assert_eq!(text_column(&output.artists, "artist_id"), vec!["main", "featured"]);
    assert_eq!(text_column(&output.songs, "artist_id"), vec!["main"]);
}

#[test]
fn test_non_object_first_artist_orphans_song() {
    let mut e = entry("s1", "al1", &["feat"], json!(10));
    e["track"]["artists"] = json!([null, {"id": "feat", "name": "Featured"}]);

    let output = melter().transform(&document(vec![e])).unwrap();

    assert!(output.songs.is_empty());
    assert_eq!(text_column(&output.artists, "artist_id"), vec!["feat"]);
    assert_eq!(output.summary.rule_count(rules::ORPHAN_ARTIST), 1);
}

#[test]
fn test_orphan_song_dropped() {
    let mut e = entry("s1", "al1", &["ar1"], json!(10));
    e["track"]["album"].as_object_mut().unwrap().remove("id");

    let output = melter().transform(&document(vec![e, entry("s2", "al2", &["ar1"], json!(5))])).unwrap();

    assert_eq!(text_column(&output.songs, "song_id"), vec!["s2"]);
    assert_eq!(output.summary.rule_count(rules::ORPHAN_ALBUM), 1);
    assert_eq!(output.summary.rule_count(rules::MISSING_ALBUM_ID), 1);
}

#[test]
fn test_malformed_entries_do_not_fail_batch() {
    let doc = document(vec![
        json!({"added_at": "2024-01-05T10:00:00Z", "track": null}),
        json!({"added_at": "2024-01-05T10:00:00Z"}),
        entry("s1", "al1", &["ar1"], json!(10)),
    ]);

    let output = melter().transform(&doc).unwrap();

    assert_eq!(output.summary.malformed_entries, 2);
    assert_eq!(output.summary.rule_count(rules::MALFORMED_ENTRY), 2);
    assert_eq!(output.songs.len(), 1);
}

#[test]
fn test_fatal_document_shapes() {
    let m = melter();

    assert!(matches!(
        m.transform(&json!({"playlist_id": "x"})),
        Err(FatalInputError::MissingTracks)
    ));
    assert!(matches!(
        m.transform(&json!({"tracks": "nope"})),
        Err(FatalInputError::TracksNotAnArray(_))
    ));
    assert!(matches!(m.transform(&json!(42)), Err(FatalInputError::NotAnObject(_))));
    assert!(matches!(m.transform_str("not json"), Err(FatalInputError::InvalidJson(_))));
}

#[test]
fn test_empty_playlist_produces_empty_tables() {
    let output = melter().transform(&document(vec![])).unwrap();

    assert!(output.albums.is_empty());
    assert!(output.artists.is_empty());
    assert!(output.songs.is_empty());
    assert!(output.summary.violations.is_empty());
}

#[test]
fn test_summary_serializes() {
    let output = melter()
        .transform(&document(vec![entry("s1", "al1", &["ar1"], json!(500))]))
        .unwrap();

    let json = serde_json::to_value(&output.summary).unwrap();

    assert_eq!(json["playlist_id"], "37i9dQZF1DXcBWIGoYBM5M");
    assert_eq!(json["violations"][0]["kind"], "RangeViolation");
    assert_eq!(json["violations"][0]["entity"], "song");
    assert_eq!(json["output"]["songs"], 0);
}

fn arb_entry() -> impl Strategy<Value = Value> {
    (
        prop::option::of(0..6u8),
        0..3u8,
        prop::collection::vec(prop::option::of(0..4u8), 0..3),
        prop::option::of(-20..130i64),
        prop::option::of(-10..400_000i64),
        prop::bool::ANY,
    )
        .prop_map(|(song, album, artists, popularity, duration, bad_date)| {
            let artists: Vec<Value> = artists
                .into_iter()
                .map(|a| match a {
                    Some(a) => json!({"id": format!("ar{}", a), "name": format!("n{}", a)}),
                    None => json!({"name": "anonymous"}),
                })
                .collect();
            let mut track = json!({
                "name": "t",
                "album": {
                    "id": format!("al{}", album),
                    "release_date": if bad_date { "someday" } else { "2021-03" }
                },
                "artists": artists
            });
            if let Some(song) = song {
                track["id"] = json!(format!("s{}", song));
            }
            if let Some(p) = popularity {
                track["popularity"] = json!(p);
            }
            if let Some(d) = duration {
                track["duration_ms"] = json!(d);
            }
            json!({"added_at": "2024-01-05T10:00:00Z", "track": track})
        })
}

proptest! {
    #[test]
    fn prop_output_is_consistent(entries in prop::collection::vec(arb_entry(), 0..25)) {
        let output = melter().transform(&document(entries)).unwrap();

        let album_ids: HashSet<String> = text_column(&output.albums, "album_id").into_iter().collect();
        let artist_ids: HashSet<String> = text_column(&output.artists, "artist_id").into_iter().collect();
        let song_ids = text_column(&output.songs, "song_id");

        prop_assert_eq!(album_ids.len(), output.albums.len());
        prop_assert_eq!(artist_ids.len(), output.artists.len());
        prop_assert_eq!(song_ids.iter().collect::<HashSet<_>>().len(), song_ids.len());

        for album_id in text_column(&output.songs, "album_id") {
            prop_assert!(album_ids.contains(&album_id));
        }
        for artist_id in text_column(&output.songs, "artist_id") {
            prop_assert!(artist_ids.contains(&artist_id));
        }
        for cell in output.songs.column("popularity").unwrap() {
            let p = cell.as_int().unwrap();
            prop_assert!((0..=100).contains(&p));
        }
        for cell in output.songs.column("duration_ms").unwrap() {
            prop_assert!(cell.as_int().unwrap() >= 0);
        }
        prop_assert!(output.summary.transformed_at >= output.summary.extracted_at);
    }

    #[test]
    fn prop_dedup_is_idempotent(entries in prop::collection::vec(arb_entry(), 0..25)) {
        let extraction = TrackExtractor::new().extract(&document(entries)).unwrap();

        let once = dedup_by_natural_key(extraction.artists().cloned());
        let twice = dedup_by_natural_key(once.rows.clone());

        prop_assert_eq!(&twice.rows, &once.rows);
        prop_assert_eq!(twice.duplicates_removed, 0);

        let songs_once = dedup_by_natural_key(extraction.songs().cloned());
        let songs_twice = dedup_by_natural_key(songs_once.rows.clone());
        prop_assert_eq!(songs_twice.rows, songs_once.rows);
    }
}
