//! Field and referential validation of deduplicated relations

use crate::melt::dates::{parse_release_date, parse_timestamp};
use crate::melt::summary::{rules, ViolationKind, ViolationLog};
use crate::melt::types::{Album, Artist, EntityKind, RawAlbum, RawArtist, RawSong, Song};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info};

/// Relations that passed validation, with the reasons anything was dropped or nulled
#[derive(Debug, Clone, Default)]
pub struct Validated {
    pub albums: Vec<Album>,
    pub artists: Vec<Artist>,
    pub songs: Vec<Song>,
    pub violations: ViolationLog,
}

/// Song that passed field rules but whose references are not yet checked
#[derive(Debug)]
struct TypedSong {
    song_id: String,
    song_name: Option<String>,
    duration_ms: u64,
    url: Option<String>,
    popularity: u8,
    song_added: Option<DateTime<Utc>>,
    album_id: Option<String>,
    artist_id: Option<String>,
}

/// Apply field rules, then referential integrity.
///
/// Albums and artists are never dropped here; only their optional fields may
/// be nulled. Songs are dropped for bad required fields or dangling references.
pub fn validate(albums: Vec<RawAlbum>, artists: Vec<RawArtist>, songs: Vec<RawSong>) -> Validated {
    let mut violations = ViolationLog::new();

    let albums: Vec<Album> = albums
        .into_iter()
        .map(|album| check_album(album, &mut violations))
        .collect();

    let artists: Vec<Artist> = artists.into_iter().map(check_artist).collect();

    let typed: Vec<TypedSong> = songs
        .into_iter()
        .filter_map(|song| check_song(song, &mut violations))
        .collect();

    let album_ids: HashSet<&str> = albums.iter().map(|a| a.album_id.as_str()).collect();
    let artist_ids: HashSet<&str> = artists.iter().map(|a| a.artist_id.as_str()).collect();

    let songs: Vec<Song> = typed
        .into_iter()
        .filter_map(|song| resolve_references(song, &album_ids, &artist_ids, &mut violations))
        .collect();

    info!(
        albums = albums.len(),
        artists = artists.len(),
        songs = songs.len(),
        "validated relations"
    );

    Validated {
        albums,
        artists,
        songs,
        violations,
    }
}

fn check_album(raw: RawAlbum, violations: &mut ViolationLog) -> Album {
    let release_date = raw.release_date.as_deref().and_then(|text| {
        let parsed = parse_release_date(text);
        if parsed.is_none() {
            violations.record(
                ViolationKind::UnparseableDate,
                EntityKind::Album,
                rules::UNPARSEABLE_RELEASE_DATE,
            );
            debug!(album_id = %raw.album_id, release_date = text, "nulling unparseable release_date");
        }
        parsed
    });

    let total_tracks = raw.total_tracks.as_ref().and_then(|value| {
        let parsed = whole_number(value).and_then(|n| u32::try_from(n).ok());
        if parsed.is_none() {
            violations.record(
                ViolationKind::InvalidOptionalField,
                EntityKind::Album,
                rules::INVALID_TOTAL_TRACKS,
            );
            debug!(album_id = %raw.album_id, %value, "nulling invalid total_tracks");
        }
        parsed
    });

    Album {
        album_id: raw.album_id,
        album_name: raw.album_name,
        release_date,
        total_tracks,
        album_url: raw.album_url,
        album_type: raw.album_type,
        label: raw.label,
    }
}

fn check_artist(raw: RawArtist) -> Artist {
    Artist {
        artist_id: raw.artist_id,
        artist_name: raw.artist_name,
        artist_url: raw.artist_url,
    }
}

fn check_song(raw: RawSong, violations: &mut ViolationLog) -> Option<TypedSong> {
    let duration_ms = match raw.duration_ms.as_ref() {
        None => {
            drop_song(&raw.song_id, ViolationKind::MissingRequiredField, rules::MISSING_DURATION, violations);
            return None;
        }
        Some(value) => match whole_number(value).and_then(|n| u64::try_from(n).ok()) {
            Some(duration) => duration,
            None => {
                drop_song(&raw.song_id, ViolationKind::RangeViolation, rules::INVALID_DURATION, violations);
                return None;
            }
        },
    };

    let popularity = match raw.popularity.as_ref() {
        None => {
            drop_song(&raw.song_id, ViolationKind::MissingRequiredField, rules::MISSING_POPULARITY, violations);
            return None;
        }
        Some(value) => match whole_number(value).filter(|n| (0..=100).contains(n)) {
            Some(popularity) => popularity as u8,
            None => {
                drop_song(&raw.song_id, ViolationKind::RangeViolation, rules::INVALID_POPULARITY, violations);
                return None;
            }
        },
    };

    let song_added = raw.song_added.as_deref().and_then(|text| {
        let parsed = parse_timestamp(text);
        if parsed.is_none() {
            violations.record(
                ViolationKind::UnparseableDate,
                EntityKind::Song,
                rules::UNPARSEABLE_SONG_ADDED,
            );
            debug!(song_id = %raw.song_id, song_added = text, "nulling unparseable song_added");
        }
        parsed
    });

    Some(TypedSong {
        song_id: raw.song_id,
        song_name: raw.song_name,
        duration_ms,
        url: raw.url,
        popularity,
        song_added,
        album_id: raw.album_id,
        artist_id: raw.artist_id,
    })
}

fn resolve_references(
    song: TypedSong,
    album_ids: &HashSet<&str>,
    artist_ids: &HashSet<&str>,
    violations: &mut ViolationLog,
) -> Option<Song> {
    let album_id = match song.album_id {
        Some(id) if album_ids.contains(id.as_str()) => id,
        _ => {
            drop_song(&song.song_id, ViolationKind::OrphanReference, rules::ORPHAN_ALBUM, violations);
            return None;
        }
    };

    let artist_id = match song.artist_id {
        Some(id) if artist_ids.contains(id.as_str()) => id,
        _ => {
            drop_song(&song.song_id, ViolationKind::OrphanReference, rules::ORPHAN_ARTIST, violations);
            return None;
        }
    };

    Some(Song {
        song_id: song.song_id,
        song_name: song.song_name,
        duration_ms: song.duration_ms,
        url: song.url,
        popularity: song.popularity,
        song_added: song.song_added,
        album_id,
        artist_id,
    })
}

fn drop_song(song_id: &str, kind: ViolationKind, rule: &str, violations: &mut ViolationLog) {
    violations.record(kind, EntityKind::Song, rule);
    debug!(song_id, ?kind, rule, "dropping song");
}

/// Integer value of a JSON number, accepting integral floats like `215000.0`
fn whole_number(value: &Value) -> Option<i64> {
    let Value::Number(n) = value else {
        return None;
    };
    if let Some(i) = n.as_i64() {
        return Some(i);
    }
    if n.as_u64().is_some() {
        // Beyond i64: certainly out of every domain we check
        return None;
    }
    n.as_f64()
        .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
        .map(|f| f as i64)
}
