use crate::error::{json_type_name, FatalInputError};
use crate::melt::summary::{rules, ViolationKind, ViolationLog};
use crate::melt::types::{EntityKind, RawAlbum, RawArtist, RawSong, RawTrackRecord};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Flat records pulled out of one playlist document
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub playlist_id: Option<String>,

    /// `extracted_at` (or the legacy `extraction_timestamp`) as written in the document
    pub extracted_at: Option<String>,

    pub entries_seen: usize,
    pub malformed_entries: usize,

    /// One record per well-formed entry, in document order
    pub records: Vec<RawTrackRecord>,

    pub violations: ViolationLog,

    /// Absent optional fields, keyed `entity.field`
    pub missing_optional: BTreeMap<String, usize>,
}

impl Extraction {
    /// Album rows in document order, repeats included
    pub fn albums(&self) -> impl Iterator<Item = &RawAlbum> + '_ {
        self.records.iter().filter_map(|r| r.album.as_ref())
    }

    /// Every listed artist in document order, featured artists included
    pub fn artists(&self) -> impl Iterator<Item = &RawArtist> + '_ {
        self.records.iter().flat_map(|r| r.artists.iter())
    }

    /// Song rows in document order, repeats included
    pub fn songs(&self) -> impl Iterator<Item = &RawSong> + '_ {
        self.records.iter().filter_map(|r| r.song.as_ref())
    }
}

/// Walks a playlist document and flattens each entry into raw rows
#[derive(Debug, Default)]
pub struct TrackExtractor {
    violations: ViolationLog,
    missing_optional: BTreeMap<String, usize>,
}

impl TrackExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract raw rows from a document.
    ///
    /// Fails only when the document itself has the wrong shape; every
    /// entry-level problem is counted and skipped.
    pub fn extract(mut self, document: &Value) -> Result<Extraction, FatalInputError> {
        let root = document
            .as_object()
            .ok_or_else(|| FatalInputError::NotAnObject(json_type_name(document)))?;

        let tracks = match root.get("tracks") {
            None => return Err(FatalInputError::MissingTracks),
            Some(Value::Array(tracks)) => tracks,
            Some(other) => return Err(FatalInputError::TracksNotAnArray(json_type_name(other))),
        };

        let mut records = Vec::with_capacity(tracks.len());
        let mut malformed_entries = 0;

        for (position, entry) in tracks.iter().enumerate() {
            match self.extract_entry(position, entry) {
                Some(record) => records.push(record),
                None => {
                    malformed_entries += 1;
                    self.violations.record(
                        ViolationKind::MalformedEntry,
                        EntityKind::Song,
                        rules::MALFORMED_ENTRY,
                    );
                    debug!(position, "skipping playlist entry without a track object");
                }
            }
        }

        let extraction = Extraction {
            playlist_id: key_field(root, "playlist_id"),
            extracted_at: text_field(root, "extracted_at")
                .or_else(|| text_field(root, "extraction_timestamp")),
            entries_seen: tracks.len(),
            malformed_entries,
            records,
            violations: self.violations,
            missing_optional: self.missing_optional,
        };

        info!(
            entries = extraction.entries_seen,
            malformed = extraction.malformed_entries,
            albums = extraction.albums().count(),
            artists = extraction.artists().count(),
            songs = extraction.songs().count(),
            "parsed playlist entries"
        );

        Ok(extraction)
    }

    /// Flatten one entry; `None` means the entry is malformed
    fn extract_entry(&mut self, position: usize, entry: &Value) -> Option<RawTrackRecord> {
        let entry = entry.as_object()?;
        let track = entry.get("track")?.as_object()?;

        let album = track
            .get("album")
            .and_then(Value::as_object)
            .and_then(|album| self.extract_album(album));

        let listed: &[Value] = track
            .get("artists")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let artists = listed
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|artist| self.extract_artist(artist))
            .collect();

        // Only the first-listed artist is credited on the song, even when
        // that element is unusable
        let primary_artist_id = listed
            .first()
            .and_then(Value::as_object)
            .and_then(|artist| key_field(artist, "id"));
        let album_id = album.as_ref().map(|a: &RawAlbum| a.album_id.clone());

        let song = self.extract_song(track, entry, album_id, primary_artist_id);

        Some(RawTrackRecord {
            position,
            album,
            artists,
            song,
        })
    }

    fn extract_album(&mut self, album: &Map<String, Value>) -> Option<RawAlbum> {
        let Some(album_id) = key_field(album, "id") else {
            self.violations.record(
                ViolationKind::MissingRequiredField,
                EntityKind::Album,
                rules::MISSING_ALBUM_ID,
            );
            debug!("skipping album without an id");
            return None;
        };

        let raw = RawAlbum {
            album_id,
            album_name: text_field(album, "name"),
            release_date: text_field(album, "release_date"),
            total_tracks: present_field(album, "total_tracks"),
            album_url: spotify_url(album),
            album_type: text_field(album, "album_type"),
            label: text_field(album, "label"),
        };

        self.note_missing(EntityKind::Album, "album_name", raw.album_name.is_none());
        self.note_missing(EntityKind::Album, "release_date", raw.release_date.is_none());
        self.note_missing(EntityKind::Album, "total_tracks", raw.total_tracks.is_none());
        self.note_missing(EntityKind::Album, "album_url", raw.album_url.is_none());
        self.note_missing(EntityKind::Album, "album_type", raw.album_type.is_none());
        self.note_missing(EntityKind::Album, "label", raw.label.is_none());

        Some(raw)
    }

    fn extract_artist(&mut self, artist: &Map<String, Value>) -> Option<RawArtist> {
        let Some(artist_id) = key_field(artist, "id") else {
            self.violations.record(
                ViolationKind::MissingRequiredField,
                EntityKind::Artist,
                rules::MISSING_ARTIST_ID,
            );
            debug!("skipping artist without an id");
            return None;
        };

        let raw = RawArtist {
            artist_id,
            artist_name: text_field(artist, "name"),
            artist_url: spotify_url(artist),
        };

        self.note_missing(EntityKind::Artist, "artist_name", raw.artist_name.is_none());
        self.note_missing(EntityKind::Artist, "artist_url", raw.artist_url.is_none());

        Some(raw)
    }

    fn extract_song(
        &mut self,
        track: &Map<String, Value>,
        entry: &Map<String, Value>,
        album_id: Option<String>,
        artist_id: Option<String>,
    ) -> Option<RawSong> {
        let Some(song_id) = key_field(track, "id") else {
            self.violations.record(
                ViolationKind::MissingRequiredField,
                EntityKind::Song,
                rules::MISSING_SONG_ID,
            );
            debug!("skipping track without an id");
            return None;
        };

        let raw = RawSong {
            song_id,
            song_name: text_field(track, "name"),
            duration_ms: present_field(track, "duration_ms"),
            url: spotify_url(track),
            popularity: present_field(track, "popularity"),
            song_added: text_field(entry, "added_at"),
            album_id,
            artist_id,
        };

        self.note_missing(EntityKind::Song, "song_name", raw.song_name.is_none());
        self.note_missing(EntityKind::Song, "url", raw.url.is_none());
        self.note_missing(EntityKind::Song, "song_added", raw.song_added.is_none());

        Some(raw)
    }

    fn note_missing(&mut self, entity: EntityKind, field: &str, missing: bool) {
        if missing {
            *self
                .missing_optional
                .entry(format!("{}.{}", entity, field))
                .or_insert(0) += 1;
        }
    }
}

/// Natural key: non-empty string, or a number rendered as a string
fn key_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Scalar rendered as text; null, empty strings and containers count as absent
fn text_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Any non-null value, left for the validator to type-check
fn present_field(obj: &Map<String, Value>, key: &str) -> Option<Value> {
    match obj.get(key)? {
        Value::Null => None,
        value => Some(value.clone()),
    }
}

/// `external_urls.spotify`
fn spotify_url(obj: &Map<String, Value>) -> Option<String> {
    obj.get("external_urls")
        .and_then(Value::as_object)
        .and_then(|urls| text_field(urls, "spotify"))
}
