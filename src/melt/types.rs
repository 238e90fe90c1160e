use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// The three output relations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Album,
    Artist,
    Song,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Album, EntityKind::Artist, EntityKind::Song];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Album => "album",
            EntityKind::Artist => "artist",
            EntityKind::Song => "song",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an absent value is spelled on the wire.
///
/// The loader on the other side treats `''`, `NULL` and `null` as SQL NULL,
/// so the token only has to match whichever of those it was configured with.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NullToken {
    /// Empty field (`,,` in CSV)
    #[default]
    Empty,
    /// The literal `NULL`
    NullLiteral,
    /// Any other token agreed with the loader
    Custom(String),
}

impl NullToken {
    pub fn as_str(&self) -> &str {
        match self {
            NullToken::Empty => "",
            NullToken::NullLiteral => "NULL",
            NullToken::Custom(token) => token,
        }
    }
}

impl FromStr for NullToken {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "" | "empty" => NullToken::Empty,
            "NULL" => NullToken::NullLiteral,
            other => NullToken::Custom(other.to_string()),
        })
    }
}

/// Wire format for rendered tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Csv,
    JsonLines,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::JsonLines => "jsonl",
        }
    }
}

/// Configuration for a transform run
#[derive(Debug, Clone)]
pub struct MeltConfig {
    /// Rendering of absent values in CSV output
    pub null_token: NullToken,

    /// Format used by the writers
    pub output_format: OutputFormat,

    /// CSV field delimiter
    pub delimiter: u8,

    /// Whether CSV output starts with a header row
    pub include_header: bool,

    /// chrono format for timestamp cells (`song_added`, lineage columns)
    pub timestamp_format: String,

    /// chrono format for date cells (`release_date`)
    pub date_format: String,

    /// Use the current time when the document carries no `extracted_at`
    /// instead of failing the batch
    pub fallback_to_now_when_unextracted: bool,
}

impl Default for MeltConfig {
    fn default() -> Self {
        MeltConfig {
            null_token: NullToken::Empty,
            output_format: OutputFormat::Csv,
            delimiter: b',',
            include_header: true,
            timestamp_format: String::from("%Y-%m-%d %H:%M:%S%.6f"),
            date_format: String::from("%Y-%m-%d"),
            fallback_to_now_when_unextracted: true,
        }
    }
}

/// Uniqueness key used by the deduplicator
pub trait NaturalKey {
    fn natural_key(&self) -> &str;
}

/// Album fields as found in the document, not yet type-checked
#[derive(Debug, Clone, PartialEq)]
pub struct RawAlbum {
    pub album_id: String,
    pub album_name: Option<String>,
    pub release_date: Option<String>,
    pub total_tracks: Option<Value>,
    pub album_url: Option<String>,
    pub album_type: Option<String>,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawArtist {
    pub artist_id: String,
    pub artist_name: Option<String>,
    pub artist_url: Option<String>,
}

/// Song fields as found in the document.
///
/// Numeric fields stay as JSON values so the validator can tell a missing
/// value from a malformed one.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSong {
    pub song_id: String,
    pub song_name: Option<String>,
    pub duration_ms: Option<Value>,
    pub url: Option<String>,
    pub popularity: Option<Value>,
    pub song_added: Option<String>,
    pub album_id: Option<String>,
    pub artist_id: Option<String>,
}

/// One playlist entry flattened into its denormalized parts
#[derive(Debug, Clone, PartialEq)]
pub struct RawTrackRecord {
    /// Position of the entry in `tracks`
    pub position: usize,
    pub album: Option<RawAlbum>,
    /// Every listed artist that carries an id, in listing order
    pub artists: Vec<RawArtist>,
    /// `None` when the track has no id
    pub song: Option<RawSong>,
}

impl NaturalKey for RawAlbum {
    fn natural_key(&self) -> &str {
        &self.album_id
    }
}

impl NaturalKey for RawArtist {
    fn natural_key(&self) -> &str {
        &self.artist_id
    }
}

impl NaturalKey for RawSong {
    fn natural_key(&self) -> &str {
        &self.song_id
    }
}

/// Album dimension row after validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Album {
    pub album_id: String,
    pub album_name: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub total_tracks: Option<u32>,
    pub album_url: Option<String>,
    pub album_type: Option<String>,
    pub label: Option<String>,
}

/// Artist dimension row after validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artist {
    pub artist_id: String,
    pub artist_name: Option<String>,
    pub artist_url: Option<String>,
}

/// Song fact row; both foreign keys resolve within the same batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Song {
    pub song_id: String,
    pub song_name: Option<String>,
    pub duration_ms: u64,
    pub url: Option<String>,
    pub popularity: u8,
    pub song_added: Option<DateTime<Utc>>,
    pub album_id: String,
    pub artist_id: String,
}

impl NaturalKey for Album {
    fn natural_key(&self) -> &str {
        &self.album_id
    }
}

impl NaturalKey for Artist {
    fn natural_key(&self) -> &str {
        &self.artist_id
    }
}

impl NaturalKey for Song {
    fn natural_key(&self) -> &str {
        &self.song_id
    }
}

/// Lineage timestamps stamped on every output row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Lineage {
    pub extracted_at: DateTime<Utc>,
    pub transformed_at: DateTime<Utc>,
}

impl Lineage {
    /// Build lineage, holding `transformed_at` no earlier than `extracted_at`
    pub fn new(extracted_at: DateTime<Utc>, transformed_at: DateTime<Utc>) -> Self {
        Lineage {
            extracted_at,
            transformed_at: transformed_at.max(extracted_at),
        }
    }
}
