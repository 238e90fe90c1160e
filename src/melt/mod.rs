//! Playlist melting - flatten a nested playlist document into warehouse tables
//!
//! The pipeline runs strictly in one direction:
//!
//! 1. [`extractor`] walks the document into raw album, artist and song rows
//! 2. [`dedup`] collapses repeated natural keys, first occurrence wins
//! 3. [`validate`] enforces field rules and referential integrity
//! 4. [`table`] lays the survivors out in fixed column order with lineage
//!
//! [`orchestrator::PlaylistMelter`] sequences the stages and collects every
//! drop or coercion into a [`RunSummary`]. Nothing here touches storage;
//! [`writer`] is for callers that want files or streams.

pub mod types;
pub mod extractor;
pub mod dedup;
pub mod dates;
pub mod validate;
pub mod table;
pub mod summary;
pub mod writer;
pub mod orchestrator;

pub use types::{
    Album, Artist, EntityKind, Lineage, MeltConfig, NaturalKey, NullToken, OutputFormat,
    RawAlbum, RawArtist, RawSong, RawTrackRecord, Song,
};
pub use extractor::{Extraction, TrackExtractor};
pub use dedup::{dedup_by_natural_key, Deduplicated};
pub use validate::{validate, Validated};
pub use table::{Cell, Table, TableRow, ALBUM_COLUMNS, ARTIST_COLUMNS, SONG_COLUMNS};
pub use summary::{EntityCounts, RunSummary, Violation, ViolationKind, ViolationLog};
pub use writer::{DirectoryWriter, TableWriter};
pub use orchestrator::{MeltOutput, PlaylistMelter};
