//! # playlist-melt
//!
//! Turns one extracted playlist document (nested tracks with their albums and
//! artists) into three flat, de-duplicated, referentially consistent tables
//! ready for a star-schema warehouse: `album`, `artist` and `song`.
//!
//! The core does no I/O. Callers hand in a parsed document and get back typed
//! tables plus a [`RunSummary`] describing every dropped row and nulled field.
//!
//! ## Quick Start
//!
//! ```rust
//! use playlist_melt::{transform, Cell};
//! use serde_json::json;
//!
//! # fn main() -> anyhow::Result<()> {
//! let document = json!({
//!     "playlist_id": "37i9dQZF1DXcBWIGoYBM5M",
//!     "extracted_at": "2024-01-06T00:00:00",
//!     "tracks": [{
//!         "added_at": "2024-01-05T10:00:00Z",
//!         "track": {
//!             "id": "s1", "name": "Song", "duration_ms": 200000, "popularity": 80,
//!             "album": {"id": "al1", "name": "Album", "release_date": "2023-09-01"},
//!             "artists": [{"id": "ar1", "name": "Artist"}]
//!         }
//!     }]
//! });
//!
//! let output = transform(&document)?;
//!
//! assert_eq!(output.songs.len(), 1);
//! assert_eq!(output.songs.cell(0, "album_id"), Some(&Cell::Text("al1".into())));
//! assert_eq!(output.summary.rows_dropped(), 0);
//! # Ok(())
//! # }
//! ```

use serde_json::Value;

pub mod error;
pub mod melt;

// Re-export commonly used types for convenience
pub use error::FatalInputError;
pub use melt::{
    Cell, DirectoryWriter, EntityKind, MeltConfig, MeltOutput, NullToken, OutputFormat,
    PlaylistMelter, RunSummary, Table, TableWriter, Violation, ViolationKind,
};

/// Main entry point: transform a document with the default configuration
pub fn transform(document: &Value) -> Result<MeltOutput, FatalInputError> {
    PlaylistMelter::default().transform(document)
}
