//! Run summary and violation bookkeeping

use crate::melt::types::EntityKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Category of a row-level problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ViolationKind {
    /// Playlist entry without a track object; entry skipped
    MalformedEntry,
    /// Natural key or required numeric field absent; row skipped
    MissingRequiredField,
    /// Numeric field outside its domain or not an integer; row dropped
    RangeViolation,
    /// Date-like field failed to parse; field nulled, row kept
    UnparseableDate,
    /// Optional non-date field malformed; field nulled, row kept
    InvalidOptionalField,
    /// Song whose album or artist is absent from the batch; row dropped
    OrphanReference,
    /// Repeated natural key with differing attributes; first occurrence kept
    ConflictingDuplicate,
}

impl ViolationKind {
    /// Whether this kind removes a row (as opposed to nulling a field or
    /// merely noting a conflict)
    pub fn drops_row(self) -> bool {
        matches!(
            self,
            ViolationKind::MalformedEntry
                | ViolationKind::MissingRequiredField
                | ViolationKind::RangeViolation
                | ViolationKind::OrphanReference
        )
    }
}

/// Rule names used in violation entries
pub mod rules {
    pub const MALFORMED_ENTRY: &str = "skipped: malformed entry";
    pub const MISSING_ALBUM_ID: &str = "missing album_id";
    pub const MISSING_ARTIST_ID: &str = "missing artist_id";
    pub const MISSING_SONG_ID: &str = "missing song_id";
    pub const MISSING_DURATION: &str = "missing duration_ms";
    pub const MISSING_POPULARITY: &str = "missing popularity";
    pub const INVALID_DURATION: &str = "duration_ms not a non-negative integer";
    pub const INVALID_POPULARITY: &str = "popularity not an integer in [0, 100]";
    pub const UNPARSEABLE_RELEASE_DATE: &str = "unparseable release_date";
    pub const UNPARSEABLE_SONG_ADDED: &str = "unparseable song_added";
    pub const INVALID_TOTAL_TRACKS: &str = "total_tracks not a non-negative integer";
    pub const ORPHAN_ALBUM: &str = "orphan: missing album";
    pub const ORPHAN_ARTIST: &str = "orphan: missing artist";
    pub const CONFLICTING_DUPLICATE: &str = "duplicate key with conflicting fields";
}

/// Aggregated count for one (kind, entity, rule) triple
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub entity: EntityKind,
    pub rule: String,
    pub count: usize,
}

/// Ordered tally of violations, first-seen order preserved
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViolationLog {
    entries: Vec<Violation>,
}

impl ViolationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one occurrence
    pub fn record(&mut self, kind: ViolationKind, entity: EntityKind, rule: &str) {
        self.record_many(kind, entity, rule, 1);
    }

    pub fn record_many(&mut self, kind: ViolationKind, entity: EntityKind, rule: &str, count: usize) {
        if count == 0 {
            return;
        }
        match self
            .entries
            .iter_mut()
            .find(|v| v.kind == kind && v.entity == entity && v.rule == rule)
        {
            Some(existing) => existing.count += count,
            None => self.entries.push(Violation {
                kind,
                entity,
                rule: rule.to_string(),
                count,
            }),
        }
    }

    /// Fold another log into this one
    pub fn merge(&mut self, other: ViolationLog) {
        for v in other.entries {
            self.record_many(v.kind, v.entity, &v.rule, v.count);
        }
    }

    /// Total count for a kind on one entity, across rules
    pub fn count(&self, kind: ViolationKind, entity: EntityKind) -> usize {
        self.entries
            .iter()
            .filter(|v| v.kind == kind && v.entity == entity)
            .map(|v| v.count)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.entries.iter()
    }

    pub fn into_vec(self) -> Vec<Violation> {
        self.entries
    }
}

/// Per-entity counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntityCounts {
    pub albums: usize,
    pub artists: usize,
    pub songs: usize,
}

impl EntityCounts {
    pub fn get(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Album => self.albums,
            EntityKind::Artist => self.artists,
            EntityKind::Song => self.songs,
        }
    }

    pub fn total(&self) -> usize {
        self.albums + self.artists + self.songs
    }
}

/// Everything one transform call observed, for the caller to persist or alert on
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub playlist_id: Option<String>,
    /// Entries in the document's `tracks` collection
    pub entries_seen: usize,
    pub malformed_entries: usize,
    /// Raw rows emitted by the parser, before deduplication
    pub parsed: EntityCounts,
    pub duplicates_removed: EntityCounts,
    /// Duplicates whose non-key fields disagreed with the first occurrence
    pub conflicting_duplicates: EntityCounts,
    /// Rows in the serialized tables
    pub output: EntityCounts,
    pub violations: Vec<Violation>,
    /// Absent optional fields, keyed `entity.field`
    pub missing_optional: BTreeMap<String, usize>,
    pub extracted_at: DateTime<Utc>,
    pub transformed_at: DateTime<Utc>,
    /// True when the document had no usable `extracted_at`
    pub extracted_at_defaulted: bool,
}

impl RunSummary {
    /// Total count for a kind on one entity
    pub fn violation_count(&self, kind: ViolationKind, entity: EntityKind) -> usize {
        self.violations
            .iter()
            .filter(|v| v.kind == kind && v.entity == entity)
            .map(|v| v.count)
            .sum()
    }

    /// Count for one specific rule
    pub fn rule_count(&self, rule: &str) -> usize {
        self.violations
            .iter()
            .filter(|v| v.rule == rule)
            .map(|v| v.count)
            .sum()
    }

    /// Rows removed by validation or parsing, across all entities
    pub fn rows_dropped(&self) -> usize {
        self.violations
            .iter()
            .filter(|v| v.kind.drops_row())
            .map(|v| v.count)
            .sum()
    }
}
