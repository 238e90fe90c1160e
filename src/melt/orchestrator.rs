//! Drives one document through parse, dedup, validate and serialize

use crate::error::FatalInputError;
use crate::melt::dates::parse_timestamp;
use crate::melt::dedup::dedup_by_natural_key;
use crate::melt::extractor::TrackExtractor;
use crate::melt::summary::{rules, EntityCounts, RunSummary, ViolationKind};
use crate::melt::table::Table;
use crate::melt::types::{EntityKind, Lineage, MeltConfig};
use crate::melt::validate::validate;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// The three tables and the summary of one transform call
#[derive(Debug, Clone)]
pub struct MeltOutput {
    pub albums: Table,
    pub artists: Table,
    pub songs: Table,
    pub summary: RunSummary,
}

/// Stateless transformer from playlist documents to warehouse tables.
///
/// Safe to share across threads; every call works on its own document.
#[derive(Clone)]
pub struct PlaylistMelter {
    config: MeltConfig,
    clock: Clock,
}

impl std::fmt::Debug for PlaylistMelter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaylistMelter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for PlaylistMelter {
    fn default() -> Self {
        Self::new(MeltConfig::default())
    }
}

impl PlaylistMelter {
    pub fn new(config: MeltConfig) -> Self {
        PlaylistMelter {
            config,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the source of `transformed_at`
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn config(&self) -> &MeltConfig {
        &self.config
    }

    /// Parse JSON text and transform it
    pub fn transform_str(&self, json: &str) -> Result<MeltOutput, FatalInputError> {
        let document: Value = serde_json::from_str(json)?;
        self.transform(&document)
    }

    /// Transform one playlist document.
    ///
    /// Only a document without a usable top-level `tracks` array (or, when
    /// configured strictly, without `extracted_at`) is an error; everything
    /// else is reported in the summary.
    pub fn transform(&self, document: &Value) -> Result<MeltOutput, FatalInputError> {
        let mut extraction = TrackExtractor::new().extract(document)?;

        let (extracted_at, extracted_at_defaulted) =
            self.resolve_extracted_at(extraction.extracted_at.as_deref())?;

        let mut violations = std::mem::take(&mut extraction.violations);

        let albums = dedup_by_natural_key(extraction.albums().cloned());
        let artists = dedup_by_natural_key(extraction.artists().cloned());
        let songs = dedup_by_natural_key(extraction.songs().cloned());

        let parsed = EntityCounts {
            albums: extraction.albums().count(),
            artists: extraction.artists().count(),
            songs: extraction.songs().count(),
        };
        let duplicates_removed = EntityCounts {
            albums: albums.duplicates_removed,
            artists: artists.duplicates_removed,
            songs: songs.duplicates_removed,
        };
        let conflicting_duplicates = EntityCounts {
            albums: albums.conflicts,
            artists: artists.conflicts,
            songs: songs.conflicts,
        };

        for kind in EntityKind::ALL {
            violations.record_many(
                ViolationKind::ConflictingDuplicate,
                kind,
                rules::CONFLICTING_DUPLICATE,
                conflicting_duplicates.get(kind),
            );
        }

        info!(
            albums = duplicates_removed.albums,
            artists = duplicates_removed.artists,
            songs = duplicates_removed.songs,
            "removed duplicate rows"
        );

        let validated = validate(albums.rows, artists.rows, songs.rows);
        violations.merge(validated.violations);

        let lineage = Lineage::new(extracted_at, (self.clock)());

        let albums = Table::from_rows(&validated.albums, &lineage);
        let artists = Table::from_rows(&validated.artists, &lineage);
        let songs = Table::from_rows(&validated.songs, &lineage);

        let output = EntityCounts {
            albums: albums.len(),
            artists: artists.len(),
            songs: songs.len(),
        };

        for (field, count) in &extraction.missing_optional {
            warn!(field = %field, count, "optional field missing");
        }

        let summary = RunSummary {
            playlist_id: extraction.playlist_id,
            entries_seen: extraction.entries_seen,
            malformed_entries: extraction.malformed_entries,
            parsed,
            duplicates_removed,
            conflicting_duplicates,
            output,
            violations: violations.into_vec(),
            missing_optional: extraction.missing_optional,
            extracted_at: lineage.extracted_at,
            transformed_at: lineage.transformed_at,
            extracted_at_defaulted,
        };

        info!(
            playlist_id = summary.playlist_id.as_deref().unwrap_or("unknown"),
            albums = output.albums,
            artists = output.artists,
            songs = output.songs,
            dropped = summary.rows_dropped(),
            transformed_at = %summary.transformed_at,
            "transform completed"
        );

        Ok(MeltOutput {
            albums,
            artists,
            songs,
            summary,
        })
    }

    /// `extracted_at` from the document, or now when allowed
    fn resolve_extracted_at(
        &self,
        raw: Option<&str>,
    ) -> Result<(DateTime<Utc>, bool), FatalInputError> {
        if let Some(ts) = raw.and_then(parse_timestamp) {
            return Ok((ts, false));
        }

        if !self.config.fallback_to_now_when_unextracted {
            return Err(FatalInputError::MissingExtractedAt);
        }

        warn!(raw = ?raw, "no usable extracted_at timestamp, using current time");
        Ok(((self.clock)(), true))
    }
}
