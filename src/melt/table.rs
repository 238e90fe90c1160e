//! Ordered, typed tables ready for bulk loading

use crate::melt::types::{Album, Artist, EntityKind, Lineage, MeltConfig, Song};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::fmt::{self, Write};

pub const ALBUM_COLUMNS: &[&str] = &[
    "album_id",
    "album_name",
    "release_date",
    "total_tracks",
    "album_url",
    "album_type",
    "label",
    "extracted_at",
    "transformed_at",
];

pub const ARTIST_COLUMNS: &[&str] = &[
    "artist_id",
    "artist_name",
    "artist_url",
    "extracted_at",
    "transformed_at",
];

pub const SONG_COLUMNS: &[&str] = &[
    "song_id",
    "song_name",
    "duration_ms",
    "url",
    "popularity",
    "song_added",
    "album_id",
    "artist_id",
    "extracted_at",
    "transformed_at",
];

/// A single typed value; `Null` is the one spelling of "absent"
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Null,
    Text(String),
    Int(i64),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Cell::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Text form for delimited output; `None` for NULL so the writer can
    /// substitute the configured token.
    ///
    /// Fails when the configured date or timestamp format is not a valid
    /// chrono format string.
    pub fn render(&self, config: &MeltConfig) -> Result<Option<String>, fmt::Error> {
        let text = match self {
            Cell::Null => return Ok(None),
            Cell::Text(s) => s.clone(),
            Cell::Int(i) => i.to_string(),
            Cell::Date(d) => {
                let mut out = String::new();
                write!(out, "{}", d.format(&config.date_format))?;
                out
            }
            Cell::Timestamp(ts) => {
                let mut out = String::new();
                write!(out, "{}", ts.format(&config.timestamp_format))?;
                out
            }
        };
        Ok(Some(text))
    }

    /// JSON form; NULL stays an explicit `null` rather than a missing key
    pub fn to_json(&self, config: &MeltConfig) -> Result<Value, fmt::Error> {
        Ok(match self {
            Cell::Null => Value::Null,
            Cell::Int(i) => Value::from(*i),
            other => other.render(config)?.map(Value::String).unwrap_or(Value::Null),
        })
    }
}

impl From<Option<String>> for Cell {
    fn from(value: Option<String>) -> Self {
        value.map(Cell::Text).unwrap_or(Cell::Null)
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<Option<NaiveDate>> for Cell {
    fn from(value: Option<NaiveDate>) -> Self {
        value.map(Cell::Date).unwrap_or(Cell::Null)
    }
}

impl From<Option<DateTime<Utc>>> for Cell {
    fn from(value: Option<DateTime<Utc>>) -> Self {
        value.map(Cell::Timestamp).unwrap_or(Cell::Null)
    }
}

/// A validated row that knows its table schema
pub trait TableRow {
    const KIND: EntityKind;
    const COLUMNS: &'static [&'static str];

    /// Cells for every column except the two lineage columns, in schema order
    fn cells(&self) -> Vec<Cell>;
}

impl TableRow for Album {
    const KIND: EntityKind = EntityKind::Album;
    const COLUMNS: &'static [&'static str] = ALBUM_COLUMNS;

    fn cells(&self) -> Vec<Cell> {
        vec![
            self.album_id.clone().into(),
            self.album_name.clone().into(),
            self.release_date.into(),
            self.total_tracks.map(|n| Cell::Int(n.into())).unwrap_or(Cell::Null),
            self.album_url.clone().into(),
            self.album_type.clone().into(),
            self.label.clone().into(),
        ]
    }
}

impl TableRow for Artist {
    const KIND: EntityKind = EntityKind::Artist;
    const COLUMNS: &'static [&'static str] = ARTIST_COLUMNS;

    fn cells(&self) -> Vec<Cell> {
        vec![
            self.artist_id.clone().into(),
            self.artist_name.clone().into(),
            self.artist_url.clone().into(),
        ]
    }
}

impl TableRow for Song {
    const KIND: EntityKind = EntityKind::Song;
    const COLUMNS: &'static [&'static str] = SONG_COLUMNS;

    fn cells(&self) -> Vec<Cell> {
        vec![
            self.song_id.clone().into(),
            self.song_name.clone().into(),
            // duration_ms beyond i64 was rejected by validation
            Cell::Int(self.duration_ms as i64),
            self.url.clone().into(),
            Cell::Int(self.popularity.into()),
            self.song_added.into(),
            self.album_id.clone().into(),
            self.artist_id.clone().into(),
        ]
    }
}

/// One output relation: fixed column order, every row the same width
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub kind: EntityKind,
    pub columns: &'static [&'static str],
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Build a table from validated rows, stamping both lineage columns on each
    pub fn from_rows<R: TableRow>(rows: &[R], lineage: &Lineage) -> Self {
        let rows = rows
            .iter()
            .map(|row| {
                let mut cells = row.cells();
                cells.push(Cell::Timestamp(lineage.extracted_at));
                cells.push(Cell::Timestamp(lineage.transformed_at));
                debug_assert_eq!(cells.len(), R::COLUMNS.len());
                cells
            })
            .collect();

        Table {
            kind: R::KIND,
            columns: R::COLUMNS,
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| *c == name)
    }

    /// All cells of one column, top to bottom; `None` if any row is too
    /// narrow to hold it
    pub fn column(&self, name: &str) -> Option<Vec<&Cell>> {
        let idx = self.column_index(name)?;
        self.rows.iter().map(|row| row.get(idx)).collect()
    }

    /// Cell at (row, column name)
    pub fn cell(&self, row: usize, name: &str) -> Option<&Cell> {
        let idx = self.column_index(name)?;
        self.rows.get(row)?.get(idx)
    }
}
