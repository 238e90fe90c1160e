use crate::melt::summary::RunSummary;
use crate::melt::table::Table;
use crate::melt::types::{MeltConfig, OutputFormat};
use anyhow::{anyhow, Context, Result};
use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Writes tables to a single stream in the configured format
pub struct TableWriter<W: Write> {
    writer: W,
    config: MeltConfig,
    /// Add a `_table` field to JSON Lines rows so several tables can share a stream
    tag_rows: bool,
}

impl<W: Write> TableWriter<W> {
    pub fn new(writer: W, config: MeltConfig) -> Self {
        TableWriter {
            writer,
            config,
            tag_rows: false,
        }
    }

    pub fn with_table_tags(mut self) -> Self {
        self.tag_rows = true;
        self
    }

    pub fn write_table(&mut self, table: &Table) -> Result<()> {
        match self.config.output_format {
            OutputFormat::Csv => self.write_csv(table),
            OutputFormat::JsonLines => self.write_jsonl(table),
        }
    }

    fn write_csv(&mut self, table: &Table) -> Result<()> {
        let delimiter = char::from(self.config.delimiter);
        let null_token = self.config.null_token.as_str();

        if self.config.include_header {
            let header: Vec<String> = table
                .columns
                .iter()
                .map(|c| escape_field(c, delimiter, null_token))
                .collect();
            writeln!(self.writer, "{}", header.join(&delimiter.to_string()))
                .context("Failed to write header")?;
        }

        for row in &table.rows {
            let mut fields = Vec::with_capacity(row.len());
            for cell in row {
                let field = match cell.render(&self.config).map_err(|_| format_error(&self.config))? {
                    Some(text) => escape_field(&text, delimiter, null_token),
                    None => null_token.to_string(),
                };
                fields.push(field);
            }
            writeln!(self.writer, "{}", fields.join(&delimiter.to_string()))
                .context("Failed to write row")?;
        }
        Ok(())
    }

    fn write_jsonl(&mut self, table: &Table) -> Result<()> {
        for row in &table.rows {
            let mut data = Map::new();
            if self.tag_rows {
                data.insert(
                    "_table".to_string(),
                    Value::String(table.kind.as_str().to_string()),
                );
            }
            for (column, cell) in table.columns.iter().zip(row) {
                let value = cell.to_json(&self.config).map_err(|_| format_error(&self.config))?;
                data.insert(column.to_string(), value);
            }

            let json = serde_json::to_string(&data).context("Failed to serialize row")?;
            writeln!(self.writer, "{}", json).context("Failed to write row")?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush writer")
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

fn format_error(config: &MeltConfig) -> anyhow::Error {
    anyhow!(
        "Invalid date or timestamp format: date_format={:?}, timestamp_format={:?}",
        config.date_format,
        config.timestamp_format
    )
}

/// Quote a field when it contains the delimiter, a quote, or a line break,
/// or when it would read back as the NULL token
fn escape_field(field: &str, delimiter: char, null_token: &str) -> String {
    if field.contains(delimiter)
        || field.contains('"')
        || field.contains('\n')
        || field.contains('\r')
        || field == null_token
    {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Writes each table to its own file under an output directory:
/// `<dir>/<entity>_data/<entity>_<stamp>.<ext>`, plus
/// `<dir>/summaries/summary_<stamp>.json`
pub struct DirectoryWriter {
    output_dir: PathBuf,
    config: MeltConfig,
}

impl DirectoryWriter {
    pub fn new<P: AsRef<Path>>(output_dir: P, config: MeltConfig) -> Result<Self> {
        std::fs::create_dir_all(&output_dir).context("Failed to create output directory")?;

        Ok(DirectoryWriter {
            output_dir: output_dir.as_ref().to_path_buf(),
            config,
        })
    }

    /// Write one table, returning the path it landed at
    pub fn write_table(&self, table: &Table, stamp: &str) -> Result<PathBuf> {
        let entity = table.kind.as_str();
        let dir = self.output_dir.join(format!("{}_data", entity));
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

        let path = dir.join(format!(
            "{}_{}.{}",
            entity,
            stamp,
            self.config.output_format.extension()
        ));
        let file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to open file: {}", path.display()))?;

        let mut writer = TableWriter::new(std::io::BufWriter::new(file), self.config.clone());
        writer.write_table(table)?;
        writer.flush()?;
        Ok(path)
    }

    pub fn write_summary(&self, summary: &RunSummary, stamp: &str) -> Result<PathBuf> {
        let dir = self.output_dir.join("summaries");
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

        let path = dir.join(format!("summary_{}.json", stamp));
        let json = serde_json::to_string_pretty(summary).context("Failed to serialize summary")?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write file: {}", path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::melt::table::Cell;
    use crate::melt::types::{EntityKind, NullToken};
    use chrono::{TimeZone, Utc};

    fn artist_table() -> Table {
        Table {
            kind: EntityKind::Artist,
            columns: &["artist_id", "artist_name", "artist_url"],
            rows: vec![
                vec![
                    Cell::Text("ar1".to_string()),
                    Cell::Text("Simon, Garfunkel".to_string()),
                    Cell::Null,
                ],
                vec![
                    Cell::Text("ar2".to_string()),
                    Cell::Text("The \"Band\"".to_string()),
                    Cell::Text("https://open.spotify.com/artist/ar2".to_string()),
                ],
            ],
        }
    }

    fn render(config: MeltConfig) -> String {
        let mut writer = TableWriter::new(Vec::new(), config);
        writer.write_table(&artist_table()).unwrap();
        String::from_utf8(writer.into_inner()).unwrap()
    }

    #[test]
    fn test_csv_output() {
        let output = render(MeltConfig::default());
        let lines: Vec<_> = output.lines().collect();

        assert_eq!(lines[0], "artist_id,artist_name,artist_url");
        assert_eq!(lines[1], "ar1,\"Simon, Garfunkel\",");
        assert_eq!(lines[2], "ar2,\"The \"\"Band\"\"\",https://open.spotify.com/artist/ar2");
    }

    #[test]
    fn test_csv_null_token_and_delimiter() {
        let config = MeltConfig {
            null_token: NullToken::NullLiteral,
            delimiter: b'|',
            include_header: false,
            ..MeltConfig::default()
        };
        let output = render(config);

        assert_eq!(output.lines().next(), Some("ar1|Simon, Garfunkel|NULL"));
    }

    fn labelled_table(label: &str) -> Table {
        Table {
            kind: EntityKind::Album,
            columns: &["album_id", "label", "album_type"],
            rows: vec![vec![
                Cell::Text("al1".to_string()),
                Cell::Text(label.to_string()),
                Cell::Null,
            ]],
        }
    }

    fn render_table(table: &Table, config: MeltConfig) -> String {
        let mut writer = TableWriter::new(Vec::new(), config);
        writer.write_table(table).unwrap();
        String::from_utf8(writer.into_inner()).unwrap()
    }

    #[test]
    fn test_text_equal_to_null_literal_is_quoted() {
        let config = MeltConfig {
            null_token: NullToken::NullLiteral,
            include_header: false,
            ..MeltConfig::default()
        };

        let output = render_table(&labelled_table("NULL"), config);

        assert_eq!(output.lines().next(), Some("al1,\"NULL\",NULL"));
    }

    #[test]
    fn test_text_equal_to_custom_token_is_quoted() {
        let config = MeltConfig {
            null_token: NullToken::Custom("\\N".to_string()),
            include_header: false,
            ..MeltConfig::default()
        };

        let output = render_table(&labelled_table("\\N"), config);

        assert_eq!(output.lines().next(), Some("al1,\"\\N\",\\N"));
    }

    #[test]
    fn test_empty_text_differs_from_empty_null() {
        let config = MeltConfig {
            include_header: false,
            ..MeltConfig::default()
        };

        let output = render_table(&labelled_table(""), config);

        assert_eq!(output.lines().next(), Some("al1,\"\","));
    }

    #[test]
    fn test_invalid_timestamp_format_is_an_error() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 6, 0, 0, 0).unwrap();
        let table = Table {
            kind: EntityKind::Song,
            columns: &["song_id", "transformed_at"],
            rows: vec![vec![Cell::Text("s1".to_string()), Cell::Timestamp(ts)]],
        };

        for output_format in [OutputFormat::Csv, OutputFormat::JsonLines] {
            let config = MeltConfig {
                timestamp_format: "%Q".to_string(),
                output_format,
                ..MeltConfig::default()
            };
            let mut writer = TableWriter::new(Vec::new(), config);

            let err = writer.write_table(&table).unwrap_err();

            assert!(err.to_string().contains("timestamp_format=\"%Q\""));
        }
    }

    #[test]
    fn test_jsonl_keeps_null_fields_and_order() {
        let config = MeltConfig {
            output_format: OutputFormat::JsonLines,
            ..MeltConfig::default()
        };
        let mut writer = TableWriter::new(Vec::new(), config).with_table_tags();
        writer.write_table(&artist_table()).unwrap();
        let output = String::from_utf8(writer.into_inner()).unwrap();

        assert_eq!(
            output.lines().next(),
            Some(r#"{"_table":"artist","artist_id":"ar1","artist_name":"Simon, Garfunkel","artist_url":null}"#)
        );
    }

    #[test]
    fn test_directory_writer_layout() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DirectoryWriter::new(dir.path(), MeltConfig::default()).unwrap();

        let path = writer.write_table(&artist_table(), "20240106_000500_0").unwrap();

        assert_eq!(
            path,
            dir.path().join("artist_data").join("artist_20240106_000500_0.csv")
        );
        let contents = std::fs::read_to_string(path).unwrap();
        assert_eq!(contents.lines().count(), 3);
    }
}
