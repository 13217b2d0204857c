use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::query::WikiSqlRecord;

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("malformed JSON on line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not serialize record: {0}")]
    Serialize(serde_json::Error),
}

/// One line of a WikiSQL `*.tables.jsonl` file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TableDef {
    pub id: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<JsonValue>>,
}

impl TableDef {
    /// Rows with every cell rendered as text. Strings are taken as-is, other
    /// JSON scalars use their JSON spelling.
    #[must_use]
    pub fn text_rows(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect()
    }
}

fn cell_text(cell: &JsonValue) -> String {
    match cell {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// One line of a WikiSQL question file. Fields other than the table id and
/// the question are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QuestionDef {
    pub table_id: String,
    pub question: String,
}

/// Read every table definition in a JSON-lines file.
///
/// # Errors
///
/// Fails on I/O errors and on the first line that is not a table object.
pub fn read_tables(path: impl AsRef<Path>) -> Result<Vec<TableDef>, DatasetError> {
    read_json_lines(BufReader::new(File::open(path)?))
}

/// Read every question in a JSON-lines file.
///
/// # Errors
///
/// Fails on I/O errors and on the first line that is not a question object.
pub fn read_questions(path: impl AsRef<Path>) -> Result<Vec<QuestionDef>, DatasetError> {
    read_json_lines(BufReader::new(File::open(path)?))
}

fn read_json_lines<T: DeserializeOwned>(reader: impl BufRead) -> Result<Vec<T>, DatasetError> {
    let mut items = vec![];

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let item = serde_json::from_str(&line).map_err(|source| DatasetError::Json {
            line: idx + 1,
            source,
        })?;
        items.push(item);
    }

    Ok(items)
}

/// Writes one [`WikiSqlRecord`] per line, flushing after each so partial runs
/// leave a usable file behind.
#[derive(Debug)]
pub struct RecordWriter<W: Write> {
    inner: W,
    written: usize,
}

impl RecordWriter<BufWriter<File>> {
    /// Create (or truncate) `path` for writing.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be created.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> RecordWriter<W> {
    #[must_use]
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    /// Append `record` as a line.
    ///
    /// # Errors
    ///
    /// Fails when serialization or the underlying writer fails.
    pub fn write(&mut self, record: &WikiSqlRecord) -> Result<(), DatasetError> {
        let line = record.to_json_line().map_err(DatasetError::Serialize)?;
        writeln!(self.inner, "{line}")?;
        self.inner.flush()?;
        self.written += 1;
        Ok(())
    }

    #[must_use]
    pub fn written(&self) -> usize {
        self.written
    }

    #[must_use]
    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Aggregation, Condition, NormalizedQuery, Operator, Value};
    use std::io::Cursor;

    #[test]
    fn reads_tables_and_renders_cells() {
        let input = r#"{"id": "1-10015132-11", "header": ["Player", "No."], "rows": [["Aleksandar Radojević", 25], ["Shawn Respert", 31.5]]}

{"id": "2-1", "header": ["A"], "rows": [["it's"]]}
"#;
        let tables: Vec<TableDef> = read_json_lines(Cursor::new(input)).unwrap();

        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].id, "1-10015132-11");
        assert_eq!(
            tables[0].text_rows(),
            vec![
                vec!["Aleksandar Radojević".to_string(), "25".to_string()],
                vec!["Shawn Respert".to_string(), "31.5".to_string()],
            ]
        );
        assert_eq!(tables[1].text_rows(), vec![vec!["it's".to_string()]]);
    }

    #[test]
    fn questions_ignore_extra_fields() {
        let input = r#"{"phase": 1, "table_id": "1-1000181-1", "question": "Tell me what the notes are for South Australia", "sql": {"sel": 5, "conds": [[3, 0, "SOUTH AUSTRALIA"]], "agg": 0}}"#;
        let questions: Vec<QuestionDef> = read_json_lines(Cursor::new(input)).unwrap();

        assert_eq!(questions[0].table_id, "1-1000181-1");
        assert!(questions[0].question.starts_with("Tell me"));
    }

    #[test]
    fn reports_line_of_bad_json() {
        let input = "{\"table_id\": \"a\", \"question\": \"b\"}\nnot json\n";
        let err = read_json_lines::<QuestionDef>(Cursor::new(input)).unwrap_err();

        assert!(matches!(err, DatasetError::Json { line: 2, .. }));
    }

    #[test]
    fn writer_emits_one_line_per_record() {
        let mut writer = RecordWriter::new(vec![]);
        writer
            .write(&WikiSqlRecord::from(NormalizedQuery {
                selected_column: 1,
                conditions: vec![Condition::new(0, Operator::Greater, Value::Float(2.5))],
                aggregation: Aggregation::Avg,
            }))
            .unwrap();
        writer.write(&WikiSqlRecord::failed("column `x` is missing")).unwrap();
        assert_eq!(writer.written(), 2);

        let output = String::from_utf8(writer.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(
            lines,
            vec![
                r#"{"query":{"sel":1,"conds":[[0,1,2.5]],"agg":5},"error":""}"#,
                r#"{"query":{"sel":-1,"conds":[],"agg":0},"error":"column `x` is missing"}"#,
            ]
        );
    }
}
