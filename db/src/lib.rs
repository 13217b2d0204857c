pub mod postgres;
pub mod view;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// Tables mapped to their `(column, type)` pairs, and `table.column` keys
/// mapped to the `table.column`s that reference them.
pub type SchemaInfo = (
    HashMap<String, Vec<(String, String)>>,
    HashMap<String, Vec<String>>,
);

/// Trait defining the interface for database operations
#[async_trait]
pub trait Database: Send + Sync {
    /// Execute a query and return its header and rows as JSON values
    async fn get_results(&mut self, query: &str) -> Result<DatabaseResult, String>;

    /// Execute an sql statement and return whatever the statement returns
    async fn execute(&mut self, query: &str) -> Result<String, String>;

    /// Get the database schema information
    /// Returns a list of all tables and their columns as well as a list of all references
    /// from each column to each table.column as map, where the key is the column.
    async fn get_schema(&mut self) -> Result<SchemaInfo, String>;

    /// Column names of a table or view, in declaration order
    async fn columns(&mut self, relation: &str) -> Result<Vec<String>, String>;

    /// Expose `rows` as a temporary view called `name` for this session
    async fn register_view(
        &mut self,
        name: &str,
        header: &[String],
        rows: &[Vec<String>],
    ) -> Result<(), String> {
        let statement = view::create_temp_view_statement(name, header, rows)?;
        self.execute(&statement).await?;
        log::debug!("registered view {name} with {} rows", rows.len());
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatabaseResult {
    pub headers: Vec<(String, String)>,
    pub rows: Vec<Vec<Value>>,
}

impl DatabaseResult {
    /// Render rows as a list of string tuples, e.g. `[('a', '1'), ('b', '2')]`.
    #[must_use]
    pub fn to_tuple_string(&self) -> String {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let cells = row
                    .iter()
                    .map(|cell| format!("'{}'", cell_text(cell)))
                    .collect::<Vec<_>>();
                match cells.as_slice() {
                    [single] => format!("({single},)"),
                    _ => format!("({})", cells.join(", ")),
                }
            })
            .collect::<Vec<_>>();

        format!("[{}]", rows.join(", "))
    }
}

fn cell_text(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        Value::Null => "None".to_string(),
        other => other.to_string(),
    }
}

/// Run `query` and describe the outcome as text for a language model.
///
/// Failures are reported in-band as `Error: <message>` so the model can react
/// to them instead of aborting the conversation.
pub async fn ask<D: Database + ?Sized>(db: &mut D, query: &str) -> String {
    match db.get_results(query).await {
        Ok(result) => result.to_tuple_string(),
        Err(err) => {
            log::debug!("query failed: {err}");
            format!("Error: {err}")
        }
    }
}
