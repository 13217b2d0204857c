//! Natural-language to SQL generation with a persistent answer cache.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use db::Database;
use db::view::quote_ident;
use futures::future;
use serde::{Deserialize, Serialize};

use crate::tools::{self, QueryArgs};
use crate::{Completion, LLM, Tool, ToolCallInfo};

const SAMPLE_ROWS: usize = 3;

/// Something that turns a question about a table into SQL.
#[async_trait(?Send)]
pub trait SqlGenerator {
    /// Produce a single SQL statement answering `question` over `table`.
    async fn generate_sql(&mut self, table: &str, question: &str) -> Result<String, String>;

    /// Persist everything generated since the last commit.
    fn commit(&mut self) -> Result<(), String>;
}

/// Pull the SQL statement out of a model reply.
///
/// Reasoning blocks are dropped, fenced code is preferred over prose, and
/// surrounding whitespace and a trailing `;` are removed.
pub fn extract_sql(reply: &str) -> String {
    let reply = match reply.rfind("</think>") {
        Some(end) => &reply[end + "</think>".len()..],
        None => reply,
    };

    let body = match reply.split_once("```") {
        Some((_, fenced)) => {
            let fenced = fenced.split_once("```").map_or(fenced, |(code, _)| code);
            // Skip the language tag, e.g. ```sql
            match fenced.split_once('\n') {
                Some((tag, code)) if !tag.contains(' ') => code,
                _ => fenced,
            }
        }
        None => reply,
    };

    body.trim().trim_end_matches(';').trim_end().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CacheEntry {
    table: String,
    question: String,
    sql: String,
}

/// Generated SQL keyed by `(table, question)`.
///
/// New entries are staged until [`SqlCache::commit`], which rewrites the
/// backing file (if any) in one step.
#[derive(Debug, Default)]
pub struct SqlCache {
    path: Option<PathBuf>,
    entries: HashMap<(String, String), String>,
    staged: HashMap<(String, String), String>,
}

impl SqlCache {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the cache stored at `path`. A missing file is an empty cache.
    ///
    /// # Errors
    ///
    /// Fails when the file exists but cannot be read or parsed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let mut cache = Self {
            path: Some(path.to_path_buf()),
            ..Self::default()
        };

        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(cache),
            Err(err) => return Err(format!("could not read {}: {err}", path.display())),
        };

        let entries: Vec<CacheEntry> = serde_json::from_str(&contents)
            .map_err(|e| format!("could not parse {}: {e}", path.display()))?;

        cache.entries = entries
            .into_iter()
            .map(|entry| ((entry.table, entry.question), entry.sql))
            .collect();

        log::info!("loaded {} cached statements from {}", cache.len(), path.display());
        Ok(cache)
    }

    pub fn get(&self, table: &str, question: &str) -> Option<&str> {
        let key = (table.to_string(), question.to_string());
        self.staged
            .get(&key)
            .or_else(|| self.entries.get(&key))
            .map(String::as_str)
    }

    pub fn insert(&mut self, table: &str, question: &str, sql: impl Into<String>) {
        self.staged
            .insert((table.to_string(), question.to_string()), sql.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len() + self.staged.keys().filter(|k| !self.entries.contains_key(*k)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fold staged entries into the cache and write it out.
    ///
    /// # Errors
    ///
    /// Fails when the backing file cannot be written; staged entries are kept
    /// in that case so a later commit can retry.
    pub fn commit(&mut self) -> Result<usize, String> {
        if self.staged.is_empty() {
            return Ok(0);
        }

        let mut merged = self.entries.clone();
        merged.extend(self.staged.iter().map(|(k, v)| (k.clone(), v.clone())));

        if let Some(path) = &self.path {
            let mut entries = merged
                .iter()
                .map(|((table, question), sql)| CacheEntry {
                    table: table.clone(),
                    question: question.clone(),
                    sql: sql.clone(),
                })
                .collect::<Vec<_>>();
            entries.sort_by(|a, b| (&a.table, &a.question).cmp(&(&b.table, &b.question)));

            let json = serde_json::to_string_pretty(&entries).map_err(|e| e.to_string())?;
            let tmp = path.with_extension("tmp");
            fs::write(&tmp, json).map_err(|e| format!("could not write {}: {e}", tmp.display()))?;
            fs::rename(&tmp, path)
                .map_err(|e| format!("could not replace {}: {e}", path.display()))?;
        }

        let committed = self.staged.len();
        self.entries = merged;
        self.staged.clear();
        Ok(committed)
    }
}

/// What a tool call produced: text for the model, and the query itself when
/// it was validated successfully.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolAnswer {
    pub content: String,
    pub validated: Option<String>,
}

/// Run a tool call requested by the model against `db`.
pub async fn answer_tool_call<D: Database + ?Sized>(db: &mut D, call: &ToolCallInfo) -> ToolAnswer {
    let args = match QueryArgs::parse(&call.arguments) {
        Ok(args) => args,
        Err(err) => {
            return ToolAnswer {
                content: format!("Error: {err}"),
                validated: None,
            };
        }
    };

    match call.name.as_str() {
        tools::INTERMEDIATE_RESULTS_TOOL => ToolAnswer {
            content: db::ask(db, &args.query).await,
            validated: None,
        },
        tools::VALIDATE_QUERY_TOOL => {
            let outcome = db::ask(db, &format!("EXPLAIN {}", args.query)).await;
            if outcome.starts_with("Error:") {
                ToolAnswer {
                    content: outcome,
                    validated: None,
                }
            } else {
                ToolAnswer {
                    content: "The query is valid.".to_string(),
                    validated: Some(extract_sql(&args.query)),
                }
            }
        }
        other => ToolAnswer {
            content: format!("Error: unknown tool {other}"),
            validated: None,
        },
    }
}

fn system_prompt(view_name: &str, schema: &str, sample: &str) -> String {
    format!(
        r"You are a SQL expert. Given a question about the temporary view
{view_name} with schema {schema}
and sample rows {sample},
write one SQL query that answers it. Quote column and view names with backticks.
Use the tools to inspect data or validate the query if you need to.
Reply with the SQL query only, in plain text."
    )
}

/// The conversational side of [`LlmSqlGenerator`].
#[async_trait(?Send)]
pub trait ChatModel {
    /// Start a fresh conversation with `system_prompt` and `tools`.
    async fn start(&mut self, system_prompt: String, tools: Vec<Tool>);

    async fn ask(&mut self, prompt: &str) -> Result<Completion, String>;

    fn push_tool_result(&mut self, tool_call_id: &str, result: &str);

    /// Let the model continue after tool results were pushed.
    async fn resume(&mut self) -> Result<Completion, String>;
}

#[async_trait(?Send)]
impl ChatModel for LLM {
    async fn start(&mut self, system_prompt: String, tools: Vec<Tool>) {
        self.clear_history();
        self.set_tools(tools);
        self.set_system_prompt(system_prompt).await;
    }

    async fn ask(&mut self, prompt: &str) -> Result<Completion, String> {
        self.stream_completion(prompt, |_| future::ready(())).await
    }

    fn push_tool_result(&mut self, tool_call_id: &str, result: &str) {
        LLM::push_tool_result(self, tool_call_id, result);
    }

    async fn resume(&mut self) -> Result<Completion, String> {
        LLM::resume(self, |_| future::ready(())).await
    }
}

/// [`SqlGenerator`] backed by a model that can query `D` through tools.
pub struct LlmSqlGenerator<D, M = LLM> {
    llm: M,
    db: D,
    cache: SqlCache,
    columns: HashMap<String, Vec<String>>,
    max_tool_rounds: usize,
}

impl<D: Database, M: ChatModel> LlmSqlGenerator<D, M> {
    pub fn new(llm: M, db: D, cache: SqlCache, max_tool_rounds: usize) -> Self {
        Self {
            llm,
            db,
            cache,
            columns: HashMap::new(),
            max_tool_rounds,
        }
    }

    /// Describe `table` to the model with these column names instead of the
    /// ones the database reports, which Postgres truncates to 63 bytes.
    pub fn remember_columns(&mut self, table: &str, columns: Vec<String>) {
        self.columns.insert(table.to_string(), columns);
    }

    async fn describe(&mut self, table: &str) -> Result<(String, String, String), String> {
        let view_name = format!("`{table}`");
        let columns = match self.columns.get(table) {
            Some(columns) => columns.clone(),
            None => self.db.columns(table).await?,
        };
        let schema = columns
            .iter()
            .map(|column| format!("`{column}` string"))
            .collect::<Vec<_>>()
            .join(", ");
        let sample = db::ask(
            &mut self.db,
            &format!("SELECT * FROM {} LIMIT {SAMPLE_ROWS}", quote_ident(table)),
        )
        .await;

        Ok((view_name, schema, sample))
    }
}

#[async_trait(?Send)]
impl<D: Database, M: ChatModel> SqlGenerator for LlmSqlGenerator<D, M> {
    async fn generate_sql(&mut self, table: &str, question: &str) -> Result<String, String> {
        if let Some(sql) = self.cache.get(table, question) {
            log::debug!("cache hit for {table}: {question}");
            return Ok(sql.to_string());
        }

        let (view_name, schema, sample) = self.describe(table).await?;

        self.llm
            .start(
                system_prompt(&view_name, &schema, &sample),
                tools::query_tools(&view_name, &schema),
            )
            .await;

        let mut completion = self.llm.ask(question).await?;
        let mut validated = None;
        let mut rounds = 0;

        while !completion.tool_calls.is_empty() && rounds < self.max_tool_rounds {
            rounds += 1;
            for call in &completion.tool_calls {
                let answer = answer_tool_call(&mut self.db, call).await;
                if answer.validated.is_some() {
                    validated = answer.validated;
                }
                self.llm.push_tool_result(&call.id, &answer.content);
            }
            completion = self.llm.resume().await?;
        }

        let sql = validated.unwrap_or_else(|| extract_sql(&completion.text));
        if sql.is_empty() {
            return Err(format!("model returned no SQL for {question:?}"));
        }

        self.cache.insert(table, question, sql.clone());
        Ok(sql)
    }

    fn commit(&mut self) -> Result<(), String> {
        let committed = self.cache.commit()?;
        if committed > 0 {
            log::debug!("committed {committed} generated statements");
        }
        Ok(())
    }
}
