use std::collections::HashMap;
use std::path::PathBuf;

use ai::sql::{LlmSqlGenerator, SqlCache, SqlGenerator};
use anyhow::{Context, anyhow};
use clap::Parser;
use db::Database;
use db::postgres::PostgresDatabase;
use wikisql::{Aggregation, NormalizedQuery, QuestionDef, RecordWriter, WikiSqlRecord};

#[derive(Parser)]
#[command(
    name = "wikibench",
    about = "Answer WikiSQL questions with a local model and write predictions as JSON lines"
)]
struct Cli {
    /// Table definitions, one JSON object per line
    table_file: PathBuf,

    /// Questions to answer, one JSON object per line
    source_file: PathBuf,

    /// Prediction file, defaults to `benchmark.output` from the config
    #[arg(long)]
    output: Option<PathBuf>,

    /// Postgres connection string, defaults to `database.url` from the config
    #[arg(long)]
    db_url: Option<String>,

    /// Ignore and do not update the generated SQL cache
    #[arg(long)]
    no_cache: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let conf = config::BenchConfig::get_or_default();

    let tables = wikisql::read_tables(&cli.table_file)
        .with_context(|| format!("reading {}", cli.table_file.display()))?;
    let questions = wikisql::read_questions(&cli.source_file)
        .with_context(|| format!("reading {}", cli.source_file.display()))?;

    let db_url = cli.db_url.unwrap_or_else(|| conf.database.url.clone());
    let mut database = PostgresDatabase::new(&db_url)
        .await
        .map_err(|e| anyhow!("connecting to {db_url}: {e}"))?;

    let mut schemas = HashMap::with_capacity(tables.len());
    for table in &tables {
        match database
            .register_view(&table.id, &table.header, &table.text_rows())
            .await
        {
            Ok(_) => {
                schemas.insert(table.id.clone(), table.header.clone());
            }
            Err(err) => log::warn!("skipping table {}: {err}", table.id),
        }
    }
    log::info!("registered {} of {} tables", schemas.len(), tables.len());

    let cache = match (&conf.benchmark.cache, cli.no_cache) {
        (Some(path), false) => SqlCache::open(path).map_err(anyhow::Error::msg)?,
        _ => SqlCache::in_memory(),
    };
    let llm = ai::LLM::new(&conf.ai).await.map_err(anyhow::Error::msg)?;
    let mut generator = LlmSqlGenerator::new(llm, database, cache, conf.ai.max_tool_rounds);
    for (table, header) in &schemas {
        generator.remember_columns(table, header.clone());
    }

    let output = cli
        .output
        .unwrap_or_else(|| PathBuf::from(&conf.benchmark.output));
    let mut writer = RecordWriter::create(&output)
        .with_context(|| format!("creating {}", output.display()))?;
    let mut failures = 0;

    for question in &questions {
        let record = match predict(&mut generator, &schemas, question).await {
            Ok(query) => WikiSqlRecord::from(query),
            Err(err) => {
                failures += 1;
                log::warn!("{}: {err:#}", question.question);
                WikiSqlRecord::failed(format!("{err:#}"))
            }
        };
        writer.write(&record)?;
    }

    log::info!(
        "wrote {} predictions to {} ({failures} failed)",
        writer.written(),
        output.display()
    );
    Ok(())
}

async fn predict(
    generator: &mut impl SqlGenerator,
    schemas: &HashMap<String, Vec<String>>,
    question: &QuestionDef,
) -> anyhow::Result<NormalizedQuery> {
    log::info!("{}", question.question);

    let columns = schemas
        .get(&question.table_id)
        .ok_or_else(|| anyhow!("table {} was not registered", question.table_id))?;

    let sql = generator
        .generate_sql(&question.table_id, &question.question)
        .await
        .map_err(|e| anyhow!("generating SQL: {e}"))?;
    if let Err(err) = generator.commit() {
        log::warn!("could not save generated SQL: {err}");
    }
    log::info!("{sql}");

    let query = wikisql::normalize(&sql, columns)?;
    log::info!("{}", describe(&query, columns));
    Ok(query)
}

/// Render a normalized query with column names, e.g. `COUNT(Player) WHERE No. > 3`.
fn describe(query: &NormalizedQuery, columns: &[String]) -> String {
    let name = |idx: usize| columns.get(idx).map_or("?", String::as_str);
    let selected = query.selected_index().map_or("?", name);

    let mut out = match query.aggregation {
        Aggregation::None => selected.to_string(),
        agg => format!("{}({selected})", agg.keyword()),
    };
    for (idx, cond) in query.conditions.iter().enumerate() {
        out.push_str(if idx == 0 { " WHERE " } else { " AND " });
        out.push_str(&format!(
            "{} {} {}",
            name(cond.column),
            cond.operator.symbol(),
            cond.value
        ));
    }
    out
}
