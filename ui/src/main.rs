use colored::Colorize;
use db::Database;
use db::postgres::PostgresDatabase;
use std::io::{self, Write};

mod render;

/// Prefix for running SQL directly instead of asking the model.
const SQL_COMMAND: &str = "\\sql ";

async fn print_chunk(chunk: ai::StreamChunk) {
    if let ai::StreamChunk::Text(text) = chunk {
        print!("{}", text.blue());
        let _ = io::stdout().flush();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let conf = config::BenchConfig::get_or_default();

    println!("Loading LLM...");
    let mut llm = ai::LLM::new(&conf.ai).await.map_err(anyhow::Error::msg)?;
    println!("Done!");

    let db_url: String = cliclack::input("Database URL")
        .default_input(&conf.database.url)
        .interact()?;
    let mut database = PostgresDatabase::new(db_url)
        .await
        .map_err(anyhow::Error::msg)?;
    let (schema, references) = database.get_schema().await.map_err(anyhow::Error::msg)?;

    let mut table_names = schema.keys().cloned().collect::<Vec<_>>();
    table_names.sort();
    if table_names.is_empty() {
        anyhow::bail!("the database has no tables or temporary views");
    }

    let table = table_names
        .iter()
        .fold(cliclack::select("Select a table"), |select, name| {
            select.item(name.clone(), name, "")
        })
        .interact()?;
    let columns = render::schema_line(&schema[&table]);
    let view_name = format!("`{table}`");

    llm.set_tools(ai::tools::query_tools(&view_name, &columns));
    llm.set_system_prompt(format!(
        r#"
You are a database expert and you have been tasked at helping with database queries as well
as analysing results. You are currently working with the table {view_name} whose columns are
{columns}. Other tables and their columns are {schema:?}, with references
(from table.col => [table.col]) {references:?}. Quote identifiers with backticks."#
    ))
    .await;

    while let Ok(prompt) = cliclack::input("You").interact::<String>() {
        if let Some(query) = prompt.strip_prefix(SQL_COMMAND) {
            match database.get_results(query).await {
                Ok(result) => println!("{}", render::results_table(&result)),
                Err(err) => eprintln!("{}", err.red()),
            }
            continue;
        }

        print!("\n{}", "[Assistant]".blue());

        let mut result = llm.stream_completion(prompt, print_chunk).await;

        loop {
            match result {
                Ok(completion) if !completion.tool_calls.is_empty() => {
                    for call in &completion.tool_calls {
                        let answer = ai::sql::answer_tool_call(&mut database, call).await;
                        if answer.content.starts_with("Error:") {
                            log::warn!("tool {} failed on {}", call.name, call.arguments);
                        }
                        println!("\n{} {}", format!("[{}]", call.name).yellow(), answer.content.dimmed());
                        llm.push_tool_result(&call.id, &answer.content);
                    }
                    result = llm.resume(print_chunk).await;
                }
                Ok(_) => break,
                Err(err) => {
                    log::error!("model request failed: {err}");
                    break;
                }
            }
        }

        println!("\n");
    }

    Ok(())
}
