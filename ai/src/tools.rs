//! Tool schemas that let the model run SQL against the registered views.

use serde::Deserialize;

use crate::{HashMap, Tool, Value, create_tool, json};

pub const INTERMEDIATE_RESULTS_TOOL: &str = "get_intermediate_results";
pub const VALIDATE_QUERY_TOOL: &str = "validate_query";

/// Arguments shared by every query tool.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueryArgs {
    pub query: String,
}

impl QueryArgs {
    /// Parse the raw JSON arguments of a tool call.
    ///
    /// # Errors
    ///
    /// Fails when the arguments are not an object with a string `query`.
    pub fn parse(arguments: &str) -> Result<Self, String> {
        serde_json::from_str(arguments).map_err(|e| format!("invalid tool arguments: {e}"))
    }
}

fn query_parameters(view_name: &str, schema: &str) -> HashMap<String, Value> {
    let description = format!(
        "SQL query extracting info to answer the user's question. \
         SQL should be written with select from {view_name} which contains the following schema: \
         {schema}. The query should be returned in plain text, not in JSON."
    );

    HashMap::from([
        ("type".to_string(), json!("object")),
        (
            "properties".to_string(),
            json!({
                "query": {
                    "type": "string",
                    "description": description,
                },
            }),
        ),
        ("required".to_string(), json!(["query"])),
    ])
}

/// The tools offered while answering a question about `view_name`.
pub fn query_tools(view_name: &str, schema: &str) -> Vec<Tool> {
    vec![
        create_tool(
            INTERMEDIATE_RESULTS_TOOL,
            "If the task can't be finished with one sql query, e.g. pivot with dynamic value, \
             use this function to get intermediate results from the database. \
             Otherwise, if the task can be finished with one sql query, don't use this function. \
             Input should be a fully formed SQL query.",
            query_parameters(view_name, schema),
        ),
        create_tool(
            VALIDATE_QUERY_TOOL,
            "Validate the query before returning it as an answer.",
            query_parameters(view_name, schema),
        ),
    ]
}
