//! Conversion of generated SQL into the WikiSQL `query` shape.
//!
//! The accepted dialect is deliberately small: a single-table `SELECT` with at
//! most one aggregate and a flat `AND` chain of `column op value` comparisons.
//! Anything outside that grammar is reported as an error instead of being
//! approximated.

use std::sync::LazyLock;

use regex::Regex;

use crate::query::{Aggregation, Condition, NormalizedQuery, Operator, Value};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("column `{column}` is not part of the table schema")]
    ColumnLookup { column: String },

    #[error("`{clause}` is not a simple `<column> =|>|< <value>` comparison")]
    GrammarMismatch { clause: String },

    #[error("statement has no `SELECT ... FROM` clause")]
    MissingFromClause,
}

struct AggregatePattern {
    aggregation: Aggregation,
    backticked: Regex,
    bare: Regex,
}

static AGGREGATE_PATTERNS: LazyLock<Vec<AggregatePattern>> = LazyLock::new(|| {
    Aggregation::SCAN_ORDER
        .iter()
        .map(|&aggregation| {
            let keyword = aggregation.keyword();
            AggregatePattern {
                aggregation,
                backticked: compile(&format!(r"{keyword}\((DISTINCT\s*)?`([^`]+)`\)")),
                bare: compile(&format!(r"{keyword}\((DISTINCT\s*)?([^)]+)\)")),
            }
        })
        .collect()
});

static SELECT_DISTINCT: LazyLock<Regex> = LazyLock::new(|| compile(r"SELECT\s+DISTINCT\s+"));
static SELECT_LIST: LazyLock<Regex> = LazyLock::new(|| compile(r"(?s)SELECT\s+(.+?)\s+FROM"));
static WHERE_CLAUSE: LazyLock<Regex> = LazyLock::new(|| compile(r"(?s)WHERE\s+(.+)$"));
static COMPARISON: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?s)^(.+?)\s*([=><])\s*(.+)$"));

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid built-in pattern {pattern:?}: {e}"))
}

/// Normalize `sql` against the ordered column names of the queried table.
///
/// # Errors
///
/// * [`NormalizeError::MissingFromClause`] when there is no `SELECT ... FROM`.
/// * [`NormalizeError::ColumnLookup`] when the selected column or a condition
///   column is not in `columns`.
/// * [`NormalizeError::GrammarMismatch`] when a `WHERE` conjunct is not a
///   single `=`, `>` or `<` comparison.
pub fn normalize<S: AsRef<str>>(
    sql: &str,
    columns: &[S],
) -> Result<NormalizedQuery, NormalizeError> {
    let (aggregation, selected) = selection(sql)?;

    let mut query = NormalizedQuery {
        aggregation,
        ..NormalizedQuery::default()
    };
    query.selected_column = as_ordinal(resolve(&selected, columns)?);

    if let Some(clause) = WHERE_CLAUSE.captures(sql).and_then(|caps| caps.get(1)) {
        for conjunct in clause.as_str().split("AND") {
            query.conditions.push(condition(conjunct, columns)?);
        }
    }

    log::debug!("normalized {sql:?} into {query:?}");
    Ok(query)
}

/// Detects the aggregate and returns it along with the raw selected column text.
fn selection(sql: &str) -> Result<(Aggregation, String), NormalizeError> {
    let refined = SELECT_DISTINCT.replace_all(sql, "SELECT ");
    let select_list = SELECT_LIST
        .captures(&refined)
        .and_then(|caps| caps.get(1))
        .ok_or(NormalizeError::MissingFromClause)?
        .as_str();

    for pattern in AGGREGATE_PATTERNS.iter() {
        let captured = pattern
            .backticked
            .captures(sql)
            .or_else(|| pattern.bare.captures(sql))
            .and_then(|caps| caps.get(2));

        if let Some(column) = captured {
            return Ok((pattern.aggregation, column.as_str().to_string()));
        }
    }

    let column = if let Some(rest) = select_list.strip_prefix('`') {
        rest.split('`').next().unwrap_or_default()
    } else {
        select_list.split(',').next().unwrap_or_default()
    };

    Ok((Aggregation::None, column.to_string()))
}

fn condition<S: AsRef<str>>(conjunct: &str, columns: &[S]) -> Result<Condition, NormalizeError> {
    let clause = like_to_equal(conjunct);
    let mismatch = || NormalizeError::GrammarMismatch {
        clause: clause.clone(),
    };

    let caps = COMPARISON.captures(&clause).ok_or_else(mismatch)?;
    let (column, symbol, value) = (&caps[1], &caps[2], &caps[3]);

    // `!=`, `>=`, `<=` and `<>` split around their first symbol character.
    // This also rejects values that start with `<` or `>`, such as `a = >x`.
    if column.trim_end().ends_with(['!', '<', '>']) || value.starts_with(['=', '<', '>']) {
        return Err(mismatch());
    }
    let operator = Operator::from_symbol(symbol).ok_or_else(mismatch)?;

    Ok(Condition {
        column: resolve(column, columns)?,
        operator,
        value: coerce_value(value),
    })
}

/// Rewrites `col LIKE '%value%'` into `col = 'value'`.
fn like_to_equal(conjunct: &str) -> String {
    let clause = conjunct.trim();
    if !clause.contains(" LIKE ") {
        return clause.to_string();
    }

    clause
        .replace(" LIKE ", " = ")
        .replace("'%", "'")
        .replace("%'", "'")
        .replace("%%", "%")
}

fn resolve<S: AsRef<str>>(raw: &str, columns: &[S]) -> Result<usize, NormalizeError> {
    let name = raw.replace('`', "");
    let name = name.trim();

    columns
        .iter()
        .position(|column| column.as_ref() == name)
        .ok_or_else(|| NormalizeError::ColumnLookup {
            column: name.to_string(),
        })
}

fn as_ordinal(index: usize) -> i64 {
    i64::try_from(index).unwrap_or(NormalizedQuery::UNRESOLVED)
}

/// Narrowest type first: integer, then float, then text. Quotes are removed
/// before the numeric checks so `'5'` becomes `5`. Integers keep every digit;
/// a decimal too large for `f64` stays text.
fn coerce_value(raw: &str) -> Value {
    let raw = raw.trim();
    let unquoted = raw.strip_prefix('\'').unwrap_or(raw);
    let unquoted = unquoted.strip_suffix('\'').unwrap_or(unquoted);

    if is_digits(unquoted)
        && let Some(int) = Value::integer(unquoted)
    {
        return int;
    }

    if is_digits(&unquoted.replacen('.', "", 1))
        && let Ok(float) = unquoted.parse::<f64>()
        && float.is_finite()
    {
        return Value::Float(float);
    }

    Value::Text(unquoted.to_string())
}

fn is_digits(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}
