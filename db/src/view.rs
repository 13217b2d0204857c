//! SQL text helpers for registering WikiSQL tables as temporary views.

use std::borrow::Cow;
use std::collections::HashSet;

/// Longest identifier Postgres keeps; longer ones are silently truncated.
pub const MAX_IDENTIFIER_BYTES: usize = 63;

/// The name Postgres stores for identifier `name`.
#[must_use]
pub fn stored_identifier(name: &str) -> &str {
    if name.len() <= MAX_IDENTIFIER_BYTES {
        return name;
    }

    let mut end = MAX_IDENTIFIER_BYTES;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// Quote `name` as a Postgres identifier.
#[must_use]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote `value` as a string literal.
#[must_use]
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Build the statement that exposes `rows` under `name` for the rest of the
/// session. Every cell becomes a text literal; the header names the columns.
///
/// # Errors
///
/// Fails when there is no header or no rows, when a row's width differs from
/// the header, or when two column names are equal once truncated to
/// [`MAX_IDENTIFIER_BYTES`].
pub fn create_temp_view_statement(
    name: &str,
    header: &[String],
    rows: &[Vec<String>],
) -> Result<String, String> {
    if header.is_empty() {
        return Err(format!("table {name} has no columns"));
    }
    if rows.is_empty() {
        return Err(format!("table {name} has no rows"));
    }

    let mut stored = HashSet::with_capacity(header.len());
    for column in header {
        if !stored.insert(stored_identifier(column)) {
            return Err(format!(
                "table {name} has more than one column named {:?} after truncation to {MAX_IDENTIFIER_BYTES} bytes",
                stored_identifier(column)
            ));
        }
    }

    let mut values = Vec::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        if row.len() != header.len() {
            return Err(format!(
                "row {idx} of table {name} has {} cells, expected {}",
                row.len(),
                header.len()
            ));
        }

        let cells = row
            .iter()
            .map(|cell| quote_literal(cell))
            .collect::<Vec<_>>()
            .join(",");
        values.push(format!("({cells})"));
    }

    let columns = header
        .iter()
        .map(|column| quote_ident(column))
        .collect::<Vec<_>>()
        .join(",");

    Ok(format!(
        "CREATE OR REPLACE TEMP VIEW {} AS SELECT * FROM (VALUES {}) AS t({columns});",
        quote_ident(name),
        values.join(",")
    ))
}

/// Rewrite backtick-quoted identifiers into double-quoted ones. Backticks
/// inside string literals are left alone.
#[must_use]
pub fn backticks_to_double_quotes(sql: &str) -> Cow<'_, str> {
    if !sql.contains('`') {
        return Cow::Borrowed(sql);
    }

    let mut out = String::with_capacity(sql.len());
    let mut in_literal = false;
    let mut in_ident = false;

    for ch in sql.chars() {
        match ch {
            '\'' if !in_ident => {
                in_literal = !in_literal;
                out.push(ch);
            }
            '`' if !in_literal => {
                in_ident = !in_ident;
                out.push('"');
            }
            '"' if in_ident => out.push_str("\"\""),
            _ => out.push(ch),
        }
    }

    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn builds_values_view() {
        let statement = create_temp_view_statement(
            "1-10015132-11",
            &strings(&["Player", "No."]),
            &[strings(&["Antonio Lang", "21"]), strings(&["Voshon Lenard", "2"])],
        )
        .unwrap();

        assert_eq!(
            statement,
            r#"CREATE OR REPLACE TEMP VIEW "1-10015132-11" AS SELECT * FROM (VALUES ('Antonio Lang','21'),('Voshon Lenard','2')) AS t("Player","No.");"#
        );
    }

    #[test]
    fn escapes_quotes() {
        let statement = create_temp_view_statement(
            "t",
            &strings(&["say \"hi\""]),
            &[strings(&["it's"])],
        )
        .unwrap();

        assert!(statement.contains("('it''s')"));
        assert!(statement.contains(r#"t("say ""hi""")"#));
    }

    #[test]
    fn rejects_ragged_and_empty_tables() {
        assert!(create_temp_view_statement("t", &strings(&["a"]), &[]).is_err());
        assert!(create_temp_view_statement("t", &[], &[strings(&["x"])]).is_err());
        assert!(
            create_temp_view_statement("t", &strings(&["a", "b"]), &[strings(&["x"])]).is_err()
        );
    }

    #[test]
    fn long_identifiers_are_clipped_on_char_boundaries() {
        let ascii = "c".repeat(70);
        assert_eq!(stored_identifier(&ascii), &ascii[..63]);
        assert_eq!(stored_identifier("Player"), "Player");

        let wide = format!("{}é", "c".repeat(62));
        assert_eq!(stored_identifier(&wide), "c".repeat(62));
    }

    #[test]
    fn rejects_columns_that_collide_after_truncation() {
        let prefix = "p".repeat(63);
        let header = vec![format!("{prefix} (a)"), format!("{prefix} (b)")];
        let err = create_temp_view_statement("t", &header, &[strings(&["1", "2"])]).unwrap_err();
        assert!(err.contains("after truncation"));

        assert!(create_temp_view_statement("t", &strings(&["a", "a"]), &[strings(&["1", "2"])]).is_err());
        assert!(create_temp_view_statement("t", &header[..1], &[strings(&["1"])]).is_ok());
    }

    #[test]
    fn rewrites_backticks_outside_literals() {
        assert_eq!(
            backticks_to_double_quotes("SELECT `No.` FROM `1-1` WHERE `Player` = 'a`b'"),
            r#"SELECT "No." FROM "1-1" WHERE "Player" = 'a`b'"#
        );
        assert!(matches!(
            backticks_to_double_quotes("SELECT 1"),
            Cow::Borrowed("SELECT 1")
        ));
    }
}
