use std::fs;

use wikisql::{
    Aggregation, Condition, NormalizeError, NormalizedQuery, Operator, RecordWriter, Value,
    WikiSqlRecord, normalize,
};

fn schema() -> Vec<String> {
    ["Player", "No.", "Nationality", "Position", "Years in Toronto", "School/Club Team"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

#[test]
fn plain_select_resolves_column() {
    let columns = schema();
    for (idx, column) in columns.iter().enumerate() {
        let sql = format!("SELECT `{column}` FROM `1-10015132-11`");
        let query = normalize(&sql, &columns).unwrap();

        assert_eq!(query.selected_index(), Some(idx));
        assert_eq!(query.aggregation, Aggregation::None);
        assert!(query.conditions.is_empty());
    }
}

#[test]
fn unquoted_select_takes_first_column() {
    let query = normalize("SELECT Position, Player FROM t", &schema()).unwrap();
    assert_eq!(query.selected_column, 3);
}

#[test]
fn every_aggregate_keyword_is_detected() {
    let cases = [
        ("MAX", Aggregation::Max, 1),
        ("MIN", Aggregation::Min, 2),
        ("COUNT", Aggregation::Count, 3),
        ("SUM", Aggregation::Sum, 4),
        ("AVG", Aggregation::Avg, 5),
    ];

    for (keyword, aggregation, ordinal) in cases {
        let backticked = normalize(&format!("SELECT {keyword}(`No.`) FROM t"), &schema()).unwrap();
        assert_eq!(backticked.aggregation, aggregation);
        assert_eq!(backticked.aggregation.ordinal(), ordinal);
        assert_eq!(backticked.selected_column, 1);

        let bare = normalize(&format!("SELECT {keyword}(Player) FROM t"), &schema()).unwrap();
        assert_eq!(bare.aggregation, aggregation);
        assert_eq!(bare.selected_column, 0);
    }
}

#[test]
fn multiple_aggregates_resolve_by_fixed_priority() {
    let query = normalize("SELECT AVG(`No.`), MIN(Player) FROM t", &schema()).unwrap();
    assert_eq!(query.aggregation, Aggregation::Min);
    assert_eq!(query.selected_column, 0);
}

#[test]
fn where_conditions_keep_order_and_coerce_quoted_numbers() {
    let query = normalize(
        "SELECT `Player` FROM t WHERE `No.` = '5' AND `Years in Toronto` > 3",
        &schema(),
    )
    .unwrap();

    assert_eq!(
        query.conditions,
        vec![
            Condition::new(1, Operator::Equal, Value::Int(5)),
            Condition::new(4, Operator::Greater, Value::Int(3)),
        ]
    );
}

#[test]
fn duplicate_conditions_are_kept() {
    let query = normalize(
        "SELECT Player FROM t WHERE Position = 'Guard' AND Position = 'Guard'",
        &schema(),
    )
    .unwrap();

    assert_eq!(query.conditions.len(), 2);
    assert_eq!(query.conditions[0], query.conditions[1]);
}

#[test]
fn like_becomes_equality() {
    let query = normalize(
        "SELECT `No.` FROM t WHERE Player LIKE '%smith%'",
        &schema(),
    )
    .unwrap();

    assert_eq!(
        query.conditions,
        vec![Condition::new(0, Operator::Equal, Value::Text("smith".into()))]
    );
}

#[test]
fn multiline_where_clause() {
    let sql = "SELECT `Player`\nFROM t\nWHERE `Nationality` = 'United States'\n  AND `No.` < 10.5";
    let query = normalize(sql, &schema()).unwrap();

    assert_eq!(
        query.conditions,
        vec![
            Condition::new(2, Operator::Equal, Value::Text("United States".into())),
            Condition::new(1, Operator::Less, Value::Float(10.5)),
        ]
    );
}

#[test]
fn unknown_select_column_is_a_lookup_error() {
    let err = normalize("SELECT Height FROM t", &schema()).unwrap_err();
    assert_eq!(
        err,
        NormalizeError::ColumnLookup {
            column: "Height".into()
        }
    );
}

#[test]
fn unknown_condition_column_is_a_lookup_error() {
    let err = normalize("SELECT Player FROM t WHERE Weight > 200", &schema()).unwrap_err();
    assert!(matches!(err, NormalizeError::ColumnLookup { column } if column == "Weight"));
}

#[test]
fn unsupported_operators_are_grammar_errors() {
    for op in ["!=", ">=", "<=", "<>"] {
        let sql = format!("SELECT Player FROM t WHERE `No.` {op} 3");
        let err = normalize(&sql, &schema()).unwrap_err();
        assert!(
            matches!(err, NormalizeError::GrammarMismatch { .. }),
            "{op} produced {err:?}"
        );
    }
}

#[test]
fn conjunct_without_operator_is_a_grammar_error() {
    let err = normalize("SELECT Player FROM t WHERE Position IS NULL", &schema()).unwrap_err();
    assert_eq!(
        err,
        NormalizeError::GrammarMismatch {
            clause: "Position IS NULL".into()
        }
    );
}

#[test]
fn missing_from_is_reported() {
    let err = normalize("SELECT Player", &schema()).unwrap_err();
    assert_eq!(err, NormalizeError::MissingFromClause);

    let err = normalize("SELECT MAX(Player)", &schema()).unwrap_err();
    assert_eq!(err, NormalizeError::MissingFromClause);
}

#[test]
fn records_survive_a_jsonl_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("predictions.jsonl");

    let records = vec![
        WikiSqlRecord::from(
            normalize(
                "SELECT COUNT(`Player`) FROM t WHERE `Position` LIKE '%Guard%' AND `No.` > 2.5",
                &schema(),
            )
            .unwrap(),
        ),
        WikiSqlRecord::failed(NormalizeError::MissingFromClause),
        WikiSqlRecord::from(NormalizedQuery::default()),
    ];

    let mut writer = RecordWriter::create(&path).unwrap();
    for record in &records {
        writer.write(record).unwrap();
    }
    drop(writer);

    let parsed: Vec<WikiSqlRecord> = fs::read_to_string(&path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(parsed, records);
}

#[test]
fn wide_integer_literals_round_trip_exactly() {
    let columns = schema();
    for digits in ["12345678901234567891".to_string(), "9".repeat(400)] {
        let sql = format!("SELECT Player FROM t WHERE `No.` = {digits}");
        let record = WikiSqlRecord::from(normalize(&sql, &columns).unwrap());

        let line = record.to_json_line().unwrap();
        assert_eq!(
            line,
            format!(r#"{{"query":{{"sel":0,"conds":[[1,0,{digits}]],"agg":0}},"error":""}}"#)
        );

        let parsed: WikiSqlRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, record);
        assert_eq!(parsed.query.conditions[0].value, Value::BigInt(digits));
    }
}
