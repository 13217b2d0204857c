use std::fmt::{self, Display};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de, ser};
use serde_json::value::RawValue;

/// Aggregation applied to the selected column.
///
/// Serialized as its ordinal in `[NONE, MAX, MIN, COUNT, SUM, AVG]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Aggregation {
    #[default]
    None,
    Max,
    Min,
    Count,
    Sum,
    Avg,
}

impl Aggregation {
    /// Scan order used when detecting an aggregate in SQL text. The first
    /// keyword found wins, whatever its position in the statement.
    pub const SCAN_ORDER: [Aggregation; 5] = [
        Aggregation::Max,
        Aggregation::Min,
        Aggregation::Count,
        Aggregation::Sum,
        Aggregation::Avg,
    ];

    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            Aggregation::None => "",
            Aggregation::Max => "MAX",
            Aggregation::Min => "MIN",
            Aggregation::Count => "COUNT",
            Aggregation::Sum => "SUM",
            Aggregation::Avg => "AVG",
        }
    }

    #[must_use]
    pub fn ordinal(self) -> u8 {
        self as u8
    }
}

impl From<Aggregation> for u8 {
    fn from(agg: Aggregation) -> Self {
        agg.ordinal()
    }
}

impl TryFrom<u8> for Aggregation {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Aggregation::None),
            1 => Ok(Aggregation::Max),
            2 => Ok(Aggregation::Min),
            3 => Ok(Aggregation::Count),
            4 => Ok(Aggregation::Sum),
            5 => Ok(Aggregation::Avg),
            other => Err(format!("unknown aggregation ordinal {other}")),
        }
    }
}

/// Comparison operator of a condition, serialized as its ordinal in
/// `[=, >, <, OP]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Operator {
    Equal,
    Greater,
    Less,
    /// Placeholder slot for operators outside the grammar. Never produced by
    /// the normalizer.
    Op,
}

impl Operator {
    #[must_use]
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "=" => Some(Operator::Equal),
            ">" => Some(Operator::Greater),
            "<" => Some(Operator::Less),
            _ => None,
        }
    }

    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Equal => "=",
            Operator::Greater => ">",
            Operator::Less => "<",
            Operator::Op => "OP",
        }
    }
}

impl From<Operator> for u8 {
    fn from(op: Operator) -> Self {
        op as u8
    }
}

impl TryFrom<u8> for Operator {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Operator::Equal),
            1 => Ok(Operator::Greater),
            2 => Ok(Operator::Less),
            3 => Ok(Operator::Op),
            other => Err(format!("unknown operator ordinal {other}")),
        }
    }
}

/// Literal on the right-hand side of a condition.
///
/// Numbers are bare JSON numbers on the wire and text is a JSON string.
/// Integers too wide for `i64` keep every digit.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    /// Decimal digits of an integer outside the `i64` range.
    BigInt(String),
    Float(f64),
    Text(String),
}

impl Value {
    /// Parse an integer literal (`-?[0-9]+`), narrowing to [`Value::Int`]
    /// when it fits.
    #[must_use]
    pub fn integer(literal: &str) -> Option<Self> {
        let digits = literal.strip_prefix('-').unwrap_or(literal);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        if let Ok(int) = literal.parse::<i64>() {
            return Some(Value::Int(int));
        }

        let sign = if digits.len() < literal.len() { "-" } else { "" };
        Some(Value::BigInt(format!(
            "{sign}{}",
            digits.trim_start_matches('0')
        )))
    }

    fn from_json(json: &str) -> Result<Self, String> {
        let json = json.trim();
        if json.starts_with('"') {
            return serde_json::from_str(json)
                .map(Value::Text)
                .map_err(|e| e.to_string());
        }

        if let Some(int) = Value::integer(json) {
            return Ok(int);
        }

        match json.parse::<f64>() {
            Ok(float) if float.is_finite() => Ok(Value::Float(float)),
            _ => Err(format!("expected a number or a string, found {json}")),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::BigInt(digits) => RawValue::from_string(digits.clone())
                .map_err(ser::Error::custom)?
                .serialize(serializer),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::Text(v) => serializer.serialize_str(v),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Box::<RawValue>::deserialize(deserializer)?;
        Value::from_json(raw.get()).map_err(de::Error::custom)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::BigInt(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "'{v}'"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

/// One `column op value` conjunct. On the wire this is a three element array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(usize, Operator, Value)", into = "(usize, Operator, Value)")]
pub struct Condition {
    pub column: usize,
    pub operator: Operator,
    pub value: Value,
}

impl Condition {
    #[must_use]
    pub fn new(column: usize, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            column,
            operator,
            value: value.into(),
        }
    }
}

impl From<(usize, Operator, Value)> for Condition {
    fn from((column, operator, value): (usize, Operator, Value)) -> Self {
        Self {
            column,
            operator,
            value,
        }
    }
}

impl From<Condition> for (usize, Operator, Value) {
    fn from(cond: Condition) -> Self {
        (cond.column, cond.operator, cond.value)
    }
}

/// The `query` object of a WikiSQL prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedQuery {
    /// Index of the selected column, [`NormalizedQuery::UNRESOLVED`] until known.
    #[serde(rename = "sel")]
    pub selected_column: i64,
    #[serde(rename = "conds")]
    pub conditions: Vec<Condition>,
    #[serde(rename = "agg")]
    pub aggregation: Aggregation,
}

impl NormalizedQuery {
    pub const UNRESOLVED: i64 = -1;

    /// The selected column as a schema index, if it has been resolved.
    #[must_use]
    pub fn selected_index(&self) -> Option<usize> {
        usize::try_from(self.selected_column).ok()
    }
}

impl Default for NormalizedQuery {
    fn default() -> Self {
        Self {
            selected_column: Self::UNRESOLVED,
            conditions: vec![],
            aggregation: Aggregation::None,
        }
    }
}

/// A full output line: the normalized query plus an error slot.
///
/// The normalizer never writes `error`; callers fill it in when they catch a
/// failure and still want to emit a line for the question.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WikiSqlRecord {
    pub query: NormalizedQuery,
    pub error: String,
}

impl WikiSqlRecord {
    /// An unresolved query carrying `error` as its message.
    #[must_use]
    pub fn failed(error: impl Display) -> Self {
        Self {
            query: NormalizedQuery::default(),
            error: error.to_string(),
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }

    /// Serialize as a single JSON line without the trailing newline.
    ///
    /// # Errors
    ///
    /// Propagates serializer failures from `serde_json`.
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<NormalizedQuery> for WikiSqlRecord {
    fn from(query: NormalizedQuery) -> Self {
        Self {
            query,
            error: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_uses_wikisql_field_names() {
        let record = WikiSqlRecord::from(NormalizedQuery {
            selected_column: 2,
            conditions: vec![
                Condition::new(0, Operator::Equal, Value::Int(5)),
                Condition::new(1, Operator::Less, "smith"),
            ],
            aggregation: Aggregation::Count,
        });

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({
                "query": {"sel": 2, "conds": [[0, 0, 5], [1, 2, "smith"]], "agg": 3},
                "error": "",
            })
        );
    }

    #[test]
    fn field_order_matches_wikisql_lines() {
        let line = WikiSqlRecord::default().to_json_line().unwrap();
        assert_eq!(line, r#"{"query":{"sel":-1,"conds":[],"agg":0},"error":""}"#);
    }

    #[test]
    fn failed_record_is_unresolved() {
        let record = WikiSqlRecord::failed("boom");
        assert!(record.is_error());
        assert_eq!(record.query.selected_index(), None);
        assert_eq!(record.query.aggregation, Aggregation::None);
    }

    #[test]
    fn rejects_out_of_range_ordinals() {
        let err = serde_json::from_value::<NormalizedQuery>(json!({
            "sel": 0, "conds": [], "agg": 9,
        }));
        assert!(err.is_err());

        let err = serde_json::from_value::<Condition>(json!([0, 7, 1]));
        assert!(err.is_err());
    }

    #[test]
    fn float_and_int_values_stay_distinct() {
        let cond: Condition = serde_json::from_value(json!([1, 1, 2.5])).unwrap();
        assert_eq!(cond.value, Value::Float(2.5));

        let cond: Condition = serde_json::from_value(json!([1, 1, 2])).unwrap();
        assert_eq!(cond.value, Value::Int(2));
    }

    #[test]
    fn wide_integers_keep_every_digit() {
        let digits = "9".repeat(400);
        let cond = Condition::new(1, Operator::Equal, Value::integer(&digits).unwrap());
        assert_eq!(cond.value, Value::BigInt(digits.clone()));

        let line = serde_json::to_string(&cond).unwrap();
        assert_eq!(line, format!("[1,0,{digits}]"));

        let parsed: Condition = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, cond);
    }

    #[test]
    fn integer_literals_narrow_when_they_fit() {
        assert_eq!(Value::integer("42"), Some(Value::Int(42)));
        assert_eq!(Value::integer("-7"), Some(Value::Int(-7)));
        assert_eq!(
            Value::integer("0012345678901234567891"),
            Some(Value::BigInt("12345678901234567891".into()))
        );
        assert_eq!(Value::integer("4.5"), None);
        assert_eq!(Value::integer("-"), None);
    }

    #[test]
    fn text_values_are_json_strings() {
        let cond: Condition = serde_json::from_str(r#"[0,0,"12 \"x\""]"#).unwrap();
        assert_eq!(cond.value, Value::Text(r#"12 "x""#.into()));

        assert!(serde_json::from_str::<Condition>("[0,0,null]").is_err());
    }

    #[test]
    fn conditions_render_as_sql() {
        let cond = Condition::new(3, Operator::Greater, Value::Float(2.5));
        assert_eq!(
            format!("{} {} {}", cond.column, cond.operator.symbol(), cond.value),
            "3 > 2.5"
        );
        assert_eq!(Value::from("Smith").to_string(), "'Smith'");
    }
}
