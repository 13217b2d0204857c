//! WikiSQL benchmark plumbing: dataset line formats and the normalizer that
//! turns generated SQL into WikiSQL `query` records.

pub mod dataset;
pub mod normalize;
pub mod query;

pub use dataset::{DatasetError, QuestionDef, RecordWriter, TableDef, read_questions, read_tables};
pub use normalize::{NormalizeError, normalize};
pub use query::{Aggregation, Condition, NormalizedQuery, Operator, Value, WikiSqlRecord};
