use crate::view::{backticks_to_double_quotes, quote_ident};
use crate::{DatabaseResult, SchemaInfo};

use super::Database;
use serde_json::{Value, json};
use sqlx::postgres::PgRow;
use sqlx::{Column, Connection, PgConnection, Row, TypeInfo};
use std::{collections::HashMap, fmt::Display};

#[derive(Debug)]
pub struct PostgresDatabase {
    connection: PgConnection,
}

impl PostgresDatabase {
    /// Open a single connection to `url`.
    ///
    /// # Errors
    ///
    /// Fails when the server cannot be reached or rejects the credentials.
    pub async fn new(url: impl Display) -> Result<Self, String> {
        let connection = PgConnection::connect(&url.to_string())
            .await
            .map_err(|e| e.to_string())?;
        Ok(Self { connection })
    }
}

fn decode_cell(row: &PgRow, i: usize, type_name: &str) -> Value {
    match type_name {
        "UUID" => row
            .try_get::<uuid::Uuid, _>(i)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),

        "TEXT" | "VARCHAR" | "CHAR" | "NAME" => row
            .try_get::<String, _>(i)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),

        "DATE" => row
            .try_get::<chrono::NaiveDate, _>(i)
            .map(|v| json!(v.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null),

        "TIMESTAMP" => row
            .try_get::<chrono::NaiveDateTime, _>(i)
            .map(|dt| json!(dt.format("%Y-%m-%dT%H:%M:%S").to_string()))
            .unwrap_or(Value::Null),

        "TIMESTAMPTZ" => row
            .try_get::<chrono::DateTime<chrono::Utc>, _>(i)
            .map(|dt| json!(dt.to_rfc3339()))
            .unwrap_or(Value::Null),

        "INT2" => row
            .try_get::<i16, _>(i)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),

        "INT4" => row
            .try_get::<i32, _>(i)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),

        "INT8" => row
            .try_get::<i64, _>(i)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),

        "FLOAT4" => row
            .try_get::<f32, _>(i)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),

        "FLOAT8" => row
            .try_get::<f64, _>(i)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),

        "NUMERIC" => row
            .try_get::<rust_decimal::Decimal, _>(i)
            .map(|v| json!(v.to_string()))
            .unwrap_or(Value::Null),

        "JSON" | "JSONB" => row.try_get::<Value, _>(i).unwrap_or(Value::Null),

        "BOOL" => row
            .try_get::<bool, _>(i)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),

        _ => row
            .try_get_raw(i)
            .ok()
            .and_then(|raw| raw.as_bytes().ok().map(<[u8]>::to_vec))
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .map_or(Value::Null, |s| json!(s)),
    }
}

#[async_trait::async_trait]
impl Database for PostgresDatabase {
    async fn get_results(&mut self, query: &str) -> Result<DatabaseResult, String> {
        let query = backticks_to_double_quotes(query);
        let rows = sqlx::query(&query)
            .fetch_all(&mut self.connection)
            .await
            .map_err(|e| e.to_string())?;

        let mut results = DatabaseResult::default();

        if let Some(first) = rows.first() {
            for col in first.columns() {
                results
                    .headers
                    .push((col.name().to_string(), col.type_info().name().to_string()));
            }
        } else {
            return Ok(results);
        }

        for row in rows {
            let row_data = row
                .columns()
                .iter()
                .enumerate()
                .map(|(i, col)| decode_cell(&row, i, col.type_info().name()))
                .collect();

            results.rows.push(row_data);
        }

        Ok(results)
    }

    async fn execute(&mut self, query: &str) -> Result<String, String> {
        let query = backticks_to_double_quotes(query);
        let outcome = sqlx::query(&query)
            .execute(&mut self.connection)
            .await
            .map_err(|e| e.to_string())?;

        Ok(format!("ok, {} rows affected", outcome.rows_affected()))
    }

    async fn get_schema(&mut self) -> Result<SchemaInfo, String> {
        let columns = sqlx::query(
            r#"SELECT
                c.table_name::text,
                c.column_name::text,
                c.udt_name::text AS pg_type
            FROM information_schema.columns c
            WHERE c.table_schema = 'public'

            UNION ALL

            SELECT
                c.relname::text AS table_name,
                a.attname::text AS column_name,
                t.typname::text AS pg_type
            FROM pg_class c
            JOIN pg_namespace n ON n.oid = c.relnamespace
            JOIN pg_attribute a ON a.attrelid = c.oid
            JOIN pg_type t ON t.oid = a.atttypid
            WHERE c.relpersistence = 't'
              AND a.attnum > 0
              AND NOT a.attisdropped;"#,
        )
        .fetch_all(&mut self.connection)
        .await
        .map_err(|_| "Could not get columns".to_string())?;

        let mut schema_map: HashMap<String, Vec<(String, String)>> = HashMap::new();

        for row in columns {
            let table_name: String = row.get(0);
            schema_map
                .entry(table_name)
                .or_default()
                .push((row.get(1), row.get(2)));
        }

        let fk_rows = sqlx::query(
            r"
                SELECT
                    tc.table_name::text AS referencing_table,
                    kcu.column_name::text AS referencing_column,
                    ccu.table_name::text AS referenced_table,
                    ccu.column_name::text AS referenced_column
                FROM
                    information_schema.table_constraints AS tc
                JOIN information_schema.key_column_usage AS kcu
                    ON tc.constraint_name = kcu.constraint_name
                    AND tc.table_schema = kcu.table_schema
                JOIN information_schema.constraint_column_usage AS ccu
                    ON ccu.constraint_name = tc.constraint_name
                    AND ccu.table_schema = tc.table_schema
                WHERE tc.constraint_type = 'FOREIGN KEY'
                  AND tc.table_schema = 'public';
                ",
        )
        .fetch_all(&mut self.connection)
        .await
        .map_err(|_| "Could not get foreign key info".to_string())?;

        let mut fk_map: HashMap<String, Vec<String>> = HashMap::new();

        for row in fk_rows {
            let referencing_table: String = row.get("referencing_table");
            let referencing_column: String = row.get("referencing_column");
            let referenced_table: String = row.get("referenced_table");
            let referenced_column: String = row.get("referenced_column");

            fk_map
                .entry(format!("{referenced_table}.{referenced_column}"))
                .or_default()
                .push(format!("{referencing_table}.{referencing_column}"));
        }

        Ok((schema_map, fk_map))
    }

    async fn columns(&mut self, relation: &str) -> Result<Vec<String>, String> {
        let rows = sqlx::query(
            r"SELECT a.attname::text
            FROM pg_attribute a
            WHERE a.attrelid = to_regclass($1)
              AND a.attnum > 0
              AND NOT a.attisdropped
            ORDER BY a.attnum;",
        )
        .bind(quote_ident(relation))
        .fetch_all(&mut self.connection)
        .await
        .map_err(|e| e.to_string())?;

        if rows.is_empty() {
            return Err(format!("relation {relation} does not exist"));
        }

        Ok(rows.iter().map(|row| row.get::<String, _>(0)).collect())
    }
}
