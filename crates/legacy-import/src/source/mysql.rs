//! MySQL/MariaDB source connector.
//!
//! Reads legacy relational tables through a SQLx connection pool. Criteria
//! become bound WHERE predicates; rows decode into records by column type,
//! with dates rendered in the `%Y-%m-%d %H:%M:%S` shape the payload
//! coercion layer understands.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tracing::{debug, info};

use crate::engine::{Criteria, SortOrder};
use crate::error::Result;
use crate::record::Record;

use super::Source;

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Relational source over a MySQL/MariaDB database.
pub struct MySqlSource {
    pool: MySqlPool,
}

impl MySqlSource {
    /// Connect a pool and verify it with a probe query.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect(url)
            .await?;

        sqlx::query("SELECT 1").fetch_one(&pool).await?;
        info!("connected to MySQL source");

        Ok(MySqlSource { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: MySqlPool) -> Self {
        MySqlSource { pool }
    }

    /// Quote a MySQL identifier. Dotted paths quote each segment.
    fn quote_ident(name: &str) -> String {
        name.split('.')
            .map(|part| format!("`{}`", part.replace('`', "``")))
            .collect::<Vec<_>>()
            .join(".")
    }

    fn where_clause(criteria: &Criteria) -> String {
        if criteria.is_empty() {
            return String::new();
        }
        let predicates: Vec<String> = criteria
            .predicates()
            .iter()
            .map(|(path, _)| format!("{} = ?", Self::quote_ident(path)))
            .collect();
        format!(" WHERE {}", predicates.join(" AND "))
    }

    fn bind_criteria<'q>(
        mut query: sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments>,
        criteria: &Criteria,
    ) -> sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments> {
        for (_, value) in criteria.predicates() {
            query = match value {
                Value::String(s) => query.bind(s.clone()),
                Value::Number(n) if n.is_i64() => query.bind(n.as_i64().unwrap_or_default()),
                Value::Number(n) if n.is_u64() => query.bind(n.as_u64().unwrap_or_default()),
                Value::Number(n) => query.bind(n.as_f64().unwrap_or_default()),
                Value::Bool(b) => query.bind(*b),
                Value::Null => query.bind(Option::<String>::None),
                other => query.bind(other.to_string()),
            };
        }
        query
    }

    /// Convert a row into a record, keyed by column name.
    fn row_to_record(row: &MySqlRow) -> Record {
        let mut record = Record::new();
        for (i, column) in row.columns().iter().enumerate() {
            let name = column.name().to_string();
            let type_name = column.type_info().name().to_uppercase();
            record.insert(name, Self::decode_column(row, i, &type_name));
        }
        record
    }

    fn decode_column(row: &MySqlRow, i: usize, type_name: &str) -> Value {
        let is_null: bool = row.try_get_raw(i).map(|r| r.is_null()).unwrap_or(true);
        if is_null {
            return Value::Null;
        }

        match type_name {
            "BOOLEAN" | "BOOL" => row
                .try_get::<bool, _>(i)
                .map(Value::Bool)
                .unwrap_or(Value::Null),

            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" => row
                .try_get::<i64, _>(i)
                .map(Value::from)
                .unwrap_or(Value::Null),

            "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
            | "BIGINT UNSIGNED" => row
                .try_get::<u64, _>(i)
                .map(Value::from)
                .unwrap_or(Value::Null),

            "FLOAT" => row
                .try_get::<f32, _>(i)
                .ok()
                .and_then(|v| serde_json::Number::from_f64(v as f64))
                .map(Value::Number)
                .unwrap_or(Value::Null),

            "DOUBLE" | "REAL" => row
                .try_get::<f64, _>(i)
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null),

            // Preserve precision as a string; coercion downstream decides.
            "DECIMAL" | "NUMERIC" => row
                .try_get::<rust_decimal::Decimal, _>(i)
                .map(|d| Value::String(d.to_string()))
                .unwrap_or(Value::Null),

            "DATE" => row
                .try_get::<chrono::NaiveDate, _>(i)
                .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
                .unwrap_or(Value::Null),

            "TIME" => row
                .try_get::<chrono::NaiveTime, _>(i)
                .map(|t| Value::String(t.format("%H:%M:%S").to_string()))
                .unwrap_or(Value::Null),

            "DATETIME" | "TIMESTAMP" => row
                .try_get::<chrono::NaiveDateTime, _>(i)
                .map(|dt| Value::String(dt.format("%Y-%m-%d %H:%M:%S").to_string()))
                .unwrap_or(Value::Null),

            "JSON" => row
                .try_get::<Value, _>(i)
                .unwrap_or(Value::Null),

            "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" => row
                .try_get::<Vec<u8>, _>(i)
                .map(|b| Value::String(String::from_utf8_lossy(&b).into_owned()))
                .unwrap_or(Value::Null),

            _ => row
                .try_get::<String, _>(i)
                .map(Value::String)
                .unwrap_or(Value::Null),
        }
    }
}

#[async_trait]
impl Source for MySqlSource {
    fn key(&self) -> &str {
        "mysql"
    }

    async fn count(&self, origin: &str, criteria: &Criteria) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {}{}",
            Self::quote_ident(origin),
            Self::where_clause(criteria)
        );
        debug!(origin, sql = %sql, "counting");

        let query = Self::bind_criteria(sqlx::query(&sql), criteria);
        let row = query.fetch_one(&self.pool).await?;
        Ok(row.try_get::<i64, _>(0)?)
    }

    async fn retrieve(
        &self,
        origin: &str,
        criteria: &Criteria,
        fields: &[String],
        sort: &[(String, SortOrder)],
        limit: usize,
        skip: i64,
    ) -> Result<Vec<Record>> {
        let columns = if fields.is_empty() {
            "*".to_string()
        } else {
            fields
                .iter()
                .map(|f| Self::quote_ident(f))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let order = if sort.is_empty() {
            String::new()
        } else {
            let parts: Vec<String> = sort
                .iter()
                .map(|(field, order)| {
                    let dir = match order {
                        SortOrder::Asc => "ASC",
                        SortOrder::Desc => "DESC",
                    };
                    format!("{} {}", Self::quote_ident(field), dir)
                })
                .collect();
            format!(" ORDER BY {}", parts.join(", "))
        };

        let sql = format!(
            "SELECT {} FROM {}{}{} LIMIT ? OFFSET ?",
            columns,
            Self::quote_ident(origin),
            Self::where_clause(criteria),
            order
        );
        debug!(origin, sql = %sql, limit, skip, "retrieving page");

        let query = Self::bind_criteria(sqlx::query(&sql), criteria)
            .bind(limit as i64)
            .bind(skip.max(0));

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(Self::row_to_record).collect())
    }
}
