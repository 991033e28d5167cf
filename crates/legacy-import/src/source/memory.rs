//! In-memory source: seeded origins for tests and embedded runs.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::engine::{Criteria, SortOrder};
use crate::error::{ImportError, Result};
use crate::record::{get_path, Record};

use super::Source;

/// A source over fixed, in-memory origins.
#[derive(Debug, Default)]
pub struct MemorySource {
    origins: HashMap<String, Vec<Record>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an origin with records, preserving their order.
    pub fn with_origin(mut self, name: impl Into<String>, records: Vec<Record>) -> Self {
        self.origins.insert(name.into(), records);
        self
    }

    fn origin(&self, name: &str) -> Result<&Vec<Record>> {
        self.origins
            .get(name)
            .ok_or_else(|| ImportError::Source(format!("unknown origin `{}`", name)))
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => a.to_string().cmp(&b.to_string()),
    }
}

#[async_trait]
impl Source for MemorySource {
    fn key(&self) -> &str {
        "memory"
    }

    async fn count(&self, origin: &str, criteria: &Criteria) -> Result<i64> {
        Ok(self
            .origin(origin)?
            .iter()
            .filter(|r| criteria.matches(r))
            .count() as i64)
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
        let mut matched: Vec<Record> = self
            .origin(origin)?
            .iter()
            .filter(|r| criteria.matches(r))
            .cloned()
            .collect();

        for (path, order) in sort.iter().rev() {
            matched.sort_by(|a, b| {
                let ord = compare_values(
                    get_path(a, path).unwrap_or(&Value::Null),
                    get_path(b, path).unwrap_or(&Value::Null),
                );
                match order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                }
            });
        }

        let page = matched
            .into_iter()
            .skip(skip.max(0) as usize)
            .take(limit)
            .map(|record| {
                if fields.is_empty() {
                    record
                } else {
                    record
                        .into_iter()
                        .filter(|(k, _)| fields.iter().any(|f| f == k))
                        .collect()
                }
            })
            .collect();

        Ok(page)
    }
}
