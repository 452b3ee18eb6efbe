//! crates/attendance_core/src/memory.rs
//!
//! An in-process implementation of the `DocumentStore` port. Used by the test suites
//! and by the API when it runs with `STORE_BACKEND=memory`.

use crate::ports::{DocumentStore, Filter, FilterOp, PortError, PortResult, StoredDocument};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

type Collection = BTreeMap<String, (u64, Value)>;

#[derive(Default)]
struct Inner {
    collections: HashMap<String, Collection>,
    failing_writes: HashSet<(String, String)>,
}

#[derive(Default)]
pub struct MemoryDocumentStore {
    inner: Mutex<Inner>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> PortResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| PortError::Unexpected("memory store lock poisoned".to_string()))
    }

    /// Makes every write to `collection/id` fail until cleared. Lets tests exercise
    /// partial failure of multi-document updates.
    pub fn fail_writes_to(&self, collection: &str, id: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner
                .failing_writes
                .insert((collection.to_string(), id.to_string()));
        }
    }

    pub fn clear_write_failures(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failing_writes.clear();
        }
    }
}

fn field<'a>(body: &'a Value, name: &str) -> Option<&'a Value> {
    body.as_object().and_then(|o| o.get(name))
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        _ => None,
    }
}

fn matches(body: &Value, filter: &Filter) -> bool {
    let Some(actual) = field(body, &filter.field) else {
        return false;
    };
    match filter.op {
        FilterOp::Eq => actual == &filter.value,
        FilterOp::Gte => matches!(
            compare(actual, &filter.value),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterOp::Lte => matches!(
            compare(actual, &filter.value),
            Some(Ordering::Less | Ordering::Equal)
        ),
        FilterOp::ArrayContains => actual
            .as_array()
            .map_or(false, |items| items.contains(&filter.value)),
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> PortResult<Option<StoredDocument>> {
        let inner = self.lock()?;
        Ok(inner
            .collections
            .get(collection)
            .and_then(|c| c.get(id))
            .map(|(version, body)| StoredDocument {
                id: id.to_string(),
                version: *version,
                body: body.clone(),
            }))
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        body: Value,
        expected_version: Option<u64>,
    ) -> PortResult<u64> {
        let mut inner = self.lock()?;
        if inner
            .failing_writes
            .contains(&(collection.to_string(), id.to_string()))
        {
            return Err(PortError::Unexpected(format!(
                "write to {}/{} rejected",
                collection, id
            )));
        }
        let docs = inner.collections.entry(collection.to_string()).or_default();
        let current = docs.get(id).map(|(version, _)| *version);
        match (expected_version, current) {
            (Some(_), None) => {
                return Err(PortError::NotFound(format!("{}/{}", collection, id)));
            }
            (Some(expected), Some(actual)) if expected != actual => {
                return Err(PortError::Conflict {
                    id: id.to_string(),
                    expected,
                    actual,
                });
            }
            _ => {}
        }
        let version = current.unwrap_or(0) + 1;
        docs.insert(id.to_string(), (version, body));
        Ok(version)
    }

    async fn delete(&self, collection: &str, id: &str) -> PortResult<()> {
        let mut inner = self.lock()?;
        if let Some(docs) = inner.collections.get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }

    async fn query(&self, collection: &str, filters: &[Filter]) -> PortResult<Vec<StoredDocument>> {
        let inner = self.lock()?;
        let Some(docs) = inner.collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(docs
            .iter()
            .filter(|(_, (_, body))| filters.iter().all(|f| matches(body, f)))
            .map(|(id, (version, body))| StoredDocument {
                id: id.clone(),
                version: *version,
                body: body.clone(),
            })
            .collect())
    }
}
