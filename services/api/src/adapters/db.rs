//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DocumentStore` port from the `core` crate. Every collection lives in a
//! single PostgreSQL table of JSONB documents keyed by `(collection, id)`.

use async_trait::async_trait;
use attendance_core::ports::{DocumentStore, Filter, FilterOp, PortError, PortResult, StoredDocument};
use serde_json::{json, Value};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DocumentStore` port.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    /// Creates a new `PgDocumentStore`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct DocumentRecord {
    id: String,
    version: i64,
    body: Json<Value>,
}
impl DocumentRecord {
    fn to_domain(self) -> StoredDocument {
        StoredDocument {
            id: self.id,
            version: self.version as u64,
            body: self.body.0,
        }
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &Filter) {
    let field = filter.field.clone();
    match (filter.op, &filter.value) {
        (FilterOp::Eq, value) => {
            builder
                .push(" AND body -> ")
                .push_bind(field)
                .push(" = ")
                .push_bind(Json(value.clone()));
        }
        (FilterOp::ArrayContains, value) => {
            builder
                .push(" AND body -> ")
                .push_bind(field)
                .push(" @> ")
                .push_bind(Json(json!([value])));
        }
        (op @ (FilterOp::Gte | FilterOp::Lte), Value::Number(n)) => {
            builder
                .push(" AND (body ->> ")
                .push_bind(field)
                .push(if op == FilterOp::Gte { ")::float8 >= " } else { ")::float8 <= " })
                .push_bind(n.as_f64().unwrap_or_default());
        }
        (op @ (FilterOp::Gte | FilterOp::Lte), value) => {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            builder
                .push(" AND body ->> ")
                .push_bind(field)
                .push(if op == FilterOp::Gte { " >= " } else { " <= " })
                .push_bind(text);
        }
    }
}

//=========================================================================================
// `DocumentStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> PortResult<Option<StoredDocument>> {
        let record = sqlx::query_as::<_, DocumentRecord>(
            "SELECT id, version, body FROM documents WHERE collection = $1 AND id = $2",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(DocumentRecord::to_domain))
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        body: Value,
        expected_version: Option<u64>,
    ) -> PortResult<u64> {
        let Some(expected) = expected_version else {
            let version = sqlx::query_scalar::<_, i64>(
                "INSERT INTO documents (collection, id, body) VALUES ($1, $2, $3)
                 ON CONFLICT (collection, id) DO UPDATE
                 SET body = EXCLUDED.body, version = documents.version + 1, updated_at = now()
                 RETURNING version",
            )
            .bind(collection)
            .bind(id)
            .bind(Json(body))
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
            return Ok(version as u64);
        };

        let updated = sqlx::query_scalar::<_, i64>(
            "UPDATE documents SET body = $3, version = version + 1, updated_at = now()
             WHERE collection = $1 AND id = $2 AND version = $4
             RETURNING version",
        )
        .bind(collection)
        .bind(id)
        .bind(Json(body))
        .bind(expected as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        if let Some(version) = updated {
            return Ok(version as u64);
        }

        let current = sqlx::query_scalar::<_, i64>(
            "SELECT version FROM documents WHERE collection = $1 AND id = $2",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        match current {
            None => Err(PortError::NotFound(format!("{}/{}", collection, id))),
            Some(actual) => Err(PortError::Conflict {
                id: id.to_string(),
                expected,
                actual: actual as u64,
            }),
        }
    }

    async fn delete(&self, collection: &str, id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn query(&self, collection: &str, filters: &[Filter]) -> PortResult<Vec<StoredDocument>> {
        let mut builder =
            QueryBuilder::<Postgres>::new("SELECT id, version, body FROM documents WHERE collection = ");
        builder.push_bind(collection.to_string());
        for filter in filters {
            push_filter(&mut builder, filter);
        }
        builder.push(" ORDER BY id ASC");

        let records = builder
            .build_query_as::<DocumentRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(DocumentRecord::to_domain).collect())
    }
}
