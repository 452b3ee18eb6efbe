//! crates/attendance_core/src/ports.rs
//!
//! Defines the service contracts (traits) the attendance engine depends on.
//! The engine only ever talks to a generic document store; concrete adapters
//! (in-memory, Postgres) live outside the domain logic.

use async_trait::async_trait;
use serde_json::Value;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from the underlying store.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Version conflict on {id}: expected {expected}, found {actual}")]
    Conflict {
        id: String,
        expected: u64,
        actual: u64,
    },
    #[error("Malformed document {collection}/{id}: {reason}")]
    Malformed {
        collection: String,
        id: String,
        reason: String,
    },
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Documents and Filters
//=========================================================================================

/// A raw document as held by the store, before schema decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub version: u64,
    pub body: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    /// String or numeric `>=`. ISO dates compare correctly as strings.
    Gte,
    Lte,
    /// The field is an array holding the value.
    ArrayContains,
}

/// A predicate over one top-level field of a document body.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self { field: field.to_string(), op: FilterOp::Eq, value: value.into() }
    }

    pub fn gte(field: &str, value: impl Into<Value>) -> Self {
        Self { field: field.to_string(), op: FilterOp::Gte, value: value.into() }
    }

    pub fn lte(field: &str, value: impl Into<Value>) -> Self {
        Self { field: field.to_string(), op: FilterOp::Lte, value: value.into() }
    }

    pub fn array_contains(field: &str, value: impl Into<Value>) -> Self {
        Self { field: field.to_string(), op: FilterOp::ArrayContains, value: value.into() }
    }
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> PortResult<Option<StoredDocument>>;

    /// Writes `body` under `id` and returns the new version.
    ///
    /// Without `expected_version` this is an unconditional upsert. With it, the
    /// write only happens when the stored version matches; otherwise it fails with
    /// `Conflict`, or `NotFound` when there is nothing stored yet.
    async fn set(
        &self,
        collection: &str,
        id: &str,
        body: Value,
        expected_version: Option<u64>,
    ) -> PortResult<u64>;

    /// Removes a document. Deleting a missing document is not an error.
    async fn delete(&self, collection: &str, id: &str) -> PortResult<()>;

    /// Returns every document matching all filters, ordered by document id.
    async fn query(&self, collection: &str, filters: &[Filter]) -> PortResult<Vec<StoredDocument>>;
}
