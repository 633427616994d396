use async_trait::async_trait;
use uuid::Uuid;

use crate::core::{Document, Result};

/// Opaque session handle forwarded to the store untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Session {
    id: Uuid,
}

impl Session {
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-call options passed through to the store.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub session: Option<Session>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        Self {
            session: Some(session),
        }
    }
}

/// The document database as seen by a repository: every filter, update and
/// document handed over is already in persisted form.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    async fn insert_one(&self, collection: &str, document: Document, options: &CallOptions) -> Result<()>;

    async fn find(&self, collection: &str, filter: &Document, options: &CallOptions) -> Result<Vec<Document>>;

    /// Returns the number of modified documents.
    async fn update_one(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
        options: &CallOptions,
    ) -> Result<u64>;

    /// Returns the number of deleted documents.
    async fn delete_one(&self, collection: &str, filter: &Document, options: &CallOptions) -> Result<u64>;
}
