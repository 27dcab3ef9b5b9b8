use crate::connection::ConnectionManager;
use application::{ApplicationError, CollectionStore};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, instrument};

/// `CollectionStore` implementation backed by the managed store connection.
///
/// Every operation resolves the connection first: if initialization failed
/// at startup, the call fails with `NotConnected` without touching the
/// store. Backend failures are wrapped into `Store` errors carrying the
/// original cause.
#[derive(Clone)]
pub struct DocumentStore {
    manager: Arc<ConnectionManager>,
}

impl DocumentStore {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl CollectionStore for DocumentStore {
    #[instrument(skip(self, payload))]
    async fn create_document(
        &self,
        collection: &str,
        document_id: &str,
        payload: Map<String, Value>,
    ) -> Result<String, ApplicationError> {
        debug!(collection = %collection, document_id = %document_id, "Writing full document");
        let connection = self.manager.connection()?;
        connection
            .set_document(collection, document_id, payload)
            .map_err(|e| ApplicationError::Store {
                op: "create_document",
                source: Box::new(e),
            })?;
        Ok(document_id.to_string())
    }

    #[instrument(skip(self, payload))]
    async fn update_document(
        &self,
        collection: &str,
        document_id: &str,
        payload: Map<String, Value>,
    ) -> Result<(), ApplicationError> {
        debug!(collection = %collection, document_id = %document_id, "Merging document fields");
        let connection = self.manager.connection()?;
        connection
            .merge_document(collection, document_id, payload)
            .map_err(|e| ApplicationError::Store {
                op: "update_document",
                source: Box::new(e),
            })
    }

    #[instrument(skip(self))]
    async fn list_documents(
        &self,
        collection: &str,
    ) -> Result<Vec<Map<String, Value>>, ApplicationError> {
        debug!(collection = %collection, "Streaming all documents");
        let connection = self.manager.connection()?;
        connection
            .stream_documents(collection)
            .map_err(|e| ApplicationError::Store {
                op: "list_documents",
                source: Box::new(e),
            })
    }
}
