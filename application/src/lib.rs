use async_trait::async_trait;
use domain::{DomainError, Lead, LeadPatch, LeadRecord};
use serde::Serialize;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

// --- Application Errors ---
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("Lead validation failed: {0}")]
    Validation(#[from] DomainError),
    #[error("Document store not connected: {0}")]
    NotConnected(String),
    #[error("Store operation '{op}' failed: {source}")]
    Store {
        op: &'static str,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Store operation '{op}' timed out after {timeout_ms} ms")]
    Timeout { op: &'static str, timeout_ms: u64 },
}

// --- Infrastructure Interface (Trait) ---

/// Generic operations against a named document collection, independent of
/// the entity stored in it.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Writes `payload` as the full content of the document, replacing any
    /// existing content at that id. Returns the document id.
    async fn create_document(
        &self,
        collection: &str,
        document_id: &str,
        payload: Map<String, Value>,
    ) -> Result<String, ApplicationError>;
    /// Merge write: fields present in `payload` are set or overwritten,
    /// fields absent from it are left untouched in the stored document.
    async fn update_document(
        &self,
        collection: &str,
        document_id: &str,
        payload: Map<String, Value>,
    ) -> Result<(), ApplicationError>;
    /// Returns every document in the collection as raw field mappings, in
    /// store-defined order.
    async fn list_documents(
        &self,
        collection: &str,
    ) -> Result<Vec<Map<String, Value>>, ApplicationError>;
}

// --- Request/Response Models (DTOs) ---

#[derive(Serialize, Debug)]
pub struct CreateLeadResponse {
    pub message: String,
    pub lead_id: String,
}

#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    pub detail: String,
}

// --- Lead Service (Use Cases) ---

/// The collection all lead documents live in.
pub const LEADS_COLLECTION: &str = "leads";

/// Upper bound for a single store operation. The underlying store gives no
/// latency guarantee, so every call is wrapped in this timeout and surfaces
/// a `Timeout` error on expiry. No retries at this layer.
const STORE_OP_TIMEOUT: Duration = Duration::from_secs(10);

/// Domain facade over the collection store: validates leads on the way in,
/// deserializes leniently on the way out, and filters in memory.
pub struct LeadService {
    store: Arc<dyn CollectionStore>,
}

impl LeadService {
    pub fn new(store: Arc<dyn CollectionStore>) -> Self {
        Self { store }
    }

    /// Validates and persists a new lead as a full document write.
    ///
    /// A create with an existing id silently overwrites the stored document
    /// ("set" semantics, not "insert"). Validation failures perform no store
    /// call at all.
    #[instrument(skip(self, raw))]
    pub async fn create_lead(&self, raw: Map<String, Value>) -> Result<String, ApplicationError> {
        let lead = Lead::validate(raw).map_err(|e| {
            warn!("Lead rejected by validation: {}", e);
            ApplicationError::from(e)
        })?;
        let lead_id = lead.id.as_str().to_owned();
        info!(lead_id = %lead_id, business_type = %lead.business_type, "Creating lead");

        let payload = lead.to_payload();
        let stored_id = bounded(
            "create_document",
            self.store
                .create_document(LEADS_COLLECTION, &lead_id, payload),
        )
        .await?;
        info!(lead_id = %stored_id, "Lead created successfully");
        Ok(stored_id)
    }

    /// Merge-updates an existing lead: fields in the patch are overwritten,
    /// everything else is left untouched. Not exposed over HTTP.
    #[instrument(skip(self, raw), fields(lead_id = %lead_id))]
    pub async fn update_lead(
        &self,
        lead_id: &str,
        raw: Map<String, Value>,
    ) -> Result<(), ApplicationError> {
        if lead_id.trim().is_empty() {
            warn!("Update rejected: empty lead id");
            return Err(DomainError::MissingField("id".to_string()).into());
        }
        let patch = LeadPatch::validate(raw).map_err(|e| {
            warn!("Lead patch rejected by validation: {}", e);
            ApplicationError::from(e)
        })?;
        debug!(fields = patch.fields().len(), "Merging lead patch");

        bounded(
            "update_document",
            self.store
                .update_document(LEADS_COLLECTION, lead_id, patch.into_payload()),
        )
        .await?;
        info!("Lead updated successfully");
        Ok(())
    }

    /// Lists every lead, optionally retaining only those whose
    /// `business_type` exactly equals the filter (case-sensitive).
    ///
    /// Filtering happens in memory after full retrieval; the store is not
    /// asked to evaluate any predicate.
    #[instrument(skip(self))]
    pub async fn list_leads(
        &self,
        business_type: Option<&str>,
    ) -> Result<Vec<LeadRecord>, ApplicationError> {
        let payloads = bounded("list_documents", self.store.list_documents(LEADS_COLLECTION))
            .await?;
        let total = payloads.len();

        let mut leads: Vec<LeadRecord> =
            payloads.iter().map(LeadRecord::from_payload).collect();
        if let Some(filter) = business_type {
            leads.retain(|lead| lead.business_type.as_deref() == Some(filter));
            info!(
                business_type = %filter,
                total,
                matched = leads.len(),
                "Listed leads with filter"
            );
        } else {
            info!(total, "Listed leads");
        }
        Ok(leads)
    }
}

/// Runs a store operation under the per-operation timeout.
async fn bounded<T, F>(op: &'static str, operation: F) -> Result<T, ApplicationError>
where
    F: Future<Output = Result<T, ApplicationError>>,
{
    match tokio::time::timeout(STORE_OP_TIMEOUT, operation).await {
        Ok(result) => result,
        Err(_) => {
            let timeout_ms = STORE_OP_TIMEOUT.as_millis() as u64;
            error!(op, timeout_ms, "Store operation timed out");
            Err(ApplicationError::Timeout { op, timeout_ms })
        }
    }
}

// --- Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-test store with document-store semantics: create replaces the
    /// full document, update merges field-by-field.
    #[derive(Default)]
    struct StubStore {
        collections: Mutex<HashMap<String, HashMap<String, Map<String, Value>>>>,
        calls: AtomicUsize,
        fail_writes: bool,
    }

    impl StubStore {
        fn failing() -> Self {
            Self {
                fail_writes: true,
                ..Self::default()
            }
        }
        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CollectionStore for StubStore {
        async fn create_document(
            &self,
            collection: &str,
            document_id: &str,
            payload: Map<String, Value>,
        ) -> Result<String, ApplicationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_writes {
                return Err(ApplicationError::Store {
                    op: "create_document",
                    source: "connection reset by peer".into(),
                });
            }
            self.collections
                .lock()
                .unwrap()
                .entry(collection.to_string())
                .or_default()
                .insert(document_id.to_string(), payload);
            Ok(document_id.to_string())
        }

        async fn update_document(
            &self,
            collection: &str,
            document_id: &str,
            payload: Map<String, Value>,
        ) -> Result<(), ApplicationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_writes {
                return Err(ApplicationError::Store {
                    op: "update_document",
                    source: "connection reset by peer".into(),
                });
            }
            let mut collections = self.collections.lock().unwrap();
            let documents = collections.entry(collection.to_string()).or_default();
            let document = documents.entry(document_id.to_string()).or_default();
            for (name, value) in payload {
                document.insert(name, value);
            }
            Ok(())
        }

        async fn list_documents(
            &self,
            collection: &str,
        ) -> Result<Vec<Map<String, Value>>, ApplicationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let collections = self.collections.lock().unwrap();
            Ok(collections
                .get(collection)
                .map(|documents| documents.values().cloned().collect())
                .unwrap_or_default())
        }
    }

    /// Store whose operations hang far past the per-operation bound.
    struct StalledStore;

    #[async_trait]
    impl CollectionStore for StalledStore {
        async fn create_document(
            &self,
            _collection: &str,
            document_id: &str,
            _payload: Map<String, Value>,
        ) -> Result<String, ApplicationError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(document_id.to_string())
        }

        async fn update_document(
            &self,
            _collection: &str,
            _document_id: &str,
            _payload: Map<String, Value>,
        ) -> Result<(), ApplicationError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }

        async fn list_documents(
            &self,
            _collection: &str,
        ) -> Result<Vec<Map<String, Value>>, ApplicationError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }
    }

    fn raw_lead(entries: &[(&str, Value)]) -> Map<String, Value> {
        entries
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    fn service() -> (LeadService, Arc<StubStore>) {
        let store = Arc::new(StubStore::default());
        (LeadService::new(store.clone()), store)
    }

    #[tokio::test]
    async fn create_then_list_round_trips_all_set_fields() {
        let (service, _store) = service();
        let raw = raw_lead(&[
            ("id", json!("L1")),
            ("business_meeting", json!("intro call")),
            ("business_type", json!("cafe")),
            ("email", json!("a@b.com")),
        ]);
        let lead_id = service.create_lead(raw).await.expect("create should succeed");
        assert_eq!(lead_id, "L1");

        let leads = service.list_leads(None).await.expect("list should succeed");
        assert_eq!(leads.len(), 1);
        let lead = &leads[0];
        assert_eq!(lead.id.as_deref(), Some("L1"));
        assert_eq!(lead.business_meeting.as_deref(), Some("intro call"));
        assert_eq!(lead.business_type.as_deref(), Some("cafe"));
        assert_eq!(lead.email.as_deref(), Some("a@b.com"));
        assert_eq!(lead.phone, None);
        assert_eq!(lead.outcome, None);
    }

    #[tokio::test]
    async fn second_create_replaces_entire_document() {
        let (service, _store) = service();
        service
            .create_lead(raw_lead(&[
                ("id", json!("L1")),
                ("business_meeting", json!("intro call")),
                ("business_type", json!("cafe")),
                ("email", json!("a@b.com")),
            ]))
            .await
            .unwrap();
        // Same id, no email: full replace, not merge.
        service
            .create_lead(raw_lead(&[
                ("id", json!("L1")),
                ("business_meeting", json!("follow-up")),
                ("business_type", json!("cafe")),
            ]))
            .await
            .unwrap();

        let leads = service.list_leads(None).await.unwrap();
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].business_meeting.as_deref(), Some("follow-up"));
        assert_eq!(leads[0].email, None);
    }

    #[tokio::test]
    async fn update_merges_without_clobbering_other_fields() {
        let (service, _store) = service();
        service
            .create_lead(raw_lead(&[
                ("id", json!("L1")),
                ("business_meeting", json!("intro call")),
                ("business_type", json!("cafe")),
                ("email", json!("a@b.com")),
            ]))
            .await
            .unwrap();

        service
            .update_lead("L1", raw_lead(&[("outcome", json!("won"))]))
            .await
            .expect("merge update should succeed");

        let leads = service.list_leads(None).await.unwrap();
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].outcome.as_deref(), Some("won"));
        assert_eq!(leads[0].email.as_deref(), Some("a@b.com"));
        assert_eq!(leads[0].business_meeting.as_deref(), Some("intro call"));
    }

    #[tokio::test]
    async fn filter_matches_business_type_exactly() {
        let (service, _store) = service();
        for (id, business_type) in [("L1", "restaurant"), ("L2", "Restaurant"), ("L3", "cafe")] {
            service
                .create_lead(raw_lead(&[
                    ("id", json!(id)),
                    ("business_meeting", json!("intro call")),
                    ("business_type", json!(business_type)),
                ]))
                .await
                .unwrap();
        }

        let leads = service.list_leads(Some("restaurant")).await.unwrap();
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].id.as_deref(), Some("L1"));

        let none = service.list_leads(Some("bakery")).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn validation_failure_performs_no_store_write() {
        let (service, store) = service();
        let raw = raw_lead(&[("id", json!("L1")), ("business_type", json!("cafe"))]);
        let result = service.create_lead(raw).await;
        assert!(matches!(
            result,
            Err(ApplicationError::Validation(DomainError::MissingField(field))) if field == "business_meeting"
        ));
        assert_eq!(store.call_count(), 0);
    }

    #[tokio::test]
    async fn empty_id_is_rejected_before_any_store_call() {
        let (service, store) = service();
        let raw = raw_lead(&[
            ("id", json!("")),
            ("business_meeting", json!("intro call")),
            ("business_type", json!("cafe")),
        ]);
        let result = service.create_lead(raw).await;
        assert!(matches!(result, Err(ApplicationError::Validation(_))));
        assert_eq!(store.call_count(), 0);

        let result = service
            .update_lead("", raw_lead(&[("outcome", json!("won"))]))
            .await;
        assert!(matches!(
            result,
            Err(ApplicationError::Validation(DomainError::MissingField(field))) if field == "id"
        ));
        assert_eq!(store.call_count(), 0);
    }

    #[tokio::test]
    async fn store_failure_propagates_with_cause() {
        let store = Arc::new(StubStore::failing());
        let service = LeadService::new(store);
        let result = service
            .create_lead(raw_lead(&[
                ("id", json!("L1")),
                ("business_meeting", json!("intro call")),
                ("business_type", json!("cafe")),
            ]))
            .await;
        match result {
            Err(error @ ApplicationError::Store { .. }) => {
                // Diagnosability: the message carries the original cause.
                assert!(error.to_string().contains("connection reset by peer"));
            }
            other => panic!("expected Store error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_store_operation_surfaces_timeout() {
        let service = LeadService::new(Arc::new(StalledStore));

        let result = service
            .create_lead(raw_lead(&[
                ("id", json!("L1")),
                ("business_meeting", json!("intro call")),
                ("business_type", json!("cafe")),
            ]))
            .await;
        assert!(matches!(
            result,
            Err(ApplicationError::Timeout {
                op: "create_document",
                ..
            })
        ));

        let result = service
            .update_lead("L1", raw_lead(&[("outcome", json!("won"))]))
            .await;
        assert!(matches!(
            result,
            Err(ApplicationError::Timeout {
                op: "update_document",
                ..
            })
        ));

        let result = service.list_leads(None).await;
        assert!(matches!(
            result,
            Err(ApplicationError::Timeout {
                op: "list_documents",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn scenario_create_list_merge_list() {
        let (service, _store) = service();
        service
            .create_lead(raw_lead(&[
                ("id", json!("L1")),
                ("business_meeting", json!("intro call")),
                ("business_type", json!("cafe")),
                ("email", json!("a@b.com")),
            ]))
            .await
            .unwrap();

        let leads = service.list_leads(None).await.unwrap();
        assert_eq!(leads.len(), 1);
        let value = serde_json::to_value(&leads[0]).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 4); // id, business_meeting, business_type, email

        service
            .update_lead("L1", raw_lead(&[("outcome", json!("won"))]))
            .await
            .unwrap();
        let leads = service.list_leads(None).await.unwrap();
        assert_eq!(leads[0].outcome.as_deref(), Some("won"));
        assert_eq!(leads[0].email.as_deref(), Some("a@b.com"));
    }
}
