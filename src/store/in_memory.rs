//! In-memory reference store.
//!
//! Rows are kept as flat JSON documents keyed by resource type and
//! identifier, with the concurrency token held next to each document. It is
//! meant for tests, development and as the executable definition of the
//! [`UnitOfWork`] contract.
//!
//! # Features
//!
//! * Thread-safe concurrent access with tokio's async `RwLock`
//! * Transactions stage writes privately and apply them atomically on commit
//! * Integer identifiers come from a per-type sequence and are never reused
//! * A fresh token is stamped on every insert, update and staged rewrite
//! * Commit re-checks the token of every touched row whose type declares a
//!   concurrency token, so a transaction that lost a race against a
//!   concurrent writer fails with [`StoreError::VersionMismatch`] instead of
//!   overwriting. Rows of other types are last-writer-wins
//!
//! # Example Usage
//!
//! ```rust
//! use resource_engine::resource::{ConcurrencyToken, Resource, ResourceGraph, ResourceTypeDescriptor};
//! use resource_engine::store::{ConditionalResult, InMemoryStore, Transaction, TransactionalStore, UnitOfWork};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let graph = ResourceGraph::new().with(
//!     ResourceTypeDescriptor::builder("disks")
//!         .attribute("manufacturer")
//!         .concurrency_token("concurrencyToken")
//!         .build(),
//! )?;
//! let store = InMemoryStore::new(Arc::new(graph));
//!
//! let mut tx = store.begin().await?;
//! let (id, token) = tx
//!     .insert(Resource::new("disks").with_attribute("manufacturer", json!("WD")))
//!     .await?;
//! tx.commit().await?;
//!
//! // A stale token is refused by the conditional write
//! let mut tx = store.begin().await?;
//! let mut disk = tx.fetch_by_id("disks", &id).await?.unwrap();
//! disk.set_attribute("manufacturer", json!("Seagate"));
//! let stale = ConcurrencyToken::from_opaque("stale");
//! assert_eq!(tx.update(&disk, Some(&stale)).await?, ConditionalResult::VersionMismatch);
//! assert!(tx.update(&disk, Some(&token)).await?.is_success());
//! tx.commit().await?;
//! # Ok(())
//! # }
//! ```

use super::evaluate::{Evaluator, RowSource};
use super::{
    ConditionalResult, QueryResult, StoreError, StoreResult, Transaction, TransactionalStore,
    UnitOfWork,
};
use crate::query::QueryLayer;
use crate::resource::{
    ConcurrencyToken, IdentifierKind, Resource, ResourceGraph, ResourceId, ResourceTypeDescriptor,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

type RowKey = (String, ResourceId);

/// A committed or staged row.
#[derive(Debug, Clone)]
struct StoredRow {
    data: Value,
    token: ConcurrencyToken,
}

#[derive(Debug, Default)]
struct StoreState {
    // resource_type -> id -> row
    tables: HashMap<String, BTreeMap<ResourceId, StoredRow>>,
    sequences: HashMap<String, i64>,
    write_sequence: u64,
}

impl StoreState {
    fn committed(&self, key: &RowKey) -> Option<&StoredRow> {
        self.tables.get(&key.0).and_then(|table| table.get(&key.1))
    }

    fn next_id(&mut self, descriptor: &ResourceTypeDescriptor) -> ResourceId {
        match descriptor.identifier_kind() {
            IdentifierKind::Integer => {
                let sequence = self
                    .sequences
                    .entry(descriptor.name().to_string())
                    .or_insert(0);
                *sequence += 1;
                ResourceId::Integer(*sequence)
            }
            IdentifierKind::Text | IdentifierKind::Uuid => {
                ResourceId::Text(Uuid::new_v4().to_string())
            }
        }
    }

    fn next_token(&mut self, key: &RowKey) -> ConcurrencyToken {
        self.write_sequence += 1;
        ConcurrencyToken::from_content(
            format!("{}:{}:{}", key.0, key.1, self.write_sequence).as_bytes(),
        )
    }
}

/// Thread-safe in-memory store.
#[derive(Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
    graph: Arc<ResourceGraph>,
}

/// Row counts for debugging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InMemoryStoreStats {
    pub resource_type_count: usize,
    pub total_resources: usize,
}

impl InMemoryStore {
    /// Create an empty store for the resource types in `graph`.
    pub fn new(graph: Arc<ResourceGraph>) -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            graph,
        }
    }

    /// Read a committed resource outside of any transaction.
    pub async fn get(&self, resource_type: &str, id: &ResourceId) -> StoreResult<Option<Resource>> {
        let state = self.state.read().await;
        let key = (resource_type.to_string(), id.clone());
        state
            .committed(&key)
            .map(|row| hydrate(&self.graph, resource_type, row))
            .transpose()
    }

    /// Number of committed rows of a resource type.
    pub async fn count(&self, resource_type: &str) -> usize {
        let state = self.state.read().await;
        state.tables.get(resource_type).map_or(0, BTreeMap::len)
    }

    pub async fn stats(&self) -> InMemoryStoreStats {
        let state = self.state.read().await;
        InMemoryStoreStats {
            resource_type_count: state.tables.values().filter(|t| !t.is_empty()).count(),
            total_resources: state.tables.values().map(BTreeMap::len).sum(),
        }
    }

    /// Remove every row (sequences keep counting).
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.tables.clear();
    }
}

impl TransactionalStore for InMemoryStore {
    type Transaction = InMemoryUnitOfWork;

    async fn begin(&self) -> StoreResult<InMemoryUnitOfWork> {
        Ok(InMemoryUnitOfWork {
            state: Arc::clone(&self.state),
            graph: Arc::clone(&self.graph),
            staged: HashMap::new(),
        })
    }
}

/// A staged write and the committed token it was based on.
///
/// `base` is `None` when the row did not exist when first touched; `row` is
/// `None` for a staged delete.
#[derive(Debug, Clone)]
struct StagedWrite {
    base: Option<ConcurrencyToken>,
    row: Option<StoredRow>,
}

/// One open transaction against an [`InMemoryStore`].
pub struct InMemoryUnitOfWork {
    state: Arc<RwLock<StoreState>>,
    graph: Arc<ResourceGraph>,
    staged: HashMap<RowKey, StagedWrite>,
}

impl InMemoryUnitOfWork {
    /// Number of writes waiting for commit.
    pub fn pending_writes(&self) -> usize {
        self.staged.len()
    }

    fn descriptor(&self, resource_type: &str) -> StoreResult<Arc<ResourceTypeDescriptor>> {
        self.graph
            .get(resource_type)
            .cloned()
            .ok_or_else(|| StoreError::internal(format!("Unknown resource type '{}'", resource_type)))
    }

    /// The row as this transaction sees it.
    fn visible<'s>(&'s self, state: &'s StoreState, key: &RowKey) -> Option<&'s StoredRow> {
        match self.staged.get(key) {
            Some(staged) => staged.row.as_ref(),
            None => state.committed(key),
        }
    }

    fn stage(&mut self, state: &StoreState, key: RowKey, row: Option<StoredRow>) {
        let base = match self.staged.get(&key) {
            Some(existing) => existing.base.clone(),
            None => state.committed(&key).map(|row| row.token.clone()),
        };
        self.staged.insert(key, StagedWrite { base, row });
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn insert(&mut self, mut resource: Resource) -> StoreResult<(ResourceId, ConcurrencyToken)> {
        let descriptor = self.descriptor(resource.resource_type())?;
        let state_lock = Arc::clone(&self.state);
        let mut state = state_lock.write().await;

        let id = match resource.id() {
            Some(id) => id.clone(),
            None => state.next_id(&descriptor),
        };
        let key = (descriptor.name().to_string(), id.clone());
        if self.visible(&state, &key).is_some() {
            return Err(StoreError::internal(format!(
                "Resource {}/{} already exists",
                key.0, key.1
            )));
        }

        let token = state.next_token(&key);
        resource.set_id(id.clone());
        let row = dehydrate(&descriptor, resource, token.clone());
        self.stage(&state, key, Some(row));

        Ok((id, token))
    }

    async fn fetch_by_id(
        &mut self,
        resource_type: &str,
        id: &ResourceId,
    ) -> StoreResult<Option<Resource>> {
        let state = self.state.read().await;
        let key = (resource_type.to_string(), id.clone());
        self.visible(&state, &key)
            .map(|row| hydrate(&self.graph, resource_type, row))
            .transpose()
    }

    async fn update(
        &mut self,
        resource: &Resource,
        expected: Option<&ConcurrencyToken>,
    ) -> StoreResult<ConditionalResult<ConcurrencyToken>> {
        let descriptor = self.descriptor(resource.resource_type())?;
        let Some(id) = resource.id() else {
            return Err(StoreError::internal("Cannot update a resource without an identifier"));
        };
        let key = (descriptor.name().to_string(), id.clone());

        let state_lock = Arc::clone(&self.state);
        let mut state = state_lock.write().await;

        let Some(current) = self.visible(&state, &key) else {
            return Ok(ConditionalResult::NotFound);
        };
        if expected.is_some_and(|expected| *expected != current.token) {
            return Ok(ConditionalResult::VersionMismatch);
        }

        let token = state.next_token(&key);
        let row = dehydrate(&descriptor, resource.clone(), token.clone());
        self.stage(&state, key, Some(row));

        Ok(ConditionalResult::Success(token))
    }

    async fn delete(
        &mut self,
        resource_type: &str,
        id: &ResourceId,
        expected: Option<&ConcurrencyToken>,
    ) -> StoreResult<ConditionalResult<()>> {
        let key = (resource_type.to_string(), id.clone());
        let state_lock = Arc::clone(&self.state);
        let state = state_lock.read().await;

        let Some(current) = self.visible(&state, &key) else {
            return Ok(ConditionalResult::NotFound);
        };
        if expected.is_some_and(|expected| *expected != current.token) {
            return Ok(ConditionalResult::VersionMismatch);
        }

        self.stage(&state, key, None);
        Ok(ConditionalResult::Success(()))
    }

    async fn query(&mut self, layer: &QueryLayer) -> StoreResult<QueryResult> {
        let state = self.state.read().await;
        let snapshot = Snapshot {
            state: &state,
            staged: &self.staged,
            graph: &self.graph,
        };
        Evaluator::new(&self.graph, &snapshot).execute(layer)
    }
}

impl Transaction for InMemoryUnitOfWork {
    async fn commit(self) -> StoreResult<()> {
        let mut state = self.state.write().await;

        // Verify everything before applying anything
        for (key, staged) in &self.staged {
            let checked = self
                .graph
                .get(&key.0)
                .is_some_and(|descriptor| descriptor.uses_concurrency_token());
            if !checked {
                continue;
            }
            let committed = state.committed(key).map(|row| &row.token);
            if committed != staged.base.as_ref() {
                return Err(StoreError::version_mismatch(&key.0, &key.1));
            }
        }

        for ((resource_type, id), staged) in self.staged {
            let table = state.tables.entry(resource_type).or_default();
            match staged.row {
                Some(row) => {
                    table.insert(id, row);
                }
                None => {
                    table.remove(&id);
                }
            }
        }
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        Ok(())
    }
}

/// Committed state overlaid with one transaction's staged writes.
struct Snapshot<'a> {
    state: &'a StoreState,
    staged: &'a HashMap<RowKey, StagedWrite>,
    graph: &'a ResourceGraph,
}

impl RowSource for Snapshot<'_> {
    fn rows(&self, resource_type: &str) -> StoreResult<Vec<Resource>> {
        let mut visible: BTreeMap<&ResourceId, &StoredRow> = self
            .state
            .tables
            .get(resource_type)
            .map(|table| table.iter().collect())
            .unwrap_or_default();

        for ((staged_type, id), staged) in self.staged {
            if staged_type != resource_type {
                continue;
            }
            match &staged.row {
                Some(row) => {
                    visible.insert(id, row);
                }
                None => {
                    visible.remove(id);
                }
            }
        }

        visible
            .into_values()
            .map(|row| hydrate(self.graph, resource_type, row))
            .collect()
    }

    fn row(&self, resource_type: &str, id: &ResourceId) -> StoreResult<Option<Resource>> {
        let key = (resource_type.to_string(), id.clone());
        let row = match self.staged.get(&key) {
            Some(staged) => staged.row.as_ref(),
            None => self.state.committed(&key),
        };
        row.map(|row| hydrate(self.graph, resource_type, row))
            .transpose()
    }
}

fn dehydrate(descriptor: &ResourceTypeDescriptor, mut resource: Resource, token: ConcurrencyToken) -> StoredRow {
    resource.set_token(None);
    StoredRow {
        data: resource.to_json(descriptor),
        token,
    }
}

fn hydrate(graph: &ResourceGraph, resource_type: &str, row: &StoredRow) -> StoreResult<Resource> {
    let descriptor = graph
        .get(resource_type)
        .ok_or_else(|| StoreError::internal(format!("Unknown resource type '{}'", resource_type)))?;

    let mut resource =
        Resource::from_json(descriptor, row.data.clone()).map_err(|e| StoreError::Serialization {
            message: e.to_string(),
            resource_type: Some(resource_type.to_string()),
        })?;
    resource.set_token(Some(row.token.clone()));
    Ok(resource)
}
