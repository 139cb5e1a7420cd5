//! Queue-confined access to stores.
//!
//! Every [`Store`] is owned by exactly one dispatch thread; the only way
//! to reach it is a [`StoreContext`] handle, which enqueues request
//! messages and awaits the reply. All operations against one store
//! execute in submission order, so the store itself needs no locks.
//! Cross-store work (such as a deep copy) holds one handle per store and
//! hops between the two queues explicitly.

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::datatype::Value;
use crate::error::{GraftError, Result};
use crate::predicate::{Predicate, SortKey};
use crate::record::{AttributeMap, RecordId};
use crate::store::Store;

type Reply<T> = oneshot::Sender<Result<T>>;

enum Request {
    Insert { entity: String, reply: Reply<RecordId> },
    SetAttribute { id: RecordId, name: String, value: Value, reply: Reply<()> },
    Attribute { id: RecordId, name: String, reply: Reply<Option<Value>> },
    Attributes { id: RecordId, reply: Reply<AttributeMap> },
    SetToOne { id: RecordId, name: String, target: RecordId, reply: Reply<()> },
    AppendToMany { id: RecordId, name: String, target: RecordId, reply: Reply<()> },
    RelatedOne { id: RecordId, name: String, reply: Reply<Option<RecordId>> },
    RelatedMany { id: RecordId, name: String, reply: Reply<Vec<RecordId>> },
    Query {
        entity: String,
        predicate: Option<Predicate>,
        sort: Option<SortKey>,
        reply: Reply<Vec<RecordId>>,
    },
    ObjectCount { entity: String, reply: Reply<u64> },
    Commit { reply: Reply<()> },
    Evict { id: RecordId, reply: Reply<()> },
    ResidentCount { reply: Reply<usize> },
    MetadataGet { key: String, reply: Reply<Option<String>> },
    MetadataSet { key: String, value: String, reply: Reply<()> },
    Shutdown { reply: Reply<()> },
}

/// A cloneable handle to a store's dispatch queue.
#[derive(Clone)]
pub struct StoreContext {
    tx: mpsc::Sender<Request>,
    label: String,
}

impl StoreContext {
    /// Move a store onto its own dispatch thread and hand back the queue
    /// handle. The thread drains requests in submission order and stops
    /// when the last handle is dropped or `shutdown` is called.
    pub fn spawn(store: Store) -> StoreContext {
        let (tx, mut rx) = mpsc::channel::<Request>(64);
        let label = store.label().to_owned();
        let thread_label = label.clone();
        std::thread::spawn(move || {
            let mut store = store;
            while let Some(request) = rx.blocking_recv() {
                if handle(&mut store, request) {
                    break;
                }
            }
            debug!(store = %thread_label, "store context stopped");
        });
        StoreContext { tx, label }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    async fn request<T>(&self, request: Request, rx: oneshot::Receiver<Result<T>>) -> Result<T> {
        self.tx.send(request).await.map_err(|_| {
            GraftError::Channel(format!("store '{}' is no longer running", self.label))
        })?;
        rx.await.map_err(|_| {
            GraftError::Channel(format!(
                "store '{}' dropped a request without replying",
                self.label
            ))
        })?
    }

    pub async fn insert(&self, entity: &str) -> Result<RecordId> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::Insert { entity: entity.to_owned(), reply }, rx)
            .await
    }
    pub async fn set_attribute(&self, id: RecordId, name: &str, value: Value) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(
            Request::SetAttribute { id, name: name.to_owned(), value, reply },
            rx,
        )
        .await
    }
    pub async fn attribute(&self, id: RecordId, name: &str) -> Result<Option<Value>> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::Attribute { id, name: name.to_owned(), reply }, rx)
            .await
    }
    pub async fn attributes(&self, id: RecordId) -> Result<AttributeMap> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::Attributes { id, reply }, rx).await
    }
    pub async fn set_to_one(&self, id: RecordId, name: &str, target: RecordId) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(
            Request::SetToOne { id, name: name.to_owned(), target, reply },
            rx,
        )
        .await
    }
    pub async fn append_to_many(&self, id: RecordId, name: &str, target: RecordId) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(
            Request::AppendToMany { id, name: name.to_owned(), target, reply },
            rx,
        )
        .await
    }
    pub async fn related_one(&self, id: RecordId, name: &str) -> Result<Option<RecordId>> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::RelatedOne { id, name: name.to_owned(), reply }, rx)
            .await
    }
    pub async fn related_many(&self, id: RecordId, name: &str) -> Result<Vec<RecordId>> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::RelatedMany { id, name: name.to_owned(), reply }, rx)
            .await
    }
    pub async fn query(
        &self,
        entity: &str,
        predicate: Option<Predicate>,
        sort: Option<SortKey>,
    ) -> Result<Vec<RecordId>> {
        let (reply, rx) = oneshot::channel();
        self.request(
            Request::Query { entity: entity.to_owned(), predicate, sort, reply },
            rx,
        )
        .await
    }
    pub async fn object_count(&self, entity: &str) -> Result<u64> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::ObjectCount { entity: entity.to_owned(), reply }, rx)
            .await
    }
    pub async fn commit(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::Commit { reply }, rx).await
    }
    pub async fn evict(&self, id: RecordId) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::Evict { id, reply }, rx).await
    }
    pub async fn resident_count(&self) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::ResidentCount { reply }, rx).await
    }
    pub async fn metadata_get(&self, key: &str) -> Result<Option<String>> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::MetadataGet { key: key.to_owned(), reply }, rx)
            .await
    }
    pub async fn metadata_set(&self, key: &str, value: &str) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(
            Request::MetadataSet { key: key.to_owned(), value: value.to_owned(), reply },
            rx,
        )
        .await
    }
    /// Stop the dispatch thread once all queued requests have drained.
    /// Other handles to the same store observe channel errors afterwards.
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::Shutdown { reply }, rx).await
    }
}

// Executes one request against the owned store. Returns whether the
// dispatch loop should stop.
fn handle(store: &mut Store, request: Request) -> bool {
    match request {
        Request::Insert { entity, reply } => {
            let _ = reply.send(store.insert(&entity));
        }
        Request::SetAttribute { id, name, value, reply } => {
            let _ = reply.send(store.set_attribute(id, &name, value));
        }
        Request::Attribute { id, name, reply } => {
            let _ = reply.send(store.attribute(id, &name));
        }
        Request::Attributes { id, reply } => {
            let _ = reply.send(store.attributes(id));
        }
        Request::SetToOne { id, name, target, reply } => {
            let _ = reply.send(store.set_to_one(id, &name, target));
        }
        Request::AppendToMany { id, name, target, reply } => {
            let _ = reply.send(store.append_to_many(id, &name, target));
        }
        Request::RelatedOne { id, name, reply } => {
            let _ = reply.send(store.related_one(id, &name));
        }
        Request::RelatedMany { id, name, reply } => {
            let _ = reply.send(store.related_many(id, &name));
        }
        Request::Query { entity, predicate, sort, reply } => {
            let _ = reply.send(store.query(&entity, predicate.as_ref(), sort.as_ref()));
        }
        Request::ObjectCount { entity, reply } => {
            let _ = reply.send(store.object_count(&entity));
        }
        Request::Commit { reply } => {
            let _ = reply.send(store.commit());
        }
        Request::Evict { id, reply } => {
            store.evict(id);
            let _ = reply.send(Ok(()));
        }
        Request::ResidentCount { reply } => {
            let _ = reply.send(Ok(store.resident_count()));
        }
        Request::MetadataGet { key, reply } => {
            let _ = reply.send(store.metadata_get(&key));
        }
        Request::MetadataSet { key, value, reply } => {
            let _ = reply.send(store.metadata_set(&key, &value));
        }
        Request::Shutdown { reply } => {
            let _ = reply.send(Ok(()));
            return true;
        }
    }
    false
}
