//! Shared document store
//!
//! This module defines the trait through which the controller talks to the
//! hosted realtime database. The abstraction only assumes what such stores
//! commonly offer: subscribe with push notifications, write-if-absent, and
//! shallow merge updates. Documents are plain JSON so that the store stays
//! unaware of the match schema.

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

/// The current content of a document, `None` while it does not exist
pub type Snapshot = Option<Value>;

/// Failures reported by a store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store could not be reached or refused the request
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// A merge update targeted a document that is not a JSON object
    #[error("document `{0}` is not an object")]
    NotAnObject(String),
}

/// A live feed of one document's snapshots
///
/// The first call to [`Subscription::next`] yields the document as it is at
/// subscription time. Later calls wait for a change. Intermediate snapshots
/// may be coalesced, so a slow reader always sees the latest content.
#[derive(Debug)]
pub struct Subscription {
    receiver: watch::Receiver<Snapshot>,
}

impl Subscription {
    /// Wraps a watch receiver fed by a store implementation
    pub fn new(mut receiver: watch::Receiver<Snapshot>) -> Self {
        receiver.mark_changed();
        Self { receiver }
    }

    /// Waits for the next snapshot
    ///
    /// Returns `None` once the store has dropped the document's feed.
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }
}

/// Trait for the hosted key-value store holding the match document
///
/// Implementations might wrap a realtime database client, a websocket
/// relay, or the in-process [`MemoryStore`].
#[async_trait]
pub trait Store: Send + Sync {
    /// Subscribes to changes of the document at `key`
    ///
    /// The subscription is released when the returned value is dropped.
    async fn subscribe(&self, key: &str) -> Result<Subscription, StoreError>;

    /// Writes `document` at `key` only if nothing is stored there yet
    ///
    /// Returns whether the document was written.
    async fn initialize(&self, key: &str, document: Value) -> Result<bool, StoreError>;

    /// Merges `fields` into the top level of the document at `key`
    ///
    /// Each field replaces the stored value of the same name. The document
    /// is created if it does not exist.
    async fn update(&self, key: &str, fields: Map<String, Value>) -> Result<(), StoreError>;
}

/// An in-process store backed by watch channels
///
/// Every subscriber of a key shares one channel, so a write is pushed to
/// all of them, including the writer's own subscription.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<String, watch::Sender<Snapshot>>>,
}

impl MemoryStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the document currently stored at `key`
    pub fn get(&self, key: &str) -> Snapshot {
        self.with_channel(key, |sender| sender.borrow().clone())
    }

    /// Deletes the document at `key`, notifying subscribers with `None`
    pub fn remove(&self, key: &str) {
        self.with_channel(key, |sender| {
            sender.send_if_modified(|snapshot| snapshot.take().is_some());
        });
    }

    /// Number of live subscriptions on `key`
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.with_channel(key, watch::Sender::receiver_count)
    }

    fn with_channel<R>(&self, key: &str, f: impl FnOnce(&watch::Sender<Snapshot>) -> R) -> R {
        let mut documents = self
            .documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let sender = documents
            .entry(key.to_owned())
            .or_insert_with(|| watch::Sender::new(None));
        f(sender)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn subscribe(&self, key: &str) -> Result<Subscription, StoreError> {
        debug!(key, "subscribing to document");
        Ok(Subscription::new(self.with_channel(key, watch::Sender::subscribe)))
    }

    async fn initialize(&self, key: &str, document: Value) -> Result<bool, StoreError> {
        Ok(self.with_channel(key, |sender| {
            sender.send_if_modified(|snapshot| {
                if snapshot.is_some() {
                    return false;
                }
                *snapshot = Some(document);
                true
            })
        }))
    }

    async fn update(&self, key: &str, fields: Map<String, Value>) -> Result<(), StoreError> {
        self.with_channel(key, |sender| {
            let mut outcome = Ok(());
            sender.send_if_modified(|snapshot| match snapshot {
                None => {
                    *snapshot = Some(Value::Object(fields));
                    true
                }
                Some(Value::Object(document)) => {
                    document.extend(fields);
                    true
                }
                Some(_) => {
                    outcome = Err(StoreError::NotAnObject(key.to_owned()));
                    false
                }
            });
            outcome
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use serde_json::json;

    use super::*;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(fields) => fields,
            _ => panic!("expected an object"),
        }
    }

    #[tokio::test]
    async fn test_first_snapshot_is_current_value() {
        let store = MemoryStore::new();
        let mut subscription = store.subscribe("games/test").await.unwrap();

        assert_eq!(subscription.next().await, Some(None));
    }

    #[tokio::test]
    async fn test_initialize_only_once() {
        let store = MemoryStore::new();

        assert!(store.initialize("games/test", json!({ "a": 1 })).await.unwrap());
        assert!(!store.initialize("games/test", json!({ "a": 2 })).await.unwrap());
        assert_eq!(store.get("games/test"), Some(json!({ "a": 1 })));
    }

    #[tokio::test]
    async fn test_update_merges_top_level_fields() {
        let store = MemoryStore::new();
        store
            .initialize(
                "games/test",
                json!({ "scores": { "A": [1] }, "timeLeft": 10 }),
            )
            .await
            .unwrap();

        store
            .update("games/test", fields(json!({ "scores": { "B": [2] } })))
            .await
            .unwrap();

        assert_eq!(
            store.get("games/test"),
            Some(json!({ "scores": { "B": [2] }, "timeLeft": 10 }))
        );
    }

    #[tokio::test]
    async fn test_update_creates_missing_document() {
        let store = MemoryStore::new();

        store
            .update("games/test", fields(json!({ "isRunning": true })))
            .await
            .unwrap();

        assert_eq!(store.get("games/test"), Some(json!({ "isRunning": true })));
    }

    #[tokio::test]
    async fn test_update_rejects_scalar_document() {
        let store = MemoryStore::new();
        store.initialize("games/test", json!(7)).await.unwrap();

        let result = store
            .update("games/test", fields(json!({ "isRunning": true })))
            .await;

        assert_eq!(result, Err(StoreError::NotAnObject("games/test".to_owned())));
    }

    #[tokio::test]
    async fn test_subscribers_see_writes() {
        let store = MemoryStore::new();
        let mut first = store.subscribe("games/test").await.unwrap();
        let mut second = store.subscribe("games/test").await.unwrap();
        assert_eq!(store.subscriber_count("games/test"), 2);

        assert_eq!(first.next().await, Some(None));
        store
            .update("games/test", fields(json!({ "timeLeft": 3 })))
            .await
            .unwrap();

        assert_eq!(first.next().await, Some(Some(json!({ "timeLeft": 3 }))));
        assert_eq!(second.next().await, Some(Some(json!({ "timeLeft": 3 }))));
    }

    #[tokio::test]
    async fn test_remove_notifies_absent() {
        let store = MemoryStore::new();
        store.initialize("games/test", json!({})).await.unwrap();
        let mut subscription = store.subscribe("games/test").await.unwrap();
        assert_eq!(subscription.next().await, Some(Some(json!({}))));

        store.remove("games/test");

        assert_eq!(subscription.next().await, Some(None));
        assert_eq!(store.get("games/test"), None);
    }

    #[tokio::test]
    async fn test_dropping_subscription_releases_it() {
        let store = MemoryStore::new();
        let subscription = store.subscribe("games/test").await.unwrap();
        assert_eq!(store.subscriber_count("games/test"), 1);

        drop(subscription);

        assert_eq!(store.subscriber_count("games/test"), 0);
    }
}
