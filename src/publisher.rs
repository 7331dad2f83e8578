//! Ordered, fire-and-forget delivery of remote writes
//!
//! Local operations never wait on the store. They queue a [`Write`] and a
//! single background task delivers the queue in order, retrying a failed
//! write a bounded number of times before logging and dropping it.
//!
//! Updates stay in a pending list until delivered or dropped. Snapshots
//! received in the meantime predate them, so the controller lays the
//! pending updates over each snapshot before mirroring it.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use serde_json::Value;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time,
};
use tracing::{Instrument, Span, debug, warn};

use crate::{document::Patch, state::MatchState, store::Store};

/// A remote write queued by the controller
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Write {
    /// Seed the document if it does not exist
    Initialize(Value),
    /// Merge a group of fields into the document
    Update(Patch),
}

#[derive(Debug)]
enum Outgoing {
    Write(Write),
    Flush(oneshot::Sender<()>),
}

/// How hard to try before giving up on a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    pub(crate) attempts: u32,
    pub(crate) delay: Duration,
}

type Pending = Arc<Mutex<VecDeque<Patch>>>;

fn lock(pending: &Pending) -> MutexGuard<'_, VecDeque<Patch>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle used to queue writes for the publishing task
#[derive(Debug, Clone)]
pub(crate) struct Publisher {
    sender: mpsc::UnboundedSender<Outgoing>,
    pending: Pending,
}

impl Publisher {
    /// Spawns the publishing task for the document at `key`
    pub(crate) fn spawn(
        store: Arc<dyn Store>,
        key: String,
        policy: RetryPolicy,
        span: Span,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let pending = Pending::default();
        let task = tokio::spawn(
            run(store, key, policy, receiver, Arc::clone(&pending)).instrument(span),
        );
        (Self { sender, pending }, task)
    }

    /// Queues a write without waiting for it to be delivered
    pub(crate) fn publish(&self, write: Write) {
        let update = match &write {
            Write::Update(patch) => Some(patch.clone()),
            Write::Initialize(_) => None,
        };

        // Held across the send so the pending list matches channel order.
        let mut pending = lock(&self.pending);

        if self.sender.send(Outgoing::Write(write)).is_err() {
            debug!("publisher is shut down, dropping write");
            return;
        }

        if let Some(patch) = update {
            pending.push_back(patch);
        }
    }

    /// Applies every update not yet delivered on top of `state`
    pub(crate) fn overlay(&self, state: &mut MatchState) {
        for patch in lock(&self.pending).iter() {
            patch.merge_into(state);
        }
    }

    /// Number of updates queued but not yet delivered or dropped
    pub(crate) fn pending(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Resolves once every write queued before this call has been handled
    pub(crate) async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.sender.send(Outgoing::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }
}

async fn run(
    store: Arc<dyn Store>,
    key: String,
    policy: RetryPolicy,
    mut receiver: mpsc::UnboundedReceiver<Outgoing>,
    pending: Pending,
) {
    while let Some(outgoing) = receiver.recv().await {
        match outgoing {
            Outgoing::Write(write) => {
                deliver(store.as_ref(), &key, &write, policy).await;
                if matches!(write, Write::Update(_)) {
                    lock(&pending).pop_front();
                }
            }
            Outgoing::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

async fn deliver(store: &dyn Store, key: &str, write: &Write, policy: RetryPolicy) {
    for attempt in 1..=policy.attempts {
        let result = match write {
            Write::Initialize(document) => store
                .initialize(key, document.clone())
                .await
                .map(|written| {
                    if !written {
                        debug!("document already seeded by another viewer");
                    }
                }),
            Write::Update(patch) => store.update(key, patch.clone().into_fields()).await,
        };

        match result {
            Ok(()) => return,
            Err(error) if attempt < policy.attempts => {
                debug!(%error, attempt, "remote write failed, retrying");
                time::sleep(policy.delay).await;
            }
            Err(error) => {
                warn!(%error, attempts = policy.attempts, "giving up on remote write");
            }
        }
    }
}
