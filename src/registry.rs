//! Correlation state shared between the read loop and caller tasks.
//!
//! Two structures live here. [`TransactionRegistry`] correlates asynchronous
//! replies with outstanding requests: an entry is created when a request is
//! sent, routed to by the read loop, and destroyed by a terminal reply, a
//! timeout expiry, or connection teardown. [`PendingUpstreams`] records
//! delivered-but-unanswered upstream messages so that exactly one of
//! acknowledge or reject can consume each obligation.
//!
//! Both are keyed maps of independent entries; concurrent callers working on
//! unrelated transaction ids never contend beyond the map shard.

use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio::sync::{Mutex, mpsc};

use crate::{
    correlation::Correlated,
    message::{DevEui, Mic, TransactionId},
};

/// Failure to create a registry entry.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The transaction id already has an outstanding waiter.
    #[error("transaction {0} is already outstanding")]
    Duplicate(TransactionId),
}

/// Failure while awaiting a correlated reply.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ReplyError {
    /// No reply arrived within the caller deadline.
    #[error("timed out waiting for a correlated reply")]
    TimedOut,
    /// The entry was retired before another reply could arrive.
    #[error("reply channel closed")]
    Closed,
}

struct Waiter<R> {
    rx: Mutex<mpsc::UnboundedReceiver<R>>,
}

struct Registered<R> {
    tx: mpsc::UnboundedSender<R>,
    waiter: Arc<Waiter<R>>,
}

/// Consumer side of one registry entry's reply sequence.
///
/// Dropping the handle does not retire the entry; the registry owns entry
/// lifetime so that late replies are still recognized as correlation misses
/// rather than resurrecting retired ids.
pub struct ReplyHandle<R> {
    id: TransactionId,
    waiter: Arc<Waiter<R>>,
}

impl<R> ReplyHandle<R> {
    /// Transaction id this handle is correlated with.
    #[must_use]
    pub fn transaction_id(&self) -> TransactionId { self.id }

    /// Await the next reply for this transaction.
    ///
    /// # Errors
    /// [`ReplyError::TimedOut`] when `timeout` elapses first and
    /// [`ReplyError::Closed`] when the entry was retired (terminal reply
    /// already consumed, expired, or connection teardown).
    pub async fn next(&self, timeout: Duration) -> Result<R, ReplyError> {
        let mut rx = self.waiter.rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => Err(ReplyError::Closed),
            Err(_) => Err(ReplyError::TimedOut),
        }
    }
}

impl<R> Clone for ReplyHandle<R> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            waiter: Arc::clone(&self.waiter),
        }
    }
}

/// Maps outstanding transaction ids to the callers awaiting their replies.
pub struct TransactionRegistry<R> {
    entries: DashMap<TransactionId, Registered<R>>,
}

impl<R> Default for TransactionRegistry<R> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<R: Correlated> TransactionRegistry<R> {
    /// Register a new outstanding transaction.
    ///
    /// # Errors
    /// [`RegistryError::Duplicate`] when the id already has an entry; ids are
    /// never reused while still registered.
    pub fn register(&self, id: TransactionId) -> Result<ReplyHandle<R>, RegistryError> {
        match self.entries.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(RegistryError::Duplicate(id)),
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let (tx, rx) = mpsc::unbounded_channel();
                let waiter = Arc::new(Waiter { rx: Mutex::new(rx) });
                vacant.insert(Registered {
                    tx,
                    waiter: Arc::clone(&waiter),
                });
                Ok(ReplyHandle { id, waiter })
            }
        }
    }

    /// Route a reply to its waiter.
    ///
    /// Returns `false` when the id is unknown or already terminal; the caller
    /// treats that as a correlation miss, logs it, and never raises it into
    /// the read loop. A terminal reply retires the entry; buffered replies
    /// remain readable through the existing [`ReplyHandle`].
    pub fn resolve(&self, reply: R) -> bool {
        let id = reply.transaction_id();
        if reply.is_terminal() {
            match self.entries.remove(&id) {
                Some((_, entry)) => entry.tx.send(reply).is_ok(),
                None => false,
            }
        } else {
            match self.entries.get(&id) {
                Some(entry) => entry.tx.send(reply).is_ok(),
                None => false,
            }
        }
    }

    /// Look up the reply handle for an outstanding transaction.
    #[must_use]
    pub fn waiter(&self, id: TransactionId) -> Option<ReplyHandle<R>> {
        self.entries.get(&id).map(|entry| ReplyHandle {
            id,
            waiter: Arc::clone(&entry.waiter),
        })
    }

    /// Retire an entry on timeout; returns whether one existed.
    pub fn expire(&self, id: TransactionId) -> bool { self.entries.remove(&id).is_some() }

    /// Retire every entry; outstanding waiters observe closure.
    pub fn clear(&self) { self.entries.clear(); }

    /// Number of outstanding transactions.
    #[must_use]
    pub fn len(&self) -> usize { self.entries.len() }

    /// Whether no transactions are outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

/// Candidate sets attached to a delivered upstream message, retained until
/// the consumer acknowledges or rejects it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpstreamCandidates {
    /// Candidate device identifiers from the message's `DevEUIs`.
    pub dev_euis: Vec<DevEui>,
    /// Offered MIC values from the message's `MICChallenge`.
    pub mic_challenge: Vec<Mic>,
}

/// Delivered upstream messages still owing an acknowledge or reject.
#[derive(Default)]
pub struct PendingUpstreams {
    entries: DashMap<TransactionId, UpstreamCandidates>,
}

impl PendingUpstreams {
    /// Record a newly delivered obligation; returns `false` if the id was
    /// already pending (a wire protocol anomaly the caller logs).
    pub fn insert(&self, id: TransactionId, candidates: UpstreamCandidates) -> bool {
        match self.entries.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(candidates);
                true
            }
        }
    }

    /// Consume the obligation for `id`, if still pending.
    ///
    /// Taking is atomic: of two racing acknowledge/reject calls, exactly one
    /// obtains the candidates.
    pub fn take(&self, id: TransactionId) -> Option<UpstreamCandidates> {
        self.entries.remove(&id).map(|(_, candidates)| candidates)
    }

    /// Reinstate an obligation whose send attempt failed.
    pub fn restore(&self, id: TransactionId, candidates: UpstreamCandidates) {
        self.entries.insert(id, candidates);
    }

    /// Drop every pending obligation, returning how many were lost.
    pub fn drain(&self) -> usize {
        let lost = self.entries.len();
        self.entries.clear();
        lost
    }

    /// Number of pending obligations.
    #[must_use]
    pub fn len(&self) -> usize { self.entries.len() }

    /// Whether no obligations are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}
