//! Pool of downstream connections opened from one session.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tracing::debug;

use crate::{
    connection::{ConnectionId, ConnectionShared},
    downstream::DownstreamConnection,
    error::ConnectError,
    session::{StreamKind, StreamSession},
};

/// Opens and tracks downstream connections for one coverage.
///
/// Same weak-reference bookkeeping as the upstream manager; transaction ids
/// are scoped to each connection, so siblings may reuse ids independently.
pub struct DownstreamConnectionManager {
    session: StreamSession,
    connections: DashMap<ConnectionId, Weak<DownstreamConnection>>,
}

impl DownstreamConnectionManager {
    pub(crate) fn new(session: StreamSession) -> Self {
        Self {
            session,
            connections: DashMap::new(),
        }
    }

    /// Open a new downstream connection: dial, shake hands, and start its
    /// read task. `buffer_size` bounds the unmatched-reply buffer.
    ///
    /// # Errors
    /// Any [`ConnectError`] from the transport connect or hello exchange.
    pub async fn create_connection(
        &self,
        buffer_size: usize,
    ) -> Result<Arc<DownstreamConnection>, ConnectError> {
        let settings = self.session.connect_settings(StreamKind::Downstream);
        let (shared, source) = ConnectionShared::establish(settings).await?;
        let connection = DownstreamConnection::start(shared, source, buffer_size);
        self.connections
            .insert(connection.id(), Arc::downgrade(&connection));
        Ok(connection)
    }

    /// Number of tracked connections still alive and not closed.
    #[must_use]
    pub fn active(&self) -> usize {
        self.connections.retain(|_, weak| weak.upgrade().is_some_and(|c| !c.is_closed()));
        self.connections.len()
    }

    /// Close every tracked connection and await their teardown.
    pub async fn close_all(&self) {
        let live: Vec<Arc<DownstreamConnection>> = self
            .connections
            .iter()
            .filter_map(|entry| entry.value().upgrade())
            .collect();
        self.connections.clear();
        for connection in &live {
            connection.close();
        }
        for connection in live {
            let _ = connection.wait_closed().await;
            debug!(id = %connection.id(), "downstream connection closed");
        }
    }
}
