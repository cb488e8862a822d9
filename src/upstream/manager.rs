//! Pool of upstream connections opened from one session.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tracing::debug;

use crate::{
    connection::{ConnectionId, ConnectionShared},
    error::ConnectError,
    session::{StreamKind, StreamSession},
    upstream::UpstreamConnection,
};

/// Opens and tracks upstream connections for one coverage.
///
/// Connections are held as weak references: dropping every strong handle to
/// a connection lets it retire without manager bookkeeping. Sibling
/// connections receive disjoint subsets of the coverage's upstream traffic;
/// the manager imposes no ordering across them.
pub struct UpstreamConnectionManager {
    session: StreamSession,
    connections: DashMap<ConnectionId, Weak<UpstreamConnection>>,
}

impl UpstreamConnectionManager {
    pub(crate) fn new(session: StreamSession) -> Self {
        Self {
            session,
            connections: DashMap::new(),
        }
    }

    /// Open a new upstream connection: dial, shake hands, and start its read
    /// task. `buffer_size` bounds the inbound message buffer.
    ///
    /// # Errors
    /// Any [`ConnectError`] from the transport connect or hello exchange.
    pub async fn create_connection(
        &self,
        buffer_size: usize,
    ) -> Result<Arc<UpstreamConnection>, ConnectError> {
        let settings = self.session.connect_settings(StreamKind::Upstream);
        let (shared, source) = ConnectionShared::establish(settings).await?;
        let connection = UpstreamConnection::start(shared, source, buffer_size);
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
        let live: Vec<Arc<UpstreamConnection>> = self
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
            debug!(id = %connection.id(), "upstream connection closed");
        }
    }
}
