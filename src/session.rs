//! Session configuration shared by every connection opened for one coverage.
//!
//! A [`StreamSession`] bundles the bearer credential, the upstream and
//! downstream endpoints, the connector, and the framing and reconnect
//! policies. The two managers obtained from it open any number of logical
//! stream connections over that shared bundle; each connection still maps to
//! its own independent transport.

use std::{fmt, sync::Arc, time::Duration};

use crate::{
    codec::CodecConfig,
    connection::{
        ConnectSettings,
        preamble::Hello,
        transport::{Connector, Endpoint, TcpConnector},
    },
    downstream::manager::DownstreamConnectionManager,
    reconnect::ReconnectPolicy,
    upstream::manager::UpstreamConnectionManager,
};

/// Stream path announced when attaching an upstream connection.
pub const UPSTREAM_PATH: &str = "/api/v1.0/upstream";
/// Stream path announced when attaching a downstream connection.
pub const DOWNSTREAM_PATH: &str = "/api/v1.0/downstream";

const COVERAGE_DOMAIN: &str = "ran.everynet.io";
const COVERAGE_PORT: u16 = 443;

const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Copy)]
pub(crate) enum StreamKind {
    Upstream,
    Downstream,
}

struct SessionConfig {
    access_token: String,
    upstream: Endpoint,
    downstream: Endpoint,
    connector: Arc<dyn Connector>,
    codec: CodecConfig,
    reconnect: ReconnectPolicy,
    handshake_timeout: Duration,
}

/// Shared credential, endpoint, and policy bundle for one coverage.
#[derive(Clone)]
pub struct StreamSession {
    config: Arc<SessionConfig>,
}

// The token must not leak into logs.
impl fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("upstream", &self.config.upstream)
            .field("downstream", &self.config.downstream)
            .field("access_token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl StreamSession {
    /// Start building a session.
    #[must_use]
    pub fn builder() -> StreamSessionBuilder { StreamSessionBuilder::default() }

    /// Manager for upstream stream connections.
    #[must_use]
    pub fn upstream(&self) -> UpstreamConnectionManager {
        UpstreamConnectionManager::new(self.clone())
    }

    /// Manager for downstream stream connections.
    #[must_use]
    pub fn downstream(&self) -> DownstreamConnectionManager {
        DownstreamConnectionManager::new(self.clone())
    }

    pub(crate) fn connect_settings(&self, kind: StreamKind) -> ConnectSettings {
        let endpoint = match kind {
            StreamKind::Upstream => self.config.upstream.clone(),
            StreamKind::Downstream => self.config.downstream.clone(),
        };
        ConnectSettings {
            connector: Arc::clone(&self.config.connector),
            hello: Hello::new(endpoint.path.clone(), self.config.access_token.clone()),
            endpoint,
            codec: self.config.codec,
            reconnect: self.config.reconnect,
            handshake_timeout: self.config.handshake_timeout,
        }
    }
}

/// Incomplete session configuration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionBuildError {
    /// No bearer credential was supplied.
    #[error("access token is required")]
    MissingAccessToken,
    /// Neither explicit endpoints nor a coverage name were supplied.
    #[error("endpoints are required; set them explicitly or name a coverage")]
    MissingEndpoints,
}

/// Builder for [`StreamSession`].
pub struct StreamSessionBuilder {
    access_token: Option<String>,
    upstream: Option<Endpoint>,
    downstream: Option<Endpoint>,
    connector: Arc<dyn Connector>,
    codec: CodecConfig,
    reconnect: ReconnectPolicy,
    handshake_timeout: Duration,
}

impl Default for StreamSessionBuilder {
    fn default() -> Self {
        Self {
            access_token: None,
            upstream: None,
            downstream: None,
            connector: Arc::new(TcpConnector),
            codec: CodecConfig::default(),
            reconnect: ReconnectPolicy::default(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

impl StreamSessionBuilder {
    /// Bearer credential presented in the hello exchange.
    #[must_use]
    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Derive both endpoints from a coverage name.
    #[must_use]
    pub fn coverage(mut self, name: &str) -> Self {
        let authority = format!("{name}.{COVERAGE_DOMAIN}:{COVERAGE_PORT}");
        self.upstream = Some(Endpoint::new(authority.clone(), UPSTREAM_PATH));
        self.downstream = Some(Endpoint::new(authority, DOWNSTREAM_PATH));
        self
    }

    /// Set both endpoints explicitly, overriding any coverage derivation.
    #[must_use]
    pub fn endpoints(mut self, upstream: Endpoint, downstream: Endpoint) -> Self {
        self.upstream = Some(upstream);
        self.downstream = Some(downstream);
        self
    }

    /// Replace the transport connector; tests use an in-memory one.
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Framing configuration for every connection of this session.
    #[must_use]
    pub fn codec(mut self, codec: CodecConfig) -> Self {
        self.codec = codec;
        self
    }

    /// Reconnect policy for every connection of this session.
    #[must_use]
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Deadline for the hello exchange on each connect.
    #[must_use]
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Finish the session.
    ///
    /// # Errors
    /// [`SessionBuildError`] when the credential or endpoints are missing.
    pub fn build(self) -> Result<StreamSession, SessionBuildError> {
        let access_token = self
            .access_token
            .ok_or(SessionBuildError::MissingAccessToken)?;
        let (Some(upstream), Some(downstream)) = (self.upstream, self.downstream) else {
            return Err(SessionBuildError::MissingEndpoints);
        };
        Ok(StreamSession {
            config: Arc::new(SessionConfig {
                access_token,
                upstream,
                downstream,
                connector: self.connector,
                codec: self.codec,
                reconnect: self.reconnect.normalized(),
                handshake_timeout: self.handshake_timeout,
            }),
        })
    }
}
