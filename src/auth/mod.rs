//! Authentication gate for inbound connections.
//!
//! A connection is admitted when it presents the full identity triple and
//! the preference store holds a document for it. The enabled-event set is
//! computed here, once, and fixed for the connection's lifetime.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::connection_manager::{ConnectionHandle, ConnectionRegistry};
use crate::metrics::AuthMetrics;
use crate::preferences::{self, PreferenceStore};
use crate::websocket::OutboundMessage;

/// Identity parameters presented at the connection handshake
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub user_id: String,
    pub site_id: String,
    pub company_id: String,
}

impl ConnectParams {
    pub fn new(
        user_id: impl Into<String>,
        site_id: impl Into<String>,
        company_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            site_id: site_id.into(),
            company_id: company_id.into(),
        }
    }

    fn is_complete(&self) -> bool {
        !self.user_id.is_empty() && !self.site_id.is_empty() && !self.company_id.is_empty()
    }
}

/// Why an authentication attempt was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Identity parameters missing or empty
    MissingParams,
    /// The preference store holds no document for this identity
    NoPreferences,
    /// The preference lookup failed
    LookupFailed,
    /// The preference lookup did not answer within the configured bound
    Timeout,
    /// The connection died while the lookup was in flight
    ConnectionClosed,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingParams => "missing_params",
            Self::NoPreferences => "no_preferences",
            Self::LookupFailed => "lookup_failed",
            Self::Timeout => "timeout",
            Self::ConnectionClosed => "connection_closed",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an authentication attempt
#[derive(Debug)]
pub enum AuthOutcome {
    Accepted(Arc<ConnectionHandle>),
    Rejected(RejectReason),
}

/// Validates handshakes and registers admitted connections.
pub struct AuthenticationGate {
    registry: Arc<ConnectionRegistry>,
    preferences: Arc<dyn PreferenceStore>,
    lookup_timeout: Duration,
}

impl AuthenticationGate {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        preferences: Arc<dyn PreferenceStore>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            preferences,
            lookup_timeout,
        }
    }

    /// Authenticate a connection attempt and register it on success.
    ///
    /// Exactly one preference lookup per attempt; an empty or failed
    /// lookup is terminal for the attempt and the client must reconnect
    /// to retry. An empty enabled-event set is NOT a rejection: such a
    /// connection is admitted and simply receives nothing.
    #[tracing::instrument(
        name = "auth.authenticate",
        skip(self, sender),
        fields(
            user_id = %params.user_id,
            site_id = %params.site_id,
            company_id = %params.company_id
        )
    )]
    pub async fn authenticate(
        &self,
        params: ConnectParams,
        sender: mpsc::Sender<OutboundMessage>,
    ) -> AuthOutcome {
        if !params.is_complete() {
            tracing::warn!("Authentication rejected: missing identity parameters");
            return Self::reject(RejectReason::MissingParams);
        }

        let lookup = self
            .preferences
            .fetch(&params.user_id, &params.company_id, &params.site_id);

        let document = match timeout(self.lookup_timeout, lookup).await {
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.lookup_timeout.as_millis() as u64,
                    "Authentication rejected: preference lookup timed out"
                );
                return Self::reject(RejectReason::Timeout);
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Authentication rejected: preference lookup failed");
                return Self::reject(RejectReason::LookupFailed);
            }
            Ok(Ok(None)) => {
                tracing::info!("Authentication rejected: no preference document");
                return Self::reject(RejectReason::NoPreferences);
            }
            Ok(Ok(Some(document))) => document,
        };

        let enabled_events = preferences::enabled_events(&document);

        let handle = Arc::new(ConnectionHandle::new(
            params.user_id,
            params.site_id,
            params.company_id,
            enabled_events,
            sender,
        ));

        // The lookup may have suspended long enough for the socket to die;
        // registering now would resurrect an entry nobody can deliver to.
        if handle.is_closed() {
            tracing::debug!(
                user_id = %handle.user_id,
                "Discarding registration: connection closed during preference lookup"
            );
            return Self::reject(RejectReason::ConnectionClosed);
        }

        if let Some(previous) = self.registry.register(handle.clone()) {
            tracing::info!(
                user_id = %handle.user_id,
                previous_connection = %previous.id,
                "Replaced existing connection for user"
            );
        }

        AuthMetrics::record_accepted();
        tracing::info!(
            connection_id = %handle.id,
            user_id = %handle.user_id,
            enabled_events = handle.enabled_events.len(),
            "Connection authenticated"
        );

        AuthOutcome::Accepted(handle)
    }

    fn reject(reason: RejectReason) -> AuthOutcome {
        AuthMetrics::record_rejected(reason.as_str());
        AuthOutcome::Rejected(reason)
    }
}
