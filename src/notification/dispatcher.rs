use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;

use crate::connection_manager::{ConnectionRegistry, ConnectionSet};
use crate::metrics::DispatchMetrics;
use crate::websocket::{OutboundMessage, ServerMessage};

use super::{DispatchRequest, DispatchResult, NotificationTarget};

/// Maximum number of concurrent message sends
const MAX_CONCURRENT_SENDS: usize = 100;

/// Threshold for using pre-serialization (saves serialization overhead for larger sends)
const PRESERIALIZATION_THRESHOLD: usize = 4;

/// Statistics for the notification dispatcher
#[derive(Debug, Default)]
pub struct DispatcherStats {
    /// Total dispatch requests handled
    pub total_dispatched: AtomicU64,
    /// Total successful deliveries (connection count)
    pub total_delivered: AtomicU64,
    /// Total failed deliveries
    pub total_failed: AtomicU64,
    /// Requests that matched no eligible recipient
    pub no_targets: AtomicU64,
    /// Requests refused for missing fields
    pub invalid: AtomicU64,
    /// Point-to-point dispatches
    pub user_dispatches: AtomicU64,
    /// Site-wide dispatches
    pub site_dispatches: AtomicU64,
    /// Company-wide dispatches
    pub company_dispatches: AtomicU64,
}

impl DispatcherStats {
    pub fn snapshot(&self) -> DispatcherStatsSnapshot {
        DispatcherStatsSnapshot {
            total_dispatched: self.total_dispatched.load(Ordering::Relaxed),
            total_delivered: self.total_delivered.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
            no_targets: self.no_targets.load(Ordering::Relaxed),
            invalid: self.invalid.load(Ordering::Relaxed),
            user_dispatches: self.user_dispatches.load(Ordering::Relaxed),
            site_dispatches: self.site_dispatches.load(Ordering::Relaxed),
            company_dispatches: self.company_dispatches.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of dispatcher statistics
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStatsSnapshot {
    pub total_dispatched: u64,
    pub total_delivered: u64,
    pub total_failed: u64,
    pub no_targets: u64,
    pub invalid: u64,
    pub user_dispatches: u64,
    pub site_dispatches: u64,
    pub company_dispatches: u64,
}

/// Resolves notification targets and fans messages out to connections.
pub struct NotificationDispatcher {
    registry: Arc<ConnectionRegistry>,
    stats: DispatcherStats,
}

impl NotificationDispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            stats: DispatcherStats::default(),
        }
    }

    /// Get dispatcher statistics
    pub fn stats(&self) -> DispatcherStatsSnapshot {
        self.stats.snapshot()
    }

    /// Dispatch a notification to its target class.
    ///
    /// Delivery is fire-and-forget: an individual send failure is counted
    /// but never aborts the batch and is never retried.
    #[tracing::instrument(
        name = "dispatcher.dispatch",
        skip(self, request),
        fields(
            target = request.target.kind(),
            target_id = %request.target.id(),
            event_cmd = %request.event_cmd
        )
    )]
    pub async fn dispatch(&self, request: DispatchRequest) -> DispatchResult {
        if !request.is_valid() {
            self.stats.invalid.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Dispatch refused: missing or empty fields");
            return DispatchResult::Invalid;
        }

        self.stats.total_dispatched.fetch_add(1, Ordering::Relaxed);
        DispatchMetrics::record_dispatch(request.target.kind());

        let targets = self.resolve_targets(&request);

        if targets.is_empty() {
            self.stats.no_targets.fetch_add(1, Ordering::Relaxed);
            DispatchMetrics::record_no_targets();
            tracing::debug!("No eligible recipients for notification");
            return DispatchResult::NoTargets;
        }

        let message = ServerMessage::notification(&request.event_cmd, &request.message);
        let (delivered, failed) = self.send_to_connections(&targets, &message).await;

        self.stats
            .total_delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.stats
            .total_failed
            .fetch_add(failed as u64, Ordering::Relaxed);
        DispatchMetrics::record_delivered(delivered as u64);
        DispatchMetrics::record_failed(failed as u64);

        tracing::debug!(
            recipients = targets.len(),
            delivered = delivered,
            failed = failed,
            "Dispatched notification"
        );

        DispatchResult::Delivered(targets.len())
    }

    /// Resolve the candidate set for the target class, filtered by each
    /// candidate's enabled events.
    fn resolve_targets(&self, request: &DispatchRequest) -> ConnectionSet {
        match &request.target {
            NotificationTarget::User(user_id) => {
                self.stats.user_dispatches.fetch_add(1, Ordering::Relaxed);
                self.registry
                    .lookup_by_user_ids([user_id.as_str()], &request.event_cmd)
            }
            NotificationTarget::Site(site_id) => {
                self.stats.site_dispatches.fetch_add(1, Ordering::Relaxed);
                let members = self.registry.site_members(site_id);
                self.registry
                    .lookup_by_user_ids(members.iter(), &request.event_cmd)
            }
            NotificationTarget::Company(company_id) => {
                self.stats
                    .company_dispatches
                    .fetch_add(1, Ordering::Relaxed);
                let members = self.registry.company_members(company_id);
                self.registry
                    .lookup_by_user_ids(members.iter(), &request.event_cmd)
            }
        }
    }

    /// Send a message to a list of connections.
    ///
    /// Small sets are sent sequentially without pre-serialization; larger
    /// sets share one serialized frame and use bounded parallelism.
    async fn send_to_connections(
        &self,
        connections: &ConnectionSet,
        message: &ServerMessage,
    ) -> (usize, usize) {
        if connections.is_empty() {
            return (0, 0);
        }

        if connections.len() <= 3 {
            let mut delivered = 0;
            let mut failed = 0;
            for conn in connections {
                match conn.send(message.clone()).await {
                    Ok(()) => delivered += 1,
                    Err(_) => failed += 1,
                }
            }
            return (delivered, failed);
        }

        let outbound = if connections.len() >= PRESERIALIZATION_THRESHOLD {
            match OutboundMessage::preserialized(message) {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to pre-serialize message, falling back to per-connection serialization");
                    OutboundMessage::Raw(message.clone())
                }
            }
        } else {
            OutboundMessage::Raw(message.clone())
        };

        let mut futures = FuturesUnordered::new();
        let mut delivered = 0;
        let mut failed = 0;
        let mut pending = 0;

        for conn in connections {
            let conn = conn.clone();
            let msg = outbound.clone();
            futures.push(async move { conn.send_preserialized(msg).await.is_ok() });
            pending += 1;

            // Process completed futures when we hit the concurrency limit
            while pending >= MAX_CONCURRENT_SENDS {
                match futures.next().await {
                    Some(true) => {
                        delivered += 1;
                        pending -= 1;
                    }
                    Some(false) => {
                        failed += 1;
                        pending -= 1;
                    }
                    None => break,
                }
            }
        }

        // Process remaining futures
        while let Some(ok) = futures.next().await {
            if ok {
                delivered += 1;
            } else {
                failed += 1;
            }
        }

        (delivered, failed)
    }
}
