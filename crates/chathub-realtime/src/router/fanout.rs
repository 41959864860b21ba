//! Fan-out router: resolves recipients and hands each envelope to every
//! live connection exactly once.
//!
//! Local connections are written directly through the registry. Entries
//! owned by another process are published on the delivery bus, and that
//! process's subscriber calls [`FanoutRouter::deliver_remote`].

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use chathub_core::error::{AppError, ErrorKind};
use chathub_core::result::AppResult;
use chathub_core::types::{ConnectionId, ProcessId, UserId};
use chathub_entity::{MessageEnvelope, PresenceEntry, RemoteDelivery, Target};
use chathub_store::{DeliveryBus, GroupDirectory, PresenceStore};

use crate::connection::ConnectionRegistry;
use crate::message::Outbound;
use crate::metrics::{EngineMetrics, messages};

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    /// Frames queued on connections owned by this process.
    pub local: usize,
    /// Deliveries published to other processes.
    pub remote: usize,
    /// Recipients whose transport or publish failed.
    pub failed: usize,
    /// Recipients that disconnected while the message was in flight.
    pub raced: usize,
}

impl DeliveryReport {
    /// Connections the message was handed to.
    pub fn delivered(&self) -> usize {
        self.local + self.remote
    }
}

/// Connections found for one recipient.
struct Located {
    entries: Vec<PresenceEntry>,
    /// Set when the entries come from the local registry because the
    /// presence lookup failed.
    failure: Option<AppError>,
}

/// Routes envelopes to local connections and to the owning processes of
/// remote ones.
#[derive(Debug, Clone)]
pub struct FanoutRouter {
    process_id: ProcessId,
    registry: Arc<ConnectionRegistry>,
    presence: Arc<dyn PresenceStore>,
    groups: Arc<dyn GroupDirectory>,
    bus: Arc<dyn DeliveryBus>,
    metrics: Arc<EngineMetrics>,
}

impl FanoutRouter {
    /// Create a router for the process identified by `process_id`.
    pub fn new(
        process_id: ProcessId,
        registry: Arc<ConnectionRegistry>,
        presence: Arc<dyn PresenceStore>,
        groups: Arc<dyn GroupDirectory>,
        bus: Arc<dyn DeliveryBus>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            process_id,
            registry,
            presence,
            groups,
            bus,
            metrics,
        }
    }

    /// Deliver an envelope to every live connection of its recipients.
    ///
    /// A direct message to a user with no live connection, or a message to
    /// an unknown group, fails with `TargetNotFound` and nothing is sent.
    /// Per-recipient failures are counted in the report and never abort
    /// the fan-out.
    pub async fn deliver(&self, envelope: &MessageEnvelope) -> AppResult<DeliveryReport> {
        let recipients = self.resolve_recipients(envelope).await?;
        let frame = serde_json::to_string(&envelope.to_frame())?;
        let mut report = DeliveryReport::default();
        let mut resolved = 0usize;
        let mut lookup_failure: Option<AppError> = None;

        for user_id in recipients {
            let located = self.locate(user_id).await;
            resolved += located.entries.len();
            if located.failure.is_some() {
                lookup_failure = located.failure;
            }
            let entries = located.entries;

            for entry in entries {
                if entry.is_local_to(&self.process_id) {
                    self.deliver_local(entry.connection_id, &frame, &mut report);
                } else {
                    self.publish(entry, envelope, &mut report).await;
                }
            }
        }

        if resolved == 0 {
            // Without presence a remote recipient is indistinguishable from
            // an offline one.
            if let Some(e) = lookup_failure {
                return Err(AppError::store_unavailable(format!(
                    "Recipients could not be located: {}",
                    e.message
                )));
            }
            if let Target::User(user_id) = envelope.target {
                return Err(AppError::target_not_found(format!(
                    "User {user_id} has no live connection"
                )));
            }
        }

        debug!(
            message_id = %envelope.id,
            seq = envelope.seq,
            local = report.local,
            remote = report.remote,
            failed = report.failed,
            raced = report.raced,
            "Fan-out complete"
        );
        Ok(report)
    }

    /// Deliver an envelope published by another process to a connection
    /// owned by this one.
    pub fn deliver_remote(&self, delivery: RemoteDelivery) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        if delivery.process_id != self.process_id {
            debug!(
                process_id = %delivery.process_id,
                "Ignoring delivery addressed to another process"
            );
            return report;
        }

        match serde_json::to_string(&delivery.envelope.to_frame()) {
            Ok(frame) => self.deliver_local(delivery.connection_id, &frame, &mut report),
            Err(e) => {
                warn!(message_id = %delivery.envelope.id, error = %e, "Failed to render frame");
                messages::record_failure(&self.metrics);
                report.failed += 1;
            }
        }
        report
    }

    async fn resolve_recipients(&self, envelope: &MessageEnvelope) -> AppResult<Vec<UserId>> {
        match envelope.target {
            Target::User(user_id) => Ok(vec![user_id]),
            Target::Group(group_id) => {
                let members: HashSet<UserId> =
                    self.groups.members_of(group_id).await.map_err(|e| {
                        if e.kind == ErrorKind::NotFound {
                            AppError::target_not_found(format!("Group {group_id} does not exist"))
                        } else {
                            e
                        }
                    })?;
                let mut members: Vec<UserId> = members
                    .into_iter()
                    .filter(|id| *id != envelope.sender)
                    .collect();
                members.sort();
                Ok(members)
            }
        }
    }

    /// Live connections of a user; the local registry stands in when the
    /// presence store cannot be reached.
    async fn locate(&self, user_id: UserId) -> Located {
        match self.presence.lookup(user_id).await {
            Ok(entries) => Located {
                entries,
                failure: None,
            },
            Err(e) => {
                warn!(
                    user_id = %user_id,
                    error = %e,
                    "Presence lookup failed, falling back to local connections"
                );
                let entries = self
                    .registry
                    .connections_of_user(&user_id)
                    .into_iter()
                    .map(|conn_id| PresenceEntry::new(self.process_id.clone(), conn_id))
                    .collect();
                Located {
                    entries,
                    failure: Some(e),
                }
            }
        }
    }

    fn deliver_local(&self, conn_id: ConnectionId, frame: &str, report: &mut DeliveryReport) {
        let result = self
            .registry
            .get(&conn_id)
            .and_then(|handle| handle.send(Outbound::Frame(frame.to_string())));

        match result {
            Ok(()) => {
                messages::record_local(&self.metrics);
                report.local += 1;
            }
            Err(e) if matches!(e.kind, ErrorKind::ConnectionRace | ErrorKind::NotFound) => {
                debug!(conn_id = %conn_id, "Recipient closed before delivery");
                messages::record_race(&self.metrics);
                report.raced += 1;
            }
            Err(e) => {
                warn!(conn_id = %conn_id, error = %e, "Local delivery failed");
                messages::record_failure(&self.metrics);
                report.failed += 1;
            }
        }
    }

    async fn publish(
        &self,
        entry: PresenceEntry,
        envelope: &MessageEnvelope,
        report: &mut DeliveryReport,
    ) {
        let delivery = RemoteDelivery {
            process_id: entry.process_id,
            connection_id: entry.connection_id,
            envelope: envelope.clone(),
        };

        match self.bus.publish(&delivery).await {
            Ok(()) => {
                messages::record_remote(&self.metrics);
                report.remote += 1;
            }
            Err(e) => {
                warn!(
                    process_id = %delivery.process_id,
                    conn_id = %delivery.connection_id,
                    error = %e,
                    "Cross-process publish failed"
                );
                messages::record_failure(&self.metrics);
                report.failed += 1;
            }
        }
    }
}
