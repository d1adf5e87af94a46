use std::ops::Deref;

use chrono::{DateTime, Utc};
use mongodb::bson::{serde_helpers::chrono_datetime_as_bson_datetime, Document};
use serde::{Deserialize, Serialize};

use crate::model::mongodb::{Coll, Id};

/// Security-relevant events recorded in the audit log.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    OtpIssued,
    OtpFailed,
    OtpVerified,
    VoteCast,
}

/// Core audit entry data, as stored in the database.
///
/// Entries are append-only: written by every component, never mutated,
/// never deleted, and never read back by this core.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuditLogEntryCore {
    pub event: AuditEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voter_id: Option<Id>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_addr: Option<String>,
    /// Structured event payload.
    pub details: Document,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntryCore {
    pub fn new(
        event: AuditEvent,
        voter_id: impl Into<Option<Id>>,
        client_addr: impl Into<Option<String>>,
        details: Document,
    ) -> Self {
        Self {
            event,
            voter_id: voter_id.into(),
            client_addr: client_addr.into(),
            details,
            created_at: Utc::now(),
        }
    }
}

/// An audit entry without an ID.
pub type NewAuditLogEntry = AuditLogEntryCore;

/// An audit entry from the database, with its unique ID.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuditLogEntry {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub entry: AuditLogEntryCore,
}

impl Deref for AuditLogEntry {
    type Target = AuditLogEntryCore;

    fn deref(&self) -> &Self::Target {
        &self.entry
    }
}

/// Append an entry to the audit log, fire-and-forget.
///
/// A failed write must never fail the operation being audited; it is
/// surfaced to the operational log instead.
pub async fn record(audit: &Coll<NewAuditLogEntry>, entry: NewAuditLogEntry) {
    let event = entry.event;
    if let Err(err) = audit.insert_one(&entry, None).await {
        warn!("Failed to write audit entry for {event:?}: {err}");
    }
}
