// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Vloo Labs

//! Audit logging for security-sensitive operations.
//!
//! Gift creation, token resolution, and every claim attempt are logged
//! to an append-only daily JSONL file. Audit failures are reported to
//! the caller but must never fail the request path; handlers log and
//! continue.

use std::fs;
use std::io::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::StoragePaths;

/// Types of auditable events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    // Gift lifecycle events
    GiftCreated,
    GiftAccessed,
    TokenResolved,

    // Claim events
    ClaimSucceeded,
    ClaimRejected,

    // Auth events
    PermissionDenied,
}

/// An audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID.
    pub event_id: String,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Type of event.
    pub event_type: AuditEventType,
    /// Subject who triggered the event (if known).
    pub subject: Option<String>,
    /// Resource affected (gift_id, token_id).
    pub resource_id: Option<String>,
    /// Resource type (gift, token).
    pub resource_type: Option<String>,
    /// Additional details as JSON.
    pub details: Option<serde_json::Value>,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Error message if the operation failed.
    pub error: Option<String>,
}

impl AuditEvent {
    /// Create a new audit event.
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            subject: None,
            resource_id: None,
            resource_type: None,
            details: None,
            success: true,
            error: None,
        }
    }

    /// Set the subject.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Set the resource.
    pub fn with_resource(
        mut self,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Add details.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Mark as failed with error message.
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }
}

/// Repository for audit events.
#[derive(Debug, Clone)]
pub struct AuditRepository {
    paths: StoragePaths,
}

impl AuditRepository {
    /// Create a new audit repository.
    pub fn new(paths: StoragePaths) -> Self {
        Self { paths }
    }

    /// Log an audit event.
    ///
    /// Events are appended to a daily log file in JSONL format
    /// (one JSON object per line).
    pub fn log(&self, event: &AuditEvent) -> std::io::Result<()> {
        let date = event.timestamp.format("%Y-%m-%d").to_string();
        let path = self.paths.audit_events_file(&date);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(event)
            .map_err(|e| std::io::Error::other(format!("Failed to serialize audit event: {e}")))?;

        let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }

    /// Read audit events for a specific date.
    pub fn read_events(&self, date: &str) -> std::io::Result<Vec<AuditEvent>> {
        let path = self.paths.audit_events_file(date);
        let content = fs::read_to_string(path)?;

        let mut events = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(event) => events.push(event),
                Err(e) => tracing::warn!(error = %e, "Skipping malformed audit line"),
            }
        }
        Ok(events)
    }
}

/// Log an audit event without letting a logging failure fail the request.
#[macro_export]
macro_rules! audit_log {
    ($repo:expr, $event:expr) => {
        if let Err(e) = $repo.log(&$event) {
            tracing::warn!(error = %e, "Failed to write audit event");
        }
    };
}
