//! Audit trail for operator administration.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

pub const MEMORY_AUDIT_CAPACITY: usize = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum AuditAction {
    CreateOperator,
    DeleteOperator,
    ResetPassword,
    ChangePassword,
}

impl AuditAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateOperator => "create-operator",
            Self::DeleteOperator => "delete-operator",
            Self::ResetPassword => "reset-password",
            Self::ChangePassword => "change-password",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub identity_id: Uuid,
    pub identity_username: String,
    pub action: AuditAction,
    pub resource_type: String,
    pub resource_id: String,
    pub caller_address: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    /// Event against an operator account, stamped now.
    #[must_use]
    pub fn operator(
        identity_id: Uuid,
        identity_username: &str,
        action: AuditAction,
        target: Uuid,
        caller_address: Option<&str>,
    ) -> Self {
        Self {
            identity_id,
            identity_username: identity_username.to_string(),
            action,
            resource_type: "operator".to_string(),
            resource_id: target.to_string(),
            caller_address: caller_address.map(str::to_string),
            timestamp: Utc::now(),
        }
    }
}

/// Receives every mutating administration event. Recording must not fail the request.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);

    /// Most recent events first; sinks that keep nothing return an empty list.
    fn recent(&self, _limit: usize) -> Vec<AuditEvent> {
        Vec::new()
    }
}

#[derive(Clone, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        info!(
            identity_id = %event.identity_id,
            identity_username = %event.identity_username,
            action = event.action.as_str(),
            resource_type = %event.resource_type,
            resource_id = %event.resource_id,
            caller_address = event.caller_address.as_deref().unwrap_or("unknown"),
            "audit"
        );
    }
}

/// Bounded in-process log that also forwards to tracing.
#[derive(Debug)]
pub struct MemoryAuditLog {
    capacity: usize,
    events: Mutex<VecDeque<AuditEvent>>,
}

impl MemoryAuditLog {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity.min(MEMORY_AUDIT_CAPACITY))),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl Default for MemoryAuditLog {
    fn default() -> Self {
        Self::new(MEMORY_AUDIT_CAPACITY)
    }
}

impl AuditSink for MemoryAuditLog {
    fn record(&self, event: AuditEvent) {
        TracingAuditSink.record(event.clone());
        let mut events = self.events.lock();
        events.push_back(event);
        while events.len() > self.capacity {
            events.pop_front();
        }
    }

    fn recent(&self, limit: usize) -> Vec<AuditEvent> {
        self.events.lock().iter().rev().take(limit).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(action: AuditAction) -> AuditEvent {
        AuditEvent::operator(
            Uuid::new_v4(),
            "root",
            action,
            Uuid::new_v4(),
            Some("10.0.0.1"),
        )
    }

    #[test]
    fn keeps_most_recent_within_capacity() {
        let log = MemoryAuditLog::new(2);
        log.record(event(AuditAction::CreateOperator));
        log.record(event(AuditAction::ResetPassword));
        log.record(event(AuditAction::DeleteOperator));

        assert_eq!(log.len(), 2);
        let actions: Vec<_> = log.recent(10).into_iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![AuditAction::DeleteOperator, AuditAction::ResetPassword]
        );
    }

    #[test]
    fn recent_respects_limit() {
        let log = MemoryAuditLog::default();
        for _ in 0..5 {
            log.record(event(AuditAction::ChangePassword));
        }
        assert_eq!(log.recent(3).len(), 3);
    }

    #[test]
    fn serializes_camel_case() -> anyhow::Result<()> {
        let value = serde_json::to_value(event(AuditAction::CreateOperator))?;
        assert_eq!(value["action"], "create-operator");
        assert_eq!(value["resourceType"], "operator");
        assert_eq!(value["identityUsername"], "root");
        assert_eq!(value["callerAddress"], "10.0.0.1");
        Ok(())
    }

    #[test]
    fn tracing_sink_keeps_nothing() {
        let sink = TracingAuditSink;
        sink.record(event(AuditAction::CreateOperator));
        assert!(sink.recent(10).is_empty());
    }
}
