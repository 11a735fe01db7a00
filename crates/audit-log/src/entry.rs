use serde::{Deserialize, Serialize};

/// A single audit record: one policy-relevant event in one invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: uuid::Uuid,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub event_type: AuditEventType,
    pub source: AuditSource,
    pub details: serde_json::Value,
    /// Present on events that carry a policy evaluation outcome.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<DecisionRecord>,
}

impl AuditEntry {
    /// Create an entry with a fresh UUID and the current UTC timestamp.
    pub fn new(
        event_type: AuditEventType,
        source: AuditSource,
        details: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            event_type,
            source,
            details,
            decision: None,
        }
    }

    /// Attach the evaluation outcome, builder-style.
    pub fn with_decision(mut self, decision: DecisionRecord) -> Self {
        self.decision = Some(decision);
        self
    }
}

/// The category of event being recorded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// An invocation was handed to the real shell without evaluation.
    BypassEntered,
    /// A command was evaluated and allowed to run.
    CommandAllowed,
    /// A command was evaluated and refused.
    CommandDenied,
    /// An approve decision was put to a human.
    ApprovalRequested,
    /// The human said yes.
    ApprovalGranted,
    /// The human said no.
    ApprovalRefused,
    /// Nobody answered within the timeout; resolved to deny.
    ApprovalTimedOut,
    /// Secret material was redacted from observer-facing output.
    OutputRedacted,
    /// A policy snapshot was loaded or replaced.
    PolicyLoaded,
    /// A reload failed; the previous snapshot remains in service.
    PolicyReloadFailed,
    /// A wrapped process exited.
    ProcessExited,
}

/// Where an event came from: the component plus optional invocation context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSource {
    pub component: String,
    /// Session identifier correlating a chain of invocations, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl AuditSource {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            session_id: None,
        }
    }

    /// Attach the session id, builder-style.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// The outcome of a policy evaluation, flattened for the audit stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// `allow`, `deny`, or `approve` as evaluated (pre-resolution).
    pub action: String,
    /// `(domain, index)` identity of the matched rule, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<String>,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_serializes_as_single_json_object() {
        let entry = AuditEntry::new(
            AuditEventType::CommandDenied,
            AuditSource::new("dispatcher").with_session("sess-42"),
            serde_json::json!({"command": "sudo ls"}),
        )
        .with_decision(DecisionRecord {
            action: "deny".to_string(),
            matched_rule: Some("command#0".to_string()),
            reason: "privilege escalation is not permitted".to_string(),
        });

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"command_denied\""));
        assert!(json.contains("\"sess-42\""));
        assert!(json.contains("\"command#0\""));
        assert!(!json.contains('\n'));
    }

    #[test]
    fn absent_decision_is_omitted() {
        let entry = AuditEntry::new(
            AuditEventType::BypassEntered,
            AuditSource::new("dispatcher"),
            serde_json::json!({}),
        );
        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("decision"));
        assert!(!json.contains("session_id"));
    }
}
