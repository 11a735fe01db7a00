//! Append-only structured JSON-lines audit logging for sentrysh.
//!
//! Every policy-relevant event (decision, approval outcome, bypass entry,
//! reload, redaction) is serialised as one newline-terminated JSON object
//! and appended to a log file. The engine only *emits* records; storage,
//! rotation, and retention belong to an external collaborator.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use audit_log::{AuditEntry, AuditEventType, AuditSink, AuditSource};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (sink, _handle) = AuditSink::start("/var/log/sentrysh/audit.jsonl").await?;
//!
//! sink.log(AuditEntry::new(
//!     AuditEventType::PolicyLoaded,
//!     AuditSource::new("sentrysh"),
//!     serde_json::json!({"file": "policy.yaml"}),
//! ))
//! .await;
//! # Ok(())
//! # }
//! ```

pub mod entry;
pub mod sink;
pub mod writer;

// Re-export primary public types at the crate root.
pub use entry::{AuditEntry, AuditEventType, AuditSource, DecisionRecord};
pub use sink::AuditSink;
pub use writer::{AuditWriteError, AuditWriter};
