//! The interception dispatcher: the entry point for every `exec` invocation.
//!
//! Two states, chosen per invocation, never per process lifetime:
//!
//! * **Bypass** -- stdin is not a terminal and enforcement was not forced.
//!   The invocation is handed to the real program via `exec(2)`: the process
//!   image is replaced outright, so arguments and standard streams pass
//!   through with exact byte fidelity and no decision is ever computed.
//! * **Enforce** -- the command is evaluated against the policy snapshot,
//!   approve decisions are resolved (fail-closed), denials short-circuit
//!   with the reserved exit status, and allowed commands run with their
//!   stdout/stderr streamed through the redaction pipeline.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use audit_log::{AuditEntry, AuditEventType, AuditSink, AuditSource, DecisionRecord};
use output_redactor::{RedactionSet, StreamRedactor};
use policy_engine::{matcher, Action, CompiledPolicy, Decision};

use crate::approval::{ApprovalOutcome, ApprovalResolver, FinalAction};

/// Exit status used when the requested program cannot be spawned at all,
/// matching the shell convention for "command not found".
const SPAWN_FAILURE_EXIT: i32 = 127;

/// Read buffer size for the output-forwarding loops.
const IO_CHUNK: usize = 8192;

/// The dispatcher's per-invocation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptState {
    Bypass,
    Enforce,
}

/// Select the state for one invocation. Enforcement is chosen when stdin is
/// a terminal or the caller explicitly forced it; the force flag is opt-in
/// only and never inferred.
pub fn select_state(stdin_is_tty: bool, force_enforce: bool) -> InterceptState {
    if !stdin_is_tty && !force_enforce {
        InterceptState::Bypass
    } else {
        InterceptState::Enforce
    }
}

/// Replace this process with the requested program. Only returns on spawn
/// failure. No policy evaluation, no stream wrapping, no re-encoding:
/// byte fidelity is guaranteed by construction.
#[cfg(unix)]
pub fn bypass(argv: &[String]) -> std::io::Error {
    use std::os::unix::process::CommandExt;
    std::process::Command::new(&argv[0]).args(&argv[1..]).exec()
}

#[cfg(not(unix))]
pub fn bypass(argv: &[String]) -> std::io::Error {
    // No exec(2) on this platform; inherit all streams and forward the exit
    // status instead.
    match std::process::Command::new(&argv[0]).args(&argv[1..]).status() {
        Ok(status) => std::process::exit(status.code().unwrap_or(1)),
        Err(e) => e,
    }
}

/// Everything the enforce path needs for one invocation.
pub struct Dispatcher {
    policy: Arc<CompiledPolicy>,
    redaction: Arc<RedactionSet>,
    audit: AuditSink,
    resolver: ApprovalResolver,
    denial_exit_code: i32,
    session_id: Option<String>,
}

impl Dispatcher {
    pub fn new(
        policy: Arc<CompiledPolicy>,
        redaction: Arc<RedactionSet>,
        audit: AuditSink,
        resolver: ApprovalResolver,
        denial_exit_code: i32,
        session_id: Option<String>,
    ) -> Self {
        Self {
            policy,
            redaction,
            audit,
            resolver,
            denial_exit_code,
            session_id,
        }
    }

    /// Run one invocation through evaluate -> resolve -> execute-or-refuse.
    /// Returns the exit status to surface to the caller.
    pub async fn run(&self, argv: &[String], interactive: bool) -> Result<i32> {
        // Realize the program against its executable path so symlinked and
        // path-qualified forms evaluate uniformly.
        let mut realized: Vec<String> = argv.to_vec();
        if let Some(real) = matcher::realize_program(&argv[0]) {
            realized[0] = real.to_string_lossy().into_owned();
        }

        let decision = self.policy.evaluate_argv(&realized);
        debug!(
            action = %decision.action,
            reason = %decision.reason,
            "command evaluated"
        );

        if decision.action == Action::Approve {
            self.audit_decision(AuditEventType::ApprovalRequested, argv, &decision)
                .await;
        }

        let resolution = self.resolver.resolve(&decision, interactive).await;

        let approval_event = match resolution.outcome {
            ApprovalOutcome::Granted => Some(AuditEventType::ApprovalGranted),
            ApprovalOutcome::Refused => Some(AuditEventType::ApprovalRefused),
            ApprovalOutcome::TimedOut | ApprovalOutcome::NonInteractive => {
                Some(AuditEventType::ApprovalTimedOut)
            }
            ApprovalOutcome::NotRequired => None,
        };
        if let Some(event) = approval_event {
            self.audit_decision(event, argv, &decision).await;
        }

        if resolution.action == FinalAction::Deny {
            // A short, stable reason plus the reserved status; internals are
            // never leaked to the constrained program's streams.
            eprintln!("sentrysh: policy denied: {}", resolution.reason);
            self.audit_decision(AuditEventType::CommandDenied, argv, &decision)
                .await;
            return Ok(self.denial_exit_code);
        }

        self.audit_decision(AuditEventType::CommandAllowed, argv, &decision)
            .await;
        self.execute(argv).await
    }

    /// Spawn the allowed program with a policy-filtered environment and
    /// stream its output through the redaction pipeline.
    async fn execute(&self, argv: &[String]) -> Result<i32> {
        let filtered_env = self.policy.env.filter(std::env::vars());

        let mut child = match tokio::process::Command::new(&argv[0])
            .args(&argv[1..])
            .env_clear()
            .envs(filtered_env)
            .stdin(std::process::Stdio::inherit())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                eprintln!("sentrysh: cannot execute {}: {e}", argv[0]);
                return Ok(SPAWN_FAILURE_EXIT);
            }
        };

        let stdout = child.stdout.take().context("child stdout not captured")?;
        let stderr = child.stderr.take().context("child stderr not captured")?;

        let out_task = forward_redacted(stdout, tokio::io::stdout(), Arc::clone(&self.redaction));
        let err_task = forward_redacted(stderr, tokio::io::stderr(), Arc::clone(&self.redaction));

        let (out_hits, err_hits) = tokio::join!(out_task, err_task);
        let status = child.wait().await.context("failed to wait on child")?;

        let hits: Vec<String> = out_hits.into_iter().chain(err_hits).collect();
        if !hits.is_empty() {
            info!(count = hits.len(), "redacted secrets in command output");
            self.audit
                .log(
                    AuditEntry::new(
                        AuditEventType::OutputRedacted,
                        self.source(),
                        serde_json::json!({
                            "command": argv.join(" "),
                            "patterns": hits,
                        }),
                    ),
                )
                .await;
        }

        let code = exit_code(&status);
        self.audit
            .log(AuditEntry::new(
                AuditEventType::ProcessExited,
                self.source(),
                serde_json::json!({
                    "command": argv.join(" "),
                    "exit_code": code,
                }),
            ))
            .await;

        Ok(code)
    }

    fn source(&self) -> AuditSource {
        let source = AuditSource::new("dispatcher");
        match &self.session_id {
            Some(id) => source.with_session(id.clone()),
            None => source,
        }
    }

    async fn audit_decision(&self, event: AuditEventType, argv: &[String], decision: &Decision) {
        self.audit
            .log(
                AuditEntry::new(
                    event,
                    self.source(),
                    serde_json::json!({"command": argv.join(" ")}),
                )
                .with_decision(decision_record(decision)),
            )
            .await;
    }
}

fn decision_record(decision: &Decision) -> DecisionRecord {
    DecisionRecord {
        action: decision.action.to_string(),
        matched_rule: decision
            .matched_rule
            .as_ref()
            .map(|m| format!("{}#{}", m.domain, m.index)),
        reason: decision.reason.clone(),
    }
}

/// Copy one child stream to one of our streams, redacting along the way.
/// Returns the names of the patterns that fired.
async fn forward_redacted<R, W>(mut reader: R, mut writer: W, set: Arc<RedactionSet>) -> Vec<String>
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut redactor = StreamRedactor::new(set);
    let mut buf = vec![0u8; IO_CHUNK];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let out = redactor.feed(&buf[..n]);
                if !out.is_empty() {
                    if let Err(e) = writer.write_all(&out).await {
                        warn!(error = %e, "output forwarding failed");
                        break;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "reading child output failed");
                break;
            }
        }
    }

    let tail = redactor.finish();
    if !tail.is_empty() {
        let _ = writer.write_all(&tail).await;
    }
    let _ = writer.flush().await;

    redactor.hits().to_vec()
}

/// Map an exit status to the code surfaced to the caller, using the shell's
/// 128+signal convention for signal deaths.
fn exit_code(status: &std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy_engine::{compile, loader::load_policy_from_str};
    use std::time::Duration;

    fn policy(yaml: &str) -> Arc<CompiledPolicy> {
        let config = load_policy_from_str(yaml).unwrap();
        Arc::new(compile(&config, None).unwrap())
    }

    async fn dispatcher(yaml: &str) -> (Dispatcher, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let (audit, _handle) = AuditSink::start(dir.path().join("audit.jsonl"))
            .await
            .unwrap();
        let d = Dispatcher::new(
            policy(yaml),
            Arc::new(RedactionSet::builtin().unwrap()),
            audit,
            ApprovalResolver::new(Duration::from_secs(1)),
            77,
            Some("test-session".to_string()),
        );
        (d, dir)
    }

    // -- state selection --

    #[test]
    fn non_tty_without_force_bypasses() {
        assert_eq!(select_state(false, false), InterceptState::Bypass);
    }

    #[test]
    fn tty_enforces() {
        assert_eq!(select_state(true, false), InterceptState::Enforce);
    }

    #[test]
    fn force_flag_enforces_without_tty() {
        assert_eq!(select_state(false, true), InterceptState::Enforce);
        assert_eq!(select_state(true, true), InterceptState::Enforce);
    }

    // -- enforce path --

    #[tokio::test]
    async fn denied_command_returns_reserved_exit_code() {
        let (d, _dir) = dispatcher(
            r#"
version: "1.0"
commands:
  - pattern: "sudo *"
    action: deny
    reason: "privilege escalation is not permitted"
"#,
        )
        .await;

        let argv: Vec<String> = ["sudo", "ls"].iter().map(|s| s.to_string()).collect();
        let code = d.run(&argv, false).await.unwrap();
        assert_eq!(code, 77);
    }

    #[tokio::test]
    async fn unmatched_command_is_denied_by_default() {
        let (d, _dir) = dispatcher(r#"{version: "1.0"}"#).await;
        let argv: Vec<String> = ["true"].iter().map(|s| s.to_string()).collect();
        let code = d.run(&argv, false).await.unwrap();
        assert_eq!(code, 77);
    }

    #[tokio::test]
    async fn allowed_command_runs_and_forwards_exit_status() {
        let (d, _dir) = dispatcher(
            r#"
version: "1.0"
commands:
  - pattern: "true"
    action: allow
  - pattern: "false"
    action: allow
"#,
        )
        .await;

        let argv: Vec<String> = vec!["true".to_string()];
        assert_eq!(d.run(&argv, false).await.unwrap(), 0);

        let argv: Vec<String> = vec!["false".to_string()];
        assert_eq!(d.run(&argv, false).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn approve_resolves_to_deny_without_a_prompt_channel() {
        let (d, _dir) = dispatcher(
            r#"
version: "1.0"
commands:
  - pattern: "npm install*"
    action: approve
    reason: "package installs require approval"
"#,
        )
        .await;

        let argv: Vec<String> = ["npm", "install", "express"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        // Non-interactive: the approve must fail closed, not run npm.
        let code = d.run(&argv, false).await.unwrap();
        assert_eq!(code, 77);
    }

    #[tokio::test]
    async fn unspawnable_program_is_distinguished_from_denial() {
        let (d, _dir) = dispatcher(
            r#"
version: "1.0"
commands:
  - pattern: "/nonexistent/binary *"
    action: allow
"#,
        )
        .await;

        let argv: Vec<String> = ["/nonexistent/binary", "arg"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let code = d.run(&argv, false).await.unwrap();
        assert_eq!(code, SPAWN_FAILURE_EXIT);
        assert_ne!(code, 77);
    }

    #[tokio::test]
    async fn symlink_and_path_forms_evaluate_uniformly() {
        // /bin/true resolves to the same realized program as bare "true",
        // so a bare-name rule covers both invocation forms.
        let (d, _dir) = dispatcher(
            r#"
version: "1.0"
commands:
  - pattern: "true"
    action: allow
"#,
        )
        .await;

        let argv: Vec<String> = vec!["/bin/true".to_string()];
        assert_eq!(d.run(&argv, false).await.unwrap(), 0);
    }
}
