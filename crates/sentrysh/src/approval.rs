//! Second-stage approval resolution.
//!
//! The evaluator's `approve` outcome means "a human must confirm this". The
//! resolver turns that into a final allow/deny: in an interactive context it
//! prompts on the controlling terminal with a bounded timeout; everywhere
//! else it fails closed. An approve decision can never silently become an
//! allow.

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use policy_engine::{Action, Decision};

/// The fully resolved outcome: the only two actions the dispatcher acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalAction {
    Allow,
    Deny,
}

/// How an approve decision was resolved, for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    /// No approval was needed (the decision was already allow or deny).
    NotRequired,
    Granted,
    Refused,
    /// Nobody answered within the timeout; resolved to deny.
    TimedOut,
    /// No prompt channel was available; resolved to deny.
    NonInteractive,
}

/// A resolved decision plus the reason text the dispatcher surfaces.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub action: FinalAction,
    pub outcome: ApprovalOutcome,
    pub reason: String,
}

/// Resolves approve decisions against a human, with a hard timeout.
pub struct ApprovalResolver {
    timeout: Duration,
}

impl ApprovalResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Resolve a decision using the controlling terminal as the prompt
    /// channel.
    pub async fn resolve(&self, decision: &Decision, interactive: bool) -> Resolution {
        self.resolve_with(decision, interactive, prompt_on_tty).await
    }

    /// Resolve with a caller-supplied prompt function. Split out so the
    /// fail-closed paths are testable without a terminal.
    pub async fn resolve_with<F, Fut>(
        &self,
        decision: &Decision,
        interactive: bool,
        ask: F,
    ) -> Resolution
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = std::io::Result<bool>>,
    {
        match decision.action {
            Action::Allow => Resolution {
                action: FinalAction::Allow,
                outcome: ApprovalOutcome::NotRequired,
                reason: decision.reason.clone(),
            },
            Action::Deny => Resolution {
                action: FinalAction::Deny,
                outcome: ApprovalOutcome::NotRequired,
                reason: decision.reason.clone(),
            },
            Action::Approve => {
                if !interactive {
                    return Resolution {
                        action: FinalAction::Deny,
                        outcome: ApprovalOutcome::NonInteractive,
                        reason: format!(
                            "{} (approval required but no prompt channel is available)",
                            decision.reason
                        ),
                    };
                }

                let prompt = format!("sentrysh: approve? {} [y/N] ", decision.reason);
                match tokio::time::timeout(self.timeout, ask(prompt)).await {
                    Ok(Ok(true)) => {
                        info!(reason = %decision.reason, "approval granted");
                        Resolution {
                            action: FinalAction::Allow,
                            outcome: ApprovalOutcome::Granted,
                            reason: format!("{} (approved)", decision.reason),
                        }
                    }
                    Ok(Ok(false)) => Resolution {
                        action: FinalAction::Deny,
                        outcome: ApprovalOutcome::Refused,
                        reason: format!("{} (approval refused)", decision.reason),
                    },
                    Ok(Err(e)) => {
                        warn!(error = %e, "approval prompt failed; failing closed");
                        Resolution {
                            action: FinalAction::Deny,
                            outcome: ApprovalOutcome::NonInteractive,
                            reason: format!("{} (approval prompt failed)", decision.reason),
                        }
                    }
                    Err(_) => {
                        warn!(timeout_secs = self.timeout.as_secs(), "approval timed out");
                        Resolution {
                            action: FinalAction::Deny,
                            outcome: ApprovalOutcome::TimedOut,
                            reason: format!(
                                "{} (approval timed out after {}s)",
                                decision.reason,
                                self.timeout.as_secs()
                            ),
                        }
                    }
                }
            }
        }
    }
}

/// Put the question to the controlling terminal directly, so the wrapped
/// program's own stdin is never consumed. Any failure to reach the terminal
/// is reported as an error and resolves to deny upstream.
async fn prompt_on_tty(prompt: String) -> std::io::Result<bool> {
    eprint!("{prompt}");

    let tty = tokio::fs::File::open("/dev/tty").await?;
    let mut line = String::new();
    BufReader::new(tty).read_line(&mut line).await?;

    let answer = line.trim().to_ascii_lowercase();
    Ok(answer == "y" || answer == "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy_engine::{Decision, Domain};

    fn approve_decision() -> Decision {
        Decision::from_rule(
            Action::Approve,
            Domain::Command,
            1,
            "npm install*",
            Some("package installs require approval"),
        )
    }

    fn resolver() -> ApprovalResolver {
        ApprovalResolver::new(Duration::from_secs(30))
    }

    async fn never_asked(_prompt: String) -> std::io::Result<bool> {
        panic!("prompt must not be shown for this case");
    }

    #[tokio::test]
    async fn allow_and_deny_pass_through_unchanged() {
        let r = resolver();

        let allow = Decision::from_rule(Action::Allow, Domain::Command, 0, "ls *", None);
        let res = r.resolve_with(&allow, false, never_asked).await;
        assert_eq!(res.action, FinalAction::Allow);
        assert_eq!(res.outcome, ApprovalOutcome::NotRequired);

        let deny = Decision::default_deny(Domain::Command);
        let res = r.resolve_with(&deny, true, never_asked).await;
        assert_eq!(res.action, FinalAction::Deny);
        assert_eq!(res.outcome, ApprovalOutcome::NotRequired);
    }

    #[tokio::test]
    async fn approve_fails_closed_when_non_interactive() {
        let r = resolver();
        let res = r
            .resolve_with(&approve_decision(), false, never_asked)
            .await;
        assert_eq!(res.action, FinalAction::Deny);
        assert_eq!(res.outcome, ApprovalOutcome::NonInteractive);
        assert!(res.reason.contains("no prompt channel"));
    }

    #[tokio::test]
    async fn approve_granted_resolves_to_allow() {
        let r = resolver();
        let res = r
            .resolve_with(&approve_decision(), true, |prompt| async move {
                assert!(prompt.contains("approve?"));
                Ok(true)
            })
            .await;
        assert_eq!(res.action, FinalAction::Allow);
        assert_eq!(res.outcome, ApprovalOutcome::Granted);
    }

    #[tokio::test]
    async fn approve_refused_resolves_to_deny() {
        let r = resolver();
        let res = r
            .resolve_with(&approve_decision(), true, |_| async { Ok(false) })
            .await;
        assert_eq!(res.action, FinalAction::Deny);
        assert_eq!(res.outcome, ApprovalOutcome::Refused);
    }

    #[tokio::test(start_paused = true)]
    async fn approve_timeout_resolves_to_deny_with_distinct_reason() {
        let r = ApprovalResolver::new(Duration::from_secs(5));
        let res = r
            .resolve_with(&approve_decision(), true, |_| std::future::pending())
            .await;
        assert_eq!(res.action, FinalAction::Deny);
        assert_eq!(res.outcome, ApprovalOutcome::TimedOut);
        assert!(res.reason.contains("timed out"));
        // The timeout reason must be distinguishable from a plain policy
        // deny so operators can tell the two apart.
        assert_ne!(res.reason, approve_decision().reason);
    }

    #[tokio::test]
    async fn prompt_failure_fails_closed() {
        let r = resolver();
        let res = r
            .resolve_with(&approve_decision(), true, |_| async {
                Err(std::io::Error::other("tty gone"))
            })
            .await;
        assert_eq!(res.action, FinalAction::Deny);
        assert_eq!(res.outcome, ApprovalOutcome::NonInteractive);
    }
}
