//! First-match-wins decision evaluation.
//!
//! The evaluator walks a compiled rule chain in declaration order and the
//! first matching rule decides; there is no specificity reordering, so policy
//! authors put specific overrides before general catch-alls. When nothing
//! matches, the implicit terminal default rule (deny) applies.
//!
//! Evaluation is a pure function of `(candidate, snapshot)`: no hidden
//! state, no I/O, deterministic. That purity is what makes concurrent
//! evaluation across sessions safe without locking.

use tracing::{debug, trace};

use crate::compiler::{CompiledPolicy, RuleChain};
use crate::decision::Decision;
use crate::schema::FileOp;

/// Generic chain walk shared by every domain.
fn evaluate_chain<M>(
    chain: &RuleChain<M>,
    candidate: &str,
    matches: impl Fn(&M) -> bool,
) -> Decision {
    for rule in &chain.rules {
        let Some(matcher) = rule.matcher.as_ref() else {
            // Dormant rule: declared but unresolvable in this session.
            trace!(
                domain = %chain.domain,
                index = rule.index,
                "skipping dormant rule"
            );
            continue;
        };
        if matches(matcher) {
            trace!(
                domain = %chain.domain,
                index = rule.index,
                pattern = %rule.pattern,
                action = %rule.action,
                candidate,
                "rule matched"
            );
            return Decision::from_rule(
                rule.action,
                chain.domain,
                rule.index,
                &rule.pattern,
                rule.reason.as_deref(),
            );
        }
    }
    Decision::default_deny(chain.domain)
}

impl CompiledPolicy {
    /// Evaluate a raw command line (tokenized the way the shell would).
    pub fn evaluate_command(&self, command_line: &str) -> Decision {
        debug!(command = command_line, "evaluating command");
        evaluate_chain(&self.commands, command_line, |m| {
            m.matches_line(command_line)
        })
    }

    /// Evaluate a pre-tokenized argument vector (the `exec --` path, where
    /// no shell ever re-tokenizes the arguments).
    pub fn evaluate_argv(&self, argv: &[String]) -> Decision {
        debug!(argv = ?argv, "evaluating argv");
        let display = argv.join(" ");
        evaluate_chain(&self.commands, &display, |m| m.matches_tokens(argv))
    }

    /// Evaluate a filesystem access. `path` must already be resolved to its
    /// absolute, symlink-free form (see [`crate::matcher::resolve_path`]).
    pub fn evaluate_file(&self, path: &str, op: FileOp) -> Decision {
        debug!(path, %op, "evaluating file access");
        evaluate_chain(&self.files, path, |rule| {
            rule.path.matches(path)
                && (rule.operations.is_empty() || rule.operations.contains(&op))
        })
    }

    /// Evaluate a network connection to `host` (name or address) and an
    /// optional port.
    pub fn evaluate_network(&self, host: &str, port: Option<u16>) -> Decision {
        debug!(host, ?port, "evaluating network connect");
        evaluate_chain(&self.network, host, |m| m.matches(host, port))
    }
}
