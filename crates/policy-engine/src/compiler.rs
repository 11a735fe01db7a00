//! Rule compiler: turns a declarative [`PolicyConfig`] into compiled,
//! ordered rule chains ready for evaluation.
//!
//! Every pattern is compiled here, eagerly, so malformed globs/regexes/CIDRs
//! surface as [`PolicyError::InvalidPattern`] at load time instead of
//! surprising anyone during evaluation. File patterns may reference session
//! context variables (`${HOME}`, `${PROJECT_ROOT}`); when the running session
//! cannot resolve one, the rule is compiled *dormant* — it stays in the chain
//! at its declared position but never matches.

use std::path::PathBuf;

use regex::RegexBuilder;
use tracing::warn;

use crate::env::EnvPolicy;
use crate::error::PolicyError;
use crate::matcher::{CommandPattern, HostPattern, PathPattern};
use crate::schema::{Action, DlpPatternSpec, Domain, FileOp, PolicyConfig};

/// Complexity budget for policy-supplied regexes. The regex engine is
/// linear-time, so bounding the compiled size bounds match cost.
const DLP_REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Per-session values substituted into file patterns.
///
/// Passed explicitly into [`compile`] rather than read from the environment,
/// so the same policy document compiles deterministically for any session.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub home: Option<PathBuf>,
    pub project_root: Option<PathBuf>,
    /// Opaque correlation id owned by the caller; carried into audit records.
    pub session_id: Option<String>,
}

/// One compiled rule. `matcher` is `None` for dormant rules.
#[derive(Debug, Clone)]
pub struct CompiledRule<M> {
    /// Ordinal position in the declared list; rule identity is
    /// `(domain, index)`.
    pub index: usize,
    /// The declared pattern text, kept for diagnostics and audit.
    pub pattern: String,
    pub action: Action,
    pub reason: Option<String>,
    pub matcher: Option<M>,
}

/// An ordered rule chain for one domain, terminated by the implicit
/// default-deny rule (represented by the evaluator falling through).
#[derive(Debug, Clone)]
pub struct RuleChain<M> {
    pub domain: Domain,
    pub rules: Vec<CompiledRule<M>>,
}

/// A compiled file rule: path glob plus operation filter.
#[derive(Debug, Clone)]
pub struct FileRule {
    pub path: PathPattern,
    /// Operations the rule applies to; empty means all.
    pub operations: Vec<FileOp>,
}

/// A fully compiled, immutable policy snapshot.
///
/// Snapshots are built whole and shared read-only; reload replaces the whole
/// snapshot, never mutates one in place.
#[derive(Debug, Clone)]
pub struct CompiledPolicy {
    pub commands: RuleChain<CommandPattern>,
    pub files: RuleChain<FileRule>,
    pub network: RuleChain<HostPattern>,
    pub env: EnvPolicy,
    /// Validated DLP pattern specs; the redaction layer compiles these into
    /// its own scanner alongside the built-in catalogue.
    pub dlp_patterns: Vec<DlpPatternSpec>,
}

/// Compile a policy document against an optional session context.
pub fn compile(
    config: &PolicyConfig,
    ctx: Option<&SessionContext>,
) -> Result<CompiledPolicy, PolicyError> {
    let mut commands = Vec::with_capacity(config.commands.len());
    for (index, spec) in config.commands.iter().enumerate() {
        let matcher = CommandPattern::parse(&spec.pattern)
            .map_err(|detail| PolicyError::invalid_pattern(Domain::Command, index, &spec.pattern, detail))?;
        commands.push(CompiledRule {
            index,
            pattern: spec.pattern.clone(),
            action: spec.action,
            reason: spec.reason.clone(),
            matcher: Some(matcher),
        });
    }

    let mut files = Vec::with_capacity(config.files.len());
    for (index, spec) in config.files.iter().enumerate() {
        let matcher = match substitute_context(&spec.pattern, ctx) {
            Substitution::Resolved(pattern) => {
                let path = PathPattern::parse(&pattern).map_err(|detail| {
                    PolicyError::invalid_pattern(Domain::File, index, &spec.pattern, detail)
                })?;
                Some(FileRule {
                    path,
                    operations: spec.operations.clone(),
                })
            }
            Substitution::Dormant(variable) => {
                warn!(
                    index,
                    pattern = %spec.pattern,
                    variable,
                    "file rule requires unresolved session context; rule is dormant"
                );
                None
            }
            Substitution::Unknown(variable) => {
                return Err(PolicyError::invalid_pattern(
                    Domain::File,
                    index,
                    &spec.pattern,
                    format!("unknown context variable '${{{variable}}}'"),
                ));
            }
        };
        files.push(CompiledRule {
            index,
            pattern: spec.pattern.clone(),
            action: spec.action,
            reason: spec.reason.clone(),
            matcher,
        });
    }

    let mut network = Vec::with_capacity(config.network.len());
    for (index, spec) in config.network.iter().enumerate() {
        let matcher = HostPattern::parse(&spec.pattern)
            .map_err(|detail| PolicyError::invalid_pattern(Domain::Network, index, &spec.pattern, detail))?;
        network.push(CompiledRule {
            index,
            pattern: spec.pattern.clone(),
            action: spec.action,
            reason: spec.reason.clone(),
            matcher: Some(matcher),
        });
    }

    let env = EnvPolicy::compile(&config.env)?;

    let mut dlp_patterns = Vec::with_capacity(config.dlp_patterns.len());
    for spec in &config.dlp_patterns {
        RegexBuilder::new(&spec.regex)
            .size_limit(DLP_REGEX_SIZE_LIMIT)
            .build()
            .map_err(|e| PolicyError::InvalidDlpPattern {
                name: spec.name.clone(),
                detail: e.to_string(),
            })?;
        dlp_patterns.push(spec.clone());
    }

    Ok(CompiledPolicy {
        commands: RuleChain {
            domain: Domain::Command,
            rules: commands,
        },
        files: RuleChain {
            domain: Domain::File,
            rules: files,
        },
        network: RuleChain {
            domain: Domain::Network,
            rules: network,
        },
        env,
        dlp_patterns,
    })
}

enum Substitution {
    Resolved(String),
    /// The named variable exists but the session did not provide a value.
    Dormant(&'static str),
    /// The pattern names a variable this engine does not define.
    Unknown(String),
}

/// Replace `${HOME}` / `${PROJECT_ROOT}` with session values.
fn substitute_context(pattern: &str, ctx: Option<&SessionContext>) -> Substitution {
    let mut resolved = pattern.to_string();

    for (name, value) in [
        ("HOME", ctx.and_then(|c| c.home.as_ref())),
        ("PROJECT_ROOT", ctx.and_then(|c| c.project_root.as_ref())),
    ] {
        let placeholder = format!("${{{name}}}");
        if !resolved.contains(&placeholder) {
            continue;
        }
        match value {
            Some(path) => {
                resolved = resolved.replace(&placeholder, &path.to_string_lossy());
            }
            None => {
                return Substitution::Dormant(match name {
                    "HOME" => "HOME",
                    _ => "PROJECT_ROOT",
                });
            }
        }
    }

    // Any remaining ${...} is a variable we do not define.
    if let Some(start) = resolved.find("${") {
        let rest = &resolved[start + 2..];
        let name = rest.split('}').next().unwrap_or(rest);
        return Substitution::Unknown(name.to_string());
    }

    Substitution::Resolved(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_policy_from_str;

    fn compile_yaml(yaml: &str, ctx: Option<&SessionContext>) -> Result<CompiledPolicy, PolicyError> {
        let config = load_policy_from_str(yaml)?;
        compile(&config, ctx)
    }

    #[test]
    fn compiles_all_domains() {
        let policy = compile_yaml(
            r#"
version: "1.0"
commands:
  - pattern: "ls *"
    action: allow
files:
  - pattern: "/tmp/**"
    action: allow
network:
  - pattern: "*.github.com"
    action: allow
dlp_patterns:
  - name: token
    regex: "tk-[0-9]{8}"
"#,
            None,
        )
        .unwrap();

        assert_eq!(policy.commands.rules.len(), 1);
        assert_eq!(policy.files.rules.len(), 1);
        assert_eq!(policy.network.rules.len(), 1);
        assert_eq!(policy.dlp_patterns.len(), 1);
    }

    #[test]
    fn invalid_command_pattern_names_rule() {
        let err = compile_yaml(
            r#"
version: "1.0"
commands:
  - pattern: "ls *"
    action: allow
  - pattern: "'unterminated"
    action: deny
"#,
            None,
        )
        .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("command"), "unexpected error: {msg}");
        assert!(msg.contains("index 1"), "unexpected error: {msg}");
        assert!(msg.contains("'unterminated"), "unexpected error: {msg}");
    }

    #[test]
    fn invalid_network_pattern_rejected_at_load() {
        let err = compile_yaml(
            r#"
version: "1.0"
network:
  - pattern: "10.0.0.0/99"
    action: deny
"#,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::InvalidPattern { .. }));
    }

    #[test]
    fn invalid_dlp_regex_rejected_at_load() {
        let err = compile_yaml(
            r#"
version: "1.0"
dlp_patterns:
  - name: broken
    regex: "[unclosed"
"#,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::InvalidDlpPattern { .. }));
    }

    #[test]
    fn context_pattern_resolves_with_session() {
        let ctx = SessionContext {
            home: Some(PathBuf::from("/home/agent")),
            project_root: Some(PathBuf::from("/work/repo")),
            session_id: None,
        };
        let policy = compile_yaml(
            r#"
version: "1.0"
files:
  - pattern: "${HOME}/.cache/**"
    action: allow
  - pattern: "${PROJECT_ROOT}/**"
    action: allow
"#,
            Some(&ctx),
        )
        .unwrap();

        let home_rule = policy.files.rules[0].matcher.as_ref().unwrap();
        assert!(home_rule.path.matches("/home/agent/.cache/pip/wheels"));
        assert!(!home_rule.path.matches("/home/other/.cache/x"));

        let project_rule = policy.files.rules[1].matcher.as_ref().unwrap();
        assert!(project_rule.path.matches("/work/repo/src/main.rs"));
    }

    #[test]
    fn context_pattern_without_session_is_dormant_not_fatal() {
        let policy = compile_yaml(
            r#"
version: "1.0"
files:
  - pattern: "${PROJECT_ROOT}/**"
    action: allow
  - pattern: "/tmp/**"
    action: allow
"#,
            None,
        )
        .unwrap();

        // The dormant rule keeps its position but has no matcher.
        assert!(policy.files.rules[0].matcher.is_none());
        assert!(policy.files.rules[1].matcher.is_some());
    }

    #[test]
    fn unknown_context_variable_is_invalid() {
        let err = compile_yaml(
            r#"
version: "1.0"
files:
  - pattern: "${TYPO_ROOT}/**"
    action: allow
"#,
            None,
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("TYPO_ROOT"), "unexpected error: {msg}");
    }
}
