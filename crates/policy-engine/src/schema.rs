use std::fmt;

use serde::{Deserialize, Serialize};

/// Top-level policy document loaded from a YAML file.
///
/// Each domain carries an *ordered* rule list; order is load-bearing because
/// evaluation is first-match-wins. A terminal default-deny rule is appended
/// per domain at compile time, so an empty list means "deny everything".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Schema version; currently must be "1.0".
    pub version: String,
    /// Command-execution rules, evaluated in declaration order.
    #[serde(default)]
    pub commands: Vec<RuleSpec>,
    /// Filesystem-access rules, evaluated in declaration order.
    #[serde(default)]
    pub files: Vec<FileRuleSpec>,
    /// Network-connect rules, evaluated in declaration order.
    #[serde(default)]
    pub network: Vec<RuleSpec>,
    /// Environment-variable filtering policy.
    #[serde(default)]
    pub env: EnvPolicySpec,
    /// Extra DLP patterns merged into the built-in redaction catalogue.
    #[serde(default)]
    pub dlp_patterns: Vec<DlpPatternSpec>,
}

/// The three-valued outcome a rule can request.
///
/// `Approve` is deliberately not collapsed into a boolean: it requires a
/// second-stage resolver that can fail closed (timeout, no prompt channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Allow,
    Deny,
    Approve,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::Deny => write!(f, "deny"),
            Self::Approve => write!(f, "approve"),
        }
    }
}

/// The category of operation a rule list governs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Command,
    File,
    Network,
    Env,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command => write!(f, "command"),
            Self::File => write!(f, "file"),
            Self::Network => write!(f, "network"),
            Self::Env => write!(f, "env"),
        }
    }
}

/// A single declarative rule for the command or network domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSpec {
    /// Domain-specific pattern syntax (token pattern / host / CIDR / :port).
    pub pattern: String,
    /// What to do when the pattern matches.
    pub action: Action,
    /// Optional human-readable reason surfaced with the decision.
    #[serde(default)]
    pub reason: Option<String>,
}

/// A filesystem rule: a path glob plus an optional operation filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRuleSpec {
    /// Path glob; `**` crosses separators, `*` stays within one segment.
    pub pattern: String,
    pub action: Action,
    /// Operations the rule applies to. Empty means all operations.
    #[serde(default)]
    pub operations: Vec<FileOp>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// A filesystem operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOp {
    Read,
    Write,
    Delete,
    Exec,
}

impl fmt::Display for FileOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Delete => write!(f, "delete"),
            Self::Exec => write!(f, "exec"),
        }
    }
}

/// Environment-variable filtering policy.
///
/// A variable survives filtering iff its name matches an `allow` glob and no
/// `deny` glob; deny always beats allow for the same name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvPolicySpec {
    /// Name globs for variables the child may see.
    #[serde(default = "default_env_allow")]
    pub allow: Vec<String>,
    /// Name globs for variables that are always stripped.
    #[serde(default)]
    pub deny: Vec<String>,
    /// Cap on the total bytes of surviving `NAME=value` pairs.
    #[serde(default = "default_env_max_bytes")]
    pub max_bytes: usize,
    /// Cap on the number of surviving variables.
    #[serde(default = "default_env_max_keys")]
    pub max_keys: usize,
}

impl Default for EnvPolicySpec {
    fn default() -> Self {
        Self {
            allow: default_env_allow(),
            deny: Vec::new(),
            max_bytes: default_env_max_bytes(),
            max_keys: default_env_max_keys(),
        }
    }
}

fn default_env_allow() -> Vec<String> {
    vec!["*".to_string()]
}
fn default_env_max_bytes() -> usize {
    32 * 1024
}
fn default_env_max_keys() -> usize {
    128
}

/// A named DLP pattern supplied by the policy document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlpPatternSpec {
    /// Short snake_case identifier; appears in the redaction marker.
    pub name: String,
    /// Regex matching the raw secret value.
    pub regex: String,
    /// Upper bound on a single match's byte length; sizes the streaming
    /// redactor's carry buffer. Defaults to 512 when omitted.
    #[serde(default)]
    pub max_len: Option<usize>,
}
