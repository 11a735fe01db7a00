//! Built-in secret pattern catalogue.
//!
//! Each entry carries a snake_case name (which appears in the redaction
//! marker), a regex matching the raw secret value, and an upper bound on a
//! single match's byte length. The bound sizes the streaming redactor's
//! carry buffer, so it must be honest: a match longer than `max_len` could
//! slip through a chunk boundary unredacted.

/// A single built-in detection pattern.
pub struct SecretPattern {
    /// Short snake_case identifier used in markers and audit records.
    pub name: &'static str,
    /// Regex matching the raw secret (compiled by
    /// [`RedactionSet`](crate::redactor::RedactionSet)).
    pub pattern: &'static str,
    /// Maximum byte length of any single match.
    pub max_len: usize,
}

/// The built-in catalogue. Patterns are anchored to distinctive prefixes so
/// that redaction markers (which contain only the pattern *name*) can never
/// re-match — that is what makes redaction idempotent.
pub static PATTERNS: &[SecretPattern] = &[
    SecretPattern {
        name: "anthropic_key",
        pattern: r"sk-ant-[A-Za-z0-9-]{95}",
        max_len: 102,
    },
    SecretPattern {
        name: "openai_key",
        pattern: r"\bsk-[A-Za-z0-9]{48}\b",
        max_len: 51,
    },
    SecretPattern {
        name: "aws_access_key",
        pattern: r"\b(?:AKIA|ASIA)[0-9A-Z]{16}\b",
        max_len: 20,
    },
    SecretPattern {
        name: "github_token",
        pattern: r"\bgh[pousr]_[A-Za-z0-9]{36,251}\b",
        max_len: 255,
    },
    SecretPattern {
        name: "slack_token",
        pattern: r"\bxox[baprs]-[A-Za-z0-9-]{10,72}\b",
        max_len: 78,
    },
    SecretPattern {
        name: "google_api_key",
        pattern: r"\bAIza[0-9A-Za-z_-]{35}\b",
        max_len: 39,
    },
    // Two dot-separated base64url segments after the header; the scanner
    // must consider overlapping candidates for this one.
    SecretPattern {
        name: "jwt",
        pattern: r"\beyJ[A-Za-z0-9_-]{10,}\.[A-Za-z0-9_-]{10,}\.[A-Za-z0-9_-]{10,}",
        max_len: 4096,
    },
    SecretPattern {
        name: "private_key",
        pattern: r"-----BEGIN (?:RSA |EC |OPENSSH |DSA |PGP )?PRIVATE KEY-----",
        max_len: 64,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_patterns_compile() {
        for pat in PATTERNS {
            regex::Regex::new(pat.pattern)
                .unwrap_or_else(|e| panic!("pattern '{}' failed to compile: {e}", pat.name));
        }
    }

    #[test]
    fn names_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for pat in PATTERNS {
            assert!(seen.insert(pat.name), "duplicate pattern name: {}", pat.name);
        }
    }

    #[test]
    fn max_len_is_positive() {
        for pat in PATTERNS {
            assert!(pat.max_len > 0, "pattern '{}' has zero max_len", pat.name);
        }
    }

    #[test]
    fn markers_never_rematch_any_pattern() {
        // A marker built from any pattern name must not itself contain a
        // secret-shaped substring; otherwise redaction would not be
        // idempotent.
        for pat in PATTERNS {
            let marker = format!("[REDACTED:{}]", pat.name);
            for other in PATTERNS {
                let re = regex::Regex::new(other.pattern).unwrap();
                assert!(
                    !re.is_match(&marker),
                    "marker '{marker}' re-matches pattern '{}'",
                    other.name
                );
            }
        }
    }
}
