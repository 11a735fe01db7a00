use std::path::PathBuf;

use crate::schema::Domain;

/// Errors surfaced while loading or compiling a policy document.
///
/// All of these are load-time fatal for the offending document: callers keep
/// serving the last-known-good snapshot instead of running with no policy.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("failed to read policy file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse policy document: {0}")]
    Parse(#[from] serde_yml::Error),

    #[error("unsupported policy version '{0}'; only '1.0' is supported")]
    UnsupportedVersion(String),

    /// A declared pattern failed to compile. Names the offending rule by
    /// domain and ordinal index so policy authors can find it.
    #[error("invalid {domain} pattern at index {index} ('{pattern}'): {detail}")]
    InvalidPattern {
        domain: Domain,
        index: usize,
        pattern: String,
        detail: String,
    },

    #[error("invalid env policy: {0}")]
    InvalidEnvPolicy(String),

    #[error("invalid DLP pattern '{name}': {detail}")]
    InvalidDlpPattern { name: String, detail: String },
}

impl PolicyError {
    /// Helper for building [`PolicyError::InvalidPattern`] from any
    /// displayable compile failure.
    pub fn invalid_pattern(
        domain: Domain,
        index: usize,
        pattern: &str,
        detail: impl std::fmt::Display,
    ) -> Self {
        Self::InvalidPattern {
            domain,
            index,
            pattern: pattern.to_string(),
            detail: detail.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_pattern_names_domain_index_and_pattern() {
        let err = PolicyError::invalid_pattern(Domain::Network, 4, "10.0.0.0/40", "bad mask");
        let msg = err.to_string();
        assert!(msg.contains("network"));
        assert!(msg.contains("index 4"));
        assert!(msg.contains("10.0.0.0/40"));
        assert!(msg.contains("bad mask"));
    }
}
