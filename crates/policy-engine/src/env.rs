//! Environment-variable filtering.
//!
//! The child process only sees variables that pass the policy: a name must
//! match an `allow` glob and no `deny` glob (deny wins for the same name),
//! and the surviving set is capped by count and by total bytes. Filtering is
//! deterministic: names are processed in sorted order, so the same policy and
//! the same environment always produce the same child environment.

use globset::{Glob, GlobMatcher};
use tracing::warn;

use crate::error::PolicyError;
use crate::schema::EnvPolicySpec;

/// Compiled environment policy.
#[derive(Debug, Clone)]
pub struct EnvPolicy {
    allow: Vec<GlobMatcher>,
    deny: Vec<GlobMatcher>,
    max_bytes: usize,
    max_keys: usize,
}

impl EnvPolicy {
    /// Compile name globs and validate caps.
    pub fn compile(spec: &EnvPolicySpec) -> Result<Self, PolicyError> {
        if spec.max_bytes == 0 {
            return Err(PolicyError::InvalidEnvPolicy(
                "max_bytes must be positive".to_string(),
            ));
        }
        if spec.max_keys == 0 {
            return Err(PolicyError::InvalidEnvPolicy(
                "max_keys must be positive".to_string(),
            ));
        }

        let compile_globs = |globs: &[String]| -> Result<Vec<GlobMatcher>, PolicyError> {
            globs
                .iter()
                .map(|g| {
                    Glob::new(g)
                        .map(|glob| glob.compile_matcher())
                        .map_err(|e| {
                            PolicyError::InvalidEnvPolicy(format!("bad name glob '{g}': {e}"))
                        })
                })
                .collect()
        };

        Ok(Self {
            allow: compile_globs(&spec.allow)?,
            deny: compile_globs(&spec.deny)?,
            max_bytes: spec.max_bytes,
            max_keys: spec.max_keys,
        })
    }

    /// True when `name` survives the allow/deny globs (ignoring caps).
    pub fn permits(&self, name: &str) -> bool {
        if self.deny.iter().any(|g| g.is_match(name)) {
            return false;
        }
        self.allow.iter().any(|g| g.is_match(name))
    }

    /// Filter an environment down to the variables the policy permits,
    /// applying the key-count and byte caps.
    pub fn filter<I>(&self, vars: I) -> Vec<(String, String)>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut vars: Vec<(String, String)> = vars.into_iter().collect();
        vars.sort_by(|a, b| a.0.cmp(&b.0));

        let mut out: Vec<(String, String)> = Vec::new();
        let mut total_bytes: usize = 0;

        for (name, value) in vars {
            if !self.permits(&name) {
                continue;
            }
            if out.len() >= self.max_keys {
                warn!(
                    max_keys = self.max_keys,
                    dropped = %name,
                    "env policy key cap reached; dropping remaining variables"
                );
                break;
            }
            // NAME=value plus the separating NUL, as the kernel accounts it.
            let entry_bytes = name.len() + value.len() + 2;
            if total_bytes + entry_bytes > self.max_bytes {
                warn!(
                    name = %name,
                    entry_bytes,
                    max_bytes = self.max_bytes,
                    "env entry exceeds byte cap; dropping"
                );
                continue;
            }
            total_bytes += entry_bytes;
            out.push((name, value));
        }

        out
    }
}
