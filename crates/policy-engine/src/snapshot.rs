//! Atomic policy snapshots.
//!
//! The compiled policy is read-mostly shared state: many concurrent
//! evaluations, rare reloads. [`PolicyHandle`] keeps the current snapshot
//! behind a swappable `Arc`; readers take one clone per evaluation and use
//! that single snapshot for the whole call, so an in-flight evaluation never
//! observes a half-updated rule list. A failed reload keeps the last-known-
//! good snapshot in service.

use std::path::Path;
use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use crate::compiler::{compile, CompiledPolicy, SessionContext};
use crate::error::PolicyError;
use crate::loader::load_policy;

/// Shared handle to the current compiled policy snapshot.
pub struct PolicyHandle {
    current: RwLock<Arc<CompiledPolicy>>,
}

impl PolicyHandle {
    /// Wrap an already-compiled snapshot.
    pub fn new(policy: CompiledPolicy) -> Self {
        Self {
            current: RwLock::new(Arc::new(policy)),
        }
    }

    /// Load, compile, and wrap a policy document from disk.
    pub fn load(
        path: impl AsRef<Path>,
        ctx: Option<&SessionContext>,
    ) -> Result<Self, PolicyError> {
        let config = load_policy(path)?;
        let policy = compile(&config, ctx)?;
        Ok(Self::new(policy))
    }

    /// Take the current snapshot. Callers hold the returned `Arc` for the
    /// duration of one evaluation and must not re-fetch mid-call.
    pub fn snapshot(&self) -> Arc<CompiledPolicy> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Rebuild the snapshot from `path` and publish it atomically.
    ///
    /// On any load or compile failure the previous snapshot stays in
    /// service and the error is returned for the caller to report.
    pub fn reload(
        &self,
        path: impl AsRef<Path>,
        ctx: Option<&SessionContext>,
    ) -> Result<(), PolicyError> {
        let path = path.as_ref();
        let fresh = match load_policy(path).and_then(|config| compile(&config, ctx)) {
            Ok(policy) => policy,
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "policy reload failed; keeping last-known-good snapshot"
                );
                return Err(err);
            }
        };

        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(fresh);
        info!(path = %path.display(), "policy snapshot reloaded");
        Ok(())
    }
}
