use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_policy_file")]
    pub policy_file: PathBuf,
    #[serde(default)]
    pub shell: ShellConfig,
    #[serde(default)]
    pub approvals: ApprovalConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            policy_file: default_policy_file(),
            shell: ShellConfig::default(),
            approvals: ApprovalConfig::default(),
            logging: LoggingConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ShellConfig {
    /// The real shell binary invocations are handed to in bypass mode when
    /// no explicit program is given.
    #[serde(default = "default_real_shell")]
    pub real_shell: PathBuf,
    /// Exit status reserved for policy denial. Defaults to 77 (EX_NOPERM),
    /// outside the 126/127/128+n bands shells reserve for themselves.
    #[serde(default = "default_denial_exit_code")]
    pub denial_exit_code: i32,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            real_shell: default_real_shell(),
            denial_exit_code: default_denial_exit_code(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ApprovalConfig {
    /// How long to wait for a human answer before failing closed.
    #[serde(default = "default_approval_timeout")]
    pub timeout_secs: u64,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_approval_timeout(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_audit_path")]
    pub audit_log_path: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            audit_log_path: default_audit_path(),
        }
    }
}

/// Session context values substituted into `${...}` policy patterns. `home`
/// falls back to the `HOME` environment variable; `project_root` has no
/// fallback and leaves those rules dormant when unset.
#[derive(Debug, Default, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub home: Option<PathBuf>,
    #[serde(default)]
    pub project_root: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Default-value functions used by serde
// ---------------------------------------------------------------------------

fn default_policy_file() -> PathBuf {
    PathBuf::from("policies/default.yaml")
}

fn default_real_shell() -> PathBuf {
    PathBuf::from("/bin/bash")
}

fn default_denial_exit_code() -> i32 {
    77
}

fn default_approval_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_audit_path() -> PathBuf {
    PathBuf::from("audit.jsonl")
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load configuration from a YAML file. A missing file yields defaults with
/// a warning so the shim works before any config has been written.
pub fn load(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() {
        warn!(
            path = %path.display(),
            "configuration file not found; using defaults"
        );
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

    let config: Config = serde_yml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {e}", path.display()))?;

    Ok(config)
}
