use std::path::Path;

use crate::error::PolicyError;
use crate::schema::PolicyConfig;

/// Load a [`PolicyConfig`] from a YAML file on disk.
pub fn load_policy(path: impl AsRef<Path>) -> Result<PolicyConfig, PolicyError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| PolicyError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    load_policy_from_str(&contents)
}

/// Parse and validate a [`PolicyConfig`] from a YAML string.
pub fn load_policy_from_str(yaml: &str) -> Result<PolicyConfig, PolicyError> {
    let config: PolicyConfig = serde_yml::from_str(yaml)?;
    validate(&config)?;
    Ok(config)
}

/// Post-deserialization validation. Pattern compilation happens later, in
/// the compiler; this pass catches document-level problems.
fn validate(config: &PolicyConfig) -> Result<(), PolicyError> {
    if config.version != "1.0" {
        return Err(PolicyError::UnsupportedVersion(config.version.clone()));
    }

    let mut seen = std::collections::HashSet::new();
    for spec in &config.dlp_patterns {
        if spec.name.is_empty() {
            return Err(PolicyError::InvalidDlpPattern {
                name: String::new(),
                detail: "name must not be empty".to_string(),
            });
        }
        if !seen.insert(spec.name.as_str()) {
            return Err(PolicyError::InvalidDlpPattern {
                name: spec.name.clone(),
                detail: "duplicate pattern name".to_string(),
            });
        }
    }

    Ok(())
}
