use crate::schema::{Action, Domain};

/// The outcome of evaluating one candidate against one domain's rule chain.
///
/// A `Decision` is created per evaluation call and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// The action the matching rule (or the terminal default) requested.
    pub action: Action,
    /// Identity of the declared rule that matched, if any. `None` means the
    /// implicit terminal default rule applied.
    pub matched_rule: Option<MatchedRule>,
    /// Human-readable explanation, stable enough to surface to operators.
    pub reason: String,
}

/// Identity of a compiled rule: its domain plus its ordinal position in the
/// declared list. The pattern text is carried along for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedRule {
    pub domain: Domain,
    pub index: usize,
    pub pattern: String,
}

impl Decision {
    /// A decision produced by a declared rule.
    pub fn from_rule(
        action: Action,
        domain: Domain,
        index: usize,
        pattern: &str,
        reason: Option<&str>,
    ) -> Self {
        let reason = reason
            .map(str::to_string)
            .unwrap_or_else(|| format!("matched {domain} rule #{index} '{pattern}'"));
        Self {
            action,
            matched_rule: Some(MatchedRule {
                domain,
                index,
                pattern: pattern.to_string(),
            }),
            reason,
        }
    }

    /// The implicit terminal default decision for a domain.
    pub fn default_deny(domain: Domain) -> Self {
        Self {
            action: Action::Deny,
            matched_rule: None,
            reason: format!("no {domain} rule matched; default deny"),
        }
    }

    /// Convenience predicate used by dispatch code.
    pub fn is_deny(&self) -> bool {
        self.action == Action::Deny
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rule_uses_declared_reason() {
        let d = Decision::from_rule(
            Action::Deny,
            Domain::Command,
            0,
            "sudo *",
            Some("privilege escalation is not permitted"),
        );
        assert_eq!(d.action, Action::Deny);
        assert_eq!(d.reason, "privilege escalation is not permitted");
        let matched = d.matched_rule.unwrap();
        assert_eq!(matched.domain, Domain::Command);
        assert_eq!(matched.index, 0);
        assert_eq!(matched.pattern, "sudo *");
    }

    #[test]
    fn from_rule_synthesizes_reason_when_absent() {
        let d = Decision::from_rule(Action::Allow, Domain::File, 3, "/tmp/**", None);
        assert_eq!(d.reason, "matched file rule #3 '/tmp/**'");
    }

    #[test]
    fn default_deny_has_no_matched_rule() {
        let d = Decision::default_deny(Domain::Network);
        assert!(d.is_deny());
        assert!(d.matched_rule.is_none());
        assert_eq!(d.reason, "no network rule matched; default deny");
    }
}
