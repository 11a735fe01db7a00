//! # policy-engine
//!
//! Core decision logic for the sentrysh sandbox shim. This crate loads YAML
//! policy documents, compiles per-domain ordered rule chains (commands,
//! files, network, environment), and evaluates candidates first-match-wins
//! into a three-valued decision: allow, deny, or approve.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use policy_engine::{compile, loader};
//!
//! let config = loader::load_policy("policy.yaml").unwrap();
//! let policy = compile(&config, None).unwrap();
//! let decision = policy.evaluate_command("sudo ls");
//! println!("{}: {}", decision.action, decision.reason);
//! ```
//!
//! For shared, reloadable use wrap the compiled policy in a
//! [`PolicyHandle`]: readers take one immutable snapshot per evaluation and
//! reloads swap the whole snapshot atomically.

mod compiler;
mod decision;
mod env;
mod error;
pub mod loader;
pub mod matcher;
mod schema;
mod snapshot;

mod evaluator;

// Re-export the primary public API at the crate root.
pub use compiler::{compile, CompiledPolicy, CompiledRule, FileRule, RuleChain, SessionContext};
pub use decision::{Decision, MatchedRule};
pub use env::EnvPolicy;
pub use error::PolicyError;
pub use schema::{
    Action, DlpPatternSpec, Domain, EnvPolicySpec, FileOp, FileRuleSpec, PolicyConfig, RuleSpec,
};
pub use snapshot::PolicyHandle;
