//! # output-redactor
//!
//! DLP redaction for observer-facing command output. Secrets matching a
//! compiled pattern set are replaced with opaque `[REDACTED:<name>]` markers
//! before the text reaches any consumer above the sandbox boundary; the
//! executed process itself always sees real data.
//!
//! The crate is organised around three layers:
//!
//! 1. **[`patterns`]** -- static catalogue of named secret patterns with
//!    honest per-pattern match-span bounds.
//! 2. **[`redactor`]** -- compiles the catalogue (plus policy-supplied
//!    extras) into a [`RedactionSet`] and performs one-shot redaction.
//! 3. **[`stream`]** -- [`StreamRedactor`] applies the set incrementally
//!    with bounded memory, for unbounded process output.
//!
//! ## Quick start
//!
//! ```rust
//! use output_redactor::RedactionSet;
//!
//! let set = RedactionSet::builtin().unwrap();
//! let out = set.redact("nothing secret here");
//! assert!(!out.was_modified());
//! ```

pub mod patterns;
pub mod redactor;
pub mod stream;

// Re-export the most commonly used types at the crate root.
pub use patterns::{SecretPattern, PATTERNS};
pub use redactor::{PatternSpec, Redaction, RedactionSet, RedactorError};
pub use stream::StreamRedactor;
