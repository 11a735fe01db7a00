//! Compiled pattern matchers for the command, file, and network domains.
//!
//! All matchers are compiled once at policy load (malformed patterns are
//! rejected there, never at evaluation time) and are pure at match time: a
//! matcher plus a candidate string always produces the same answer. The only
//! filesystem-touching helpers here are [`resolve_path`] and
//! [`realize_program`], which callers use to canonicalize candidates *before*
//! handing them to the evaluator.

use std::net::Ipv4Addr;
use std::path::{Component, Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use tracing::warn;

/// Candidates longer than this are treated as non-matching and logged.
/// Legitimate command lines and paths never get near this; only adversarial
/// input does, and refusing to match keeps the terminal default (deny) in
/// control.
pub const MAX_CANDIDATE_BYTES: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Command patterns
// ---------------------------------------------------------------------------

/// A token-positional command pattern such as `"git push*"` or `"rm -rf *"`.
///
/// The pattern is tokenized exactly as a shell would tokenize the candidate.
/// Each pattern segment matches one candidate token positionally:
///
/// * a literal segment matches a token that equals it,
/// * a `seg*` segment prefix-matches one token,
/// * a lone `*` segment matches any one token,
/// * a *trailing* lone `*` instead consumes the remainder of the argument
///   list (zero or more tokens).
///
/// The program position (first token) is compared against the basename of the
/// candidate's program when the pattern names a bare program, so `sudo`,
/// `/usr/bin/sudo`, and a resolved symlink all match a `"sudo *"` rule.
#[derive(Debug, Clone)]
pub struct CommandPattern {
    segments: Vec<TokenPattern>,
    /// True when the pattern ended with a lone `*` that consumes the rest of
    /// the argument list.
    trailing_rest: bool,
}

#[derive(Debug, Clone)]
enum TokenPattern {
    Literal(String),
    Prefix(String),
    Any,
}

impl TokenPattern {
    fn matches(&self, token: &str) -> bool {
        match self {
            Self::Literal(lit) => token == lit,
            Self::Prefix(prefix) => token.starts_with(prefix.as_str()),
            Self::Any => true,
        }
    }
}

impl CommandPattern {
    /// Compile a command pattern. Fails on empty patterns and on quoting the
    /// shell tokenizer rejects (unbalanced quotes).
    pub fn parse(pattern: &str) -> Result<Self, String> {
        let raw = shell_words::split(pattern)
            .map_err(|e| format!("pattern does not tokenize: {e}"))?;
        if raw.is_empty() {
            return Err("empty command pattern".to_string());
        }

        let mut segments: Vec<TokenPattern> = Vec::with_capacity(raw.len());
        let mut trailing_rest = false;

        for (i, seg) in raw.iter().enumerate() {
            let is_last = i == raw.len() - 1;
            if seg == "*" {
                if is_last {
                    trailing_rest = true;
                } else {
                    segments.push(TokenPattern::Any);
                }
            } else if let Some(prefix) = seg.strip_suffix('*') {
                segments.push(TokenPattern::Prefix(prefix.to_string()));
            } else {
                segments.push(TokenPattern::Literal(seg.to_string()));
            }
        }

        if segments.is_empty() && trailing_rest {
            return Err("command pattern must name a program before '*'".to_string());
        }

        Ok(Self {
            segments,
            trailing_rest,
        })
    }

    /// Match against a pre-tokenized argument vector.
    pub fn matches_tokens(&self, tokens: &[String]) -> bool {
        if tokens.len() < self.segments.len() {
            return false;
        }
        if !self.trailing_rest && tokens.len() != self.segments.len() {
            return false;
        }

        for (i, seg) in self.segments.iter().enumerate() {
            let token = tokens[i].as_str();
            let ok = if i == 0 {
                self.program_matches(seg, token)
            } else {
                seg.matches(token)
            };
            if !ok {
                return false;
            }
        }
        true
    }

    /// Match against a raw command line, tokenizing it the way the shell
    /// would. Untokenizable input (unbalanced quotes) never matches, which
    /// leaves the terminal default rule in control.
    pub fn matches_line(&self, line: &str) -> bool {
        if line.len() > MAX_CANDIDATE_BYTES {
            warn!(
                len = line.len(),
                "command candidate exceeds match budget; treating as non-match"
            );
            return false;
        }
        match shell_words::split(line) {
            Ok(tokens) => self.matches_tokens(&tokens),
            Err(e) => {
                warn!(error = %e, "command candidate does not tokenize; treating as non-match");
                false
            }
        }
    }

    /// Program-position comparison. A bare-name pattern segment is compared
    /// against the basename of the candidate program so path and name forms
    /// match uniformly; a path-form segment is compared against the full
    /// (caller-realized) token.
    fn program_matches(&self, seg: &TokenPattern, token: &str) -> bool {
        let pattern_is_path = match seg {
            TokenPattern::Literal(s) | TokenPattern::Prefix(s) => s.contains('/'),
            TokenPattern::Any => false,
        };
        if pattern_is_path {
            seg.matches(token)
        } else {
            seg.matches(basename(token))
        }
    }
}

fn basename(token: &str) -> &str {
    token.rsplit('/').next().unwrap_or(token)
}

// ---------------------------------------------------------------------------
// Path patterns
// ---------------------------------------------------------------------------

/// A compiled path glob. `**` matches any depth (including zero); a single
/// `*` stays within one path segment. Candidates are expected to be fully
/// resolved absolute paths (see [`resolve_path`]).
#[derive(Debug, Clone)]
pub struct PathPattern {
    matcher: GlobMatcher,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self, String> {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| e.to_string())?;
        Ok(Self {
            matcher: glob.compile_matcher(),
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        if path.len() > MAX_CANDIDATE_BYTES {
            warn!(
                len = path.len(),
                "path candidate exceeds match budget; treating as non-match"
            );
            return false;
        }
        self.matcher.is_match(path)
    }
}

// ---------------------------------------------------------------------------
// Host patterns
// ---------------------------------------------------------------------------

/// A compiled network rule pattern.
#[derive(Debug, Clone)]
pub enum HostPattern {
    /// Exact hostname or address, compared case-insensitively.
    Exact(String),
    /// `*.suffix` wildcard; stores `".suffix"` and matches any host ending
    /// with it.
    Suffix(String),
    /// Dotted-quad with optional `/mask` for containment checks.
    Cidr { network: u32, mask: u32 },
    /// `:port` form, matching any host on that port.
    Port(u16),
}

impl HostPattern {
    pub fn parse(pattern: &str) -> Result<Self, String> {
        if let Some(port) = pattern.strip_prefix(':') {
            let port: u16 = port.parse().map_err(|_| format!("invalid port '{port}'"))?;
            return Ok(Self::Port(port));
        }

        if let Some(suffix) = pattern.strip_prefix("*.") {
            if suffix.is_empty() {
                return Err("wildcard host pattern needs a suffix".to_string());
            }
            return Ok(Self::Suffix(format!(".{}", suffix.to_ascii_lowercase())));
        }

        // Dotted-quad (optionally with a CIDR mask) becomes a containment
        // check; anything else is an exact hostname.
        if looks_like_ipv4(pattern) {
            return parse_cidr(pattern);
        }

        Ok(Self::Exact(pattern.to_ascii_lowercase()))
    }

    /// Match a `(host, port)` candidate.
    pub fn matches(&self, host: &str, port: Option<u16>) -> bool {
        match self {
            Self::Exact(expected) => host.eq_ignore_ascii_case(expected),
            Self::Suffix(suffix) => host.to_ascii_lowercase().ends_with(suffix.as_str()),
            Self::Cidr { network, mask } => match host.parse::<Ipv4Addr>() {
                Ok(ip) => (u32::from(ip) & mask) == *network,
                Err(_) => false,
            },
            Self::Port(expected) => port == Some(*expected),
        }
    }
}

fn looks_like_ipv4(pattern: &str) -> bool {
    let host = pattern.split('/').next().unwrap_or(pattern);
    !host.is_empty()
        && host.split('.').count() == 4
        && host.chars().all(|c| c.is_ascii_digit() || c == '.')
}

fn parse_cidr(pattern: &str) -> Result<HostPattern, String> {
    let (addr_str, mask_bits) = match pattern.split_once('/') {
        Some((addr, bits)) => {
            let bits: u32 = bits
                .parse()
                .map_err(|_| format!("invalid CIDR mask '{bits}'"))?;
            if bits > 32 {
                return Err(format!("CIDR mask /{bits} out of range"));
            }
            (addr, bits)
        }
        None => (pattern, 32),
    };

    let addr: Ipv4Addr = addr_str
        .parse()
        .map_err(|_| format!("invalid IPv4 address '{addr_str}'"))?;

    let mask = if mask_bits == 0 {
        0
    } else {
        u32::MAX << (32 - mask_bits)
    };

    Ok(HostPattern::Cidr {
        network: u32::from(addr) & mask,
        mask,
    })
}

// ---------------------------------------------------------------------------
// Candidate resolution helpers (dispatcher-side, filesystem-touching)
// ---------------------------------------------------------------------------

/// Resolve a candidate path to the absolute, symlink-free form that path
/// rules match against. Nonexistent paths fall back to canonicalizing the
/// nearest existing ancestor (so a write to a not-yet-created file under a
/// symlinked directory still resolves through the symlink), and finally to
/// lexical normalization.
pub fn resolve_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    if let Ok(resolved) = absolute.canonicalize() {
        return resolved;
    }

    if let (Some(parent), Some(name)) = (absolute.parent(), absolute.file_name()) {
        if let Ok(parent) = parent.canonicalize() {
            return parent.join(name);
        }
    }

    normalize_lexically(&absolute)
}

/// Pure lexical `.`/`..` removal, used when nothing on the path exists yet.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolve a program token to its realized executable path: PATH lookup for
/// bare names, then symlink resolution. Returns `None` when no executable is
/// found, in which case callers match on the token as given.
pub fn realize_program(program: &str) -> Option<PathBuf> {
    let candidate = if program.contains('/') {
        PathBuf::from(program)
    } else {
        let path_var = std::env::var_os("PATH")?;
        std::env::split_paths(&path_var)
            .map(|dir| dir.join(program))
            .find(|p| p.is_file())?
    };
    candidate.canonicalize().ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
