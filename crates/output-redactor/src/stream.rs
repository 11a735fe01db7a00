//! Incremental redaction over an unbounded output stream.
//!
//! Command output can be arbitrarily large, so the pipeline never
//! materializes it. [`StreamRedactor`] buffers at most one unterminated line
//! (capped), scans completed lines as they arrive, and holds back a tail no
//! larger than the pattern set's maximum match span so a secret split across
//! two `feed` calls is still caught.
//!
//! Chunks that are not valid UTF-8 are passed through unchanged: the
//! patterns target textual secrets, and altering binary output would corrupt
//! it for the consumer.

use std::sync::Arc;

use crate::redactor::RedactionSet;

/// Hard cap on the carry buffer for pathological never-newline streams.
const CARRY_CAP: usize = 64 * 1024;

/// Stateful, bounded-memory redactor for one output stream.
pub struct StreamRedactor {
    set: Arc<RedactionSet>,
    carry: Vec<u8>,
    /// Bytes held back at a forced (no-newline) flush so a partially seen
    /// match is never emitted unscanned.
    holdback: usize,
    /// Pattern names substituted so far, for audit.
    hits: Vec<String>,
}

impl StreamRedactor {
    pub fn new(set: Arc<RedactionSet>) -> Self {
        let holdback = set.max_span().min(CARRY_CAP / 2);
        Self {
            set,
            carry: Vec::new(),
            holdback,
            hits: Vec::new(),
        }
    }

    /// Feed a chunk of raw output; returns the redacted bytes that are safe
    /// to emit now. The remainder stays buffered until more input (or
    /// [`finish`](Self::finish)) arrives.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<u8> {
        self.carry.extend_from_slice(chunk);

        let mut out = Vec::new();

        // Emit everything up to and including the last newline.
        if let Some(pos) = self.carry.iter().rposition(|&b| b == b'\n') {
            let complete: Vec<u8> = self.carry.drain(..=pos).collect();
            self.redact_into(&complete, &mut out);
        }

        // A line longer than the cap is flushed early, holding back one
        // match-span so a straddling secret stays buffered.
        if self.carry.len() > CARRY_CAP {
            let emit_len = self.carry.len() - self.holdback;
            let prefix: Vec<u8> = self.carry.drain(..emit_len).collect();
            self.redact_into(&prefix, &mut out);
        }

        out
    }

    /// Flush and redact whatever is still buffered. Call exactly once, after
    /// the stream ends.
    pub fn finish(&mut self) -> Vec<u8> {
        let rest = std::mem::take(&mut self.carry);
        let mut out = Vec::new();
        self.redact_into(&rest, &mut out);
        out
    }

    /// Names of every pattern substituted so far, in stream order.
    pub fn hits(&self) -> &[String] {
        &self.hits
    }

    /// Current buffered byte count; bounded by `CARRY_CAP` plus one chunk.
    pub fn buffered(&self) -> usize {
        self.carry.len()
    }

    fn redact_into(&mut self, bytes: &[u8], out: &mut Vec<u8>) {
        if bytes.is_empty() {
            return;
        }
        match std::str::from_utf8(bytes) {
            Ok(text) => {
                let redaction = self.set.redact(text);
                self.hits.extend(redaction.hits.iter().cloned());
                out.extend_from_slice(redaction.text.as_bytes());
            }
            // Non-UTF-8 output is forwarded untouched.
            Err(_) => out.extend_from_slice(bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redactor() -> StreamRedactor {
        StreamRedactor::new(Arc::new(RedactionSet::builtin().unwrap()))
    }

    fn anthropic_key() -> String {
        format!("sk-ant-{}", "a1B2".repeat(23) + "xyz")
    }

    fn run(chunks: &[&[u8]]) -> (Vec<u8>, Vec<String>) {
        let mut r = redactor();
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(r.feed(chunk));
        }
        out.extend(r.finish());
        let hits = r.hits().to_vec();
        (out, hits)
    }

    #[test]
    fn whole_line_secret_is_redacted() {
        let input = format!("token={}\ndone\n", anthropic_key());
        let (out, hits) = run(&[input.as_bytes()]);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "token=[REDACTED:anthropic_key]\ndone\n"
        );
        assert_eq!(hits, vec!["anthropic_key"]);
    }

    #[test]
    fn secret_split_across_chunks_is_still_caught() {
        let key = anthropic_key();
        let (head, tail) = key.split_at(40);
        let first = format!("token={head}");
        let second = format!("{tail}\n");

        let (out, hits) = run(&[first.as_bytes(), second.as_bytes()]);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "token=[REDACTED:anthropic_key]\n"
        );
        assert_eq!(hits, vec!["anthropic_key"]);
    }

    #[test]
    fn clean_text_round_trips_byte_for_byte() {
        let input = b"plain output\nwith two lines\nand a tail without newline";
        let (out, hits) = run(&[input]);
        assert_eq!(out, input);
        assert!(hits.is_empty());
    }

    #[test]
    fn binary_chunks_pass_through_unchanged() {
        let input: Vec<u8> = vec![0x00, 0xff, 0xfe, b'\n', 0x80, 0x81, 0x82];
        let (out, hits) = run(&[&input]);
        assert_eq!(out, input);
        assert!(hits.is_empty());
    }

    #[test]
    fn unterminated_line_is_flushed_by_finish() {
        let input = format!("no newline key={}", anthropic_key());
        let (out, hits) = run(&[input.as_bytes()]);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "no newline key=[REDACTED:anthropic_key]"
        );
        assert_eq!(hits, vec!["anthropic_key"]);
    }

    #[test]
    fn carry_stays_bounded_on_newline_free_streams() {
        let mut r = redactor();
        let chunk = vec![b'x'; 16 * 1024];
        for _ in 0..64 {
            let _ = r.feed(&chunk);
            assert!(
                r.buffered() <= CARRY_CAP + chunk.len(),
                "carry grew unbounded: {}",
                r.buffered()
            );
        }
    }

    #[test]
    fn secret_straddling_a_forced_flush_is_caught() {
        let mut r = redactor();
        let mut out = Vec::new();

        // Push the carry past the cap with newline-free filler, ending just
        // before a secret, then deliver the secret in a later chunk.
        let filler = vec![b'x'; CARRY_CAP + 100];
        out.extend(r.feed(&filler));

        let key = anthropic_key();
        let (head, tail) = key.split_at(10);
        out.extend(r.feed(head.as_bytes()));
        out.extend(r.feed(format!("{tail}\n").as_bytes()));
        out.extend(r.finish());

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("[REDACTED:anthropic_key]"));
        assert!(!text.contains("sk-ant-"));
    }

    #[test]
    fn line_count_is_preserved() {
        let input = format!("a\nb={}\nc\nd\n", anthropic_key());
        let (out, _) = run(&[input.as_bytes()]);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 4);
    }
}
