//! Streaming passphrase matcher
//!
//! Consumes one keyboard character at a time and tracks the longest live
//! prefix of the configured passphrase. A full match is the manual override
//! that re-enables the network while unauthorized devices are still present.

/// Result of feeding one character to the matcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    /// No live prefix
    NoMatch,
    /// A proper prefix of the passphrase is live
    Partial,
    /// The full passphrase was just completed
    Matched,
}

/// Prefix-matching state machine over the configured passphrase
///
/// Keystrokes arrive as a single logical stream, so the matcher assumes one
/// writer; the guard serializes access behind its own lock.
#[derive(Debug)]
pub struct PassphraseMatcher {
    target: Vec<char>,
    matched: usize,
}

impl PassphraseMatcher {
    /// Create a matcher for the given passphrase
    ///
    /// An empty passphrase is legal and never matches, which effectively
    /// disables the override.
    pub fn new(target: &str) -> Self {
        Self {
            target: target.chars().collect(),
            matched: 0,
        }
    }

    /// Feed one character
    ///
    /// Only printable ASCII (`' '..='~'`) is meaningful input; anything else
    /// (modifier keys, function keys reported as odd code points) leaves the
    /// live prefix untouched instead of counting as a mismatch.
    ///
    /// A character that fails to extend the prefix resets it to zero and is
    /// not re-tested as a possible new prefix start, even if it equals the
    /// passphrase's first character. Completing the passphrase returns
    /// [`MatchResult::Matched`] and resets, so the passphrase can be typed
    /// again immediately.
    pub fn feed(&mut self, c: char) -> MatchResult {
        if self.target.is_empty() {
            return MatchResult::NoMatch;
        }
        if !(' '..='~').contains(&c) {
            return self.progress();
        }

        if c == self.target[self.matched] {
            self.matched += 1;
        } else {
            self.matched = 0;
        }

        if self.matched == self.target.len() {
            self.matched = 0;
            return MatchResult::Matched;
        }
        self.progress()
    }

    /// Length of the currently live prefix
    pub fn matched_len(&self) -> usize {
        self.matched
    }

    fn progress(&self) -> MatchResult {
        if self.matched > 0 {
            MatchResult::Partial
        } else {
            MatchResult::NoMatch
        }
    }
}
