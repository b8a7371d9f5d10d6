//! Completion classification
//!
//! Decides, from the generator's raw output, whether a generation finished
//! cleanly, finished for a reported reason, or was apparently cut off. The
//! verdict is advisory: it only ever prompts an optional client-initiated
//! continuation and never blocks completion of the current turn.
//!
//! Truncation detection is inherently fuzzy, so every window and threshold
//! is a config value rather than a constant.

use serde::{Deserialize, Serialize};

/// Terminal verdict for one generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "kebab-case")]
pub enum Completion {
    /// The generator signalled a normal stop
    Finished,
    /// The generator stopped for a reported, non-truncation reason
    FinishedWithReason(String),
    /// No clean ending was found; the text looks cut off
    ApparentlyTruncated,
}

impl Completion {
    /// True when a continuation should be offered to the client
    pub fn is_truncated(&self) -> bool {
        matches!(self, Self::ApparentlyTruncated)
    }
}

/// Tunable thresholds for the truncation heuristics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// How many trailing characters are searched for explicit markers
    #[serde(default = "default_tail_window")]
    pub tail_window: usize,

    /// How many trailing characters must contain a clean ending
    #[serde(default = "default_terminal_window")]
    pub terminal_window: usize,

    /// Responses at or below this length skip the clean-ending check
    #[serde(default = "default_min_length")]
    pub min_length: usize,

    /// Markers that flag a response as explicitly continued elsewhere
    #[serde(default = "default_markers")]
    pub truncation_markers: Vec<String>,
}

fn default_tail_window() -> usize {
    100
}

fn default_terminal_window() -> usize {
    50
}

fn default_min_length() -> usize {
    100
}

fn default_markers() -> Vec<String> {
    vec![
        "[continued]".to_string(),
        "[truncated]".to_string(),
        "(continued)".to_string(),
    ]
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            tail_window: default_tail_window(),
            terminal_window: default_terminal_window(),
            min_length: default_min_length(),
            truncation_markers: default_markers(),
        }
    }
}

/// Heuristic + signal-based completion classifier
#[derive(Debug, Clone, Default)]
pub struct CompletionClassifier {
    config: ClassifierConfig,
}

impl CompletionClassifier {
    /// Build a classifier with the given thresholds
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Classify a finished generation
    ///
    /// `done` and `done_reason` come from the generator's final frame. A
    /// normal stop (`done` with no reason or the reason `"stop"`) is taken
    /// at face value; anything else routes through the trailing-text
    /// heuristics.
    ///
    /// # Examples
    ///
    /// ```
    /// use parlance::classify::{Completion, CompletionClassifier};
    ///
    /// let classifier = CompletionClassifier::default();
    /// assert_eq!(
    ///     classifier.classify("All done.", true, Some("stop")),
    ///     Completion::Finished
    /// );
    /// assert_eq!(
    ///     classifier.classify("and then it trails off...", false, None),
    ///     Completion::ApparentlyTruncated
    /// );
    /// ```
    pub fn classify(&self, text: &str, done: bool, done_reason: Option<&str>) -> Completion {
        if done {
            match done_reason {
                None | Some("") | Some("stop") => return Completion::Finished,
                Some(reason) => {
                    if self.looks_truncated(text) {
                        tracing::debug!(reason, "non-stop reason and truncated tail");
                        return Completion::ApparentlyTruncated;
                    }
                    return Completion::FinishedWithReason(reason.to_string());
                }
            }
        }

        if self.looks_truncated(text) {
            Completion::ApparentlyTruncated
        } else {
            Completion::Finished
        }
    }

    /// Trailing-window heuristics, in priority order
    fn looks_truncated(&self, text: &str) -> bool {
        let trimmed = text.trim_end();
        if trimmed.is_empty() {
            return false;
        }

        if trimmed.ends_with("...") || trimmed.ends_with('…') {
            return true;
        }

        let tail = last_chars(trimmed, self.config.tail_window).to_lowercase();
        if self
            .config
            .truncation_markers
            .iter()
            .any(|marker| tail.contains(&marker.to_lowercase()))
        {
            return true;
        }

        if trimmed.chars().count() > self.config.min_length {
            let terminal = last_chars(trimmed, self.config.terminal_window);
            let has_sentence_end = terminal.contains(&['.', '!', '?'][..]);
            let has_closing_fence = terminal.contains("```");
            let has_closing_emphasis = terminal.contains(&['*', '_'][..]);
            if !has_sentence_end && !has_closing_fence && !has_closing_emphasis {
                return true;
            }
        }

        false
    }
}

/// The last `n` characters of `text` (char-safe)
fn last_chars(text: &str, n: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let start = chars.len().saturating_sub(n);
    chars[start..].iter().collect()
}
