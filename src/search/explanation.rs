//! Score explanations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A node in the tree describing how a score was computed.
///
/// `matched` is a tri-state: `Some(false)` reports a failed required or
/// prohibited condition even when a value is present, `None` defers to
/// `value > 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    value: f32,
    description: String,
    details: Vec<Explanation>,
    matched: Option<bool>,
}

impl Explanation {
    /// A node whose match state follows its value.
    pub fn new<S: Into<String>>(value: f32, description: S) -> Self {
        Explanation {
            value,
            description: description.into(),
            details: Vec::new(),
            matched: None,
        }
    }

    /// A node with an explicit match state.
    pub fn with_match<S: Into<String>>(matched: bool, value: f32, description: S) -> Self {
        Explanation {
            value,
            description: description.into(),
            details: Vec::new(),
            matched: Some(matched),
        }
    }

    /// The value this node contributes.
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Set the value.
    pub fn set_value(&mut self, value: f32) {
        self.value = value;
    }

    /// The description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Replace the description.
    pub fn set_description<S: Into<String>>(&mut self, description: S) {
        self.description = description.into();
    }

    /// The explicit match state, if any.
    pub fn match_state(&self) -> Option<bool> {
        self.matched
    }

    /// Set the explicit match state.
    pub fn set_match(&mut self, matched: Option<bool>) {
        self.matched = matched;
    }

    /// Whether this node represents a match.
    pub fn is_match(&self) -> bool {
        self.matched.unwrap_or(self.value > 0.0)
    }

    /// Child explanations.
    pub fn details(&self) -> &[Explanation] {
        &self.details
    }

    /// Append a child explanation.
    pub fn add_detail(&mut self, detail: Explanation) {
        self.details.push(detail);
    }

    /// Builder form of [`add_detail`](Self::add_detail).
    pub fn with_detail(mut self, detail: Explanation) -> Self {
        self.details.push(detail);
        self
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        writeln!(f, "{}{} = {}", "  ".repeat(depth), self.value, self.description)?;
        for detail in &self.details {
            detail.write_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for Explanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}
