//! # Utilities Module
//!
//! ## Purpose
//! Common utility functions and helpers used throughout the alert engine
//! for text handling and performance monitoring.

use std::time::Instant;

/// Performance timer for measuring operation duration
pub struct Timer {
    start: Instant,
    name: String,
}

/// Text processing utilities
pub struct TextUtils;

impl Timer {
    /// Start a new timer with a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Get elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Stop timer and log duration
    pub fn stop(self) -> u64 {
        let elapsed = self.elapsed_ms();
        tracing::debug!("Timer '{}' completed in {}ms", self.name, elapsed);
        elapsed
    }
}

impl TextUtils {
    /// Truncate text to a maximum length on a char boundary, with ellipsis.
    /// Used for case names in email subjects.
    pub fn truncate(text: &str, max_length: usize) -> String {
        if text.chars().count() <= max_length {
            return text.to_string();
        }
        let kept: String = text.chars().take(max_length.saturating_sub(3)).collect();
        format!("{}...", kept.trim_end())
    }

    /// Sanitize text for safe display
    pub fn sanitize(text: &str) -> String {
        text.chars()
            .filter(|c| !c.is_control() || c.is_whitespace())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_truncate() {
        assert_eq!(TextUtils::truncate("Smith v. Jones", 20), "Smith v. Jones");
        assert_eq!(
            TextUtils::truncate("A very long case name indeed", 10),
            "A very..."
        );
    }

    #[test]
    fn test_truncate_is_char_safe() {
        // Multi-byte characters must not be split.
        let truncated = TextUtils::truncate("Sociedad Española de Radiodifusión", 12);
        assert!(truncated.ends_with("..."));
    }
}
