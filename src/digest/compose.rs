// Email body composition
//
// The template carries a greeting and a sign-off separated by an empty
// paragraph (three consecutive newlines). The change list is inserted there.

use crate::digest::error::{DigestError, Result};

/// Insertion point in the template
pub const TEMPLATE_MARKER: &str = "\n\n\n";

/// Default template for a detector named `detector`
pub fn default_template(detector: &str) -> String {
    format!(
        "Hello,\n\nPlease find the performance regressions detected by {detector} as follows:\
         \n\n\n\nBest regards,\n\nThe performance team"
    )
}

/// Renders the change list into the digest template
#[derive(Debug, Clone)]
pub struct DigestComposer {
    template: String,
}

impl DigestComposer {
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        if !template.contains(TEMPLATE_MARKER) {
            return Err(DigestError::MissingTemplateMarker);
        }
        Ok(Self { template })
    }

    /// Full email body, or `None` when there is nothing to report
    pub fn compose(&self, new_changes: &str) -> Option<String> {
        let changes = new_changes.trim();
        if changes.is_empty() {
            return None;
        }

        Some(
            self.template
                .replacen(TEMPLATE_MARKER, &format!("\n\n{changes}\n"), 1),
        )
    }
}
