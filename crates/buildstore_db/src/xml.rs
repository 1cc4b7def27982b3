//! Well-formedness check for the structured output artifact.

use roxmltree::{Document, ParsingOptions};

/// Check that `content` is a well-formed XML document.
///
/// Returns a human-readable reason on failure. A DOCTYPE is allowed but not
/// used for validation.
pub fn check_well_formed(content: &str) -> Result<(), String> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    Document::parse_with_options(content, options)
        .map(|_| ())
        .map_err(|e| e.to_string())
}
