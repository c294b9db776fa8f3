//! Utilities for generating group slugs.

use slug::slugify;
use thiserror::Error;

const MAX_SLUG_LEN: usize = 50;

/// Errors that can occur while generating a slug.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug source text is empty")]
    EmptyInput,
    #[error("failed to derive slug from `{input}`")]
    Unrepresentable { input: String },
}

/// Derive a slug from the provided human-readable text.
///
/// Non-ASCII characters are transliterated by `slugify`; the result is capped
/// at [`MAX_SLUG_LEN`] characters without leaving a trailing dash.
pub fn derive_slug(input: &str) -> Result<String, SlugError> {
    if input.trim().is_empty() {
        return Err(SlugError::EmptyInput);
    }

    let mut candidate = slugify(input);
    if candidate.len() > MAX_SLUG_LEN {
        candidate.truncate(MAX_SLUG_LEN);
        while candidate.ends_with('-') {
            candidate.pop();
        }
    }

    if candidate.is_empty() {
        return Err(SlugError::Unrepresentable {
            input: input.to_string(),
        });
    }

    Ok(candidate)
}

/// Check that a client-supplied slug is already in canonical form.
pub fn is_valid_slug(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_SLUG_LEN
        && value
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_slug_lowercases_and_dashes() {
        assert_eq!(derive_slug("Rust Weekly News").expect("slug"), "rust-weekly-news");
    }

    #[test]
    fn derive_slug_rejects_empty_input() {
        assert_eq!(derive_slug("  "), Err(SlugError::EmptyInput));
    }

    #[test]
    fn derive_slug_rejects_punctuation_only() {
        assert!(matches!(
            derive_slug("!!!"),
            Err(SlugError::Unrepresentable { .. })
        ));
    }

    #[test]
    fn validates_canonical_slugs() {
        assert!(is_valid_slug("cats_and-dogs-2"));
        assert!(!is_valid_slug("Cats"));
        assert!(!is_valid_slug(""));
    }
}
