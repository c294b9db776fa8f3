//! Post and comment field rules.

use super::error::DomainError;

/// Number of characters used when a post is shown as a short label.
pub const POST_LABEL_CHARS: usize = 15;

/// Short label of a post: the first [`POST_LABEL_CHARS`] characters of its text.
pub fn post_label(text: &str) -> String {
    text.chars().take(POST_LABEL_CHARS).collect()
}

/// Normalise submitted post or comment text, rejecting blank input.
pub fn normalize_text(field: &'static str, raw: &str) -> Result<String, DomainError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_truncates_on_characters_not_bytes() {
        assert_eq!(post_label("Привет, это длинный пост"), "Привет, это дли");
        assert_eq!(post_label("short"), "short");
    }

    #[test]
    fn blank_text_is_rejected() {
        let err = normalize_text("text", "   \n").expect_err("blank rejected");
        assert!(matches!(err, DomainError::Validation { .. }));
    }

    #[test]
    fn text_is_trimmed() {
        assert_eq!(normalize_text("text", "  hi \n").expect("valid"), "hi");
    }
}
