//! Input validation helpers. Parse-only; no network reachability checks.

use url::Url;

use crate::CoreError;

/// Maximum accepted length for an original URL.
const MAX_URL_LEN: usize = 2048;

/// Validate an original URL: must parse as a well-formed absolute URL.
/// Any scheme the parser accepts is allowed; there is no allow-list.
pub fn validate_original_url(s: &str) -> Result<(), CoreError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(CoreError::MissingField("originalUrl"));
    }
    if trimmed.len() > MAX_URL_LEN {
        return Err(CoreError::InvalidUrl("too long".into()));
    }
    Url::parse(trimmed).map_err(|e| CoreError::InvalidUrl(e.to_string()))?;
    Ok(())
}

/// Parse-only validity check mirroring [`validate_original_url`].
pub fn is_valid_url(s: &str) -> bool {
    validate_original_url(s).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_absolute_urls() {
        assert!(validate_original_url("https://example.com").is_ok());
        assert!(validate_original_url("http://example.com/a?b=c#d").is_ok());
        // No scheme allow-list: anything a generic parser takes is fine.
        assert!(validate_original_url("ftp://example.com/file").is_ok());
        assert!(validate_original_url("mailto:user@example.com").is_ok());
        // Surrounding whitespace is tolerated.
        assert!(validate_original_url("  https://example.com  ").is_ok());
    }

    #[test]
    fn rejects_relative_and_malformed() {
        assert!(matches!(
            validate_original_url(""),
            Err(CoreError::MissingField(_))
        ));
        assert!(matches!(
            validate_original_url("   "),
            Err(CoreError::MissingField(_))
        ));
        assert!(matches!(
            validate_original_url("not a url"),
            Err(CoreError::InvalidUrl(_))
        ));
        assert!(matches!(
            validate_original_url("/relative/path"),
            Err(CoreError::InvalidUrl(_))
        ));
    }

    #[test]
    fn rejects_oversized_urls() {
        let long = format!("https://example.com/{}", "a".repeat(MAX_URL_LEN));
        assert!(matches!(
            validate_original_url(&long),
            Err(CoreError::InvalidUrl(_))
        ));
    }

    #[test]
    fn is_valid_url_mirrors_validation() {
        assert!(is_valid_url("https://example.com"));
        assert!(!is_valid_url("definitely not"));
    }
}
