//! API key checks for privileged endpoints.
//!
//! The expected key is resolved once at startup and handed in by the caller; nothing here reads
//! the process environment.

/// Reasons a request fails API key authentication.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing API key")]
    Missing,
    #[error("invalid API key")]
    Invalid,
}

/// Validates the provided API key against the expected key.
///
/// Returns `Ok(())` if the key matches, or an [`AuthError`] if it is absent or wrong.
pub fn validate_api_key(provided_key: Option<&str>, expected_key: &str) -> Result<(), AuthError> {
    let provided_key = provided_key.map(str::trim).filter(|k| !k.is_empty());

    match provided_key {
        None => Err(AuthError::Missing),
        Some(key) if key == expected_key => Ok(()),
        Some(_) => Err(AuthError::Invalid),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_matching_key() {
        assert_eq!(validate_api_key(Some("s3cret"), "s3cret"), Ok(()));
    }

    #[test]
    fn rejects_missing_or_blank_key() {
        assert_eq!(validate_api_key(None, "s3cret"), Err(AuthError::Missing));
        assert_eq!(validate_api_key(Some("  "), "s3cret"), Err(AuthError::Missing));
    }

    #[test]
    fn rejects_wrong_key() {
        assert_eq!(validate_api_key(Some("guess"), "s3cret"), Err(AuthError::Invalid));
    }
}
