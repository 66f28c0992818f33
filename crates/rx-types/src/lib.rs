//! Validated primitive types shared across the rxcheck crates.
//!
//! Enable the `openapi` feature to derive `utoipa::ToSchema` for the REST surface.

mod clinical;

pub use clinical::{Route, Severity};

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
    /// The input exceeded the maximum accepted length
    #[error("Text exceeds maximum length of {0} characters")]
    TooLong(usize),
    /// The input contained characters outside the accepted set
    #[error("Text contains invalid characters: {0}")]
    InvalidCharacters(String),
}

/// A string type that guarantees non-empty content.
///
/// This type wraps a `String` and ensures it contains at least one non-whitespace character.
/// The input is automatically trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// The input is trimmed of leading and trailing whitespace. If the trimmed
    /// result is empty, an error is returned.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// Canonical identifier of a drug in the reference catalog.
///
/// Identifiers are lowercase ASCII slugs (`a-z`, `0-9`, `-`, `_`), at most
/// [`DrugId::MAX_LEN`] characters. Ordering is lexicographic on the slug, which is
/// what the rule store uses to canonicalise unordered pairs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DrugId(String);

impl DrugId {
    /// Longest accepted identifier.
    pub const MAX_LEN: usize = 64;

    /// Parses a drug identifier, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`TextError`] if the identifier is empty, too long, or contains characters
    /// outside the lowercase slug alphabet.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        if trimmed.len() > Self::MAX_LEN {
            return Err(TextError::TooLong(Self::MAX_LEN));
        }

        let ok = trimmed
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'z' | b'-' | b'_'));
        if !ok {
            return Err(TextError::InvalidCharacters(trimmed.to_owned()));
        }

        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DrugId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for DrugId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for DrugId {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for DrugId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for DrugId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DrugId::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_text_trims_input() {
        let text = NonEmptyText::new("  Aspirin ").unwrap();
        assert_eq!(text.as_str(), "Aspirin");
    }

    #[test]
    fn non_empty_text_rejects_whitespace() {
        assert_eq!(NonEmptyText::new("   "), Err(TextError::Empty));
    }

    #[test]
    fn drug_id_accepts_slug() {
        let id = DrugId::parse("co-trimoxazole_960").unwrap();
        assert_eq!(id.as_str(), "co-trimoxazole_960");
    }

    #[test]
    fn drug_id_rejects_uppercase_and_spaces() {
        assert!(matches!(
            DrugId::parse("Aspirin"),
            Err(TextError::InvalidCharacters(_))
        ));
        assert!(matches!(
            DrugId::parse("vitamin d"),
            Err(TextError::InvalidCharacters(_))
        ));
    }

    #[test]
    fn drug_id_rejects_overlong_input() {
        let long = "a".repeat(DrugId::MAX_LEN + 1);
        assert_eq!(DrugId::parse(long), Err(TextError::TooLong(DrugId::MAX_LEN)));
    }

    #[test]
    fn drug_id_deserialize_validates() {
        let ok: DrugId = serde_json::from_str("\"warfarin\"").unwrap();
        assert_eq!(ok.as_str(), "warfarin");
        assert!(serde_json::from_str::<DrugId>("\"War farin\"").is_err());
    }

    #[test]
    fn drug_ids_order_lexicographically() {
        let a = DrugId::parse("aspirin").unwrap();
        let w = DrugId::parse("warfarin").unwrap();
        assert!(a < w);
    }
}
