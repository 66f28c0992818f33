//! Small clinical vocabularies shared by the reference data, the engine and the wire.

use serde::{Deserialize, Serialize};

/// Ordinal rank of an interaction, used for sorting and alerting.
///
/// Variants are declared in ascending order so the derived `Ord` ranks
/// `High > Medium > Low`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Lowercase label as used on the wire and in reference files.
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Route of administration for a drug mention.
///
/// Deserialisation is lenient: labels are matched case-insensitively, common spellings
/// ("orally", "intravenous", "PO") are accepted, and anything unrecognised becomes
/// [`Route::Other`] rather than failing the whole request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum Route {
    #[default]
    #[serde(rename = "oral")]
    Oral,
    #[serde(rename = "IV")]
    Iv,
    #[serde(rename = "IM")]
    Im,
    #[serde(rename = "topical")]
    Topical,
    #[serde(rename = "sublingual")]
    Sublingual,
    #[serde(rename = "other")]
    Other,
}

impl Route {
    /// Parse a route label or phrase, falling back to [`Route::Other`].
    pub fn parse(input: &str) -> Self {
        Self::recognise(input).unwrap_or(Route::Other)
    }

    /// Parse a route label or phrase, returning `None` when it is not a known route.
    pub fn recognise(input: &str) -> Option<Self> {
        let lower = input.trim().to_lowercase();
        let route = match lower.as_str() {
            "oral" | "orally" | "po" | "p.o." | "by mouth" => Route::Oral,
            "iv" | "i.v." | "intravenous" | "intravenously" => Route::Iv,
            "im" | "i.m." | "intramuscular" | "intramuscularly" => Route::Im,
            "topical" | "topically" | "applied topically" => Route::Topical,
            "sublingual" | "sublingually" | "sl" | "under the tongue" => Route::Sublingual,
            "other" => Route::Other,
            _ => return None,
        };
        Some(route)
    }

    /// Label as used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Route::Oral => "oral",
            Route::Iv => "IV",
            Route::Im => "IM",
            Route::Topical => "topical",
            Route::Sublingual => "sublingual",
            Route::Other => "other",
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Route {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(match raw.as_deref().map(str::trim) {
            None | Some("") => Route::default(),
            Some(label) => Route::parse(label),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_high_above_low() {
        let mut all = vec![Severity::Medium, Severity::High, Severity::Low];
        all.sort_by(|a, b| b.cmp(a));
        assert_eq!(all, vec![Severity::High, Severity::Medium, Severity::Low]);
    }

    #[test]
    fn severity_rejects_unknown_label() {
        assert!(serde_json::from_str::<Severity>("\"critical\"").is_err());
    }

    #[test]
    fn route_accepts_ui_labels() {
        for (label, route) in [
            ("oral", Route::Oral),
            ("IV", Route::Iv),
            ("IM", Route::Im),
            ("topical", Route::Topical),
            ("sublingual", Route::Sublingual),
        ] {
            let parsed: Route = serde_json::from_str(&format!("\"{label}\"")).unwrap();
            assert_eq!(parsed, route);
            assert_eq!(serde_json::to_string(&parsed).unwrap(), format!("\"{label}\""));
        }
    }

    #[test]
    fn route_falls_back_to_other() {
        let parsed: Route = serde_json::from_str("\"nasal\"").unwrap();
        assert_eq!(parsed, Route::Other);
    }

    #[test]
    fn route_null_or_empty_defaults_to_oral() {
        assert_eq!(serde_json::from_str::<Route>("null").unwrap(), Route::Oral);
        assert_eq!(serde_json::from_str::<Route>("\"  \"").unwrap(), Route::Oral);
    }
}
