//! Request and response types shared by every rxcheck transport.
//!
//! Field names are `snake_case` on the wire. Optional free-text fields treat empty strings as
//! absent so that form submissions with blank inputs behave like omitted fields.

use rx_types::{DrugId, Route, Severity};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

// ============================================================================
// Mentions and resolved drugs
// ============================================================================

/// A raw, text-derived (or manually entered) reference to a drug.
///
/// Equality is structural over all four fields, which is what request-level deduplication uses.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct DrugMention {
    pub name: String,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub dosage: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub frequency: Option<String>,
    #[serde(default)]
    pub route: Route,
}

/// A drug as submitted to `check-interactions` or `comprehensive-analysis`.
///
/// `drug_id` is optional; when it names a catalog drug it is trusted, otherwise `name` is
/// resolved against the catalog.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct DrugInput {
    pub name: String,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub dosage: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub frequency: Option<String>,
    #[serde(default)]
    pub route: Route,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub drug_id: Option<String>,
}

impl DrugInput {
    pub fn mention(&self) -> DrugMention {
        DrugMention {
            name: self.name.clone(),
            dosage: self.dosage.clone(),
            frequency: self.frequency.clone(),
            route: self.route,
        }
    }
}

impl From<DrugMention> for DrugInput {
    fn from(m: DrugMention) -> Self {
        Self {
            name: m.name,
            dosage: m.dosage,
            frequency: m.frequency,
            route: m.route,
            drug_id: None,
        }
    }
}

/// How a name was matched against the catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Canonical name or catalog id.
    Exact,
    Synonym,
    /// Edit-distance match; see `match_distance`.
    Fuzzy,
    /// Caller supplied a known `drug_id`.
    Identifier,
}

/// A mention bound to a canonical catalog identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ResolvedDrug {
    /// Position in the request's deduplicated mention list.
    pub index: usize,
    pub mention: DrugMention,
    pub drug_id: DrugId,
    pub canonical_name: String,
    pub match_kind: MatchKind,
    pub match_distance: u32,
    /// Dose converted into the catalog dose unit, when the dosage could be parsed.
    pub dose_quantity: Option<f64>,
    pub dose_unit: Option<String>,
}

/// A mention that could not be bound to a catalog identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UnresolvedMention {
    pub index: usize,
    pub mention: DrugMention,
    pub code: DiagnosticCode,
}

// ============================================================================
// Patient profile
// ============================================================================

/// Caller-supplied patient attributes. Read-only to the engine and never persisted.
///
/// `age` is signed on the wire so that negative values reach validation and are rejected with
/// `INVALID_PROFILE` instead of failing deserialisation. A `weight_kg` of 0 means "not recorded".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PatientProfile {
    pub age: i64,
    #[serde(default, alias = "weight")]
    pub weight_kg: f64,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub allergies: Vec<String>,
}

// ============================================================================
// Findings
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    DrugDrug,
    DrugCondition,
    DrugAllergy,
}

/// A concrete, severity-graded conflict between two drug occurrences or between a drug
/// occurrence and a patient attribute.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct InteractionFinding {
    pub kind: FindingKind,
    pub severity: Severity,
    pub drug_id_a: DrugId,
    /// Second drug for `drug_drug` findings.
    pub drug_id_b: Option<DrugId>,
    pub drug_a: String,
    pub drug_b: Option<String>,
    /// Condition or allergy the finding is about.
    pub subject: Option<String>,
    /// Indices into `resolved_drugs` of the occurrences involved.
    pub occurrences: Vec<usize>,
    pub mechanism: String,
    pub recommendation: String,
}

// ============================================================================
// Dosage and alternatives
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AgeBand {
    Pediatric,
    Adult,
    Geriatric,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DosageWarningKind {
    BelowRange,
    AboveRange,
    DailyMaximumExceeded,
    AvoidInBand,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DosageWarning {
    pub occurrence: usize,
    pub drug_id: DrugId,
    pub drug_name: String,
    pub kind: DosageWarningKind,
    pub band: AgeBand,
    /// Dose compared against the range (single dose, or daily total for
    /// `daily_maximum_exceeded`).
    pub given: Option<f64>,
    pub recommended_min: Option<f64>,
    pub recommended_max: Option<f64>,
    pub unit: String,
    pub message: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AlternativeReason {
    HighSeverityInteraction,
    AllergyConflict,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AlternativeDrug {
    pub drug_id: DrugId,
    pub name: String,
    pub class: Option<String>,
}

/// Same-class substitutes for a drug implicated in a serious finding. `alternatives` is empty
/// when no safe substitute exists.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AlternativeSuggestion {
    pub drug_id: DrugId,
    pub drug_name: String,
    pub reasons: Vec<AlternativeReason>,
    pub alternatives: Vec<AlternativeDrug>,
}

// ============================================================================
// Diagnostics and report sections
// ============================================================================

/// Machine-readable codes for diagnostics and error bodies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    UnknownDrug,
    DoseNotNormalised,
    TooManyDrugs,
    DegradedSection,
    InvalidProfile,
    AmbiguousRule,
    ReferenceLoad,
    InvalidInput,
    Unauthorized,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub message: String,
    /// Index of the mention the diagnostic refers to, if any.
    pub mention_index: Option<usize>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    #[default]
    Ok,
    Degraded,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FindingsSection {
    pub status: SectionStatus,
    pub reason: Option<String>,
    pub items: Vec<InteractionFinding>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DosageSection {
    pub status: SectionStatus,
    pub reason: Option<String>,
    pub items: Vec<DosageWarning>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AlternativesSection {
    pub status: SectionStatus,
    pub reason: Option<String>,
    pub items: Vec<AlternativeSuggestion>,
}

// ============================================================================
// Operations
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ExtractDrugsReq {
    #[serde(default)]
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ExtractDrugsRes {
    /// Mentions in document order of first occurrence, including unrecognised ones.
    pub drugs: Vec<DrugMention>,
    pub resolved_drugs: Vec<ResolvedDrug>,
    pub diagnostics: Vec<Diagnostic>,
    pub reference_version: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CheckInteractionsReq {
    #[serde(default)]
    pub drugs: Vec<DrugInput>,
    #[serde(default)]
    pub patient: Option<PatientProfile>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CheckInteractionsRes {
    pub interactions: Vec<InteractionFinding>,
    pub resolved_drugs: Vec<ResolvedDrug>,
    pub unresolved_mentions: Vec<UnresolvedMention>,
    pub diagnostics: Vec<Diagnostic>,
    pub reference_version: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ComprehensiveAnalysisReq {
    #[serde(default)]
    pub drugs: Vec<DrugInput>,
    pub patient: PatientProfile,
}

/// Single structured report produced by `comprehensive-analysis`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AnalysisReport {
    pub resolved_drugs: Vec<ResolvedDrug>,
    pub unresolved_mentions: Vec<UnresolvedMention>,
    pub findings: FindingsSection,
    pub dosage_warnings: DosageSection,
    pub alternatives: AlternativesSection,
    pub diagnostics: Vec<Diagnostic>,
    pub reference_version: u64,
    pub reference_fingerprint: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DrugIdentity {
    pub drug_id: DrugId,
    pub name: String,
    pub class: Option<String>,
    pub match_kind: MatchKind,
    pub match_distance: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ResolveRes {
    pub query: String,
    /// `None` when the name is not in the catalog.
    pub identity: Option<DrugIdentity>,
}

/// Summary of the reference snapshot currently serving requests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReferenceInfoRes {
    pub version: u64,
    pub fingerprint: String,
    /// RFC 3339 timestamp of when the snapshot was built.
    pub loaded_at: String,
    pub drugs: usize,
    pub drug_interactions: usize,
    pub condition_interactions: usize,
    pub allergy_conflicts: usize,
    /// `None` when no dosing rules are loaded.
    pub dosing_rules: Option<usize>,
}

/// Error body returned for requests that cannot be served.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    pub code: DiagnosticCode,
    pub message: String,
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty()))
}
